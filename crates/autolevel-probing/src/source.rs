//! Where probe triggers come from

use autolevel_communication::{ProbeSignal, TriggerStream};

/// Source of touch-off switch edges
pub trait TriggerSource: Send + Sync {
    /// Start observing edges that arrive from now on
    fn subscribe(&self) -> TriggerStream;
}

impl TriggerSource for ProbeSignal {
    fn subscribe(&self) -> TriggerStream {
        ProbeSignal::subscribe(self)
    }
}
