//! Grid probing engine
//!
//! Walks a rectangular grid row by row. At every point the tool is lowered
//! in small relative steps until the touch-off switch fires, then the machine
//! position is read back as the surface height. The run is a single tokio
//! task; `stop()` cancels it between steps and never interrupts a command
//! that is already on the wire.

use crate::events::{CalibrationEvent, CalibrationState};
use crate::params::{CalibrationParams, ProbeTiming};
use crate::source::TriggerSource;
use autolevel_communication::{
    parse_position, CommandParams, CommandSender, LogicalCommand, TriggerStream,
};
use autolevel_core::{CalibrationError, HeightMap, HeightMapMetadata, HeightMapPoint};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Receiving end of a run's progress events
pub type CalibrationEvents = mpsc::UnboundedReceiver<CalibrationEvent>;

struct ActiveRun {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Probing state machine
pub struct CalibrationEngine {
    sender: Arc<dyn CommandSender>,
    triggers: Arc<dyn TriggerSource>,
    timing: ProbeTiming,
    cnc_port: Option<String>,
    switch_port: Option<String>,
    state: Arc<RwLock<CalibrationState>>,
    /// Set while a run has not yet published its terminal event
    active: Arc<AtomicBool>,
    run: Mutex<Option<ActiveRun>>,
}

impl CalibrationEngine {
    /// Create an engine driving `sender` and listening on `triggers`
    pub fn new(
        sender: Arc<dyn CommandSender>,
        triggers: Arc<dyn TriggerSource>,
        timing: ProbeTiming,
    ) -> Self {
        Self {
            sender,
            triggers,
            timing,
            cnc_port: None,
            switch_port: None,
            state: Arc::new(RwLock::new(CalibrationState::Idle)),
            active: Arc::new(AtomicBool::new(false)),
            run: Mutex::new(None),
        }
    }

    /// Record the port names in produced height maps
    pub fn with_port_names(
        mut self,
        cnc_port: impl Into<String>,
        switch_port: impl Into<String>,
    ) -> Self {
        self.cnc_port = Some(cnc_port.into());
        self.switch_port = Some(switch_port.into());
        self
    }

    /// Current state
    pub fn state(&self) -> CalibrationState {
        *self.state.read()
    }

    /// Whether a run is probing or winding down after a stop
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Timing used for runs
    pub fn timing(&self) -> &ProbeTiming {
        &self.timing
    }

    /// Start probing a grid
    ///
    /// Allowed when no run is active; a run stops being active as soon as
    /// its terminal event is published. Must be called from within a tokio
    /// runtime.
    pub fn start(&self, params: CalibrationParams) -> Result<CalibrationEvents, CalibrationError> {
        let mut run = self.run.lock();
        if self.is_active() {
            return Err(CalibrationError::InvalidState {
                current: self.state().to_string(),
                requested: CalibrationState::Running.to_string(),
            });
        }
        params.validate()?;

        {
            let mut state = self.state.write();
            self.active.store(true, Ordering::Release);
            *state = CalibrationState::Running;
        }

        let (events, receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let probe = GridProbe {
            sender: self.sender.clone(),
            triggers: self.triggers.subscribe(),
            timing: self.timing,
            cancel: cancel.clone(),
            events: events.clone(),
        };
        let metadata = HeightMapMetadata {
            width: params.x,
            height: params.y,
            xpoints: params.xn as usize,
            ypoints: params.yn as usize,
            timestamp: None,
            switch_port: self.switch_port.clone(),
            cnc_port: self.cnc_port.clone(),
        };

        tracing::info!(
            "Starting calibration: {}x{} mm, {}x{} points, {} sample(s) per point",
            params.x,
            params.y,
            params.xn,
            params.yn,
            params.samples
        );

        let state = self.state.clone();
        let active = self.active.clone();
        let task = tokio::spawn(async move {
            let outcome = probe.run(params, metadata).await;
            finish(&state, &active, &events, outcome);
        });

        *run = Some(ActiveRun { cancel, task });
        Ok(receiver)
    }

    /// Stop the active run
    ///
    /// The run task observes the request before its next step and reports
    /// `Error(Aborted)`.
    pub fn stop(&self) -> Result<(), CalibrationError> {
        let mut state = self.state.write();
        if *state != CalibrationState::Running {
            return Err(CalibrationError::InvalidState {
                current: state.to_string(),
                requested: CalibrationState::Stopped.to_string(),
            });
        }
        *state = CalibrationState::Stopped;

        if let Some(run) = self.run.lock().as_ref() {
            run.cancel.cancel();
        }
        tracing::info!("Calibration stop requested");
        Ok(())
    }

    /// Stop any active run and wait for its task to exit
    pub async fn shutdown(&self) {
        let _ = self.stop();
        let run = self.run.lock().take();
        if let Some(run) = run {
            run.cancel.cancel();
            if let Err(e) = run.task.await {
                tracing::warn!("Calibration task ended abnormally: {}", e);
            }
        }
    }
}

fn finish(
    state: &RwLock<CalibrationState>,
    active: &AtomicBool,
    events: &mpsc::UnboundedSender<CalibrationEvent>,
    outcome: Result<HeightMap, CalibrationError>,
) {
    let outcome = {
        let mut state = state.write();
        let outcome = match (*state, outcome) {
            // A stop that arrived after the last step still wins over the map
            (CalibrationState::Stopped, Ok(_)) => Err(CalibrationError::Aborted),
            (_, outcome) => outcome,
        };
        if *state == CalibrationState::Running {
            *state = CalibrationState::Idle;
        }
        active.store(false, Ordering::Release);
        outcome
    };

    let event = match outcome {
        Ok(map) => {
            tracing::info!("Calibration finished with {} points", map.len());
            CalibrationEvent::Done(map)
        }
        Err(CalibrationError::Aborted) => {
            tracing::info!("Calibration aborted");
            CalibrationEvent::Error(CalibrationError::Aborted)
        }
        Err(e) => {
            tracing::error!("Calibration failed: {}", e);
            CalibrationEvent::Error(e)
        }
    };

    if events.send(event).is_err() {
        tracing::debug!("Calibration result dropped; no receiver");
    }
}

/// Everything the run task owns
struct GridProbe {
    sender: Arc<dyn CommandSender>,
    triggers: TriggerStream,
    timing: ProbeTiming,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<CalibrationEvent>,
}

impl GridProbe {
    async fn run(
        mut self,
        params: CalibrationParams,
        mut metadata: HeightMapMetadata,
    ) -> Result<HeightMap, CalibrationError> {
        self.command(LogicalCommand::GoToOrigin, None).await?;
        self.command(LogicalCommand::MoveRel, Some(CommandParams::new().z(params.ztrav)))
            .await?;

        let mut rows: Vec<Vec<HeightMapPoint>> = Vec::with_capacity(params.yn as usize);
        for j in 0..params.yn {
            let cy = params.row_y(j);
            let mut row = Vec::with_capacity(params.xn as usize);

            for i in 0..params.xn {
                let cx = params.column_x(i);
                let z = self.probe_point(&params, cx, cy).await?;
                // A stop that lands while the position is being read discards the point
                self.check_cancelled()?;
                let point = HeightMapPoint::new(cx, cy, z);
                tracing::info!("Probed X:{:.3} Y:{:.3} Z:{:.4}", cx, cy, z);
                row.push(point);
                let _ = self.events.send(CalibrationEvent::Point(point));
            }
            rows.push(row);

            if j + 1 == params.yn {
                self.command(
                    LogicalCommand::MoveRel,
                    Some(CommandParams::new().z(self.timing.safety_lift)),
                )
                .await?;
            } else {
                self.command(LogicalCommand::MoveAbs, Some(CommandParams::new().z(params.ztrav)))
                    .await?;
                self.command(
                    LogicalCommand::MoveAbs,
                    Some(CommandParams::new().y(params.row_y(j + 1))),
                )
                .await?;
            }
        }
        self.check_cancelled()?;

        metadata.timestamp = Some(chrono::Utc::now());
        Ok(HeightMap::new(metadata, rows.into_iter().flatten().collect()))
    }

    /// Measure one grid point, averaging over the configured samples
    async fn probe_point(
        &mut self,
        params: &CalibrationParams,
        x: f64,
        y: f64,
    ) -> Result<f64, CalibrationError> {
        let step_down = CommandParams::new().z(-params.zstep.abs());
        let mut total = 0.0;

        for _ in 0..params.samples {
            self.command(LogicalCommand::MoveAbs, Some(CommandParams::new().z(params.ztrav)))
                .await?;
            self.command(LogicalCommand::MoveAbs, Some(CommandParams::new().x(x).y(y)))
                .await?;
            self.pause(self.timing.settle_delay).await?;
            self.take_triggers()?;

            let mut steps = 0u32;
            loop {
                if let Some(max) = self.timing.max_probe_steps {
                    if steps >= max {
                        return Err(CalibrationError::ProbeNotTriggered { x, y, steps });
                    }
                }
                self.command(LogicalCommand::MoveRel, Some(step_down)).await?;
                steps += 1;
                self.pause(self.timing.step_delay).await?;
                if self.take_triggers()? {
                    break;
                }
            }

            let response = self.command(LogicalCommand::GetPosition, None).await?;
            let z = parse_position(&response)?.z;
            tracing::debug!("Touch at ({:.3}, {:.3}) after {} steps: Z {}", x, y, steps, z);
            total += z;
        }

        Ok(total / params.samples as f64)
    }

    async fn command(
        &self,
        cmd: LogicalCommand,
        params: Option<CommandParams>,
    ) -> Result<String, CalibrationError> {
        self.check_cancelled()?;
        Ok(self.sender.send(cmd, params).await?)
    }

    async fn pause(&self, delay: Duration) -> Result<(), CalibrationError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(CalibrationError::Aborted),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Consume the trigger latch, reporting whether it was set
    fn take_triggers(&mut self) -> Result<bool, CalibrationError> {
        match self.triggers.drain() {
            Ok(edges) => Ok(edges > 0),
            Err(_) => Err(CalibrationError::SignalLost),
        }
    }

    fn check_cancelled(&self) -> Result<(), CalibrationError> {
        if self.cancel.is_cancelled() {
            return Err(CalibrationError::Aborted);
        }
        Ok(())
    }
}
