//! Machine session
//!
//! Owns the two serial links (CNC and touch-off switch) and the calibration
//! engine built on top of them. Opening a link that is already open replaces
//! it; the old connection is closed first.

use autolevel_communication::{
    CommandParams, CommandProtocol, CommandSender, LineTransport, LogicalCommand, ProbeSignal,
    ProtocolConfig, SerialTransport,
};
use autolevel_core::{ConnectionError, Result};
use autolevel_probing::{
    CalibrationEngine, CalibrationEvents, CalibrationParams, CalibrationState, ProbeTiming,
    TriggerSource,
};
use autolevel_settings::Config;
use std::sync::Arc;
use tokio::sync::Mutex;

struct CncLink {
    name: String,
    protocol: Arc<Mutex<CommandProtocol>>,
}

struct SwitchLink {
    name: String,
    signal: Arc<ProbeSignal>,
}

/// Connections and probing state for one machine
pub struct MachineSession {
    protocol_config: ProtocolConfig,
    timing: ProbeTiming,
    cnc: Option<CncLink>,
    switch: Option<SwitchLink>,
    engine: Option<CalibrationEngine>,
}

impl MachineSession {
    /// Create a session with no open links
    pub fn new(protocol_config: ProtocolConfig, timing: ProbeTiming) -> Self {
        Self {
            protocol_config,
            timing,
            cnc: None,
            switch: None,
            engine: None,
        }
    }

    /// Create a session using the configured protocol and probing settings
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.connection.protocol_config(), config.probing.timing())
    }

    /// Open the CNC serial port, replacing any open CNC link
    pub async fn open_cnc_port(&mut self, path: &str, baud_rate: u32) -> Result<()> {
        self.close_cnc().await;
        let transport = SerialTransport::open(path, baud_rate)?;
        self.attach_cnc(Box::new(transport)).await;
        Ok(())
    }

    /// Use an already open transport as the CNC link
    pub async fn attach_cnc(&mut self, transport: Box<dyn LineTransport>) {
        self.close_cnc().await;
        let name = transport.name().to_string();
        let protocol = CommandProtocol::with_config(transport, self.protocol_config);
        tracing::info!("CNC link ready on {}", name);
        self.cnc = Some(CncLink {
            name,
            protocol: Arc::new(Mutex::new(protocol)),
        });
    }

    /// Open the touch-off switch port, replacing any open switch link
    pub async fn open_switch_port(&mut self, path: &str, baud_rate: u32) -> Result<()> {
        self.close_switch().await;
        let signal = ProbeSignal::open(path, baud_rate)?;
        self.attach_switch(signal).await;
        Ok(())
    }

    /// Use an already open probe signal as the switch link
    pub async fn attach_switch(&mut self, signal: ProbeSignal) {
        self.close_switch().await;
        let name = signal.name().to_string();
        tracing::info!("Switch link ready on {}", name);
        self.switch = Some(SwitchLink {
            name,
            signal: Arc::new(signal),
        });
    }

    /// Whether the CNC link is open
    pub fn is_cnc_open(&self) -> bool {
        self.cnc.is_some()
    }

    /// Whether the switch link is open
    pub fn is_switch_open(&self) -> bool {
        self.switch.is_some()
    }

    /// Stop any run and close both links
    pub async fn close(&mut self) {
        self.close_cnc().await;
        self.close_switch().await;
    }

    /// Send one logical command and return the response line
    pub async fn send_command(
        &self,
        cmd: LogicalCommand,
        params: Option<CommandParams>,
    ) -> Result<String> {
        let cnc = self.cnc.as_ref().ok_or_else(|| not_open("CNC"))?;
        Ok(cnc.protocol.send(cmd, params).await?)
    }

    /// Start probing a grid; progress arrives on the returned receiver
    pub fn start_calibration(&mut self, params: CalibrationParams) -> Result<CalibrationEvents> {
        if self.engine.is_none() {
            let cnc = self.cnc.as_ref().ok_or_else(|| not_open("CNC"))?;
            let switch = self.switch.as_ref().ok_or_else(|| not_open("Switch"))?;

            let sender: Arc<dyn CommandSender> = cnc.protocol.clone();
            let triggers: Arc<dyn TriggerSource> = switch.signal.clone();
            let engine = CalibrationEngine::new(sender, triggers, self.timing)
                .with_port_names(cnc.name.clone(), switch.name.clone());
            self.engine = Some(engine);
        }

        match &self.engine {
            Some(engine) => Ok(engine.start(params)?),
            None => Err(not_open("CNC").into()),
        }
    }

    /// Stop the active calibration run
    pub fn stop_calibration(&self) -> Result<()> {
        match &self.engine {
            Some(engine) => Ok(engine.stop()?),
            None => Err(autolevel_core::CalibrationError::InvalidState {
                current: CalibrationState::Idle.to_string(),
                requested: CalibrationState::Stopped.to_string(),
            }
            .into()),
        }
    }

    /// State of the calibration engine
    pub fn calibration_state(&self) -> CalibrationState {
        self.engine
            .as_ref()
            .map(CalibrationEngine::state)
            .unwrap_or_default()
    }

    async fn shutdown_engine(&mut self) {
        if let Some(engine) = self.engine.take() {
            engine.shutdown().await;
        }
    }

    async fn close_cnc(&mut self) {
        self.shutdown_engine().await;
        if let Some(cnc) = self.cnc.take() {
            if let Err(e) = cnc.protocol.lock().await.close().await {
                tracing::warn!("Error closing CNC port {}: {}", cnc.name, e);
            }
        }
    }

    async fn close_switch(&mut self) {
        self.shutdown_engine().await;
        if let Some(switch) = self.switch.take() {
            switch.signal.close().await;
        }
    }
}

fn not_open(role: &str) -> ConnectionError {
    ConnectionError::NotOpen {
        role: role.to_string(),
    }
}
