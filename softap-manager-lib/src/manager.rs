use std::collections::VecDeque;
use std::io::Write;
use std::sync::mpsc::{Receiver, sync_channel, SyncSender};
use anyhow::anyhow;
use log::{debug, info, trace, warn};
use common_lib::event_state_machine::EventStateMachine;
use crate::ap_state::{ApRole, RoleError, SoftApInfo};
use crate::capability::SoftApCapability;
use crate::command::ApCommand;
use crate::config::{SoftApConfiguration, SoftApModeConfiguration};
use crate::config_resolver::randomize_bssid_if_unset;
use crate::config_store::ApConfigStore;
use crate::driver::ApDriver;
use crate::events::{broadcast_channel, BroadcastReceiver, SoftApEvent};
use crate::fsm::{ApContext, IdleState};
use crate::metrics::ApMetrics;
use crate::roster::ClientRoster;
use crate::shutdown_timer::ShutdownTimer;

const COMMAND_QUEUE_DEPTH: usize = 32;
const EVENT_QUEUE_DEPTH: usize = 64;

/// Manages one soft AP session: owns the state machine, the driver handle, and the client
/// roster.  Construction captures the collaborators; [Self::into_runner] wires the mailbox
/// and hands back the control surface, the event stream, and the runner to spawn.
pub struct SoftApManager {
  driver: Box<dyn ApDriver>,
  config_store: Box<dyn ApConfigStore>,
  metrics: Box<dyn ApMetrics>,
  country_code: String,
  mode_config: SoftApModeConfiguration,
}

impl SoftApManager {
  pub fn new(
      driver: Box<dyn ApDriver>,
      config_store: Box<dyn ApConfigStore>,
      metrics: Box<dyn ApMetrics>,
      country_code: impl Into<String>,
      mode_config: SoftApModeConfiguration,
  ) -> Self {
    Self {
      driver,
      config_store,
      metrics,
      country_code: country_code.into(),
      mode_config,
    }
  }

  pub fn into_runner(self) -> (ControlHandle, BroadcastReceiver<SoftApEvent>, Runner) {
    let (commands_tx, commands_rx) = sync_channel(COMMAND_QUEUE_DEPTH);
    let (events_tx, events_rx) = broadcast_channel(EVENT_QUEUE_DEPTH);

    let SoftApManager { driver, config_store, metrics, country_code, mode_config } = self;
    let SoftApModeConfiguration { target_mode, config, capability } = mode_config;

    // No explicit config means the user-configured tethering defaults apply.
    let stored = config.or_else(|| config_store.ap_configuration());
    let (config, is_randomized_bssid) = match stored {
      Some(config) => {
        let unset = config.bssid.is_none();
        if unset && config_store.randomize_bssid_enabled() {
          randomize_bssid_if_unset(config)
        } else {
          (config, unset)
        }
      }
      // May still be empty; startup rejects a missing SSID.
      None => (SoftApConfiguration::default(), true),
    };

    let blocked_clients = config.blocked_client_list.iter().copied().collect();
    let allowed_clients = config.allowed_client_list.iter().copied().collect();
    let timeout_enabled = config.auto_shutdown_enabled;

    let context = ApContext {
      driver,
      config_store,
      metrics,
      events: events_tx,
      country_code,
      target_mode,
      config,
      capability,
      is_randomized_bssid,
      blocked_clients,
      allowed_clients,
      timeout_enabled,
      roster: ClientRoster::default(),
      num_associated_stations: 0,
      ap_iface: None,
      data_iface: None,
      iface_up: false,
      iface_destroyed: false,
      dual_ifaces: [None, None],
      dual_ifaces_destroyed: false,
      soft_ap_info: SoftApInfo::INVALID,
      start_failure_desc: None,
      start_timestamp: None,
      role: ApRole::Unspecified,
      shutdown_timer: ShutdownTimer::new(commands_tx.clone()),
      mailbox_tx: commands_tx.clone(),
      self_queue: VecDeque::new(),
      transition_log: VecDeque::new(),
      quit: false,
    };

    let runner = Runner {
      commands_rx,
      sm: EventStateMachine::new(context),
    };
    (ControlHandle { tx: commands_tx }, events_rx, runner)
  }
}

/// Serialized entry point to a running manager.  Methods enqueue commands onto the manager
/// mailbox; queries round-trip a reply channel so no lock ever guards manager state.
/// Dropping the handle requests a stop.
pub struct ControlHandle {
  tx: SyncSender<ApCommand>,
}

impl ControlHandle {
  pub fn start(&self) {
    self.send(ApCommand::Start);
  }

  pub fn stop(&self) {
    self.send(ApCommand::Stop);
  }

  pub fn update_capability(&self, capability: SoftApCapability) {
    self.send(ApCommand::UpdateCapability(capability));
  }

  pub fn update_configuration(&self, config: SoftApConfiguration) {
    self.send(ApCommand::UpdateConfig(config));
  }

  /// Assigns the role; allowed exactly once, to a concrete soft AP role.
  pub fn set_role(&self, role: ApRole) -> Result<(), RoleError> {
    let (reply_tx, reply_rx) = sync_channel(1);
    self.tx.send(ApCommand::SetRole { role, reply: reply_tx })
        .map_err(|_| RoleError::ManagerGone)?;
    reply_rx.recv().map_err(|_| RoleError::ManagerGone)?
  }

  pub fn get_role(&self) -> Result<ApRole, RoleError> {
    let (reply_tx, reply_rx) = sync_channel(1);
    self.tx.send(ApCommand::GetRole { reply: reply_tx })
        .map_err(|_| RoleError::ManagerGone)?;
    reply_rx.recv().map_err(|_| RoleError::ManagerGone)
  }

  /// Writes a diagnostic snapshot of the manager state.
  pub fn dump(&self, writer: &mut impl Write) -> anyhow::Result<()> {
    let (reply_tx, reply_rx) = sync_channel(1);
    self.tx.send(ApCommand::Dump { reply: reply_tx })
        .map_err(|_| anyhow!("Soft AP manager is no longer running"))?;
    let snapshot = reply_rx.recv()?;
    writer.write_all(snapshot.as_bytes())?;
    Ok(())
  }

  fn send(&self, command: ApCommand) {
    if self.tx.send(command).is_err() {
      debug!("Soft AP manager is gone, dropping command");
    }
  }
}

impl Drop for ControlHandle {
  fn drop(&mut self) {
    self.send(ApCommand::Stop);
  }
}

/// Owns all manager state and processes mailbox commands FIFO, each to completion.  Run it on
/// a dedicated thread.
pub struct Runner {
  commands_rx: Receiver<ApCommand>,
  sm: EventStateMachine<IdleState>,
}

impl Runner {
  pub fn run_loop(mut self) -> anyhow::Result<()> {
    debug!("SoftApManager run loop active...");
    self.sm.start();
    loop {
      // Commands the previous handler raised against itself run before anything new is
      // accepted from the mailbox.
      let command = match self.sm.context.self_queue.pop_front() {
        Some(command) => command,
        None if self.sm.context.quit => break,
        None => self.commands_rx.recv()?,
      };
      self.log_command(&command);
      self.dispatch(command);
    }
    info!("Soft AP manager run loop exiting");
    Ok(())
  }

  fn dispatch(&mut self, command: ApCommand) {
    match command {
      ApCommand::SetRole { role, reply } => {
        let _ = reply.try_send(self.sm.context.set_role(role));
      }
      ApCommand::GetRole { reply } => {
        let _ = reply.try_send(self.sm.context.role);
      }
      ApCommand::Dump { reply } => {
        let _ = reply.try_send(self.dump_snapshot());
      }
      command => self.sm.handle_event(command),
    }
  }

  /// Command-type specific log levels, tuned for how chatty each source is in practice.
  fn log_command(&self, command: &ApCommand) {
    match command {
      ApCommand::Start | ApCommand::Stop => info!("{command:?}"),
      ApCommand::Failure | ApCommand::InterfaceDown => warn!("{command:?}"),
      ApCommand::GetRole { .. } | ApCommand::Dump { .. } => trace!("{command:?}"),
      _ => debug!("{command:?}"),
    }
  }

  fn dump_snapshot(&self) -> String {
    use std::fmt::Write as _;

    let context = &self.sm.context;
    let mut out = String::new();
    let _ = writeln!(out, "--Dump of SoftApManager--");
    let _ = writeln!(out, "current state: {:?}", self.sm.state_kind());
    let _ = writeln!(out, "role: {:?}", context.role);
    let _ = writeln!(out, "ap interface: {:?}", context.ap_iface);
    let _ = writeln!(out, "data interface: {:?}", context.data_iface);
    let _ = writeln!(out, "interface up: {}", context.iface_up);
    let _ = writeln!(out, "country code: {:?}", context.country_code);
    let _ = writeln!(out, "target mode: {:?}", context.target_mode);
    let _ = writeln!(out, "ssid: {:?}", context.config.ssid);
    let _ = writeln!(out, "band: {:?}", context.config.band);
    let _ = writeln!(out, "hidden ssid: {}", context.config.hidden_ssid);
    let _ = writeln!(out, "bssid: {:?}", context.config.bssid.map(|mac| mac.to_string()));
    let _ = writeln!(out, "connected clients: {}", context.roster.len());
    let _ = writeln!(out, "num associated stations: {}", context.num_associated_stations);
    let _ = writeln!(out, "timeout enabled: {}", context.timeout_enabled);
    let _ = writeln!(out, "soft ap info: {:?}", context.soft_ap_info);
    let _ = writeln!(out, "start timestamp: {:?}", context.start_timestamp);
    let _ = writeln!(out, "recent transitions:");
    for line in &context.transition_log {
      let _ = writeln!(out, "  {line}");
    }
    out
  }
}
