//! The two-state soft AP machine.  All mutable manager state lives in [ApContext], owned by
//! the run loop; states are stateless dispatch units over it.

use std::collections::{HashSet, VecDeque};
use std::sync::mpsc::SyncSender;
use log::{debug, error, info, warn};
use common_lib::event_state_machine::{EventState, StateArgs};
use crate::ap_state::{ApRole, ApState, BlockReason, ChannelBandwidth, FailureReason, RoleError, SoftApInfo};
use crate::capability::{FEATURE_CLIENT_FORCE_DISCONNECT, SoftApCapability};
use crate::command::ApCommand;
use crate::config::{ApBand, band_for_frequency, change_requires_restart, SecurityType, SoftApConfiguration, TargetMode};
use crate::config_resolver::randomize_bssid_if_unset;
use crate::config_store::ApConfigStore;
use crate::driver::ApDriver;
use crate::events::{BroadcastSender, SoftApEvent, StateChangeBroadcast};
use crate::mac_address::MacAddress;
use crate::metrics::ApMetrics;
use crate::roster::{Admission, AdmissionPolicy, ClientRoster, effective_max_clients, WifiClient};
use crate::shutdown_timer::ShutdownTimer;
use crate::startup;

const TRANSITION_LOG_LEN: usize = 32;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum ApStateKind {
  Idle,
  Started,
}

pub(crate) struct ApContext {
  pub driver: Box<dyn ApDriver>,
  pub config_store: Box<dyn ApConfigStore>,
  pub metrics: Box<dyn ApMetrics>,
  pub events: BroadcastSender<SoftApEvent>,
  pub country_code: String,
  pub target_mode: TargetMode,
  pub config: SoftApConfiguration,
  pub capability: SoftApCapability,
  pub is_randomized_bssid: bool,
  pub blocked_clients: HashSet<MacAddress>,
  pub allowed_clients: HashSet<MacAddress>,
  pub timeout_enabled: bool,
  pub roster: ClientRoster,
  pub num_associated_stations: usize,
  pub ap_iface: Option<String>,
  pub data_iface: Option<String>,
  pub iface_up: bool,
  pub iface_destroyed: bool,
  pub dual_ifaces: [Option<String>; 2],
  pub dual_ifaces_destroyed: bool,
  pub soft_ap_info: SoftApInfo,
  pub start_failure_desc: Option<String>,
  pub start_timestamp: Option<String>,
  pub role: ApRole,
  pub shutdown_timer: ShutdownTimer,
  pub mailbox_tx: SyncSender<ApCommand>,
  pub self_queue: VecDeque<ApCommand>,
  pub transition_log: VecDeque<String>,
  pub quit: bool,
}

impl ApContext {
  /// Publishes a state change on both callback surfaces: the bare state callback and the
  /// full broadcast payload.  Failure details ride along only on [ApState::Failed].
  pub fn update_ap_state(&mut self, new_state: ApState, prev_state: ApState, reason: Option<FailureReason>) {
    let failure_reason = if new_state == ApState::Failed { reason } else { None };
    let failure_description = if new_state == ApState::Failed {
      self.start_failure_desc.clone().filter(|desc| !desc.is_empty())
    } else {
      None
    };
    self.events.send_to_all(&SoftApEvent::StateChanged { new_state, failure_reason });
    self.events.send_to_all(&SoftApEvent::StateBroadcast(StateChangeBroadcast {
      new_state,
      prev_state,
      failure_reason,
      failure_description,
      data_interface: self.data_iface.clone(),
      target_mode: self.target_mode,
    }));
    self.record_transition(format!("{prev_state:?} -> {new_state:?}"));
  }

  pub fn record_transition(&mut self, line: String) {
    if self.transition_log.len() >= TRANSITION_LOG_LEN {
      self.transition_log.pop_front();
    }
    self.transition_log.push_back(line);
  }

  pub fn set_soft_ap_info(&mut self, frequency_mhz: u32, bandwidth: ChannelBandwidth) {
    let info = SoftApInfo { frequency_mhz, bandwidth };
    if info == self.soft_ap_info {
      return;
    }
    debug!("Channel switched. Frequency: {frequency_mhz} Bandwidth: {bandwidth:?}");
    self.soft_ap_info = info;
    self.events.send_to_all(&SoftApEvent::InfoChanged(info));

    // Invalid frequencies and the reset-on-stop do not count as channel switches.
    if frequency_mhz > 0 && bandwidth != ChannelBandwidth::Invalid {
      self.metrics.record_channel_switched(&info, self.target_mode);
      if let Some(operating_band) = band_for_frequency(frequency_mhz) {
        if !self.config.band.includes(operating_band) {
          error!("Channel does not satisfy user band preference: {frequency_mhz}");
          self.metrics.record_band_preference_violation();
        }
      }
    }
  }

  pub fn on_up_changed(&mut self, is_up: bool) {
    if is_up == self.iface_up {
      return;
    }
    self.iface_up = is_up;
    if is_up {
      debug!("SoftAp is ready for use");
      self.update_ap_state(ApState::Enabled, ApState::Enabling, None);
      self.events.send_to_all(&SoftApEvent::Started);
      self.metrics.record_start_result(true, None);
      // Late subscribers get a consistent view of whoever is already connected.
      self.events.send_to_all(&SoftApEvent::ConnectedClientsChanged(self.roster.snapshot()));
      self.events.send_to_all(&SoftApEvent::StaConnected {
        mac: None,
        num_stations: self.num_associated_stations,
      });
    } else {
      // The interface was up but went down.
      self.self_queue.push_back(ApCommand::InterfaceDown);
    }
    self.metrics.record_up_changed(is_up, self.target_mode);
  }

  /// Arms the idle timer iff auto-shutdown is on and no station is visible on either
  /// accounting path; cancels it otherwise.
  pub fn reschedule_timeout(&mut self) {
    if !self.timeout_enabled || !self.roster.is_empty() || self.num_associated_stations != 0 {
      self.shutdown_timer.cancel();
      return;
    }
    let timeout = if self.config.shutdown_timeout.is_zero() {
      self.config_store.default_shutdown_timeout()
    } else {
      self.config.shutdown_timeout
    };
    self.shutdown_timer.schedule(timeout);
  }

  pub fn admission_policy(&self) -> AdmissionPolicy {
    AdmissionPolicy {
      force_disconnect_supported: self.capability.is_feature_supported(FEATURE_CLIENT_FORCE_DISCONNECT),
      client_control_by_user: self.config.client_control_by_user,
      effective_max_clients: effective_max_clients(&self.capability, &self.config),
    }
  }

  pub fn update_connected_clients(&mut self, client: WifiClient, connected: bool) {
    let is_member = self.roster.contains(&client);
    if is_member == connected {
      error!("Drop client connection event, client {client} connected={connected}, \
          duplicate event or client is blocked");
      return;
    }
    if connected {
      let admission = self.admission_policy()
          .evaluate(&self.roster, &self.allowed_clients, &self.blocked_clients, &client);
      match admission {
        Admission::Admit => {
          self.roster.insert(client);
        }
        Admission::Reject { reason: reason @ BlockReason::BlockedByUser, notify } => {
          if notify {
            self.events.send_to_all(&SoftApEvent::BlockedClientConnecting { client, reason });
          }
          debug!("Force disconnect for unauthorized client: {client}");
          self.force_client_disconnect(client.mac, reason);
          return;
        }
        Admission::Reject { reason: reason @ BlockReason::NoMoreStas, notify } => {
          info!("No more room for new client: {client}");
          self.force_client_disconnect(client.mac, reason);
          if notify {
            self.events.send_to_all(&SoftApEvent::BlockedClientConnecting { client, reason });
          }
          return;
        }
      }
    } else {
      self.roster.remove(&client);
    }

    debug!("The connected wifi stations have changed, count: {}", self.roster.len());
    self.events.send_to_all(&SoftApEvent::ConnectedClientsChanged(self.roster.snapshot()));
    self.metrics.record_num_associated_stations(self.roster.len(), self.target_mode);
    self.reschedule_timeout();
  }

  /// Ejects clients that no longer fit the configuration or capability.  Only the driver
  /// disconnects are issued here; the roster shrinks when the driver confirms through the
  /// usual disconnect events.
  pub fn update_client_connection(&mut self) {
    let policy = self.admission_policy();
    let targets = policy.reconcile_targets(&self.roster, &self.allowed_clients);
    for (client, reason) in targets {
      debug!("Force disconnect for client {client} after config change: {reason:?}");
      self.force_client_disconnect(client.mac, reason);
    }
  }

  fn force_client_disconnect(&mut self, mac: MacAddress, reason: BlockReason) {
    let Some(iface) = self.ap_iface.clone() else {
      return;
    };
    if let Err(e) = self.driver.force_client_disconnect(&iface, mac, reason) {
      error!("Failed to force disconnect {mac}: {e}");
    }
  }

  pub fn teardown_interface(&mut self, iface: &str) {
    if let Err(e) = self.driver.teardown_interface(iface) {
      warn!("Failed to tear down {iface}: {e}");
    }
  }

  /// Tears down both radio interfaces of a dual setup, at most once per session.
  pub fn teardown_dual_ifaces(&mut self) {
    let have_duals = self.dual_ifaces.iter().any(|iface| iface.is_some());
    if self.dual_ifaces_destroyed || !(have_duals || self.config_store.dual_sap_enabled()) {
      return;
    }
    self.dual_ifaces_destroyed = true;
    for iface in self.dual_ifaces.clone().into_iter().flatten() {
      self.teardown_interface(&iface);
    }
  }

  pub fn stop_soft_ap(&mut self) {
    self.teardown_dual_ifaces();
    if let Some(iface) = self.ap_iface.clone() {
      self.teardown_interface(&iface);
    }
    info!("Soft AP is stopped");
  }

  /// Applies a configuration replacement.  An unset BSSID keeps the previously randomized
  /// MAC (so clearing is idempotent) or generates one per store policy.
  pub fn apply_config_update(&mut self, mut new_config: SoftApConfiguration) {
    if new_config.bssid.is_some() {
      self.is_randomized_bssid = false;
    } else {
      if self.is_randomized_bssid && self.config.bssid.is_some() {
        new_config.bssid = self.config.bssid;
      } else if self.config_store.randomize_bssid_enabled() {
        (new_config, _) = randomize_bssid_if_unset(new_config);
      }
      self.is_randomized_bssid = true;
    }
    self.blocked_clients = new_config.blocked_client_list.iter().copied().collect();
    self.allowed_clients = new_config.allowed_client_list.iter().copied().collect();
    self.timeout_enabled = new_config.auto_shutdown_enabled;
    self.config = new_config;
  }

  pub fn set_role(&mut self, role: ApRole) -> Result<(), RoleError> {
    if self.role != ApRole::Unspecified {
      return Err(RoleError::AlreadyAssigned);
    }
    if role == ApRole::Unspecified {
      return Err(RoleError::InvalidRole);
    }
    self.role = role;
    Ok(())
  }

  /// FAILED then DISABLING for a fatal error while running; the Started exit hook completes
  /// the teardown and publishes DISABLED.
  fn handle_fatal_running_error(&mut self) {
    self.update_ap_state(ApState::Failed, ApState::Enabled, Some(FailureReason::General));
    self.update_ap_state(ApState::Disabling, ApState::Failed, None);
  }
}

#[derive(Default, Debug)]
pub(crate) struct IdleState;

impl EventState for IdleState {
  type Kind = ApStateKind;
  type Context = ApContext;
  type Event = ApCommand;

  fn kind(&self) -> ApStateKind {
    ApStateKind::Idle
  }

  fn enter(&self, context: &mut ApContext) {
    context.ap_iface = None;
    context.data_iface = None;
    context.iface_up = false;
    context.iface_destroyed = false;
    context.dual_ifaces = [None, None];
    context.dual_ifaces_destroyed = false;
  }

  fn handle_event(&self, args: &mut StateArgs<ApStateKind, ApContext, ApCommand>, event: ApCommand) {
    match event {
      ApCommand::Start => {
        let context = &mut *args.context;
        let started = if context.config.band == ApBand::Any {
          startup::start_dual_band(context)
        } else if context.config.security == SecurityType::Owe {
          startup::start_owe_transition(context)
        } else {
          startup::start_single(context)
        };
        if started {
          args.sm.move_to_state(StartedState);
        } else {
          debug!("Soft AP start failed");
        }
      }
      // Nothing is running; quit without broadcast or callback.
      ApCommand::Stop => {
        args.context.quit = true;
      }
      ApCommand::UpdateCapability(capability) => {
        // Capability only changes on carrier requirements and applies to tethered mode.
        if args.context.target_mode == TargetMode::Tethered {
          args.context.capability = capability;
        }
      }
      ApCommand::UpdateConfig(new_config) => {
        debug!("Configuration changed to {new_config:?}");
        args.context.apply_config_update(new_config);
      }
      other => {
        debug!("Ignoring {other:?} while idle");
      }
    }
  }
}

#[derive(Default, Debug)]
pub(crate) struct StartedState;

impl EventState for StartedState {
  type Kind = ApStateKind;
  type Context = ApContext;
  type Event = ApCommand;

  fn kind(&self) -> ApStateKind {
    ApStateKind::Started
  }

  fn enter(&self, context: &mut ApContext) {
    context.iface_up = false;
    context.iface_destroyed = false;
    if let Some(iface) = context.ap_iface.clone() {
      let is_up = context.driver.is_interface_up(&iface);
      context.on_up_changed(is_up);
    }
    if let Some(iface) = context.data_iface.clone() {
      let is_up = context.driver.is_interface_up(&iface);
      context.on_up_changed(is_up);
    }
    debug!("Resetting connected clients on start");
    context.roster.clear();
    context.num_associated_stations = 0;
    context.reschedule_timeout();
  }

  fn exit(&self, context: &mut ApContext) {
    if !context.iface_destroyed {
      context.stop_soft_ap();
    }
    debug!("Resetting num stations on stop");
    context.num_associated_stations = 0;
    if !context.roster.is_empty() {
      context.roster.clear();
      context.events.send_to_all(&SoftApEvent::ConnectedClientsChanged(Vec::new()));
      context.metrics.record_num_associated_stations(0, context.target_mode);
    }
    context.shutdown_timer.cancel();
    // No further status events will be observed for this session.
    context.metrics.record_up_changed(false, context.target_mode);
    context.update_ap_state(ApState::Disabled, ApState::Disabling, None);
    context.ap_iface = None;
    context.data_iface = None;
    context.iface_up = false;
    context.iface_destroyed = false;
    context.role = ApRole::Unspecified;
    context.events.send_to_all(&SoftApEvent::Stopped);
    context.set_soft_ap_info(0, ChannelBandwidth::Invalid);
  }

  fn handle_event(&self, args: &mut StateArgs<ApStateKind, ApContext, ApCommand>, event: ApCommand) {
    let context = &mut *args.context;
    match event {
      ApCommand::AssociatedStationsChanged { client, connected } => {
        debug!("Associated stations changed, client: {client} connected: {connected}");
        context.update_connected_clients(client, connected);
      }
      ApCommand::ConnectedStation { mac } => {
        context.num_associated_stations += 1;
        let num_stations = context.num_associated_stations;
        context.events.send_to_all(&SoftApEvent::StaConnected { mac: Some(mac), num_stations });
        if num_stations > 0 {
          context.shutdown_timer.cancel();
        }
      }
      ApCommand::DisconnectedStation { mac } => {
        context.num_associated_stations = context.num_associated_stations.saturating_sub(1);
        let num_stations = context.num_associated_stations;
        context.events.send_to_all(&SoftApEvent::StaDisconnected { mac: Some(mac), num_stations });
        if num_stations == 0 {
          context.reschedule_timeout();
        }
      }
      ApCommand::SoftApChannelSwitched { frequency_mhz, bandwidth } => {
        context.set_soft_ap_info(frequency_mhz, bandwidth);
      }
      ApCommand::InterfaceStatusChanged { iface, is_up } => {
        if context.data_iface.as_deref() == Some(iface.as_str()) {
          context.on_up_changed(is_up);
        }
      }
      ApCommand::Start => {
        debug!("Soft AP already started, ignoring start request");
      }
      ApCommand::NoAssociatedStationsTimeout => {
        if !context.timeout_enabled {
          error!("Timeout message received while timeout is disabled. Dropping.");
          return;
        }
        if !context.roster.is_empty() || context.num_associated_stations != 0 {
          error!("Timeout message received but stations are connected. Dropping.");
          return;
        }
        info!("Timeout message received. Stopping soft AP.");
        context.events.send_to_all(&SoftApEvent::ShutdownNotification);
        context.update_ap_state(ApState::Disabling, ApState::Enabled, None);
        args.sm.move_to_state(IdleState);
      }
      ApCommand::InterfaceDestroyed { iface } => {
        if context.data_iface.as_deref() != Some(iface.as_str()) {
          return;
        }
        context.teardown_dual_ifaces();
        debug!("Interface was cleanly destroyed.");
        context.update_ap_state(ApState::Disabling, ApState::Enabled, None);
        context.iface_destroyed = true;
        args.sm.move_to_state(IdleState);
      }
      ApCommand::DualInterfaceDestroyed { iface } => {
        if context.dual_ifaces_destroyed {
          return;
        }
        debug!("Dual interface {iface} destroyed, tearing down the sibling and the bridge");
        context.dual_ifaces_destroyed = true;
        let sibling = match &context.dual_ifaces {
          [Some(first), second] if *first == iface => second.clone(),
          [first, Some(second)] if *second == iface => first.clone(),
          _ => None,
        };
        if let Some(sibling) = sibling {
          context.teardown_interface(&sibling);
        }
        if let Some(bridge) = context.ap_iface.clone() {
          context.teardown_interface(&bridge);
        }
      }
      ApCommand::Failure => {
        warn!("hostapd failure, stop and report failure");
        context.handle_fatal_running_error();
        args.sm.move_to_state(IdleState);
      }
      ApCommand::InterfaceDown => {
        warn!("interface error, stop and report failure");
        context.handle_fatal_running_error();
        args.sm.move_to_state(IdleState);
      }
      ApCommand::UpdateCapability(capability) => {
        if context.target_mode == TargetMode::Tethered {
          context.capability = capability;
          context.update_client_connection();
        }
      }
      ApCommand::UpdateConfig(new_config) => {
        let mut current = context.config.clone();
        if context.is_randomized_bssid {
          // The stored BSSID is generated, not user intent; compare as unset.
          current.bssid = None;
        }
        if change_requires_restart(&current, &new_config) {
          info!("Ignoring config update that requires an AP restart: {new_config:?}");
          return;
        }
        debug!("Configuration changed to {new_config:?}");
        let need_reschedule = context.config.shutdown_timeout != new_config.shutdown_timeout
            || context.timeout_enabled != new_config.auto_shutdown_enabled;
        context.apply_config_update(new_config);
        context.update_client_connection();
        if need_reschedule {
          context.shutdown_timer.cancel();
          context.reschedule_timeout();
        }
      }
      ApCommand::Stop => {
        let prev_state = if context.iface_up { ApState::Enabled } else { ApState::Enabling };
        context.update_ap_state(ApState::Disabling, prev_state, None);
        context.quit = true;
        args.sm.move_to_state(IdleState);
      }
      // Role and dump queries are answered by the run loop before dispatch.
      ApCommand::SetRole { .. } | ApCommand::GetRole { .. } | ApCommand::Dump { .. } => {}
    }
  }
}
