//! Ordered driver-call sequences bringing a soft AP up: the single-interface path and the
//! dual-interface variants (dual-band bridge and OWE transition pair), with rollback on any
//! failure along the way.

use log::{debug, error, info, warn};
use crate::ap_state::{ApState, FailureReason};
use crate::config::{ApBand, MAX_SSID_OCTETS};
use crate::config_resolver;
use crate::demux::{HostapdEventSink, IfaceEventSink};
use crate::driver::DriverError;
use crate::events::SoftApEvent;
use crate::fsm::ApContext;

pub(crate) const FAILURE_DESC_NO_5GHZ_SUPPORT: &str =
    "5GHz band requested but the driver does not support it";

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartError {
  #[error("Driver setup or start call failed")]
  Generic,

  #[error("No usable channel for the requested band")]
  NoChannel,

  #[error("Configuration is not supported by the driver capability")]
  UnsupportedConfiguration,
}

impl StartError {
  pub fn failure_reason(&self) -> FailureReason {
    match self {
      StartError::Generic => FailureReason::General,
      StartError::NoChannel => FailureReason::NoChannel,
      StartError::UnsupportedConfiguration => FailureReason::UnsupportedConfiguration,
    }
  }
}

/// Single-interface startup.  On success the context owns a started AP interface; on failure
/// everything is rolled back and the appropriate failure states have been published.
pub(crate) fn start_single(context: &mut ApContext) -> bool {
  reset_start_state(context);
  if let Err(e) = preflight(context) {
    fail_before_interfaces(context, e.failure_reason());
    return false;
  }

  let callbacks = IfaceEventSink::for_ap_interface(context.mailbox_tx.clone());
  let iface = match context.driver.setup_interface_for_softap_mode(callbacks) {
    Ok(iface) if !iface.is_empty() => iface,
    Ok(_) => {
      error!("Setup returned an empty ap interface name");
      fail_before_interfaces(context, FailureReason::General);
      return false;
    }
    Err(e) => {
      error!("Setup failure when creating ap interface: {e}");
      fail_before_interfaces(context, FailureReason::General);
      return false;
    }
  };
  context.ap_iface = Some(iface);
  context.data_iface = resolve_data_interface(context);

  context.events.send_to_all(&SoftApEvent::ShutdownNotificationCleared);
  context.update_ap_state(ApState::Enabling, ApState::Disabled, None);

  match start_soft_ap(context) {
    Ok(()) => true,
    Err(e) => {
      rollback_after_interfaces(context, e.failure_reason());
      false
    }
  }
}

/// Dual-band startup: two radio interfaces and a bridge, the 2GHz child started first, then
/// the 5GHz child, then the bridge brought up.
pub(crate) fn start_dual_band(context: &mut ApContext) -> bool {
  reset_start_state(context);
  if let Err(e) = preflight(context) {
    fail_before_interfaces(context, e.failure_reason());
    return false;
  }
  if !setup_dual_interfaces(context) {
    return false;
  }
  let (config_2ghz, config_5ghz) = config_resolver::dual_band_children(&context.config);
  run_dual_startup(context, config_2ghz, config_5ghz)
}

/// OWE transition startup: same topology as dual-band, children are the OWE/Open pair.
pub(crate) fn start_owe_transition(context: &mut ApContext) -> bool {
  reset_start_state(context);
  if let Err(e) = preflight(context) {
    fail_before_interfaces(context, e.failure_reason());
    return false;
  }
  if !setup_dual_interfaces(context) {
    return false;
  }
  let (Some(first), Some(second)) = (context.dual_ifaces[0].clone(), context.dual_ifaces[1].clone()) else {
    return false;
  };
  let (owe_config, open_config) =
      config_resolver::owe_transition_children(&context.config, &first, &second);
  info!("Generated OWE SSID: {:?}", owe_config.ssid);
  run_dual_startup(context, owe_config, open_config)
}

/// Steps shared by every path once an AP interface exists: MAC, country code, band support,
/// channel resolution, capability check, and the actual hostapd start.
pub(crate) fn start_soft_ap(context: &mut ApContext) -> Result<(), StartError> {
  let iface = context.ap_iface.clone().ok_or(StartError::Generic)?;
  debug!("band {:?} iface {iface} country {:?}", context.config.band, context.country_code);

  set_mac_address(context, &iface)?;
  set_country_code(context, &iface)?;

  if context.config.band == ApBand::Band5Ghz && !context.driver.is_5ghz_band_supported() {
    context.start_failure_desc = Some(FAILURE_DESC_NO_5GHZ_SUPPORT.to_owned());
    error!("Failed to start soft AP as 5GHz band not supported");
    return Err(StartError::NoChannel);
  }
  context.start_failure_desc = None;

  let resolved = config_resolver::update_ap_channel_config(context.config.clone(), &context.capability)
      .map_err(|e| {
        error!("Failed to update AP band and channel");
        e
      })?;

  if resolved.hidden_ssid {
    debug!("SoftAP is a hidden network");
  }

  if !config_resolver::check_support_all_configuration(&resolved, &context.capability) {
    error!("Unsupported configuration detected: {resolved:?}");
    return Err(StartError::UnsupportedConfiguration);
  }

  let listener = HostapdEventSink::new(context.mailbox_tx.clone());
  if let Err(e) = context.driver.start_soft_ap(&iface, &resolved, listener) {
    error!("Soft AP start failed: {e}");
    return Err(StartError::Generic);
  }

  context.start_timestamp = Some(chrono::Local::now().format("%m-%d %H:%M:%S%.3f").to_string());
  debug!("Soft AP is started");
  Ok(())
}

fn reset_start_state(context: &mut ApContext) {
  context.start_failure_desc = None;
  context.dual_ifaces = [None, None];
  context.dual_ifaces_destroyed = false;
}

/// Pure validation ahead of any interface creation, so these failures publish a single FAILED
/// with nothing to tear down.
fn preflight(context: &ApContext) -> Result<(), StartError> {
  match context.config.ssid.as_deref() {
    None => {
      error!("Unable to start soft AP without an SSID");
      return Err(StartError::UnsupportedConfiguration);
    }
    Some(ssid) if ssid.is_empty() || ssid.len() > MAX_SSID_OCTETS => {
      error!("Unable to start soft AP with an SSID of {} octets", ssid.len());
      return Err(StartError::UnsupportedConfiguration);
    }
    Some(_) => {}
  }
  if context.config.band == ApBand::Band5Ghz && context.country_code.trim().is_empty() {
    error!("Invalid country code, required for setting up soft ap in 5GHz");
    return Err(StartError::Generic);
  }
  Ok(())
}

fn set_mac_address(context: &mut ApContext, iface: &str) -> Result<(), StartError> {
  match context.config.bssid {
    None => {
      // No BSSID was requested, so (re-)configure the factory MAC.  Some drivers cannot set
      // the MAC at all; a failed reset is tolerated.
      let mac = context.driver.get_factory_mac_address(iface).ok_or_else(|| {
        error!("Failed to get factory MAC address");
        StartError::Generic
      })?;
      if let Err(e) = context.driver.set_mac_address(iface, mac) {
        warn!("Failed to reset to factory MAC address, continuing with current MAC: {e}");
      }
    }
    Some(mac) => {
      // An explicitly requested MAC makes driver support mandatory.
      if let Err(e) = context.driver.set_mac_address(iface, mac) {
        error!("Failed to set explicitly requested MAC address: {e}");
        return Err(StartError::Generic);
      }
    }
  }
  Ok(())
}

fn set_country_code(context: &mut ApContext, iface: &str) -> Result<(), StartError> {
  let band = context.config.band;
  if context.country_code.trim().is_empty() {
    if band == ApBand::Band5Ghz {
      error!("Invalid country code, required for setting up soft ap in 5GHz");
      return Err(StartError::Generic);
    }
    // Absence of a country code is not fatal for the other band options.
    return Ok(());
  }
  let country_code = context.country_code.to_uppercase();
  if let Err(e) = context.driver.set_country_code(iface, &country_code) {
    if band == ApBand::Band5Ghz {
      error!("Failed to set country code, required for setting up soft ap in 5GHz: {e}");
      return Err(StartError::Generic);
    }
    // Failure to apply the country code is tolerated off the 5GHz band.
  }
  Ok(())
}

fn setup_dual_interfaces(context: &mut ApContext) -> bool {
  let first = non_empty(context.driver.setup_interface_for_softap_mode(
      IfaceEventSink::for_dual_radio(context.mailbox_tx.clone())));
  let second = non_empty(context.driver.setup_interface_for_softap_mode(
      IfaceEventSink::for_dual_radio(context.mailbox_tx.clone())));
  let bridge = non_empty(context.driver.setup_interface_for_bridge_mode(
      IfaceEventSink::for_ap_interface(context.mailbox_tx.clone())));

  let complete = first.is_some() && second.is_some() && bridge.is_some();
  context.dual_ifaces = [first, second];
  context.ap_iface = bridge;

  if !complete {
    error!("Setup failure when creating dual ap interfaces");
    context.stop_soft_ap();
    fail_before_interfaces(context, FailureReason::General);
    return false;
  }
  context.data_iface = resolve_data_interface(context);
  context.update_ap_state(ApState::Enabling, ApState::Disabled, None);
  true
}

fn run_dual_startup(
    context: &mut ApContext,
    first_config: crate::config::SoftApConfiguration,
    second_config: crate::config::SoftApConfiguration,
) -> bool {
  let bridge = context.ap_iface.clone();
  let parent_config = context.config.clone();

  context.ap_iface = context.dual_ifaces[0].clone();
  context.config = first_config;
  let mut result = start_soft_ap(context);
  if result.is_ok() {
    context.ap_iface = context.dual_ifaces[1].clone();
    context.config = second_config;
    result = start_soft_ap(context);
  }
  // The bridge is the manager-visible interface; the children only borrowed the slot while
  // their radio was started.
  context.ap_iface = bridge;
  context.config = parent_config;

  match result {
    Err(e) => {
      rollback_after_interfaces(context, e.failure_reason());
      false
    }
    Ok(()) => {
      let Some(bridge) = context.ap_iface.clone() else {
        return false;
      };
      if let Err(e) = context.driver.set_hostapd_params(&format!("softap bridge up {bridge}")) {
        error!("Failed to bring up bridge interface {bridge}: {e}");
        rollback_after_interfaces(context, FailureReason::General);
        return false;
      }
      true
    }
  }
}

fn resolve_data_interface(context: &mut ApContext) -> Option<String> {
  context.driver.fst_data_interface_name()
      .filter(|name| !name.is_empty())
      .or_else(|| context.ap_iface.clone())
}

/// Start failed with no interface created: a single FAILED publication.
fn fail_before_interfaces(context: &mut ApContext, reason: FailureReason) {
  context.update_ap_state(ApState::Failed, ApState::Disabled, Some(reason));
  context.metrics.record_start_result(false, Some(reason));
  context.events.send_to_all(&SoftApEvent::StartFailure);
}

/// Start failed after interfaces were created: FAILED, then a full DISABLING -> DISABLED
/// teardown of everything created so far.
fn rollback_after_interfaces(context: &mut ApContext, reason: FailureReason) {
  context.update_ap_state(ApState::Failed, ApState::Enabling, Some(reason));
  context.update_ap_state(ApState::Disabling, ApState::Failed, None);
  context.stop_soft_ap();
  context.update_ap_state(ApState::Disabled, ApState::Disabling, None);
  context.metrics.record_start_result(false, Some(reason));
  context.events.send_to_all(&SoftApEvent::StartFailure);
}

fn non_empty(result: Result<String, DriverError>) -> Option<String> {
  match result {
    Ok(name) if !name.is_empty() => Some(name),
    Ok(_) => None,
    Err(e) => {
      warn!("Interface setup failed: {e}");
      None
    }
  }
}
