use crate::ap_state::BlockReason;
use crate::config::SoftApConfiguration;
use crate::demux::{HostapdEventSink, IfaceEventSink};
use crate::mac_address::MacAddress;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
  #[error("Driver rejected the call: {0}")]
  CallFailed(String),

  #[error("Operation not supported by this driver")]
  NotSupported,
}

/// The native hostapd/nl80211 adapter consumed by the manager.  Calls are synchronous from
/// the manager loop's perspective; asynchronous driver activity comes back through the sinks
/// registered at interface setup and AP start.  Interfaces created through this trait are
/// owned by the manager until torn down or until the driver reports them destroyed.
pub trait ApDriver: Send {
  /// Creates an AP-mode interface and returns its name.
  fn setup_interface_for_softap_mode(&mut self, callbacks: IfaceEventSink) -> Result<String, DriverError>;

  /// Creates the bridge interface joining the two radio interfaces of a dual setup.
  fn setup_interface_for_bridge_mode(&mut self, callbacks: IfaceEventSink) -> Result<String, DriverError>;

  fn teardown_interface(&mut self, iface: &str) -> Result<(), DriverError>;

  /// Starts hostapd on `iface` with the fully resolved configuration.  `listener` receives
  /// hostapd-level events for the lifetime of the AP.
  fn start_soft_ap(
      &mut self,
      iface: &str,
      config: &SoftApConfiguration,
      listener: HostapdEventSink,
  ) -> Result<(), DriverError>;

  fn set_mac_address(&mut self, iface: &str, mac: MacAddress) -> Result<(), DriverError>;

  /// Factory-programmed MAC of the interface, when the driver can read it.
  fn get_factory_mac_address(&mut self, iface: &str) -> Option<MacAddress>;

  fn set_country_code(&mut self, iface: &str, country_code: &str) -> Result<(), DriverError>;

  fn is_5ghz_band_supported(&mut self) -> bool;

  fn is_interface_up(&mut self, iface: &str) -> bool;

  fn force_client_disconnect(
      &mut self,
      iface: &str,
      mac: MacAddress,
      reason: BlockReason,
  ) -> Result<(), DriverError>;

  /// Issues a raw hostapd control command (e.g. bringing the dual-SAP bridge up).
  fn set_hostapd_params(&mut self, cmd: &str) -> Result<(), DriverError>;

  /// Name of the FST data interface when the platform uses one; the AP interface doubles as
  /// the data interface otherwise.
  fn fst_data_interface_name(&mut self) -> Option<String>;
}
