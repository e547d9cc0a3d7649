use std::time::Duration;
use crate::config::SoftApConfiguration;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(600);

/// Seam to the persistent AP settings store.  The manager consults it for the user-configured
/// default AP configuration, the dual-SAP provisioning flag, BSSID randomization policy, and
/// the platform default idle timeout; it never writes back.
pub trait ApConfigStore: Send {
  /// User-configured tethering defaults, used when the mode configuration carries no explicit
  /// AP config.
  fn ap_configuration(&self) -> Option<SoftApConfiguration>;

  /// Whether the platform is provisioned for the dual-interface (bridged) soft AP variant.
  fn dual_sap_enabled(&self) -> bool;

  /// Whether an unset BSSID should be replaced with a randomized locally-administered MAC.
  /// When disabled, an unset BSSID falls back to the interface factory MAC at startup.
  fn randomize_bssid_enabled(&self) -> bool {
    true
  }

  /// Platform default for the idle auto-shutdown timeout, applied when the per-AP timeout is
  /// zero.
  fn default_shutdown_timeout(&self) -> Duration {
    DEFAULT_SHUTDOWN_TIMEOUT
  }
}

#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
  ap_configuration: Option<SoftApConfiguration>,
  dual_sap_enabled: bool,
  randomize_bssid: Option<bool>,
  default_shutdown_timeout: Option<Duration>,
}

impl InMemoryConfigStore {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn set_ap_configuration(mut self, config: SoftApConfiguration) -> Self {
    self.ap_configuration = Some(config);
    self
  }

  pub fn set_dual_sap_enabled(mut self, enabled: bool) -> Self {
    self.dual_sap_enabled = enabled;
    self
  }

  pub fn set_randomize_bssid(mut self, enabled: bool) -> Self {
    self.randomize_bssid = Some(enabled);
    self
  }

  pub fn set_default_shutdown_timeout(mut self, timeout: Duration) -> Self {
    self.default_shutdown_timeout = Some(timeout);
    self
  }
}

impl ApConfigStore for InMemoryConfigStore {
  fn ap_configuration(&self) -> Option<SoftApConfiguration> {
    self.ap_configuration.clone()
  }

  fn dual_sap_enabled(&self) -> bool {
    self.dual_sap_enabled
  }

  fn randomize_bssid_enabled(&self) -> bool {
    self.randomize_bssid.unwrap_or(true)
  }

  fn default_shutdown_timeout(&self) -> Duration {
    self.default_shutdown_timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT)
  }
}
