use std::time::Duration;
use crate::mac_address::MacAddress;

/// Radio band selection for an AP configuration.  [ApBand::Any] requests the dual-band
/// bridged topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApBand {
  Band2Ghz,
  Band5Ghz,
  Band6Ghz,
  Any,
}

impl ApBand {
  /// True when an AP configured for `self` is allowed to operate on `band`.
  pub fn includes(&self, band: ApBand) -> bool {
    *self == ApBand::Any || *self == band
  }
}

/// Classifies an operating frequency into its band.
pub fn band_for_frequency(frequency_mhz: u32) -> Option<ApBand> {
  match frequency_mhz {
    2412..=2484 => Some(ApBand::Band2Ghz),
    5160..=5885 => Some(ApBand::Band5Ghz),
    5925..=7125 => Some(ApBand::Band6Ghz),
    _ => None,
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityType {
  Open,
  Wpa2Psk,
  Wpa3Sae,
  SaeTransition,
  Owe,
}

/// Whether the AP instance provides upstream sharing or a local-only network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMode {
  Tethered,
  LocalOnly,
}

pub const MAX_SSID_OCTETS: usize = 32;

/// User-facing AP configuration.  `channel` of zero requests automatic channel selection;
/// zero `shutdown_timeout` defers to the platform default; zero `max_number_of_clients`
/// defers to the driver capability.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftApConfiguration {
  pub ssid: Option<String>,
  pub passphrase: Option<String>,
  pub security: SecurityType,
  pub band: ApBand,
  pub channel: u32,
  pub hidden_ssid: bool,
  pub bssid: Option<MacAddress>,
  pub auto_shutdown_enabled: bool,
  pub shutdown_timeout: Duration,
  pub max_number_of_clients: usize,
  pub client_control_by_user: bool,
  pub blocked_client_list: Vec<MacAddress>,
  pub allowed_client_list: Vec<MacAddress>,
  pub owe_transition_iface: Option<String>,
}

impl Default for SoftApConfiguration {
  fn default() -> Self {
    Self {
      ssid: None,
      passphrase: None,
      security: SecurityType::Open,
      band: ApBand::Band2Ghz,
      channel: 0,
      hidden_ssid: false,
      bssid: None,
      auto_shutdown_enabled: false,
      shutdown_timeout: Duration::ZERO,
      max_number_of_clients: 0,
      client_control_by_user: false,
      blocked_client_list: Vec::new(),
      allowed_client_list: Vec::new(),
      owe_transition_iface: None,
    }
  }
}

impl SoftApConfiguration {
  pub fn with_ssid(ssid: &str) -> Self {
    Self {
      ssid: Some(ssid.to_owned()),
      ..Default::default()
    }
  }

  pub fn set_ssid(mut self, ssid: impl Into<String>) -> Self {
    self.ssid = Some(ssid.into());
    self
  }

  pub fn set_band(mut self, band: ApBand) -> Self {
    self.band = band;
    self
  }

  pub fn set_channel(mut self, channel: u32) -> Self {
    self.channel = channel;
    self
  }

  pub fn set_hidden_ssid(mut self, hidden: bool) -> Self {
    self.hidden_ssid = hidden;
    self
  }

  pub fn set_bssid(mut self, bssid: Option<MacAddress>) -> Self {
    self.bssid = bssid;
    self
  }

  pub fn set_security(mut self, security: SecurityType) -> Self {
    self.security = security;
    self
  }

  pub fn set_passphrase(mut self, passphrase: Option<String>) -> Self {
    self.passphrase = passphrase;
    self
  }

  pub fn set_auto_shutdown(mut self, enabled: bool, timeout: Duration) -> Self {
    self.auto_shutdown_enabled = enabled;
    self.shutdown_timeout = timeout;
    self
  }

  pub fn set_owe_transition_iface(mut self, iface: Option<String>) -> Self {
    self.owe_transition_iface = iface;
    self
  }
}

/// True when moving from `current` to `new` cannot be applied to a running AP and requires a
/// full stop/start cycle.  Client lists, limits and shutdown behavior are applied live;
/// anything affecting the beacon or the radio is not.
pub fn change_requires_restart(current: &SoftApConfiguration, new: &SoftApConfiguration) -> bool {
  current.ssid != new.ssid
      || current.passphrase != new.passphrase
      || current.security != new.security
      || current.band != new.band
      || current.channel != new.channel
      || current.hidden_ssid != new.hidden_ssid
      || current.bssid != new.bssid
}

/// Bundles the caller-requested mode with the configuration and capability snapshot the
/// manager is constructed against.  A `None` configuration falls back to the config store's
/// user-configured default.
#[derive(Debug, Clone)]
pub struct SoftApModeConfiguration {
  pub target_mode: TargetMode,
  pub config: Option<SoftApConfiguration>,
  pub capability: crate::capability::SoftApCapability,
}
