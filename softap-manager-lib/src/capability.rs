use crate::config::ApBand;

pub const FEATURE_ACS_OFFLOAD: u32 = 1 << 0;
pub const FEATURE_CLIENT_FORCE_DISCONNECT: u32 = 1 << 1;
pub const FEATURE_WPA3_SAE: u32 = 1 << 2;

/// Driver-advertised soft AP capability: supported feature bits, the station limit, and the
/// usable channel list per band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftApCapability {
  features: u32,
  pub max_supported_clients: usize,
  channels_2ghz: Vec<u32>,
  channels_5ghz: Vec<u32>,
  channels_6ghz: Vec<u32>,
}

impl SoftApCapability {
  pub fn new(features: u32, max_supported_clients: usize) -> Self {
    Self {
      features,
      max_supported_clients,
      channels_2ghz: Vec::new(),
      channels_5ghz: Vec::new(),
      channels_6ghz: Vec::new(),
    }
  }

  pub fn set_supported_channels(mut self, band: ApBand, channels: &[u32]) -> Self {
    match band {
      ApBand::Band2Ghz => self.channels_2ghz = channels.to_vec(),
      ApBand::Band5Ghz => self.channels_5ghz = channels.to_vec(),
      ApBand::Band6Ghz => self.channels_6ghz = channels.to_vec(),
      ApBand::Any => {}
    }
    self
  }

  pub fn is_feature_supported(&self, feature: u32) -> bool {
    self.features & feature == feature
  }

  /// Channels usable on a concrete band.  [ApBand::Any] has no channel list of its own.
  pub fn supported_channels(&self, band: ApBand) -> &[u32] {
    match band {
      ApBand::Band2Ghz => &self.channels_2ghz,
      ApBand::Band5Ghz => &self.channels_5ghz,
      ApBand::Band6Ghz => &self.channels_6ghz,
      ApBand::Any => &[],
    }
  }
}
