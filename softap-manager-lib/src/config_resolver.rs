use crc::{Crc, CRC_32_ISO_HDLC};
use log::info;
use crate::capability::{FEATURE_ACS_OFFLOAD, FEATURE_CLIENT_FORCE_DISCONNECT, FEATURE_WPA3_SAE, SoftApCapability};
use crate::config::{ApBand, SecurityType, SoftApConfiguration};
use crate::mac_address::MacAddress;
use crate::startup::StartError;

const SSID_HASH: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Stable 32-bit hash of an SSID.  Rendered in decimal it is at most 10 characters, so the
/// derived `OWE_<hash>` SSID always fits the 32-octet SSID limit.
pub fn stable_ssid_hash(ssid: &str) -> u32 {
  SSID_HASH.checksum(ssid.as_bytes())
}

/// Fills an unset BSSID with a random locally-administered unicast MAC.  Returns the config
/// and whether randomization happened.
pub fn randomize_bssid_if_unset(config: SoftApConfiguration) -> (SoftApConfiguration, bool) {
  if config.bssid.is_some() {
    return (config, false);
  }
  let mac = MacAddress::random_locally_administered();
  info!("Randomized AP BSSID: {mac}");
  (config.set_bssid(Some(mac)), true)
}

/// Splits a band-ANY configuration into the two per-radio child configs of a dual-band
/// bridged AP: identical to the parent except the band is pinned per child.
pub fn dual_band_children(config: &SoftApConfiguration) -> (SoftApConfiguration, SoftApConfiguration) {
  (
    config.clone().set_band(ApBand::Band2Ghz),
    config.clone().set_band(ApBand::Band5Ghz),
  )
}

/// Derives the OWE/Open child pair for OWE transition mode.  The OWE child runs on
/// `owe_iface` under a derived hidden SSID; the open child runs on `open_iface` with the
/// original SSID and no passphrase.  Each records the other's interface as its transition
/// peer.
pub fn owe_transition_children(
    config: &SoftApConfiguration,
    owe_iface: &str,
    open_iface: &str,
) -> (SoftApConfiguration, SoftApConfiguration) {
  let base_ssid = config.ssid.as_deref().unwrap_or_default();
  let owe = config.clone()
      .set_ssid(format!("OWE_{}", stable_ssid_hash(base_ssid)))
      .set_hidden_ssid(true)
      .set_owe_transition_iface(Some(open_iface.to_owned()));
  let open = config.clone()
      .set_security(SecurityType::Open)
      .set_passphrase(None)
      .set_owe_transition_iface(Some(owe_iface.to_owned()));
  (owe, open)
}

/// Resolves the channel against driver capability.  With ACS offloaded the driver picks, so a
/// zero channel is passed through; otherwise the first supported channel for the requested
/// band is pinned.  An explicitly pinned channel is kept as-is.
pub fn update_ap_channel_config(
    config: SoftApConfiguration,
    capability: &SoftApCapability,
) -> Result<SoftApConfiguration, StartError> {
  if config.channel != 0 {
    return Ok(config);
  }
  if capability.is_feature_supported(FEATURE_ACS_OFFLOAD) {
    return Ok(config);
  }
  let candidate_bands: &[ApBand] = match config.band {
    ApBand::Any => &[ApBand::Band2Ghz, ApBand::Band5Ghz, ApBand::Band6Ghz],
    band => return pin_first_channel(config, capability, band),
  };
  for band in candidate_bands {
    if let Some(channel) = capability.supported_channels(*band).first() {
      let channel = *channel;
      return Ok(config.set_band(*band).set_channel(channel));
    }
  }
  Err(StartError::NoChannel)
}

fn pin_first_channel(
    config: SoftApConfiguration,
    capability: &SoftApCapability,
    band: ApBand,
) -> Result<SoftApConfiguration, StartError> {
  match capability.supported_channels(band).first() {
    Some(channel) => {
      let channel = *channel;
      Ok(config.set_channel(channel))
    }
    None => Err(StartError::NoChannel),
  }
}

/// Verifies that every requested feature of the configuration is backed by driver capability.
pub fn check_support_all_configuration(
    config: &SoftApConfiguration,
    capability: &SoftApCapability,
) -> bool {
  if config.max_number_of_clients > 0
      && !capability.is_feature_supported(FEATURE_CLIENT_FORCE_DISCONNECT) {
    return false;
  }
  if config.client_control_by_user
      && !capability.is_feature_supported(FEATURE_CLIENT_FORCE_DISCONNECT) {
    return false;
  }
  match config.security {
    SecurityType::Wpa3Sae | SecurityType::SaeTransition => {
      capability.is_feature_supported(FEATURE_WPA3_SAE)
    }
    _ => true,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn capability_with_channels() -> SoftApCapability {
    SoftApCapability::new(0, 10)
        .set_supported_channels(ApBand::Band2Ghz, &[1, 6, 11])
        .set_supported_channels(ApBand::Band5Ghz, &[36, 40])
  }

  #[test]
  fn test_randomize_bssid_only_when_unset() {
    let config = SoftApConfiguration::with_ssid("net");
    let (randomized, was_randomized) = randomize_bssid_if_unset(config);
    assert!(was_randomized);
    let bssid = randomized.bssid.unwrap();
    assert!(bssid.is_locally_administered());
    assert!(bssid.is_unicast());

    let (unchanged, was_randomized) = randomize_bssid_if_unset(randomized.clone());
    assert!(!was_randomized);
    assert_eq!(unchanged.bssid, randomized.bssid);
  }

  #[test]
  fn test_dual_band_children_pin_bands() {
    let config = SoftApConfiguration::with_ssid("net").set_band(ApBand::Any);
    let (low, high) = dual_band_children(&config);
    assert_eq!(low.band, ApBand::Band2Ghz);
    assert_eq!(high.band, ApBand::Band5Ghz);
    assert_eq!(low.ssid, config.ssid);
    assert_eq!(high.ssid, config.ssid);
  }

  #[test]
  fn test_owe_children_are_cross_linked() {
    let config = SoftApConfiguration::with_ssid("my-network")
        .set_security(SecurityType::Owe);
    let (owe, open) = owe_transition_children(&config, "wlan0", "wlan1");

    let expected_ssid = format!("OWE_{}", stable_ssid_hash("my-network"));
    assert!(expected_ssid.len() <= crate::config::MAX_SSID_OCTETS);
    assert_eq!(owe.ssid.as_deref(), Some(expected_ssid.as_str()));
    assert!(owe.hidden_ssid);
    assert_eq!(owe.security, SecurityType::Owe);
    assert_eq!(owe.owe_transition_iface.as_deref(), Some("wlan1"));

    assert_eq!(open.ssid.as_deref(), Some("my-network"));
    assert_eq!(open.security, SecurityType::Open);
    assert_eq!(open.passphrase, None);
    assert_eq!(open.owe_transition_iface.as_deref(), Some("wlan0"));
  }

  #[test]
  fn test_stable_ssid_hash_is_stable() {
    assert_eq!(stable_ssid_hash("my-network"), stable_ssid_hash("my-network"));
    assert_ne!(stable_ssid_hash("my-network"), stable_ssid_hash("my-network2"));
  }

  #[test]
  fn test_acs_offload_keeps_auto_channel() {
    let capability = SoftApCapability::new(FEATURE_ACS_OFFLOAD, 10);
    let config = SoftApConfiguration::with_ssid("net");
    let resolved = update_ap_channel_config(config, &capability).unwrap();
    assert_eq!(resolved.channel, 0);
  }

  #[test]
  fn test_channel_pinned_without_acs() {
    let config = SoftApConfiguration::with_ssid("net").set_band(ApBand::Band5Ghz);
    let resolved = update_ap_channel_config(config, &capability_with_channels()).unwrap();
    assert_eq!(resolved.channel, 36);
  }

  #[test]
  fn test_no_channel_when_band_has_no_candidates() {
    let config = SoftApConfiguration::with_ssid("net").set_band(ApBand::Band6Ghz);
    let result = update_ap_channel_config(config, &capability_with_channels());
    assert_eq!(result, Err(StartError::NoChannel));
  }

  #[test]
  fn test_explicit_channel_passes_through() {
    let config = SoftApConfiguration::with_ssid("net").set_channel(11);
    let resolved = update_ap_channel_config(config, &SoftApCapability::new(0, 10)).unwrap();
    assert_eq!(resolved.channel, 11);
  }

  #[test]
  fn test_client_control_needs_force_disconnect() {
    let mut config = SoftApConfiguration::with_ssid("net");
    config.client_control_by_user = true;
    assert!(!check_support_all_configuration(&config, &SoftApCapability::new(0, 10)));
    assert!(check_support_all_configuration(
        &config,
        &SoftApCapability::new(FEATURE_CLIENT_FORCE_DISCONNECT, 10)));
  }

  #[test]
  fn test_sae_needs_capability() {
    let config = SoftApConfiguration::with_ssid("net").set_security(SecurityType::Wpa3Sae);
    assert!(!check_support_all_configuration(&config, &SoftApCapability::new(0, 10)));
    assert!(check_support_all_configuration(&config, &SoftApCapability::new(FEATURE_WPA3_SAE, 10)));
  }
}
