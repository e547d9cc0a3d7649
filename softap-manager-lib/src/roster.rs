use std::collections::HashSet;
use std::fmt;
use crate::ap_state::BlockReason;
use crate::capability::SoftApCapability;
use crate::config::SoftApConfiguration;
use crate::mac_address::MacAddress;

/// A station associated (or trying to associate) with the AP.  Identity is the MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WifiClient {
  pub mac: MacAddress,
}

impl WifiClient {
  pub fn new(mac: MacAddress) -> Self {
    Self { mac }
  }
}

impl fmt::Display for WifiClient {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.mac)
  }
}

/// Connected-station set.  Insertion order is preserved because the callback surface observes
/// it; membership is unique by MAC.
#[derive(Debug, Default)]
pub struct ClientRoster {
  clients: Vec<WifiClient>,
}

impl ClientRoster {
  pub fn contains(&self, client: &WifiClient) -> bool {
    self.clients.iter().any(|c| c.mac == client.mac)
  }

  /// Adds a client; refuses duplicates by MAC.
  pub fn insert(&mut self, client: WifiClient) -> bool {
    if self.contains(&client) {
      return false;
    }
    self.clients.push(client);
    true
  }

  pub fn remove(&mut self, client: &WifiClient) -> bool {
    let before = self.clients.len();
    self.clients.retain(|c| c.mac != client.mac);
    self.clients.len() != before
  }

  pub fn clear(&mut self) {
    self.clients.clear();
  }

  pub fn len(&self) -> usize {
    self.clients.len()
  }

  pub fn is_empty(&self) -> bool {
    self.clients.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &WifiClient> {
    self.clients.iter()
  }

  pub fn snapshot(&self) -> Vec<WifiClient> {
    self.clients.clone()
  }
}

/// Outcome of evaluating a station against the admission policy.  `notify` controls whether a
/// blocked-client callback accompanies the rejection; stations already on the user's block
/// list are dropped silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
  Admit,
  Reject {
    reason: BlockReason,
    notify: bool,
  },
}

/// Capability- and config-derived admission rules, captured as plain data so decisions stay
/// pure and unit-testable.  Without driver-side force disconnect there is no way to act on a
/// rejection, so everything is admitted.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionPolicy {
  pub force_disconnect_supported: bool,
  pub client_control_by_user: bool,
  pub effective_max_clients: usize,
}

impl AdmissionPolicy {
  pub fn evaluate(
      &self,
      roster: &ClientRoster,
      allowed: &HashSet<MacAddress>,
      blocked: &HashSet<MacAddress>,
      client: &WifiClient,
  ) -> Admission {
    if !self.force_disconnect_supported {
      return Admission::Admit;
    }
    if self.client_control_by_user && !allowed.contains(&client.mac) {
      return Admission::Reject {
        reason: BlockReason::BlockedByUser,
        notify: !blocked.contains(&client.mac),
      };
    }
    if roster.len() >= self.effective_max_clients {
      return Admission::Reject {
        reason: BlockReason::NoMoreStas,
        notify: true,
      };
    }
    Admission::Admit
  }

  /// Computes which connected clients must be ejected after a config or capability change:
  /// every client off the allow list (when user control is enabled), then the tail of the
  /// remaining clients until the roster fits the effective limit.  The caller issues the
  /// driver disconnects; the roster itself only shrinks once the driver confirms.
  pub fn reconcile_targets(
      &self,
      roster: &ClientRoster,
      allowed: &HashSet<MacAddress>,
  ) -> Vec<(WifiClient, BlockReason)> {
    if !self.force_disconnect_supported {
      return Vec::new();
    }
    let mut targets = Vec::new();
    let mut allowed_connected = Vec::new();
    if self.client_control_by_user {
      for client in roster.iter() {
        if allowed.contains(&client.mac) {
          allowed_connected.push(*client);
        } else {
          targets.push((*client, BlockReason::BlockedByUser));
        }
      }
    } else {
      allowed_connected = roster.snapshot();
    }
    let mut over_cap = allowed_connected.len().saturating_sub(self.effective_max_clients);
    for client in allowed_connected.iter().rev() {
      if over_cap == 0 {
        break;
      }
      targets.push((*client, BlockReason::NoMoreStas));
      over_cap -= 1;
    }
    targets
  }
}

/// The lower of the capability-advertised and user-configured client limits; a zero config
/// limit means capability-only.
pub fn effective_max_clients(capability: &SoftApCapability, config: &SoftApConfiguration) -> usize {
  let mut max = capability.max_supported_clients;
  if config.max_number_of_clients > 0 {
    max = max.min(config.max_number_of_clients);
  }
  max
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::capability::FEATURE_CLIENT_FORCE_DISCONNECT;

  fn client(last_octet: u8) -> WifiClient {
    WifiClient::new(MacAddress::new([0x02, 0, 0, 0, 0, last_octet]))
  }

  fn policy(max: usize) -> AdmissionPolicy {
    AdmissionPolicy {
      force_disconnect_supported: true,
      client_control_by_user: false,
      effective_max_clients: max,
    }
  }

  #[test]
  fn test_roster_rejects_duplicate_mac() {
    let mut roster = ClientRoster::default();
    assert!(roster.insert(client(1)));
    assert!(!roster.insert(client(1)));
    assert_eq!(roster.len(), 1);
  }

  #[test]
  fn test_roster_preserves_insertion_order() {
    let mut roster = ClientRoster::default();
    roster.insert(client(3));
    roster.insert(client(1));
    roster.insert(client(2));
    assert_eq!(roster.snapshot(), vec![client(3), client(1), client(2)]);
  }

  #[test]
  fn test_admit_when_force_disconnect_unsupported() {
    let roster = ClientRoster::default();
    let policy = AdmissionPolicy {
      force_disconnect_supported: false,
      client_control_by_user: true,
      effective_max_clients: 0,
    };
    let admission = policy.evaluate(&roster, &HashSet::new(), &HashSet::new(), &client(1));
    assert_eq!(admission, Admission::Admit);
  }

  #[test]
  fn test_unauthorized_client_rejected_with_notify() {
    let roster = ClientRoster::default();
    let policy = AdmissionPolicy {
      client_control_by_user: true,
      ..policy(10)
    };
    let admission = policy.evaluate(&roster, &HashSet::new(), &HashSet::new(), &client(1));
    assert_eq!(admission, Admission::Reject {
      reason: BlockReason::BlockedByUser,
      notify: true,
    });
  }

  #[test]
  fn test_known_blocked_client_rejected_silently() {
    let roster = ClientRoster::default();
    let policy = AdmissionPolicy {
      client_control_by_user: true,
      ..policy(10)
    };
    let blocked = HashSet::from([client(1).mac]);
    let admission = policy.evaluate(&roster, &HashSet::new(), &blocked, &client(1));
    assert_eq!(admission, Admission::Reject {
      reason: BlockReason::BlockedByUser,
      notify: false,
    });
  }

  #[test]
  fn test_full_roster_rejects_with_no_more_stas() {
    let mut roster = ClientRoster::default();
    roster.insert(client(1));
    let admission = policy(1).evaluate(&roster, &HashSet::new(), &HashSet::new(), &client(2));
    assert_eq!(admission, Admission::Reject {
      reason: BlockReason::NoMoreStas,
      notify: true,
    });
  }

  #[test]
  fn test_reconcile_ejects_disallowed_then_over_cap_tail() {
    let mut roster = ClientRoster::default();
    roster.insert(client(1));
    roster.insert(client(2));
    roster.insert(client(3));
    let policy = AdmissionPolicy {
      client_control_by_user: true,
      ..policy(1)
    };
    let allowed = HashSet::from([client(1).mac, client(3).mac]);

    let targets = policy.reconcile_targets(&roster, &allowed);
    assert_eq!(targets, vec![
      (client(2), BlockReason::BlockedByUser),
      (client(3), BlockReason::NoMoreStas),
    ]);
  }

  #[test]
  fn test_reconcile_within_cap_is_empty() {
    let mut roster = ClientRoster::default();
    roster.insert(client(1));
    assert!(policy(2).reconcile_targets(&roster, &HashSet::new()).is_empty());
  }

  #[test]
  fn test_effective_max_clients() {
    let capability = SoftApCapability::new(FEATURE_CLIENT_FORCE_DISCONNECT, 8);
    let mut config = SoftApConfiguration::with_ssid("net");
    assert_eq!(effective_max_clients(&capability, &config), 8);
    config.max_number_of_clients = 3;
    assert_eq!(effective_max_clients(&capability, &config), 3);
    config.max_number_of_clients = 20;
    assert_eq!(effective_max_clients(&capability, &config), 8);
  }
}
