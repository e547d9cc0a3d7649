use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use log::LevelFilter;
use mock_driver_lib::mock_driver::{MockDriver, MockDriverControl};
use softap_manager_lib::ap_state::{ApRole, ApState, BlockReason, FailureReason, RoleError};
use softap_manager_lib::capability::{FEATURE_ACS_OFFLOAD, FEATURE_CLIENT_FORCE_DISCONNECT, SoftApCapability};
use softap_manager_lib::config::{ApBand, SecurityType, SoftApConfiguration, SoftApModeConfiguration, TargetMode};
use softap_manager_lib::config_store::InMemoryConfigStore;
use softap_manager_lib::events::{BroadcastReceiver, SoftApEvent};
use softap_manager_lib::mac_address::MacAddress;
use softap_manager_lib::manager::{ControlHandle, SoftApManager};
use softap_manager_lib::metrics::NoopMetrics;
use softap_manager_lib::roster::WifiClient;

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

struct Harness {
  control: ControlHandle,
  events: BroadcastReceiver<SoftApEvent>,
  driver: MockDriverControl,
  run_thread: JoinHandle<anyhow::Result<()>>,
}

impl Harness {
  fn next_event(&self) -> SoftApEvent {
    self.events.rx().recv_timeout(EVENT_TIMEOUT).expect("Timed out waiting for event")
  }

  /// Collects events, inclusively, until `pred` matches one.
  fn events_until(&self, pred: impl Fn(&SoftApEvent) -> bool) -> Vec<SoftApEvent> {
    let mut seen = Vec::new();
    loop {
      let event = self.next_event();
      let done = pred(&event);
      seen.push(event);
      if done {
        return seen;
      }
    }
  }

  fn wait_for_broadcast(&self, state: ApState) -> Vec<SoftApEvent> {
    self.events_until(|event| {
      matches!(event, SoftApEvent::StateBroadcast(b) if b.new_state == state)
    })
  }

  fn dump(&self) -> String {
    let mut buf = Vec::new();
    self.control.dump(&mut buf).unwrap();
    String::from_utf8(buf).unwrap()
  }

  fn shutdown(self) {
    let Harness { control, run_thread, .. } = self;
    control.stop();
    drop(control);
    run_thread.join().unwrap().unwrap();
  }
}

fn boot(config: SoftApConfiguration, capability: SoftApCapability, country: &str) -> Harness {
  boot_with_store(config, capability, country, InMemoryConfigStore::new())
}

fn boot_with_store(
    config: SoftApConfiguration,
    capability: SoftApCapability,
    country: &str,
    store: InMemoryConfigStore,
) -> Harness {
  let _ = env_logger::builder().filter_level(LevelFilter::Debug).is_test(true).try_init();

  let (driver, driver_control) = MockDriver::new();
  let manager = SoftApManager::new(
      Box::new(driver),
      Box::new(store),
      Box::new(NoopMetrics),
      country,
      SoftApModeConfiguration {
        target_mode: TargetMode::Tethered,
        config: Some(config),
        capability,
      });
  let (control, events, runner) = manager.into_runner();
  let run_thread = thread::Builder::new()
      .name("SoftApManager".into())
      .spawn(move || runner.run_loop())
      .unwrap();
  Harness { control, events, driver: driver_control, run_thread }
}

fn default_capability() -> SoftApCapability {
  SoftApCapability::new(FEATURE_ACS_OFFLOAD | FEATURE_CLIENT_FORCE_DISCONNECT, 8)
}

fn client(mac: &str) -> WifiClient {
  WifiClient::new(mac.parse().unwrap())
}

fn broadcast_transitions(events: &[SoftApEvent]) -> Vec<(ApState, ApState)> {
  events.iter()
      .filter_map(|event| match event {
        SoftApEvent::StateBroadcast(b) => Some((b.new_state, b.prev_state)),
        _ => None,
      })
      .collect()
}

/// Starts a single AP on `wlan0`, raises the interface and waits for ENABLED, draining
/// through the client-refresh events that follow `Started`.
fn start_and_enable(harness: &Harness) {
  harness.control.start();
  harness.wait_for_broadcast(ApState::Enabling);
  harness.driver.raise_interface_up("wlan0");
  harness.events_until(|event| matches!(event, SoftApEvent::StaConnected { mac: None, .. }));
}

fn wait_until(timeout: Duration, pred: impl Fn() -> bool) -> bool {
  let deadline = Instant::now() + timeout;
  while Instant::now() < deadline {
    if pred() {
      return true;
    }
    thread::sleep(Duration::from_millis(10));
  }
  false
}

#[test]
fn single_ap_happy_path_with_auto_shutdown() {
  let config = SoftApConfiguration::with_ssid("foo")
      .set_auto_shutdown(true, Duration::from_millis(500));
  let harness = boot(config, default_capability(), "US");

  harness.control.start();
  let events = harness.wait_for_broadcast(ApState::Enabling);
  assert!(events.contains(&SoftApEvent::ShutdownNotificationCleared));
  assert!(events.contains(&SoftApEvent::StateChanged {
    new_state: ApState::Enabling,
    failure_reason: None,
  }));
  match events.last() {
    Some(SoftApEvent::StateBroadcast(b)) => {
      assert_eq!(b.prev_state, ApState::Disabled);
      assert_eq!(b.data_interface.as_deref(), Some("wlan0"));
      assert_eq!(b.target_mode, TargetMode::Tethered);
    }
    other => panic!("Unexpected event: {other:?}"),
  }

  harness.driver.raise_interface_up("wlan0");
  let events = harness.events_until(|event| *event == SoftApEvent::Started);
  assert!(broadcast_transitions(&events).contains(&(ApState::Enabled, ApState::Enabling)));

  // No clients connect, so the idle timeout tears the AP down on its own.
  let events = harness.events_until(|event| *event == SoftApEvent::Stopped);
  assert!(events.contains(&SoftApEvent::ShutdownNotification));
  assert_eq!(broadcast_transitions(&events), vec![
    (ApState::Disabling, ApState::Enabled),
    (ApState::Disabled, ApState::Disabling),
  ]);
  assert!(harness.driver.torn_down().contains(&"wlan0".to_owned()));

  harness.shutdown();
}

#[test]
fn five_ghz_without_country_fails_before_interfaces() {
  let config = SoftApConfiguration::with_ssid("foo").set_band(ApBand::Band5Ghz);
  let harness = boot(config, default_capability(), "");

  harness.control.start();
  let events = harness.events_until(|event| *event == SoftApEvent::StartFailure);
  assert_eq!(events, vec![
    SoftApEvent::StateChanged {
      new_state: ApState::Failed,
      failure_reason: Some(FailureReason::General),
    },
    SoftApEvent::StateBroadcast(softap_manager_lib::events::StateChangeBroadcast {
      new_state: ApState::Failed,
      prev_state: ApState::Disabled,
      failure_reason: Some(FailureReason::General),
      failure_description: None,
      data_interface: None,
      target_mode: TargetMode::Tethered,
    }),
    SoftApEvent::StartFailure,
  ]);
  assert!(harness.driver.created_ifaces().is_empty());

  harness.shutdown();
}

#[test]
fn missing_ssid_fails_as_unsupported_configuration() {
  let harness = boot(SoftApConfiguration::default(), default_capability(), "US");

  harness.control.start();
  let events = harness.events_until(|event| *event == SoftApEvent::StartFailure);
  assert!(events.contains(&SoftApEvent::StateChanged {
    new_state: ApState::Failed,
    failure_reason: Some(FailureReason::UnsupportedConfiguration),
  }));
  assert!(harness.driver.created_ifaces().is_empty());

  harness.shutdown();
}

#[test]
fn dual_band_start_builds_bridged_topology() {
  let config = SoftApConfiguration::with_ssid("foo").set_band(ApBand::Any);
  let harness = boot(config, default_capability(), "US");

  harness.control.start();
  harness.wait_for_broadcast(ApState::Enabling);
  assert_eq!(harness.driver.created_ifaces(), vec!["wlan0", "wlan1", "softap_br0"]);

  let started = harness.driver.started_configs();
  assert_eq!(started.len(), 2);
  assert_eq!(started[0].0, "wlan0");
  assert_eq!(started[0].1.band, ApBand::Band2Ghz);
  assert_eq!(started[1].0, "wlan1");
  assert_eq!(started[1].1.band, ApBand::Band5Ghz);
  assert_eq!(harness.driver.hostapd_params(), vec!["softap bridge up softap_br0"]);

  harness.driver.raise_interface_up("softap_br0");
  let events = harness.events_until(|event| *event == SoftApEvent::Started);
  let enabled_count = broadcast_transitions(&events).iter()
      .filter(|(new_state, _)| *new_state == ApState::Enabled)
      .count();
  assert_eq!(enabled_count, 1);

  // Stopping applies to all three interfaces, radios included.
  let Harness { control, run_thread, driver, .. } = harness;
  control.stop();
  drop(control);
  run_thread.join().unwrap().unwrap();
  assert_eq!(driver.torn_down(), vec!["wlan0", "wlan1", "softap_br0"]);
}

#[test]
fn owe_transition_starts_cross_linked_pair() {
  let config = SoftApConfiguration::with_ssid("my-network").set_security(SecurityType::Owe);
  let harness = boot(config, default_capability(), "US");

  harness.control.start();
  harness.wait_for_broadcast(ApState::Enabling);

  let started = harness.driver.started_configs();
  assert_eq!(started.len(), 2);

  let (owe_iface, owe_config) = &started[0];
  assert_eq!(owe_iface, "wlan0");
  assert!(owe_config.ssid.as_deref().unwrap().starts_with("OWE_"));
  assert!(owe_config.hidden_ssid);
  assert_eq!(owe_config.security, SecurityType::Owe);
  assert_eq!(owe_config.owe_transition_iface.as_deref(), Some("wlan1"));

  let (open_iface, open_config) = &started[1];
  assert_eq!(open_iface, "wlan1");
  assert_eq!(open_config.ssid.as_deref(), Some("my-network"));
  assert_eq!(open_config.security, SecurityType::Open);
  assert_eq!(open_config.passphrase, None);
  assert_eq!(open_config.owe_transition_iface.as_deref(), Some("wlan0"));

  harness.shutdown();
}

#[test]
fn second_client_over_cap_is_force_disconnected() {
  let capability = SoftApCapability::new(FEATURE_ACS_OFFLOAD | FEATURE_CLIENT_FORCE_DISCONNECT, 1);
  let harness = boot(SoftApConfiguration::with_ssid("foo"), capability, "US");
  start_and_enable(&harness);

  harness.driver.raise_client_changed("wlan0", "02:00:00:00:00:01", true);
  let events = harness.events_until(|event| {
    matches!(event, SoftApEvent::ConnectedClientsChanged(_))
  });
  assert!(events.contains(&SoftApEvent::ConnectedClientsChanged(vec![client("02:00:00:00:00:01")])));

  harness.driver.raise_client_changed("wlan0", "02:00:00:00:00:02", true);
  let events = harness.events_until(|event| {
    matches!(event, SoftApEvent::BlockedClientConnecting { .. })
  });
  assert!(events.contains(&SoftApEvent::BlockedClientConnecting {
    client: client("02:00:00:00:00:02"),
    reason: BlockReason::NoMoreStas,
  }));
  assert_eq!(harness.driver.forced_disconnects(), vec![(
    "wlan0".to_owned(),
    "02:00:00:00:00:02".parse::<MacAddress>().unwrap(),
    BlockReason::NoMoreStas,
  )]);
  assert!(harness.dump().contains("connected clients: 1"));

  harness.shutdown();
}

#[test]
fn unauthorized_client_notifies_only_when_not_already_blocked() {
  let blocked_mac: MacAddress = "02:00:00:00:00:0b".parse().unwrap();
  let mut config = SoftApConfiguration::with_ssid("foo");
  config.client_control_by_user = true;
  config.blocked_client_list = vec![blocked_mac];
  let harness = boot(config, default_capability(), "US");
  start_and_enable(&harness);

  // Not on the allow list and not yet known-blocked: callback plus forced disconnect.
  harness.driver.raise_client_changed("wlan0", "02:00:00:00:00:0a", true);
  let events = harness.events_until(|event| {
    matches!(event, SoftApEvent::BlockedClientConnecting { .. })
  });
  assert!(events.contains(&SoftApEvent::BlockedClientConnecting {
    client: client("02:00:00:00:00:0a"),
    reason: BlockReason::BlockedByUser,
  }));

  // Already on the block list: forced disconnect without the callback.
  harness.driver.raise_client_changed("wlan0", "02:00:00:00:00:0b", true);
  harness.driver.raise_channel_switched("wlan0", 2437, 2);
  let events = harness.events_until(|event| matches!(event, SoftApEvent::InfoChanged(_)));
  assert!(!events.iter().any(|event| matches!(event, SoftApEvent::BlockedClientConnecting { .. })));

  let disconnects = harness.driver.forced_disconnects();
  assert_eq!(disconnects.len(), 2);
  assert_eq!(disconnects[1], ("wlan0".to_owned(), blocked_mac, BlockReason::BlockedByUser));
  assert!(harness.dump().contains("connected clients: 0"));

  harness.shutdown();
}

#[test]
fn hostapd_failure_transits_failed_then_disabled() {
  let harness = boot(SoftApConfiguration::with_ssid("foo"), default_capability(), "US");
  start_and_enable(&harness);

  harness.driver.raise_failure("wlan0");
  let events = harness.events_until(|event| *event == SoftApEvent::Stopped);
  assert_eq!(broadcast_transitions(&events), vec![
    (ApState::Failed, ApState::Enabled),
    (ApState::Disabling, ApState::Failed),
    (ApState::Disabled, ApState::Disabling),
  ]);
  assert!(harness.driver.torn_down().contains(&"wlan0".to_owned()));

  harness.shutdown();
}

#[test]
fn start_failure_after_interface_rolls_back() {
  let store = InMemoryConfigStore::new().set_randomize_bssid(false);
  let harness = boot_with_store(
      SoftApConfiguration::with_ssid("foo"), default_capability(), "US", store);
  harness.driver.set_factory_mac(None);

  harness.control.start();
  let events = harness.events_until(|event| *event == SoftApEvent::StartFailure);
  assert_eq!(broadcast_transitions(&events), vec![
    (ApState::Enabling, ApState::Disabled),
    (ApState::Failed, ApState::Enabling),
    (ApState::Disabling, ApState::Failed),
    (ApState::Disabled, ApState::Disabling),
  ]);
  assert_eq!(harness.driver.torn_down(), vec!["wlan0"]);

  harness.shutdown();
}

#[test]
fn factory_mac_is_restored_when_bssid_unset() {
  let store = InMemoryConfigStore::new().set_randomize_bssid(false);
  let harness = boot_with_store(
      SoftApConfiguration::with_ssid("foo"), default_capability(), "US", store);
  start_and_enable(&harness);

  let mac_sets = harness.driver.mac_sets();
  assert_eq!(mac_sets, vec![(
    "wlan0".to_owned(),
    MacAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
  )]);

  harness.shutdown();
}

#[test]
fn stop_on_idle_is_a_noop() {
  let harness = boot(SoftApConfiguration::with_ssid("foo"), default_capability(), "US");
  let Harness { control, events, run_thread, .. } = harness;

  control.stop();
  run_thread.join().unwrap().unwrap();
  assert!(events.rx().try_recv().is_err());
  drop(control);
}

#[test]
fn repeated_configuration_update_is_idempotent() {
  let harness = boot(SoftApConfiguration::with_ssid("foo"), default_capability(), "US");

  let update = SoftApConfiguration::with_ssid("foo")
      .set_auto_shutdown(true, Duration::from_secs(300));
  harness.control.update_configuration(update.clone());
  let first = harness.dump();
  harness.control.update_configuration(update);
  let second = harness.dump();
  assert_eq!(first, second);

  harness.shutdown();
}

#[test]
fn restart_requiring_config_update_is_ignored_while_started() {
  let harness = boot(SoftApConfiguration::with_ssid("foo"), default_capability(), "US");
  start_and_enable(&harness);

  // The dump round-trips through the same mailbox, so the update is processed by the time
  // the snapshot is taken.
  harness.control.update_configuration(SoftApConfiguration::with_ssid("renamed"));
  let dump = harness.dump();
  assert!(dump.contains("ssid: Some(\"foo\")"));
  assert!(dump.contains("current state: Started"));

  harness.shutdown();
}

#[test]
fn dual_radio_destruction_tears_down_siblings_and_bridge() {
  let config = SoftApConfiguration::with_ssid("foo").set_band(ApBand::Any);
  let harness = boot(config, default_capability(), "US");

  harness.control.start();
  harness.wait_for_broadcast(ApState::Enabling);
  harness.driver.raise_interface_up("softap_br0");
  harness.events_until(|event| *event == SoftApEvent::Started);

  // Native layers killed one radio: the sibling and the bridge go with it.
  harness.driver.raise_interface_destroyed("wlan0");
  assert!(wait_until(EVENT_TIMEOUT, || {
    let torn_down = harness.driver.torn_down();
    torn_down.contains(&"wlan1".to_owned()) && torn_down.contains(&"softap_br0".to_owned())
  }));

  // The bridge teardown confirmation lands as a clean interface destruction.
  harness.driver.raise_interface_destroyed("softap_br0");
  let events = harness.events_until(|event| *event == SoftApEvent::Stopped);
  assert!(broadcast_transitions(&events).contains(&(ApState::Disabling, ApState::Enabled)));

  // Nothing is torn down twice once the dual interfaces are gone.
  assert_eq!(harness.driver.torn_down(), vec!["wlan1", "softap_br0"]);

  harness.shutdown();
}

#[test]
fn role_is_assignable_exactly_once() {
  let harness = boot(SoftApConfiguration::with_ssid("foo"), default_capability(), "US");

  assert_eq!(harness.control.get_role().unwrap(), ApRole::Unspecified);
  assert_eq!(harness.control.set_role(ApRole::Unspecified), Err(RoleError::InvalidRole));
  harness.control.set_role(ApRole::Tethered).unwrap();
  assert_eq!(harness.control.get_role().unwrap(), ApRole::Tethered);
  assert_eq!(harness.control.set_role(ApRole::LocalOnly), Err(RoleError::AlreadyAssigned));

  harness.shutdown();
}

#[test]
fn legacy_station_counters_drive_timeout_path() {
  let config = SoftApConfiguration::with_ssid("foo")
      .set_auto_shutdown(true, Duration::from_secs(2));
  let harness = boot(config, default_capability(), "US");
  start_and_enable(&harness);

  harness.driver.raise_sta_connected("wlan0", "02:00:00:00:00:01");
  let events = harness.events_until(|event| matches!(event, SoftApEvent::StaConnected { .. }));
  assert!(events.contains(&SoftApEvent::StaConnected {
    mac: Some("02:00:00:00:00:01".parse().unwrap()),
    num_stations: 1,
  }));

  // With a station attached the timer must not fire.
  thread::sleep(Duration::from_millis(400));
  assert!(harness.dump().contains("current state: Started"));

  harness.driver.raise_sta_disconnected("wlan0", "02:00:00:00:00:01");
  let events = harness.events_until(|event| *event == SoftApEvent::Stopped);
  assert!(events.contains(&SoftApEvent::StaDisconnected {
    mac: Some("02:00:00:00:00:01".parse().unwrap()),
    num_stations: 0,
  }));
  assert!(events.contains(&SoftApEvent::ShutdownNotification));

  harness.shutdown();
}

#[test]
fn duplicate_connection_event_is_dropped() {
  let harness = boot(SoftApConfiguration::with_ssid("foo"), default_capability(), "US");
  start_and_enable(&harness);

  harness.driver.raise_client_changed("wlan0", "02:00:00:00:00:01", true);
  harness.events_until(|event| matches!(event, SoftApEvent::ConnectedClientsChanged(_)));

  harness.driver.raise_client_changed("wlan0", "02:00:00:00:00:01", true);
  harness.driver.raise_channel_switched("wlan0", 2437, 2);
  let events = harness.events_until(|event| matches!(event, SoftApEvent::InfoChanged(_)));
  assert!(!events.iter().any(|event| matches!(event, SoftApEvent::ConnectedClientsChanged(_))));
  assert!(harness.dump().contains("connected clients: 1"));

  harness.shutdown();
}

#[test]
fn unchanged_channel_switch_is_not_re_reported() {
  let harness = boot(SoftApConfiguration::with_ssid("foo"), default_capability(), "US");
  start_and_enable(&harness);

  harness.driver.raise_channel_switched("wlan0", 2437, 2);
  harness.events_until(|event| matches!(event, SoftApEvent::InfoChanged(_)));

  harness.driver.raise_channel_switched("wlan0", 2437, 2);
  harness.driver.raise_channel_switched("wlan0", 2462, 2);
  let events = harness.events_until(|event| matches!(event, SoftApEvent::InfoChanged(_)));
  // Only the actual change surfaced; the duplicate was suppressed.
  assert_eq!(events.len(), 1);

  harness.shutdown();
}
