use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use log::debug;
use softap_manager_lib::ap_state::BlockReason;
use softap_manager_lib::config::SoftApConfiguration;
use softap_manager_lib::demux::{HostapdEventSink, IfaceEventSink};
use softap_manager_lib::driver::{ApDriver, DriverError};
use softap_manager_lib::mac_address::MacAddress;

const DEFAULT_FACTORY_MAC: MacAddress = MacAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);

/// In-memory [ApDriver] with scripted failure injection.  The paired [MockDriverControl]
/// shares the state, letting tests flip failure switches, inspect recorded calls, and raise
/// driver events through the sinks the manager registered.
pub struct MockDriver {
  state: Arc<Mutex<MockDriverState>>,
}

pub struct MockDriverControl {
  state: Arc<Mutex<MockDriverState>>,
}

struct MockDriverState {
  iface_counter: usize,
  bridge_counter: usize,

  fail_iface_setup: bool,
  fail_start_soft_ap: bool,
  fail_start_on: Option<String>,
  fail_set_mac: bool,
  fail_set_country: bool,
  fail_hostapd_params: bool,
  factory_mac: Option<MacAddress>,
  supports_5ghz: bool,
  fst_data_iface: Option<String>,
  up_ifaces: HashSet<String>,

  created_ifaces: Vec<String>,
  torn_down: Vec<String>,
  started: Vec<(String, SoftApConfiguration)>,
  hostapd_params: Vec<String>,
  forced_disconnects: Vec<(String, MacAddress, BlockReason)>,
  country_codes: Vec<(String, String)>,
  mac_sets: Vec<(String, MacAddress)>,

  iface_sinks: HashMap<String, IfaceEventSink>,
  hostapd_sinks: HashMap<String, HostapdEventSink>,
}

impl Default for MockDriverState {
  fn default() -> Self {
    Self {
      iface_counter: 0,
      bridge_counter: 0,
      fail_iface_setup: false,
      fail_start_soft_ap: false,
      fail_start_on: None,
      fail_set_mac: false,
      fail_set_country: false,
      fail_hostapd_params: false,
      factory_mac: Some(DEFAULT_FACTORY_MAC),
      supports_5ghz: true,
      fst_data_iface: None,
      up_ifaces: HashSet::new(),
      created_ifaces: Vec::new(),
      torn_down: Vec::new(),
      started: Vec::new(),
      hostapd_params: Vec::new(),
      forced_disconnects: Vec::new(),
      country_codes: Vec::new(),
      mac_sets: Vec::new(),
      iface_sinks: HashMap::new(),
      hostapd_sinks: HashMap::new(),
    }
  }
}

impl MockDriver {
  pub fn new() -> (Self, MockDriverControl) {
    let state = Arc::new(Mutex::new(MockDriverState::default()));
    (
      Self { state: state.clone() },
      MockDriverControl { state },
    )
  }
}

impl ApDriver for MockDriver {
  fn setup_interface_for_softap_mode(&mut self, callbacks: IfaceEventSink) -> Result<String, DriverError> {
    let mut state = self.state.lock().unwrap();
    if state.fail_iface_setup {
      return Err(DriverError::CallFailed("scripted iface setup failure".to_owned()));
    }
    let name = format!("wlan{}", state.iface_counter);
    state.iface_counter += 1;
    debug!("Mock driver created {name}");
    state.created_ifaces.push(name.clone());
    state.iface_sinks.insert(name.clone(), callbacks);
    Ok(name)
  }

  fn setup_interface_for_bridge_mode(&mut self, callbacks: IfaceEventSink) -> Result<String, DriverError> {
    let mut state = self.state.lock().unwrap();
    if state.fail_iface_setup {
      return Err(DriverError::CallFailed("scripted bridge setup failure".to_owned()));
    }
    let name = format!("softap_br{}", state.bridge_counter);
    state.bridge_counter += 1;
    debug!("Mock driver created bridge {name}");
    state.created_ifaces.push(name.clone());
    state.iface_sinks.insert(name.clone(), callbacks);
    Ok(name)
  }

  fn teardown_interface(&mut self, iface: &str) -> Result<(), DriverError> {
    let mut state = self.state.lock().unwrap();
    debug!("Mock driver tearing down {iface}");
    state.torn_down.push(iface.to_owned());
    state.up_ifaces.remove(iface);
    Ok(())
  }

  fn start_soft_ap(
      &mut self,
      iface: &str,
      config: &SoftApConfiguration,
      listener: HostapdEventSink,
  ) -> Result<(), DriverError> {
    let mut state = self.state.lock().unwrap();
    if state.fail_start_soft_ap || state.fail_start_on.as_deref() == Some(iface) {
      return Err(DriverError::CallFailed("scripted hostapd start failure".to_owned()));
    }
    state.started.push((iface.to_owned(), config.clone()));
    state.hostapd_sinks.insert(iface.to_owned(), listener);
    Ok(())
  }

  fn set_mac_address(&mut self, iface: &str, mac: MacAddress) -> Result<(), DriverError> {
    let mut state = self.state.lock().unwrap();
    if state.fail_set_mac {
      return Err(DriverError::NotSupported);
    }
    state.mac_sets.push((iface.to_owned(), mac));
    Ok(())
  }

  fn get_factory_mac_address(&mut self, _iface: &str) -> Option<MacAddress> {
    self.state.lock().unwrap().factory_mac
  }

  fn set_country_code(&mut self, iface: &str, country_code: &str) -> Result<(), DriverError> {
    let mut state = self.state.lock().unwrap();
    if state.fail_set_country {
      return Err(DriverError::CallFailed("scripted country code failure".to_owned()));
    }
    state.country_codes.push((iface.to_owned(), country_code.to_owned()));
    Ok(())
  }

  fn is_5ghz_band_supported(&mut self) -> bool {
    self.state.lock().unwrap().supports_5ghz
  }

  fn is_interface_up(&mut self, iface: &str) -> bool {
    self.state.lock().unwrap().up_ifaces.contains(iface)
  }

  fn force_client_disconnect(
      &mut self,
      iface: &str,
      mac: MacAddress,
      reason: BlockReason,
  ) -> Result<(), DriverError> {
    let mut state = self.state.lock().unwrap();
    state.forced_disconnects.push((iface.to_owned(), mac, reason));
    Ok(())
  }

  fn set_hostapd_params(&mut self, cmd: &str) -> Result<(), DriverError> {
    let mut state = self.state.lock().unwrap();
    if state.fail_hostapd_params {
      return Err(DriverError::CallFailed("scripted hostapd params failure".to_owned()));
    }
    state.hostapd_params.push(cmd.to_owned());
    Ok(())
  }

  fn fst_data_interface_name(&mut self) -> Option<String> {
    self.state.lock().unwrap().fst_data_iface.clone()
  }
}

impl MockDriverControl {
  pub fn set_fail_iface_setup(&self, fail: bool) {
    self.state.lock().unwrap().fail_iface_setup = fail;
  }

  pub fn set_fail_start_soft_ap(&self, fail: bool) {
    self.state.lock().unwrap().fail_start_soft_ap = fail;
  }

  /// Fails hostapd start only on the named interface; other interfaces start normally.
  pub fn set_fail_start_on(&self, iface: Option<String>) {
    self.state.lock().unwrap().fail_start_on = iface;
  }

  pub fn set_fail_set_mac(&self, fail: bool) {
    self.state.lock().unwrap().fail_set_mac = fail;
  }

  pub fn set_fail_set_country(&self, fail: bool) {
    self.state.lock().unwrap().fail_set_country = fail;
  }

  pub fn set_fail_hostapd_params(&self, fail: bool) {
    self.state.lock().unwrap().fail_hostapd_params = fail;
  }

  pub fn set_factory_mac(&self, mac: Option<MacAddress>) {
    self.state.lock().unwrap().factory_mac = mac;
  }

  pub fn set_supports_5ghz(&self, supported: bool) {
    self.state.lock().unwrap().supports_5ghz = supported;
  }

  pub fn set_fst_data_iface(&self, iface: Option<String>) {
    self.state.lock().unwrap().fst_data_iface = iface;
  }

  pub fn set_interface_up(&self, iface: &str, is_up: bool) {
    let mut state = self.state.lock().unwrap();
    if is_up {
      state.up_ifaces.insert(iface.to_owned());
    } else {
      state.up_ifaces.remove(iface);
    }
  }

  pub fn created_ifaces(&self) -> Vec<String> {
    self.state.lock().unwrap().created_ifaces.clone()
  }

  pub fn torn_down(&self) -> Vec<String> {
    self.state.lock().unwrap().torn_down.clone()
  }

  pub fn started_configs(&self) -> Vec<(String, SoftApConfiguration)> {
    self.state.lock().unwrap().started.clone()
  }

  pub fn hostapd_params(&self) -> Vec<String> {
    self.state.lock().unwrap().hostapd_params.clone()
  }

  pub fn forced_disconnects(&self) -> Vec<(String, MacAddress, BlockReason)> {
    self.state.lock().unwrap().forced_disconnects.clone()
  }

  pub fn country_codes(&self) -> Vec<(String, String)> {
    self.state.lock().unwrap().country_codes.clone()
  }

  pub fn mac_sets(&self) -> Vec<(String, MacAddress)> {
    self.state.lock().unwrap().mac_sets.clone()
  }

  pub fn iface_events(&self, iface: &str) -> Option<IfaceEventSink> {
    self.state.lock().unwrap().iface_sinks.get(iface).cloned()
  }

  pub fn hostapd_events(&self, iface: &str) -> Option<HostapdEventSink> {
    self.state.lock().unwrap().hostapd_sinks.get(iface).cloned()
  }

  /// Marks the interface up and reports the transition through its registered callbacks.
  pub fn raise_interface_up(&self, iface: &str) {
    self.set_interface_up(iface, true);
    if let Some(sink) = self.iface_events(iface) {
      sink.on_up(iface);
    }
  }

  pub fn raise_interface_down(&self, iface: &str) {
    self.set_interface_up(iface, false);
    if let Some(sink) = self.iface_events(iface) {
      sink.on_down(iface);
    }
  }

  pub fn raise_interface_destroyed(&self, iface: &str) {
    if let Some(sink) = self.iface_events(iface) {
      sink.on_destroyed(iface);
    }
  }

  pub fn raise_failure(&self, iface: &str) {
    if let Some(sink) = self.hostapd_events(iface) {
      sink.on_failure();
    }
  }

  pub fn raise_client_changed(&self, iface: &str, mac: &str, connected: bool) {
    if let Some(sink) = self.hostapd_events(iface) {
      sink.on_connected_clients_changed(mac, connected);
    }
  }

  pub fn raise_channel_switched(&self, iface: &str, frequency_mhz: i64, bandwidth: i64) {
    if let Some(sink) = self.hostapd_events(iface) {
      sink.on_soft_ap_channel_switched(frequency_mhz, bandwidth);
    }
  }

  pub fn raise_sta_connected(&self, iface: &str, mac: &str) {
    if let Some(sink) = self.hostapd_events(iface) {
      sink.on_sta_connected(mac);
    }
  }

  pub fn raise_sta_disconnected(&self, iface: &str, mac: &str) {
    if let Some(sink) = self.hostapd_events(iface) {
      sink.on_sta_disconnected(mac);
    }
  }
}
