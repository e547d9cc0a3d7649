use std::sync::mpsc::{SyncSender, TrySendError};
use log::error;
use num_traits::FromPrimitive;
use crate::ap_state::ChannelBandwidth;
use crate::command::ApCommand;
use crate::mac_address::MacAddress;
use crate::roster::WifiClient;

/// Hostapd-level events for a started AP, normalized into mailbox commands.  Every call is a
/// non-blocking enqueue; the manager loop performs all mutation.  Malformed payloads are
/// dropped with an error log, never a panic.
#[derive(Debug, Clone)]
pub struct HostapdEventSink {
  tx: SyncSender<ApCommand>,
}

impl HostapdEventSink {
  pub(crate) fn new(tx: SyncSender<ApCommand>) -> Self {
    Self { tx }
  }

  pub fn on_failure(&self) {
    enqueue(&self.tx, ApCommand::Failure);
  }

  pub fn on_connected_clients_changed(&self, mac: &str, connected: bool) {
    match mac.parse::<MacAddress>() {
      Ok(mac) => enqueue(&self.tx, ApCommand::AssociatedStationsChanged {
        client: WifiClient::new(mac),
        connected,
      }),
      Err(e) => error!("onConnectedClientsChanged: dropping malformed client: {e}"),
    }
  }

  pub fn on_soft_ap_channel_switched(&self, frequency_mhz: i64, bandwidth: i64) {
    if frequency_mhz < 0 {
      error!("Invalid ap channel frequency: {frequency_mhz}");
      return;
    }
    let Some(bandwidth) = ChannelBandwidth::from_i64(bandwidth) else {
      error!("Invalid ap channel bandwidth: {bandwidth}");
      return;
    };
    enqueue(&self.tx, ApCommand::SoftApChannelSwitched {
      frequency_mhz: frequency_mhz as u32,
      bandwidth,
    });
  }

  pub fn on_sta_connected(&self, mac: &str) {
    match mac.parse::<MacAddress>() {
      Ok(mac) => enqueue(&self.tx, ApCommand::ConnectedStation { mac }),
      Err(e) => error!("onStaConnected: dropping malformed station: {e}"),
    }
  }

  pub fn on_sta_disconnected(&self, mac: &str) {
    match mac.parse::<MacAddress>() {
      Ok(mac) => enqueue(&self.tx, ApCommand::DisconnectedStation { mac }),
      Err(e) => error!("onStaDisconnected: dropping malformed station: {e}"),
    }
  }
}

/// Interface lifecycle callbacks.  The AP-interface flavor feeds interface status into the
/// state machine; the dual-radio flavor only cares about destruction, which triggers cleanup
/// of the sibling interfaces.
#[derive(Debug, Clone)]
pub struct IfaceEventSink {
  tx: SyncSender<ApCommand>,
  mapping: IfaceEventMapping,
}

#[derive(Debug, Clone, Copy)]
enum IfaceEventMapping {
  ApInterface,
  DualRadio,
}

impl IfaceEventSink {
  pub(crate) fn for_ap_interface(tx: SyncSender<ApCommand>) -> Self {
    Self { tx, mapping: IfaceEventMapping::ApInterface }
  }

  pub(crate) fn for_dual_radio(tx: SyncSender<ApCommand>) -> Self {
    Self { tx, mapping: IfaceEventMapping::DualRadio }
  }

  pub fn on_up(&self, iface: &str) {
    if let IfaceEventMapping::ApInterface = self.mapping {
      enqueue(&self.tx, ApCommand::InterfaceStatusChanged { iface: iface.to_owned(), is_up: true });
    }
  }

  pub fn on_down(&self, iface: &str) {
    if let IfaceEventMapping::ApInterface = self.mapping {
      enqueue(&self.tx, ApCommand::InterfaceStatusChanged { iface: iface.to_owned(), is_up: false });
    }
  }

  pub fn on_destroyed(&self, iface: &str) {
    let command = match self.mapping {
      IfaceEventMapping::ApInterface => ApCommand::InterfaceDestroyed { iface: iface.to_owned() },
      IfaceEventMapping::DualRadio => ApCommand::DualInterfaceDestroyed { iface: iface.to_owned() },
    };
    enqueue(&self.tx, command);
  }
}

fn enqueue(tx: &SyncSender<ApCommand>, command: ApCommand) {
  match tx.try_send(command) {
    Ok(()) => {}
    Err(TrySendError::Full(command)) => {
      error!("Manager mailbox full, dropping driver event: {command:?}");
    }
    // The manager wound down; late driver events are expected and harmless.
    Err(TrySendError::Disconnected(_)) => {}
  }
}
