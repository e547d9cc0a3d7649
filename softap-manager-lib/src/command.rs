use std::sync::mpsc::SyncSender;
use crate::ap_state::{ApRole, ChannelBandwidth, RoleError};
use crate::capability::SoftApCapability;
use crate::config::SoftApConfiguration;
use crate::mac_address::MacAddress;
use crate::roster::WifiClient;

/// Everything the manager loop reacts to: public API calls, demuxed driver events, and the
/// shutdown timer.  Delivered FIFO through one mailbox; handlers run to completion.
#[derive(Debug)]
pub enum ApCommand {
  Start,
  Stop,
  UpdateCapability(SoftApCapability),
  UpdateConfig(SoftApConfiguration),
  Failure,
  AssociatedStationsChanged {
    client: WifiClient,
    connected: bool,
  },
  ConnectedStation {
    mac: MacAddress,
  },
  DisconnectedStation {
    mac: MacAddress,
  },
  SoftApChannelSwitched {
    frequency_mhz: u32,
    bandwidth: ChannelBandwidth,
  },
  InterfaceStatusChanged {
    iface: String,
    is_up: bool,
  },
  InterfaceDestroyed {
    iface: String,
  },
  /// Raised internally when the data interface transitions from up to down.
  InterfaceDown,
  DualInterfaceDestroyed {
    iface: String,
  },
  NoAssociatedStationsTimeout,
  SetRole {
    role: ApRole,
    reply: SyncSender<Result<(), RoleError>>,
  },
  GetRole {
    reply: SyncSender<ApRole>,
  },
  Dump {
    reply: SyncSender<String>,
  },
}
