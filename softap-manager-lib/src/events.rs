use crate::ap_state::{ApState, BlockReason, FailureReason, SoftApInfo};
use crate::config::TargetMode;
use crate::mac_address::MacAddress;
use crate::roster::WifiClient;

pub use common_lib::broadcaster::{broadcast_channel, BroadcastReceiver, BroadcastSender};

/// The manager's single outbound callback seam.  Events are fanned out over a non-blocking
/// broadcast channel; subscribers therefore can never re-enter the manager loop
/// synchronously.
#[derive(Debug, Clone, PartialEq)]
pub enum SoftApEvent {
  StateChanged {
    new_state: ApState,
    failure_reason: Option<FailureReason>,
  },
  StateBroadcast(StateChangeBroadcast),
  ConnectedClientsChanged(Vec<WifiClient>),
  InfoChanged(SoftApInfo),
  StaConnected {
    mac: Option<MacAddress>,
    num_stations: usize,
  },
  StaDisconnected {
    mac: Option<MacAddress>,
    num_stations: usize,
  },
  BlockedClientConnecting {
    client: WifiClient,
    reason: BlockReason,
  },
  Started,
  Stopped,
  StartFailure,
  /// The idle timeout expired and the AP is shutting down; surfaces a user notification.
  ShutdownNotification,
  /// A new session is starting; any lingering shutdown notification should be dismissed.
  ShutdownNotificationCleared,
}

/// Payload accompanying every state change, mirroring the sticky state-change broadcast.
/// `failure_reason`/`failure_description` are only populated on [ApState::Failed].
#[derive(Debug, Clone, PartialEq)]
pub struct StateChangeBroadcast {
  pub new_state: ApState,
  pub prev_state: ApState,
  pub failure_reason: Option<FailureReason>,
  pub failure_description: Option<String>,
  pub data_interface: Option<String>,
  pub target_mode: TargetMode,
}
