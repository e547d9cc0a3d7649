use num_derive::{FromPrimitive, ToPrimitive};

/// Externally observable AP lifecycle state, as published on the state-change broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApState {
  Disabled,
  Enabling,
  Enabled,
  Disabling,
  Failed,
}

/// Reason attached to a [ApState::Failed] publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
  General,
  NoChannel,
  UnsupportedConfiguration,
}

/// Reason a station was denied association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
  BlockedByUser,
  NoMoreStas,
}

/// Role of a running soft AP instance.  Assignable exactly once, from [ApRole::Unspecified]
/// to one of the concrete roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApRole {
  Unspecified,
  Tethered,
  LocalOnly,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum RoleError {
  #[error("Role may only be assigned once")]
  AlreadyAssigned,

  #[error("Role must be a concrete soft AP role")]
  InvalidRole,

  #[error("Manager is no longer running")]
  ManagerGone,
}

/// Channel bandwidth as reported by the driver on channel switch.  Raw integers from the
/// native layer are normalized through `FromPrimitive`; unknown values are dropped by the
/// demux.
#[derive(FromPrimitive, ToPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelBandwidth {
  Invalid = 0,
  Mhz20NoHt = 1,
  Mhz20 = 2,
  Mhz40 = 3,
  Mhz80 = 4,
  Mhz80Plus80 = 5,
  Mhz160 = 6,
}

/// Observable channel info of a running AP.  `(0, Invalid)` while the AP is down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftApInfo {
  pub frequency_mhz: u32,
  pub bandwidth: ChannelBandwidth,
}

impl SoftApInfo {
  pub const INVALID: SoftApInfo = SoftApInfo {
    frequency_mhz: 0,
    bandwidth: ChannelBandwidth::Invalid,
  };
}

impl Default for SoftApInfo {
  fn default() -> Self {
    Self::INVALID
  }
}
