use crate::ap_state::{FailureReason, SoftApInfo};
use crate::config::TargetMode;

/// Injected metrics sink.  The manager reports lifecycle and station-count events here; what
/// gets counted or exported is the host's concern.
pub trait ApMetrics: Send {
  fn record_start_result(&mut self, success: bool, failure_reason: Option<FailureReason>);

  fn record_num_associated_stations(&mut self, num_stations: usize, mode: TargetMode);

  fn record_channel_switched(&mut self, info: &SoftApInfo, mode: TargetMode);

  fn record_up_changed(&mut self, is_up: bool, mode: TargetMode);

  fn record_band_preference_violation(&mut self);
}

#[derive(Debug, Default)]
pub struct NoopMetrics;

impl ApMetrics for NoopMetrics {
  fn record_start_result(&mut self, _success: bool, _failure_reason: Option<FailureReason>) {}

  fn record_num_associated_stations(&mut self, _num_stations: usize, _mode: TargetMode) {}

  fn record_channel_switched(&mut self, _info: &SoftApInfo, _mode: TargetMode) {}

  fn record_up_changed(&mut self, _is_up: bool, _mode: TargetMode) {}

  fn record_band_preference_violation(&mut self) {}
}
