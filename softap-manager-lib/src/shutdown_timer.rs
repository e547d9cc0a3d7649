use std::fmt;
use std::sync::mpsc::SyncSender;
use std::time::Duration;
use log::{debug, error};
use timer::{Guard, Timer};
use crate::command::ApCommand;

/// One-shot idle-shutdown timer.  Firing delivers a single
/// [ApCommand::NoAssociatedStationsTimeout] through the mailbox; re-arming replaces any
/// pending fire and cancellation is idempotent.
pub struct ShutdownTimer {
  timer: Timer,
  tx: SyncSender<ApCommand>,
  guard: Option<Guard>,
}

impl ShutdownTimer {
  pub fn new(tx: SyncSender<ApCommand>) -> Self {
    Self {
      timer: Timer::new(),
      tx,
      guard: None,
    }
  }

  pub fn schedule(&mut self, delay: Duration) {
    self.cancel();
    let delay = match chrono::Duration::from_std(delay) {
      Ok(delay) => delay,
      Err(e) => {
        error!("Unrepresentable timeout delay {delay:?}: {e}");
        return;
      }
    };
    let tx = self.tx.clone();
    self.guard = Some(self.timer.schedule_with_delay(delay, move || {
      let _ = tx.try_send(ApCommand::NoAssociatedStationsTimeout);
    }));
    debug!("Timeout message scheduled, delay={delay}");
  }

  pub fn cancel(&mut self) {
    if self.guard.take().is_some() {
      debug!("Timeout message canceled");
    }
  }

  /// True while a schedule is outstanding (armed and not canceled or replaced).
  pub fn is_scheduled(&self) -> bool {
    self.guard.is_some()
  }
}

impl fmt::Debug for ShutdownTimer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ShutdownTimer")
        .field("scheduled", &self.is_scheduled())
        .finish()
  }
}
