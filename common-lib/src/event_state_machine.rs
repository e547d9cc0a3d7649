use std::fmt::Debug;
use log::debug;

/// Event-driven state machine with deferred transitions.  States are trait objects keyed by a
/// `Kind`; a handler records a transition through [StateArgs::sm] and the move (including the
/// old state's exit hook and the new state's entry hook) is applied only after the handler
/// returns, so handlers always run to completion against a consistent context.
pub struct EventStateMachine<IS: EventState> {
  state: Box<dyn EventState<Context = IS::Context, Kind = IS::Kind, Event = IS::Event> + Send + 'static>,
  state_mover: StateMover<IS::Kind, IS::Context, IS::Event>,
  pub context: IS::Context,
}

impl<IS> EventStateMachine<IS>
where
    IS: EventState + Default + Send + 'static,
{
  pub fn new(context: IS::Context) -> Self {
    Self {
      state: Box::new(IS::default()),
      state_mover: Default::default(),
      context,
    }
  }
}

impl<IS: EventState> EventStateMachine<IS> {
  pub fn state_kind(&self) -> IS::Kind {
    self.state.kind()
  }
}

impl<IS> EventStateMachine<IS>
where
    IS: EventState,
    IS::Kind: PartialEq + Debug,
{
  /// Runs the initial state's entry hook.  Must be invoked once before the first
  /// [Self::handle_event].
  pub fn start(&mut self) {
    self.state.enter(&mut self.context);
  }

  pub fn handle_event(&mut self, event: IS::Event) {
    let state_mover = &mut self.state_mover;
    state_mover.state = None;
    let mut args = StateArgs {
      sm: state_mover,
      context: &mut self.context,
    };
    self.state.handle_event(&mut args, event);
    if let Some(new_state) = std::mem::take(&mut self.state_mover.state) {
      self.maybe_move_to_state(new_state);
    }
  }

  fn maybe_move_to_state(
      &mut self,
      new_state: Box<dyn EventState<Context = IS::Context, Kind = IS::Kind, Event = IS::Event> + Send + 'static>,
  ) {
    if self.state.kind() != new_state.kind() {
      debug!("Moving from {:?} to {:?}", self.state.kind(), new_state.kind());
      self.state.exit(&mut self.context);
      self.state = new_state;
      self.state.enter(&mut self.context);
    }
  }
}

pub struct StateArgs<'a, K, C, E> {
  pub sm: &'a mut StateMover<K, C, E>,
  pub context: &'a mut C,
}

pub struct StateMover<K, C, E> {
  state: Option<Box<dyn EventState<Context = C, Kind = K, Event = E> + Send + 'static>>,
}

impl<K, C, E> Default for StateMover<K, C, E> {
  fn default() -> Self {
    Self { state: None }
  }
}

impl<K, C, E> StateMover<K, C, E> {
  pub fn move_to_state(&mut self, new_state: impl EventState<Context = C, Kind = K, Event = E> + Send + 'static) {
    // Not a real move yet, just records the move to be acted upon after the event is handled.
    self.state = Some(Box::new(new_state));
  }
}

pub trait EventState: Debug {
  type Kind;
  type Context;
  type Event;

  fn kind(&self) -> Self::Kind;

  fn enter(&self, _context: &mut Self::Context) {}

  fn exit(&self, _context: &mut Self::Context) {}

  fn handle_event(&self, args: &mut StateArgs<Self::Kind, Self::Context, Self::Event>, event: Self::Event);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Default)]
  struct TestContext {
    trace: Vec<String>,
  }

  #[derive(Debug, PartialEq, Clone, Copy)]
  enum TestKind {
    Stopped,
    Running,
  }

  enum TestEvent {
    Go,
    Halt,
  }

  #[derive(Default, Debug)]
  struct StateStopped;

  impl EventState for StateStopped {
    type Kind = TestKind;
    type Context = TestContext;
    type Event = TestEvent;

    fn kind(&self) -> TestKind {
      TestKind::Stopped
    }

    fn enter(&self, context: &mut TestContext) {
      context.trace.push("stopped.enter".into());
    }

    fn exit(&self, context: &mut TestContext) {
      context.trace.push("stopped.exit".into());
    }

    fn handle_event(&self, args: &mut StateArgs<TestKind, TestContext, TestEvent>, event: TestEvent) {
      if let TestEvent::Go = event {
        args.context.trace.push("go".into());
        args.sm.move_to_state(StateRunning);
      }
    }
  }

  #[derive(Debug)]
  struct StateRunning;

  impl EventState for StateRunning {
    type Kind = TestKind;
    type Context = TestContext;
    type Event = TestEvent;

    fn kind(&self) -> TestKind {
      TestKind::Running
    }

    fn enter(&self, context: &mut TestContext) {
      context.trace.push("running.enter".into());
    }

    fn handle_event(&self, args: &mut StateArgs<TestKind, TestContext, TestEvent>, event: TestEvent) {
      match event {
        TestEvent::Halt => args.sm.move_to_state(StateStopped),
        // A self-move must not re-run entry/exit hooks.
        TestEvent::Go => args.sm.move_to_state(StateRunning),
      }
    }
  }

  #[test]
  fn transition_runs_exit_then_entry() {
    let mut sm = EventStateMachine::<StateStopped>::new(TestContext::default());
    sm.start();
    sm.handle_event(TestEvent::Go);
    assert_eq!(sm.state_kind(), TestKind::Running);
    assert_eq!(
        sm.context.trace,
        vec!["stopped.enter", "go", "stopped.exit", "running.enter"]);
  }

  #[test]
  fn move_to_same_kind_skips_hooks() {
    let mut sm = EventStateMachine::<StateStopped>::new(TestContext::default());
    sm.start();
    sm.handle_event(TestEvent::Go);
    let trace_len = sm.context.trace.len();
    sm.handle_event(TestEvent::Go);
    assert_eq!(sm.state_kind(), TestKind::Running);
    assert_eq!(sm.context.trace.len(), trace_len);
  }

  #[test]
  fn halt_returns_to_initial_state() {
    let mut sm = EventStateMachine::<StateStopped>::new(TestContext::default());
    sm.start();
    sm.handle_event(TestEvent::Go);
    sm.handle_event(TestEvent::Halt);
    assert_eq!(sm.state_kind(), TestKind::Stopped);
  }
}
