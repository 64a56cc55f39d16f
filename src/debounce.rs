//! Debounced refresh scheduling.
//!
//! Modeled as an explicit timer-armed state machine
//! (idle → pending → fired → idle) instead of ad hoc timer callbacks:
//! re-arming while pending is an explicit cancellation transition, and the
//! timers run on tokio time so tests drive them under a paused clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Quiet period collapsing rapid filter edits into one refresh.
pub const DEBOUNCE_QUIET_PERIOD: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
  Idle,
  /// Timer armed; only the matching generation may fire.
  Pending { generation: u64 },
}

struct Inner {
  state: State,
  next_generation: u64,
}

/// Collapses bursts of triggers into a single callback after a quiet
/// period. Each `arm` supersedes any pending timer.
pub struct Debouncer {
  delay: Duration,
  inner: Mutex<Inner>,
}

impl Debouncer {
  pub fn new(delay: Duration) -> Self {
    Self {
      delay,
      inner: Mutex::new(Inner {
        state: State::Idle,
        next_generation: 0,
      }),
    }
  }

  /// Arm (or re-arm) the timer; `fire` runs once after the quiet period
  /// unless a later `arm` supersedes this one first.
  pub fn arm<F>(self: &Arc<Self>, fire: F)
  where
    F: FnOnce() + Send + 'static,
  {
    let generation = {
      let mut inner = self.inner.lock().expect("debounce lock poisoned");
      let generation = inner.next_generation;
      inner.next_generation += 1;
      // Re-arming while pending cancels the previous generation.
      inner.state = State::Pending { generation };
      generation
    };

    let this = Arc::clone(self);
    tokio::spawn(async move {
      tokio::time::sleep(this.delay).await;
      let fire_now = {
        let mut inner = this.inner.lock().expect("debounce lock poisoned");
        if inner.state == (State::Pending { generation }) {
          inner.state = State::Idle;
          true
        } else {
          false
        }
      };
      if fire_now {
        fire();
      }
    });
  }

  /// Whether a timer is currently armed.
  pub fn is_pending(&self) -> bool {
    matches!(
      self.inner.lock().expect("debounce lock poisoned").state,
      State::Pending { .. }
    )
  }
}
