//! Pluggable clocks driving delayed sends.
//!
//! The interpreter schedules every delayed send through a [`Clock`], so
//! tests can swap the wall clock for a [`SimulatedClock`] and advance
//! time deterministically.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Handle to a scheduled timeout.
pub type TimerId = u64;

/// A scheduled callback.
pub type TimerFn = Box<dyn FnOnce() + Send>;

/// Scheduling surface the interpreter needs: set and clear timeouts.
pub trait Clock: Send + Sync {
    /// Run `f` after `ms` milliseconds.
    fn set_timeout(&self, f: TimerFn, ms: u64) -> TimerId;
    /// Cancel a pending timeout; a no-op if it already fired.
    fn clear_timeout(&self, id: TimerId);
}

struct Scheduled {
    id: TimerId,
    fire_at: u64,
    callback: TimerFn,
}

#[derive(Default)]
struct SimulatedState {
    now: u64,
    next_id: TimerId,
    scheduled: Vec<Scheduled>,
}

/// A clock that only moves when told to. [`SimulatedClock::increment`]
/// advances virtual time and fires due callbacks in order, making
/// delayed-send tests deterministic.
///
/// # Example
///
/// ```rust
/// use statecraft::SimulatedClock;
/// use statecraft::Clock;
/// use std::sync::{Arc, Mutex};
///
/// let clock = Arc::new(SimulatedClock::new());
/// let fired = Arc::new(Mutex::new(false));
/// let flag = Arc::clone(&fired);
/// clock.set_timeout(Box::new(move || *flag.lock().unwrap() = true), 10);
///
/// clock.increment(5);
/// assert!(!*fired.lock().unwrap());
/// clock.increment(5);
/// assert!(*fired.lock().unwrap());
/// ```
#[derive(Default)]
pub struct SimulatedClock {
    state: Mutex<SimulatedState>,
}

impl SimulatedClock {
    /// A clock at virtual time zero with nothing scheduled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time in milliseconds.
    pub fn now(&self) -> u64 {
        self.state.lock().expect("clock lock").now
    }

    /// Advance virtual time by `ms`, firing due callbacks in order of
    /// their deadlines (insertion order on ties). Callbacks run outside
    /// the clock's lock, so they may schedule or clear further
    /// timeouts.
    pub fn increment(&self, ms: u64) {
        let target = {
            let state = self.state.lock().expect("clock lock");
            state.now + ms
        };
        loop {
            let next = {
                let mut state = self.state.lock().expect("clock lock");
                let due = state
                    .scheduled
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.fire_at <= target)
                    .min_by_key(|(_, s)| (s.fire_at, s.id))
                    .map(|(index, _)| index);
                match due {
                    Some(index) => {
                        let scheduled = state.scheduled.remove(index);
                        state.now = state.now.max(scheduled.fire_at);
                        Some(scheduled.callback)
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };
            match next {
                Some(callback) => callback(),
                None => break,
            }
        }
    }
}

impl Clock for SimulatedClock {
    fn set_timeout(&self, f: TimerFn, ms: u64) -> TimerId {
        let mut state = self.state.lock().expect("clock lock");
        let id = state.next_id;
        state.next_id += 1;
        let fire_at = state.now + ms;
        state.scheduled.push(Scheduled {
            id,
            fire_at,
            callback: f,
        });
        id
    }

    fn clear_timeout(&self, id: TimerId) {
        let mut state = self.state.lock().expect("clock lock");
        state.scheduled.retain(|s| s.id != id);
    }
}

/// The real clock: one sleeping thread per pending timeout.
#[derive(Default)]
pub struct SystemClock {
    next_id: AtomicU64,
    active: Arc<Mutex<HashSet<TimerId>>>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn set_timeout(&self, f: TimerFn, ms: u64) -> TimerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::clone(&self.active);
        active.lock().expect("clock lock").insert(id);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(ms));
            let still_active = active.lock().expect("clock lock").remove(&id);
            if still_active {
                f();
            }
        });
        id
    }

    fn clear_timeout(&self, id: TimerId) {
        self.active.lock().expect("clock lock").remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_clock_fires_in_deadline_order() {
        let clock = SimulatedClock::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&order);
        clock.set_timeout(Box::new(move || log.lock().unwrap().push("late")), 20);
        let log = Arc::clone(&order);
        clock.set_timeout(Box::new(move || log.lock().unwrap().push("early")), 5);

        clock.increment(30);
        assert_eq!(*order.lock().unwrap(), vec!["early", "late"]);
    }

    #[test]
    fn simulated_clock_holds_until_due() {
        let clock = SimulatedClock::new();
        let fired = Arc::new(Mutex::new(false));

        let flag = Arc::clone(&fired);
        clock.set_timeout(Box::new(move || *flag.lock().unwrap() = true), 10);

        clock.increment(9);
        assert!(!*fired.lock().unwrap());
        clock.increment(1);
        assert!(*fired.lock().unwrap());
    }

    #[test]
    fn cleared_timeouts_never_fire() {
        let clock = SimulatedClock::new();
        let fired = Arc::new(Mutex::new(false));

        let flag = Arc::clone(&fired);
        let id = clock.set_timeout(Box::new(move || *flag.lock().unwrap() = true), 10);
        clock.clear_timeout(id);

        clock.increment(20);
        assert!(!*fired.lock().unwrap());
    }

    #[test]
    fn callbacks_may_reschedule() {
        let clock = SimulatedClock::new();
        let count = Arc::new(Mutex::new(0usize));

        // Scheduling from inside a callback must not deadlock.
        struct Chain {
            clock: Arc<SimulatedClock>,
            count: Arc<Mutex<usize>>,
        }
        fn arm(chain: Arc<Chain>) {
            let again = Arc::clone(&chain);
            chain.clock.set_timeout(
                Box::new(move || {
                    *again.count.lock().unwrap() += 1;
                    if *again.count.lock().unwrap() < 3 {
                        arm(Arc::clone(&again));
                    }
                }),
                10,
            );
        }

        let clock = Arc::new(clock);
        arm(Arc::new(Chain {
            clock: Arc::clone(&clock),
            count: Arc::clone(&count),
        }));

        clock.increment(100);
        assert_eq!(*count.lock().unwrap(), 3);
    }
}
