use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Minimum time between the starts of two pipeline runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdmissionIntervals {
    /// Interval while the depth network also runs.
    pub with_depth: Duration,
    pub without_depth: Duration,
}

impl Default for AdmissionIntervals {
    fn default() -> Self {
        Self {
            with_depth: Duration::from_millis(700),
            without_depth: Duration::from_millis(300),
        }
    }
}

impl AdmissionIntervals {
    pub fn for_depth(&self, depth_enabled: bool) -> Duration {
        if depth_enabled {
            self.with_depth
        } else {
            self.without_depth
        }
    }
}

#[derive(Debug)]
struct GateState {
    running: bool,
    in_flight: bool,
    last_start: Option<Instant>,
    generation: u64,
}

/// Admission decision for one incoming frame.
#[derive(Debug)]
pub enum Admission {
    /// The frame may run; the ticket holds the single in-flight slot.
    Admitted(AdmissionTicket),
    /// Another run is in flight.
    Busy,
    /// The minimum interval since the last start has not elapsed.
    Throttled,
    /// Detection is stopped.
    Stopped,
}

/// One in-flight slot plus an interval timer.
///
/// Admission depends only on this state, never on whether the previous
/// result has been delivered. `stop` bumps the generation so results of runs
/// admitted earlier can be recognized as stale.
#[derive(Clone, Debug)]
pub struct AdmissionGate {
    state: Arc<Mutex<GateState>>,
    intervals: AdmissionIntervals,
}

impl AdmissionGate {
    /// A new gate is running and idle.
    pub fn new(intervals: AdmissionIntervals) -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState {
                running: true,
                in_flight: false,
                last_start: None,
                generation: 0,
            })),
            intervals,
        }
    }

    pub fn intervals(&self) -> AdmissionIntervals {
        self.intervals
    }

    pub fn try_admit(&self, now: Instant, depth_enabled: bool) -> Admission {
        let mut state = lock(&self.state);
        if !state.running {
            return Admission::Stopped;
        }
        if state.in_flight {
            return Admission::Busy;
        }
        if let Some(last) = state.last_start {
            if now.saturating_duration_since(last) < self.intervals.for_depth(depth_enabled) {
                return Admission::Throttled;
            }
        }
        state.in_flight = true;
        state.last_start = Some(now);
        Admission::Admitted(AdmissionTicket {
            state: self.state.clone(),
            generation: state.generation,
        })
    }

    pub fn start(&self) {
        let mut state = lock(&self.state);
        if !state.running {
            state.running = true;
            state.last_start = None;
        }
    }

    /// Refuse further admissions and invalidate tickets already issued.
    pub fn stop(&self) {
        let mut state = lock(&self.state);
        if state.running {
            state.running = false;
            state.generation += 1;
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    pub fn is_in_flight(&self) -> bool {
        lock(&self.state).in_flight
    }

    /// True when a run admitted under `generation` may still deliver its result.
    pub fn is_current(&self, generation: u64) -> bool {
        let state = lock(&self.state);
        state.running && state.generation == generation
    }
}

/// Holds the in-flight slot; dropping it frees the slot.
#[derive(Debug)]
pub struct AdmissionTicket {
    state: Arc<Mutex<GateState>>,
    generation: u64,
}

impl AdmissionTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for AdmissionTicket {
    fn drop(&mut self) {
        lock(&self.state).in_flight = false;
    }
}

// A panic while holding the lock leaves plain flags behind; keep using them.
fn lock(state: &Mutex<GateState>) -> MutexGuard<'_, GateState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
