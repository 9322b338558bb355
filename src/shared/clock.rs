/**
 * Process-wide simulated clock.
 *
 * Every simulated duration in the system goes through `sleep`, which scales
 * simulated milliseconds by a live speed factor and blocks while the clock
 * is paused. Speed and pause may be changed from any thread at any time and
 * take effect within one slice of an ongoing sleep.
 *
 * # Fields
 * - `inner`:    Speed factor and pause flag, guarded by one mutex.
 * - `resume`:   Condition variable signalled on unpause and shutdown.
 * - `stopping`: Cooperative shutdown flag; makes `sleep` return early.
 */

/***************************************/
/*             Libraries               */
/***************************************/
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/***************************************/
/*             Constants               */
/***************************************/
pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 30.0;

/// Real-time granularity of a sleep. Small enough that pause, speed changes
/// and shutdown are picked up promptly.
const SLICE_MS: u64 = 20;

/***************************************/
/*             Public API              */
/***************************************/
pub struct SimClock {
    inner: Mutex<ClockState>,
    resume: Condvar,
    stopping: AtomicBool,
}

struct ClockState {
    speed: f64,
    paused: bool,
}

impl SimClock {
    pub fn new(speed: f64) -> SimClock {
        SimClock {
            inner: Mutex::new(ClockState {
                speed: speed.clamp(MIN_SPEED, MAX_SPEED),
                paused: false,
            }),
            resume: Condvar::new(),
            stopping: AtomicBool::new(false),
        }
    }

    pub fn speed(&self) -> f64 {
        self.inner.lock().unwrap().speed
    }

    pub fn set_speed(&self, speed: f64) {
        let mut state = self.inner.lock().unwrap();
        state.speed = speed.clamp(MIN_SPEED, MAX_SPEED);
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().unwrap().paused
    }

    pub fn set_paused(&self, paused: bool) {
        let mut state = self.inner.lock().unwrap();
        state.paused = paused;
        if !paused {
            self.resume.notify_all();
        }
    }

    /// Request cooperative shutdown: all ongoing and future sleeps return
    /// `false` as soon as they observe the flag.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.resume.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Sleep for `sim_ms` simulated milliseconds. Returns `false` if the
    /// sleep was cut short by shutdown, `true` if the full simulated
    /// duration elapsed.
    pub fn sleep(&self, sim_ms: u64) -> bool {
        let mut remaining = sim_ms as f64;

        while remaining > 0.0 {
            if self.is_shutdown() {
                return false;
            }

            let speed = {
                let mut state = self.inner.lock().unwrap();
                while state.paused && !self.is_shutdown() {
                    let (guard, _timeout) = self
                        .resume
                        .wait_timeout(state, Duration::from_millis(SLICE_MS))
                        .unwrap();
                    state = guard;
                }
                state.speed
            };

            if self.is_shutdown() {
                return false;
            }

            // One real slice advances `slice * speed` simulated milliseconds.
            let real_ms = SLICE_MS.min((remaining / speed).ceil() as u64).max(1);
            std::thread::sleep(Duration::from_millis(real_ms));
            remaining -= real_ms as f64 * speed;
        }

        !self.is_shutdown()
    }
}

/***************************************/
/*             Unit tests              */
/***************************************/
