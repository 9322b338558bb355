/**
 * Per-car scheduler.
 *
 * Owns one car's stop sets, direction commitment and door state, and runs
 * the control loop that picks targets, moves floor by floor on the
 * simulated clock, opens doors and exchanges passengers. The dispatcher
 * talks to it through the acceptance operations (`try_add_hall_call`,
 * `try_reserve_hall_call`, the side-effect-free oracle) which all take the
 * car's single lock for their critical section; the lock is never held
 * across a clock sleep.
 *
 * # Fields
 * - `id`:            1-based car id, also the zoning identity.
 * - `tuning`:        Per-car parameters copied out of the configuration.
 * - `state`:         Everything mutable, behind one mutex.
 * - `wakeup`:        Level-triggered wakeup for the control loop.
 * - `pending_calls`: Lock-free queue of calls that could not be admitted
 *                    immediately; retried after each door cycle.
 * - `waiting`:       Shared waiting model (read side: counts only).
 * - `clock`:         Simulated clock; all sleeps go through it.
 * - `dispatcher`:    Handle installed after wiring, held weakly.
 * - `running`:       Cooperative stop flag for the control loop.
 * - `delivered`:     Passengers dropped at their target so far.
 */

/***************************************/
/*        3rd party libraries          */
/***************************************/
use crossbeam_queue::SegQueue;
use log::{debug, info};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, Weak};
use std::time::Duration;

/***************************************/
/*           Local modules             */
/***************************************/
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::shared::{Direction, ElevatorStatus, HallCall, Passenger, SimClock, Snapshot};
use crate::waiting::WaitingModel;

/***************************************/
/*             Constants               */
/***************************************/
/// How many deferred calls are re-tried after one door cycle.
const PENDING_RETRY_BATCH: usize = 8;

/// Idle wait slice; the loop re-checks its stop flag at this cadence even
/// without a wakeup signal.
const IDLE_WAIT_MS: u64 = 100;

/***************************************/
/*               Enums                 */
/***************************************/
/// Answer of the side-effect-free acceptance oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptReason {
    Accepted,
    AcceptedReserved,
    FullCapacity,
    WrongDirection,
    OutOfRoute,
    TooManyStops,
    DoorsBusy,
}

/***************************************/
/*       Public data structures        */
/***************************************/
#[derive(Clone, Debug)]
pub struct CarTuning {
    pub n_floors: u8,
    pub capacity: usize,
    pub time_move_one_floor: u64,
    pub time_doors: u64,
    pub time_boarding: u64,
    pub max_planned_stops: usize,
    pub reserve_reverse_soon_floors: u8,
    pub enroute_pickup_enabled: bool,
    pub enroute_steal_min_assigned_distance: u8,
}

impl CarTuning {
    pub fn from_config(config: &Config) -> CarTuning {
        CarTuning {
            n_floors: config.floors,
            capacity: config.elevator_capacity,
            time_move_one_floor: config.time_move_one_floor,
            time_doors: config.time_doors,
            time_boarding: config.time_boarding,
            max_planned_stops: config.max_planned_stops,
            reserve_reverse_soon_floors: config.reserve_reverse_soon_floors,
            enroute_pickup_enabled: config.enroute_pickup_enabled,
            enroute_steal_min_assigned_distance: config.enroute_steal_min_assigned_distance,
        }
    }
}

struct CarState {
    current_floor: u8,
    visual_pos: f64,
    direction: Direction,
    status: ElevatorStatus,
    passengers: Vec<Passenger>,

    // Hall stops split by side relative to the current floor at insertion
    // time; internal stops mirror into them so one sweep covers both.
    stops_up: BTreeSet<u8>,
    stops_down: BTreeSet<u8>,
    internal_stops_up: BTreeSet<u8>,
    internal_stops_down: BTreeSet<u8>,

    hall_calls_by_floor: HashMap<u8, HashSet<Direction>>,
    reserved_hall_calls: HashSet<HallCall>,
}

impl CarState {
    fn new() -> CarState {
        CarState {
            current_floor: 1,
            visual_pos: 1.0,
            direction: Direction::Idle,
            status: ElevatorStatus::Idle,
            passengers: Vec::new(),
            stops_up: BTreeSet::new(),
            stops_down: BTreeSet::new(),
            internal_stops_up: BTreeSet::new(),
            internal_stops_down: BTreeSet::new(),
            hall_calls_by_floor: HashMap::new(),
            reserved_hall_calls: HashSet::new(),
        }
    }

    fn load(&self) -> usize {
        self.passengers.len()
    }

    fn planned_stops(&self) -> usize {
        self.stops_up.len() + self.stops_down.len()
    }

    fn has_no_work(&self) -> bool {
        self.passengers.is_empty()
            && self.stops_up.is_empty()
            && self.stops_down.is_empty()
            && self.internal_stops_up.is_empty()
            && self.internal_stops_down.is_empty()
    }

    fn is_committed(&self, call: &HallCall) -> bool {
        if self.reserved_hall_calls.contains(call) {
            return true;
        }
        self.hall_calls_by_floor
            .get(&call.floor)
            .map(|dirs| dirs.contains(&call.direction))
            .unwrap_or(false)
    }

    /// Furthest committed stops, from the stop sets and onboard targets.
    /// (0, 0) means none on that side. "Furthest down" is the lowest floor.
    fn furthest_stops(&self) -> (u8, u8) {
        let up = self
            .stops_up
            .iter()
            .next_back()
            .copied()
            .into_iter()
            .chain(self.internal_stops_up.iter().next_back().copied())
            .max()
            .unwrap_or(0);
        let down = self
            .stops_down
            .iter()
            .next()
            .copied()
            .into_iter()
            .chain(self.internal_stops_down.iter().next().copied())
            .min()
            .unwrap_or(0);
        (up, down)
    }

    fn has_stops_beyond(&self, direction: Direction) -> bool {
        match direction {
            Direction::Up => {
                let from = self.current_floor.saturating_add(1);
                self.stops_up.range(from..).next().is_some()
                    || self.internal_stops_up.range(from..).next().is_some()
            }
            Direction::Down => {
                self.stops_down.range(..self.current_floor).next().is_some()
                    || self
                        .internal_stops_down
                        .range(..self.current_floor)
                        .next()
                        .is_some()
            }
            Direction::Idle => false,
        }
    }
}

/***************************************/
/*             Public API              */
/***************************************/
pub struct CarScheduler {
    id: usize,
    tuning: CarTuning,
    state: Mutex<CarState>,
    wakeup: Condvar,
    pending_calls: SegQueue<HallCall>,
    waiting: Arc<WaitingModel>,
    clock: Arc<SimClock>,
    dispatcher: OnceLock<Weak<Dispatcher>>,
    running: AtomicBool,
    delivered: AtomicU64,
}

impl CarScheduler {
    pub fn new(
        id: usize,
        tuning: CarTuning,
        waiting: Arc<WaitingModel>,
        clock: Arc<SimClock>,
    ) -> CarScheduler {
        CarScheduler {
            id,
            tuning,
            state: Mutex::new(CarState::new()),
            wakeup: Condvar::new(),
            pending_calls: SegQueue::new(),
            waiting,
            clock,
            dispatcher: OnceLock::new(),
            running: AtomicBool::new(true),
            delivered: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Install the dispatcher handle after wiring. Only the first call
    /// takes effect.
    pub fn attach_dispatcher(&self, dispatcher: &Arc<Dispatcher>) {
        let _ = self.dispatcher.set(Arc::downgrade(dispatcher));
    }

    fn dispatcher(&self) -> Option<Arc<Dispatcher>> {
        self.dispatcher.get().and_then(|weak| weak.upgrade())
    }

    fn notify_dispatcher(&self) {
        if let Some(dispatcher) = self.dispatcher() {
            dispatcher.notify_elevator_update(self.id);
        }
    }

    /// Ask the control loop to exit. The thread unwinds at its next
    /// suspension point.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.wakeup.notify_all();
    }

    /*-------------------------------------*/
    /*   Operations used by the dispatcher  */
    /*-------------------------------------*/

    /// Try to commit a hall call to this car. Evaluated atomically under
    /// the car's lock; see the acceptance rules in order.
    pub fn try_add_hall_call(&self, floor: u8, direction: Direction) -> bool {
        if floor < 1 || floor > self.tuning.n_floors || direction == Direction::Idle {
            return false;
        }

        let mut state = self.state.lock().unwrap();

        // Rule 1: a full car takes nothing.
        if state.load() >= self.tuning.capacity {
            state.status = ElevatorStatus::LoadFull;
            return false;
        }

        // Rule 2: doors already open at the call's floor.
        if floor == state.current_floor && state.status == ElevatorStatus::DoorsOpen {
            state
                .hall_calls_by_floor
                .entry(floor)
                .or_default()
                .insert(direction);
            self.wakeup.notify_one();
            return true;
        }

        if state.status == ElevatorStatus::Moving {
            // Rule 3: a floor behind the sweep cannot be reached this trip.
            let behind = match state.direction {
                Direction::Up => floor < state.current_floor,
                Direction::Down => floor > state.current_floor,
                Direction::Idle => false,
            };
            if behind {
                return false;
            }

            // Rule 4: opposite direction only as a reservation, and only
            // for an empty car about to finish a trivial trip.
            if state.direction != Direction::Idle && direction != state.direction {
                if state.passengers.is_empty() && state.planned_stops() <= 1 {
                    state
                        .reserved_hall_calls
                        .insert(HallCall::new(floor, direction));
                    self.wakeup.notify_one();
                    return true;
                }
                return false;
            }
        }

        // Rule 5: idle, or same direction and ahead.
        state
            .hall_calls_by_floor
            .entry(floor)
            .or_default()
            .insert(direction);
        Self::add_stop_unlocked(&mut state, floor);
        self.wakeup.notify_one();
        true
    }

    /// Soft commitment used by the dispatcher's reservation passes.
    pub fn try_reserve_hall_call(&self, call: &HallCall) -> bool {
        if call.floor < 1 || call.floor > self.tuning.n_floors || call.direction == Direction::Idle
        {
            return false;
        }

        let mut state = self.state.lock().unwrap();
        if state.load() >= self.tuning.capacity {
            return false;
        }
        if state.planned_stops() >= self.tuning.max_planned_stops {
            return false;
        }
        state.reserved_hall_calls.insert(*call);
        self.wakeup.notify_one();
        true
    }

    /// Side-effect-free acceptance oracle.
    pub fn can_accept_hall_call_reason(&self, call: &HallCall) -> AcceptReason {
        let state = self.state.lock().unwrap();
        self.reason_unlocked(&state, call)
    }

    fn reason_unlocked(&self, state: &CarState, call: &HallCall) -> AcceptReason {
        if state.load() >= self.tuning.capacity {
            return AcceptReason::FullCapacity;
        }
        if state.planned_stops() >= self.tuning.max_planned_stops {
            return AcceptReason::TooManyStops;
        }

        let (furthest_up, furthest_down) = state.furthest_stops();

        if state.status == ElevatorStatus::DoorsOpen {
            return if call.floor == state.current_floor {
                if state.direction == Direction::Idle || state.direction == call.direction {
                    AcceptReason::Accepted
                } else {
                    AcceptReason::WrongDirection
                }
            } else {
                AcceptReason::DoorsBusy
            };
        }

        if state.direction == Direction::Idle {
            return AcceptReason::Accepted;
        }

        if state.direction == call.direction {
            let on_route = match call.direction {
                Direction::Up => {
                    let end = if furthest_up == 0 {
                        state.current_floor
                    } else {
                        furthest_up
                    };
                    call.floor >= state.current_floor && call.floor <= end
                }
                Direction::Down => {
                    let end = if furthest_down == 0 {
                        state.current_floor
                    } else {
                        furthest_down
                    };
                    call.floor <= state.current_floor && call.floor >= end
                }
                Direction::Idle => false,
            };
            return if on_route {
                AcceptReason::Accepted
            } else {
                AcceptReason::OutOfRoute
            };
        }

        // Opposite direction: an empty car close to its reversal point may
        // reserve the call for the way back.
        let reversal = match state.direction {
            Direction::Up => furthest_up,
            Direction::Down => furthest_down,
            Direction::Idle => 0,
        };
        if state.load() == 0 && reversal != 0 && state.planned_stops() <= 1 {
            let within = match state.direction {
                Direction::Up => call.floor >= state.current_floor && call.floor <= reversal,
                Direction::Down => call.floor <= state.current_floor && call.floor >= reversal,
                Direction::Idle => false,
            };
            let distance = (reversal as i16 - state.current_floor as i16).unsigned_abs();
            if within && distance <= self.tuning.reserve_reverse_soon_floors as u16 {
                return AcceptReason::AcceptedReserved;
            }
        }

        AcceptReason::WrongDirection
    }

    /// Whether a previously assigned call is still in good hands.
    pub fn can_continue_serving_assigned_call(&self, call: &HallCall) -> bool {
        let state = self.state.lock().unwrap();
        if state.is_committed(call) {
            return true;
        }
        if state.current_floor == call.floor && state.status == ElevatorStatus::DoorsOpen {
            return true;
        }
        matches!(
            self.reason_unlocked(&state, call),
            AcceptReason::Accepted | AcceptReason::AcceptedReserved | AcceptReason::DoorsBusy
        )
    }

    /// Hard commitment check used by the reassignment hysteresis.
    pub fn is_committed(&self, call: &HallCall) -> bool {
        self.state.lock().unwrap().is_committed(call)
    }

    /// Withdraw a hall commitment. The stop itself survives only if an
    /// onboard passenger or another hall direction still needs the floor.
    pub fn cancel_hall_call(&self, floor: u8, direction: Direction) {
        let mut state = self.state.lock().unwrap();
        state
            .reserved_hall_calls
            .remove(&HallCall::new(floor, direction));

        let now_empty = match state.hall_calls_by_floor.get_mut(&floor) {
            Some(dirs) => {
                dirs.remove(&direction);
                dirs.is_empty()
            }
            None => false,
        };
        if now_empty {
            state.hall_calls_by_floor.remove(&floor);
        }

        let internal_need = state.internal_stops_up.contains(&floor)
            || state.internal_stops_down.contains(&floor);
        let hall_need = state.hall_calls_by_floor.contains_key(&floor);
        if !internal_need && !hall_need {
            state.stops_up.remove(&floor);
            state.stops_down.remove(&floor);
        }
        self.wakeup.notify_one();
    }

    /// Defer a call this car could not admit right now; retried after the
    /// next door cycle.
    pub fn defer_hall_call(&self, call: HallCall) {
        self.pending_calls.push(call);
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.lock().unwrap();
        let (furthest_up, furthest_down) = state.furthest_stops();
        Snapshot {
            id: self.id,
            current_floor: state.current_floor,
            direction: state.direction,
            status: state.status,
            load: state.load(),
            capacity: self.tuning.capacity,
            planned_stops: state.planned_stops(),
            furthest_up_stop: furthest_up,
            furthest_down_stop: furthest_down,
        }
    }

    pub fn is_truly_idle(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.load() == 0 && state.planned_stops() == 0 && state.direction == Direction::Idle
    }

    /// Fractional cab position for the status view; lags `current_floor`
    /// while in motion.
    pub fn visual_position(&self) -> f64 {
        self.state.lock().unwrap().visual_pos
    }

    /*-------------------------------------*/
    /*            Control loop              */
    /*-------------------------------------*/

    pub fn run(&self) {
        info!("[car {}] SYSTEM control loop started", self.id);

        while self.running.load(Ordering::SeqCst) && !self.clock.is_shutdown() {
            let target = match self.await_work() {
                Some(floor) => floor,
                None => continue,
            };

            let reached = match self.move_to(target) {
                Some(floor) => floor,
                None => continue,
            };

            {
                let mut state = self.state.lock().unwrap();
                state.stops_up.remove(&reached);
                state.stops_down.remove(&reached);
                state.internal_stops_up.remove(&reached);
                state.internal_stops_down.remove(&reached);
                Self::update_direction_unlocked(&mut state);
            }
            info!("[car {}] ARRIVED floor {}", self.id, reached);

            self.operate_doors_and_exchange(reached);
        }

        info!("[car {}] SYSTEM control loop stopped", self.id);
    }

    /// Block until there is something to do; returns the next target
    /// floor, or None when stopping.
    fn await_work(&self) -> Option<u8> {
        let mut state = self.state.lock().unwrap();

        loop {
            if !self.running.load(Ordering::SeqCst) || self.clock.is_shutdown() {
                return None;
            }

            if !state.has_no_work() {
                Self::update_direction_unlocked(&mut state);
                if let Some(target) = Self::choose_next_target_unlocked(&state) {
                    return Some(target);
                }
            }

            // A reservation becomes a real stop only if someone is still
            // waiting for it by the time the car frees up.
            if state.passengers.is_empty() && !state.reserved_hall_calls.is_empty() {
                if self.activate_reservations_unlocked(&mut state) {
                    continue;
                }
            }

            // A hall commitment can land mid door cycle and outlive its
            // stop; fold it back into the stop sets instead of idling on it.
            if self.readmit_hall_commitments_unlocked(&mut state) {
                continue;
            }

            if state.direction != Direction::Idle || state.status != ElevatorStatus::Idle {
                state.direction = Direction::Idle;
                state.status = ElevatorStatus::Idle;
                self.notify_dispatcher();
            }

            let (guard, _timeout) = self
                .wakeup
                .wait_timeout(state, Duration::from_millis(IDLE_WAIT_MS))
                .unwrap();
            state = guard;
        }
    }

    /// Stop-set re-admission for commitments without a stop. Stale entries
    /// that nobody waits for anymore are dropped outright.
    fn readmit_hall_commitments_unlocked(&self, state: &mut CarState) -> bool {
        if !state.has_no_work() || state.hall_calls_by_floor.is_empty() {
            return false;
        }

        let committed: Vec<(u8, Direction)> = state
            .hall_calls_by_floor
            .iter()
            .flat_map(|(floor, dirs)| dirs.iter().map(|d| (*floor, *d)).collect::<Vec<_>>())
            .collect();

        let mut merged = false;
        for (floor, direction) in committed {
            if self.waiting.has_waiting(floor, direction) {
                Self::add_stop_unlocked(state, floor);
                merged = true;
            } else {
                let now_empty = match state.hall_calls_by_floor.get_mut(&floor) {
                    Some(dirs) => {
                        dirs.remove(&direction);
                        dirs.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    state.hall_calls_by_floor.remove(&floor);
                }
            }
        }
        merged
    }

    fn activate_reservations_unlocked(&self, state: &mut CarState) -> bool {
        let reserved: Vec<HallCall> = state.reserved_hall_calls.drain().collect();
        let mut merged = false;
        for call in reserved {
            if self.waiting.has_waiting(call.floor, call.direction) {
                state
                    .hall_calls_by_floor
                    .entry(call.floor)
                    .or_default()
                    .insert(call.direction);
                Self::add_stop_unlocked(state, call.floor);
                merged = true;
            } else {
                debug!(
                    "[car {}] dropping stale reservation ({}, {:?})",
                    self.id, call.floor, call.direction
                );
            }
        }
        merged
    }

    /// A floor at or above the cab classifies as "up".
    fn add_stop_unlocked(state: &mut CarState, floor: u8) {
        if floor >= state.current_floor {
            state.stops_up.insert(floor);
        } else {
            state.stops_down.insert(floor);
        }
    }

    /// Destination button of a just-boarded passenger. Mirrors into the
    /// hall stop set so one sweep serves both kinds.
    fn add_internal_stop_unlocked(state: &mut CarState, floor: u8) {
        if floor >= state.current_floor {
            state.internal_stops_up.insert(floor);
        } else {
            state.internal_stops_down.insert(floor);
        }
        Self::add_stop_unlocked(state, floor);
    }

    fn update_direction_unlocked(state: &mut CarState) {
        let up_side = !state.stops_up.is_empty() || !state.internal_stops_up.is_empty();
        let down_side = !state.stops_down.is_empty() || !state.internal_stops_down.is_empty();

        match state.direction {
            Direction::Idle => {
                if !up_side && !down_side {
                    return;
                }
                // Head toward the nearest pending stop; ties go up.
                let cur = state.current_floor;
                let nearest = state
                    .stops_up
                    .iter()
                    .chain(state.stops_down.iter())
                    .chain(state.internal_stops_up.iter())
                    .chain(state.internal_stops_down.iter())
                    .min_by_key(|f| (**f as i16 - cur as i16).unsigned_abs())
                    .copied();
                if let Some(floor) = nearest {
                    state.direction = if floor >= cur {
                        Direction::Up
                    } else {
                        Direction::Down
                    };
                }
            }
            Direction::Up => {
                if !up_side && down_side {
                    state.direction = Direction::Down;
                }
            }
            Direction::Down => {
                if !down_side && up_side {
                    state.direction = Direction::Up;
                }
            }
        }
    }

    /// Next floor to head for: internal stops in the current direction
    /// first (ceiling when going up, floor when going down, wrapping to
    /// the set's far end), then hall stops by the same rule. An idle car
    /// takes whichever pending target is closest.
    fn choose_next_target_unlocked(state: &CarState) -> Option<u8> {
        let cur = state.current_floor;

        let ceiling_or_first = |set: &BTreeSet<u8>| -> Option<u8> {
            set.range(cur..)
                .next()
                .or_else(|| set.iter().next())
                .copied()
        };
        let floor_or_last = |set: &BTreeSet<u8>| -> Option<u8> {
            set.range(..=cur)
                .next_back()
                .or_else(|| set.iter().next_back())
                .copied()
        };

        match state.direction {
            Direction::Up => ceiling_or_first(&state.internal_stops_up)
                .or_else(|| ceiling_or_first(&state.stops_up)),
            Direction::Down => floor_or_last(&state.internal_stops_down)
                .or_else(|| floor_or_last(&state.stops_down)),
            Direction::Idle => {
                let nearest = |sets: [&BTreeSet<u8>; 2]| -> Option<u8> {
                    sets.iter()
                        .flat_map(|s| s.iter())
                        .min_by_key(|f| (**f as i16 - cur as i16).unsigned_abs())
                        .copied()
                };
                let internal = nearest([&state.internal_stops_up, &state.internal_stops_down]);
                let hall = nearest([&state.stops_up, &state.stops_down]);
                match (internal, hall) {
                    (Some(i), Some(h)) => {
                        let di = (i as i16 - cur as i16).unsigned_abs();
                        let dh = (h as i16 - cur as i16).unsigned_abs();
                        Some(if di <= dh { i } else { h })
                    }
                    (Some(i), None) => Some(i),
                    (None, Some(h)) => Some(h),
                    (None, None) => None,
                }
            }
        }
    }

    /// Drive floor by floor toward `target`. Stops early at any floor that
    /// gained a stop in the meantime, or to pick up waiting passengers en
    /// route. Returns the floor actually reached, or None on shutdown.
    fn move_to(&self, target: u8) -> Option<u8> {
        {
            let mut state = self.state.lock().unwrap();
            if state.current_floor == target {
                return Some(target);
            }
            state.status = ElevatorStatus::Moving;
            state.direction = if target > state.current_floor {
                Direction::Up
            } else {
                Direction::Down
            };
        }
        self.notify_dispatcher();

        loop {
            if !self.clock.sleep(self.tuning.time_move_one_floor) {
                return None;
            }

            let (reached, direction, stop_here) = {
                let mut state = self.state.lock().unwrap();
                let next = match state.direction {
                    Direction::Up => state.current_floor.saturating_add(1).min(self.tuning.n_floors),
                    Direction::Down => state.current_floor.saturating_sub(1).max(1),
                    Direction::Idle => state.current_floor,
                };
                state.current_floor = next;
                state.visual_pos = next as f64;

                let listed = state.stops_up.contains(&next)
                    || state.stops_down.contains(&next)
                    || state.internal_stops_up.contains(&next)
                    || state.internal_stops_down.contains(&next);
                (next, state.direction, listed || next == target)
            };

            if stop_here {
                return Some(reached);
            }

            if self.tuning.enroute_pickup_enabled && self.consider_enroute_pickup(reached, direction)
            {
                return Some(reached);
            }
        }
    }

    /// En-route pickup: someone is waiting at a floor the car is passing,
    /// in its travel direction. Unassigned calls (and our own) are always
    /// taken; another car's call is stolen only when that car is moving
    /// away or still far off, and only with the dispatcher's blessing.
    fn consider_enroute_pickup(&self, floor: u8, direction: Direction) -> bool {
        if direction == Direction::Idle || !self.waiting.has_waiting(floor, direction) {
            return false;
        }
        {
            let state = self.state.lock().unwrap();
            if state.load() >= self.tuning.capacity {
                return false;
            }
            if state.planned_stops() >= self.tuning.max_planned_stops {
                return false;
            }
        }

        let dispatcher = match self.dispatcher() {
            Some(d) => d,
            None => return false,
        };
        let call = HallCall::new(floor, direction);

        if let Some(assignee) = dispatcher.assignment_of(&call) {
            if assignee != self.id {
                let moving_away_or_far = match dispatcher.snapshot_of(assignee) {
                    Some(other) => {
                        let moving_away = match other.direction {
                            Direction::Up => other.current_floor >= floor,
                            Direction::Down => other.current_floor <= floor,
                            Direction::Idle => false,
                        };
                        let distance = (other.current_floor as i16 - floor as i16).unsigned_abs();
                        moving_away
                            || distance >= self.tuning.enroute_steal_min_assigned_distance as u16
                    }
                    None => true,
                };
                if !moving_away_or_far {
                    return false;
                }
            }
        }

        if !dispatcher.claim_hall_call_at_floor(floor, direction, self.id) {
            return false;
        }

        let mut state = self.state.lock().unwrap();
        state
            .hall_calls_by_floor
            .entry(floor)
            .or_default()
            .insert(direction);
        true
    }

    /// One full door cycle at `floor`: open, offload, board in one chosen
    /// direction, close. Sleeps happen without the lock; on shutdown the
    /// remaining sleeps are skipped but the door state is still unwound.
    fn operate_doors_and_exchange(&self, floor: u8) {
        {
            let mut state = self.state.lock().unwrap();
            if state.status == ElevatorStatus::DoorsOpen && state.current_floor == floor {
                return;
            }
            state.status = ElevatorStatus::DoorsOpen;
        }
        info!("[car {}] DOOR OPEN floor {}", self.id, floor);
        self.notify_dispatcher();
        let mut alive = self.clock.sleep(self.tuning.time_doors);

        // Offload everyone whose target is this floor.
        let disembarked: Vec<Passenger> = {
            let mut state = self.state.lock().unwrap();
            let (out, keep) = state
                .passengers
                .drain(..)
                .partition(|p| p.target_floor == floor);
            state.passengers = keep;
            out
        };
        for passenger in &disembarked {
            self.delivered.fetch_add(1, Ordering::SeqCst);
            info!(
                "[car {}] DISEMBARK passenger {} floor {}",
                self.id, passenger.id, floor
            );
        }

        // Which directions this stop serves; an unsolicited stop serves both.
        let (allowed, board_direction, room) = {
            let state = self.state.lock().unwrap();
            let mut allowed: HashSet<Direction> = state
                .hall_calls_by_floor
                .get(&floor)
                .cloned()
                .unwrap_or_default();
            if allowed.is_empty() {
                allowed.insert(Direction::Up);
                allowed.insert(Direction::Down);
            }
            let board_direction = self.choose_boarding_direction(&state, floor, &allowed);
            let room = self.tuning.capacity.saturating_sub(state.load());
            (allowed, board_direction, room)
        };

        if alive && room > 0 {
            if let Some(direction) = board_direction {
                if let Some(dispatcher) = self.dispatcher() {
                    let newcomers = dispatcher.board_passengers(floor, direction, room);
                    if !newcomers.is_empty() {
                        let boarded = newcomers.len();
                        let mut state = self.state.lock().unwrap();
                        for passenger in newcomers {
                            info!(
                                "[car {}] BOARD passenger {} floor {} -> {}",
                                self.id, passenger.id, floor, passenger.target_floor
                            );
                            Self::add_internal_stop_unlocked(&mut state, passenger.target_floor);
                            state.passengers.push(passenger);
                        }
                        // Reservations are a promise of an empty car.
                        state.reserved_hall_calls.clear();
                        drop(state);
                        alive &= self
                            .clock
                            .sleep(self.tuning.time_boarding * boarded as u64);
                    }
                }
            }
        }

        // The served directions are no longer committed at this floor.
        {
            let mut state = self.state.lock().unwrap();
            let now_empty = match state.hall_calls_by_floor.get_mut(&floor) {
                Some(dirs) => {
                    for direction in &allowed {
                        dirs.remove(direction);
                    }
                    dirs.is_empty()
                }
                None => false,
            };
            if now_empty {
                state.hall_calls_by_floor.remove(&floor);
            }
        }

        if alive {
            let _ = self.clock.sleep(self.tuning.time_doors);
        }
        info!("[car {}] DOOR CLOSE floor {}", self.id, floor);

        {
            let mut state = self.state.lock().unwrap();
            state.status = if state.load() >= self.tuning.capacity {
                ElevatorStatus::LoadFull
            } else {
                ElevatorStatus::Moving
            };
        }

        self.drain_pending_calls();
        self.notify_dispatcher();
    }

    /// Boarding direction for one door cycle. With riders aboard the car
    /// only tops up in its travel direction; an empty car finishes its
    /// sweep before reversing; an idle car takes the busier side.
    fn choose_boarding_direction(
        &self,
        state: &CarState,
        floor: u8,
        allowed: &HashSet<Direction>,
    ) -> Option<Direction> {
        let up_waiting =
            allowed.contains(&Direction::Up) && self.waiting.has_waiting(floor, Direction::Up);
        let down_waiting =
            allowed.contains(&Direction::Down) && self.waiting.has_waiting(floor, Direction::Down);

        if !up_waiting && !down_waiting {
            return None;
        }

        if !state.passengers.is_empty() {
            return match state.direction {
                Direction::Up if up_waiting => Some(Direction::Up),
                Direction::Down if down_waiting => Some(Direction::Down),
                _ => None,
            };
        }

        match state.direction {
            Direction::Up => {
                if up_waiting {
                    Some(Direction::Up)
                } else if state.has_stops_beyond(Direction::Up) {
                    None
                } else {
                    Some(Direction::Down)
                }
            }
            Direction::Down => {
                if down_waiting {
                    Some(Direction::Down)
                } else if state.has_stops_beyond(Direction::Down) {
                    None
                } else {
                    Some(Direction::Up)
                }
            }
            Direction::Idle => {
                if up_waiting && down_waiting {
                    let up_count = self.waiting.count(floor, Direction::Up);
                    let down_count = self.waiting.count(floor, Direction::Down);
                    Some(if up_count >= down_count {
                        Direction::Up
                    } else {
                        Direction::Down
                    })
                } else if up_waiting {
                    Some(Direction::Up)
                } else {
                    Some(Direction::Down)
                }
            }
        }
    }

    /// Retry a batch of deferred calls: drop the ones nobody waits for,
    /// push the still-inadmissible ones back for later.
    fn drain_pending_calls(&self) {
        let mut batch = Vec::with_capacity(PENDING_RETRY_BATCH);
        while batch.len() < PENDING_RETRY_BATCH {
            match self.pending_calls.pop() {
                Some(call) => batch.push(call),
                None => break,
            }
        }

        for call in batch {
            if !self.waiting.has_waiting(call.floor, call.direction) {
                continue;
            }
            if !self.try_add_hall_call(call.floor, call.direction) {
                self.pending_calls.push(call);
            } else {
                debug!(
                    "[car {}] admitted deferred call ({}, {:?})",
                    self.id, call.floor, call.direction
                );
            }
        }
    }
}

/***************************************/
/*              Test API               */
/***************************************/
