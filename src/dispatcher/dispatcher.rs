/**
 * Hall-call assignment engine.
 *
 * A single worker thread consumes an event queue (new passenger requests,
 * car state changes) and runs a dispatch pass over all pending hall calls:
 * unserved calls are matched to the cheapest willing car, stale
 * assignments are released, and a better car may take over a call once the
 * hysteresis window allows it. Cars call back in to claim a call at their
 * floor while passing, and to board waiting passengers, which is the only
 * path that consumes them.
 *
 * The assignment table lock is never held while calling into a car, and
 * cars never call in here while holding their own state lock, so the two
 * component locks cannot deadlock.
 *
 * # Fields
 * - `event_tx` / `event_rx`:         MPMC event queue (unbounded).
 * - `terminate_tx` / `terminate_rx`: Termination signal for the worker.
 * - `waiting`:                       Shared waiting model.
 * - `cars`:                          Fleet handles, wired once at startup.
 * - `table`:                         Pending calls, assignments, throttle
 *                                    and hysteresis timestamps.
 * - `cost`:                          Cost strategy for ranking cars.
 * - `tuning`:                        Dispatcher parameters from config.
 */

/***************************************/
/*        3rd party libraries          */
/***************************************/
use crossbeam_channel as cbc;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/***************************************/
/*           Local modules             */
/***************************************/
use crate::config::Config;
use crate::dispatcher::CostStrategy;
use crate::elevator::{AcceptReason, CarScheduler};
use crate::shared::{Direction, ElevatorStatus, HallCall, Passenger};
use crate::waiting::WaitingModel;

/***************************************/
/*             Constants               */
/***************************************/
const ASSIGNED_CALL_WEIGHT: i64 = 6;
const ON_THE_WAY_DISCOUNT: i64 = 3;
const RESERVED_REVERSE_PENALTY: i64 = 25;
const RESERVE_DISTANCE_WEIGHT: i64 = 6;

/// Worker poll timeout; doubles as the safety tick.
const EVENT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/***************************************/
/*               Enums                 */
/***************************************/
pub enum DispatcherEvent {
    PassengerRequest(Passenger),
    ElevatorUpdate(usize),
}

/// Which of the three selection passes produced a pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickMode {
    Normal,
    ReservedReverseSoon,
    Reserve,
}

/***************************************/
/*       Public data structures        */
/***************************************/
#[derive(Clone, Debug)]
pub struct DispatcherTuning {
    pub event_batch: usize,
    pub call_reassign_cooldown_ms: u64,
    pub call_reassign_min_improvement: i64,
    pub no_elevator_log_cooldown_ms: u64,
}

impl DispatcherTuning {
    pub fn from_config(config: &Config) -> DispatcherTuning {
        DispatcherTuning {
            event_batch: config.dispatcher_event_batch,
            call_reassign_cooldown_ms: config.call_reassign_cooldown_ms,
            call_reassign_min_improvement: config.call_reassign_min_improvement,
            no_elevator_log_cooldown_ms: config.no_elevator_log_cooldown_ms,
        }
    }
}

struct AssignmentTable {
    pending: HashSet<HallCall>,
    assigned: HashMap<HallCall, usize>,
    last_reassign: HashMap<HallCall, Instant>,
    last_no_elevator_log: HashMap<HallCall, Instant>,
}

impl AssignmentTable {
    fn new() -> AssignmentTable {
        AssignmentTable {
            pending: HashSet::new(),
            assigned: HashMap::new(),
            last_reassign: HashMap::new(),
            last_no_elevator_log: HashMap::new(),
        }
    }

    /// Forget a call entirely, returning its previous assignee.
    fn forget(&mut self, call: &HallCall) -> Option<usize> {
        self.pending.remove(call);
        self.last_reassign.remove(call);
        self.last_no_elevator_log.remove(call);
        self.assigned.remove(call)
    }
}

/***************************************/
/*             Public API              */
/***************************************/
pub struct Dispatcher {
    event_tx: cbc::Sender<DispatcherEvent>,
    event_rx: cbc::Receiver<DispatcherEvent>,
    terminate_tx: cbc::Sender<()>,
    terminate_rx: cbc::Receiver<()>,
    waiting: Arc<WaitingModel>,
    cars: RwLock<Vec<Arc<CarScheduler>>>,
    table: Mutex<AssignmentTable>,
    cost: CostStrategy,
    tuning: DispatcherTuning,
}

impl Dispatcher {
    pub fn new(
        waiting: Arc<WaitingModel>,
        cost: CostStrategy,
        tuning: DispatcherTuning,
    ) -> Dispatcher {
        let (event_tx, event_rx) = cbc::unbounded::<DispatcherEvent>();
        let (terminate_tx, terminate_rx) = cbc::unbounded::<()>();
        Dispatcher {
            event_tx,
            event_rx,
            terminate_tx,
            terminate_rx,
            waiting,
            cars: RwLock::new(Vec::new()),
            table: Mutex::new(AssignmentTable::new()),
            cost,
            tuning,
        }
    }

    /// Wire the fleet in once, after every car has been constructed.
    pub fn register_cars(&self, cars: Vec<Arc<CarScheduler>>) {
        *self.cars.write().unwrap() = cars;
    }

    fn car(&self, id: usize) -> Option<Arc<CarScheduler>> {
        self.cars
            .read()
            .unwrap()
            .iter()
            .find(|car| car.id() == id)
            .cloned()
    }

    /*-------------------------------------*/
    /*        Inbound notifications         */
    /*-------------------------------------*/

    pub fn submit_request(&self, passenger: Passenger) {
        info!(
            "[dispatcher] REQUEST passenger {} floor {} -> {}",
            passenger.id, passenger.start_floor, passenger.target_floor
        );
        let _ = self
            .event_tx
            .send(DispatcherEvent::PassengerRequest(passenger));
    }

    pub fn notify_elevator_update(&self, car_id: usize) {
        let _ = self.event_tx.send(DispatcherEvent::ElevatorUpdate(car_id));
    }

    /// Ask the worker loop to exit.
    pub fn stop(&self) {
        let _ = self.terminate_tx.send(());
    }

    /*-------------------------------------*/
    /*         Car-facing operations        */
    /*-------------------------------------*/

    /// Pop up to `max_k` waiting passengers for a car exchanging at the
    /// floor. The only consumer of the waiting model; when the queue
    /// empties the call is retired and its assignee released.
    pub fn board_passengers(
        &self,
        floor: u8,
        direction: Direction,
        max_k: usize,
    ) -> Vec<Passenger> {
        let boarded = self.waiting.board(floor, direction, max_k);

        if self.waiting.count(floor, direction) == 0 {
            let call = HallCall::new(floor, direction);
            let previous = self.table.lock().unwrap().forget(&call);
            if let Some(id) = previous {
                if let Some(car) = self.car(id) {
                    car.cancel_hall_call(floor, direction);
                }
            }
        }

        boarded
    }

    /// At-the-floor handoff: a passing car takes over a call someone is
    /// still waiting for. Counts as a reassignment for the hysteresis.
    pub fn claim_hall_call_at_floor(
        &self,
        floor: u8,
        direction: Direction,
        claimer: usize,
    ) -> bool {
        if !self.waiting.has_waiting(floor, direction) {
            return false;
        }

        let call = HallCall::new(floor, direction);
        let previous = {
            let mut table = self.table.lock().unwrap();
            table.pending.insert(call);
            table.last_reassign.insert(call, Instant::now());
            table.assigned.insert(call, claimer)
        };

        if let Some(id) = previous {
            if id != claimer {
                if let Some(car) = self.car(id) {
                    car.cancel_hall_call(floor, direction);
                }
            }
        }

        info!(
            "[dispatcher] ASSIGN call ({}, {:?}) -> car {} (claimed at floor)",
            floor, direction, claimer
        );
        true
    }

    pub fn assignment_of(&self, call: &HallCall) -> Option<usize> {
        self.table.lock().unwrap().assigned.get(call).copied()
    }

    pub fn snapshot_of(&self, car_id: usize) -> Option<crate::shared::Snapshot> {
        self.car(car_id).map(|car| car.snapshot())
    }

    /*-------------------------------------*/
    /*            Drain condition           */
    /*-------------------------------------*/

    pub fn pending_count(&self) -> usize {
        self.table.lock().unwrap().pending.len()
    }

    pub fn assignment_count(&self) -> usize {
        self.table.lock().unwrap().assigned.len()
    }

    /*-------------------------------------*/
    /*             Worker loop              */
    /*-------------------------------------*/

    pub fn run(&self) {
        info!("[dispatcher] SYSTEM worker started");

        loop {
            cbc::select! {
                recv(self.event_rx) -> event => {
                    match event {
                        Ok(event) => {
                            self.handle_event(event);
                            // Drain a bounded batch before one dispatch
                            // pass; keeps bursts from starving dispatch.
                            for _ in 0..self.tuning.event_batch {
                                match self.event_rx.try_recv() {
                                    Ok(event) => self.handle_event(event),
                                    Err(_) => break,
                                }
                            }
                            self.dispatch_pass();
                        }
                        Err(_) => break,
                    }
                }
                recv(self.terminate_rx) -> _ => {
                    break;
                }
                default(EVENT_POLL_TIMEOUT) => {
                    // Safety tick
                    self.dispatch_pass();
                }
            }
        }

        info!("[dispatcher] SYSTEM worker stopped");
    }

    fn handle_event(&self, event: DispatcherEvent) {
        match event {
            DispatcherEvent::PassengerRequest(passenger) => {
                let call = HallCall::new(passenger.start_floor, passenger.direction());
                if self.waiting.submit(passenger) {
                    self.table.lock().unwrap().pending.insert(call);
                } else {
                    debug!("[dispatcher] dropping out-of-range request {:?}", call);
                }
            }
            DispatcherEvent::ElevatorUpdate(_car_id) => {
                // No direct work; the update triggers the dispatch pass.
            }
        }
    }

    /*-------------------------------------*/
    /*            Dispatch pass             */
    /*-------------------------------------*/

    fn dispatch_pass(&self) {
        let calls: Vec<HallCall> = {
            let table = self.table.lock().unwrap();
            table.pending.iter().copied().collect()
        };

        for call in calls {
            // Nobody left behind this button: retire it.
            if !self.waiting.has_waiting(call.floor, call.direction) {
                let previous = self.table.lock().unwrap().forget(&call);
                if let Some(id) = previous {
                    if let Some(car) = self.car(id) {
                        car.cancel_hall_call(call.floor, call.direction);
                    }
                }
                continue;
            }

            let current = {
                let table = self.table.lock().unwrap();
                table.assigned.get(&call).copied()
            };

            if let Some(id) = current {
                match self.car(id) {
                    Some(car) => {
                        if car.can_continue_serving_assigned_call(&call) {
                            if self.should_reassign(&call, &car) {
                                self.table.lock().unwrap().assigned.remove(&call);
                                car.cancel_hall_call(call.floor, call.direction);
                                debug!(
                                    "[dispatcher] releasing call ({}, {:?}) from car {} for a better pick",
                                    call.floor, call.direction, id
                                );
                            } else {
                                continue;
                            }
                        } else {
                            self.table.lock().unwrap().assigned.remove(&call);
                            car.cancel_hall_call(call.floor, call.direction);
                        }
                    }
                    None => {
                        self.table.lock().unwrap().assigned.remove(&call);
                    }
                }
            }

            let (best, mode) = match self.find_best_elevator(&call) {
                Some(pick) => pick,
                None => {
                    self.log_no_elevator(&call);
                    continue;
                }
            };

            let committed = match mode {
                PickMode::Normal => best.try_add_hall_call(call.floor, call.direction),
                PickMode::ReservedReverseSoon | PickMode::Reserve => {
                    best.try_reserve_hall_call(&call)
                }
            };

            if committed {
                {
                    let mut table = self.table.lock().unwrap();
                    table.assigned.insert(call, best.id());
                    table.last_reassign.insert(call, Instant::now());
                }
                info!(
                    "[dispatcher] ASSIGN call ({}, {:?}) -> car {} ({:?})",
                    call.floor,
                    call.direction,
                    best.id(),
                    mode
                );
            } else {
                // Lost the race against the car's own bookkeeping; the
                // call stays pending and is also deferred on the car.
                warn!(
                    "[dispatcher] REJECTED call ({}, {:?}) by car {}: FULL_CAPACITY",
                    call.floor,
                    call.direction,
                    best.id()
                );
                best.defer_hall_call(call);
            }
        }
    }

    /// Assignments currently held per car.
    fn assigned_counts(&self) -> HashMap<usize, usize> {
        let table = self.table.lock().unwrap();
        let mut counts: HashMap<usize, usize> = HashMap::new();
        for id in table.assigned.values() {
            *counts.entry(*id).or_insert(0) += 1;
        }
        counts
    }

    /// Three selection passes: willing cars first, then reserve-on-
    /// reversal candidates, then any empty standing car as a last resort.
    fn find_best_elevator(&self, call: &HallCall) -> Option<(Arc<CarScheduler>, PickMode)> {
        let cars: Vec<Arc<CarScheduler>> = self.cars.read().unwrap().clone();
        let assigned_counts = self.assigned_counts();

        // Full ordering for the NORMAL pass: score, then fewer assigned
        // calls, fewer planned stops, lower load.
        let mut best_normal: Option<((i64, usize, usize, usize), Arc<CarScheduler>)> = None;
        let mut best_reserved: Option<(i64, Arc<CarScheduler>)> = None;
        let mut best_fallback: Option<(i64, Arc<CarScheduler>)> = None;

        for car in &cars {
            let snapshot = car.snapshot();
            let reason = car.can_accept_hall_call_reason(call);
            let assigned = assigned_counts.get(&car.id()).copied().unwrap_or(0);

            match reason {
                AcceptReason::Accepted => {
                    let mut score =
                        self.cost.cost(&snapshot, call) + ASSIGNED_CALL_WEIGHT * assigned as i64;
                    if CostStrategy::on_the_way(&snapshot, call) {
                        score -= ON_THE_WAY_DISCOUNT;
                    }
                    let key = (score, assigned, snapshot.planned_stops, snapshot.load);
                    if best_normal.as_ref().map_or(true, |(k, _)| key < *k) {
                        best_normal = Some((key, Arc::clone(car)));
                    }
                }
                AcceptReason::AcceptedReserved => {
                    if snapshot.load < snapshot.capacity
                        && snapshot.status != ElevatorStatus::DoorsOpen
                    {
                        let score = self.cost.cost(&snapshot, call)
                            + RESERVED_REVERSE_PENALTY
                            + ASSIGNED_CALL_WEIGHT * assigned as i64;
                        if best_reserved.as_ref().map_or(true, |(s, _)| score < *s) {
                            best_reserved = Some((score, Arc::clone(car)));
                        }
                    }
                }
                _ => {}
            }

            if snapshot.load == 0
                && snapshot.planned_stops == 0
                && snapshot.status != ElevatorStatus::DoorsOpen
            {
                let distance = (snapshot.current_floor as i64 - call.floor as i64).abs();
                let score = RESERVE_DISTANCE_WEIGHT * distance
                    + ASSIGNED_CALL_WEIGHT * assigned as i64;
                if best_fallback.as_ref().map_or(true, |(s, _)| score < *s) {
                    best_fallback = Some((score, Arc::clone(car)));
                }
            }
        }

        if let Some((_, car)) = best_normal {
            return Some((car, PickMode::Normal));
        }
        if let Some((_, car)) = best_reserved {
            return Some((car, PickMode::ReservedReverseSoon));
        }
        if let Some((_, car)) = best_fallback {
            return Some((car, PickMode::Reserve));
        }
        None
    }

    /// Reassignment hysteresis: every rule must hold before a call is
    /// taken away from a car that could still serve it.
    fn should_reassign(&self, call: &HallCall, current: &Arc<CarScheduler>) -> bool {
        {
            let table = self.table.lock().unwrap();
            if let Some(stamp) = table.last_reassign.get(call) {
                if stamp.elapsed()
                    < Duration::from_millis(self.tuning.call_reassign_cooldown_ms)
                {
                    return false;
                }
            }
        }

        if current.is_committed(call) {
            return false;
        }

        let current_snapshot = current.snapshot();
        if (current_snapshot.current_floor as i16 - call.floor as i16).abs() <= 1 {
            return false;
        }

        let (best, mode) = match self.find_best_elevator(call) {
            Some(pick) => pick,
            None => return false,
        };
        if mode != PickMode::Normal || best.id() == current.id() {
            return false;
        }

        let best_snapshot = best.snapshot();
        if best_snapshot.direction != Direction::Idle
            && !CostStrategy::on_the_way(&best_snapshot, call)
        {
            return false;
        }

        let counts = self.assigned_counts();
        let current_cost = self.effective_cost(&current_snapshot, call, &counts);
        let best_cost = self.effective_cost(&best_snapshot, call, &counts);
        current_cost - best_cost >= self.tuning.call_reassign_min_improvement
    }

    /// The NORMAL-pass score of one car, including the assignment load
    /// and on-the-way adjustments.
    fn effective_cost(
        &self,
        snapshot: &crate::shared::Snapshot,
        call: &HallCall,
        counts: &HashMap<usize, usize>,
    ) -> i64 {
        let assigned = counts.get(&snapshot.id).copied().unwrap_or(0);
        let mut score = self.cost.cost(snapshot, call) + ASSIGNED_CALL_WEIGHT * assigned as i64;
        if CostStrategy::on_the_way(snapshot, call) {
            score -= ON_THE_WAY_DISCOUNT;
        }
        score
    }

    fn log_no_elevator(&self, call: &HallCall) {
        let cooldown = Duration::from_millis(self.tuning.no_elevator_log_cooldown_ms);
        let should_log = {
            let mut table = self.table.lock().unwrap();
            let due = table
                .last_no_elevator_log
                .get(call)
                .map_or(true, |stamp| stamp.elapsed() >= cooldown);
            if due {
                table.last_no_elevator_log.insert(*call, Instant::now());
            }
            due
        };
        if should_log {
            warn!(
                "[dispatcher] NO_ELEVATOR for call ({}, {:?})",
                call.floor, call.direction
            );
        }
    }
}

/***************************************/
/*              Test API               */
/***************************************/
