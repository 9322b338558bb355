/**
 * Shared model of everyone waiting at the hall buttons.
 *
 * One FIFO per (floor, direction) pair plus an atomic size counter. The
 * counter is the authoritative size: `count`/`has_waiting` never take a
 * lock and never observe a negative value. The queue mutex guards only the
 * O(1) push/pop critical sections; `peek` uses `try_lock` and degrades to
 * an empty prefix under contention, it exists for the status view only.
 *
 * All enqueues happen from the dispatcher thread; dequeues happen through
 * `board`, called (via the dispatcher) by the car currently exchanging
 * passengers at the floor.
 *
 * # Fields
 * - `n_floors`: Highest serviced floor; floors are 1-based.
 * - `queues`:   One slot per (floor, direction), Up then Down per floor.
 */

/***************************************/
/*             Libraries               */
/***************************************/
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/***************************************/
/*           Local modules             */
/***************************************/
use crate::shared::{Direction, Passenger};

/***************************************/
/*             Public API              */
/***************************************/
pub struct WaitingModel {
    n_floors: u8,
    queues: Vec<FloorQueue>,
}

struct FloorQueue {
    passengers: Mutex<VecDeque<Passenger>>,
    count: AtomicUsize,
}

impl WaitingModel {
    pub fn new(n_floors: u8) -> WaitingModel {
        let queues = (0..n_floors as usize * 2)
            .map(|_| FloorQueue {
                passengers: Mutex::new(VecDeque::new()),
                count: AtomicUsize::new(0),
            })
            .collect();

        WaitingModel { n_floors, queues }
    }

    /// None for out-of-range floors and for Idle, which is not a valid
    /// waiting direction.
    fn index(&self, floor: u8, direction: Direction) -> Option<usize> {
        if floor < 1 || floor > self.n_floors {
            return None;
        }
        let dir_slot = match direction {
            Direction::Up => 0,
            Direction::Down => 1,
            Direction::Idle => return None,
        };
        Some((floor as usize - 1) * 2 + dir_slot)
    }

    /// Append a passenger to the queue for their start floor and derived
    /// direction. Returns false (and drops the passenger) when the floor is
    /// out of range or start == target.
    pub fn submit(&self, passenger: Passenger) -> bool {
        let direction = passenger.direction();
        let slot = match self.index(passenger.start_floor, direction) {
            Some(i) => i,
            None => return false,
        };

        let queue = &self.queues[slot];
        queue.passengers.lock().unwrap().push_back(passenger);
        queue.count.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// Dequeue up to `max_k` passengers in FIFO order. The counter is
    /// decremented per pop, so a concurrent `count` never exceeds what is
    /// actually queued.
    pub fn board(&self, floor: u8, direction: Direction, max_k: usize) -> Vec<Passenger> {
        let slot = match self.index(floor, direction) {
            Some(i) => i,
            None => return Vec::new(),
        };

        let queue = &self.queues[slot];
        let mut boarded = Vec::new();
        let mut passengers = queue.passengers.lock().unwrap();
        while boarded.len() < max_k {
            match passengers.pop_front() {
                Some(p) => {
                    queue.count.fetch_sub(1, Ordering::SeqCst);
                    boarded.push(p);
                }
                None => break,
            }
        }
        boarded
    }

    pub fn count(&self, floor: u8, direction: Direction) -> usize {
        match self.index(floor, direction) {
            Some(i) => self.queues[i].count.load(Ordering::SeqCst),
            None => 0,
        }
    }

    pub fn has_waiting(&self, floor: u8, direction: Direction) -> bool {
        self.count(floor, direction) > 0
    }

    /// Best-effort prefix of the queue, for the status view. Returns an
    /// empty list when the queue is momentarily contended.
    pub fn peek(&self, floor: u8, direction: Direction, k: usize) -> Vec<Passenger> {
        let slot = match self.index(floor, direction) {
            Some(i) => i,
            None => return Vec::new(),
        };

        match self.queues[slot].passengers.try_lock() {
            Ok(passengers) => passengers.iter().take(k).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Total number of waiting passengers, used by the drain condition.
    pub fn total_waiting(&self) -> usize {
        self.queues
            .iter()
            .map(|q| q.count.load(Ordering::SeqCst))
            .sum()
    }

    pub fn n_floors(&self) -> u8 {
        self.n_floors
    }
}
