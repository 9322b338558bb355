/**
 * Cost model for matching hall calls to cars.
 *
 * Pure functions over a car `Snapshot` and a `HallCall`: no locks, no side
 * effects. The dispatcher ranks candidate cars by `cost` and uses
 * `on_the_way` both as a discount and in the reassignment rules.
 *
 * # Fields
 * - `zoning_enabled`:     Soft zoning on/off.
 * - `zone_split_floor`:   Boundary floor between the low and high zone.
 * - `zone_soft_penalty`:  Cost added when a call lies outside a car's zone.
 * - `n_floors`:           Highest floor of the building.
 */

/***************************************/
/*           Local modules             */
/***************************************/
use crate::config::Config;
use crate::shared::{Direction, HallCall, Snapshot};

/***************************************/
/*             Constants               */
/***************************************/
const DIR_PENALTY_IDLE: f64 = 1.5;
const DIR_PENALTY_ON_THE_WAY: f64 = 1.0;
const DIR_PENALTY_SAME_BEHIND: f64 = 6.0;
const DIR_PENALTY_OPPOSITE: f64 = 8.0;

const LOAD_FACTOR_LIGHT: f64 = 1.0;
const LOAD_FACTOR_BUSY: f64 = 1.5;
const LOAD_FACTOR_HEAVY: f64 = 3.0;

const PLANNED_STOP_WEIGHT: i64 = 2;

/***************************************/
/*             Public API              */
/***************************************/
#[derive(Clone, Debug)]
pub struct CostStrategy {
    zoning_enabled: bool,
    zone_split_floor: u8,
    zone_soft_penalty: i64,
    n_floors: u8,
}

impl CostStrategy {
    pub fn new(config: &Config) -> CostStrategy {
        CostStrategy {
            zoning_enabled: config.zoning_enabled,
            zone_split_floor: config.zone_split_floor,
            zone_soft_penalty: config.zone_soft_penalty,
            n_floors: config.floors,
        }
    }

    /// True iff the call's floor is reachable without reversing: car and
    /// call share a direction and the floor lies ahead. Idle cars are never
    /// "on the way".
    pub fn on_the_way(snapshot: &Snapshot, call: &HallCall) -> bool {
        match (snapshot.direction, call.direction) {
            (Direction::Up, Direction::Up) => snapshot.current_floor <= call.floor,
            (Direction::Down, Direction::Down) => snapshot.current_floor >= call.floor,
            _ => false,
        }
    }

    pub fn cost(&self, snapshot: &Snapshot, call: &HallCall) -> i64 {
        let eta = Self::eta(snapshot, call);
        let dir_penalty = Self::direction_penalty(snapshot, call);
        let load_factor = Self::load_factor(snapshot);

        (eta * dir_penalty * load_factor).round() as i64
            + PLANNED_STOP_WEIGHT * snapshot.planned_stops as i64
            + self.zone_penalty(snapshot.id, call.floor)
    }

    /// Estimated floor distance to the call. For a car that has to finish
    /// its sweep first, the distance runs via the furthest committed stop
    /// in the current direction.
    fn eta(snapshot: &Snapshot, call: &HallCall) -> f64 {
        let cur = snapshot.current_floor as f64;
        let cf = call.floor as f64;

        if snapshot.direction == Direction::Idle {
            return (cur - cf).abs();
        }

        if snapshot.direction == call.direction && Self::on_the_way(snapshot, call) {
            return (cur - cf).abs();
        }

        // Two legs: ride out the current sweep, then come back for the call.
        let end = match snapshot.direction {
            Direction::Up => snapshot.furthest_up_stop,
            Direction::Down => snapshot.furthest_down_stop,
            Direction::Idle => 0,
        };
        let end = if end == 0 { cur } else { end as f64 };
        (cur - end).abs() + (end - cf).abs()
    }

    fn direction_penalty(snapshot: &Snapshot, call: &HallCall) -> f64 {
        if snapshot.direction == Direction::Idle {
            DIR_PENALTY_IDLE
        } else if snapshot.direction == call.direction {
            if Self::on_the_way(snapshot, call) {
                DIR_PENALTY_ON_THE_WAY
            } else {
                DIR_PENALTY_SAME_BEHIND
            }
        } else {
            DIR_PENALTY_OPPOSITE
        }
    }

    fn load_factor(snapshot: &Snapshot) -> f64 {
        if snapshot.capacity == 0 {
            return LOAD_FACTOR_HEAVY;
        }
        let ratio = snapshot.load as f64 / snapshot.capacity as f64;
        if ratio < 0.5 {
            LOAD_FACTOR_LIGHT
        } else if ratio < 0.8 {
            LOAD_FACTOR_BUSY
        } else {
            LOAD_FACTOR_HEAVY
        }
    }

    /// Soft zoning: car 1 prefers [1, split], car 2 prefers [split, F],
    /// every later car swings over the whole building.
    fn zone_penalty(&self, car_id: usize, floor: u8) -> i64 {
        if !self.zoning_enabled {
            return 0;
        }
        let (low, high) = match car_id {
            1 => (1, self.zone_split_floor),
            2 => (self.zone_split_floor, self.n_floors),
            _ => (1, self.n_floors),
        };
        if floor < low || floor > high {
            self.zone_soft_penalty
        } else {
            0
        }
    }
}
