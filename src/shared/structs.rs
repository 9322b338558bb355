/***************************************/
/*        3rd party libraries          */
/***************************************/
use serde::Deserialize;
use serde::Serialize;

/***************************************/
/*       Public data structures        */
/***************************************/
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Idle,
}

impl Direction {
    pub fn opposite(&self) -> Direction {
        match *self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Idle => Direction::Idle,
        }
    }

    /// Direction of travel from one floor to another. Equal floors map to Idle.
    pub fn of_travel(from: u8, to: u8) -> Direction {
        if to > from {
            Direction::Up
        } else if to < from {
            Direction::Down
        } else {
            Direction::Idle
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ElevatorStatus {
    Idle,
    Moving,
    DoorsOpen,
    LoadFull,
}

/// A rider. Direction is derived from the start/target pair, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passenger {
    pub id: u64,
    pub start_floor: u8,
    pub target_floor: u8,
}

impl Passenger {
    pub fn new(id: u64, start_floor: u8, target_floor: u8) -> Passenger {
        Passenger {
            id,
            start_floor,
            target_floor,
        }
    }

    pub fn direction(&self) -> Direction {
        Direction::of_travel(self.start_floor, self.target_floor)
    }
}

/// External button press: (floor, direction). Structural equality, used as
/// a map key by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HallCall {
    pub floor: u8,
    pub direction: Direction,
}

impl HallCall {
    pub fn new(floor: u8, direction: Direction) -> HallCall {
        HallCall { floor, direction }
    }
}

/// Point-in-time view of one car, produced under the car's lock so that
/// floor, direction, status, load and stops are mutually consistent.
/// `furthest_up_stop`/`furthest_down_stop` of 0 mean "none".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id: usize,
    pub current_floor: u8,
    pub direction: Direction,
    pub status: ElevatorStatus,
    pub load: usize,
    pub capacity: usize,
    pub planned_stops: usize,
    pub furthest_up_stop: u8,
    pub furthest_down_stop: u8,
}

/***************************************/
/*             Unit tests              */
/***************************************/
#[cfg(test)]
mod structs_tests {
    use super::*;

    #[test]
    fn test_direction_of_travel() {
        assert_eq!(Direction::of_travel(1, 7), Direction::Up);
        assert_eq!(Direction::of_travel(7, 1), Direction::Down);
        assert_eq!(Direction::of_travel(4, 4), Direction::Idle);
    }

    #[test]
    fn test_direction_opposite() {
        assert_eq!(Direction::Up.opposite(), Direction::Down);
        assert_eq!(Direction::Down.opposite(), Direction::Up);
        assert_eq!(Direction::Idle.opposite(), Direction::Idle);
    }

    #[test]
    fn test_passenger_direction_is_derived() {
        let p = Passenger::new(1, 3, 9);
        assert_eq!(p.direction(), Direction::Up);

        let q = Passenger::new(2, 9, 3);
        assert_eq!(q.direction(), Direction::Down);
    }

    #[test]
    fn test_hall_call_structural_equality() {
        let a = HallCall::new(4, Direction::Up);
        let b = HallCall::new(4, Direction::Up);
        let c = HallCall::new(4, Direction::Down);

        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
        assert!(!set.contains(&c));
    }
}
