pub mod clock;
pub mod macros;
pub mod structs;

pub use clock::SimClock;
pub use structs::Direction;
pub use structs::ElevatorStatus;
pub use structs::HallCall;
pub use structs::Passenger;
pub use structs::Snapshot;
