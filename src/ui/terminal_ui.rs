/**
 * Read-only terminal status view.
 *
 * Redraws a one-line-per-car summary plus the waiting queues a few times a
 * second, from car snapshots and best-effort queue peeks. Never mutates
 * core state; disabled with `--nogui`.
 */

/***************************************/
/*             Libraries               */
/***************************************/
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/***************************************/
/*           Local modules             */
/***************************************/
use crate::elevator::CarScheduler;
use crate::shared::{Direction, ElevatorStatus, SimClock};
use crate::waiting::WaitingModel;

/***************************************/
/*             Constants               */
/***************************************/
const REDRAW_INTERVAL: Duration = Duration::from_millis(200);
const PEEK_DEPTH: usize = 4;

/***************************************/
/*             Public API              */
/***************************************/
pub struct TerminalUi {
    cars: Vec<Arc<CarScheduler>>,
    waiting: Arc<WaitingModel>,
    clock: Arc<SimClock>,
}

impl TerminalUi {
    pub fn new(
        cars: Vec<Arc<CarScheduler>>,
        waiting: Arc<WaitingModel>,
        clock: Arc<SimClock>,
    ) -> TerminalUi {
        TerminalUi {
            cars,
            waiting,
            clock,
        }
    }

    pub fn run(&self) {
        while !self.clock.is_shutdown() {
            self.redraw();
            thread::sleep(REDRAW_INTERVAL);
        }
    }

    fn redraw(&self) {
        print!("\x1B[2J\x1B[1;1H");
        println!(
            "lift-group  speed {:.1}x{}",
            self.clock.speed(),
            if self.clock.is_paused() { "  [paused]" } else { "" }
        );
        println!();

        for car in &self.cars {
            let snapshot = car.snapshot();
            let arrow = match snapshot.direction {
                Direction::Up => "^",
                Direction::Down => "v",
                Direction::Idle => "-",
            };
            let status = match snapshot.status {
                ElevatorStatus::Idle => "idle",
                ElevatorStatus::Moving => "moving",
                ElevatorStatus::DoorsOpen => "doors open",
                ElevatorStatus::LoadFull => "full",
            };
            println!(
                "car {:2} | floor {:5.1} {} | {:10} | load {}/{} | {} stops planned",
                snapshot.id,
                car.visual_position(),
                arrow,
                status,
                snapshot.load,
                snapshot.capacity,
                snapshot.planned_stops,
            );
        }

        println!();
        for floor in (1..=self.waiting.n_floors()).rev() {
            let up = self.waiting.count(floor, Direction::Up);
            let down = self.waiting.count(floor, Direction::Down);
            if up == 0 && down == 0 {
                continue;
            }
            let ids: Vec<String> = self
                .waiting
                .peek(floor, Direction::Up, PEEK_DEPTH)
                .iter()
                .chain(self.waiting.peek(floor, Direction::Down, PEEK_DEPTH).iter())
                .map(|p| format!("p{}", p.id))
                .collect();
            println!(
                "floor {:2} | {:2} up, {:2} down waiting | {}",
                floor,
                up,
                down,
                ids.join(" ")
            );
        }
    }
}
