/*
 * End-to-end scenarios
 *
 * These spin up the real threads (dispatcher worker, car control loops,
 * optionally the generator) against a fast simulated clock and assert on
 * observable state through polling with generous real-time deadlines.
 */

/***************************************/
/*             Unit tests              */
/***************************************/
#[cfg(test)]
mod system_tests {
    use crate::config::Config;
    use crate::dispatcher::{CostStrategy, Dispatcher, DispatcherTuning};
    use crate::elevator::{CarScheduler, CarTuning};
    use crate::generator::PassengerGenerator;
    use crate::shared::Direction::Up;
    use crate::shared::{ElevatorStatus, HallCall, Passenger, SimClock};
    use crate::waiting::WaitingModel;
    use std::sync::Arc;
    use std::thread::{sleep, spawn, JoinHandle};
    use std::time::{Duration, Instant};

    struct Harness {
        clock: Arc<SimClock>,
        waiting: Arc<WaitingModel>,
        dispatcher: Arc<Dispatcher>,
        cars: Vec<Arc<CarScheduler>>,
        handles: Vec<JoinHandle<()>>,
    }

    impl Harness {
        /// Spawn the dispatcher worker and the control loop of every car
        /// whose flag is set. A parked car still accepts assignments,
        /// which lets a scenario pin it in place.
        fn start(config: &Config, speed: f64, run_car: &[bool]) -> Harness {
            let clock = Arc::new(SimClock::new(speed));
            let waiting = Arc::new(WaitingModel::new(config.floors));
            let dispatcher = Arc::new(Dispatcher::new(
                Arc::clone(&waiting),
                CostStrategy::new(config),
                DispatcherTuning::from_config(config),
            ));
            let cars: Vec<Arc<CarScheduler>> = (1..=config.elevators_count)
                .map(|id| {
                    Arc::new(CarScheduler::new(
                        id,
                        CarTuning::from_config(config),
                        Arc::clone(&waiting),
                        Arc::clone(&clock),
                    ))
                })
                .collect();
            for car in &cars {
                car.attach_dispatcher(&dispatcher);
            }
            dispatcher.register_cars(cars.clone());

            let mut handles = Vec::new();
            {
                let dispatcher = Arc::clone(&dispatcher);
                handles.push(spawn(move || dispatcher.run()));
            }
            for (index, car) in cars.iter().enumerate() {
                if *run_car.get(index).unwrap_or(&true) {
                    let car = Arc::clone(car);
                    handles.push(spawn(move || car.run()));
                }
            }

            Harness {
                clock,
                waiting,
                dispatcher,
                cars,
                handles,
            }
        }

        fn delivered(&self) -> u64 {
            self.cars.iter().map(|car| car.delivered_count()).sum()
        }

        fn quiescent(&self) -> bool {
            self.waiting.total_waiting() == 0
                && self.dispatcher.pending_count() == 0
                && self.dispatcher.assignment_count() == 0
                && self.cars.iter().all(|car| car.is_truly_idle())
        }

        fn shutdown(&mut self) {
            self.dispatcher.stop();
            for car in &self.cars {
                car.stop();
            }
            self.clock.shutdown();
            for handle in self.handles.drain(..) {
                let _ = handle.join();
            }
        }
    }

    fn wait_until(timeout: Duration, predicate: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if predicate() {
                return true;
            }
            sleep(Duration::from_millis(5));
        }
        predicate()
    }

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.time_move_one_floor = 10;
        config.time_doors = 5;
        config.time_boarding = 2;
        config
    }

    #[test]
    fn test_single_passenger_single_car() {
        // Arrange
        let mut config = fast_config();
        config.floors = 10;
        config.elevators_count = 1;
        config.elevator_capacity = 5;
        let mut h = Harness::start(&config, 30.0, &[true]);

        // Act
        h.dispatcher.submit_request(Passenger::new(1, 1, 7));

        // Assert
        assert!(wait_until(Duration::from_secs(10), || {
            h.cars[0].delivered_count() == 1 && h.cars[0].is_truly_idle()
        }));
        assert_eq!(h.cars[0].snapshot().current_floor, 7);
        assert_eq!(h.waiting.total_waiting(), 0);
        assert_eq!(h.dispatcher.pending_count(), 0);
        assert_eq!(h.dispatcher.assignment_count(), 0);

        h.shutdown();
    }

    #[test]
    fn test_on_the_way_merge_has_no_reversal() {
        // Arrange: slow enough that the second call lands mid-flight
        let mut config = Config::default();
        config.floors = 10;
        config.elevators_count = 1;
        config.time_move_one_floor = 40;
        config.time_doors = 30;
        config.time_boarding = 10;
        let mut h = Harness::start(&config, 1.0, &[true]);

        // Act: first rider from the lobby to the top
        h.dispatcher.submit_request(Passenger::new(1, 1, 9));
        assert!(wait_until(Duration::from_secs(10), || {
            h.cars[0].snapshot().load == 1
        }));
        // Second rider hails upward from 5 while the car is down low
        h.dispatcher.submit_request(Passenger::new(2, 5, 8));

        // Sample the floor while both ride; one upward sweep only
        let mut floors = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(20);
        while Instant::now() < deadline {
            floors.push(h.cars[0].snapshot().current_floor);
            if h.delivered() == 2 && h.cars[0].is_truly_idle() {
                break;
            }
            sleep(Duration::from_millis(5));
        }

        // Assert
        assert_eq!(h.delivered(), 2);
        assert!(floors.windows(2).all(|w| w[1] >= w[0]), "reversed: {:?}", floors);
        assert_eq!(h.cars[0].snapshot().current_floor, 9);

        h.shutdown();
    }

    #[test]
    fn test_capacity_backpressure_third_call_waits() {
        // Arrange
        let mut config = fast_config();
        config.floors = 5;
        config.elevators_count = 1;
        config.elevator_capacity = 2;
        let mut h = Harness::start(&config, 30.0, &[true]);

        // Act: three same-direction rides, two seats
        h.dispatcher.submit_request(Passenger::new(1, 1, 5));
        h.dispatcher.submit_request(Passenger::new(2, 2, 5));
        h.dispatcher.submit_request(Passenger::new(3, 3, 5));

        // Assert: everyone still arrives, in two rounds
        assert!(wait_until(Duration::from_secs(20), || {
            h.delivered() == 3 && h.quiescent()
        }));

        h.shutdown();
    }

    #[test]
    fn test_opposite_direction_served_after_unload() {
        // Arrange
        let mut config = Config::default();
        config.floors = 10;
        config.elevators_count = 1;
        config.time_move_one_floor = 40;
        config.time_doors = 30;
        config.time_boarding = 10;
        let mut h = Harness::start(&config, 1.0, &[true]);

        // Act: an upward ride 3 -> 5, then a downward hail at 4 mid-trip
        h.dispatcher.submit_request(Passenger::new(1, 3, 5));
        assert!(wait_until(Duration::from_secs(10), || {
            h.cars[0].snapshot().load == 1
        }));
        h.dispatcher.submit_request(Passenger::new(2, 4, 2));

        // Assert: the down rider is picked up once the car runs empty
        assert!(wait_until(Duration::from_secs(30), || {
            h.delivered() == 2 && h.quiescent()
        }));
        assert_eq!(h.cars[0].snapshot().current_floor, 2);

        h.shutdown();
    }

    #[test]
    fn test_enroute_steal_from_parked_assignee() {
        // Arrange: car 1 is parked (loop not running) far from the call,
        // car 2 sweeps up right past it.
        let mut config = Config::default();
        config.floors = 15;
        config.elevators_count = 2;
        config.time_move_one_floor = 40;
        config.time_doors = 40;
        config.time_boarding = 5;
        let mut h = Harness::start(&config, 1.0, &[false, true]);
        h.cars[1].test_set_floor(8);

        // Act: give car 2 an upward trip out of floor 8
        h.dispatcher.submit_request(Passenger::new(1, 8, 14));
        assert!(wait_until(Duration::from_secs(10), || {
            h.cars[1].snapshot().status == ElevatorStatus::DoorsOpen
        }));
        // Hail at 9 while car 2 is busy boarding; only parked car 1 bids
        h.dispatcher.submit_request(Passenger::new(2, 9, 11));

        // Assert: car 2 lifts both riders; the parked car never moves
        assert!(wait_until(Duration::from_secs(30), || {
            h.cars[1].delivered_count() == 2
        }));
        assert_eq!(h.cars[0].delivered_count(), 0);
        assert!(wait_until(Duration::from_secs(10), || {
            h.dispatcher.assignment_of(&HallCall::new(9, Up)).is_none()
        }));
        assert_eq!(h.waiting.total_waiting(), 0);

        h.shutdown();
    }

    #[test]
    fn test_generated_stream_terminates_with_no_lost_passenger() {
        // Arrange
        let mut config = fast_config();
        config.floors = 8;
        config.elevators_count = 3;
        config.elevator_capacity = 4;
        config.passenger_limit = 15;
        config.request_interval_min = 10;
        config.request_interval_max = 40;
        config.generator_seed = Some(1234);
        let mut h = Harness::start(&config, 30.0, &[true, true, true]);

        // Act
        let generator = PassengerGenerator::new(
            Arc::clone(&h.dispatcher),
            Arc::clone(&h.clock),
            &config,
        );
        let generator_handle = spawn(move || generator.run());
        generator_handle.join().unwrap();

        // Assert: submitted = delivered, nothing stranded anywhere
        assert!(wait_until(Duration::from_secs(30), || h.quiescent()));
        assert_eq!(h.delivered(), 15);

        h.shutdown();
    }
}
