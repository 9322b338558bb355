/*
 * Unit tests for the passenger generator
 *
 * The unit tests follows the Arrange, Act, Assert pattern. The dispatcher
 * worker is not running; queued events are pumped by hand.
 */

/***************************************/
/*             Unit tests              */
/***************************************/
#[cfg(test)]
mod generator_tests {
    use crate::config::Config;
    use crate::dispatcher::{CostStrategy, Dispatcher, DispatcherTuning};
    use crate::generator::PassengerGenerator;
    use crate::shared::SimClock;
    use crate::waiting::WaitingModel;
    use std::sync::Arc;

    fn fast_config(limit: usize, seed: u64) -> Config {
        let mut config = Config::default();
        config.floors = 8;
        config.passenger_limit = limit;
        config.request_interval_min = 1;
        config.request_interval_max = 2;
        config.generator_seed = Some(seed);
        config
    }

    fn setup(config: &Config) -> (Arc<Dispatcher>, Arc<WaitingModel>, Arc<SimClock>) {
        let waiting = Arc::new(WaitingModel::new(config.floors));
        let clock = Arc::new(SimClock::new(30.0));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&waiting),
            CostStrategy::new(config),
            DispatcherTuning::from_config(config),
        ));
        (dispatcher, waiting, clock)
    }

    #[test]
    fn test_generates_the_configured_number_of_requests() {
        // Arrange
        let config = fast_config(6, 7);
        let (dispatcher, waiting, clock) = setup(&config);
        let generator = PassengerGenerator::new(Arc::clone(&dispatcher), clock, &config);

        // Act
        generator.run();
        let events = dispatcher.test_pump_events();

        // Assert: every request is in range and lands in the model
        assert_eq!(events, 6);
        assert_eq!(waiting.total_waiting(), 6);
    }

    #[test]
    fn test_seeded_streams_are_reproducible() {
        // Arrange
        let config = fast_config(10, 42);
        let (dispatcher_a, waiting_a, clock_a) = setup(&config);
        let (dispatcher_b, waiting_b, clock_b) = setup(&config);

        // Act
        PassengerGenerator::new(Arc::clone(&dispatcher_a), clock_a, &config).run();
        PassengerGenerator::new(Arc::clone(&dispatcher_b), clock_b, &config).run();
        dispatcher_a.test_pump_events();
        dispatcher_b.test_pump_events();

        // Assert: identical pending calls and identical queue shape
        let mut pending_a = dispatcher_a.test_pending();
        let mut pending_b = dispatcher_b.test_pending();
        pending_a.sort_by_key(|c| (c.floor, c.direction as usize));
        pending_b.sort_by_key(|c| (c.floor, c.direction as usize));
        assert_eq!(pending_a, pending_b);
        assert_eq!(waiting_a.total_waiting(), waiting_b.total_waiting());
    }

    #[test]
    fn test_shutdown_stops_the_stream_early() {
        // Arrange
        let mut config = fast_config(1000, 3);
        config.request_interval_min = 50;
        config.request_interval_max = 50;
        let (dispatcher, _waiting, clock) = setup(&config);
        clock.shutdown();

        // Act
        PassengerGenerator::new(Arc::clone(&dispatcher), clock, &config).run();

        // Assert: at most the first request slipped out before the check
        assert!(dispatcher.test_pump_events() <= 1);
    }
}
