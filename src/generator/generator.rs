/**
 * Random passenger stream.
 *
 * Runs on its own thread: emits a bounded number of (from, to) requests
 * with distinct uniform-random floors, pacing itself on the simulated
 * clock. An optional seed pins the stream for reproducible runs.
 */

/***************************************/
/*        3rd party libraries          */
/***************************************/
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/***************************************/
/*           Local modules             */
/***************************************/
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::shared::{Passenger, SimClock};

/***************************************/
/*             Public API              */
/***************************************/
pub struct PassengerGenerator {
    dispatcher: Arc<Dispatcher>,
    clock: Arc<SimClock>,
    n_floors: u8,
    limit: usize,
    interval_min: u64,
    interval_max: u64,
    seed: Option<u64>,
}

impl PassengerGenerator {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        clock: Arc<SimClock>,
        config: &Config,
    ) -> PassengerGenerator {
        PassengerGenerator {
            dispatcher,
            clock,
            n_floors: config.floors,
            limit: config.passenger_limit,
            interval_min: config.request_interval_min,
            interval_max: config.request_interval_max,
            seed: config.generator_seed,
        }
    }

    pub fn run(&self) {
        if self.n_floors < 2 {
            return;
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        for id in 1..=self.limit {
            if self.clock.is_shutdown() {
                break;
            }

            let from = rng.gen_range(1..=self.n_floors);
            let mut to = rng.gen_range(1..=self.n_floors);
            while to == from {
                to = rng.gen_range(1..=self.n_floors);
            }
            self.dispatcher
                .submit_request(Passenger::new(id as u64, from, to));

            let pause = if self.interval_max > self.interval_min {
                rng.gen_range(self.interval_min..=self.interval_max)
            } else {
                self.interval_min
            };
            if !self.clock.sleep(pause) {
                break;
            }
        }

        info!("[generator] SYSTEM request stream finished");
    }
}
