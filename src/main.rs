/* 3rd party libraries */
use clap::{Arg, Command};
use log::{info, warn};
use std::sync::Arc;
use std::thread::spawn;
use std::time::{Duration, Instant};

/* Custom libraries */
use dispatcher::{CostStrategy, Dispatcher, DispatcherTuning};
use elevator::{CarScheduler, CarTuning};
use generator::PassengerGenerator;
use shared::SimClock;
use ui::TerminalUi;
use waiting::WaitingModel;

/* Modules */
mod config;
mod dispatcher;
mod elevator;
mod generator;
mod shared;
mod ui;
mod waiting;
#[cfg(test)]
mod system_tests;

/* Main */
fn main() {
    let matches = Command::new("lift-group")
        .about("Multi-car elevator group control simulation")
        .arg(
            Arg::new("nogui")
                .long("nogui")
                .takes_value(false)
                .help("Disable the terminal status view"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .takes_value(true)
                .value_name("PATH")
                .help("Path to a configuration file (default: ./config.toml)"),
        )
        .arg(
            Arg::new("speed")
                .long("speed")
                .takes_value(true)
                .value_name("FACTOR")
                .help("Initial clock speed factor, clamped to [0.1, 30.0]"),
        )
        .get_matches();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Load the configuration
    let config = unwrap_or_exit!(config::load_config(matches.value_of("config")));
    let speed = match matches.value_of("speed") {
        Some(raw) => unwrap_or_exit!(raw.parse::<f64>()),
        None => config.sim_speed,
    };

    info!(
        "[system] SYSTEM starting: {} floors, {} cars, capacity {}, speed {:.1}x",
        config.floors, config.elevators_count, config.elevator_capacity, speed
    );

    // Wire the core
    let clock = Arc::new(SimClock::new(speed));
    let waiting = Arc::new(WaitingModel::new(config.floors));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&waiting),
        CostStrategy::new(&config),
        DispatcherTuning::from_config(&config),
    ));
    let cars: Vec<Arc<CarScheduler>> = (1..=config.elevators_count)
        .map(|id| {
            Arc::new(CarScheduler::new(
                id,
                CarTuning::from_config(&config),
                Arc::clone(&waiting),
                Arc::clone(&clock),
            ))
        })
        .collect();
    for car in &cars {
        car.attach_dispatcher(&dispatcher);
    }
    dispatcher.register_cars(cars.clone());

    // Start the worker threads
    let mut handles = Vec::new();
    {
        let dispatcher = Arc::clone(&dispatcher);
        handles.push(spawn(move || dispatcher.run()));
    }
    for car in &cars {
        let car = Arc::clone(car);
        handles.push(spawn(move || car.run()));
    }

    let generator = PassengerGenerator::new(Arc::clone(&dispatcher), Arc::clone(&clock), &config);
    let generator_handle = spawn(move || generator.run());

    if !matches.is_present("nogui") {
        let view = TerminalUi::new(cars.clone(), Arc::clone(&waiting), Arc::clone(&clock));
        handles.push(spawn(move || view.run()));
    }

    // Let the request stream run dry, then drain the system
    let _ = generator_handle.join();

    let deadline = Instant::now() + Duration::from_millis(config.drain_timeout_ms);
    let drained = loop {
        let quiescent = waiting.total_waiting() == 0
            && dispatcher.pending_count() == 0
            && dispatcher.assignment_count() == 0
            && cars.iter().all(|car| car.is_truly_idle());
        if quiescent {
            break true;
        }
        if Instant::now() >= deadline {
            break false;
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    if drained {
        info!("[system] SYSTEM drain complete");
    } else {
        warn!(
            "[system] SYSTEM drain timeout after {} ms, forcing shutdown",
            config.drain_timeout_ms
        );
    }

    let delivered: u64 = cars.iter().map(|car| car.delivered_count()).sum();
    info!(
        "[system] SYSTEM shutting down, {} passengers delivered",
        delivered
    );

    // Tear down
    dispatcher.stop();
    for car in &cars {
        car.stop();
    }
    clock.shutdown();
    for handle in handles {
        let _ = handle.join();
    }
}
