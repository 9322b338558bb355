/***************************************/
/*        3rd party libraries          */
/***************************************/
use serde::Deserialize;
use std::fs;
use std::path::Path;

/***************************************/
/*       Public data structures        */
/***************************************/
/// Every recognized option of the simulation. All fields have defaults so a
/// partial `config.toml` works; a missing file yields the defaults.
/// Durations are simulated milliseconds unless the name says otherwise.
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    // Building and fleet
    pub floors: u8,
    pub elevators_count: usize,
    pub elevator_capacity: usize,

    // Simulated durations
    pub time_move_one_floor: u64,
    pub time_doors: u64,
    pub time_boarding: u64,

    // Per-car planning
    pub max_planned_stops: usize,
    pub reserve_reverse_soon_floors: u8,
    pub enroute_pickup_enabled: bool,
    pub enroute_steal_min_assigned_distance: u8,

    // Dispatcher
    pub call_reassign_cooldown_ms: u64,
    pub call_reassign_min_improvement: i64,
    pub no_elevator_log_cooldown_ms: u64,
    pub dispatcher_event_batch: usize,

    // Soft zoning
    pub zoning_enabled: bool,
    pub zone_split_floor: u8,
    pub zone_soft_penalty: i64,

    // Passenger generator
    pub passenger_limit: usize,
    pub request_interval_min: u64,
    pub request_interval_max: u64,
    pub generator_seed: Option<u64>,

    // Driver
    pub drain_timeout_ms: u64,
    pub sim_speed: f64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            floors: 10,
            elevators_count: 3,
            elevator_capacity: 8,

            time_move_one_floor: 1000,
            time_doors: 500,
            time_boarding: 200,

            max_planned_stops: 20,
            reserve_reverse_soon_floors: 3,
            enroute_pickup_enabled: true,
            enroute_steal_min_assigned_distance: 3,

            call_reassign_cooldown_ms: 1500,
            call_reassign_min_improvement: 12,
            no_elevator_log_cooldown_ms: 5000,
            dispatcher_event_batch: 64,

            zoning_enabled: false,
            zone_split_floor: 5,
            zone_soft_penalty: 10,

            passenger_limit: 20,
            request_interval_min: 200,
            request_interval_max: 1500,
            generator_seed: None,

            drain_timeout_ms: 60_000,
            sim_speed: 1.0,
        }
    }
}

/***************************************/
/*             Public API              */
/***************************************/
/// Load the configuration from `path`, or from `config.toml` in the working
/// directory when no path is given. A missing default file is not an error;
/// an explicitly named file must exist and parse.
pub fn load_config(path: Option<&str>) -> Result<Config, String> {
    let (file, required) = match path {
        Some(p) => (p, true),
        None => ("config.toml", false),
    };

    if !Path::new(file).exists() {
        if required {
            return Err(format!("configuration file not found: {}", file));
        }
        return Ok(Config::default());
    }

    let config_str =
        fs::read_to_string(file).map_err(|e| format!("failed to read {}: {}", file, e))?;
    toml::from_str(&config_str).map_err(|e| format!("failed to parse {}: {}", file, e))
}

/***************************************/
/*             Unit tests              */
/***************************************/
