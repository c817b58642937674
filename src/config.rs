//! Configuration: every tunable knob of the simulation core, enumerated.
//!
//! Loaded from a single YAML file (`serde_yaml`); no environment variable
//! fallbacks — the file is authoritative. A programmatic `Default` impl
//! plus `with_*` builder methods let tests and callers construct a `Config`
//! without a file on disk.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

fn default_time_pattern_route() -> [f64; 24] {
    [
        0.5, 0.4, 0.4, 0.4, 0.5, 0.8, 1.3, 1.8, 1.6, 1.2, 1.1, 1.2, 1.4, 1.3, 1.1, 1.1, 1.3, 1.7,
        1.9, 1.5, 1.1, 0.9, 0.8, 0.6,
    ]
}

fn default_time_pattern_depot() -> [f64; 24] {
    [
        0.3, 0.2, 0.2, 0.2, 0.4, 1.2, 2.2, 2.8, 1.9, 1.1, 0.9, 0.9, 1.0, 0.9, 0.8, 0.9, 1.2, 2.0,
        2.4, 1.6, 1.0, 0.7, 0.5, 0.4,
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TripLengthConfig {
    pub mu_m: f64,
    pub sigma: f64,
}

impl Default for TripLengthConfig {
    fn default() -> Self {
        Self {
            mu_m: 2000f64.ln(),
            sigma: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimePatternsConfig {
    pub route: [f64; 24],
    pub depot: [f64; 24],
}

impl Default for TimePatternsConfig {
    fn default() -> Self {
        Self {
            route: default_time_pattern_route(),
            depot: default_time_pattern_depot(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnerConfig {
    pub base_rate_per_hour_per_route: f64,
    pub window_seconds: u64,
    pub trip_length: TripLengthConfig,
    pub time_patterns: TimePatternsConfig,
    pub depot_connectivity_m: f64,
    pub snap_tolerance_m: f64,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            base_rate_per_hour_per_route: 20.0,
            window_seconds: 30,
            trip_length: TripLengthConfig::default(),
            time_patterns: TimePatternsConfig::default(),
            depot_connectivity_m: 500.0,
            snap_tolerance_m: 25.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiderConfig {
    pub default_ttl_seconds: u64,
    pub default_walking_distance_m: f64,
}

impl Default for RiderConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 1800,
            default_walking_distance_m: 150.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservoirConfig {
    pub expiration_check_seconds: u64,
    pub grid_cell_degrees: f64,
    pub stats_log_interval_seconds: u64,
}

impl Default for ReservoirConfig {
    fn default() -> Self {
        Self {
            expiration_check_seconds: 10,
            grid_cell_degrees: 0.01,
            stats_log_interval_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorConfig {
    pub tick_seconds: u64,
    pub alight_trigger_m: f64,
    pub depot_query_radius_m: f64,
    pub route_query_radius_m: f64,
    pub capacity: u32,
    pub standing_capacity: u32,
    pub min_dwell_seconds: u64,
    pub min_passengers: u32,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 1,
            alight_trigger_m: 100.0,
            depot_query_radius_m: 500.0,
            route_query_radius_m: 1000.0,
            capacity: 40,
            standing_capacity: 0,
            min_dwell_seconds: 15,
            min_passengers: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub request_timeout_seconds: u64,
    pub reconnect_max_seconds: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 5,
            reconnect_max_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneCacheConfig {
    pub buffer_km: f64,
}

impl Default for ZoneCacheConfig {
    fn default() -> Self {
        Self { buffer_km: 5.0 }
    }
}

/// Single hierarchical configuration object. Every knob enumerated here has a
/// documented default and is overridable from a YAML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub spawner: SpawnerConfig,
    pub rider: RiderConfig,
    pub reservoir: ReservoirConfig,
    pub conductor: ConductorConfig,
    pub bus: BusConfig,
    pub zone_cache: ZoneCacheConfig,
}

impl Config {
    /// Load configuration from a YAML file. Missing keys fall back to their
    /// documented defaults; the file itself is mandatory.
    pub fn load_from_file(path: impl AsRef<Path>) -> SimResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|err| SimError::config(format!("failed to read config file: {err}")))?;
        Self::load_from_str(&contents)
    }

    pub fn load_from_str(yaml: &str) -> SimResult<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|err| SimError::config(format!("failed to parse config yaml: {err}")))
    }

    pub fn with_conductor_capacity(mut self, capacity: u32) -> Self {
        self.conductor.capacity = capacity;
        self
    }

    pub fn with_base_rate_per_hour_per_route(mut self, rate: f64) -> Self {
        self.spawner.base_rate_per_hour_per_route = rate;
        self
    }

    pub fn with_window_seconds(mut self, window_seconds: u64) -> Self {
        self.spawner.window_seconds = window_seconds;
        self
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.spawner.window_seconds == 0 {
            return Err(SimError::config("spawner.window_seconds must be > 0"));
        }
        if self.conductor.capacity == 0 {
            return Err(SimError::config("conductor.capacity must be > 0"));
        }
        if self.reservoir.grid_cell_degrees <= 0.0 {
            return Err(SimError::config("reservoir.grid_cell_degrees must be > 0"));
        }
        Ok(())
    }
}
