//! # Project Pulse
//!
//! Project health statistics for planned projects: periodic snapshots of plan state,
//! version-control activity, checkpoints and test coverage, the velocity, completion,
//! time, quality and testing metrics derived from them, a bounded history of those
//! snapshots and trend classification against that history.
//!
//! ## Usage
//!
//! ```bash
//! pulse collect            # collect, calculate, record and print metrics
//! pulse history --since 2024-06-01T00:00:00Z
//! pulse latest
//! ```
//!
//! ## Modules
//!
//! - `app` - CLI glue: verbosity, logging, fatal error reporting
//! - `config` - Engine configuration and the project config accessor
//! - `error` - Typed errors for the engine
//! - `sources` - Read-only accessors for project state, activity and checkpoints
//! - `statistics` - Collection, calculation, storage and trends
pub mod app;
pub mod config;
pub mod error;
pub mod sources;
pub mod statistics;

pub use config::StatsConfig;
pub use error::{StatsError, StatsResult};
pub use statistics::{
    Calculator, Collector, HistoricalData, HistoryStorage, StatisticsData, StatisticsEngine,
    StatisticsMetrics, TrendCalculator, TrendDirection, Trends,
};
