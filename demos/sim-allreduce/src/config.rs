// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Configuration of the simulation.
//!
//! Options are merged from these sources, each overriding the previous one:
//!
//!  1. built-in defaults
//!  2. a TOML file given with `--config`
//!  3. environment variables prefixed with `TERN_` (e.g. `TERN_RING_SIZE=27`)
//!  4. the command line

use std::path::PathBuf;

use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use tern_collectives::algorithm::AlgorithmKind;
use tern_collectives::types::CollectiveType;
use tern_engine::sim_error;
use tern_engine::types::SimError;

/// Prefix of environment variables read as configuration.
pub const ENV_PREFIX: &str = "TERN_";

/// Command-line arguments and configuration file contents.
///
/// Every option is optional so that each source only needs to provide the
/// values it wants to change.
#[derive(Parser, Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[command(about = "Trivance AllReduce on a ring of simulated participants")]
pub struct Config {
    /// A TOML file to read options from.
    #[arg(long)]
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// The number of participants in the ring.
    #[arg(long)]
    pub ring_size: Option<usize>,

    /// The number of bytes each participant contributes.
    #[arg(long)]
    pub total_bytes: Option<u64>,

    /// The collective to run.
    #[arg(long)]
    pub collective: Option<String>,

    /// The algorithm used to implement the collective.
    #[arg(long)]
    pub algorithm: Option<String>,

    /// Whether all participants share a package (uses the fast transmission
    /// class).
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub local_ring: Option<bool>,

    /// Clock ticks between releasing a bundle and its credit returning.
    #[arg(long)]
    pub bundle_delay_ticks: Option<u64>,

    /// Clock ticks for a send to reach its destination.
    #[arg(long)]
    pub link_latency_ticks: Option<u64>,

    /// Frequency of the simulation clock.
    #[arg(long)]
    pub clock_mhz: Option<f64>,

    /// Configure a clock tick on which to terminate the simulation. Use 0 to
    /// run until completion.
    #[arg(long)]
    pub finish_tick: Option<u64>,

    /// Show a progress bar of participants that have finished.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub progress: Option<bool>,

    /// Enable logging to the console.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub stdout: Option<bool>,

    /// Level of log message to display.
    #[arg(long)]
    pub stdout_level: Option<log::Level>,

    /// Set a regular expression for which entites should have logging level set
    /// to `--stdout-level`. Others will have level set to `Error`.
    #[arg(long)]
    pub stdout_filter_regex: Option<String>,

    /// Write log messages to this file.
    #[arg(long)]
    pub log_file: Option<String>,

    /// Level of log message to write to `--log-file`.
    #[arg(long)]
    pub log_file_level: Option<log::Level>,
}

impl Config {
    /// The built-in defaults.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            config: None,
            ring_size: Some(9),
            total_bytes: Some(2187),
            collective: Some(CollectiveType::AllReduce.to_string()),
            algorithm: Some(AlgorithmKind::Trivance.to_string()),
            local_ring: Some(true),
            bundle_delay_ticks: Some(1),
            link_latency_ticks: Some(10),
            clock_mhz: Some(1000.0),
            finish_tick: Some(0),
            progress: Some(false),
            stdout: Some(false),
            stdout_level: Some(log::Level::Info),
            stdout_filter_regex: Some(String::new()),
            log_file: None,
            log_file_level: Some(log::Level::Debug),
        }
    }

    /// Merge the defaults, the configuration file named by `cli`, the
    /// environment and finally `cli` itself.
    pub fn load(cli: Config) -> Result<Config, SimError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::defaults()));

        if let Some(conf_file) = &cli.config {
            if !conf_file.is_file() {
                return sim_error!(format!("{} is not a file", conf_file.display()));
            }
            figment = figment.merge(Toml::file(conf_file));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX));

        let mut config: Config = figment
            .extract()
            .map_err(|e| SimError(format!("invalid configuration: {e}")))?;
        config.merge(cli);
        Ok(config)
    }

    /// Override every option set in `other`.
    pub fn merge(&mut self, other: Config) {
        self.config = other.config.or(self.config.take());
        self.ring_size = other.ring_size.or(self.ring_size);
        self.total_bytes = other.total_bytes.or(self.total_bytes);
        self.collective = other.collective.or(self.collective.take());
        self.algorithm = other.algorithm.or(self.algorithm.take());
        self.local_ring = other.local_ring.or(self.local_ring);
        self.bundle_delay_ticks = other.bundle_delay_ticks.or(self.bundle_delay_ticks);
        self.link_latency_ticks = other.link_latency_ticks.or(self.link_latency_ticks);
        self.clock_mhz = other.clock_mhz.or(self.clock_mhz);
        self.finish_tick = other.finish_tick.or(self.finish_tick);
        self.progress = other.progress.or(self.progress);
        self.stdout = other.stdout.or(self.stdout);
        self.stdout_level = other.stdout_level.or(self.stdout_level);
        self.stdout_filter_regex = other
            .stdout_filter_regex
            .or(self.stdout_filter_regex.take());
        self.log_file = other.log_file.or(self.log_file.take());
        self.log_file_level = other.log_file_level.or(self.log_file_level);
    }

    /// Check the merged options and fill any gaps from the defaults.
    pub fn resolve(self) -> Result<Settings, SimError> {
        let mut config = Config::defaults();
        config.merge(self);

        let ring_size = config.ring_size.unwrap_or_default();
        if ring_size == 0 {
            return sim_error!("ring_size must be at least 1");
        }
        let clock_mhz = config.clock_mhz.unwrap_or_default();
        if clock_mhz <= 0.0 {
            return sim_error!(format!("clock_mhz must be positive, got {clock_mhz}"));
        }

        Ok(Settings {
            ring_size,
            total_bytes: config.total_bytes.unwrap_or_default(),
            collective: config.collective.unwrap_or_default().parse()?,
            algorithm: config.algorithm.unwrap_or_default().parse()?,
            local_ring: config.local_ring.unwrap_or_default(),
            bundle_delay_ticks: config.bundle_delay_ticks.unwrap_or_default(),
            link_latency_ticks: config.link_latency_ticks.unwrap_or_default(),
            clock_mhz,
            finish_tick: config.finish_tick.unwrap_or_default(),
            progress: config.progress.unwrap_or_default(),
            stdout: config.stdout.unwrap_or_default(),
            stdout_level: config.stdout_level.unwrap_or(log::Level::Info),
            stdout_filter_regex: config.stdout_filter_regex.unwrap_or_default(),
            log_file: config.log_file,
            log_file_level: config.log_file_level.unwrap_or(log::Level::Debug),
        })
    }
}

/// Fully resolved configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub ring_size: usize,
    pub total_bytes: u64,
    pub collective: CollectiveType,
    pub algorithm: AlgorithmKind,
    pub local_ring: bool,
    pub bundle_delay_ticks: u64,
    pub link_latency_ticks: u64,
    pub clock_mhz: f64,

    /// Zero runs until there are no more events.
    pub finish_tick: u64,
    pub progress: bool,
    pub stdout: bool,
    pub stdout_level: log::Level,
    pub stdout_filter_regex: String,
    pub log_file: Option<String>,
    pub log_file_level: log::Level,
}
