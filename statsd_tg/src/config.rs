//! This module controls configuration parsing from the end user, providing a
//! convenience mechanism for the rest of the program. Crashes are most likely
//! to originate from this code, intentionally.
//!
//! Configuration is layered. Built-in defaults come first, a YAML document
//! may replace any of them and the command line has the last word. Whatever
//! the source, [`Config::validate`] must pass before any socket is opened or
//! worker started.

use std::{
    fs, io,
    net::SocketAddr,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Deserializer};
use statsd_tg_payload::{Population, population};

/// Errors produced by [`Config`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error for a serde [`serde_yaml`].
    #[error("Failed to deserialize yaml: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    /// Error reading config file
    #[error("Failed to read config file {path:?}: {source}")]
    ReadFile {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
    /// The population counts or set size are unusable
    #[error("Invalid population: {0}")]
    Population(#[from] statsd_tg_payload::Error),
    /// Zero workers would send nothing and report nothing
    #[error("Number of threads must be at least one")]
    ZeroThreads,
}

fn default_counters() -> u32 {
    population::DEFAULT_COUNTERS
}

fn default_timers() -> u32 {
    population::DEFAULT_TIMERS
}

fn default_gauges() -> u32 {
    population::DEFAULT_GAUGES
}

fn default_sets() -> u32 {
    population::DEFAULT_SETS
}

fn default_set_size() -> u32 {
    population::DEFAULT_SET_CARDINALITY
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> String {
    "8125".to_string()
}

/// Accept the destination service as a YAML number or string.
fn port_or_service<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortOrService {
        Port(u16),
        Service(String),
    }

    Ok(match PortOrService::deserialize(deserializer)? {
        PortOrService::Port(port) => port.to_string(),
        PortOrService::Service(service) => service,
    })
}

/// Main configuration struct for this program
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Number of counters to emulate
    #[serde(default = "default_counters")]
    pub counters: u32,
    /// Number of timers to emulate
    #[serde(default = "default_timers")]
    pub timers: u32,
    /// Number of gauges to emulate
    #[serde(default = "default_gauges")]
    pub gauges: u32,
    /// Number of sets to emulate
    #[serde(default = "default_sets")]
    pub sets: u32,
    /// Number of distinct members in each set
    #[serde(default = "default_set_size")]
    pub set_size: u32,
    /// Destination host of the datagrams, a name or an address
    #[serde(default = "default_host")]
    pub host: String,
    /// Destination port of the datagrams, a number or a service name
    #[serde(default = "default_port", deserialize_with = "port_or_service")]
    pub port: String,
    /// Number of worker threads. Defaults to the number of available
    /// processing units.
    #[serde(default)]
    pub threads: Option<usize>,
    /// Pin the per-worker random seeds. Seeds are derived from the wall clock
    /// when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Stop the run after this many seconds. Runs until interrupted when
    /// absent.
    #[serde(default)]
    pub duration_seconds: Option<u64>,
    /// Address to bind a Prometheus exporter to
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            counters: default_counters(),
            timers: default_timers(),
            gauges: default_gauges(),
            sets: default_sets(),
            set_size: default_set_size(),
            host: default_host(),
            port: default_port(),
            threads: None,
            seed: None,
            duration_seconds: None,
            prometheus_addr: None,
        }
    }
}

impl Config {
    /// Parse a [`Config`] from a YAML document. Missing fields take their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Function will return an error if the document is not valid YAML or
    /// carries unknown fields.
    pub fn from_yaml(contents: &str) -> Result<Self, Error> {
        let config = serde_yaml::from_str(contents)?;
        Ok(config)
    }

    /// Load a [`Config`] from the YAML file at `path`.
    ///
    /// # Errors
    ///
    /// Function will return an error if the file cannot be read or does not
    /// parse, see [`Config::from_yaml`].
    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path).map_err(|source| Error::ReadFile {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        Self::from_yaml(&contents)
    }

    /// The emulated [`Population`] described by this configuration.
    ///
    /// # Errors
    ///
    /// Function will return an error if the total population or the set size
    /// is zero.
    pub fn population(&self) -> Result<Population, Error> {
        let population = Population::new(
            self.counters,
            self.timers,
            self.gauges,
            self.sets,
            self.set_size,
        )?;
        Ok(population)
    }

    /// The number of workers to run.
    ///
    /// # Errors
    ///
    /// Function will return [`Error::ZeroThreads`] if zero threads were
    /// configured.
    pub fn threads(&self) -> Result<NonZeroUsize, Error> {
        let threads = self.threads.unwrap_or_else(num_cpus::get);
        NonZeroUsize::new(threads).ok_or(Error::ZeroThreads)
    }

    /// How long to run before shutting down on our own, if at all.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.duration_seconds.map(Duration::from_secs)
    }

    /// Check the configuration without acting on it.
    ///
    /// # Errors
    ///
    /// See [`Config::population`] and [`Config::threads`].
    pub fn validate(&self) -> Result<(), Error> {
        self.population()?;
        self.threads()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_document_takes_defaults() {
        let config = Config::from_yaml("{}").expect("valid yaml");
        assert_eq!(config, Config::default());
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, "8125");
        assert_eq!(
            config.population().expect("valid population"),
            Population::default()
        );
    }

    #[test]
    fn document_overrides_defaults() {
        let contents = r#"
counters: 3
timers: 0
gauges: 0
sets: 1
set_size: 10
host: "127.0.0.1"
port: 9125
threads: 2
seed: 42
duration_seconds: 5
prometheus_addr: "127.0.0.1:9000"
"#;
        let config = Config::from_yaml(contents).expect("valid yaml");
        assert_eq!(
            config.population().expect("valid population"),
            Population::new(3, 0, 0, 1, 10).expect("valid population")
        );
        assert_eq!(config.threads().expect("valid threads").get(), 2);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.duration(), Some(Duration::from_secs(5)));
        assert_eq!(
            config.prometheus_addr,
            Some("127.0.0.1:9000".parse().expect("valid address"))
        );
    }

    #[test]
    fn port_may_be_a_service_name() {
        let config = Config::from_yaml("port: statsd\n").expect("valid yaml");
        assert_eq!(config.port, "statsd");

        let config = Config::from_yaml("port: 9125\n").expect("valid yaml");
        assert_eq!(config.port, "9125");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let res = Config::from_yaml("histograms: 10\n");
        assert!(matches!(res, Err(Error::SerdeYaml(_))));
    }

    #[test]
    fn negative_counts_are_rejected() {
        let res = Config::from_yaml("counters: -1\n");
        assert!(matches!(res, Err(Error::SerdeYaml(_))));
    }

    #[test]
    fn zero_population_is_a_configuration_error() {
        let config = Config {
            counters: 0,
            timers: 0,
            gauges: 0,
            sets: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::Population(statsd_tg_payload::Error::EmptyPopulation))
        ));
    }

    #[test]
    fn zero_set_size_is_a_configuration_error() {
        let config = Config {
            set_size: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::Population(
                statsd_tg_payload::Error::ZeroSetCardinality
            ))
        ));
    }

    #[test]
    fn zero_threads_is_a_configuration_error() {
        let config = Config {
            threads: Some(0),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::ZeroThreads)));
    }

    #[test]
    fn threads_default_to_available_processing_units() {
        let config = Config::default();
        assert_eq!(config.threads().expect("valid threads").get(), num_cpus::get());
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file could not be created");
        writeln!(file, "gauges: 7").expect("could not write config");

        let config = Config::load(file.path()).expect("valid config file");
        assert_eq!(config.gauges, 7);
        assert_eq!(config.counters, population::DEFAULT_COUNTERS);
    }

    #[test]
    fn load_missing_file_names_the_path() {
        let dir = tempfile::tempdir().expect("directory could not be created");
        let path = dir.path().join("missing.yaml");
        match Config::load(&path) {
            Err(Error::ReadFile { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
