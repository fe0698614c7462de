use std::{env, io, net::SocketAddr, path::PathBuf, process::ExitCode};

use clap::Parser;
use jemallocator::Jemalloc;
use statsd_tg::{
    config::{self, Config},
    coordinator::{self, Coordinator, Report},
    signals, telemetry,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Config(#[from] config::Error),
    #[error(transparent)]
    Coordinator(#[from] coordinator::Error),
    #[error(transparent)]
    Signals(#[from] signals::Error),
    #[error(transparent)]
    Telemetry(#[from] telemetry::Error),
}

#[derive(Parser, Debug)]
#[clap(version, about = "statsd traffic generator", long_about = None)]
struct Cli {
    /// number of counters to emulate [default: 1000]
    #[clap(short = 'c', long, value_parser = parse_count)]
    counters: Option<u32>,
    /// number of timers to emulate [default: 1000]
    #[clap(short = 't', long, value_parser = parse_count)]
    timers: Option<u32>,
    /// number of gauges to emulate [default: 100]
    #[clap(short = 'g', long, value_parser = parse_count)]
    gauges: Option<u32>,
    /// number of sets to emulate [default: 100]
    #[clap(short = 's', long, value_parser = parse_count)]
    sets: Option<u32>,
    /// number of elements in each set [default: 128]
    #[clap(short = 'S', long, value_parser = parse_count)]
    set_size: Option<u32>,
    /// destination address of the network packets [default: localhost]
    #[clap(short = 'd', long)]
    dest: Option<String>,
    /// destination port or service name of the network packets [default: 8125]
    #[clap(short = 'D', long)]
    port: Option<String>,
    /// number of threads sending packets [default: available processing units]
    #[clap(short = 'T', long)]
    threads: Option<usize>,
    /// pin the random seeds, derived from the clock if absent
    #[clap(long)]
    seed: Option<u64>,
    /// stop after this many seconds, run until interrupted if absent
    #[clap(long)]
    duration_seconds: Option<u64>,
    /// address to bind a prometheus exporter to
    #[clap(long)]
    prometheus_addr: Option<SocketAddr>,
    /// path on disk to a YAML configuration file
    #[clap(long)]
    config_path: Option<PathBuf>,
}

/// Parse a count in decimal, hexadecimal (`0x` prefix) or octal (leading
/// `0`).
fn parse_count(arg: &str) -> Result<u32, String> {
    let (digits, radix) = if let Some(hex) = arg
        .strip_prefix("0x")
        .or_else(|| arg.strip_prefix("0X"))
    {
        (hex, 16)
    } else if let Some(octal) = arg.strip_prefix('0').filter(|rest| !rest.is_empty()) {
        (octal, 8)
    } else {
        (arg, 10)
    };
    // from_str_radix tolerates a leading '+', a count never carries a sign.
    if digits.is_empty() || digits.starts_with('+') {
        return Err(format!("'{arg}' is not a count"));
    }
    u32::from_str_radix(digits, radix).map_err(|err| format!("'{arg}' is not a count: {err}"))
}

impl Cli {
    /// Explicit flags win over anything read from configuration.
    fn apply(&self, config: &mut Config) {
        if let Some(counters) = self.counters {
            config.counters = counters;
        }
        if let Some(timers) = self.timers {
            config.timers = timers;
        }
        if let Some(gauges) = self.gauges {
            config.gauges = gauges;
        }
        if let Some(sets) = self.sets {
            config.sets = sets;
        }
        if let Some(set_size) = self.set_size {
            config.set_size = set_size;
        }
        if let Some(ref dest) = self.dest {
            config.host.clone_from(dest);
        }
        if let Some(ref port) = self.port {
            config.port.clone_from(port);
        }
        if self.threads.is_some() {
            config.threads = self.threads;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if self.duration_seconds.is_some() {
            config.duration_seconds = self.duration_seconds;
        }
        if self.prometheus_addr.is_some() {
            config.prometheus_addr = self.prometheus_addr;
        }
    }
}

fn get_config(cli: &Cli, contents: Option<String>) -> Result<Config, Error> {
    let mut config = if let Some(contents) = contents {
        Config::from_yaml(&contents)?
    } else if let Some(ref path) = cli.config_path {
        debug!("Attempting to open configuration file at: {}", path.display());
        Config::load(path)?
    } else {
        Config::default()
    };
    cli.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn run(config: &Config) -> Result<Report, Error> {
    let coordinator = Coordinator::new(config)?;

    if let Some(addr) = config.prometheus_addr {
        telemetry::install_prometheus(addr)?;
    }

    let (watcher, broadcaster) = statsd_tg_signal::signal();
    let listener = signals::install(broadcaster, config.duration())?;

    let report = coordinator.run(watcher)?;
    if listener.join().is_err() {
        warn!("signal listener thread panicked");
    }
    Ok(report)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_writer(io::stderr)
        .finish()
        .init();

    let version = env!("CARGO_PKG_VERSION");
    info!("Starting statsd-tg {version} run.");

    let cli = Cli::parse();
    let contents = env::var("STATSD_TG_CONFIG").ok();
    if contents.is_some() {
        debug!("Using config from env var 'STATSD_TG_CONFIG'");
    }

    let res = get_config(&cli, contents).and_then(|config| run(&config));
    match res {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("statsd-tg: {err}");
            ExitCode::FAILURE
        }
    }
}
