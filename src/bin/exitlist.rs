//! exitlist: CLI tool for classifying addresses against Tor exit policies
//! and producing bulk exit lists.

use clap::{Parser, Subcommand, ValueEnum};
use exitlist::heuristic::likely_tor_browser;
use exitlist::{
    AddressPort, EngineConfig, LoadMode, Loader, PolicySet, ReloadHandle, ReloadManager,
    ServiceConfig, Strategy,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "exitlist")]
#[command(author = "Kaitu.io")]
#[command(version = "0.1.0")]
#[command(about = "Classify Tor exits and generate bulk exit lists", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Scan,
    Index,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Scan => Strategy::Scan,
            StrategyArg::Index => Strategy::Index,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print every exit that can reach IP:PORT
    Dump {
        /// Policy feed (file path or http(s) URL)
        #[arg(short, long, default_value = exitlist::config::DEFAULT_FEED)]
        feed: String,

        /// Destination address
        #[arg(long)]
        ip: String,

        /// Destination port
        #[arg(short, long, default_value_t = 80)]
        port: u16,

        /// Only include relays seen within this many cycles
        #[arg(short = 'n', long, default_value_t = exitlist::policyset::DEFAULT_MAX_AGE)]
        max_age: u32,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: Format,

        /// Evaluation strategy
        #[arg(long, value_enum, default_value = "scan")]
        strategy: StrategyArg,
    },

    /// Check whether addresses are Tor exits able to reach the canonical target
    Check {
        /// Policy feed (file path or http(s) URL)
        #[arg(short, long, default_value = exitlist::config::DEFAULT_FEED)]
        feed: String,

        /// Addresses to classify
        #[arg(required = true)]
        addresses: Vec<String>,

        /// Also report whether this user agent looks like Tor Browser
        #[arg(long)]
        user_agent: Option<String>,
    },

    /// Serve classifications from stdin, reloading the feed on an interval
    /// and on SIGUSR2
    Watch {
        /// YAML service configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the feed location from the configuration
        #[arg(short, long)]
        feed: Option<String>,

        /// Override the reload interval (seconds)
        #[arg(short, long)]
        interval: Option<u64>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Dump {
            feed,
            ip,
            port,
            max_age,
            format,
            strategy,
        } => dump(&feed, &AddressPort::new(ip, port), max_age, format, strategy.into()),
        Commands::Check {
            feed,
            addresses,
            user_agent,
        } => check(&feed, &addresses, user_agent.as_deref()),
        Commands::Watch {
            config,
            feed,
            interval,
        } => watch(config, feed, interval),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_once(feed: &str, engine: EngineConfig) -> Result<PolicySet, Box<dyn std::error::Error>> {
    let config = ServiceConfig {
        feed: feed.to_string(),
        ..ServiceConfig::default()
    };
    let mut source = config.open_source();
    let data = match source.fetch()? {
        exitlist::FeedFetch::Data(data) => data,
        exitlist::FeedFetch::NotModified => return Err("feed returned no data".into()),
    };
    Ok(Loader::new(engine).load(&data[..], LoadMode::Full)?)
}

fn dump(
    feed: &str,
    target: &AddressPort,
    max_age: u32,
    format: Format,
    strategy: Strategy,
) -> Result<(), Box<dyn std::error::Error>> {
    if target.ip().is_none() {
        return Err(format!("invalid ip address: {}", target.address).into());
    }

    let set = load_once(feed, EngineConfig::default().with_strategy(strategy))?;

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    match format {
        Format::Text => set.dump(&mut out, target, max_age)?,
        Format::Json => set.dump_json(&mut out, target, max_age)?,
    }
    out.flush()?;
    Ok(())
}

fn check(
    feed: &str,
    addresses: &[String],
    user_agent: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let set = load_once(feed, EngineConfig::default())?;

    for address in addresses {
        println!("{}", classify(&set, address));
    }
    if let Some(ua) = user_agent {
        println!("tor-browser\t{}", likely_tor_browser(ua));
    }
    Ok(())
}

fn classify(set: &PolicySet, address: &str) -> String {
    match set.is_tor(address) {
        Some(fingerprint) => format!("{}\ttor\t{}", address.trim(), fingerprint),
        None => format!("{}\tnot-tor", address.trim()),
    }
}

fn watch(
    config_path: Option<PathBuf>,
    feed: Option<String>,
    interval: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match config_path {
        Some(path) => ServiceConfig::from_yaml_file(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(feed) = feed {
        config.feed = feed;
    }
    if let Some(secs) = interval {
        config.reload_interval_secs = secs.max(1);
    }

    let manager = Arc::new(ReloadManager::start(
        Loader::new(config.engine.clone()),
        config.open_source(),
    )?);
    let handle = Arc::new(manager.spawn_worker()?);

    #[cfg(unix)]
    spawn_signal_listener(Arc::clone(&handle))?;

    let period = config.reload_interval();
    let ticker = Arc::clone(&manager);
    thread::Builder::new()
        .name("exitlist-timer".to_string())
        .spawn(move || ticker_loop(handle, period, ticker))?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        println!("{}", classify(&manager.current(), &line));
    }
    Ok(())
}

fn ticker_loop(handle: Arc<ReloadHandle>, period: Duration, manager: Arc<ReloadManager>) {
    loop {
        thread::sleep(period);
        log::debug!(
            "Reload tick (generation {}, state {:?})",
            manager.generation(),
            manager.state()
        );
        if !handle.trigger() {
            break;
        }
    }
}

/// Trigger a reload on every SIGUSR2.
#[cfg(unix)]
fn spawn_signal_listener(handle: Arc<ReloadHandle>) -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()?;
    // Register before returning so an early SIGUSR2 does not kill the process.
    let mut usr2 = {
        let _guard = runtime.enter();
        signal(SignalKind::user_defined2())?
    };

    thread::Builder::new()
        .name("exitlist-signal".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                while usr2.recv().await.is_some() {
                    log::info!("SIGUSR2 received, reloading exit list");
                    if !handle.trigger() {
                        break;
                    }
                }
            })
        })?;
    Ok(())
}
