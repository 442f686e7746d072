use clap::{Parser, Subcommand};
use otelbox::config::{self, Config, ExportConfig};
use otelbox::{Generator, MetricRegistry};
use simulation::{DefaultFactory, SeedRegistry};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "otelbox")]
#[command(about = "Synthesizes configurable telemetry signals")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a configuration and report what it resolves to
    Check {
        /// Configuration file (YAML, or TOML with a .toml extension)
        #[arg(short, long)]
        config: PathBuf,
        /// Print the resolved configuration as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start every clock and log the exposition until interrupted
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// How often to log the current readings
        #[arg(long, default_value = "5s", value_parser = parse_report_interval)]
        report_interval: Duration,
    },
    /// Drive every clock a fixed number of times and print the exposition
    Render {
        #[arg(short, long)]
        config: PathBuf,
        /// Ticks delivered by each clock before rendering
        #[arg(long, default_value = "1")]
        ticks: u32,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Check { config, json } => check(&config::load(&config)?, json)?,
        Commands::Run {
            config,
            report_interval,
        } => run(&config::load(&config)?, report_interval).await?,
        Commands::Render { config, ticks } => render(&config::load(&config)?, ticks)?,
    }

    Ok(())
}

fn parse_report_interval(text: &str) -> Result<Duration, String> {
    let interval = humantime::parse_duration(text).map_err(|e| e.to_string())?;
    if interval.is_zero() {
        return Err("report interval must be greater than 0".to_string());
    }
    Ok(interval)
}

fn materialize(config: &Config) -> Result<(Generator, MetricRegistry), Box<dyn std::error::Error>> {
    let factory = DefaultFactory::new(SeedRegistry::new(config.settings.seed));
    let generator = Generator::from_config(config, &factory)?;
    let registry = MetricRegistry::new(&config.metrics, &generator)?;
    Ok((generator, registry))
}

fn check(config: &Config, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    println!("Configuration is valid");
    println!("  Metrics:   {}", config.metrics.len());
    println!(
        "  Instances: {} clocks, {} sources, {} values",
        config.instances.clocks.len(),
        config.instances.sources.len(),
        config.instances.values.len()
    );
    match &config.export {
        ExportConfig::Pull(pull) => println!("  Export:    pull on :{}{}", pull.port, pull.path),
        ExportConfig::Push(push) => println!(
            "  Export:    push to {} every {}",
            push.endpoint(),
            humantime::format_duration(push.push_interval)
        ),
    }
    if let Some(seed) = config.settings.seed {
        println!("  Seed:      {seed}");
    }
    Ok(())
}

async fn run(config: &Config, report_interval: Duration) -> Result<(), Box<dyn std::error::Error>> {
    let (generator, registry) = materialize(config)?;
    if config.settings.internal_metrics.enabled {
        warn!("Internal metrics are not exported by the run command; readings are logged only");
    }
    generator.start()?;

    let mut ticker = tokio::time::interval(report_interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                info!(
                    metrics = registry.len(),
                    "Current readings:\n{}",
                    registry.render_prometheus()
                );
            }
        }
    }

    generator.stop();
    Ok(())
}

fn render(config: &Config, ticks: u32) -> Result<(), Box<dyn std::error::Error>> {
    let (generator, registry) = materialize(config)?;
    for _ in 0..ticks {
        generator.tick_all();
    }
    print!("{}", registry.render_prometheus());
    generator.stop();
    Ok(())
}
