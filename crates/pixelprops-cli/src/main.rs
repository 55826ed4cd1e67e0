//! PixelProps dry run
//!
//! Drives the identity engine against recording collaborators and prints
//! what a process would be given:
//! - `evaluate`: profile selection and field writes for a package/process
//! - `attest`: the certificate-chain hook decision
//! - `profiles`: the reference profile catalogue
//! - `fingerprint`: build id and device name of a fingerprint

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use pixelprops_core::mocks::{
    MemorySettings, MockForegroundObserver, RecordingProcessControl, RecordingWriter,
    StaticCallContext, StaticDisplay, StaticExternalProvider, StaticPlatform,
    StaticProcessResolver,
};
use pixelprops_core::{
    build_id, device_name, BundleProfileProvider, Collaborators, EngineConfig,
    ExternalProfileProvider, MapFlagSource, ProfileName, ProfileStore, PropsEngine,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use config::CliConfig;

/// Pid the simulated process runs under.
const SIMULATED_PID: u32 = 1;

/// PixelProps CLI
#[derive(Parser)]
#[command(name = "pixelprops")]
#[command(about = "Dry-run the PixelProps identity engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "PIXELPROPS_CONFIG")]
    config: Option<String>,

    /// Log level
    #[arg(long, env = "PIXELPROPS_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "PIXELPROPS_LOG_JSON")]
    json: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a starting process
    Evaluate {
        /// Package name
        #[arg(short, long)]
        package: String,

        /// Process name (defaults to the package name)
        #[arg(long)]
        process: Option<String>,
    },

    /// Run the certificate-chain hook for a process
    Attest {
        #[arg(short, long)]
        package: String,

        #[arg(long)]
        process: Option<String>,
    },

    /// List the reference profile catalogue
    Profiles,

    /// Parse a build fingerprint
    Fingerprint {
        fingerprint: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let config = CliConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.profiles.validate()?;

    match cli.command {
        Commands::Evaluate { package, process } => {
            let engine = build_engine(&config, process.as_deref().unwrap_or(&package))?;
            let report = engine.evaluate(&package, SIMULATED_PID);
            match cli.output {
                OutputFormat::Text => print!("{}", report),
                OutputFormat::Json => print_json(&report)?,
            }
        }
        Commands::Attest { package, process } => {
            let engine = build_engine(&config, process.as_deref().unwrap_or(&package))?;
            let result = engine
                .on_get_certificate_chain(&package, SIMULATED_PID)
                .map_err(|e| e.to_string());
            match cli.output {
                OutputFormat::Text => match result {
                    Ok(decision) => println!("{:?}", decision),
                    Err(e) => println!("rejected: {}", e),
                },
                OutputFormat::Json => print_json(&result)?,
            }
        }
        Commands::Profiles => {
            let store = ProfileStore::from_sources(&config.profiles);
            let profiles: Vec<_> = ProfileName::ALL.iter().map(|n| store.get(*n)).collect();
            match cli.output {
                OutputFormat::Text => {
                    for profile in profiles {
                        println!("{}", profile.name);
                        for (field, value) in profile.iter() {
                            println!("  {} = {}", field, value);
                        }
                    }
                }
                OutputFormat::Json => print_json(&profiles)?,
            }
        }
        Commands::Fingerprint { fingerprint } => {
            #[derive(Serialize)]
            struct Parsed {
                build_id: String,
                device: String,
            }
            let parsed = Parsed {
                build_id: build_id(&fingerprint),
                device: device_name(&fingerprint),
            };
            match cli.output {
                OutputFormat::Text => {
                    println!("build id: {}", parsed.build_id);
                    println!("device:   {}", parsed.device);
                }
                OutputFormat::Json => print_json(&parsed)?,
            }
        }
    }

    Ok(())
}

fn build_engine(config: &CliConfig, process: &str) -> anyhow::Result<PropsEngine> {
    let external: Arc<dyn ExternalProfileProvider> = match &config.bundle {
        Some(path) => Arc::new(BundleProfileProvider::new(path)),
        None => Arc::new(StaticExternalProvider::new(None)),
    };
    let observer = match &config.device.foreground_activity {
        Some(top) => MockForegroundObserver::new().with_top(top.as_str()),
        None => MockForegroundObserver::new(),
    };
    let collaborators = Collaborators {
        processes: Arc::new(StaticProcessResolver::new().with(SIMULATED_PID, process)),
        display: Arc::new(StaticDisplay(config.device.display)),
        platform: Arc::new(StaticPlatform::new(
            config.device.codename.as_deref(),
            config.device.build_time_millis,
        )),
        flags: Arc::new(MapFlagSource::from(config.flags)),
        external,
        observer: Arc::new(observer),
        writer: Arc::new(RecordingWriter::new()),
        settings: Arc::new(MemorySettings::new()),
        calls: Arc::new(StaticCallContext(config.device.call_frames.clone())),
        process_control: Arc::new(RecordingProcessControl::new()),
    };
    let engine_config = EngineConfig {
        profiles: ProfileStore::from_sources(&config.profiles),
        ..EngineConfig::canonical()
    };
    info!(process, "Engine ready");
    PropsEngine::new(collaborators, engine_config).context("Descriptor schema rejected")
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
