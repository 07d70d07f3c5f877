//! MIDI Shortcuts
//!
//! Maps the controls of a MIDI controller to desktop actions (audio volume,
//! mute, ...) per program, with hot-reload of the mapping config.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use midi_shortcuts::actions::{AudioBackend, BackgroundBackend, MemoryBackend, PactlBackend};
use midi_shortcuts::defaults::{DefaultsStore, CONFIG_KEY, DEVICE_KEY};
use midi_shortcuts::paths::AppPaths;
use midi_shortcuts::transport::list_input_ports;
use midi_shortcuts::{
    ConfigWatcher, DesktopControl, DeviceLibrary, Engine, MappingConfig, MappingError,
    MidirOpener, ProgramSummary, TickOutcome, TICK_INTERVAL,
};

/// MIDI Shortcuts - control desktop actions from a MIDI controller
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// MIDI input identifier (port name, or a unique part of it)
    #[arg(short, long)]
    device: Option<String>,

    /// Path to the mapping config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory with device description files
    #[arg(long, env = "MIDI_SHORTCUTS_DEVICES")]
    devices_dir: Option<PathBuf>,

    /// PulseAudio sink driven by the audio actions
    #[arg(long, env = "MIDI_SHORTCUTS_SINK", default_value = "@DEFAULT_SINK@")]
    sink: String,

    /// Log actions instead of touching the audio system
    #[arg(long)]
    dry_run: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI input ports
    #[arg(long)]
    list_ports: bool,

    /// List known device descriptions
    #[arg(long)]
    list_devices: bool,

    /// Print the program table for the device and config, then exit
    #[arg(long)]
    summarize: bool,

    /// Print the summary as JSON
    #[arg(long, requires = "summarize")]
    json: bool,

    /// Remember the device and config as defaults
    #[arg(long)]
    save_defaults: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Before logging: paths report on stderr
    let paths = AppPaths::detect();

    init_logging(&args.log_level)?;

    info!("Starting MIDI Shortcuts v{}...", env!("CARGO_PKG_VERSION"));

    if args.list_ports {
        list_ports_formatted();
        return Ok(());
    }

    paths
        .ensure_directories()
        .context("Failed to prepare application directories")?;

    let devices_dir = args
        .devices_dir
        .clone()
        .unwrap_or_else(|| paths.devices_dir.clone());
    let library = DeviceLibrary::new(&devices_dir);

    if args.list_devices {
        list_devices_formatted(&library).await?;
        return Ok(());
    }

    let mut defaults = DefaultsStore::load(&paths.defaults).await?;
    let device = args
        .device
        .clone()
        .or_else(|| defaults.get(DEVICE_KEY).map(str::to_string));
    let config_path = args
        .config
        .clone()
        .or_else(|| defaults.get(CONFIG_KEY).map(PathBuf::from));

    let backend: Arc<dyn AudioBackend> = if args.dry_run {
        info!("Dry run: audio actions are only logged");
        Arc::new(MemoryBackend::default())
    } else {
        let pactl = PactlBackend::new(&args.sink);
        info!("Audio actions drive sink '{}'", pactl.sink());
        // pactl runs off the tick so Ctrl+C and reloads stay responsive
        Arc::new(BackgroundBackend::spawn(Arc::new(pactl)))
    };
    let registry = Arc::new(DesktopControl::registry(backend));
    debug!("Registered actions: {:?}", registry.keys());

    let mut engine = Engine::new(library, MidirOpener::new(), registry);

    if let Some(path) = &config_path {
        let skipped = engine
            .set_config(path)
            .await
            .with_context(|| format!("Failed to load mapping config {}", path.display()))?;
        report_skipped(&skipped);
    } else {
        warn!(
            "No mapping config given (use --config); files live in {}",
            paths.control_maps_dir.display()
        );
    }

    match &device {
        Some(id) => {
            let skipped = engine
                .select_device(id)
                .await
                .with_context(|| format!("No usable description for device '{}'", id))?;
            report_skipped(&skipped);
        }
        None => warn!("No MIDI device given (use --device or --list-ports)"),
    }

    if args.summarize {
        print_summary(&engine.summary(), args.json)?;
        return Ok(());
    }

    if args.save_defaults {
        if let Some(id) = &device {
            defaults.set(DEVICE_KEY, id.as_str());
        }
        if let Some(path) = &config_path {
            let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.clone());
            defaults.set(CONFIG_KEY, absolute.display().to_string());
        }
        defaults.save().await?;
    }

    let watcher = match &config_path {
        Some(path) => match ConfigWatcher::new(path) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("Hot reload disabled: {}", e);
                None
            }
        },
        None => None,
    };

    if let Err(e) = engine.start() {
        warn!("{} (will keep retrying)", e);
    }

    run_app(engine, watcher).await?;

    info!("MIDI Shortcuts shutdown complete");
    Ok(())
}

async fn run_app(
    mut engine: Engine<MidirOpener>,
    mut watcher: Option<ConfigWatcher>,
) -> Result<()> {
    info!("🎹 Listening for controller input (Ctrl+C to quit)");

    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if engine.tick().await == TickOutcome::Halt {
                    info!("Dispatch loop halted");
                    break;
                }
            }
            Some(config) = next_config(&mut watcher) => {
                apply_reloaded(&mut engine, config);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                engine.stop();
                break;
            }
        }
    }

    let stats = engine.dispatch().stats();
    info!(
        "Dispatched {} message(s), {} action failure(s)",
        stats.dispatched, stats.failures
    );
    Ok(())
}

/// Next reloaded config, or never when hot reload is off
async fn next_config(watcher: &mut Option<ConfigWatcher>) -> Option<MappingConfig> {
    match watcher {
        Some(watcher) => watcher.next_config().await,
        None => std::future::pending().await,
    }
}

fn apply_reloaded(engine: &mut Engine<MidirOpener>, config: MappingConfig) {
    let skipped = engine.apply_config(config);
    report_skipped(&skipped);
    info!("Program table rebuilt ({} programs)", engine.programs().len());
}

fn report_skipped(skipped: &[MappingError]) {
    for e in skipped {
        warn!("Skipped: {}", e);
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

fn list_ports_formatted() {
    println!("\n{}", "=== Available MIDI Input Ports ===".bold().cyan());

    match list_input_ports() {
        Ok(ports) if ports.is_empty() => println!("  {}", "No input ports found".dimmed()),
        Ok(ports) => {
            for port in ports {
                println!("  {}", port);
            }
        }
        Err(e) => println!("  {}", e.to_string().red()),
    }
}

async fn list_devices_formatted(library: &DeviceLibrary) -> Result<()> {
    println!(
        "\n{} {}",
        "=== Device Descriptions ===".bold().cyan(),
        library.dir().display().to_string().dimmed()
    );

    let names = library.list().await?;
    if names.is_empty() {
        println!("  {}", "No device descriptions found".dimmed());
    }
    for name in names {
        println!("  {}", name.green());
    }
    Ok(())
}

fn print_summary(summary: &[ProgramSummary], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("\n{}", "=== Programs ===".bold().cyan());
    if summary.is_empty() {
        println!("  {}", "No programs declared".dimmed());
    }

    for program in summary {
        println!(
            "\n  {} {}",
            format!("[ch {}]", program.channel).yellow(),
            program.name.bright_white().bold()
        );
        for binding in &program.bindings {
            let line = binding.to_string();
            if binding.is_bound() {
                println!("    {}", line.green());
            } else {
                println!("    {}", line.dimmed());
            }
        }
    }
    Ok(())
}
