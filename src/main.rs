//! Push2 GW
//!
//! Drives a music workstation from an Ableton Push 2 style controller and
//! mirrors the workstation UI on the controller display.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use push2_gw::app::{MidiOutSink, ProcessLifecycle, Workstation};
use push2_gw::canvas::RasterCanvas;
use push2_gw::config::AppConfig;
use push2_gw::events::RotaryChannel;
use push2_gw::led::LedFeedbackController;
use push2_gw::router::InputEventRouter;
use push2_gw::scheduler::FrameScheduler;
use push2_gw::transport::display::{NullLink, Push2Display, SnapshotMedium, PUSH2_DISPLAY};
use push2_gw::transport::push2::{discovery, Push2Transport};
use push2_gw::transport::sim::SimTransport;
use push2_gw::transport::{register_router, ControllerTransport, RenderMedium};
use push2_gw::widget::{Topology, Widget};

/// Push2 Gateway - Play a music workstation from an Ableton Push 2
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Also write JSON logs to a daily-rolling file in this directory
    #[arg(long, env = "LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Run against the in-memory simulated controller
    #[arg(long)]
    simulate: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Held for the whole run so buffered file logs get flushed
    let _log_guard = init_logging(&args.log_level, args.log_dir.as_deref())?;

    info!("Starting Push2 GW...");

    if args.list_ports {
        list_ports_formatted();
        return Ok(());
    }

    info!("Configuration file: {}", args.config);
    let config = AppConfig::load(&args.config).await?;
    info!("Configuration loaded successfully");

    let lifecycle = Arc::new(ProcessLifecycle::new());
    spawn_shutdown_listener(lifecycle.clone());

    let mut workstation = Workstation::new();
    if let Some(port) = &config.midi.note_output {
        let sink = MidiOutSink::connect(port)
            .with_context(|| format!("Failed to open note output '{}'", port))?;
        workstation = workstation.with_note_output(Arc::new(sink));
    }

    let medium = render_medium(&config);

    if args.simulate {
        info!("Running against the simulated controller");
        let transport = SimTransport::new().with_render_medium(medium);
        play_demo(&transport);
        run_app(transport, &config, workstation, lifecycle).await?;
    } else {
        let transport = Push2Transport::connect(
            &config.midi.input_port,
            &config.midi.output_port,
            medium,
        )
        .context("Failed to connect to the controller")?;
        run_app(transport, &config, workstation, lifecycle).await?;
    }

    info!("Push2 GW shutdown complete");
    Ok(())
}

async fn run_app<T: ControllerTransport>(
    mut transport: T,
    config: &AppConfig,
    workstation: Workstation,
    lifecycle: Arc<ProcessLifecycle>,
) -> Result<()> {
    let feedback = LedFeedbackController::push2(config.colors);
    let sinks = Arc::new(workstation.clone());

    let mut builder = InputEventRouter::builder()
        .led_setter(transport.led_setter())
        .feedback(feedback.clone())
        .key_sink(sinks.clone())
        .midi_sink(sinks.clone())
        .rotary_sink(sinks);
    for bank in &config.pads.banks {
        builder = builder.pad_bank(bank.bank, bank.note_offset, bank.color);
    }
    let router = Arc::new(builder.build()?);
    register_router(
        &mut transport,
        router,
        config.pads.banks.iter().map(|b| b.bank),
    );
    info!("Router initialized with {} pad bank(s)", config.pads.banks.len());

    for channel in RotaryChannel::ALL {
        if let Some(write) = feedback.channel_indicator(channel) {
            transport.set_led(write.address, write.color);
        }
    }

    let settings = config.frame_settings();
    let canvas_size = settings.dest.size;
    let scheduler = FrameScheduler::start(
        settings,
        || Ok(RasterCanvas::new(canvas_size)),
        workstation,
        transport,
        lifecycle,
    )?;

    info!("Ready to process controller events!");
    let summary = scheduler.run().await;
    if summary.failed_ticks > 0 {
        warn!(
            "{} of {} frame ticks failed",
            summary.failed_ticks, summary.ticks
        );
    }
    info!("Frame loop finished: {:?}", summary);

    Ok(())
}

fn render_medium(config: &AppConfig) -> Box<dyn RenderMedium> {
    match &config.frame.snapshot_path {
        Some(path) => Box::new(SnapshotMedium::new(
            path.clone(),
            PUSH2_DISPLAY,
            config.frame.snapshot_every,
        )),
        // The USB display link is not bundled; frames are encoded and dropped
        None => Box::new(Push2Display::new(NullLink::default())),
    }
}

/// Queue a short input sequence so a simulated run has something to show
fn play_demo(transport: &SimTransport) {
    let handle = transport.handle();
    handle.press(Widget::at(Topology::ButtonRow, 2));
    handle.hit_pad(Widget::new(Topology::Pads(0), 3, 4), 100);
    for channel in 0..4 {
        handle.turn(channel, 32 * (channel + 1));
    }
}

fn init_logging(level: &str, log_dir: Option<&std::path::Path>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "push2-gw.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

fn spawn_shutdown_listener(lifecycle: Arc<ProcessLifecycle>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                lifecycle.stop();
            }
            Err(e) => warn!("Failed to install CTRL+C signal handler: {}", e),
        }
    });
}

/// List all ports in a formatted way
fn list_ports_formatted() {
    use colored::*;

    println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());

    let sections = [
        ("Input Ports:", discovery::discover_input_ports()),
        ("Output Ports:", discovery::discover_output_ports()),
    ];
    for (title, ports) in sections {
        println!("\n{}", title.bold());
        match ports {
            Ok(ports) if ports.is_empty() => println!("  {}", "No ports found".dimmed()),
            Ok(ports) => {
                for port in ports {
                    let marker = if port.is_virtual {
                        "[VIRTUAL]".yellow()
                    } else {
                        "[PHYSICAL]".green()
                    };
                    println!("  {} {}", marker, port.name);
                }
            }
            Err(e) => println!("  {}", e.to_string().red()),
        }
    }

    if let Some((input, output)) = discovery::find_push2_ports() {
        println!("\n{}", "Auto-detected Push 2:".bold().bright_green());
        println!("  Input:  {}", input.bright_white());
        println!("  Output: {}", output.bright_white());
    }

    println!();
}
