//! Brainlink CLI - runs the Brain link headless.
//!
//! This is the main binary entry point: a "console body" that connects the
//! bridge to a configured Brain endpoint and drives logging sinks instead
//! of an avatar. See the `brainlink` library for the core functionality.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use brainlink::sink::{AudioSink, LogAudio, LogPresentation, PresentationSink};
use brainlink::{Bridge, BridgeConfig, Event, EventKind, TransportKind};
use clap::{Args, Parser, Subcommand};
use mimalloc::MiMalloc;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Global flag for signal-triggered shutdown.
static SHUTDOWN_FLAG: std::sync::LazyLock<Arc<AtomicBool>> =
    std::sync::LazyLock::new(|| Arc::new(AtomicBool::new(false)));

/// How long the console body keeps the talking animation on after an audio
/// cue. A real body stops when the clip ends; the console approximates.
const TALKING_HOLD: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "brainlink", version, about = "Brain-to-Body control-plane bridge")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge headless, logging decoded events.
    Run(RunArgs),
    /// Print the resolved configuration.
    Config,
}

#[derive(Args)]
struct RunArgs {
    /// Channel flavor (overrides config).
    #[arg(long, value_enum)]
    transport: Option<TransportKind>,

    /// Brain host (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Brain port (overrides config).
    #[arg(long)]
    port: Option<u16>,

    /// Milliseconds between host ticks.
    #[arg(long, default_value_t = 50)]
    tick_ms: u64,

    /// Send one chat frame to the Brain once connected.
    #[arg(long)]
    send: Option<String>,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            transport: None,
            host: None,
            port: None,
            tick_ms: 50,
            send: None,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Config) => print_config(),
        Some(Commands::Run(args)) => run(args),
        None => run(RunArgs::default()),
    }
}

/// Print the resolved configuration (file + env overrides).
fn print_config() -> Result<()> {
    let config = BridgeConfig::load()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    if let Ok(dir) = BridgeConfig::config_dir() {
        println!("# config dir: {}", dir.display());
    }
    Ok(())
}

/// Run the bridge headless until Ctrl-C.
fn run(args: RunArgs) -> Result<()> {
    let mut config = BridgeConfig::load()?;
    if let Some(transport) = args.transport {
        config.transport = transport;
    }
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    println!(
        "Starting brainlink v{} ({} to {}:{})...",
        env!("CARGO_PKG_VERSION"),
        config.transport,
        config.host,
        config.port
    );

    let flag = Arc::clone(&SHUTDOWN_FLAG);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })?;

    let mut bridge = Bridge::new(&config)?;
    let presentation = Arc::new(Mutex::new(LogPresentation::default()));
    let talking_until = wire_console_body(&mut bridge, &presentation);

    if let Some(text) = args.send {
        send_when_connected(&bridge, &text);
    }

    println!("Bridge ready. Waiting for the brain (Ctrl-C to stop)...");
    log::info!("brainlink v{} started in headless mode", env!("CARGO_PKG_VERSION"));

    let tick = Duration::from_millis(args.tick_ms.max(1));
    while !SHUTDOWN_FLAG.load(Ordering::Relaxed) {
        bridge.tick();

        // Talking decay: release the animation once the hold expires.
        let hold_expired = {
            let mut hold = talking_until.lock().unwrap();
            match *hold {
                Some(deadline) if Instant::now() >= deadline => {
                    *hold = None;
                    true
                }
                _ => false,
            }
        };
        if hold_expired {
            presentation.lock().unwrap().set_talking(false);
        }

        std::thread::sleep(tick);
    }

    println!("Shutting down...");
    bridge.shutdown();
    println!("Done. {} frames handled.", bridge.frames_handled());
    Ok(())
}

/// Register the console-body handlers: emotion and audio drive the logging
/// sinks, chat goes to stdout.
///
/// Returns the shared talking-hold deadline the run loop decays.
fn wire_console_body(
    bridge: &mut Bridge,
    presentation: &Arc<Mutex<LogPresentation>>,
) -> Arc<Mutex<Option<Instant>>> {
    let talking_until = Arc::new(Mutex::new(None));

    let sink = Arc::clone(presentation);
    bridge.on(
        EventKind::Emotion,
        Box::new(move |event| {
            if let Event::Emotion { tag } = event {
                sink.lock().unwrap().set_emotion(*tag);
            }
            Ok(())
        }),
    );

    let presentation = Arc::clone(presentation);
    let audio = Arc::new(Mutex::new(LogAudio));
    let hold = Arc::clone(&talking_until);
    bridge.on(
        EventKind::Audio,
        Box::new(move |event| {
            if let Event::Audio { path } = event {
                audio.lock().unwrap().play_from_file(path)?;
                let mut presentation = presentation.lock().unwrap();
                presentation.set_talking(true);
                presentation.set_volume(1.0);
                *hold.lock().unwrap() = Some(Instant::now() + TALKING_HOLD);
            }
            Ok(())
        }),
    );

    bridge.on(
        EventKind::Chat,
        Box::new(|event| {
            if let Event::Chat { text, emotion } = event {
                println!("brain: {text}  ({emotion})");
            }
            Ok(())
        }),
    );

    bridge.on(
        EventKind::Unknown,
        Box::new(|event| {
            if let Event::Unknown { text } = event {
                log::debug!("Ignoring blank frame: {text:?}");
            }
            Ok(())
        }),
    );

    talking_until
}

/// Wait (bounded) for the first connection, then send one chat frame.
fn send_when_connected(bridge: &Bridge, text: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !bridge.is_connected() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }
    match bridge.send_chat(text) {
        Ok(()) => println!("Sent: {text}"),
        Err(e) => eprintln!("Send failed: {e}"),
    }
}
