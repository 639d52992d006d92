use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::Context;

use sound_pool::audio_system::{AudioBackend, Category, ClipLibrary, SoundManager};
use sound_pool::config::SoundConfig;
use sound_pool::error::AppResult;
use sound_pool::messaging::{CommandSender, SoundCommand, SoundEvent};
use sound_pool::utils::FrameClock;

const FRAME: Duration = Duration::from_millis(16);

/// Initialize tracing with file rotation
///
/// Logs are written to `<config dir>/SoundPool/logs/`, one file per day.
/// Debug builds also log to the console.
fn initialize_tracing() {
    use tracing_appender::rolling;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Get log directory in user config folder
    let log_dir = dirs::config_dir()
        .map(|dir| dir.join("SoundPool").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory: {}", e);
    }

    let file_appender = rolling::daily(&log_dir, "sound-pool.log");

    // Configure filter (info level by default)
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true);

    #[cfg(debug_assertions)]
    {
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(console_layer)
            .init();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();
    }

    tracing::info!("Log directory: {}", log_dir.display());
}

fn main() -> AppResult<()> {
    initialize_tracing();

    println!("===========================================");
    println!("  Sound Pool - BGM / SE mixer");
    println!("===========================================\n");

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(SoundConfig::default_path);
    let config = SoundConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    println!("✓ Configuration loaded: {}", config_path.display());

    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let library = ClipLibrary::from_config(&config, base_dir)?;
    println!(
        "✓ Clips loaded: {} BGM, {} SE",
        library.len(Category::Bgm),
        library.len(Category::Se)
    );

    #[cfg(feature = "playback")]
    let backend = sound_pool::audio_system::RodioBackend::new()?;
    #[cfg(not(feature = "playback"))]
    let backend = sound_pool::audio_system::HeadlessBackend::new();

    run(SoundManager::new(config, library, backend))
}

/// Frame loop: tick the manager until a shutdown command arrives
fn run<B: AudioBackend>(mut manager: SoundManager<B>) -> AppResult<()> {
    manager.initialize()?;
    let (events, _id) = manager.events().subscribe();

    print_help(&manager);
    spawn_input_reader(manager.command_sender());

    let mut clock = FrameClock::default();
    while manager.lifecycle().is_running() {
        manager.tick(clock.tick());
        for event in events.try_iter() {
            print_event(&event);
        }
        thread::sleep(FRAME);
    }

    println!("Bye.");
    Ok(())
}

fn print_help<B: AudioBackend>(manager: &SoundManager<B>) {
    let names = |category| {
        manager
            .library()
            .names(category)
            .collect::<Vec<_>>()
            .join(", ")
    };
    println!("BGM: {}", names(Category::Bgm));
    println!("SE:  {}", names(Category::Se));
    println!();
    println!("Commands:");
    println!("  se <name>                 play a sound effect");
    println!("  bgm <name> [fade]         play background music");
    println!("  stop <name> [fade]        stop background music");
    println!("  stopall [fade] | stopse   stop every BGM / SE channel");
    println!("  pause <name> | resume <name>");
    println!("  vol <master|bgm|se> <0-1>");
    println!("  quit\n");
}

/// Read commands from stdin on a background thread
fn spawn_input_reader(sender: CommandSender) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            match SoundCommand::parse(&line) {
                Ok(command) => {
                    if !sender.send(command) {
                        return;
                    }
                }
                Err(e) => eprintln!("✗ {}", e),
            }
        }

        // stdin closed
        sender.send(SoundCommand::Shutdown);
    });
}

fn print_event(event: &SoundEvent) {
    match event {
        SoundEvent::SePlayed { channel, name } => println!("♪ {} on {}", name, channel),
        SoundEvent::BgmStarted { channel, name, .. } => println!("▶ {} on {}", name, channel),
        SoundEvent::BgmStopped { channel, name } => println!("■ {} on {}", name, channel),
        SoundEvent::VolumeChanged { bus, level } => println!("  {} volume {:.2}", bus, level),
        other if other.is_diagnostic() => println!("✗ {:?}", other),
        _ => {}
    }
}
