/// Command types for the sound manager
///
/// Commands represent requests to perform actions (imperative).
/// They are queued from any thread and applied by the manager on its next tick.
use crossbeam_channel::{unbounded, Receiver, Sender};
use thiserror::Error;

use crate::audio_system::manager::PlayOptions;
use crate::audio_system::source::Bus;

/// Sound manager commands
#[derive(Debug, Clone, PartialEq)]
pub enum SoundCommand {
    /// Play a sound effect once
    PlaySe { name: String },

    /// Start background music
    PlayBgm { name: String, options: PlayOptions },

    /// Stop background music by name, fading out when the length is
    /// positive; `None` uses the configured default fade
    StopBgm {
        name: String,
        fade_seconds: Option<f32>,
    },

    /// Stop every BGM channel; the fade length works as for `StopBgm`
    StopAllBgm { fade_seconds: Option<f32> },

    /// Stop every SE channel
    StopAllSe,

    PauseBgm { name: String },

    ResumeBgm { name: String },

    /// Set a bus level (linear, 0.0-1.0)
    SetVolume { bus: Bus, level: f32 },

    /// Stop everything and leave the running state
    Shutdown,
}

impl SoundCommand {
    /// Get a human-readable description of the command
    pub fn description(&self) -> String {
        match self {
            SoundCommand::PlaySe { name } => format!("Play SE: {}", name),
            SoundCommand::PlayBgm { name, options } => {
                if options.fade_seconds > 0.0 {
                    format!("Play BGM: {} (fade in {:.1}s)", name, options.fade_seconds)
                } else {
                    format!("Play BGM: {}", name)
                }
            }
            SoundCommand::StopBgm { name, fade_seconds } => match fade_seconds {
                Some(seconds) if *seconds > 0.0 => {
                    format!("Stop BGM: {} (fade out {:.1}s)", name, seconds)
                }
                Some(_) => format!("Stop BGM: {}", name),
                None => format!("Stop BGM: {} (default fade)", name),
            },
            SoundCommand::StopAllBgm { .. } => "Stop all BGM".to_string(),
            SoundCommand::StopAllSe => "Stop all SE".to_string(),
            SoundCommand::PauseBgm { name } => format!("Pause BGM: {}", name),
            SoundCommand::ResumeBgm { name } => format!("Resume BGM: {}", name),
            SoundCommand::SetVolume { bus, level } => {
                format!("Set {} volume: {:.2}", bus, level)
            }
            SoundCommand::Shutdown => "Shut down".to_string(),
        }
    }

    /// Parse one line of the text protocol
    ///
    /// ```text
    /// se <name>
    /// bgm <name> [fade_seconds]
    /// stop <name> [fade_seconds]      (omitted: configured default fade)
    /// stopall [fade_seconds]
    /// stopse
    /// pause <name> | resume <name>
    /// vol <master|bgm|se> <level>
    /// quit
    /// ```
    pub fn parse(line: &str) -> Result<Self, CommandParseError> {
        let mut parts = line.split_whitespace();
        let verb = parts.next().ok_or(CommandParseError::Empty)?;
        let args: Vec<&str> = parts.collect();

        let name_at = |index: usize| -> Result<String, CommandParseError> {
            args.get(index)
                .map(|s| s.to_string())
                .ok_or(CommandParseError::MissingArgument { verb: verb.to_string() })
        };
        let seconds_at = |index: usize| -> Result<Option<f32>, CommandParseError> {
            args.get(index).map(|raw| parse_number(raw)).transpose()
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "se" => SoundCommand::PlaySe { name: name_at(0)? },
            "bgm" => SoundCommand::PlayBgm {
                name: name_at(0)?,
                options: PlayOptions::fade_in(seconds_at(1)?.unwrap_or(0.0)),
            },
            "stop" => SoundCommand::StopBgm {
                name: name_at(0)?,
                fade_seconds: seconds_at(1)?,
            },
            "stopall" => SoundCommand::StopAllBgm {
                fade_seconds: seconds_at(0)?,
            },
            "stopse" => SoundCommand::StopAllSe,
            "pause" => SoundCommand::PauseBgm { name: name_at(0)? },
            "resume" => SoundCommand::ResumeBgm { name: name_at(0)? },
            "vol" | "volume" => {
                let bus = parse_bus(&name_at(0)?)?;
                let level = match args.get(1) {
                    Some(raw) => parse_number(raw)?,
                    None => {
                        return Err(CommandParseError::MissingArgument {
                            verb: verb.to_string(),
                        })
                    }
                };
                SoundCommand::SetVolume { bus, level }
            }
            "quit" | "exit" | "shutdown" => SoundCommand::Shutdown,
            other => return Err(CommandParseError::UnknownVerb(other.to_string())),
        };

        Ok(command)
    }
}

fn parse_number(raw: &str) -> Result<f32, CommandParseError> {
    raw.parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| CommandParseError::InvalidNumber(raw.to_string()))
}

fn parse_bus(raw: &str) -> Result<Bus, CommandParseError> {
    match raw.to_ascii_lowercase().as_str() {
        "master" => Ok(Bus::Master),
        "bgm" => Ok(Bus::Bgm),
        "se" => Ok(Bus::Se),
        _ => Err(CommandParseError::UnknownBus(raw.to_string())),
    }
}

/// Text protocol errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandParseError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command: {0}")]
    UnknownVerb(String),

    #[error("Missing argument for '{verb}'")]
    MissingArgument { verb: String },

    #[error("Not a number: {0}")]
    InvalidNumber(String),

    #[error("Unknown bus: {0} (expected master, bgm or se)")]
    UnknownBus(String),
}

/// Cloneable handle for submitting commands from other threads
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: Sender<SoundCommand>,
}

impl CommandSender {
    /// Queue a command; returns false once the manager is gone
    pub fn send(&self, command: SoundCommand) -> bool {
        tracing::debug!("Queued command: {}", command.description());
        self.tx.send(command).is_ok()
    }
}

/// Command queue owned by the manager
pub struct CommandQueue {
    tx: Sender<SoundCommand>,
    rx: Receiver<SoundCommand>,
}

impl CommandQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Get a sender for submitting commands
    pub fn sender(&self) -> CommandSender {
        CommandSender {
            tx: self.tx.clone(),
        }
    }

    /// Take every command queued so far, in submission order
    pub fn drain(&self) -> Vec<SoundCommand> {
        self.rx.try_iter().collect()
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}
