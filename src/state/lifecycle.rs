/// Sound manager lifecycle
///
/// A manager is created, initialized once, and shut down once.

use std::fmt;

/// Lifecycle state of a sound manager
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Lifecycle {
    /// Constructed; requests are ignored until initialized
    #[default]
    Created,

    /// Accepting requests
    Running,

    /// Terminal; every request is ignored
    ShutDown,
}

impl Lifecycle {
    pub fn is_running(&self) -> bool {
        matches!(self, Lifecycle::Running)
    }

    /// Get a human-readable description of the state
    pub fn description(&self) -> &'static str {
        match self {
            Lifecycle::Created => "Created",
            Lifecycle::Running => "Running",
            Lifecycle::ShutDown => "Shut down",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// State transition results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// Cannot initialize twice
    AlreadyRunning,

    /// Cannot leave the terminal state
    AlreadyShutDown,

    /// Cannot shut down before initializing
    NotStarted,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionError::AlreadyRunning => write!(f, "Sound manager is already running"),
            TransitionError::AlreadyShutDown => write!(f, "Sound manager is already shut down"),
            TransitionError::NotStarted => write!(f, "Sound manager was never initialized"),
        }
    }
}

impl std::error::Error for TransitionError {}

/// State machine for lifecycle transitions
#[derive(Debug, Default)]
pub struct LifecycleMachine {
    state: Lifecycle,
}

impl LifecycleMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current state
    pub fn state(&self) -> Lifecycle {
        self.state
    }

    /// Created -> Running
    pub fn start(&mut self) -> Result<Lifecycle, TransitionError> {
        match self.state {
            Lifecycle::Created => {
                self.state = Lifecycle::Running;
                Ok(Lifecycle::Created)
            }
            Lifecycle::Running => Err(TransitionError::AlreadyRunning),
            Lifecycle::ShutDown => Err(TransitionError::AlreadyShutDown),
        }
    }

    /// Running -> ShutDown. Returns the state left behind.
    pub fn shut_down(&mut self) -> Result<Lifecycle, TransitionError> {
        match self.state {
            Lifecycle::Running => {
                self.state = Lifecycle::ShutDown;
                Ok(Lifecycle::Running)
            }
            Lifecycle::Created => Err(TransitionError::NotStarted),
            Lifecycle::ShutDown => Err(TransitionError::AlreadyShutDown),
        }
    }
}
