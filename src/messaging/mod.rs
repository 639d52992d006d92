/// Messaging module for Event/Command architecture
///
/// This module implements the Event/Command segregation pattern:
/// - **Events**: Notifications of things that happened (past tense, broadcast)
/// - **Commands**: Requests to perform actions (imperative, queued)
///
/// ## Architecture
///
/// ```text
/// ┌─────────┐   SoundCommand   ┌──────────────┐   SoundEvent   ┌─────────────┐
/// │ Any     │ ───────────────> │ SoundManager │ ─────────────> │  Event Bus  │
/// │ thread  │  (CommandSender) │   (tick)     │                │             │
/// └─────────┘                  └──────────────┘                └─────────────┘
///                                                                     │
///                                                                     ▼
///                                                               Subscribers
/// ```
///
/// ## Usage
///
/// ```rust,ignore
/// let (rx, _id) = manager.events().subscribe();
/// let sender = manager.command_sender();
///
/// sender.send(SoundCommand::PlaySe { name: "click".into() });
/// manager.tick(1.0 / 60.0);
///
/// while let Ok(event) = rx.try_recv() {
///     println!("{:?}", event);
/// }
/// ```

pub mod bus;
pub mod commands;
pub mod events;

// Re-export commonly used types
pub use bus::{EventBus, SubscriberId};
pub use commands::{CommandParseError, CommandQueue, CommandSender, SoundCommand};
pub use events::SoundEvent;
