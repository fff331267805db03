//! Notifier adapters.

mod resend;
mod spawning;

pub use resend::{ResendConfig, ResendNotifier};
pub use spawning::{RecordingNotifier, SpawningNotifier};
