pub mod config;
pub mod daemon;
pub mod error;
pub mod interfaces;
pub mod providers;
pub mod scheduler;
pub mod services;
pub mod updates;

pub use crate::config::Config;
pub use crate::error::{ClockError, Result};
pub use crate::services::clock::ClockService;
pub use crate::services::parser::{ClockReading, ParseOutcome};
pub use crate::updates::{ClockUpdate, UpdateStore};
