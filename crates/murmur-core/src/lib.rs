pub mod config;
pub mod error;
pub mod types;

pub use config::{BotConfig, ConfigHandle};
pub use error::{FetchError, MurmurError};
