pub mod classifier;
pub mod client;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod error;
pub mod groq;
pub mod journal;
pub mod logging;
pub mod models;
pub mod prompts;
pub mod server;
pub mod shell;
pub mod storage;
pub mod suggestions;
pub mod wire;

#[cfg(feature = "desktop")]
mod desktop;

#[cfg(feature = "desktop")]
pub use desktop::run;

pub use error::{EchoError, Result};
