//! Library entry point for chat-cli components.
//!
//! Exposes the session, parser, formatter and configuration so tests can
//! drive them without going through the binary entry point.

pub mod config;
pub mod error;
pub mod formatter;
pub mod logging;
pub mod parser;
pub mod session;

pub use config::CLIConfiguration;
pub use error::{CLIError, Result};
pub use formatter::OutputFormatter;
pub use parser::{Command, CommandParser};
pub use session::{CLISession, Flow};
