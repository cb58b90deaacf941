//! Cellular modem control over a serial AT-command link.
//!
//! The link is half-duplex and line oriented: a command goes out followed
//! by CRLF, and the modem answers with any number of lines ending in a
//! final result code (`OK`, `ERROR`, `+CME ERROR: ...`). SMS submission
//! adds a second phase where the modem prompts with `"> "` for the body.
//!
//! Layers, bottom up:
//!
//! - [`codec::AtCodec`] frames bytes into terminated replies.
//! - [`engine::AtEngine`] runs one command at a time with a deadline.
//! - [`sms`] builds the text-mode send sequence on top of the engine.
//! - [`actor::ModemActor`] owns the only engine for a device and serializes
//!   every request onto it; [`actor::ModemHandle`] is the cloneable client.

pub mod actor;
pub mod codec;
pub mod commands;
pub mod engine;
pub mod response;
pub mod sms;

#[cfg(test)]
pub(crate) mod testing;

use std::io;
use std::time::Duration;

use thiserror::Error;

pub use actor::{Connector, ModemActor, ModemHandle, ModemOptions, SerialConnector};
pub use engine::AtEngine;
pub use response::SignalQuality;
pub use sms::SmsReceipt;

#[derive(Debug, Error)]
pub enum ModemError {
    /// No final result code arrived in time. The modem may or may not
    /// have acted on the command.
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// The modem answered with an error result code.
    #[error("`{command}` rejected by modem: {response}")]
    Rejected { command: String, response: String },

    #[error("serial transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("modem link closed")]
    Closed,

    #[error("unexpected response to `{command}`: {response}")]
    UnexpectedResponse { command: String, response: String },

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("modem task is not running")]
    ActorGone,
}

impl ModemError {
    /// Whether trying again later could reasonably succeed.
    ///
    /// A rejected command is not retried: repeating it may compound modem
    /// state, e.g. a half-submitted SMS.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ModemError::Timeout { .. } | ModemError::Transport(_) | ModemError::Closed
        )
    }

    /// Whether the serial session is unusable and must be reopened.
    pub fn is_link_failure(&self) -> bool {
        matches!(self, ModemError::Transport(_) | ModemError::Closed)
    }
}

pub type Result<T> = std::result::Result<T, ModemError>;
