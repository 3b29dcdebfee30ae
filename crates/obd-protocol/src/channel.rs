//! Command Channel Abstraction
//!
//! A command channel carries one AT or OBD command to the adapter and returns
//! the raw text it answered with, up to the `>` prompt. Implementations must
//! allow only one command in flight: a second command issued before the first
//! response is complete would desynchronize the adapter's reply stream.

use crate::error::ObdError;
use async_trait::async_trait;
use std::time::Duration;

/// Prompt character the ELM327 prints when it is ready for the next command
pub const RESPONSE_SENTINEL: char = '>';

/// Recommended caller-side wait for the response sentinel
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(5000);

/// Transport-agnostic command/response link to an ELM327-compatible adapter
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Send a command (without trailing `\r`) and wait for the raw response
    ///
    /// # Errors
    /// Returns an error when the link is down, the write fails or no
    /// sentinel arrives before the channel's timeout.
    async fn send_command(&self, command: &str) -> Result<String, ObdError>;

    /// Whether the underlying link is currently open
    fn is_open(&self) -> bool;
}
