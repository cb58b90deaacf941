//! One-command-at-a-time AT protocol engine.

use std::time::Duration;

use futures::{FutureExt, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time;
use tokio_util::codec::Framed;

use super::codec::{AtCodec, Reply, ReplyKind, Request};
use super::{ModemError, Result};
use crate::tracing::prelude::*;

/// Runs AT commands over an exclusively owned transport.
///
/// Methods take `&mut self`, so a single engine can never have two commands
/// in flight. A timeout abandons the wait but assumes nothing about what
/// the modem did with the command.
pub struct AtEngine<T> {
    framed: Framed<T, AtCodec>,
    pending: Option<String>,
    last_response: String,
}

impl<T> AtEngine<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(transport: T) -> Self {
        Self {
            framed: Framed::new(transport, AtCodec::default()),
            pending: None,
            last_response: String::new(),
        }
    }

    /// Command currently waiting for its reply, if a previous wait was
    /// abandoned.
    pub fn pending_command(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Raw text of the last reply received.
    pub fn last_response(&self) -> &str {
        &self.last_response
    }

    /// Send a command and wait up to `timeout` for `OK` or an error code.
    ///
    /// The returned text includes echo and any unsolicited lines that
    /// arrived before the terminator.
    pub async fn execute(&mut self, command: &str, timeout: Duration) -> Result<String> {
        self.framed.codec_mut().expect_prompt(false);
        self.send_command(command).await?;

        let reply = self.await_reply(command, timeout).await?;
        match reply.kind {
            ReplyKind::Ok => Ok(reply.text),
            ReplyKind::Error | ReplyKind::Prompt => Err(ModemError::Rejected {
                command: command.to_string(),
                response: reply.text.trim().to_string(),
            }),
        }
    }

    /// Two-phase send: `command`, wait for the `"> "` prompt, then `body`
    /// terminated by Ctrl-Z, then wait for the final `OK`.
    ///
    /// The body is never written unless the prompt arrives.
    pub async fn submit_with_prompt(
        &mut self,
        command: &str,
        body: &str,
        prompt_timeout: Duration,
        submit_timeout: Duration,
    ) -> Result<String> {
        self.framed.codec_mut().expect_prompt(true);
        let prompt = self.prompt(command, prompt_timeout).await;
        self.framed.codec_mut().expect_prompt(false);

        match prompt {
            Ok(()) => {}
            Err(e @ ModemError::Timeout { .. }) => {
                // The modem may still be sitting at the prompt.
                if let Err(cancel) = self.framed.send(Request::Cancel).await {
                    debug!(error = %cancel, "Failed to cancel pending prompt");
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        }

        trace!(len = body.len(), "Submitting body");
        self.framed.send(Request::Body(body.to_string())).await?;

        let reply = self.await_reply(command, submit_timeout).await?;
        match reply.kind {
            ReplyKind::Ok => Ok(reply.text),
            ReplyKind::Error | ReplyKind::Prompt => Err(ModemError::Rejected {
                command: command.to_string(),
                response: reply.text.trim().to_string(),
            }),
        }
    }

    async fn prompt(&mut self, command: &str, timeout: Duration) -> Result<()> {
        self.send_command(command).await?;
        let reply = self.await_reply(command, timeout).await?;
        match reply.kind {
            ReplyKind::Prompt => Ok(()),
            ReplyKind::Error => Err(ModemError::Rejected {
                command: command.to_string(),
                response: reply.text.trim().to_string(),
            }),
            ReplyKind::Ok => Err(ModemError::UnexpectedResponse {
                command: command.to_string(),
                response: reply.text.trim().to_string(),
            }),
        }
    }

    async fn send_command(&mut self, command: &str) -> Result<()> {
        // Anything already received belongs to an earlier, abandoned
        // exchange.
        while let Some(Some(stale)) = self.framed.next().now_or_never() {
            match stale {
                Ok(reply) => trace!(stale = %reply.text.trim(), "Discarding late reply"),
                Err(e) => {
                    debug!(error = %e, "Discarding unreadable modem output");
                    break;
                }
            }
        }
        if !self.framed.read_buffer().is_empty() {
            trace!(
                stale = %String::from_utf8_lossy(self.framed.read_buffer()),
                "Discarding stale modem output"
            );
            self.framed.read_buffer_mut().clear();
        }
        self.framed.codec_mut().reset();

        trace!(command, "Sending AT command");
        self.pending = Some(command.to_string());
        self.framed.send(Request::Command(command.to_string())).await?;
        Ok(())
    }

    async fn await_reply(&mut self, command: &str, timeout: Duration) -> Result<Reply> {
        let reply = match time::timeout(timeout, self.framed.next()).await {
            Err(_) => {
                debug!(command, ?timeout, "AT command timed out");
                return Err(ModemError::Timeout {
                    command: command.to_string(),
                    timeout,
                });
            }
            Ok(None) => return Err(ModemError::Closed),
            Ok(Some(Err(e))) => return Err(ModemError::Transport(e)),
            Ok(Some(Ok(reply))) => reply,
        };

        trace!(command, response = %reply.text.trim(), kind = ?reply.kind, "AT reply");
        self.pending = None;
        self.last_response.clone_from(&reply.text);
        Ok(reply)
    }
}
