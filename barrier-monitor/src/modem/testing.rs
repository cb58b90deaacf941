//! Scripted in-memory modem for tests.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

use super::actor::Connector;
use super::codec::{ESC, SUB};

const DEFAULT_REPLY: &str = "\r\nOK\r\n";

/// Answers each message from the host with a scripted reply.
///
/// Messages are command lines (CRLF terminated) or, after the fake has
/// sent a `"> "` prompt, an SMS body terminated by Ctrl-Z. Unscripted
/// messages get `OK`. When a message has several scripted replies they are
/// used in order and the last one repeats.
#[derive(Debug, Default)]
pub(crate) struct FakeModem {
    replies: HashMap<String, VecDeque<String>>,
}

/// What the host wrote to a [`FakeModem`].
#[derive(Debug, Clone, Default)]
pub(crate) struct ModemLog {
    inner: Arc<Mutex<LogInner>>,
}

#[derive(Debug, Default)]
struct LogInner {
    messages: Vec<String>,
    raw: Vec<u8>,
}

impl ModemLog {
    /// Messages received so far, bodies with their trailing Ctrl-Z.
    pub(crate) fn commands(&self) -> Vec<String> {
        self.inner.lock().messages.clone()
    }

    pub(crate) fn raw(&self) -> Vec<u8> {
        self.inner.lock().raw.clone()
    }
}

impl FakeModem {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reply(mut self, message: &str, reply: &str) -> Self {
        self.replies
            .entry(message.to_string())
            .or_default()
            .push_back(reply.to_string());
        self
    }

    /// Never answer `message`.
    pub(crate) fn silent(self, message: &str) -> Self {
        self.reply(message, "")
    }

    pub(crate) fn spawn(self) -> (DuplexStream, ModemLog) {
        let (host, device) = duplex(4096);
        let log = ModemLog::default();
        tokio::spawn(self.serve(device, log.clone()));
        (host, log)
    }

    fn next_reply(&mut self, message: &str) -> String {
        match self.replies.get_mut(message) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => DEFAULT_REPLY.to_string(),
        }
    }

    async fn serve(mut self, mut device: DuplexStream, log: ModemLog) {
        let mut pending = Vec::new();
        let mut chunk = [0u8; 512];
        let mut in_body = false;

        loop {
            let n = match device.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            log.inner.lock().raw.extend_from_slice(&chunk[..n]);
            pending.extend_from_slice(&chunk[..n]);

            while let Some((pos, len)) = next_message(&pending, in_body) {
                let terminator = pending[pos];
                let message: Vec<u8> = pending.drain(..pos + len).collect();
                let text = String::from_utf8_lossy(&message[..pos]).into_owned();
                in_body = false;

                if terminator == ESC {
                    continue;
                }

                let entry = if terminator == SUB {
                    format!("{text}\u{1a}")
                } else {
                    text.clone()
                };
                log.inner.lock().messages.push(entry);

                let reply = self.next_reply(&text);
                in_body = reply.ends_with("> ");
                if !reply.is_empty() && device.write_all(reply.as_bytes()).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Position and terminator length of the next complete message.
fn next_message(buf: &[u8], in_body: bool) -> Option<(usize, usize)> {
    let esc = buf.iter().position(|b| *b == ESC).map(|p| (p, 1));
    let end = if in_body {
        buf.iter().position(|b| *b == SUB).map(|p| (p, 1))
    } else {
        buf.windows(2).position(|w| w == b"\r\n").map(|p| (p, 2))
    };
    match (esc, end) {
        (Some(a), Some(b)) => Some(if a.0 < b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Hands out prepared transports, one per connect.
pub(crate) struct FakeConnector {
    transports: VecDeque<DuplexStream>,
    connects: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub(crate) fn new(transports: impl IntoIterator<Item = DuplexStream>) -> Self {
        Self {
            transports: transports.into_iter().collect(),
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Counter of connection attempts, readable after the connector moves
    /// into an actor.
    pub(crate) fn connects(&self) -> Arc<AtomicUsize> {
        self.connects.clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Transport = DuplexStream;

    async fn connect(&mut self) -> io::Result<DuplexStream> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.transports
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no fake modem attached"))
    }

    fn describe(&self) -> String {
        "fake".to_string()
    }
}
