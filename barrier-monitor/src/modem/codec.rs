//! Framing for the AT command link.

use std::io;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Ctrl-Z, ends an SMS body.
pub const SUB: u8 = 0x1A;

/// Escape, abandons a pending SMS prompt.
pub const ESC: u8 = 0x1B;

const PROMPT: &[u8] = b"> ";

/// Give up on a reply that grows past this without a terminator.
const MAX_REPLY_LEN: usize = 16 * 1024;

/// How a reply ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Ok,
    Error,
    /// The `"> "` body prompt, only recognized while one is expected.
    Prompt,
}

/// Everything the modem sent up to and including a terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub kind: ReplyKind,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// A command line, sent with CRLF.
    Command(String),
    /// SMS body, sent with Ctrl-Z.
    Body(String),
    /// Abort a pending prompt.
    Cancel,
}

#[derive(Debug, Default)]
pub struct AtCodec {
    expect_prompt: bool,
    /// Bytes of the buffer already checked for a final result line.
    scanned: usize,
}

impl AtCodec {
    pub fn expect_prompt(&mut self, expect: bool) {
        self.expect_prompt = expect;
    }

    /// Forget scan progress after the read buffer has been cleared.
    pub fn reset(&mut self) {
        self.scanned = 0;
    }

    fn take(&mut self, src: &mut BytesMut, len: usize, kind: ReplyKind) -> Reply {
        let frame = src.split_to(len);
        self.scanned = 0;
        Reply {
            kind,
            text: String::from_utf8_lossy(&frame).into_owned(),
        }
    }
}

fn final_result(line: &str) -> Option<ReplyKind> {
    if line == "OK" {
        Some(ReplyKind::Ok)
    } else if line == "ERROR"
        || line.starts_with("+CME ERROR")
        || line.starts_with("+CMS ERROR")
    {
        Some(ReplyKind::Error)
    } else {
        None
    }
}

impl Decoder for AtCodec {
    type Item = Reply;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.scanned > src.len() {
            self.scanned = 0;
        }

        // Complete lines only; a partial "OK" must not terminate.
        while let Some(pos) = src[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + pos + 1;
            let kind = final_result(String::from_utf8_lossy(&src[self.scanned..end]).trim());
            self.scanned = end;
            if let Some(kind) = kind {
                return Ok(Some(self.take(src, end, kind)));
            }
        }

        if self.expect_prompt {
            if let Some(pos) = src.windows(PROMPT.len()).position(|w| w == PROMPT) {
                return Ok(Some(self.take(src, pos + PROMPT.len(), ReplyKind::Prompt)));
            }
        }

        if src.len() > MAX_REPLY_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("no final result code in {} bytes", src.len()),
            ));
        }

        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(reply) => Ok(Some(reply)),
            None => {
                // Unterminated trailing bytes carry no result.
                src.advance(src.len());
                self.scanned = 0;
                Ok(None)
            }
        }
    }
}

impl Encoder<Request> for AtCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Request::Command(command) => {
                dst.reserve(command.len() + 2);
                dst.put_slice(command.as_bytes());
                dst.put_slice(b"\r\n");
            }
            Request::Body(body) => {
                dst.reserve(body.len() + 1);
                dst.put_slice(body.as_bytes());
                dst.put_u8(SUB);
            }
            Request::Cancel => dst.put_u8(ESC),
        }
        Ok(())
    }
}
