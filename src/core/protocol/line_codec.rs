// src/core/protocol/line_codec.rs

//! A newline-delimited text codec for the client side of the broker.

use super::command::Reply;
use crate::core::BrokerError;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// One decoded unit of client input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLine {
    /// A complete line with its `\n` or `\r\n` terminator removed.
    Line(String),
    /// A line exceeded the length limit. Its bytes are discarded up to the next newline.
    Overlong,
}

/// Frames client input into lines and writes one reply per line.
///
/// Unlike a codec that errors on oversized input, an overlong line is reported
/// once as [`ClientLine::Overlong`] and skipped, so the session survives.
#[derive(Debug)]
pub struct LineCodec {
    max_length: usize,
    /// Index up to which the buffer has already been searched for a newline.
    next_index: usize,
    discarding: bool,
}

impl LineCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

fn line_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

impl Decoder for LineCodec {
    type Item = ClientLine;
    type Error = BrokerError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            // Look one byte past the limit so a line of exactly `max_length`
            // bytes can still find its newline.
            let read_to = src.len().min(self.max_length.saturating_add(1));
            let newline = src[self.next_index..read_to]
                .iter()
                .position(|b| *b == b'\n');

            match (self.discarding, newline) {
                (true, Some(offset)) => {
                    src.advance(self.next_index + offset + 1);
                    self.discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    src.advance(read_to);
                    self.next_index = 0;
                    if src.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(offset)) => {
                    let end = self.next_index + offset;
                    self.next_index = 0;
                    let line = src.split_to(end + 1);
                    return Ok(Some(ClientLine::Line(line_text(&line[..end]))));
                }
                (false, None) if src.len() > self.max_length => {
                    self.discarding = true;
                    self.next_index = 0;
                    return Ok(Some(ClientLine::Overlong));
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() || self.discarding {
            src.clear();
            return Ok(None);
        }
        // A final line without a trailing newline.
        let rest = src.split();
        self.next_index = 0;
        Ok(Some(ClientLine::Line(line_text(&rest))))
    }
}

impl Encoder<Reply> for LineCodec {
    type Error = BrokerError;

    fn encode(&mut self, item: Reply, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let text = item.to_string();
        dst.reserve(text.len() + 1);
        dst.put_slice(text.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}
