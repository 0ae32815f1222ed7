//! Incremental parser for the guest agent's key/value stream.
//!
//! The guest writes NUL-terminated UTF-8 records back to back. An empty
//! record closes the current block:
//!
//! ```text
//! name=foo\0ftype=-\0st_size=42\0\0name=bar\0...
//! └──────────── block 1 ─────────────┘└── block 2 ...
//! ```
//!
//! Bytes arrive in arbitrary chunks, so a record (or a whole block) may be
//! split across several `feed` calls.

use tracing::{trace, warn};

use crate::config::StreamConfig;
use crate::error::{GuestCtlError, Result};
use crate::stream::block::StreamBlock;

/// Buffer capacity grows in multiples of this many bytes.
pub const DEFAULT_GROW_INCREMENT: usize = 64 * 1024;

/// Longest record accepted before the stream is declared malformed.
pub const DEFAULT_MAX_RECORD_LEN: usize = 64 * 1024;

/// Outcome of a successful [`StreamReassembler::parse_block`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// A block terminator was consumed; the block is complete.
    Complete,
    /// The current block is not terminated yet. Feed more bytes and parse
    /// again with the same block.
    MoreDataNeeded,
    /// Nothing left to parse.
    NoData,
}

/// Byte buffer plus read offset. Bytes before `offset` belong to blocks
/// already returned; bytes from `offset` to the end are unparsed.
#[derive(Debug)]
pub struct StreamReassembler {
    buffer: Vec<u8>,
    offset: usize,
    grow_increment: usize,
    max_record_len: usize,
    discard: Discard,
}

/// Progress through a block that contained a malformed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Discard {
    None,
    /// Inside an over-long record; its terminating NUL has not been seen.
    RecordTail,
    /// Between records of the broken block; skip to the next empty record.
    Block,
}

impl StreamReassembler {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_GROW_INCREMENT, DEFAULT_MAX_RECORD_LEN)
    }

    pub fn with_limits(grow_increment: usize, max_record_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            offset: 0,
            grow_increment: grow_increment.max(1),
            max_record_len,
            discard: Discard::None,
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::with_limits(config.grow_increment, config.max_record_len)
    }

    /// Append raw bytes from the guest.
    ///
    /// Unread bytes are moved to the front before the buffer grows. On
    /// allocation failure the buffer is left exactly as it was.
    pub fn feed(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(GuestCtlError::InvalidArgument("empty stream chunk".to_string()));
        }

        // Everything consumed: rewind.
        if self.offset == self.buffer.len() {
            self.buffer.clear();
            self.offset = 0;
        }

        if self.buffer.len() + data.len() <= self.buffer.capacity() {
            self.buffer.extend_from_slice(data);
            return Ok(());
        }

        let unread = self.buffer.len() - self.offset;
        let needed = unread
            .checked_add(data.len())
            .ok_or_else(|| GuestCtlError::OutOfMemory("stream buffer size overflow".to_string()))?;

        if needed <= self.buffer.capacity() {
            self.compact();
            self.buffer.extend_from_slice(data);
            return Ok(());
        }

        let target = needed
            .checked_next_multiple_of(self.grow_increment)
            .ok_or_else(|| GuestCtlError::OutOfMemory("stream buffer size overflow".to_string()))?;

        let mut grown = Vec::new();
        grown.try_reserve_exact(target).map_err(|e| {
            GuestCtlError::OutOfMemory(format!("growing stream buffer to {} bytes: {}", target, e))
        })?;
        grown.extend_from_slice(&self.buffer[self.offset..]);
        grown.extend_from_slice(data);

        trace!(
            old_capacity = self.buffer.capacity(),
            new_capacity = grown.capacity(),
            unread = needed,
            "Grew stream buffer"
        );

        self.buffer = grown;
        self.offset = 0;
        Ok(())
    }

    fn compact(&mut self) {
        if self.offset > 0 {
            self.buffer.copy_within(self.offset.., 0);
            self.buffer.truncate(self.buffer.len() - self.offset);
            self.offset = 0;
        }
    }

    /// Parse the next block into `block`.
    ///
    /// On `MoreDataNeeded` the offset stays at the start of the block and
    /// the pairs decoded so far remain in `block`; the next call re-scans
    /// the block and sets the same keys again.
    ///
    /// On `ProtocolMalformed` `block` should be discarded. The rest of the
    /// broken block, up to and including its terminator, is skipped by the
    /// following calls, which then resume at the next block. While that
    /// terminator has not arrived yet, `NoData` is returned.
    pub fn parse_block(&mut self, block: &mut StreamBlock) -> Result<ParseStatus> {
        if !self.resync() || self.offset >= self.buffer.len() {
            return Ok(ParseStatus::NoData);
        }

        let mut pos = self.offset;
        loop {
            let Some(nul) = self.buffer[pos..].iter().position(|&b| b == 0) else {
                let pending = self.buffer.len() - pos;
                if pending > self.max_record_len {
                    self.offset = self.buffer.len();
                    return Err(self.malformed(
                        Discard::RecordTail,
                        format!("unterminated record exceeds {} bytes", self.max_record_len),
                    ));
                }
                return Ok(ParseStatus::MoreDataNeeded);
            };

            let record_end = pos + nul;
            if nul == 0 {
                self.offset = record_end + 1;
                return Ok(ParseStatus::Complete);
            }

            let parsed = if nul > self.max_record_len {
                Err(format!("record of {} bytes exceeds {} bytes", nul, self.max_record_len))
            } else {
                split_record(&self.buffer[pos..record_end]).and_then(|(key, value)| {
                    block.set_value(key, Some(value)).map_err(|e| e.to_string())
                })
            };

            pos = record_end + 1;

            if let Err(reason) = parsed {
                self.offset = pos;
                return Err(self.malformed(Discard::Block, reason));
            }
        }
    }

    /// Skip what is left of a malformed block. Returns `false` while the
    /// buffered bytes are exhausted before the block terminator.
    fn resync(&mut self) -> bool {
        while self.discard != Discard::None {
            let Some(nul) = self.buffer[self.offset..].iter().position(|&b| b == 0) else {
                self.offset = self.buffer.len();
                return false;
            };
            self.offset += nul + 1;

            self.discard = match self.discard {
                // The NUL ends the over-long record, whatever precedes it.
                Discard::RecordTail => Discard::Block,
                Discard::Block if nul == 0 => {
                    trace!(offset = self.offset, "Resynchronized guest stream");
                    Discard::None
                }
                other => other,
            };
        }
        true
    }

    fn malformed(&mut self, discard: Discard, reason: String) -> GuestCtlError {
        warn!(offset = self.offset, size = self.buffer.len(), reason = %reason, "Malformed guest stream");
        self.discard = discard;
        GuestCtlError::ProtocolMalformed(reason)
    }

    /// Release the buffer and forget any block being skipped.
    pub fn reset(&mut self) {
        self.buffer = Vec::new();
        self.offset = 0;
        self.discard = Discard::None;
    }

    /// Bytes currently buffered, parsed or not.
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn unparsed(&self) -> &[u8] {
        &self.buffer[self.offset..]
    }
}

impl Default for StreamReassembler {
    fn default() -> Self {
        Self::new()
    }
}

fn split_record(record: &[u8]) -> std::result::Result<(&str, &str), String> {
    let text = std::str::from_utf8(record).map_err(|e| format!("record is not UTF-8: {}", e))?;

    let (key, value) = text
        .split_once('=')
        .ok_or_else(|| format!("record '{}' has no '='", text))?;

    if key.is_empty() {
        return Err(format!("record '{}' has an empty key", text));
    }

    Ok((key, value))
}
