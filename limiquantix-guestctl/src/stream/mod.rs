//! Guest stream protocol: key/value blocks reassembled from raw bytes.

pub mod block;
pub mod reassembler;

pub use block::{StreamBlock, RESULT_CODE_KEY};
pub use reassembler::{ParseStatus, StreamReassembler, DEFAULT_GROW_INCREMENT, DEFAULT_MAX_RECORD_LEN};

use crate::error::{GuestCtlError, Result};

/// Output of one [`StreamCollector::push`].
#[derive(Debug, Default)]
pub struct Collected {
    /// Blocks completed by the chunk, in stream order.
    pub blocks: Vec<StreamBlock>,
    /// One `ProtocolMalformed` per block that was dropped.
    pub errors: Vec<GuestCtlError>,
}

impl Collected {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Drives a [`StreamReassembler`] for one inbound stream, holding on to
/// the block that is still being assembled between chunks.
#[derive(Debug, Default)]
pub struct StreamCollector {
    reassembler: StreamReassembler,
    pending: StreamBlock,
}

impl StreamCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reassembler(reassembler: StreamReassembler) -> Self {
        Self {
            reassembler,
            pending: StreamBlock::new(),
        }
    }

    /// Feed one chunk and return every block it completed.
    ///
    /// A malformed block is dropped and reported in [`Collected::errors`];
    /// parsing carries on with the blocks that follow it. Only a failure to
    /// buffer the chunk is returned as `Err`.
    pub fn push(&mut self, data: &[u8]) -> Result<Collected> {
        self.reassembler.feed(data)?;

        let mut collected = Collected::default();
        loop {
            match self.reassembler.parse_block(&mut self.pending) {
                Ok(ParseStatus::Complete) => collected.blocks.push(std::mem::take(&mut self.pending)),
                Ok(ParseStatus::MoreDataNeeded) | Ok(ParseStatus::NoData) => break,
                Err(e) => {
                    self.pending.clear();
                    collected.errors.push(e);
                }
            }
        }

        Ok(collected)
    }

    /// The block assembled so far, not yet terminated.
    pub fn pending(&self) -> &StreamBlock {
        &self.pending
    }

    pub fn reset(&mut self) {
        self.reassembler.reset();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_yields_blocks_across_chunks() {
        let mut collector = StreamCollector::new();

        assert!(collector.push(b"name=a\0st_si").unwrap().blocks.is_empty());
        assert_eq!(collector.pending().get_string("name"), Some("a"));

        let collected = collector.push(b"ze=1\0\0name=b\0st_size=2\0\0name=").unwrap();
        assert!(collected.is_clean());
        assert_eq!(collected.blocks.len(), 2);
        assert_eq!(collected.blocks[0].get_int64("st_size"), 1);
        assert_eq!(collected.blocks[1].get_string("name"), Some("b"));

        let collected = collector.push(b"c\0\0").unwrap();
        assert_eq!(collected.blocks.len(), 1);
        assert_eq!(collected.blocks[0].get_string("name"), Some("c"));
        assert!(collector.pending().is_empty());
    }

    #[test]
    fn test_collector_keeps_blocks_around_malformed_record() {
        let mut collector = StreamCollector::new();

        let collected = collector
            .push(b"name=a\0st_size=1\0\0bad\0\0name=b\0st_size=2\0\0")
            .unwrap();

        let names: Vec<_> = collected.blocks.iter().map(|b| b.get_string("name")).collect();
        assert_eq!(names, vec![Some("a"), Some("b")]);
        assert_eq!(collected.errors.len(), 1);
        assert!(matches!(collected.errors[0], GuestCtlError::ProtocolMalformed(_)));
    }

    #[test]
    fn test_collector_drops_only_the_broken_block() {
        let mut collector = StreamCollector::new();

        let collected = collector
            .push(b"name=a\0\0name=x\0oops\0st_size=9\0\0name=b\0\0")
            .unwrap();

        assert_eq!(collected.blocks.len(), 2);
        assert_eq!(collected.blocks[0].get_string("name"), Some("a"));
        assert_eq!(collected.blocks[1].get_string("name"), Some("b"));
        assert_eq!(collected.blocks[1].get_string("st_size"), None);
        assert!(!collected.is_clean());
    }

    #[test]
    fn test_collector_malformed_clears_pending() {
        let mut collector = StreamCollector::new();
        collector.push(b"name=a\0").unwrap();

        let collected = collector.push(b"oops\0").unwrap();
        assert!(matches!(collected.errors[..], [GuestCtlError::ProtocolMalformed(_)]));
        assert!(collector.pending().is_empty());

        // The broken block ends here; the next one is whole.
        let collected = collector.push(b"st_size=3\0\0name=b\0\0").unwrap();
        assert!(collected.is_clean());
        assert_eq!(collected.blocks.len(), 1);
        assert_eq!(collected.blocks[0].get_string("name"), Some("b"));
    }
}
