//! Opaque reply payload attached to a completed wait.

use crate::error::{GuestCtlError, Result};

/// Type tag plus an owned byte buffer.
///
/// Cloning always copies the bytes; a stored payload never aliases the
/// signaler's buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    type_tag: u32,
    data: Vec<u8>,
}

impl Payload {
    pub fn new(type_tag: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            type_tag,
            data: data.into(),
        }
    }

    /// Copy `data` into a new payload, reporting allocation failure instead of aborting.
    pub fn copy_from(type_tag: u32, data: &[u8]) -> Result<Self> {
        let mut owned = Vec::new();
        owned.try_reserve_exact(data.len()).map_err(|e| {
            GuestCtlError::OutOfMemory(format!("payload of {} bytes: {}", data.len(), e))
        })?;
        owned.extend_from_slice(data);
        Ok(Self {
            type_tag,
            data: owned,
        })
    }

    /// Fallible deep copy.
    pub fn try_clone(&self) -> Result<Self> {
        Self::copy_from(self.type_tag, &self.data)
    }

    pub fn type_tag(&self) -> u32 {
        self.type_tag
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}
