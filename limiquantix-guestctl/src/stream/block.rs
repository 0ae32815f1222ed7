//! One decoded group of key/value pairs.

use std::str::FromStr;

use tracing::trace;

use crate::error::{GuestCtlError, Result};

/// Conventional key carrying a block's result code.
pub const RESULT_CODE_KEY: &str = "rc";

/// Key/value pairs in insertion order, keys unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamBlock {
    pairs: Vec<(String, String)>,
}

impl StreamBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, replacing an existing value in place.
    /// A `None` value deletes the key.
    pub fn set_value(&mut self, key: &str, value: Option<&str>) -> Result<()> {
        if key.is_empty() {
            return Err(GuestCtlError::InvalidArgument("empty stream block key".to_string()));
        }

        let existing = self.pairs.iter().position(|(k, _)| k == key);
        match (existing, value) {
            (Some(idx), Some(value)) => self.pairs[idx].1 = value.to_string(),
            (Some(idx), None) => {
                self.pairs.remove(idx);
            }
            (None, Some(value)) => self.pairs.push((key.to_string(), value.to_string())),
            (None, None) => {}
        }
        Ok(())
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Signed value of `key`, 0 if absent or not a number.
    pub fn get_int64(&self, key: &str) -> i64 {
        self.get_int64_checked(key).unwrap_or(0)
    }

    pub fn get_int64_checked(&self, key: &str) -> Result<i64> {
        self.parse_value(key)
    }

    /// Unsigned value of `key`, 0 if absent or not a number.
    pub fn get_uint32(&self, key: &str) -> u32 {
        self.get_uint32_checked(key).unwrap_or(0)
    }

    pub fn get_uint32_checked(&self, key: &str) -> Result<u32> {
        self.parse_value(key)
    }

    /// The block's `rc` value as a 16-bit result code.
    pub fn get_result_code(&self) -> Result<i16> {
        self.parse_value(RESULT_CODE_KEY)
    }

    fn parse_value<T: FromStr>(&self, key: &str) -> Result<T> {
        let value = self
            .get_string(key)
            .ok_or_else(|| GuestCtlError::NotFound(format!("stream key '{}'", key)))?;

        value.trim().parse().map_err(|_| {
            GuestCtlError::InvalidArgument(format!("stream key '{}' has non-numeric value '{}'", key, value))
        })
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Trace every pair.
    pub fn dump_to_log(&self) {
        trace!(pairs = self.pairs.len(), "Stream block contents");
        for (key, value) in &self.pairs {
            trace!(key = %key, value = %value, "Stream block pair");
        }
    }
}
