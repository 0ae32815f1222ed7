//! File system object records decoded from guest stream blocks.
//!
//! The guest's `ls`, `stat` and `mktemp` tools report one block per object:
//!
//! ```text
//! node_id=1234\0name=/tmp/foo\0ftype=-\0st_size=42\0\0
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{GuestCtlError, Result};
use crate::stream::StreamBlock;

/// Kind of file system object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsObjType {
    File,
    Directory,
    Undefined,
}

impl FsObjType {
    /// Map the guest's `ftype` marker.
    pub fn from_marker(marker: &str) -> Self {
        if marker.eq_ignore_ascii_case("-") {
            FsObjType::File
        } else if marker.eq_ignore_ascii_case("d") {
            FsObjType::Directory
        } else {
            FsObjType::Undefined
        }
    }
}

/// A file system object as reported by the guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsObjData {
    pub name: String,
    pub obj_type: FsObjType,
    pub object_size: i64,
    /// Zero when the guest tools are too old to report it.
    pub node_id: i64,
}

impl FsObjData {
    /// Decode one `ls` entry.
    pub fn from_ls(block: &StreamBlock) -> Result<Self> {
        block.dump_to_log();
        Ok(Self {
            name: required_name(block)?,
            obj_type: obj_type(block),
            object_size: block.get_int64_checked("st_size")?,
            node_id: 0,
        })
    }

    /// Decode a `stat` result. `node_id` is optional.
    pub fn from_stat(block: &StreamBlock) -> Result<Self> {
        block.dump_to_log();
        let node_id = block.get_int64("node_id");
        Ok(Self {
            name: required_name(block)?,
            obj_type: obj_type(block),
            object_size: block.get_int64_checked("st_size")?,
            node_id,
        })
    }

    /// Decode a `mktemp` result. Fails with the guest's code if `rc` is negative.
    pub fn from_mktemp(block: &StreamBlock) -> Result<Self> {
        block.dump_to_log();
        let name = required_name(block)?;
        let rc = block.get_result_code()?;
        if rc < 0 {
            return Err(GuestCtlError::GuestError { code: i32::from(rc) });
        }

        Ok(Self {
            name,
            obj_type: FsObjType::Undefined,
            object_size: 0,
            node_id: 0,
        })
    }
}

fn required_name(block: &StreamBlock) -> Result<String> {
    match block.get_string("name") {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(GuestCtlError::NotFound("stream key 'name'".to_string())),
    }
}

fn obj_type(block: &StreamBlock) -> FsObjType {
    FsObjType::from_marker(block.get_string("ftype").unwrap_or_default())
}
