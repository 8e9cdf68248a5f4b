use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LensError;
use crate::utils::deserialize_address;

use super::{FrameInfo, TypeDescriptor};

/// On-disk description of a stopped (or post-mortem) process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFile {
    #[serde(default)]
    pub types: Vec<TypeDescriptor>,
    #[serde(default)]
    pub tags: Vec<TagRecord>,
    pub process: ProcessRecord,
    #[serde(default)]
    pub frames: Vec<FrameInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagRecord {
    #[serde(deserialize_with = "deserialize_address")]
    pub tag: u64,
    pub type_name: String,
    /// Distance from the tagged subobject back to the start of the full object
    #[serde(default)]
    pub offset_to_top: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRecord {
    #[serde(default = "default_stopped")]
    pub stopped: bool,
    #[serde(default)]
    pub stop_id: u64,
    #[serde(default)]
    pub regions: Vec<RegionRecord>,
    /// Answers the runtime gives to class-of calls for objects whose tag is not in the catalog
    #[serde(default)]
    pub runtime_classes: Vec<RuntimeClassRecord>,
    #[serde(default)]
    pub fail_runtime_calls: bool,
    #[serde(default)]
    pub lose_target_on_call: bool,
}

fn default_stopped() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionRecord {
    #[serde(deserialize_with = "deserialize_address")]
    pub address: u64,
    /// Hex-encoded contents
    pub bytes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeClassRecord {
    #[serde(deserialize_with = "deserialize_address")]
    pub object: u64,
    #[serde(deserialize_with = "deserialize_address")]
    pub tag: u64,
}

impl SnapshotFile {
    pub fn from_path(path: &Path) -> Result<Self, LensError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, LensError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl RegionRecord {
    pub fn decode(&self) -> Result<Vec<u8>, LensError> {
        let cleaned: String = self.bytes.chars().filter(|c| !c.is_whitespace()).collect();
        hex::decode(&cleaned).map_err(|e| {
            LensError::ConfigError(format!(
                "region at 0x{:x} has invalid hex contents: {}",
                self.address, e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_snapshot() {
        let snapshot = SnapshotFile::from_json(
            r#"{ "process": { "regions": [ { "address": "0x10", "bytes": "01 02 03" } ] } }"#,
        )
        .unwrap();

        assert!(snapshot.process.stopped);
        assert!(snapshot.frames.is_empty());
        assert_eq!(snapshot.process.regions[0].address, 0x10);
        assert_eq!(snapshot.process.regions[0].decode().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_bad_region_hex() {
        let region = RegionRecord {
            address: 0x10,
            bytes: "zz".to_string(),
        };
        assert!(matches!(region.decode(), Err(LensError::ConfigError(_))));
    }
}
