use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::catalog::{load_catalog_from_file, TypeCatalog};
use crate::error::{LensError, MemoryFault};
use crate::models::{LensConfig, ProcessRecord, SnapshotFile};
use crate::session::Session;
use crate::traits::{ProcessCoordinator, RuntimeCall};

/// A post-mortem process backed by the memory regions of a snapshot file
pub struct SnapshotProcess {
    regions: Vec<(u64, Vec<u8>)>,
    runtime_classes: HashMap<u64, u64>,
    stopped: bool,
    stop_id: u64,
    fail_runtime_calls: bool,
    lose_target_on_call: bool,
}

impl SnapshotProcess {
    pub fn from_record(record: &ProcessRecord) -> Result<Self, LensError> {
        let mut regions = Vec::with_capacity(record.regions.len());
        for region in &record.regions {
            regions.push((region.address, region.decode()?));
        }

        let runtime_classes = record
            .runtime_classes
            .iter()
            .map(|entry| (entry.object, entry.tag))
            .collect();

        debug!(
            "Snapshot process has {} regions, stop id {}",
            regions.len(),
            record.stop_id
        );

        Ok(Self {
            regions,
            runtime_classes,
            stopped: record.stopped,
            stop_id: record.stop_id,
            fail_runtime_calls: record.fail_runtime_calls,
            lose_target_on_call: record.lose_target_on_call,
        })
    }

    fn region_slice(&self, address: u64, length: usize) -> Option<&[u8]> {
        let end = address.checked_add(length as u64)?;
        self.regions.iter().find_map(|(base, bytes)| {
            let region_end = base.checked_add(bytes.len() as u64)?;
            if address >= *base && end <= region_end {
                let start = (address - base) as usize;
                Some(&bytes[start..start + length])
            } else {
                None
            }
        })
    }
}

impl ProcessCoordinator for SnapshotProcess {
    fn name(&self) -> &str {
        "snapshot"
    }

    fn is_process_stopped(&self) -> bool {
        self.stopped
    }

    fn stop_id(&self) -> u64 {
        self.stop_id
    }

    fn read_memory(&mut self, address: u64, length: usize) -> Result<Vec<u8>, LensError> {
        if !self.stopped {
            return Err(LensError::MemoryReadError {
                address,
                length,
                fault: MemoryFault::ProcessRunning,
            });
        }

        self.region_slice(address, length)
            .map(|bytes| bytes.to_vec())
            .ok_or(LensError::MemoryReadError {
                address,
                length,
                fault: MemoryFault::Unmapped,
            })
    }

    fn resume_for_call(&mut self, call: &RuntimeCall) -> Result<u64, LensError> {
        if self.lose_target_on_call {
            warn!("Target exited while running {:?}", call);
            self.stopped = false;
            return Err(LensError::RuntimeCallFailure(
                "target exited during call".to_string(),
            ));
        }
        if self.fail_runtime_calls {
            return Err(LensError::RuntimeCallFailure(format!(
                "{:?} raised an exception in the target",
                call
            )));
        }

        match call {
            RuntimeCall::ClassOf { object } => {
                self.runtime_classes.get(object).copied().ok_or_else(|| {
                    LensError::RuntimeCallFailure(format!(
                        "runtime has no class for object at 0x{:x}",
                        object
                    ))
                })
            }
        }
    }

    fn resume(&mut self) -> Result<(), LensError> {
        self.stopped = false;
        Ok(())
    }

    fn halt(&mut self) -> Result<u64, LensError> {
        self.stopped = true;
        self.stop_id += 1;
        Ok(self.stop_id)
    }
}

/// Builds a session from a parsed snapshot, registering its types and tags
/// into `catalog` on top of whatever it already holds
pub fn load_session_with_catalog(
    snapshot: SnapshotFile,
    config: LensConfig,
    mut catalog: TypeCatalog,
) -> Result<Arc<Session>, LensError> {
    config.validate()?;

    let type_count = snapshot.types.len();
    for descriptor in snapshot.types {
        catalog.register_type(descriptor);
    }
    for tag in &snapshot.tags {
        catalog.register_tag(tag.tag, &tag.type_name, tag.offset_to_top);
    }
    info!(
        "Loaded snapshot: {} types, {} tags, {} frames",
        type_count,
        snapshot.tags.len(),
        snapshot.frames.len()
    );

    let process = SnapshotProcess::from_record(&snapshot.process)?;
    Ok(Session::new(catalog, Box::new(process), config, snapshot.frames))
}

pub fn load_session(snapshot: SnapshotFile, config: LensConfig) -> Result<Arc<Session>, LensError> {
    let catalog = TypeCatalog::with_config(&config);
    load_session_with_catalog(snapshot, config, catalog)
}

pub fn open_snapshot(path: &Path, config: LensConfig) -> Result<Arc<Session>, LensError> {
    load_session(SnapshotFile::from_path(path)?, config)
}

/// Opens a snapshot whose types come (also) from the debug info of `binary`
pub fn open_snapshot_with_binary(
    path: &Path,
    binary: &Path,
    config: LensConfig,
) -> Result<Arc<Session>, LensError> {
    let mut catalog = TypeCatalog::with_config(&config);
    let loaded = load_catalog_from_file(binary, &mut catalog)?;
    info!("Loaded {} types from {}", loaded, binary.display());
    load_session_with_catalog(SnapshotFile::from_path(path)?, config, catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RegionRecord, RuntimeClassRecord};

    fn record() -> ProcessRecord {
        ProcessRecord {
            stopped: true,
            stop_id: 4,
            regions: vec![RegionRecord {
                address: 0x1000,
                bytes: "0013000000000000 1e000000".to_string(),
            }],
            runtime_classes: vec![RuntimeClassRecord {
                object: 0x1000,
                tag: 0x1300,
            }],
            fail_runtime_calls: false,
            lose_target_on_call: false,
        }
    }

    #[test]
    fn test_region_reads() {
        let mut process = SnapshotProcess::from_record(&record()).unwrap();
        assert_eq!(process.read_memory(0x1008, 4).unwrap(), vec![0x1e, 0, 0, 0]);
        assert!(matches!(
            process.read_memory(0x100a, 4),
            Err(LensError::MemoryReadError {
                fault: MemoryFault::Unmapped,
                ..
            })
        ));
        assert!(process.read_memory(u64::MAX - 2, 8).is_err());
    }

    #[test]
    fn test_runtime_calls() {
        let mut process = SnapshotProcess::from_record(&record()).unwrap();
        assert_eq!(
            process.resume_for_call(&RuntimeCall::ClassOf { object: 0x1000 }).unwrap(),
            0x1300
        );
        assert!(process.resume_for_call(&RuntimeCall::ClassOf { object: 0x2000 }).is_err());

        let mut lost = record();
        lost.lose_target_on_call = true;
        let mut process = SnapshotProcess::from_record(&lost).unwrap();
        assert!(process.resume_for_call(&RuntimeCall::ClassOf { object: 0x1000 }).is_err());
        assert!(!process.is_process_stopped());
    }

    #[test]
    fn test_halt_advances_stop_id() {
        let mut process = SnapshotProcess::from_record(&record()).unwrap();
        process.resume().unwrap();
        assert!(process.read_memory(0x1000, 8).is_err());
        assert_eq!(process.halt().unwrap(), 5);
        assert_eq!(process.stop_id(), 5);
    }
}
