use log::{debug, trace, warn};
use parking_lot::Mutex;

use crate::error::{LensError, MemoryFault};
use crate::models::{ScalarEncoding, ScalarValue};
use crate::traits::{ProcessCoordinator, RuntimeCall};

/// Serialized access to the target process.
///
/// Every read and every runtime call goes through one lock, so a
/// resume-call-restop sequence can never interleave with another resolution.
pub struct ProcessHandle {
    inner: Mutex<Box<dyn ProcessCoordinator>>,
}

impl ProcessHandle {
    pub fn new(coordinator: Box<dyn ProcessCoordinator>) -> Self {
        debug!("Attaching to process coordinator: {}", coordinator.name());
        Self {
            inner: Mutex::new(coordinator),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.lock().is_process_stopped()
    }

    pub fn stop_id(&self) -> u64 {
        self.inner.lock().stop_id()
    }

    pub fn read_memory(&self, address: u64, length: usize) -> Result<Vec<u8>, LensError> {
        let mut process = self.inner.lock();
        if !process.is_process_stopped() {
            return Err(LensError::MemoryReadError {
                address,
                length,
                fault: MemoryFault::ProcessRunning,
            });
        }

        trace!("Reading {} bytes at 0x{:x}", length, address);
        process.read_memory(address, length)
    }

    pub fn read_u64(&self, address: u64) -> Result<u64, LensError> {
        let bytes = self.read_memory(address, 8)?;
        let word = bytes.get(..8).ok_or(LensError::MemoryReadError {
            address,
            length: 8,
            fault: MemoryFault::Unmapped,
        })?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(word);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_scalar(
        &self,
        address: u64,
        size: u64,
        encoding: ScalarEncoding,
    ) -> Result<Option<ScalarValue>, LensError> {
        let bytes = self.read_memory(address, size as usize)?;
        Ok(ScalarValue::from_bytes(&bytes, encoding))
    }

    /// Asks the target's runtime for the identity tag of the object at `object`.
    ///
    /// The lock is held across the whole resume-call-restop sequence. A target
    /// that is not stopped afterwards is unusable and ends the session.
    pub fn call_class_of(&self, object: u64) -> Result<u64, LensError> {
        let mut process = self.inner.lock();
        if !process.is_process_stopped() {
            return Err(LensError::RuntimeCallFailure(
                "process must be stopped before running a call".to_string(),
            ));
        }

        debug!("Running class-of call for object at 0x{:x}", object);
        let result = process.resume_for_call(&RuntimeCall::ClassOf { object });

        if !process.is_process_stopped() {
            warn!("Target did not re-stop after runtime call");
            return Err(LensError::SessionLost);
        }

        match result {
            Ok(tag) => Ok(tag),
            Err(LensError::SessionLost) => Err(LensError::SessionLost),
            Err(LensError::RuntimeCallFailure(reason)) => Err(LensError::RuntimeCallFailure(reason)),
            Err(other) => Err(LensError::RuntimeCallFailure(other.to_string())),
        }
    }

    pub fn resume(&self) -> Result<(), LensError> {
        self.inner.lock().resume()
    }

    pub fn halt(&self) -> Result<u64, LensError> {
        self.inner.lock().halt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    /// Counts coordinator calls that were in flight at the same time
    #[derive(Default)]
    struct OverlapTracker {
        active: AtomicUsize,
        overlaps: AtomicUsize,
        calls: AtomicUsize,
    }

    impl OverlapTracker {
        fn enter(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.active.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn leave(&self) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct FakeProcess {
        stopped: bool,
        stop_id: u64,
        memory: Vec<u8>,
        call_result: Option<u64>,
        crash_on_call: bool,
        tracker: Arc<OverlapTracker>,
    }

    impl FakeProcess {
        fn new(memory: Vec<u8>) -> Self {
            Self {
                stopped: true,
                stop_id: 1,
                memory,
                call_result: None,
                crash_on_call: false,
                tracker: Arc::new(OverlapTracker::default()),
            }
        }
    }

    impl ProcessCoordinator for FakeProcess {
        fn name(&self) -> &str {
            "fake"
        }

        fn is_process_stopped(&self) -> bool {
            self.stopped
        }

        fn stop_id(&self) -> u64 {
            self.stop_id
        }

        fn read_memory(&mut self, address: u64, length: usize) -> Result<Vec<u8>, LensError> {
            self.tracker.enter();
            let start = address as usize;
            let result = self
                .memory
                .get(start..start + length)
                .map(|slice| slice.to_vec())
                .ok_or(LensError::MemoryReadError {
                    address,
                    length,
                    fault: MemoryFault::Unmapped,
                });
            self.tracker.leave();
            result
        }

        fn resume_for_call(&mut self, _call: &RuntimeCall) -> Result<u64, LensError> {
            self.tracker.enter();
            self.stopped = false;
            thread::sleep(Duration::from_millis(2));
            if self.crash_on_call {
                self.tracker.leave();
                return Err(LensError::RuntimeCallFailure("target crashed".to_string()));
            }
            self.stopped = true;
            self.tracker.leave();
            self.call_result
                .ok_or_else(|| LensError::RuntimeCallFailure("no answer".to_string()))
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

    #[test]
    fn test_reads_little_endian() {
        let handle = ProcessHandle::new(Box::new(FakeProcess::new(
            hex!("0013000000000000 1e000000").to_vec(),
        )));
        assert_eq!(handle.read_u64(0).unwrap(), 0x1300);
        assert_eq!(
            handle.read_scalar(8, 4, ScalarEncoding::Signed).unwrap(),
            Some(ScalarValue::Signed(30))
        );
        assert!(matches!(
            handle.read_u64(8),
            Err(LensError::MemoryReadError {
                fault: MemoryFault::Unmapped,
                ..
            })
        ));
    }

    #[test]
    fn test_running_process_cannot_be_read() {
        let handle = ProcessHandle::new(Box::new(FakeProcess::new(vec![0; 16])));
        handle.resume().unwrap();
        assert!(matches!(
            handle.read_u64(0),
            Err(LensError::MemoryReadError {
                fault: MemoryFault::ProcessRunning,
                ..
            })
        ));

        assert_eq!(handle.halt().unwrap(), 2);
        assert_eq!(handle.read_u64(0).unwrap(), 0);
    }

    #[test]
    fn test_runtime_call_outcomes() {
        let mut process = FakeProcess::new(vec![]);
        process.call_result = Some(0x1300);
        let handle = ProcessHandle::new(Box::new(process));
        assert_eq!(handle.call_class_of(0x3200).unwrap(), 0x1300);
        assert_eq!(handle.stop_id(), 1);

        let handle = ProcessHandle::new(Box::new(FakeProcess::new(vec![])));
        assert!(matches!(
            handle.call_class_of(0x3200),
            Err(LensError::RuntimeCallFailure(_))
        ));
        assert!(handle.is_stopped());

        let mut process = FakeProcess::new(vec![]);
        process.crash_on_call = true;
        let handle = ProcessHandle::new(Box::new(process));
        let err = handle.call_class_of(0x3200).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_calls_never_interleave_with_reads() {
        let mut process = FakeProcess::new(hex!("0013000000000000").to_vec());
        process.call_result = Some(0x1300);
        let tracker = process.tracker.clone();
        let handle = Arc::new(ProcessHandle::new(Box::new(process)));

        thread::scope(|scope| {
            for worker in 0..4 {
                let handle = handle.clone();
                scope.spawn(move || {
                    for _ in 0..10 {
                        if worker % 2 == 0 {
                            assert_eq!(handle.call_class_of(0x3200).unwrap(), 0x1300);
                        } else {
                            assert_eq!(handle.read_u64(0).unwrap(), 0x1300);
                        }
                    }
                });
            }
        });

        assert_eq!(tracker.calls.load(Ordering::SeqCst), 40);
        assert_eq!(tracker.overlaps.load(Ordering::SeqCst), 0);
        assert!(handle.is_stopped());
        assert_eq!(handle.stop_id(), 1);
    }
}
