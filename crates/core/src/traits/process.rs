use crate::error::LensError;

/// Calls the resolver may ask the target's runtime to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    /// Ask the object-model runtime for the class of the object at `object`
    ClassOf { object: u64 },
}

/// Process/breakpoint coordinator: the debugger's view of the live or post-mortem target
pub trait ProcessCoordinator: Send {
    fn name(&self) -> &str;
    fn is_process_stopped(&self) -> bool;
    /// Natural stop counter; runtime calls made by the resolver do not advance it
    fn stop_id(&self) -> u64;
    /// Read raw bytes; fails if the process is running or the range is unmapped
    fn read_memory(&mut self, address: u64, length: usize) -> Result<Vec<u8>, LensError>;
    /// Briefly resume the target to run `call`, then re-stop it. Returns the call's result
    fn resume_for_call(&mut self, call: &RuntimeCall) -> Result<u64, LensError>;
    fn resume(&mut self) -> Result<(), LensError>;
    /// Stop the target; returns the new stop id
    fn halt(&mut self) -> Result<u64, LensError>;
}
