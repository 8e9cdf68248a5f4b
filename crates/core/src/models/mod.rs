pub mod base;
pub mod snapshot;
pub mod types;

pub use base::*;
pub use snapshot::*;
pub use types::*;
