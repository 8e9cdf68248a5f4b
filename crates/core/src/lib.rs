pub mod catalog;
pub mod consts;
pub mod error;
pub mod frame;
pub mod matchers;
pub mod memory;
pub mod models;
pub mod parsing;
pub mod resolvers;
pub mod session;
pub mod snapshot;
pub mod traits;
pub mod utils;
pub mod values;

pub use catalog::{load_catalog_from_file, DwarfTypeLoader, TypeCatalog};
pub use error::{LensError, MemoryFault};
pub use frame::Frame;
pub use matchers::{PatternMatcher, PrefixMatcher, SuffixMatcher};
pub use memory::ProcessHandle;
pub use models::{LensConfig, ResolutionPolicy, SnapshotFile, VariableKind};
pub use resolvers::{
    MethodDispatcher, Resolution, RuntimeIdentity, RuntimeIdentityResolver, StepTarget,
    UnresolvedReason,
};
pub use session::Session;
pub use snapshot::{load_session, open_snapshot, open_snapshot_with_binary, SnapshotProcess};
pub use traits::{ProcessCoordinator, ProxyMatcher, RuntimeCall};
pub use utils::{format_value, FormatOptions};
pub use values::{DynamicValue, StaticValue, Value, ValueSummary};
