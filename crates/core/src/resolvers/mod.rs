pub mod dispatch;
pub mod identity;

pub use dispatch::{MethodDispatcher, StepTarget};
pub use identity::{Resolution, RuntimeIdentity, RuntimeIdentityResolver, UnresolvedReason};
