pub mod format;
pub mod parsing;

pub use format::*;
pub use parsing::*;
