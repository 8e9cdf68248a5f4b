pub mod matcher;
pub mod process;

pub use matcher::*;
pub use process::*;
