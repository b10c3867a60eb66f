//! Dataset description and loader configuration

pub mod description;
pub mod loader;

pub use description::*;
pub use loader::*;
