//! Core types used throughout the library.

pub mod chunk;
pub mod message;
pub mod options;

// Re-export commonly used types
pub use chunk::*;
pub use message::*;
pub use options::*;
