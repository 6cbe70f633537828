//! Core wire types for HAL.

pub mod message;
pub mod tool;

pub use message::*;
pub use tool::*;
