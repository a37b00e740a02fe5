//! Utilities

mod constants;

pub use constants::*;
