//! API request handlers

mod admission;
mod health;

pub use admission::*;
pub use health::*;
