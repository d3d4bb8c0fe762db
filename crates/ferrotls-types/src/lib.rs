#![forbid(unsafe_code)]
#![doc = "Shared error types for the ferrotls crates."]

pub mod error;

pub use error::*;
