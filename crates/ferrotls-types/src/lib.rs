#![forbid(unsafe_code)]
#![doc = "Common types and error codes for ferrotls."]

pub mod error;

pub use error::*;
