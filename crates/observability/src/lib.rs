//! Process-wide tracing setup shared by the storefront binaries.

pub mod tracing;

pub use crate::tracing::{LogFormat, init, init_with};
