//! # harbor-core
//!
//! Core types, traits, and primitives for the Harbor companion agent.
//! This crate defines the shared vocabulary used by every other crate in
//! the workspace: the memory record schema, the error taxonomy, and the
//! injected clock.

pub mod clock;
pub mod error;
pub mod memory;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{HarborError, Result};
pub use memory::{attrs, MemoryCollection, MemoryRecord, Tier};
pub use types::*;
