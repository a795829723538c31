//! Document store backends.
//!
//! - [`memory`] - in-process store, always available
//! - `mongodb` - the official MongoDB driver (feature `mongodb`)

pub mod memory;

#[cfg(feature = "mongodb")]
pub mod mongodb;
