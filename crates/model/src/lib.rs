//! An abstraction layer for different LLMs.
//!
//! The agent talks to its model through the traits in this crate, so a
//! provider can be swapped (or faked in tests) without touching the
//! agent loop. Types here carry no behavior of their own; they only
//! describe the contract that provider implementations must follow.

#![deny(missing_docs)]

mod error;
mod opaque;
mod provider;
mod request;
mod response;

pub use error::*;
pub use opaque::*;
pub use provider::*;
pub use request::*;
pub use response::*;
