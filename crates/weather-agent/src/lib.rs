//! An agent that answers weather questions with live data and can send
//! the answer by email.
//!
//! The crate includes a CLI tool for one-shot queries in the terminal. And
//! you can also use it as a library to bring the agent functionality into
//! your own host apps.

#![deny(missing_docs)]

#[allow(unused_imports)]
#[macro_use]
extern crate tracing;

mod report;
mod session;
pub mod tools;

pub use report::WeatherReport;
pub use session::{Session, SessionBuilder};

/// Re-exports of [`weather_agent_core`] crate.
pub mod core {
    pub use weather_agent_core::*;
}
