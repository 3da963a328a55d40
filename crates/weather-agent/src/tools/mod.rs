//! A set of built-in tools that models can use.

mod email;
mod weather;

pub use email::SendEmailTool;
pub use weather::WeatherTool;
