use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A structured weather report, the expected shape of the agent's final
/// answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WeatherReport {
    /// Name of the city the report is about.
    pub city: String,
    /// The current temperature in degrees Celsius.
    pub degree_c: f64,
    /// A short description of the current condition, if known.
    pub condition: Option<String>,
}

impl WeatherReport {
    /// Returns the JSON schema of the report, for constraining the model
    /// output.
    #[inline]
    pub fn output_schema() -> Value {
        schema_for!(WeatherReport).to_value()
    }

    /// Parses a report from a final assistant message.
    ///
    /// Returns `None` if the message is not a valid report, which can
    /// happen when the model ignores the output schema.
    #[inline]
    pub fn from_final_output(output: &str) -> Option<Self> {
        serde_json::from_str(output.trim()).ok()
    }
}
