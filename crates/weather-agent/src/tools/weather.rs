use std::env;

use reqwest::Client;
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;
use weather_agent_core::tool::{
    Approval as ToolApproval, Error as ToolError, Tool, ToolResult,
};

const DEFAULT_BASE_URL: &str = "https://wttr.in";

// Renders the current condition and temperature, like "Sunny +31°C".
const WEATHER_FORMAT: &str = "%C+%t";

#[derive(Deserialize, JsonSchema)]
pub struct WeatherToolParameters {
    #[schemars(description = "Name of the city to get the weather for.")]
    city: String,
}

/// A tool for looking up the current weather of a city.
pub struct WeatherTool {
    client: Client,
    base_url: String,
    parameter_schema: Value,
}

impl WeatherTool {
    /// Creates a new weather tool.
    ///
    /// The weather service endpoint can be overridden with the
    /// `WTTR_BASE_URL` environment variable.
    #[inline]
    pub fn new() -> Self {
        let base_url = env::var("WTTR_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned());
        Self::with_base_url(base_url)
    }

    /// Creates a new weather tool that queries the specified endpoint.
    #[inline]
    pub fn with_base_url<S: Into<String>>(base_url: S) -> Self {
        WeatherTool {
            client: Client::new(),
            base_url: base_url.into(),
            parameter_schema: schema_for!(WeatherToolParameters).to_value(),
        }
    }
}

impl Default for WeatherTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for WeatherTool {
    type Input = WeatherToolParameters;

    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        r#"
Gets the current weather for a city.
Returns a short sentence with the condition and the temperature in degrees Celsius."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn make_approval(&self, input: &Self::Input) -> ToolApproval {
        ToolApproval::new(&input.city, "Agent wants to look up the weather")
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: WeatherToolParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.client.clone();
        // The format parameter is passed through verbatim, the service
        // expects the raw `%` placeholders.
        let url = format!(
            "{}/{}?format={WEATHER_FORMAT}",
            self.base_url,
            input.city.to_lowercase()
        );
        async move { fetch_weather(&client, &url, &input.city).await }
    }
}

async fn fetch_weather(
    client: &Client,
    url: &str,
    city: &str,
) -> ToolResult {
    debug!("fetching weather: {url}");
    let resp = client.get(url).send().await.map_err(|err| {
        ToolError::execution_error().with_reason(format!("{err}"))
    })?;
    let status = resp.status();
    if !status.is_success() {
        return Err(ToolError::execution_error()
            .with_reason(format!("weather service returned {status}")));
    }
    let body = resp.text().await.map_err(|err| {
        ToolError::execution_error().with_reason(format!("{err}"))
    })?;
    Ok(format!("The weather of {city} is {}", body.trim()))
}

#[cfg(test)]
mod tests {
    use weather_agent_core::tool::ErrorKind as ToolErrorKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn test_fetches_and_formats_weather() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tokyo"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("Clear +24°C\n"),
            )
            .mount(&server)
            .await;

        let tool = WeatherTool::with_base_url(server.uri());
        let result = tool
            .execute(WeatherToolParameters {
                city: "Tokyo".to_owned(),
            })
            .await;
        assert_eq!(result.unwrap(), "The weather of Tokyo is Clear +24°C");
    }

    #[test]
    fn test_approval_shape() {
        let tool = WeatherTool::with_base_url("http://localhost");
        let approval = tool.make_approval(&WeatherToolParameters {
            city: "Tokyo".to_owned(),
        });
        assert_eq!(approval.what(), "Tokyo");
        assert_eq!(
            approval.justification(),
            "Agent wants to look up the weather"
        );
    }

    #[tokio::test]
    async fn test_service_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let tool = WeatherTool::with_base_url(server.uri());
        let err = tool
            .execute(WeatherToolParameters {
                city: "Tokyo".to_owned(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ToolErrorKind::ExecutionError);
    }
}
