//! Weather tool: stub that returns mock weather data.
//!
//! The stub returns plausible, deterministic weather per city so the
//! conversation loop can be exercised end-to-end without network access.

use async_trait::async_trait;
use ferroagent_core::error::ToolError;
use ferroagent_core::tool::{SessionContext, Tool};
use serde_json::Value;

pub struct WeatherLookupTool;

#[async_trait]
impl Tool for WeatherLookupTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get the current weather for a city."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "City name"
                }
            },
            "required": ["city"]
        })
    }

    async fn execute(&self, arguments: Value, _session: &SessionContext) -> Result<Value, ToolError> {
        let city = arguments["city"]
            .as_str()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'city' argument".into()))?;

        let (temperature, conditions) = mock_weather(city);
        Ok(Value::String(format!(
            "The weather in {city}: {temperature}°C, {conditions}"
        )))
    }
}

/// Deterministic weather derived from a hash of the city name.
fn mock_weather(city: &str) -> (i32, &'static str) {
    let hash: u32 = city
        .to_lowercase()
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));

    let conditions = [
        "sunny",
        "partly cloudy",
        "overcast",
        "light rain",
        "thunderstorms",
        "foggy",
    ];

    let temperature = (hash % 35) as i32 - 2;
    (temperature, conditions[(hash as usize / 7) % conditions.len()])
}
