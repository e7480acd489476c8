// ABOUTME: Weather tool backed by the Open-Meteo current-conditions endpoint
// ABOUTME: Takes coordinates from the model, returns raw current weather JSON
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

use super::{required_f64, ChatTool, ToolContext};
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";

const FETCH_TIMEOUT_SECS: u64 = 10;

/// Current-conditions lookup by coordinates
pub struct WeatherTool {
    client: Client,
}

impl WeatherTool {
    /// Create the tool with its own short-timeout client
    #[must_use]
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for WeatherTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatTool for WeatherTool {
    fn name(&self) -> &'static str {
        "get_weather"
    }

    fn description(&self) -> &'static str {
        "Get the current weather at a location given its coordinates"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "latitude": { "type": "number" },
                "longitude": { "type": "number" }
            },
            "required": ["latitude", "longitude"]
        })
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> AppResult<Value> {
        let latitude = required_f64(args, "latitude")?;
        let longitude = required_f64(args, "longitude")?;

        let response = self
            .client
            .get(OPEN_METEO_URL)
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("current", "temperature_2m,weathercode,windspeed_10m".to_owned()),
                ("timezone", "auto".to_owned()),
            ])
            .send()
            .await
            .map_err(|e| AppError::external_service("Weather", format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::external_service(
                "Weather",
                format!("Endpoint returned {status}"),
            ));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| AppError::external_service("Weather", format!("Invalid response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_requires_coordinates() {
        let tool = WeatherTool::new();
        let schema = tool.parameters();
        assert_eq!(schema["required"][0], "latitude");
        assert_eq!(schema["required"][1], "longitude");
    }

    #[test]
    fn missing_argument_is_reported() {
        let err = required_f64(&json!({ "latitude": 45.0 }), "longitude").unwrap_err();
        assert!(err.message.contains("longitude"));
    }
}
