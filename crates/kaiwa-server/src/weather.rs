//! OpenWeatherMap-backed implementation of the pipeline's weather lookup.

use async_trait::async_trait;
use kaiwa_llm::{format_messages, ChatClient, ChatRequest};
use kaiwa_pipeline::WeatherProvider;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

const GATE_SYSTEM: &str = "\
You decide whether a message to an aquaculture assistant involves the weather.

Weather-related (answer yes): direct weather questions, or farm operations that depend \
on conditions, like whether today suits feeding or how to adjust feeding for the heat.
Not weather-related (answer no): plain device commands, data lookups, small talk.

Answer with exactly 'yes' or 'no'.";

const CITY_SYSTEM: &str = "\
Extract the Japanese city a message refers to and reply with its English name only. \
If no city is mentioned, reply with exactly 'default'.";

/// Looks up current conditions when the turn calls for them.
///
/// Both the need-weather gate and city extraction are LLM judgments; any
/// failure along the way simply yields no weather context.
pub struct OpenWeatherProvider {
    http_client: reqwest::Client,
    llm: Arc<dyn ChatClient>,
    model: String,
    api_key: String,
    base_url: String,
    default_location: String,
}

impl OpenWeatherProvider {
    pub fn new(
        llm: Arc<dyn ChatClient>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        default_location: impl Into<String>,
    ) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            llm,
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            default_location: default_location.into(),
        }
    }

    async fn ask(&self, system: &str, user: &str) -> Option<String> {
        let request = ChatRequest::new(self.model.as_str(), format_messages(system, &[], user))
            .temperature(0.0)
            .max_tokens(16);
        match self.llm.chat(request).await {
            Ok(response) => Some(response.content.trim().to_string()),
            Err(error) => {
                tracing::warn!(%error, "weather gate call failed");
                None
            }
        }
    }

    async fn needs_weather(&self, query: &str) -> bool {
        matches!(self.ask(GATE_SYSTEM, query).await.as_deref(), Some(answer) if answer.eq_ignore_ascii_case("yes"))
    }

    async fn extract_city(&self, query: &str) -> String {
        match self.ask(CITY_SYSTEM, query).await {
            Some(city)
                if !city.is_empty()
                    && !city.eq_ignore_ascii_case("default")
                    && city.len() < 64 =>
            {
                city
            }
            _ => self.default_location.clone(),
        }
    }

    async fn fetch(&self, city: &str) -> Result<WeatherResponse, reqwest::Error> {
        self.http_client
            .get(&self.base_url)
            .query(&[("q", city), ("appid", self.api_key.as_str()), ("units", "metric")])
            .timeout(LOOKUP_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn lookup(&self, query: &str) -> Option<String> {
        if self.api_key.is_empty() || !self.needs_weather(query).await {
            return None;
        }

        let city = self.extract_city(query).await;
        match self.fetch(&city).await {
            Ok(report) => {
                let block = report.context_block(&city);
                tracing::info!(%city, "weather context attached");
                Some(block)
            }
            Err(error) => {
                tracing::warn!(%city, %error, "weather lookup failed");
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    #[serde(default)]
    weather: Vec<WeatherCondition>,
    main: WeatherMain,
    #[serde(default)]
    wind: Option<WeatherWind>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WeatherCondition {
    description: String,
}

#[derive(Debug, Deserialize)]
struct WeatherMain {
    temp: f64,
    #[serde(default)]
    humidity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WeatherWind {
    speed: f64,
}

impl WeatherResponse {
    fn context_block(&self, requested_city: &str) -> String {
        let place = self.name.as_deref().unwrap_or(requested_city);
        let description = self
            .weather
            .first()
            .map(|w| w.description.as_str())
            .unwrap_or("unknown conditions");

        let mut block = format!(
            "Current weather in {place}: {description}, {:.1} C",
            self.main.temp
        );
        if let Some(humidity) = self.main.humidity {
            block.push_str(&format!(", humidity {humidity:.0}%"));
        }
        if let Some(wind) = &self.wind {
            block.push_str(&format!(", wind {:.1} m/s", wind.speed));
        }
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_block_reads_naturally() {
        let report = WeatherResponse {
            weather: vec![WeatherCondition {
                description: "light rain".to_string(),
            }],
            main: WeatherMain {
                temp: 18.34,
                humidity: Some(82.0),
            },
            wind: Some(WeatherWind { speed: 3.2 }),
            name: Some("Tsukuba".to_string()),
        };
        assert_eq!(
            report.context_block("Tsukuba"),
            "Current weather in Tsukuba: light rain, 18.3 C, humidity 82%, wind 3.2 m/s"
        );
    }

    #[test]
    fn context_block_survives_missing_fields() {
        let report = WeatherResponse {
            weather: vec![],
            main: WeatherMain {
                temp: 25.0,
                humidity: None,
            },
            wind: None,
            name: None,
        };
        assert_eq!(
            report.context_block("Osaka"),
            "Current weather in Osaka: unknown conditions, 25.0 C"
        );
    }
}
