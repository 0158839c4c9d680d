use serde::Deserialize;
use time::{Date, OffsetDateTime};
use tracing::debug;

use crate::error::AppError;

/// Source of the weather tag stamped on new todos.
#[derive(Debug, Clone)]
pub enum WeatherClient {
    /// A JSON feed of `[{"date": "MM-DD", "weather": "..."}]` covering the year.
    Remote { http: reqwest::Client, url: String },
    Fixed(String),
}

#[derive(Debug, Deserialize)]
struct WeatherEntry {
    date: String,
    weather: String,
}

impl WeatherClient {
    pub fn remote(url: impl Into<String>) -> Self {
        WeatherClient::Remote {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn fixed(weather: impl Into<String>) -> Self {
        WeatherClient::Fixed(weather.into())
    }

    pub async fn today(&self) -> Result<String, AppError> {
        match self {
            WeatherClient::Fixed(weather) => Ok(weather.clone()),
            WeatherClient::Remote { http, url } => {
                let entries: Vec<WeatherEntry> = http
                    .get(url)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                let key = date_key(OffsetDateTime::now_utc().date());
                debug!(entries = entries.len(), %key, "Fetched weather feed");
                pick(&entries, &key)
            }
        }
    }
}

fn date_key(date: Date) -> String {
    format!("{:02}-{:02}", u8::from(date.month()), date.day())
}

fn pick(entries: &[WeatherEntry], key: &str) -> Result<String, AppError> {
    if entries.is_empty() {
        return Err(AppError::Upstream("Weather feed is empty".to_string()));
    }
    entries
        .iter()
        .find(|e| e.date == key)
        .map(|e| e.weather.clone())
        .ok_or_else(|| AppError::Upstream(format!("No weather data for {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};
    use serde_json::json;
    use time::macros::date;

    fn entry(date: &str, weather: &str) -> WeatherEntry {
        WeatherEntry {
            date: date.to_string(),
            weather: weather.to_string(),
        }
    }

    #[test]
    fn date_key_is_zero_padded_month_and_day() {
        assert_eq!(date_key(date!(2024 - 03 - 07)), "03-07");
        assert_eq!(date_key(date!(2024 - 12 - 25)), "12-25");
    }

    #[test]
    fn pick_finds_todays_entry() {
        let entries = vec![entry("01-01", "Snow"), entry("03-07", "Sunny")];
        assert_eq!(pick(&entries, "03-07").unwrap(), "Sunny");
        assert!(matches!(
            pick(&entries, "03-08").unwrap_err(),
            AppError::Upstream(_)
        ));
        assert!(matches!(pick(&[], "03-07").unwrap_err(), AppError::Upstream(_)));
    }

    #[tokio::test]
    async fn fixed_weather_is_returned_verbatim() {
        let client = WeatherClient::fixed("Cloudy");
        assert_eq!(client.today().await.unwrap(), "Cloudy");
    }

    #[tokio::test]
    async fn remote_feed_is_matched_against_today() {
        let key = date_key(OffsetDateTime::now_utc().date());
        let feed = json!([
            { "date": "02-30", "weather": "Impossible" },
            { "date": key, "weather": "Windy" },
        ]);
        let app = Router::new().route("/weather.json", get(move || async move { Json(feed) }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = WeatherClient::remote(format!("http://{addr}/weather.json"));
        assert_eq!(client.today().await.unwrap(), "Windy");
    }
}
