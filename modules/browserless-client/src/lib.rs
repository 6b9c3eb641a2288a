pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::Duration;

use serde::de::DeserializeOwned;

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        // No client-wide timeout: /function calls carry their own deadline,
        // which can legitimately run for minutes while a page scrolls.
        let client = reqwest::Client::builder()
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        let mut endpoint = format!("{}{}", self.base_url, path);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }
        endpoint
    }

    /// Fetch fully-rendered HTML content for a URL via the /content endpoint.
    pub async fn content(&self, url: &str, timeout: Duration) -> Result<String> {
        let body = serde_json::json!({ "url": url });

        let resp = self
            .client
            .post(self.endpoint("/content"))
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }

    /// Run a puppeteer script inside the Browserless instance via the
    /// /function endpoint and deserialize whatever the script returns.
    ///
    /// `code` must be an ES module exporting `default async ({ page, context })`;
    /// `context` is handed to the script verbatim. The `timeout` bounds the
    /// whole round trip and must exceed any deadline the script enforces itself.
    pub async fn function<T: DeserializeOwned>(
        &self,
        code: &str,
        context: serde_json::Value,
        timeout: Duration,
    ) -> Result<T> {
        let body = serde_json::json!({
            "code": code,
            "context": context,
        });

        let resp = self
            .client
            .post(self.endpoint("/function"))
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = resp.text().await?;
        tracing::debug!(bytes = text.len(), "Browserless function returned");
        Ok(serde_json::from_str(&text)?)
    }
}
