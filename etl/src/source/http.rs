use config::shared::ApiConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::bail;
use crate::error::{EtlResult, classify_status};
use crate::source::{PageRequest, PageSource};

/// Page source backed by the XML REST API over HTTPS with basic authentication.
///
/// Clones share the underlying connection pool of the [`Client`].
#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: Client,
    base_url: String,
    username: String,
    password: SecretString,
}

impl HttpPageSource {
    pub fn new(config: &ApiConfig) -> EtlResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self::with_client(client, config))
    }

    /// Creates a source that sends its requests through an existing client.
    pub fn with_client(client: Client, config: &ApiConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }
}

impl PageSource for HttpPageSource {
    async fn fetch_page(&self, request: &PageRequest) -> EtlResult<String> {
        let url = self.endpoint_url(&request.endpoint);

        debug!(endpoint = %request.endpoint, page = request.page, "requesting page");

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .query(&request.query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            bail!(
                classify_status(status.as_u16()),
                "API returned an error status",
                format!(
                    "status {status} for endpoint {} page {}",
                    request.endpoint, request.page
                )
            );
        }

        let body = response.text().await?;

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use config::shared::RetryConfig;

    use super::*;

    fn config(base_url: &str) -> ApiConfig {
        ApiConfig {
            base_url: base_url.to_string(),
            username: "user".to_string(),
            password: SecretString::new("secret".to_string()),
            request_timeout_secs: 5,
            probe_retry: RetryConfig::default(),
        }
    }

    #[test]
    fn endpoint_url_joins_without_double_slash() {
        let source = HttpPageSource::new(&config("https://example.com/api/")).unwrap();

        assert_eq!(
            source.endpoint_url("messages"),
            "https://example.com/api/messages"
        );
        assert_eq!(
            source.endpoint_url("/campaigns"),
            "https://example.com/api/campaigns"
        );
    }
}
