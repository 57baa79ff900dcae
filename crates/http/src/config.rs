use std::fmt::Debug;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_API_PREFIX: &str = "/api/v1";

/// Builder for [`ApiConfig`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ApiConfigBuilder {
    token: String,
    base_url: Option<String>,
    api_prefix: Option<String>,
}

impl ApiConfigBuilder {
    /// Creates a builder with the given bearer token.
    #[inline]
    pub fn with_token<S: Into<String>>(token: S) -> Self {
        Self {
            token: token.into(),
            base_url: None,
            api_prefix: None,
        }
    }

    /// Sets the server address, e.g. `https://api.example.com`.
    #[inline]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the path prefix shared by every endpoint.
    #[inline]
    pub fn with_api_prefix<S: Into<String>>(mut self, api_prefix: S) -> Self {
        self.api_prefix = Some(api_prefix.into());
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> ApiConfig {
        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let api_prefix = self
            .api_prefix
            .unwrap_or_else(|| DEFAULT_API_PREFIX.to_string());
        ApiConfig {
            token: self.token,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_prefix: api_prefix.trim_end_matches('/').to_owned(),
        }
    }
}

impl Debug for ApiConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfigBuilder")
            .field("token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("api_prefix", &self.api_prefix)
            .finish()
    }
}

/// Configuration for the HTTP backend.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ApiConfig {
    pub(crate) token: String,
    pub(crate) base_url: String,
    pub(crate) api_prefix: String,
}

impl ApiConfig {
    /// Returns the absolute URL of an endpoint path such as `/sessions`.
    #[inline]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, self.api_prefix, path)
    }
}

impl Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("api_prefix", &self.api_prefix)
            .finish()
    }
}
