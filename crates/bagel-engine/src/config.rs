use std::env;

pub const BASE_URL_ENV: &str = "BAGEL_URL";
pub const DEFAULT_BASE_URL: &str = "http://localhost:7865";
pub const DEFAULT_API_PREFIX: &str = "/gradio_api";

/// Endpoint configuration, fixed once the client is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BagelConfig {
    base_url: String,
    api_prefix: String,
}

impl Default for BagelConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl BagelConfig {
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self {
            base_url: normalize_base(base_url.as_ref()),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
        }
    }

    /// Reads `BAGEL_URL` once; unset or blank falls back to the loopback default.
    pub fn from_env() -> Self {
        non_empty_env(BASE_URL_ENV)
            .map(Self::new)
            .unwrap_or_default()
    }

    pub fn with_api_prefix(mut self, prefix: impl AsRef<str>) -> Self {
        let trimmed = prefix.as_ref().trim().trim_matches('/');
        self.api_prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        };
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    pub fn queue_join_url(&self) -> String {
        self.endpoint("queue/join")
    }

    pub fn queue_data_url(&self) -> String {
        self.endpoint("queue/data")
    }

    pub fn upload_url(&self) -> String {
        self.endpoint("upload")
    }

    pub fn upload_progress_url(&self) -> String {
        self.endpoint("upload_progress")
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}/{}", self.base_url, self.api_prefix, path)
    }
}

fn normalize_base(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        DEFAULT_BASE_URL.to_string()
    } else {
        trimmed.to_string()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
