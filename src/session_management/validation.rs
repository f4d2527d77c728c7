//! Source address policy.
//!
//! The address is the only client-supplied value that reaches the transcoder command line,
//! so it is checked before any session state is created.

use crate::configuration::StreamsConfig;
use crate::error_handling::types::ValidationError;
use url::Url;

const FORBIDDEN_CHARS: &[char] = &[
    ';', '|', '&', '$', '`', '<', '>', '\\', '"', '\'', '(', ')', '{', '}', '*', '!',
];

#[derive(Debug, Clone)]
pub struct SourcePolicy {
    pub allowed_schemes: Vec<String>,
    pub max_length: usize,
}

impl SourcePolicy {
    pub fn from_config(config: &StreamsConfig) -> Self {
        Self {
            allowed_schemes: config
                .allowed_schemes
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
            max_length: config.max_url_length,
        }
    }
}

impl Default for SourcePolicy {
    fn default() -> Self {
        Self::from_config(&StreamsConfig::default())
    }
}

/// Checks `address` against `policy` and returns the parsed locator.
pub fn validate_source(address: &str, policy: &SourcePolicy) -> Result<Url, ValidationError> {
    if address.trim().is_empty() {
        return Err(ValidationError::new("URL is required"));
    }
    if address.len() > policy.max_length {
        return Err(ValidationError::new(format!(
            "URL exceeds maximum length of {} characters",
            policy.max_length
        )));
    }
    if address.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::new(
            "URL contains whitespace or control characters",
        ));
    }
    if let Some(c) = address.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(ValidationError::new(format!(
            "URL contains forbidden character '{}'",
            c
        )));
    }
    if address.contains("..") {
        return Err(ValidationError::new(
            "URL contains a path traversal sequence",
        ));
    }

    let url = Url::parse(address).map_err(|_| ValidationError::new("URL is not well-formed"))?;

    if !policy.allowed_schemes.iter().any(|s| s == url.scheme()) {
        return Err(ValidationError::new(format!(
            "scheme '{}' is not allowed (expected one of: {})",
            url.scheme(),
            policy.allowed_schemes.join(", ")
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ValidationError::new("URL must include a hostname"));
    }

    Ok(url)
}

/// Replaces user-info in `address` with `***` for display.
pub fn mask_credentials(address: &str) -> String {
    let mut url = match Url::parse(address) {
        Ok(url) => url,
        Err(_) => return address.to_string(),
    };
    if url.username().is_empty() && url.password().is_none() {
        return address.to_string();
    }
    if url.set_username("***").is_err() || url.set_password(None).is_err() {
        return address.to_string();
    }
    url.to_string()
}
