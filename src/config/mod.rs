//! Configuration types: built-in compression methods and service settings.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compression::{
    DecompressionStrategy, LzStringStrategy, MethodRegistry, NoCompression,
};
use crate::error::{ConvertError, Result};

/// Environment variable holding the bearer secret.
pub const ACCESS_TOKEN_ENV_KEY: &str = "ACCESS_TOKEN";

/// Built-in compression methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodId {
    /// Identity, for payloads that were only base64-wrapped.
    #[serde(rename = "none")]
    None,
    /// LZ-string over the base64 alphabet.
    #[serde(rename = "lz")]
    Lz,
    /// LZ-string over the URI-safe alphabet.
    #[serde(rename = "lz-uri")]
    LzUri,
}

impl MethodId {
    /// All built-in methods.
    pub const ALL: [MethodId; 3] = [MethodId::None, MethodId::Lz, MethodId::LzUri];

    /// Identifier used in requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodId::None => "none",
            MethodId::Lz => "lz",
            MethodId::LzUri => "lz-uri",
        }
    }

    /// Instantiate the strategy implementing this method.
    pub fn strategy(&self) -> Arc<dyn DecompressionStrategy> {
        match self {
            MethodId::None => Arc::new(NoCompression),
            MethodId::Lz => Arc::new(LzStringStrategy::base64()),
            MethodId::LzUri => Arc::new(LzStringStrategy::uri_component()),
        }
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MethodId {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        MethodId::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ConvertError::UnsupportedMethod(s.to_string()))
    }
}

/// Shape of a successful service response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// `{"image": ..., "attributes": {...}}`
    #[default]
    Full,
    /// `{"data": ...}`
    ImageOnly,
}

/// Process-wide service configuration, loaded once at start-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Bearer secret expected from callers.
    pub access_token: Option<String>,
    /// Response body shape.
    pub response_format: ResponseFormat,
    /// Compression methods to register.
    pub methods: Vec<MethodId>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            response_format: ResponseFormat::Full,
            methods: MethodId::ALL.to_vec(),
        }
    }
}

impl ServiceConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ServiceConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        log::debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&text)
    }

    /// Override the access token from the `ACCESS_TOKEN` environment variable.
    pub fn apply_env(self) -> Self {
        self.with_token_override(std::env::var(ACCESS_TOKEN_ENV_KEY).ok())
    }

    /// Override the access token if `token` is a non-empty value.
    pub fn with_token_override(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.access_token = Some(token);
        }
        self
    }

    /// Configured token, with empty strings treated as unset.
    pub fn token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Build the method registry described by this configuration.
    pub fn registry(&self) -> MethodRegistry {
        MethodRegistry::with_methods(&self.methods)
    }

    fn validate(&self) -> Result<()> {
        if self.methods.is_empty() {
            return Err(ConvertError::Config(
                "at least one compression method must be enabled".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_id_parsing() {
        assert_eq!("lz".parse::<MethodId>().unwrap(), MethodId::Lz);
        assert_eq!("none".parse::<MethodId>().unwrap(), MethodId::None);
        assert_eq!("lz-uri".parse::<MethodId>().unwrap(), MethodId::LzUri);
        assert!(matches!(
            "gzip".parse::<MethodId>(),
            Err(ConvertError::UnsupportedMethod(m)) if m == "gzip"
        ));
        assert_eq!(MethodId::LzUri.to_string(), "lz-uri");
    }

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert!(config.token().is_none());
        assert_eq!(config.response_format, ResponseFormat::Full);
        assert_eq!(config.registry().names(), vec!["lz", "lz-uri", "none"]);
    }

    #[test]
    fn test_toml_config() {
        let config = ServiceConfig::from_toml_str(
            r#"
            access_token = "secret"
            response_format = "image_only"
            methods = ["lz", "none"]
            "#,
        )
        .unwrap();
        assert_eq!(config.token(), Some("secret"));
        assert_eq!(config.response_format, ResponseFormat::ImageOnly);
        assert_eq!(config.registry().names(), vec!["lz", "none"]);
    }

    #[test]
    fn test_toml_config_rejects_bad_values() {
        assert!(matches!(
            ServiceConfig::from_toml_str("methods = []"),
            Err(ConvertError::Config(_))
        ));
        assert!(matches!(
            ServiceConfig::from_toml_str("methods = [\"brotli\"]"),
            Err(ConvertError::Config(_))
        ));
    }

    #[test]
    fn test_token_override() {
        let config = ServiceConfig::default().with_token_override(Some("abc".into()));
        assert_eq!(config.token(), Some("abc"));

        let config = config.with_token_override(Some(String::new()));
        assert_eq!(config.token(), Some("abc"));

        let config = ServiceConfig {
            access_token: Some(String::new()),
            ..Default::default()
        };
        assert!(config.token().is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.toml");
        std::fs::write(&path, "access_token = \"from-file\"\n").unwrap();

        let config = ServiceConfig::load(&path).unwrap();
        assert_eq!(config.token(), Some("from-file"));
        assert_eq!(config.methods, MethodId::ALL.to_vec());

        assert!(matches!(
            ServiceConfig::load(dir.path().join("missing.toml")),
            Err(ConvertError::Io(_))
        ));
    }
}
