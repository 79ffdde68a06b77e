use std::path::Path;

use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub responder: ResponderConfig,
    #[serde(default)]
    pub sheets: SheetsConfig,
    #[serde(default)]
    pub quotes: QuotesConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Remote intent-classification endpoint (Gemini generateContent).
#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    /// Empty key disables the remote path entirely; classification runs
    /// on the local pattern list.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_classifier_base_url")]
    pub base_url: String,
    #[serde(default = "default_classifier_model")]
    pub model: String,
    #[serde(default = "default_classifier_timeout_secs")]
    pub timeout_secs: u64,
    /// Freshness window for the classification cache.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_classifier_base_url(),
            model: default_classifier_model(),
            timeout_secs: default_classifier_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_classifier_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_classifier_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_classifier_timeout_secs() -> u64 {
    15
}
fn default_cache_ttl_secs() -> u64 {
    300
}

/// Free-conversation responder (OpenAI-compatible chat completions).
#[derive(Debug, Deserialize, Clone)]
pub struct ResponderConfig {
    /// Empty key switches the responder to canned offline replies.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_responder_base_url")]
    pub base_url: String,
    #[serde(default = "default_responder_model")]
    pub model: String,
    /// How many history turns accompany each completion request.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_responder_base_url(),
            model: default_responder_model(),
            max_history: default_max_history(),
        }
    }
}

fn default_responder_base_url() -> String {
    "https://open.bigmodel.cn/api/paas/v4".to_string()
}
fn default_responder_model() -> String {
    "glm-4".to_string()
}
fn default_max_history() -> usize {
    20
}

/// Google Sheets v4 REST access.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SheetsConfig {
    /// OAuth bearer token with the spreadsheets scope. Empty means the
    /// spreadsheet actions answer with a needs-auth payload.
    #[serde(default)]
    pub access_token: String,
}

/// External quote-builder site (Local Orçamentos).
#[derive(Debug, Deserialize, Clone)]
pub struct QuotesConfig {
    #[serde(default = "default_quotes_base_url")]
    pub base_url: String,
}

impl Default for QuotesConfig {
    fn default() -> Self {
        Self {
            base_url: default_quotes_base_url(),
        }
    }
}

fn default_quotes_base_url() -> String {
    "https://local-orcamentos.vercel.app".to_string()
}

/// Email hub (web-only interface; queries are answered with instructions).
#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    #[serde(default = "default_email_hub_url")]
    pub hub_url: String,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            hub_url: default_email_hub_url(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_email_hub_url() -> String {
    "https://jace.ai".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> String {
    "doceai-db.json".to_string()
}

impl AppConfig {
    /// Load config.toml if present, otherwise start from defaults. Secrets
    /// left empty in the file are filled from the environment so keys never
    /// have to live on disk.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw)?
        } else {
            warn!(path = %path.display(), "No config file found, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if self.classifier.api_key.is_empty() {
            if let Ok(key) = std::env::var("GEMINI_API_KEY") {
                self.classifier.api_key = key;
            }
        }
        if self.responder.api_key.is_empty() {
            if let Ok(key) = std::env::var("GLM_API_KEY") {
                self.responder.api_key = key;
            }
        }
        if self.sheets.access_token.is_empty() {
            if let Ok(token) = std::env::var("SHEETS_ACCESS_TOKEN") {
                self.sheets.access_token = token;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_reference_endpoints() {
        let config = AppConfig::default();
        assert!(config.classifier.api_key.is_empty());
        assert!(config.classifier.base_url.contains("generativelanguage"));
        assert_eq!(config.classifier.cache_ttl_secs, 300);
        assert_eq!(config.responder.max_history, 20);
        assert_eq!(config.store.path, "doceai-db.json");
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [classifier]
            model = "gemini-2.0-flash"

            [store]
            path = "/tmp/test-db.json"
            "#,
        )
        .unwrap();
        assert_eq!(config.classifier.model, "gemini-2.0-flash");
        assert_eq!(config.classifier.timeout_secs, 15);
        assert_eq!(config.store.path, "/tmp/test-db.json");
        assert_eq!(config.email.hub_url, "https://jace.ai");
    }
}
