//! Client configuration, read from the environment.
//!
//! | variable | default |
//! |---|---|
//! | `INWORLD_API_KEY` / `INWORLD_API_SECRET` | none |
//! | `INWORLD_CUSTOM_TOKEN` | none (JSON token, skips key/secret) |
//! | `INWORLD_WORKSPACE` | empty |
//! | `INWORLD_SCENE` | none |
//! | `INWORLD_WEB_HOST` | `api-engine.inworld.ai` |
//! | `INWORLD_RUNTIME_HOST` | `api-engine.inworld.ai` |
//! | `INWORLD_PLAYER_NAME` | `player` |
//! | `INWORLD_PLAYER_ID` | empty |
//! | `INWORLD_HISTORY_SIZE` | 20 |
//! | `INWORLD_FLUSH_INTERVAL_MS` | 100 |
//! | `INWORLD_SHUTDOWN_GRACE_MS` | 2000 |

use std::time::Duration;

use inworld_domain::HistoryConfig;
use inworld_shared::{Capabilities, ClientInfo, UserRequest};
use url::Url;

pub const DEFAULT_WEB_HOST: &str = "api-engine.inworld.ai";
pub const DEFAULT_RUNTIME_HOST: &str = "api-engine.inworld.ai";
pub const DEFAULT_PLAYER_NAME: &str = "player";
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 100;
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2_000;

const TOKEN_PATH: &str = "v1/sessionTokens/token:generate";
const SESSION_PATH: &str = "v1/session/default";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// Pre-issued token JSON; when set no token request is made
    pub custom_token: Option<String>,
    pub workspace: String,
    pub scene: Option<String>,
    pub web_host: String,
    /// Host name mixed into the request signature
    pub runtime_host: String,
    pub player_name: String,
    pub player_id: String,
    pub history_size: usize,
    pub flush_interval: Duration,
    pub shutdown_grace: Duration,
    pub capabilities: Capabilities,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            custom_token: None,
            workspace: String::new(),
            scene: None,
            web_host: DEFAULT_WEB_HOST.to_string(),
            runtime_host: DEFAULT_RUNTIME_HOST.to_string(),
            player_name: DEFAULT_PLAYER_NAME.to_string(),
            player_id: String::new(),
            history_size: HistoryConfig::DEFAULT_HISTORY_SIZE,
            flush_interval: Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS),
            shutdown_grace: Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS),
            capabilities: Capabilities::default(),
        }
    }
}

impl ClientConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let millis = |key: &str, fallback: Duration| {
            get(key)
                .and_then(|value| value.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(fallback)
        };

        Self {
            api_key: get("INWORLD_API_KEY"),
            api_secret: get("INWORLD_API_SECRET"),
            custom_token: get("INWORLD_CUSTOM_TOKEN"),
            workspace: get("INWORLD_WORKSPACE").unwrap_or_default(),
            scene: get("INWORLD_SCENE"),
            web_host: get("INWORLD_WEB_HOST").unwrap_or(defaults.web_host),
            runtime_host: get("INWORLD_RUNTIME_HOST").unwrap_or(defaults.runtime_host),
            player_name: get("INWORLD_PLAYER_NAME").unwrap_or(defaults.player_name),
            player_id: get("INWORLD_PLAYER_ID").unwrap_or_default(),
            history_size: get("INWORLD_HISTORY_SIZE")
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.history_size),
            flush_interval: millis("INWORLD_FLUSH_INTERVAL_MS", defaults.flush_interval),
            shutdown_grace: millis("INWORLD_SHUTDOWN_GRACE_MS", defaults.shutdown_grace),
            capabilities: defaults.capabilities,
        }
    }

    pub fn history_config(&self) -> HistoryConfig {
        HistoryConfig::with_history_size(self.history_size)
    }

    pub fn token_url(&self) -> String {
        format!("https://{}/{}", self.web_host, TOKEN_PATH)
    }

    /// `scene` is a full resource name such as `workspaces/w/scenes/s`.
    pub fn load_scene_url(&self, scene: &str) -> String {
        format!("https://{}/v1/{}:load", self.web_host, scene)
    }

    pub fn session_url(&self, session_id: &str) -> Result<Url, url::ParseError> {
        Url::parse_with_params(
            &format!("wss://{}/{}", self.web_host, SESSION_PATH),
            &[("session_id", session_id)],
        )
    }

    pub fn client_info(&self) -> ClientInfo {
        ClientInfo {
            id: "rust".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn user(&self) -> UserRequest {
        UserRequest {
            name: self.player_name.clone(),
            id: self.player_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = ClientConfig::from_lookup(lookup(&[]));
        assert_eq!(config.web_host, DEFAULT_WEB_HOST);
        assert_eq!(config.history_size, 20);
        assert_eq!(config.flush_interval, Duration::from_millis(100));
        assert_eq!(config.shutdown_grace, Duration::from_secs(2));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn reads_overrides_and_ignores_blank_or_invalid() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("INWORLD_API_KEY", "key"),
            ("INWORLD_API_SECRET", "  "),
            ("INWORLD_HISTORY_SIZE", "5"),
            ("INWORLD_FLUSH_INTERVAL_MS", "not-a-number"),
            ("INWORLD_WEB_HOST", "example.test"),
        ]));
        assert_eq!(config.api_key.as_deref(), Some("key"));
        assert!(config.api_secret.is_none());
        assert_eq!(config.history_size, 5);
        assert_eq!(config.flush_interval, Duration::from_millis(100));
        assert_eq!(config.token_url(), "https://example.test/v1/sessionTokens/token:generate");
    }

    #[test]
    fn builds_service_urls() {
        let config = ClientConfig::default();
        assert_eq!(
            config.load_scene_url("workspaces/w/scenes/s"),
            "https://api-engine.inworld.ai/v1/workspaces/w/scenes/s:load"
        );
        let url = config.session_url("abc 1").expect("valid url");
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/v1/session/default");
        assert_eq!(url.query(), Some("session_id=abc+1"));
    }
}
