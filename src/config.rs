use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Connection state for the portal backend. Credentials themselves are managed
/// by the login flow elsewhere; this layer only stores and forwards the token.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PortalConfig {
    pub base_url: String,
    pub token: Option<String>,
    /// Counselor account id, used to tell own messages from peer messages.
    pub self_user_id: String,
}

impl PortalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // TOML config is preferred, but a JSON fallback from older builds is
    // converted on load where possible.
    fn toml_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("guidance-inbox.toml"))
    }

    fn legacy_json_path() -> Option<PathBuf> {
        let proj = directories::ProjectDirs::from("com", "example", "GuidanceInbox")?;
        Some(proj.config_dir().join("state.json"))
    }

    pub fn load() -> Self {
        if let Some(path) = Self::toml_path() {
            if let Ok(bytes) = fs::read(&path) {
                if let Ok(text) = String::from_utf8(bytes) {
                    if let Ok(config) = toml::from_str::<PortalConfig>(&text) {
                        return config;
                    }
                }
            }
        }

        if let Some(legacy) = Self::legacy_json_path() {
            if let Ok(bytes) = fs::read(&legacy) {
                if let Ok(config) = serde_json::from_slice::<PortalConfig>(&bytes) {
                    let _ = config.save();
                    return config;
                }
            }
        }

        Self::new()
    }

    pub fn save(&self) -> std::io::Result<()> {
        if let Some(path) = Self::toml_path() {
            if let Some(parent) = path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            let toml = toml::to_string_pretty(self)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
            fs::write(path, toml)
        } else {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "No config dir"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_round_trip() {
        let config = PortalConfig {
            base_url: "https://portal.example.edu".into(),
            token: Some("abc123".into()),
            self_user_id: "9".into(),
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let back: PortalConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.base_url, config.base_url);
        assert_eq!(back.token, config.token);
        assert_eq!(back.self_user_id, config.self_user_id);
    }

    #[test]
    fn legacy_json_still_parses() {
        let json = r#"{"base_url":"https://portal.example.edu","token":null,"self_user_id":"9"}"#;
        let config: PortalConfig = serde_json::from_str(json).unwrap();
        assert!(config.token.is_none());
        assert_eq!(config.self_user_id, "9");
    }
}
