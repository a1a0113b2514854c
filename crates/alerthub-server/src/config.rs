use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Fixed UTC offset in hours used for rendered timestamps and
    /// exclude-window evaluation.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            database: DatabaseConfig::default(),
            utc_offset_hours: default_utc_offset_hours(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_http_port() -> u16 {
    8080
}

fn default_database_url() -> String {
    "sqlite://data/alerthub.db?mode=rwc".to_string()
}

fn default_utc_offset_hours() -> i32 {
    8
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_config() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.utc_offset_hours, 8);
        assert!(config.database.url.starts_with("sqlite://"));
    }

    #[test]
    fn partial_config_overrides() {
        let config: ServerConfig = toml::from_str(
            "http_port = 9000\nutc_offset_hours = 0\n\n[database]\nurl = \"sqlite::memory:\"\n",
        )
        .unwrap();
        assert_eq!(config.http_port, 9000);
        assert_eq!(config.utc_offset_hours, 0);
        assert_eq!(config.database.url, "sqlite::memory:");
    }
}
