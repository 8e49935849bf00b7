use std::{collections::HashMap, fs};

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub static_dir: String,
    pub jwt_secret: String,
    pub token_ttl_seconds: i64,
    pub seed_demo: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/bookedup.db".into(),
            static_dir: "./web/dist".into(),
            jwt_secret: "dev-secret".into(),
            token_ttl_seconds: 86_400,
            seed_demo: true,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("server.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("bind_addr") {
                settings.server_bind = v.clone();
            }
            if let Some(v) = file_cfg.get("database_url") {
                settings.database_url = v.clone();
            }
            if let Some(v) = file_cfg.get("static_dir") {
                settings.static_dir = v.clone();
            }
            if let Some(v) = file_cfg.get("jwt_secret") {
                settings.jwt_secret = v.clone();
            }
            if let Some(v) = file_cfg.get("token_ttl_seconds") {
                if let Ok(parsed) = v.parse::<i64>() {
                    settings.token_ttl_seconds = parsed;
                }
            }
            if let Some(v) = file_cfg.get("seed_demo") {
                if let Ok(parsed) = v.parse::<bool>() {
                    settings.seed_demo = parsed;
                }
            }
        }
    }

    if let Ok(v) = std::env::var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Ok(v) = std::env::var("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Ok(v) = std::env::var("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Ok(v) = std::env::var("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Ok(v) = std::env::var("STATIC_DIR") {
        settings.static_dir = v;
    }
    if let Ok(v) = std::env::var("APP__STATIC_DIR") {
        settings.static_dir = v;
    }

    if let Ok(v) = std::env::var("JWT_SECRET") {
        settings.jwt_secret = v;
    }
    if let Ok(v) = std::env::var("APP__JWT_SECRET") {
        settings.jwt_secret = v;
    }

    if let Ok(v) = std::env::var("APP__TOKEN_TTL_SECONDS") {
        if let Ok(parsed) = v.parse::<i64>() {
            settings.token_ttl_seconds = parsed;
        }
    }

    if let Ok(v) = std::env::var("APP__SEED_DEMO") {
        if let Ok(parsed) = v.parse::<bool>() {
            settings.seed_demo = parsed;
        }
    }

    settings
}

/// Accepts plain file paths and bare `sqlite:` prefixes so operators can
/// point `database_url` at a file without remembering the exact scheme.
pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}
