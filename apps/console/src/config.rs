use std::{collections::HashMap, fs};

#[derive(Debug)]
pub struct Settings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub email: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:54321".into(),
            api_key: None,
            email: None,
        }
    }
}

/// Defaults, then `console.toml`, then environment variables on top.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("console.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("base_url") {
                settings.base_url = v.clone();
            }
            if let Some(v) = file_cfg.get("api_key") {
                settings.api_key = Some(v.clone());
            }
            if let Some(v) = file_cfg.get("email") {
                settings.email = Some(v.clone());
            }
        }
    }

    if let Ok(v) = std::env::var("LEAD_DESK_BASE_URL") {
        settings.base_url = v;
    }
    if let Ok(v) = std::env::var("LEAD_DESK_API_KEY") {
        settings.api_key = Some(v);
    }
    if let Ok(v) = std::env::var("LEAD_DESK_EMAIL") {
        settings.email = Some(v);
    }

    settings
}
