use std::{fs, str::FromStr};

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Google,
    Sqlite,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "google" | "sheets" => Ok(StoreBackend::Google),
            "sqlite" | "local" => Ok(StoreBackend::Sqlite),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_bind: String,
    pub store_backend: StoreBackend,
    pub database_url: String,
    pub spreadsheet_id: Option<String>,
    pub service_account_email: Option<String>,
    pub private_key: Option<String>,
    pub token_uri: Option<String>,
    pub sheets_base_url: String,
    pub pipeline_sheet: String,
    pub meetings_sheet: String,
    pub firms_sheet: String,
    pub summary_api_key: Option<String>,
    pub summary_endpoint: String,
    pub summary_model: String,
    pub summary_timeout_secs: u64,
    pub max_body_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            store_backend: StoreBackend::Sqlite,
            database_url: "sqlite://./data/deal_desk.db".into(),
            spreadsheet_id: None,
            service_account_email: None,
            private_key: None,
            token_uri: None,
            sheets_base_url: sheets::google::DEFAULT_SHEETS_BASE_URL.into(),
            pipeline_sheet: storage::deals::PIPELINE_SHEET.into(),
            meetings_sheet: storage::readers::MEETINGS_SHEET.into(),
            firms_sheet: storage::readers::FIRMS_SHEET.into(),
            summary_api_key: None,
            summary_endpoint: server_api::summary::DEFAULT_SUMMARY_ENDPOINT.into(),
            summary_model: server_api::summary::DEFAULT_SUMMARY_MODEL.into(),
            summary_timeout_secs: 20,
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Conventional environment names. Every key can also be set through
/// `APP__<KEY>`, which is applied last.
const ENV_ALIASES: &[(&str, &str)] = &[
    ("SERVER_BIND", "bind_addr"),
    ("STORE_BACKEND", "store_backend"),
    ("DATABASE_URL", "database_url"),
    ("GOOGLE_SPREADSHEET_ID", "spreadsheet_id"),
    ("GOOGLE_SERVICE_ACCOUNT_EMAIL", "service_account_email"),
    ("GOOGLE_PRIVATE_KEY", "private_key"),
    ("GOOGLE_TOKEN_URI", "token_uri"),
    ("SHEETS_BASE_URL", "sheets_base_url"),
    ("OPENAI_API_KEY", "summary_api_key"),
    ("SUMMARY_API_KEY", "summary_api_key"),
    ("SUMMARY_ENDPOINT", "summary_endpoint"),
    ("SUMMARY_MODEL", "summary_model"),
];

const KEYS: &[&str] = &[
    "bind_addr",
    "store_backend",
    "database_url",
    "spreadsheet_id",
    "service_account_email",
    "private_key",
    "token_uri",
    "sheets_base_url",
    "pipeline_sheet",
    "meetings_sheet",
    "firms_sheet",
    "summary_api_key",
    "summary_endpoint",
    "summary_model",
    "summary_timeout_secs",
    "max_body_bytes",
];

pub fn load_settings() -> Settings {
    let file = fs::read_to_string("server.toml").ok();
    settings_from(file.as_deref(), |name| std::env::var(name).ok())
}

/// Builds settings from an optional `server.toml` body and an environment
/// lookup. Later sources win: defaults, file, env aliases, `APP__*`.
pub fn settings_from(file: Option<&str>, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        match toml::from_str::<toml::Table>(raw) {
            Ok(table) => {
                for (key, value) in table {
                    let value = match value {
                        toml::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    apply(&mut settings, &key, value);
                }
            }
            Err(error) => warn!(%error, "config: ignoring unparsable server.toml"),
        }
    }

    for (name, key) in ENV_ALIASES {
        if let Some(value) = env(name) {
            apply(&mut settings, key, value);
        }
    }
    for key in KEYS {
        if let Some(value) = env(&format!("APP__{}", key.to_ascii_uppercase())) {
            apply(&mut settings, key, value);
        }
    }

    settings
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn apply(settings: &mut Settings, key: &str, value: String) {
    match key {
        "bind_addr" | "server_bind" => settings.server_bind = value,
        "store_backend" => match value.parse() {
            Ok(backend) => settings.store_backend = backend,
            Err(error) => warn!(%error, "config: keeping store backend"),
        },
        "database_url" => settings.database_url = value,
        "spreadsheet_id" => settings.spreadsheet_id = non_empty(value),
        "service_account_email" => settings.service_account_email = non_empty(value),
        // Keys pasted into env files usually carry literal "\n" sequences.
        "private_key" => settings.private_key = non_empty(value.replace("\\n", "\n")),
        "token_uri" => settings.token_uri = non_empty(value),
        "sheets_base_url" => settings.sheets_base_url = value,
        "pipeline_sheet" => settings.pipeline_sheet = value,
        "meetings_sheet" => settings.meetings_sheet = value,
        "firms_sheet" => settings.firms_sheet = value,
        "summary_api_key" => settings.summary_api_key = non_empty(value),
        "summary_endpoint" => settings.summary_endpoint = value,
        "summary_model" => settings.summary_model = value,
        "summary_timeout_secs" => match value.trim().parse() {
            Ok(secs) => settings.summary_timeout_secs = secs,
            Err(_) => warn!(%value, "config: summary_timeout_secs is not a number"),
        },
        "max_body_bytes" => match value.trim().parse() {
            Ok(bytes) => settings.max_body_bytes = bytes,
            Err(_) => warn!(%value, "config: max_body_bytes is not a number"),
        },
        other => warn!(key = other, "config: unknown setting ignored"),
    }
}

/// Turns a bare path or `sqlite:` path into a `sqlite://` url. Opening the
/// store creates missing parent directories.
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

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
