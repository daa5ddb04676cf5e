//! Configuration for the chat backend.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::chat::core::errors::{ChatError, ChatResult};

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Turn storage settings.
    pub store: StoreConfig,
    /// Hosted backend credentials.
    pub supabase: SupabaseConfig,
    /// Inference provider settings.
    pub inference: InferenceConfig,
    /// Authentication gate settings.
    pub auth: AuthConfig,
    /// HTTP server settings.
    pub server: ServerConfig,
    /// PDF export settings.
    pub export: ExportConfig,
}

impl ChatConfig {
    /// Build the default configuration overlaid with `PITCHCRAFT_*` environment variables.
    ///
    /// # Errors
    /// Returns an error if a variable holds an unparsable value.
    pub fn from_env() -> ChatResult<Self> {
        let mut config = Self::default();

        if let Some(backend) = env_var("PITCHCRAFT_STORE") {
            config.store.backend = backend.parse()?;
        }
        if let Some(path) = env_var("PITCHCRAFT_SQLITE_PATH") {
            config.store.sqlite_path = PathBuf::from(path);
        }
        if let Some(table) = env_var("PITCHCRAFT_TABLE") {
            config.store.table = table;
        }
        config.supabase.url = env_var("PITCHCRAFT_SUPABASE_URL").or(config.supabase.url);
        config.supabase.anon_key = env_var("PITCHCRAFT_SUPABASE_KEY").or(config.supabase.anon_key);

        if let Some(provider) = env_var("PITCHCRAFT_INFERENCE") {
            config.inference.provider = provider.parse()?;
            config.inference.model = config.inference.provider.default_model().to_string();
        }
        if let Some(model) = env_var("PITCHCRAFT_MODEL") {
            config.inference.model = model;
        }
        config.inference.base_url = env_var("PITCHCRAFT_INFERENCE_URL").or(config.inference.base_url);
        config.inference.api_key = env_var("GEMINI_API_KEY").or(config.inference.api_key);

        if let Some(backend) = env_var("PITCHCRAFT_AUTH") {
            config.auth.backend = backend.parse()?;
        }
        if let Some(port) = env_var("PITCHCRAFT_PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| ChatError::InvalidConfig(format!("invalid port: {port}")))?;
        }
        if let Some(dir) = env_var("PITCHCRAFT_STATIC_DIR") {
            config.server.static_dir = Some(PathBuf::from(dir));
        }

        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ChatResult<()> {
        let table = &self.store.table;
        match self.store.backend {
            StoreBackend::Sqlite if !is_sql_identifier(table) => {
                return Err(ChatError::InvalidConfig(format!(
                    "store.table must be a SQL identifier, got {table:?}"
                )));
            }
            StoreBackend::Supabase if !is_path_segment(table) => {
                return Err(ChatError::InvalidConfig(format!(
                    "store.table must be a single URL path segment, got {table:?}"
                )));
            }
            _ => {}
        }

        let needs_supabase = self.store.backend == StoreBackend::Supabase
            || self.auth.backend == AuthBackend::Supabase;
        if needs_supabase {
            let url = self.supabase.url.as_deref().ok_or_else(|| {
                ChatError::InvalidConfig("supabase.url is required".to_string())
            })?;
            Url::parse(url)?;
            if self.supabase.anon_key.as_deref().is_none_or(str::is_empty) {
                return Err(ChatError::InvalidConfig(
                    "supabase.anon_key is required".to_string(),
                ));
            }
        }

        if self.inference.model.trim().is_empty() {
            return Err(ChatError::InvalidConfig(
                "inference.model must not be empty".to_string(),
            ));
        }
        if self.inference.timeout_secs == 0 {
            return Err(ChatError::InvalidConfig(
                "inference.timeout_secs must be > 0".to_string(),
            ));
        }
        if self.inference.provider == InferenceProvider::Gemini
            && self.inference.api_key.as_deref().is_none_or(str::is_empty)
        {
            return Err(ChatError::InvalidConfig(
                "inference.api_key is required for gemini".to_string(),
            ));
        }
        if let Some(base_url) = &self.inference.base_url {
            Url::parse(base_url)?;
        }

        if self.auth.session_idle_secs == 0 {
            return Err(ChatError::InvalidConfig(
                "auth.session_idle_secs must be > 0".to_string(),
            ));
        }

        if self.export.wrap_columns < 10 {
            return Err(ChatError::InvalidConfig(
                "export.wrap_columns must be >= 10".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn is_path_segment(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '?' | '#' | '%'))
}

fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// Declare a config selector enum with stable string forms.
macro_rules! define_selector {
    (
        $(#[$meta:meta])*
        $name:ident { $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Stable string form.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $text, )+
                }
            }
        }

        impl FromStr for $name {
            type Err = ChatError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim().to_ascii_lowercase().as_str() {
                    $( $text => Ok(Self::$variant), )+
                    other => Err(ChatError::InvalidConfig(format!(
                        "unknown {} {other:?}",
                        stringify!($name)
                    ))),
                }
            }
        }
    };
}

define_selector!(
    /// Where turns are persisted.
    StoreBackend {
        /// Local `SQLite` database.
        Sqlite => "sqlite",
        /// Hosted Supabase table via `PostgREST`.
        Supabase => "supabase",
    }
);

define_selector!(
    /// Which inference API answers prompts.
    InferenceProvider {
        /// Google Gemini `generateContent`.
        Gemini => "gemini",
        /// Ollama `/api/generate`.
        Ollama => "ollama",
    }
);

define_selector!(
    /// Which gate establishes user identity.
    AuthBackend {
        /// Supabase `GoTrue` email/password auth.
        Supabase => "supabase",
        /// Development gate accepting any well-formed credentials.
        Open => "open",
    }
);

impl InferenceProvider {
    /// Default model for the provider.
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => "gemini-2.5-flash",
            Self::Ollama => "ministral-3:8b-instruct-2512-q8_0",
        }
    }

    /// Default API base URL for the provider.
    #[must_use]
    pub const fn default_base_url(self) -> &'static str {
        match self {
            Self::Gemini => "https://generativelanguage.googleapis.com",
            Self::Ollama => "http://127.0.0.1:11434",
        }
    }
}

/// Turn storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Which backend persists turns.
    pub backend: StoreBackend,
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
    /// Table holding turns (both backends).
    pub table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            sqlite_path: PathBuf::from("pitchcraft.sqlite3"),
            table: "pitch_craft_turns".to_string(),
        }
    }
}

/// Hosted backend credentials shared by the Supabase store and auth gate.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    pub url: Option<String>,
    /// Public anon key sent as `apikey`.
    pub anon_key: Option<String>,
}

/// Inference provider settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Provider answering prompts.
    pub provider: InferenceProvider,
    /// Model name.
    pub model: String,
    /// Optional override of the provider base URL.
    pub base_url: Option<String>,
    /// API key (required for Gemini).
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Token budget per reply (Ollama only).
    pub max_tokens: u32,
    /// How long Ollama keeps the model loaded.
    pub keep_alive: String,
}

impl InferenceConfig {
    /// Effective base URL (override or provider default), without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> String {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        let provider = InferenceProvider::Gemini;
        Self {
            provider,
            model: provider.default_model().to_string(),
            base_url: None,
            api_key: None,
            timeout_secs: 120,
            max_tokens: 512,
            keep_alive: "5m".to_string(),
        }
    }
}

/// Authentication settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Which gate establishes identity.
    pub backend: AuthBackend,
    /// Minimum password length accepted at sign-up.
    pub min_password_len: usize,
    /// Sessions unused for this many seconds are dropped at the next login.
    pub session_idle_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            backend: AuthBackend::Open,
            min_password_len: 6,
            session_idle_secs: 86_400,
        }
    }
}

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listening port.
    pub port: u16,
    /// Optional directory of static front-end assets.
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            static_dir: None,
        }
    }
}

/// PDF export settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Heading printed above the reply.
    pub title: String,
    /// Suggested download file name.
    pub file_name: String,
    /// Maximum characters per body line.
    pub wrap_columns: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            title: "PitchCraft AI Reply".to_string(),
            file_name: "PitchCraft_Reply.pdf".to_string(),
            wrap_columns: 85,
        }
    }
}
