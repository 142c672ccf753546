use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};

/// Keys whose environment values are comma-separated lists.
const LIST_KEYS: [&str; 3] = [
    "email.recipients",
    "chat.suggested_questions",
    "security.cors_origins",
];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub site: SiteConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Applies until response headers are sent; event streams outlive it.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Directory served for every path not matched by the API.
    #[serde(default = "default_public_dir")]
    pub public_dir: String,

    /// `development` exposes internal error details in responses.
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl ServerConfig {
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl From<&DatabaseConfig> for persistence::db::DatabaseConfig {
    fn from(config: &DatabaseConfig) -> Self {
        persistence::db::DatabaseConfig {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connect_timeout_secs: config.connect_timeout_secs,
            idle_timeout_secs: config.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Per client IP on the public POST endpoints. 0 disables the limiter.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,

    /// Only behind TLS termination.
    #[serde(default)]
    pub hsts_enabled: bool,

    /// Set when a reverse proxy in front appends the client address to
    /// `X-Forwarded-For`. Otherwise the header is ignored.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

/// Outbound email (Mailgun or console).
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// When false nothing is sent and sends succeed silently.
    #[serde(default)]
    pub enabled: bool,

    /// `mailgun` or `console`.
    #[serde(default = "default_email_provider")]
    pub provider: String,

    #[serde(default)]
    pub mailgun_api_key: String,

    #[serde(default)]
    pub mailgun_domain: String,

    /// `eu` selects the EU API host.
    #[serde(default = "default_mailgun_region")]
    pub mailgun_region: String,

    /// From header, e.g. `Websited <noreply@websited.org>`.
    #[serde(default = "default_sender")]
    pub sender: String,

    /// Team inboxes notified about new leads.
    #[serde(default = "default_recipients")]
    pub recipients: Vec<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_email_provider(),
            mailgun_api_key: String::new(),
            mailgun_domain: String::new(),
            mailgun_region: default_mailgun_region(),
            sender: default_sender(),
            recipients: default_recipients(),
        }
    }
}

impl EmailConfig {
    pub fn mailgun_endpoint(&self) -> String {
        let host = if self.mailgun_region.eq_ignore_ascii_case("eu") {
            "api.eu.mailgun.net"
        } else {
            "api.mailgun.net"
        };
        format!("https://{}/v3/{}/messages", host, self.mailgun_domain)
    }
}

/// Upstream chat-completion API (OpenAI-compatible, OpenRouter by default).
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Empty means the assistant is unavailable.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_chat_api_url")]
    pub api_url: String,

    #[serde(default = "default_chat_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default)]
    pub use_streaming: bool,

    #[serde(default)]
    pub suggested_questions: Vec<String>,

    /// Whole-request limit without streaming. When streaming, the limit on
    /// waiting for the response head and then on each gap between chunks.
    #[serde(default = "default_chat_timeout")]
    pub request_timeout_secs: u64,

    /// Same as `request_timeout_secs` for the streamed request that carries
    /// a tool result back upstream.
    #[serde(default = "default_follow_up_timeout")]
    pub follow_up_timeout_secs: u64,

    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: default_chat_api_url(),
            model: default_chat_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_prompt: default_system_prompt(),
            use_streaming: false,
            suggested_questions: Vec::new(),
            request_timeout_secs: default_chat_timeout(),
            follow_up_timeout_secs: default_follow_up_timeout(),
            keep_alive_secs: default_keep_alive(),
        }
    }
}

impl ChatConfig {
    pub fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Suggested questions with blanks removed.
    pub fn suggestions(&self) -> Vec<String> {
        self.suggested_questions
            .iter()
            .map(|q| q.trim())
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Chat tools: Brave search, webpage fetch, callback scheduling.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub enable_web_search: bool,

    #[serde(default)]
    pub enable_callbacks: bool,

    #[serde(default)]
    pub brave_api_key: String,

    #[serde(default = "default_brave_api_url")]
    pub brave_api_url: String,

    #[serde(default = "default_brave_quota")]
    pub brave_monthly_quota: i64,

    #[serde(default = "default_max_searches")]
    pub max_searches_per_session: i64,

    #[serde(default = "default_max_fetches")]
    pub max_webpage_fetches_per_session: i64,

    #[serde(default = "default_tool_timeout")]
    pub search_timeout_secs: u64,

    #[serde(default = "default_tool_timeout")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enable_web_search: false,
            enable_callbacks: false,
            brave_api_key: String::new(),
            brave_api_url: default_brave_api_url(),
            brave_monthly_quota: default_brave_quota(),
            max_searches_per_session: default_max_searches(),
            max_webpage_fetches_per_session: default_max_fetches(),
            search_timeout_secs: default_tool_timeout(),
            fetch_timeout_secs: default_tool_timeout(),
            max_content_chars: default_max_content_chars(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminConfig {
    /// Shared password for the dashboard API, sent as `x-admin-password`.
    #[serde(default)]
    pub dashboard_password: Option<String>,
}

impl AdminConfig {
    pub fn password(&self) -> Option<&str> {
        self.dashboard_password.as_deref().filter(|p| !p.is_empty())
    }
}

/// Public identity of the website, used in emails and upstream headers.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_url")]
    pub url: String,

    #[serde(default = "default_site_name")]
    pub name: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            url: default_site_url(),
            name: default_site_name(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_request_timeout() -> u64 {
    120
}
fn default_public_dir() -> String {
    "public".to_string()
}
fn default_environment() -> String {
    "production".to_string()
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    1
}
fn default_connect_timeout() -> u64 {
    2
}
fn default_idle_timeout() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_rate_limit() -> u32 {
    30
}
fn default_email_provider() -> String {
    "console".to_string()
}
fn default_mailgun_region() -> String {
    "us".to_string()
}
fn default_sender() -> String {
    "Websited <noreply@websited.org>".to_string()
}
fn default_recipients() -> Vec<String> {
    vec!["hello@websited.org".to_string()]
}
fn default_chat_api_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}
fn default_chat_model() -> String {
    "openai/gpt-3.5-turbo".to_string()
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_temperature() -> f32 {
    0.7
}
fn default_system_prompt() -> String {
    "You are a helpful AI assistant.".to_string()
}
fn default_chat_timeout() -> u64 {
    30
}
fn default_follow_up_timeout() -> u64 {
    60
}
fn default_keep_alive() -> u64 {
    15
}
fn default_brave_api_url() -> String {
    "https://api.search.brave.com/res/v1/web/search".to_string()
}
fn default_brave_quota() -> i64 {
    2000
}
fn default_max_searches() -> i64 {
    3
}
fn default_max_fetches() -> i64 {
    5
}
fn default_tool_timeout() -> u64 {
    15
}
fn default_max_content_chars() -> usize {
    8000
}
fn default_user_agent() -> String {
    "Websited-AI-Bot/1.0 (https://websited.au)".to_string()
}
fn default_site_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_site_name() -> String {
    "Website Chat".to_string()
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Defaults used by tests, mirroring `config/default.toml` with an empty
/// database URL.
pub const TEST_DEFAULTS: &str = r#"
    [server]
    host = "127.0.0.1"
    port = 3000
    request_timeout_secs = 120
    public_dir = "public"
    environment = "test"

    [database]
    url = ""
    max_connections = 5
    min_connections = 1
    connect_timeout_secs = 10
    idle_timeout_secs = 600

    [logging]
    level = "info"
    format = "pretty"

    [security]
    cors_origins = []
    rate_limit_per_minute = 0
    trust_forwarded_for = false

    [email]
    enabled = false
    provider = "console"
    sender = "Websited Test <test@example.com>"
    recipients = ["team@example.com"]
"#;

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with WEBSITED__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let mut environment = config::Environment::with_prefix("WEBSITED")
            .separator("__")
            .list_separator(",")
            .try_parsing(true);
        for key in LIST_KEYS {
            environment = environment.with_list_parse_key(key);
        }

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(environment)
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Builds a configuration from an inline TOML document plus key
    /// overrides, without touching the filesystem or environment.
    pub fn load_from_str(
        toml: &str,
        overrides: &[(&str, &str)],
    ) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Load configuration for testing with custom overrides.
    /// Validation is skipped to allow partial configs.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        Self::load_from_str(TEST_DEFAULTS, overrides)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "WEBSITED__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if self.email.enabled && self.email.provider == "mailgun" {
            if self.email.mailgun_api_key.is_empty() {
                return Err(ConfigValidationError::MissingRequired(
                    "WEBSITED__EMAIL__MAILGUN_API_KEY must be set for the mailgun provider"
                        .to_string(),
                ));
            }
            if self.email.mailgun_domain.is_empty() {
                return Err(ConfigValidationError::MissingRequired(
                    "WEBSITED__EMAIL__MAILGUN_DOMAIN must be set for the mailgun provider"
                        .to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}
