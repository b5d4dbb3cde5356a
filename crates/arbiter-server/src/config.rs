//! Configuration for the decision service.
//!
//! Loaded once at start from a TOML or JSON file, then `ARBITER_*`
//! environment overrides are applied, then [`PdpConfig::validate`] runs.
//! The result is shared read-only for the life of the process.
//!
//! ```toml
//! [server]
//! listen_port = 9292
//!
//! [auth]
//! mode = "authenticated"
//!
//! [identity]
//! backend = "keystone"
//! url = "http://keystone:5000"
//! timeout = "5s"
//! cache_ttl = "300s"
//!
//! [policy]
//! rules_file = "/etc/arbiter/policy.toml"
//!
//! [policy.rules.context_is_admin]
//! type = "role"
//! name = "admin"
//! ```

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use arbiter_identity::{AuthMode, CacheConfig, KeystoneConfig, StaticIdentity, StaticMode};
use arbiter_policy::{Rule, RuleSet};
use arbiter_telemetry::{LogConfig, MetricsConfig, TelemetryConfig};
use http::HeaderName;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "ARBITER_";

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PdpConfig {
    /// Listener settings.
    pub server: ServerSettings,
    /// Authentication settings.
    pub auth: AuthSettings,
    /// Identity backend settings.
    pub identity: IdentitySettings,
    /// Policy rule settings.
    pub policy: PolicySettings,
    /// API surface settings.
    pub api: ApiSettings,
    /// Logging and metrics settings.
    pub telemetry: TelemetrySettings,
}

impl PdpConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PdpConfigBuilder {
        PdpConfigBuilder::default()
    }

    /// Load configuration from a file.
    pub fn from_file(path: impl Into<PathBuf>) -> ServerResult<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            ServerError::config(format!("failed to read config file {}: {e}", path.display()))
        })?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        match extension {
            "toml" => toml::from_str(&content)
                .map_err(|e| ServerError::config(format!("invalid TOML: {e}"))),
            "json" => serde_json::from_str(&content)
                .map_err(|e| ServerError::config(format!("invalid JSON: {e}"))),
            _ => Err(ServerError::config(format!(
                "unsupported config format: {extension}"
            ))),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Variables are prefixed with `ARBITER_`. Values that do not parse are
    /// ignored.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));

        if let Some(addr) = var("LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Some(port) = var("LISTEN_PORT").and_then(|p| p.parse().ok()) {
            self.server.listen_port = port;
        }
        if let Some(mode) = var("AUTH_MODE") {
            match mode.to_ascii_lowercase().as_str() {
                "authenticated" => self.auth.mode = AuthMode::Authenticated,
                "unauthenticated" => self.auth.mode = AuthMode::Unauthenticated,
                _ => {}
            }
        }
        if let Some(url) = var("IDENTITY_URL") {
            self.identity.url = url;
        }
        if let Some(token) = var("IDENTITY_SERVICE_TOKEN") {
            self.identity.service_token = Some(token);
        }
        if let Some(path) = var("POLICY_FILE") {
            self.policy.rules_file = Some(PathBuf::from(path));
        }
        if let Some(url) = var("PUBLIC_BASE_URL") {
            self.api.public_base_url = Some(url);
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.telemetry.log_level = level;
        }

        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ServerResult<()> {
        self.server
            .listen_addr
            .parse::<IpAddr>()
            .map_err(|e| ServerError::config(format!("invalid listen_addr: {e}")))?;

        HeaderName::try_from(self.auth.token_header.as_str())
            .map_err(|_| ServerError::config("token_header is not a valid header name"))?;

        if self.auth.mode == AuthMode::Authenticated {
            self.identity.validate()?;
        }

        if let Some(base) = &self.api.public_base_url {
            if !base.starts_with("http://") && !base.starts_with("https://") {
                return Err(ServerError::config(
                    "public_base_url must start with http:// or https://",
                ));
            }
        }

        self.policy.inline_rules().validate()?;

        arbiter_telemetry::logging::create_env_filter(&self.telemetry.log_level)?;

        Ok(())
    }

    /// Returns the listen socket address.
    pub fn socket_addr(&self) -> ServerResult<SocketAddr> {
        let ip: IpAddr = self
            .server
            .listen_addr
            .parse()
            .map_err(|e| ServerError::config(format!("invalid listen_addr: {e}")))?;
        Ok(SocketAddr::new(ip, self.server.listen_port))
    }

    /// Returns the telemetry configuration.
    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            logging: LogConfig::default()
                .with_level(self.telemetry.log_level.clone())
                .with_json(self.telemetry.log_json),
            metrics: MetricsConfig {
                enabled: self.telemetry.metrics_enabled,
                ..MetricsConfig::default()
            },
        }
    }
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to bind to.
    pub listen_addr: String,
    /// Port to listen on.
    pub listen_port: u16,
    /// Reuse a well-formed `X-Request-Id` sent by the caller.
    pub trust_incoming_request_id: bool,
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 9292,
            trust_incoming_request_id: false,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// Authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Whether callers must present a valid credential.
    pub mode: AuthMode,
    /// Header carrying the credential.
    pub token_header: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            mode: AuthMode::Authenticated,
            token_header: "X-Auth-Token".to_string(),
        }
    }
}

/// Which identity backend validates credentials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Keystone v3 token validation.
    #[default]
    Keystone,
    /// Fixed token table from configuration.
    Static,
}

/// Identity backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    /// Backend kind.
    pub backend: BackendKind,
    /// Keystone base URL.
    pub url: String,
    /// Token this service presents to Keystone.
    pub service_token: Option<String>,
    /// Keystone request timeout.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// How long a successful validation is reused. Zero disables the cache.
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
    /// Maximum number of cached validations.
    pub cache_max_entries: usize,
    /// Static backend mode.
    pub static_mode: StaticMode,
    /// Static backend token table.
    pub static_tokens: BTreeMap<String, StaticIdentity>,
    /// Identity for every token in `accept_all` mode.
    pub static_identity: Option<StaticIdentity>,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Keystone,
            url: "http://localhost:5000".to_string(),
            service_token: None,
            timeout: Duration::from_secs(10),
            cache_ttl: Duration::from_secs(300),
            cache_max_entries: 10_000,
            static_mode: StaticMode::StaticTokens,
            static_tokens: BTreeMap::new(),
            static_identity: None,
        }
    }
}

/// Upper bound for `identity.cache_ttl`.
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(24 * 3600);

impl IdentitySettings {
    fn validate(&self) -> ServerResult<()> {
        match self.backend {
            BackendKind::Keystone => {
                if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
                    return Err(ServerError::config(
                        "identity url must start with http:// or https://",
                    ));
                }
                if self.timeout.is_zero() {
                    return Err(ServerError::config("identity timeout must be non-zero"));
                }
                if self.cache_ttl > MAX_CACHE_TTL {
                    return Err(ServerError::config(format!(
                        "identity cache_ttl must be at most {}s",
                        MAX_CACHE_TTL.as_secs()
                    )));
                }
            }
            BackendKind::Static => match self.static_mode {
                StaticMode::StaticTokens if self.static_tokens.is_empty() => {
                    return Err(ServerError::config(
                        "static backend needs at least one entry in static_tokens",
                    ));
                }
                StaticMode::AcceptAll if self.static_identity.is_none() => {
                    return Err(ServerError::config(
                        "accept_all mode needs static_identity",
                    ));
                }
                _ => {}
            },
        }
        Ok(())
    }

    /// Returns the Keystone client configuration.
    pub fn keystone_config(&self) -> KeystoneConfig {
        let config = KeystoneConfig::new(self.url.clone()).with_timeout(self.timeout);
        match &self.service_token {
            Some(token) => config.with_service_token(token.clone()),
            None => config,
        }
    }

    /// Returns the validation cache configuration.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: self.cache_ttl,
            max_entries: self.cache_max_entries,
        }
    }
}

/// Policy rule settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    /// Rule file (`.toml` or `.json`).
    pub rules_file: Option<PathBuf>,
    /// Rules defined in the configuration itself. They win over rules of
    /// the same name in `rules_file`.
    pub rules: BTreeMap<String, Rule>,
}

impl PolicySettings {
    /// Returns the inline rules as a rule set.
    pub fn inline_rules(&self) -> RuleSet {
        self.rules.clone().into_iter().collect()
    }

    /// Loads `rules_file` (if any) and merges the inline rules over it.
    pub fn load(&self) -> ServerResult<RuleSet> {
        let mut rules = match &self.rules_file {
            Some(path) => RuleSet::from_file(path)?,
            None => RuleSet::new(),
        };
        rules.merge(self.inline_rules());
        Ok(rules)
    }
}

/// API surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Serve the v1 API.
    pub enable_v1: bool,
    /// Serve the `ics_api` introspection endpoints.
    pub introspection_enabled: bool,
    /// Base URL used in version discovery links. Defaults to the request's
    /// `Host`.
    pub public_base_url: Option<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            enable_v1: true,
            introspection_enabled: true,
            public_base_url: None,
        }
    }
}

/// Logging and metrics settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Log filter directive.
    pub log_level: String,
    /// JSON log lines (pretty output otherwise).
    pub log_json: bool,
    /// Serve Prometheus metrics at `/_arbiter/metrics`.
    pub metrics_enabled: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: true,
            metrics_enabled: true,
        }
    }
}

/// Builder for `PdpConfig`.
#[derive(Debug, Default)]
pub struct PdpConfigBuilder {
    config: PdpConfig,
}

impl PdpConfigBuilder {
    /// Set the listen address.
    #[must_use]
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.server.listen_addr = addr.into();
        self
    }

    /// Set the listen port.
    #[must_use]
    pub fn listen_port(mut self, port: u16) -> Self {
        self.config.server.listen_port = port;
        self
    }

    /// Reuse well-formed incoming request ids.
    #[must_use]
    pub fn trust_incoming_request_id(mut self, trust: bool) -> Self {
        self.config.server.trust_incoming_request_id = trust;
        self
    }

    /// Set the maximum request body size.
    #[must_use]
    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.config.server.max_body_size = bytes;
        self
    }

    /// Set the authentication mode.
    #[must_use]
    pub fn auth_mode(mut self, mode: AuthMode) -> Self {
        self.config.auth.mode = mode;
        self
    }

    /// Set the credential header.
    #[must_use]
    pub fn token_header(mut self, header: impl Into<String>) -> Self {
        self.config.auth.token_header = header.into();
        self
    }

    /// Use the Keystone backend at `url`.
    #[must_use]
    pub fn keystone(mut self, url: impl Into<String>) -> Self {
        self.config.identity.backend = BackendKind::Keystone;
        self.config.identity.url = url.into();
        self
    }

    /// Use the static backend and add a token.
    #[must_use]
    pub fn static_token(mut self, token: impl Into<String>, identity: StaticIdentity) -> Self {
        self.config.identity.backend = BackendKind::Static;
        self.config.identity.static_mode = StaticMode::StaticTokens;
        self.config.identity.static_tokens.insert(token.into(), identity);
        self
    }

    /// Use the static backend accepting any token as `identity`.
    #[must_use]
    pub fn accept_all(mut self, identity: StaticIdentity) -> Self {
        self.config.identity.backend = BackendKind::Static;
        self.config.identity.static_mode = StaticMode::AcceptAll;
        self.config.identity.static_identity = Some(identity);
        self
    }

    /// Set the validation cache ttl.
    #[must_use]
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.identity.cache_ttl = ttl;
        self
    }

    /// Set the rule file.
    #[must_use]
    pub fn rules_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.policy.rules_file = Some(path.into());
        self
    }

    /// Add an inline rule.
    #[must_use]
    pub fn rule(mut self, name: impl Into<String>, rule: Rule) -> Self {
        self.config.policy.rules.insert(name.into(), rule);
        self
    }

    /// Enable or disable the v1 API.
    #[must_use]
    pub fn enable_v1(mut self, enabled: bool) -> Self {
        self.config.api.enable_v1 = enabled;
        self
    }

    /// Enable or disable the introspection endpoints.
    #[must_use]
    pub fn introspection(mut self, enabled: bool) -> Self {
        self.config.api.introspection_enabled = enabled;
        self
    }

    /// Set the public base URL.
    #[must_use]
    pub fn public_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api.public_base_url = Some(url.into());
        self
    }

    /// Enable or disable the metrics endpoint.
    #[must_use]
    pub fn metrics_enabled(mut self, enabled: bool) -> Self {
        self.config.telemetry.metrics_enabled = enabled;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ServerResult<PdpConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Duration (de)serialization as `"250ms"`, `"10s"`, `"5m"`, `"1h"`, or a
/// bare number of seconds.
mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = if duration.subsec_millis() == 0 {
            format!("{}s", duration.as_secs())
        } else {
            format!("{}ms", duration.as_millis())
        };
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let (number, unit_secs, millis) = if let Some(n) = s.strip_suffix("ms") {
            (n, 0, true)
        } else if let Some(n) = s.strip_suffix('s') {
            (n, 1, false)
        } else if let Some(n) = s.strip_suffix('m') {
            (n, 60, false)
        } else if let Some(n) = s.strip_suffix('h') {
            (n, 3600, false)
        } else {
            (s, 1, false)
        };

        let n: u64 = number
            .trim()
            .parse()
            .map_err(|_| format!("invalid duration: {s}"))?;
        if millis {
            Ok(Duration::from_millis(n))
        } else {
            n.checked_mul(unit_secs)
                .map(Duration::from_secs)
                .ok_or_else(|| format!("duration out of range: {s}"))
        }
    }
}
