use std::{env, path::PathBuf, time::Duration};

/// AppConfig
///
/// Holds the client's entire configuration state. Immutable once loaded and shared by
/// every per-tab component (session store, locale resolver, resource hooks) through the
/// `Portal` unified state.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls fail-fast behaviour and log format.
    pub env: Env,
    // Base URL of the remote API (identity oracle and resource endpoints).
    pub api_base_url: String,
    // Fixed client-side deadline enforced by the transport on every request.
    pub request_timeout: Duration,
    // Upper bound for the identity-oracle call during session bootstrap.
    pub bootstrap_timeout: Duration,
    // Process-wide fallback locale. Always a member of `locales`.
    pub default_locale: String,
    // Known locale codes, matched against the first path segment.
    pub locales: Vec<String>,
    // File backing the long-lived preference store.
    pub storage_path: PathBuf,
    // Listen address of the development API binary.
    pub bind_addr: String,
    // Secret used by the development API to sign session cookies.
    pub jwt_secret: String,
}

/// Env
///
/// Defines the runtime context. `Local` enables development fallbacks, `Production`
/// demands every endpoint and secret be set explicitly.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

const DEFAULT_API_URL: &str = "http://127.0.0.1:3000";
const DEFAULT_LOCALES: &[&str] = &["en", "fr", "ar"];
const DEFAULT_JWT_SECRET: &str = "portal-gate-local-session-secret";

impl Default for AppConfig {
    /// default
    ///
    /// Safe, non-panicking configuration used for test scaffolding. Reads nothing from
    /// the environment.
    fn default() -> Self {
        Self {
            env: Env::Local,
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(15),
            bootstrap_timeout: Duration::from_secs(10),
            default_locale: "en".to_string(),
            locales: DEFAULT_LOCALES.iter().map(|code| code.to_string()).collect(),
            storage_path: PathBuf::from(".portal/preferences.json"),
            bind_addr: "127.0.0.1:3000".to_string(),
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads every parameter from environment variables (after `dotenv`) and implements
    /// the **fail-fast** principle for production.
    ///
    /// # Panics
    /// Panics in `Env::Production` when `PORTAL_API_URL` or `PORTAL_JWT_SECRET` is unset,
    /// so the client never starts against an implicit endpoint.
    pub fn load() -> Self {
        let env_str = env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let env = match env_str.as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };
        let defaults = Self::default();

        let (api_base_url, jwt_secret) = match env {
            Env::Production => (
                env::var("PORTAL_API_URL").expect("FATAL: PORTAL_API_URL required in prod"),
                env::var("PORTAL_JWT_SECRET").expect("FATAL: PORTAL_JWT_SECRET required in prod"),
            ),
            Env::Local => (
                env::var("PORTAL_API_URL").unwrap_or(defaults.api_base_url),
                env::var("PORTAL_JWT_SECRET").unwrap_or(defaults.jwt_secret),
            ),
        };

        let mut locales = env::var("PORTAL_LOCALES")
            .ok()
            .map(|raw| parse_locale_list(&raw))
            .filter(|list| !list.is_empty())
            .unwrap_or(defaults.locales);

        let default_locale = env::var("PORTAL_DEFAULT_LOCALE")
            .map(|code| code.trim().to_ascii_lowercase())
            .unwrap_or(defaults.default_locale);
        if !locales.contains(&default_locale) {
            locales.push(default_locale.clone());
        }

        Self {
            env,
            api_base_url,
            request_timeout: duration_from_env("PORTAL_REQUEST_TIMEOUT_MS")
                .unwrap_or(defaults.request_timeout),
            bootstrap_timeout: duration_from_env("PORTAL_BOOTSTRAP_TIMEOUT_MS")
                .unwrap_or(defaults.bootstrap_timeout),
            default_locale,
            locales,
            storage_path: env::var("PORTAL_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_path),
            bind_addr: env::var("PORTAL_BIND_ADDR").unwrap_or(defaults.bind_addr),
            jwt_secret,
        }
    }
}

/// Splits a comma separated locale list into canonical lowercase codes.
fn parse_locale_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|code| code.trim().to_ascii_lowercase())
        .filter(|code| !code.is_empty())
        .collect()
}

fn duration_from_env(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}
