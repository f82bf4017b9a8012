use std::time::Duration;

use crate::{
    config::AppConfig,
    storage::{CookieJar, SetCookie, StoreState},
};

/// Cookie read by the navigation layer on the next page load.
pub const LOCALE_COOKIE: &str = "NEXT_LOCALE";
/// Key of the long-lived locale preference.
pub const LOCALE_STORAGE_KEY: &str = "preferred_locale";
/// One year.
pub const LOCALE_COOKIE_MAX_AGE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// LocaleSettings
///
/// The known locale set plus the process-wide default. The default is always a member
/// of the known set.
#[derive(Debug, Clone, PartialEq)]
pub struct LocaleSettings {
    known: Vec<String>,
    default: String,
}

impl LocaleSettings {
    pub fn new<I, S>(known: I, default: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut known: Vec<String> = known
            .into_iter()
            .map(|code| code.into().to_ascii_lowercase())
            .collect();
        let default = default.to_ascii_lowercase();
        if !known.contains(&default) {
            known.push(default.clone());
        }
        Self { known, default }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.locales.iter().cloned(), &config.default_locale)
    }

    pub fn default_locale(&self) -> &str {
        &self.default
    }

    pub fn known(&self) -> &[String] {
        &self.known
    }

    /// Returns the canonical form of `code` when it is a known locale.
    pub fn canonicalize(&self, code: &str) -> Option<&str> {
        let code = code.trim();
        self.known
            .iter()
            .find(|known| known.eq_ignore_ascii_case(code))
            .map(String::as_str)
    }
}

/// locale_from_path
///
/// Extracts the locale segment from the first path segment when it is a known code.
/// Query strings and fragments are ignored.
pub fn locale_from_path<'a>(path: &str, settings: &'a LocaleSettings) -> Option<&'a str> {
    let first = route_path(path)
        .trim_start_matches('/')
        .split('/')
        .next()
        .filter(|segment| !segment.is_empty())?;
    settings.canonicalize(first)
}

/// strip_locale
///
/// The route below the locale prefix: `/fr/login` -> `/login`, `/fr` -> `/`.
/// Paths without a known locale segment are returned unchanged (minus query string).
pub fn strip_locale<'p>(path: &'p str, settings: &LocaleSettings) -> &'p str {
    let route = route_path(path);
    if locale_from_path(route, settings).is_none() {
        return route;
    }
    let trimmed = route.trim_start_matches('/');
    match trimmed.find('/') {
        Some(index) => &trimmed[index..],
        None => "/",
    }
}

/// Prefixes `route` with the locale segment.
pub fn localized_path(locale: &str, route: &str) -> String {
    let route = route.trim_start_matches('/');
    if route.is_empty() {
        format!("/{}", locale)
    } else {
        format!("/{}/{}", locale, route)
    }
}

fn route_path(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

/// LocaleResolver
///
/// Derives the canonical locale for the displayed path and mirrors it into both stores:
/// the `NEXT_LOCALE` navigation cookie and the long-lived preference. It is the only
/// writer of either store.
pub struct LocaleResolver {
    settings: LocaleSettings,
    cookies: CookieJar,
    store: StoreState,
    // Path of the last navigation that was synchronized.
    last_synced: tokio::sync::Mutex<Option<String>>,
}

impl LocaleResolver {
    pub fn new(settings: LocaleSettings, cookies: CookieJar, store: StoreState) -> Self {
        Self {
            settings,
            cookies,
            store,
            last_synced: tokio::sync::Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &LocaleSettings {
        &self.settings
    }

    /// resolve
    ///
    /// Resolution order: (a) locale segment of `path`; (b) the persisted preference
    /// (long-lived store, then cookie); (c) the process-wide default. Reads only, so two
    /// calls against the same path and storage state always agree.
    pub async fn resolve(&self, path: &str) -> String {
        if let Some(code) = locale_from_path(path, &self.settings) {
            return code.to_string();
        }
        if let Some(code) = self.stored_preference().await {
            return code;
        }
        self.settings.default_locale().to_string()
    }

    async fn stored_preference(&self) -> Option<String> {
        let stored = match self.store.get(LOCALE_STORAGE_KEY).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "locale preference unreadable, falling back to cookie");
                None
            }
        };

        if let Some(code) = stored
            .as_deref()
            .and_then(|code| self.settings.canonicalize(code))
        {
            return Some(code.to_string());
        }

        self.cookies
            .get(LOCALE_COOKIE)
            .and_then(|code| self.settings.canonicalize(&code).map(str::to_string))
    }

    /// persist
    ///
    /// Writes the site-wide navigation cookie (1 year) and the long-lived preference.
    /// A failed long-lived write is logged and swallowed.
    pub async fn persist(&self, code: &str) {
        self.cookies.set(&SetCookie {
            name: LOCALE_COOKIE.to_string(),
            value: code.to_string(),
            path: "/".to_string(),
            max_age: LOCALE_COOKIE_MAX_AGE,
        });

        if let Err(e) = self.store.set(LOCALE_STORAGE_KEY, code).await {
            tracing::warn!(error = %e, locale = code, "failed to persist locale preference");
        }
    }

    /// sync
    ///
    /// Runs once per navigation: resolves the locale for the newly displayed path and
    /// re-persists it, so the stored preference follows the locale actually on screen.
    /// Repeated calls for the same path are no-ops beyond resolution.
    pub async fn sync(&self, path: &str) -> String {
        let mut last = self.last_synced.lock().await;
        let code = self.resolve(path).await;
        if last.as_deref() == Some(path) {
            return code;
        }

        tracing::debug!(path, locale = %code, "synchronizing locale preference");
        self.persist(&code).await;
        *last = Some(path.to_string());
        code
    }
}
