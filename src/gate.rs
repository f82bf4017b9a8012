use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, PoisonError},
};

use crate::{
    locale::{LocaleResolver, localized_path, strip_locale},
    models::Role,
    session::{Session, SessionSubscription},
};

/// RenderContext
///
/// Where the current render happens. A server-rendered shell must not paint the
/// blocking indicator on first paint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderContext {
    Server,
    Browser,
}

/// RenderDecision
///
/// What the gate lets through for one render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderDecision {
    /// Protected children are withheld; `indicator` is true when the blocking
    /// indicator should be shown.
    Withhold { indicator: bool },
    Render,
}

/// GateRoutes
///
/// Locale-relative routes the gate knows about.
#[derive(Debug, Clone)]
pub struct GateRoutes {
    /// Routes rendered without waiting for the session (login, signup).
    pub public: Vec<String>,
    pub login: String,
    pub dashboard: String,
    /// Dedicated landing routes for roles that do not use the dashboard.
    pub role_landing: BTreeMap<Role, String>,
}

impl Default for GateRoutes {
    fn default() -> Self {
        Self {
            public: vec!["/login".to_string(), "/signup".to_string()],
            login: "/login".to_string(),
            dashboard: "/dashboard".to_string(),
            role_landing: BTreeMap::from([(Role::HrManager, "/employees".to_string())]),
        }
    }
}

impl GateRoutes {
    pub fn is_public(&self, route: &str) -> bool {
        let route = route.trim_end_matches('/');
        self.public.iter().any(|public| {
            route == public
                || route
                    .strip_prefix(public.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// Landing route for a resolved session.
    fn landing_for(&self, session: &Session) -> &str {
        match session.role() {
            Some(role) => self
                .role_landing
                .get(role)
                .map(String::as_str)
                .unwrap_or(self.dashboard.as_str()),
            None => self.login.as_str(),
        }
    }
}

/// Navigator
///
/// The client-side router the gate drives.
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;
    /// Replaces the current history entry with `path`.
    fn replace(&self, path: &str);
}

/// RecordingNavigator
///
/// In-memory navigator that records every redirect; used by tests and headless runs.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    current: Mutex<String>,
    history: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn at(path: &str) -> Self {
        Self {
            current: Mutex::new(path.to_string()),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn redirects(&self) -> Vec<String> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Navigator for RecordingNavigator {
    fn current_path(&self) -> String {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace(&self, path: &str) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = path.to_string();
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_string());
    }
}

/// NavigationGate
///
/// Decides for every render whether protected children may be shown, and issues one
/// redirect each time the session leaves bootstrapping.
pub struct NavigationGate {
    routes: GateRoutes,
    locale: Arc<LocaleResolver>,
}

impl NavigationGate {
    pub fn new(routes: GateRoutes, locale: Arc<LocaleResolver>) -> Self {
        Self { routes, locale }
    }

    pub fn routes(&self) -> &GateRoutes {
        &self.routes
    }

    /// render
    ///
    /// Children render once the session is resolved, or immediately on public routes.
    pub fn render(&self, session: &Session, path: &str, context: RenderContext) -> RenderDecision {
        let route = strip_locale(path, self.locale.settings());
        if !session.is_bootstrapping() || self.routes.is_public(route) {
            return RenderDecision::Render;
        }
        RenderDecision::Withhold {
            indicator: context == RenderContext::Browser,
        }
    }

    /// redirect_target
    ///
    /// Localized landing path for a resolved session; `None` while bootstrapping.
    pub async fn redirect_target(&self, session: &Session, path: &str) -> Option<String> {
        if session.is_bootstrapping() {
            return None;
        }
        let locale = self.locale.resolve(path).await;
        Some(localized_path(&locale, self.routes.landing_for(session)))
    }

    /// observe
    ///
    /// Reaction loop over session transitions. Redirects once per resolution, tracked
    /// by generation so a resolution is not lost when the channel coalesces updates.
    /// A resolution already invalidated when the gate reads it is skipped: its identity
    /// is gone, and the bootstrap that follows every invalidation brings the next one.
    /// The gate assumes it is mounted before bootstrap resolves, so the first resolved
    /// state it sees counts as a transition. Returns when the session store is dropped.
    pub async fn observe<N: Navigator>(&self, mut session: SessionSubscription, navigator: &N) {
        let mut handled: Option<u64> = None;

        loop {
            let current = session.borrow_and_update().clone();

            if current.is_bootstrapping() && current.generation() > handled.unwrap_or(0) {
                tracing::debug!(
                    generation = current.generation(),
                    "session resolution superseded before the gate saw it"
                );
                handled = Some(current.generation());
            }

            if !current.is_bootstrapping() && handled != Some(current.generation()) {
                handled = Some(current.generation());
                let path = navigator.current_path();
                if let Some(target) = self.redirect_target(&current, &path).await {
                    if target != path {
                        tracing::info!(from = %path, to = %target, "navigation gate redirect");
                        navigator.replace(&target);
                    }
                }
            }

            if session.changed().await.is_err() {
                return;
            }
        }
    }
}
