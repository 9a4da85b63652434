use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinSet;

use crate::calendar::calendar_set::{self, SetError};
use crate::calendar::{Calendar, CalendarMap, CalendarSet, active_set};
use crate::storage::config::{Config, SyncConfig};
use crate::storage::local_store::{self, LocalStore, SqliteStore, StoreError};
use crate::sync::google_api::{ApiError, CalendarApi, CalendarPreference, GoogleCalendarClient};
use crate::sync::google_auth::{AuthError, AuthorizationCodeSource, GoogleAuthenticator, TokenProvider};
use crate::sync::merge::{apply_active_set, merge_calendars, preference_for};
use crate::ui::{UiNotifier, UiSignal};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Authentication error: {0}")]
    AuthError(#[from] AuthError),
    #[error("API error: {0}")]
    ApiError(#[from] ApiError),
    #[error("Storage error: {0}")]
    StoreError(#[from] StoreError),
    #[error("Calendar set error: {0}")]
    SetError(#[from] SetError),
    #[error("Unknown calendar: {0}")]
    UnknownCalendar(String),
    #[error("{failed} of {total} calendar updates failed")]
    PushFailed { failed: usize, total: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Updated { calendars: usize },
    /// No token could be obtained. Nothing was written.
    NotAuthorized,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PushSummary {
    pub pushed: usize,
}

/// Everything a sync operation talks to. Cloning is cheap.
#[derive(Clone)]
pub struct SyncEngine {
    auth: Arc<dyn TokenProvider>,
    api: Arc<dyn CalendarApi>,
    store: Arc<dyn LocalStore>,
    notifier: Arc<dyn UiNotifier>,
    settings: SyncConfig,
}

impl SyncEngine {
    pub fn new(
        auth: Arc<dyn TokenProvider>,
        api: Arc<dyn CalendarApi>,
        store: Arc<dyn LocalStore>,
        notifier: Arc<dyn UiNotifier>,
        settings: SyncConfig,
    ) -> Self {
        Self {
            auth,
            api,
            store,
            notifier,
            settings,
        }
    }

    pub fn from_config(
        config: &Config,
        code_source: Arc<dyn AuthorizationCodeSource>,
        notifier: Arc<dyn UiNotifier>,
    ) -> Result<Self, SyncError> {
        let auth = GoogleAuthenticator::new(config.google.clone()).with_code_source(code_source);
        let api = GoogleCalendarClient::new().with_base_url(config.api.base_url.clone());
        let store = SqliteStore::open(&config.storage.database)?;

        Ok(Self::new(
            Arc::new(auth),
            Arc::new(api),
            Arc::new(store),
            notifier,
            config.sync.clone(),
        ))
    }

    /// Signals the UI to stop the working indicator and re-render from the
    /// local store. Fetches nothing.
    pub fn refresh_ui(&self) {
        self.notifier.notify(UiSignal::SpinningStop);
        self.notifier.notify(UiSignal::Refresh);
    }

    /// Entry point for an explicit sign-in. Only call from a user action.
    pub async fn request_interactive_auth_token(&self) -> Result<FetchOutcome, SyncError> {
        if let Err(e) = self.auth.get_token(true).await {
            tracing::warn!("Sign-in did not produce a token: {}", e);
            return Ok(FetchOutcome::NotAuthorized);
        }

        self.fetch_calendars().await
    }

    /// Fetches the remote calendar list, merges it with the stored
    /// preferences and replaces the stored map.
    pub async fn fetch_calendars(&self) -> Result<FetchOutcome, SyncError> {
        self.notifier.notify(UiSignal::SpinningStart);

        let stored = match local_store::load_calendars(self.store.as_ref()) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!("Error loading calendars: {}", e);
                self.notifier.notify(UiSignal::SpinningStop);
                return Err(e.into());
            }
        };

        let token = match self.auth.get_token(true).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("No token for calendar fetch: {}", e);
                self.refresh_ui();
                return Ok(FetchOutcome::NotAuthorized);
            }
        };

        let remote = match self.api.list_calendars(&token).await {
            Ok(remote) => remote,
            Err(e) => {
                self.notifier.notify(UiSignal::SpinningStop);
                if e.is_unauthorized() {
                    self.invalidate_token(&token).await;
                }
                return Err(e.into());
            }
        };

        let merged = merge_calendars(&stored, remote, self.settings.retain_missing_calendars);

        if let Err(e) = local_store::save_calendars(self.store.as_ref(), &merged) {
            tracing::error!("Error saving calendars: {}", e);
            return Err(e.into());
        }

        tracing::info!("Stored {} calendars", merged.len());
        self.refresh_ui();
        Ok(FetchOutcome::Updated {
            calendars: merged.len(),
        })
    }

    /// Sends the calendar's visibility and color to the remote service. Never
    /// prompts: a missing cached token fails the push.
    pub async fn push_calendar(&self, calendar: &Calendar) -> Result<CalendarPreference, SyncError> {
        let preference = preference_for(calendar, &self.settings.fallback_color_id);

        let token = match self.auth.get_token(false).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("No cached token to push calendar {}: {}", calendar.id, e);
                self.notifier.notify(UiSignal::SpinningStop);
                return Err(e.into());
            }
        };

        match self.api.update_calendar(&token, &calendar.id, &preference).await {
            Ok(updated) => Ok(updated),
            Err(e) => {
                self.notifier.notify(UiSignal::SpinningStop);
                if e.is_unauthorized() {
                    self.invalidate_token(&token).await;
                }
                Err(e.into())
            }
        }
    }

    /// Stores a new visibility for one calendar and pushes it.
    pub async fn set_calendar_visibility(
        &self,
        calendar_id: &str,
        selected: bool,
    ) -> Result<CalendarPreference, SyncError> {
        let mut calendars = local_store::load_calendars(self.store.as_ref())?;
        let calendar = calendars
            .get_mut(calendar_id)
            .ok_or_else(|| SyncError::UnknownCalendar(calendar_id.to_string()))?;
        calendar.selected = selected;
        let calendar = calendar.clone();

        local_store::save_calendars(self.store.as_ref(), &calendars)?;
        self.push_calendar(&calendar).await
    }

    /// Makes the active set's membership the visibility of every stored
    /// calendar, stores the result and pushes all calendars concurrently.
    pub async fn update_sets(&self) -> Result<PushSummary, SyncError> {
        self.notifier.notify(UiSignal::SpinningStart);
        let result = self.reconcile_and_push().await;
        self.notifier.notify(UiSignal::SpinningStop);
        result
    }

    async fn reconcile_and_push(&self) -> Result<PushSummary, SyncError> {
        let calendars = local_store::load_calendars(self.store.as_ref())?;
        let sets = local_store::load_sets(self.store.as_ref())?;
        let active = active_set(&sets)?;

        tracing::info!("Applying calendar set {}", active.name);
        let updated = apply_active_set(&calendars, active);
        local_store::save_calendars(self.store.as_ref(), &updated)?;

        let total = updated.len();
        let mut pushes = JoinSet::new();
        for calendar in updated.into_values() {
            let engine = self.clone();
            pushes.spawn(async move { engine.push_calendar(&calendar).await });
        }

        let mut failed = 0;
        while let Some(joined) = pushes.join_next().await {
            if !matches!(joined, Ok(Ok(_))) {
                failed += 1;
            }
        }

        if failed > 0 {
            tracing::error!("Calendar set update failed: {} of {} calendars were not updated", failed, total);
            return Err(SyncError::PushFailed { failed, total });
        }

        tracing::info!("Calendar set update finished: all {} calendars updated", total);
        Ok(PushSummary { pushed: total })
    }

    pub fn calendars(&self) -> Result<CalendarMap, SyncError> {
        Ok(local_store::load_calendars(self.store.as_ref())?)
    }

    pub fn sets(&self) -> Result<Vec<CalendarSet>, SyncError> {
        Ok(local_store::load_sets(self.store.as_ref())?)
    }

    pub fn create_set(&self, name: &str, selection: Vec<String>) -> Result<CalendarSet, SyncError> {
        let mut sets = local_store::load_sets(self.store.as_ref())?;
        if sets.iter().any(|set| set.name == name) {
            return Err(SetError::DuplicateName(name.to_string()).into());
        }

        let set = CalendarSet::new(name, selection);
        sets.push(set.clone());
        local_store::save_sets(self.store.as_ref(), &sets)?;

        tracing::info!("Created calendar set {}", name);
        Ok(set)
    }

    pub fn activate_set(&self, name: &str) -> Result<(), SyncError> {
        let mut sets = local_store::load_sets(self.store.as_ref())?;
        calendar_set::activate(&mut sets, name)?;
        local_store::save_sets(self.store.as_ref(), &sets)?;
        Ok(())
    }

    async fn invalidate_token(&self, token: &str) {
        if let Err(e) = self.auth.remove_cached_token(token).await {
            tracing::warn!("Failed to remove rejected token: {}", e);
        }
    }
}
