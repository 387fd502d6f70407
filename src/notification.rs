//! Notification Controller
//!
//! Owns the single autofill prompt. Posting always refreshes the prompt;
//! cancelling is throttled so benign layout churn right after a post does
//! not make the prompt flicker.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::platform::{
    AutofillNotification, Clock, Importance, NotificationChannel, Notifier,
};
use std::time::Duration;
use tracing::{debug, info};

const NOTIFICATION_TITLE: &str = "Bitwarden Autofill Service";
const NOTIFICATION_BODY: &str = "Tap this notification to autofill a login from your vault.";
const NOTIFICATION_BODY_LEGACY: &str =
    "Tap this notification to pick a login from your vault, then return to this screen.";
const CHANNEL_NAME: &str = "Autofill Service";

/// Process-wide prompt state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationState {
    pub last_uri: Option<String>,
    /// Only ever moves forward
    pub last_post_time_ms: i64,
    pub channel_persistent: bool,
}

/// Result of a cancel request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The prompt was posted too recently; nothing changed
    Throttled,
    Cancelled,
}

/// Result of reconciling the prompt with the screen that is now showing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// The prompt still applies to this screen
    Kept,
    Cancel(CancelOutcome),
}

#[derive(Debug)]
pub struct NotificationController {
    state: NotificationState,
    notification_id: i32,
    channel_id: String,
    throttle: Duration,
    self_scheme_grace: Duration,
    app_scheme: String,
    channel_created: bool,
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

impl NotificationController {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            state: NotificationState::default(),
            notification_id: config.notification_id,
            channel_id: config.channel_id.clone(),
            throttle: config.cancel_throttle,
            self_scheme_grace: config.self_scheme_grace,
            app_scheme: config.app_scheme.clone(),
            channel_created: false,
        }
    }

    pub fn state(&self) -> &NotificationState {
        &self.state
    }

    pub fn last_uri(&self) -> Option<&str> {
        self.state.last_uri.as_deref()
    }

    /// Post (or refresh) the autofill prompt for `uri`
    pub fn notify(
        &mut self,
        notifier: &dyn Notifier,
        clock: &dyn Clock,
        uri: &str,
        persistent: bool,
        legacy_os: bool,
    ) -> Result<()> {
        if uri.trim().is_empty() {
            return Ok(());
        }

        if self.state.last_uri.as_deref().is_some_and(|last| last != uri) {
            debug!("Prompt context changed, replacing notification");
            self.cancel_now(notifier)?;
        }

        if !self.channel_created {
            notifier.ensure_channel(&NotificationChannel {
                id: self.channel_id.clone(),
                name: CHANNEL_NAME.to_string(),
                importance: Importance::Low,
            })?;
            self.channel_created = true;
        }

        let now = clock.now_millis();
        self.state.last_post_time_ms = self.state.last_post_time_ms.max(now);
        self.state.last_uri = Some(uri.to_string());
        self.state.channel_persistent = persistent;

        let body = if legacy_os {
            NOTIFICATION_BODY_LEGACY
        } else {
            NOTIFICATION_BODY
        };

        let notification = AutofillNotification {
            id: self.notification_id,
            channel_id: self.channel_id.clone(),
            title: NOTIFICATION_TITLE.to_string(),
            body: body.to_string(),
            payload_uri: uri.to_string(),
            secret: true,
            min_priority: persistent,
            posted_at_ms: now,
        };

        info!("Posting autofill prompt for {}", uri);
        notifier.post(&notification)
    }

    /// Cancel unless the prompt was posted less than `min_age` ago
    pub fn cancel(
        &mut self,
        notifier: &dyn Notifier,
        clock: &dyn Clock,
        min_age: Duration,
    ) -> Result<CancelOutcome> {
        let age = clock.now_millis() - self.state.last_post_time_ms;
        // A negative age means the clock was wound back; treat it as elapsed.
        if (0..millis(min_age)).contains(&age) {
            debug!("Cancel throttled ({} ms since post)", age);
            return Ok(CancelOutcome::Throttled);
        }

        self.cancel_now(notifier)
    }

    /// Cancel with the default throttle window
    pub fn cancel_throttled(
        &mut self,
        notifier: &dyn Notifier,
        clock: &dyn Clock,
    ) -> Result<CancelOutcome> {
        self.cancel(notifier, clock, self.throttle)
    }

    /// Cancel regardless of how recently the prompt was posted
    pub fn cancel_now(&mut self, notifier: &dyn Notifier) -> Result<CancelOutcome> {
        self.state.last_uri = None;
        notifier.cancel(self.notification_id)?;
        Ok(CancelOutcome::Cancelled)
    }

    /// Drop the prompt if it no longer applies to `current_uri`
    pub fn reconcile(
        &mut self,
        notifier: &dyn Notifier,
        clock: &dyn Clock,
        current_uri: &str,
    ) -> Result<Reconciled> {
        let Some(last) = self.state.last_uri.as_deref().filter(|u| !u.trim().is_empty()) else {
            return self.cancel_throttled(notifier, clock).map(Reconciled::Cancel);
        };

        if last != current_uri {
            return self.cancel_now(notifier).map(Reconciled::Cancel);
        }

        if current_uri.starts_with(&self.app_scheme) {
            // The app may briefly show itself again while handing the fill off.
            let grace = self.self_scheme_grace;
            return self.cancel(notifier, clock, grace).map(Reconciled::Cancel);
        }

        Ok(Reconciled::Kept)
    }
}
