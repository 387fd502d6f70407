//! Event Dispatcher
//!
//! [`AutofillService::on_accessibility_event`] is the single entry point the
//! host calls for every UI-change notification. It is fail-closed: every
//! error and every host panic is logged and the event is dropped. Nothing
//! below this boundary swallows errors.
//!
//! Handles are scoped to one call. The event source and the window root are
//! wrapped in guards before anything else happens, and scans return
//! self-releasing lists, so all of them are handed back to the host on every
//! exit path.

use crate::browsers::BrowserRegistry;
use crate::config::{AutofillSettings, EngineConfig, SettingsProvider};
use crate::error::{AutofillError, Result};
use crate::filler::{username_field, CredentialFiller};
use crate::launcher::PackageFilter;
use crate::matching::{check_fill, decide, needs_fill, FillDecision};
use crate::node::NodeGuard;
use crate::notification::NotificationController;
use crate::pending::{PendingCredential, PendingCredentialHolder};
use crate::platform::{AccessibilityTree, Host};
use crate::tree_walker::{is_edit_text, is_password_field, ScanResult, TreeWalker};
use crate::uri::UriResolver;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, info, warn};

/// Kind of UI change reported by the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ViewFocused,
    ContentChanged,
    StateChanged,
    /// Any other event type; ignored
    Other,
}

/// One UI-change notification. The source handle is owned by the event and
/// released by the dispatcher.
#[derive(Debug)]
pub struct ForegroundEvent<N> {
    pub app_id: String,
    pub window_id: i64,
    pub kind: EventKind,
    pub source: Option<N>,
}

impl<N> ForegroundEvent<N> {
    pub fn new(app_id: impl Into<String>, window_id: i64, kind: EventKind) -> Self {
        Self {
            app_id: app_id.into(),
            window_id,
            kind,
            source: None,
        }
    }

    pub fn with_source(mut self, source: N) -> Self {
        self.source = Some(source);
        self
    }
}

/// Why an event was ignored before the tree was inspected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotInteractive,
    AutofillDisabled,
    FilteredPackage,
    OwnApp,
}

/// What handling an event amounted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Skipped(SkipReason),
    /// A staged credential was written into this many fields
    Filled(usize),
    /// The autofill prompt was posted for this URI
    Notified(String),
    /// Nothing to do on this screen
    Idle,
    /// An error or panic was contained at the boundary
    Dropped(String),
}

/// The foreground-screen autofill engine
pub struct AutofillService<H: Host, S: SettingsProvider = AutofillSettings> {
    host: H,
    settings: S,
    config: EngineConfig,
    walker: TreeWalker,
    resolver: UriResolver,
    filler: CredentialFiller,
    filter: PackageFilter,
    notifications: NotificationController,
    pending: PendingCredentialHolder,
}

impl<H: Host, S: SettingsProvider> AutofillService<H, S> {
    pub fn new(host: H, settings: S) -> Self {
        Self::with_config(host, settings, EngineConfig::default(), BrowserRegistry::new())
    }

    pub fn with_config(
        host: H,
        settings: S,
        config: EngineConfig,
        registry: BrowserRegistry,
    ) -> Self {
        Self {
            walker: TreeWalker::from_config(&config),
            resolver: UriResolver::new(registry, &config.app_scheme),
            filler: CredentialFiller::new(),
            filter: PackageFilter::new(config.launcher_ttl),
            notifications: NotificationController::new(&config),
            pending: PendingCredentialHolder::new(),
            host,
            settings,
            config,
        }
    }

    /// Shared handle the fill-trigger flow uses to stage a credential
    pub fn pending(&self) -> PendingCredentialHolder {
        self.pending.clone()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn notifications(&self) -> &NotificationController {
        &self.notifications
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle one UI-change event. Never fails and never panics out.
    pub fn on_accessibility_event(
        &mut self,
        event: ForegroundEvent<<H::Tree as AccessibilityTree>::Node>,
    ) -> EventOutcome {
        let app_id = event.app_id.clone();
        let kind = event.kind;

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(event)));

        match result {
            Ok(Ok(outcome)) => {
                debug!("{:?} from {}: {:?}", kind, app_id, outcome);
                outcome
            }
            Ok(Err(e)) => {
                if e.is_transient() {
                    debug!("Dropping {:?} from {}: {}", kind, app_id, e);
                } else {
                    warn!("Dropping {:?} from {}: {}", kind, app_id, e);
                }
                EventOutcome::Dropped(e.to_string())
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                let e = AutofillError::HostPanic(message);
                warn!("Dropping {:?} from {}: {}", kind, app_id, e);
                EventOutcome::Dropped(e.to_string())
            }
        }
    }

    fn dispatch(
        &mut self,
        event: ForegroundEvent<<H::Tree as AccessibilityTree>::Node>,
    ) -> Result<EventOutcome> {
        let Self {
            host,
            settings,
            config,
            walker,
            resolver,
            filler,
            filter,
            notifications,
            pending,
        } = self;

        let tree = host.tree();
        let source = event.source.map(|node| NodeGuard::new(tree, node));

        if !host.device().is_interactive() {
            return Ok(EventOutcome::Skipped(SkipReason::NotInteractive));
        }

        let settings = settings.settings();
        if !settings.autofill_enabled {
            return Ok(EventOutcome::Skipped(SkipReason::AutofillDisabled));
        }

        let app_id = event.app_id.as_str();
        if app_id == config.own_app_id {
            notifications.cancel_now(host.notifier())?;
            return Ok(EventOutcome::Skipped(SkipReason::OwnApp));
        }

        let now = host.clock().now_millis();
        if filter.should_skip(app_id, host.launchers(), now) {
            return Ok(EventOutcome::Skipped(SkipReason::FilteredPackage));
        }

        let root = tree
            .root_of_active_window()
            .ok_or(AutofillError::TreeUnavailable)?;
        let root = NodeGuard::new(tree, root);

        let root_package = tree.package_name(root.node()).unwrap_or_default();
        if root_package != app_id {
            return Err(AutofillError::StaleWindow {
                expected: app_id.to_string(),
                actual: root_package,
            });
        }

        let source_is_password = source
            .as_ref()
            .is_some_and(|s| tree.is_password(s.node()));

        // The only read of the staged credential for this event
        let (credential, version) = pending.snapshot();

        let mut pass = EventPass {
            host: &*host,
            config,
            walker,
            resolver,
            filler,
            notifications,
            pending,
            settings,
            app_id,
            window_id: event.window_id,
            root: root.node(),
            credential,
            version,
        };

        match event.kind {
            EventKind::ViewFocused => pass.on_view_focused(source_is_password),
            EventKind::ContentChanged | EventKind::StateChanged => {
                pass.on_window_changed(source_is_password)
            }
            EventKind::Other => Ok(EventOutcome::Idle),
        }
    }
}

/// Borrowed view of the service for the duration of one event
struct EventPass<'a, H: Host> {
    host: &'a H,
    config: &'a EngineConfig,
    walker: &'a TreeWalker,
    resolver: &'a UriResolver,
    filler: &'a CredentialFiller,
    notifications: &'a mut NotificationController,
    pending: &'a PendingCredentialHolder,
    settings: AutofillSettings,
    app_id: &'a str,
    window_id: i64,
    root: &'a <H::Tree as AccessibilityTree>::Node,
    credential: Option<PendingCredential>,
    version: u64,
}

impl<H: Host> EventPass<'_, H> {
    fn on_view_focused(&mut self, source_is_password: bool) -> Result<EventOutcome> {
        if !source_is_password || !self.settings.autofill_password_field {
            return Ok(EventOutcome::Idle);
        }

        let outcome = self.scan_and_autofill(false)?;
        if matches!(outcome, EventOutcome::Filled(_)) {
            self.cancel_throttled()?;
        }
        Ok(outcome)
    }

    fn on_window_changed(&mut self, source_is_password: bool) -> Result<EventOutcome> {
        if self.settings.autofill_password_field {
            if source_is_password {
                // The focus event on the field does the work.
                return Ok(EventOutcome::Idle);
            }
            if self.credential.is_none() {
                let uri = self.resolve_uri();
                self.notifications
                    .reconcile(self.host.notifier(), self.host.clock(), &uri)?;
                return Ok(EventOutcome::Idle);
            }
        }

        let outcome = if self.settings.autofill_persist_notification {
            self.persistent_fill_or_notify()?
        } else {
            self.scan_and_autofill(true)?
        };

        if !matches!(outcome, EventOutcome::Notified(_)) {
            self.cancel_throttled()?;
        }
        Ok(outcome)
    }

    /// Persist mode: the prompt stays up on every screen unless we fill
    fn persistent_fill_or_notify(&mut self) -> Result<EventOutcome> {
        let uri = self.resolve_uri();
        let mut outcome = EventOutcome::Idle;

        if !self.is_vault_site(&uri) {
            if needs_fill(self.credential.as_ref(), &uri) {
                let host = self.host;
                let passwords =
                    self.walker
                        .find(host.tree(), self.root, self.window_id, is_password_field);
                if !passwords.is_empty() {
                    outcome = self.fill_fields(&passwords, &uri)?;
                }
            }
            if outcome == EventOutcome::Idle {
                self.notify(&uri)?;
                outcome = EventOutcome::Notified(uri);
            }
        }

        self.consume_credential();
        Ok(outcome)
    }

    /// Scan for password fields, then fill or (optionally) offer the prompt
    fn scan_and_autofill(&mut self, offer_prompt: bool) -> Result<EventOutcome> {
        let host = self.host;
        let passwords = self
            .walker
            .find(host.tree(), self.root, self.window_id, is_password_field);

        if passwords.is_empty() {
            if self.credential.is_some() {
                debug!("No password field yet, pending credential expires shortly");
                self.pending.schedule_clear(
                    host.scheduler(),
                    self.config.pending_clear_delay,
                    self.version,
                );
            }
            return Ok(EventOutcome::Idle);
        }

        let uri = self.resolve_uri();
        let mut outcome = EventOutcome::Idle;

        if !self.is_vault_site(&uri) {
            if decide(self.credential.as_ref(), &uri) == FillDecision::Fill {
                outcome = self.fill_fields(&passwords, &uri)?;
            } else if offer_prompt {
                self.notify(&uri)?;
                outcome = EventOutcome::Notified(uri);
            }
        }

        self.consume_credential();
        Ok(outcome)
    }

    /// Write the staged credential into the username field and `passwords`.
    /// Refuses with `HostMismatch` unless the credential belongs to `uri`.
    fn fill_fields(&self, passwords: &ScanResult<'_, H::Tree>, uri: &str) -> Result<EventOutcome> {
        let Some(credential) = &self.credential else {
            return Ok(EventOutcome::Idle);
        };
        check_fill(Some(credential), uri)?;

        let tree = self.host.tree();
        let edits = self
            .walker
            .find(tree, self.root, self.window_id, is_edit_text);
        let username = username_field(tree, &edits.nodes);
        let filled = self.filler.fill(tree, username, &passwords.nodes, credential)?;
        info!("Autofilled {} fields in {}", filled, self.app_id);
        Ok(EventOutcome::Filled(filled))
    }

    fn resolve_uri(&self) -> String {
        self.resolver.resolve_uri(
            self.host.tree(),
            self.app_id,
            self.root,
            self.host.device().is_legacy_os(),
        )
    }

    fn is_vault_site(&self, uri: &str) -> bool {
        uri.contains(&self.config.vault_web_domain)
    }

    fn notify(&mut self, uri: &str) -> Result<()> {
        self.notifications.notify(
            self.host.notifier(),
            self.host.clock(),
            uri,
            self.settings.autofill_persist_notification,
            self.host.device().is_legacy_os(),
        )
    }

    fn cancel_throttled(&mut self) -> Result<()> {
        self.notifications
            .cancel_throttled(self.host.notifier(), self.host.clock())
            .map(|_| ())
    }

    /// The staged credential is single use
    fn consume_credential(&mut self) {
        if self.credential.take().is_some() {
            self.pending.clear_if_unchanged(self.version);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{NotifierCall, ScreenNode, SimulatedHost, SimulatedTree};
    use secrecy::SecretString;

    fn chrome_login(address: &str) -> SimulatedTree {
        SimulatedTree::new(
            "com.android.chrome",
            1,
            ScreenNode::new("android.widget.FrameLayout")
                .child(ScreenNode::edit_text("url_bar").with_text(address))
                .child(
                    ScreenNode::new("android.webkit.WebView")
                        .child(ScreenNode::edit_text("username"))
                        .child(ScreenNode::password("password")),
                ),
        )
    }

    fn chrome_article(address: &str) -> SimulatedTree {
        SimulatedTree::new(
            "com.android.chrome",
            1,
            ScreenNode::new("android.widget.FrameLayout")
                .child(ScreenNode::edit_text("url_bar").with_text(address))
                .child(ScreenNode::new("android.webkit.WebView").with_text("Hello")),
        )
    }

    fn settings(password_field: bool, persist: bool) -> AutofillSettings {
        AutofillSettings {
            autofill_enabled: true,
            autofill_password_field: password_field,
            autofill_persist_notification: persist,
        }
    }

    fn credential(uri: &str) -> PendingCredential {
        PendingCredential::new(
            Some("alice".to_string()),
            Some(SecretString::new("s3cret".into())),
            uri,
        )
    }

    fn state_changed(app_id: &str) -> ForegroundEvent<crate::simulator::SimNode> {
        ForegroundEvent::new(app_id, 1, EventKind::StateChanged)
    }

    fn assert_balanced(service: &AutofillService<SimulatedHost>) {
        let tree = service.host().tree();
        assert_eq!(tree.outstanding(), 0, "leaked node handles");
        assert_eq!(tree.double_releases(), 0, "node handle released twice");
        assert_eq!(tree.acquisitions(), tree.releases());
    }

    #[test]
    fn test_persist_mode_without_pending_notifies() {
        let host = SimulatedHost::new(chrome_login("example.com"));
        let mut service = AutofillService::new(host, settings(false, true));

        let outcome = service.on_accessibility_event(state_changed("com.android.chrome"));

        assert_eq!(outcome, EventOutcome::Notified("http://example.com".to_string()));
        let notifier = service.host().notifier_log();
        assert_eq!(notifier.posts().len(), 1);
        assert_eq!(notifier.posts()[0].payload_uri, "http://example.com");
        assert!(service.host().tree().filled_fields().is_empty());
        assert_balanced(&service);
    }

    #[test]
    fn test_persist_mode_with_matching_pending_fills() {
        let host = SimulatedHost::new(chrome_login("example.com"));
        let mut service = AutofillService::new(host, settings(false, true));
        let pending = service.pending();
        pending.set(credential("http://example.com/x"));

        let outcome = service.on_accessibility_event(state_changed("com.android.chrome"));

        assert_eq!(outcome, EventOutcome::Filled(2));
        assert!(service.host().notifier_log().posts().is_empty());
        let tree = service.host().tree();
        assert_eq!(
            tree.filled_text("com.android.chrome:id/username").as_deref(),
            Some("alice")
        );
        assert_eq!(
            tree.filled_text("com.android.chrome:id/password").as_deref(),
            Some("s3cret")
        );
        assert!(!pending.is_pending());
        assert_balanced(&service);
    }

    #[test]
    fn test_persist_mode_with_other_host_notifies_and_consumes() {
        let host = SimulatedHost::new(chrome_login("example.com"));
        let mut service = AutofillService::new(host, settings(false, true));
        let pending = service.pending();
        pending.set(credential("http://other.example"));

        let outcome = service.on_accessibility_event(state_changed("com.android.chrome"));

        assert_eq!(outcome, EventOutcome::Notified("http://example.com".to_string()));
        assert!(service.host().tree().filled_fields().is_empty());
        assert!(!pending.is_pending());
    }

    #[test]
    fn test_immediate_mode_fills_matching_pending() {
        let host = SimulatedHost::new(chrome_login("example.com/login"));
        let mut service = AutofillService::new(host, settings(false, false));
        let pending = service.pending();
        pending.set(credential("https://example.com/"));

        let outcome = service.on_accessibility_event(state_changed("com.android.chrome"));

        assert_eq!(outcome, EventOutcome::Filled(2));
        assert!(!pending.is_pending());
        assert_balanced(&service);
    }

    #[test]
    fn test_immediate_mode_without_password_field_schedules_clear() {
        let host = SimulatedHost::new(chrome_article("example.com"));
        let mut service = AutofillService::new(host, settings(false, false));
        let pending = service.pending();
        pending.set(credential("http://example.com"));

        let outcome = service.on_accessibility_event(state_changed("com.android.chrome"));
        assert_eq!(outcome, EventOutcome::Idle);
        assert!(pending.is_pending());
        assert_eq!(service.host().scheduler_log().pending(), 1);
        assert!(service.host().notifier_log().posts().is_empty());

        service.host().scheduler_log().run_all();
        assert!(!pending.is_pending());
        assert_balanced(&service);
    }

    #[test]
    fn test_deferred_clear_spares_newer_credential() {
        let host = SimulatedHost::new(chrome_article("example.com"));
        let mut service = AutofillService::new(host, settings(false, false));
        let pending = service.pending();
        pending.set(credential("http://example.com"));

        service.on_accessibility_event(state_changed("com.android.chrome"));
        pending.set(credential("http://example.com/newer"));
        service.host().scheduler_log().run_all();

        assert_eq!(pending.peek().unwrap().last_uri, "http://example.com/newer");
    }

    #[test]
    fn test_immediate_mode_without_pending_notifies_on_login_screen() {
        let host = SimulatedHost::new(chrome_login("example.com"));
        let mut service = AutofillService::new(host, settings(false, false));

        let outcome = service.on_accessibility_event(state_changed("com.android.chrome"));
        assert_eq!(outcome, EventOutcome::Notified("http://example.com".to_string()));
    }

    #[test]
    fn test_vault_site_is_never_filled_or_prompted() {
        let host = SimulatedHost::new(chrome_login("vault.bitwarden.com/#/login"));
        let mut service = AutofillService::new(host, settings(false, false));
        let pending = service.pending();
        pending.set(credential("http://vault.bitwarden.com"));

        let outcome = service.on_accessibility_event(state_changed("com.android.chrome"));
        assert_eq!(outcome, EventOutcome::Idle);
        assert!(service.host().notifier_log().posts().is_empty());
        assert!(service.host().tree().filled_fields().is_empty());
        assert!(!pending.is_pending());
    }

    #[test]
    fn test_focus_on_password_field_fills() {
        let tree = chrome_login("example.com");
        let host = SimulatedHost::new(tree);
        let mut service = AutofillService::new(host, settings(true, false));
        service.pending().set(credential("http://example.com"));

        let source = service
            .host()
            .tree()
            .acquire_by_element_id("com.android.chrome:id/password")
            .unwrap();
        let event = ForegroundEvent::new("com.android.chrome", 1, EventKind::ViewFocused)
            .with_source(source);

        assert_eq!(service.on_accessibility_event(event), EventOutcome::Filled(2));
        assert_balanced(&service);
    }

    #[test]
    fn test_focus_without_match_does_not_prompt() {
        let host = SimulatedHost::new(chrome_login("example.com"));
        let mut service = AutofillService::new(host, settings(true, false));
        service.pending().set(credential("http://other.example"));

        let source = service
            .host()
            .tree()
            .acquire_by_element_id("com.android.chrome:id/password")
            .unwrap();
        let event = ForegroundEvent::new("com.android.chrome", 1, EventKind::ViewFocused)
            .with_source(source);

        assert_eq!(service.on_accessibility_event(event), EventOutcome::Idle);
        assert!(service.host().notifier_log().posts().is_empty());
        assert!(!service.pending().is_pending());
        assert_balanced(&service);
    }

    #[test]
    fn test_focus_ignored_when_policy_off() {
        let host = SimulatedHost::new(chrome_login("example.com"));
        let mut service = AutofillService::new(host, settings(false, false));
        service.pending().set(credential("http://example.com"));

        let source = service
            .host()
            .tree()
            .acquire_by_element_id("com.android.chrome:id/password")
            .unwrap();
        let event = ForegroundEvent::new("com.android.chrome", 1, EventKind::ViewFocused)
            .with_source(source);

        assert_eq!(service.on_accessibility_event(event), EventOutcome::Idle);
        assert!(service.pending().is_pending());
        assert_balanced(&service);
    }

    #[test]
    fn test_password_field_mode_without_pending_only_reconciles() {
        let host = SimulatedHost::new(chrome_login("example.com"));
        let mut service = AutofillService::new(host, settings(true, false));

        let outcome = service.on_accessibility_event(state_changed("com.android.chrome"));
        assert_eq!(outcome, EventOutcome::Idle);
        assert!(service.host().notifier_log().posts().is_empty());
        assert_eq!(service.host().notifier_log().cancels(), 1);
        assert_balanced(&service);
    }

    #[test]
    fn test_password_field_mode_cancels_prompt_when_uri_changes() {
        let host = SimulatedHost::new(chrome_login("example.com"));
        let mut service = AutofillService::new(host, settings(true, false));
        service.pending().set(credential("http://other.example"));

        let outcome = service.on_accessibility_event(state_changed("com.android.chrome"));
        assert_eq!(outcome, EventOutcome::Notified("http://example.com".to_string()));
        assert!(!service.pending().is_pending());

        service.host_mut().set_tree(chrome_article("news.example"));
        let outcome = service.on_accessibility_event(state_changed("com.android.chrome"));
        assert_eq!(outcome, EventOutcome::Idle);
        assert!(service.notifications().last_uri().is_none());
        assert_eq!(service.host().notifier_log().cancels(), 1);
    }

    #[test]
    fn test_password_field_mode_keeps_prompt_on_same_page() {
        let host = SimulatedHost::new(chrome_login("example.com"));
        let mut service = AutofillService::new(host, settings(true, false));
        service.pending().set(credential("http://other.example"));
        service.on_accessibility_event(state_changed("com.android.chrome"));

        service.host().clock_handle().advance(5_000);
        let outcome = service.on_accessibility_event(state_changed("com.android.chrome"));
        assert_eq!(outcome, EventOutcome::Idle);
        assert_eq!(service.notifications().last_uri(), Some("http://example.com"));
        assert_eq!(service.host().notifier_log().cancels(), 0);
    }

    #[test]
    fn test_skips() {
        let host = SimulatedHost::new(chrome_login("example.com"));
        let mut service = AutofillService::new(host, settings(false, true));

        assert_eq!(
            service.on_accessibility_event(state_changed("com.android.systemui")),
            EventOutcome::Skipped(SkipReason::FilteredPackage)
        );
        assert_eq!(
            service.on_accessibility_event(state_changed("")),
            EventOutcome::Skipped(SkipReason::FilteredPackage)
        );
        assert_eq!(
            service.on_accessibility_event(state_changed("com.x8bit.bitwarden")),
            EventOutcome::Skipped(SkipReason::OwnApp)
        );

        service.host().device_state().set_interactive(false);
        assert_eq!(
            service.on_accessibility_event(state_changed("com.android.chrome")),
            EventOutcome::Skipped(SkipReason::NotInteractive)
        );
        assert_eq!(service.host().tree().acquisitions(), 0);
        assert!(service.host().notifier_log().posts().is_empty());
    }

    #[test]
    fn test_disabled_autofill_skips() {
        let host = SimulatedHost::new(chrome_login("example.com"));
        let mut disabled = settings(false, true);
        disabled.autofill_enabled = false;
        let mut service = AutofillService::new(host, disabled);

        assert_eq!(
            service.on_accessibility_event(state_changed("com.android.chrome")),
            EventOutcome::Skipped(SkipReason::AutofillDisabled)
        );
    }

    #[test]
    fn test_source_released_on_skip() {
        let host = SimulatedHost::new(chrome_login("example.com"));
        let mut service = AutofillService::new(host, settings(false, true));
        service.host().device_state().set_interactive(false);

        let source = service
            .host()
            .tree()
            .acquire_by_element_id("com.android.chrome:id/password")
            .unwrap();
        let event = state_changed("com.android.chrome").with_source(source);
        service.on_accessibility_event(event);
        assert_balanced(&service);
    }

    #[test]
    fn test_stale_window_is_dropped() {
        let host = SimulatedHost::new(chrome_login("example.com"));
        let mut service = AutofillService::new(host, settings(false, true));

        let outcome = service.on_accessibility_event(state_changed("org.mozilla.firefox"));
        assert!(matches!(outcome, EventOutcome::Dropped(_)));
        assert!(service.host().notifier_log().posts().is_empty());
        assert_balanced(&service);
    }

    #[test]
    fn test_missing_root_is_dropped() {
        let host = SimulatedHost::new(chrome_login("example.com"));
        let mut service = AutofillService::new(host, settings(false, true));
        service.host().tree().set_window_available(false);

        let outcome = service.on_accessibility_event(state_changed("com.android.chrome"));
        assert!(matches!(outcome, EventOutcome::Dropped(_)));
    }

    #[test]
    fn test_host_panic_is_contained_and_handles_released() {
        let host = SimulatedHost::new(chrome_login("example.com"));
        let mut service = AutofillService::new(host, settings(false, true));
        service.host().tree().panic_on_text(true);

        let outcome = service.on_accessibility_event(state_changed("com.android.chrome"));
        assert!(matches!(outcome, EventOutcome::Dropped(_)));
        assert_balanced(&service);

        // The next event is processed normally
        service.host().tree().panic_on_text(false);
        let outcome = service.on_accessibility_event(state_changed("com.android.chrome"));
        assert!(matches!(outcome, EventOutcome::Notified(_)));
    }

    #[test]
    fn test_notification_failure_is_dropped() {
        let host = SimulatedHost::new(chrome_login("example.com"));
        let mut service = AutofillService::new(host, settings(false, true));
        service.host().notifier_log().fail_posts(true);

        let outcome = service.on_accessibility_event(state_changed("com.android.chrome"));
        assert!(matches!(outcome, EventOutcome::Dropped(_)));
        assert_balanced(&service);
    }

    #[test]
    fn test_own_app_cancels_prompt_after_clock_moves_back() {
        let host = SimulatedHost::new(chrome_login("example.com"));
        let mut service = AutofillService::new(host, settings(false, true));
        service.on_accessibility_event(state_changed("com.android.chrome"));

        service.host().clock_handle().set(1_000);
        let outcome = service.on_accessibility_event(state_changed("com.x8bit.bitwarden"));

        assert_eq!(outcome, EventOutcome::Skipped(SkipReason::OwnApp));
        assert_eq!(service.host().notifier_log().cancels(), 1);
        assert!(service.notifications().last_uri().is_none());
    }

    #[test]
    fn test_own_app_cancels_prompt() {
        let host = SimulatedHost::new(chrome_login("example.com"));
        let mut service = AutofillService::new(host, settings(false, true));
        service.on_accessibility_event(state_changed("com.android.chrome"));

        service.on_accessibility_event(state_changed("com.x8bit.bitwarden"));
        let calls = service.host().notifier_log().calls();
        assert!(matches!(calls.last(), Some(NotifierCall::Cancel(_))));
        assert!(service.notifications().last_uri().is_none());
    }
}
