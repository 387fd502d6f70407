//! In-memory host
//!
//! A scripted accessibility tree and recording platform services. The tree
//! counts every handle it hands out and every handle it gets back, which is
//! how the tests check release discipline. The replay binary drives the
//! engine with the same host from a JSON scenario.

use crate::config::AutofillSettings;
use crate::error::{AutofillError, Result};
use crate::pending::PendingCredential;
use crate::platform::{
    AccessibilityTree, AutofillNotification, Clock, DeviceState, Host, LauncherResolver,
    NotificationChannel, Notifier, Scheduler, Task,
};
use crate::service::{AutofillService, EventKind, ForegroundEvent};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const EDIT_TEXT_CLASS: &str = "android.widget.EditText";
const START_TIME_MS: i64 = 1_700_000_000_000;

fn default_class() -> String {
    "android.view.View".to_string()
}

fn default_window_id() -> i64 {
    1
}

/// Declarative description of one on-screen node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenNode {
    /// Short element id, qualified with the package unless `raw_element_id`
    #[serde(default)]
    pub element_id: Option<String>,
    #[serde(default)]
    pub raw_element_id: bool,
    #[serde(default = "default_class")]
    pub class_name: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub password: bool,
    /// Defaults to the tree's window
    #[serde(default)]
    pub window_id: Option<i64>,
    /// Report this node as its own first child
    #[serde(default)]
    pub self_child: bool,
    #[serde(default)]
    pub children: Vec<ScreenNode>,
}

impl ScreenNode {
    pub fn new(class_name: &str) -> Self {
        Self {
            class_name: class_name.to_string(),
            ..Self::default()
        }
    }

    pub fn edit_text(element_id: &str) -> Self {
        Self::new(EDIT_TEXT_CLASS).with_id(element_id)
    }

    pub fn password(element_id: &str) -> Self {
        Self {
            password: true,
            ..Self::edit_text(element_id)
        }
    }

    pub fn with_id(mut self, element_id: &str) -> Self {
        self.element_id = Some(element_id.to_string());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn in_window(mut self, window_id: i64) -> Self {
        self.window_id = Some(window_id);
        self
    }

    /// Use the element id verbatim
    pub fn raw_id(mut self) -> Self {
        self.raw_element_id = true;
        self
    }

    pub fn self_child(mut self) -> Self {
        self.self_child = true;
        self
    }

    pub fn child(mut self, child: ScreenNode) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug)]
struct FlatNode {
    element_id: Option<String>,
    class_name: String,
    text: Option<String>,
    password: bool,
    window_id: i64,
    children: Vec<usize>,
    depth: usize,
}

/// Handle to a simulated node. Deliberately not `Clone`.
#[derive(Debug, PartialEq, Eq)]
pub struct SimNode {
    index: usize,
    handle: u64,
}

/// Instrumented in-memory tree
#[derive(Debug)]
pub struct SimulatedTree {
    package: String,
    nodes: Vec<FlatNode>,
    window_available: Cell<bool>,
    panic_on_text: Cell<bool>,
    next_handle: Cell<u64>,
    live: RefCell<HashSet<u64>>,
    acquisitions: Cell<usize>,
    releases: Cell<usize>,
    double_releases: Cell<usize>,
    max_depth_acquired: Cell<usize>,
    filled: RefCell<Vec<(String, String)>>,
}

impl SimulatedTree {
    pub fn new(package: &str, window_id: i64, root: ScreenNode) -> Self {
        let mut nodes = Vec::new();
        flatten(&mut nodes, package, window_id, &root, 0);
        Self {
            package: package.to_string(),
            nodes,
            window_available: Cell::new(true),
            panic_on_text: Cell::new(false),
            next_handle: Cell::new(1),
            live: RefCell::new(HashSet::new()),
            acquisitions: Cell::new(0),
            releases: Cell::new(0),
            double_releases: Cell::new(0),
            max_depth_acquired: Cell::new(0),
            filled: RefCell::new(Vec::new()),
        }
    }

    fn acquire(&self, index: usize) -> SimNode {
        let handle = self.next_handle.get();
        self.next_handle.set(handle + 1);
        self.live.borrow_mut().insert(handle);
        self.acquisitions.set(self.acquisitions.get() + 1);
        let depth = self.nodes[index].depth;
        if depth > self.max_depth_acquired.get() {
            self.max_depth_acquired.set(depth);
        }
        SimNode { index, handle }
    }

    /// Acquire a handle the way the OS does for an event source
    pub fn acquire_by_element_id(&self, element_id: &str) -> Option<SimNode> {
        self.search(0, element_id).map(|index| self.acquire(index))
    }

    fn search(&self, from: usize, element_id: &str) -> Option<usize> {
        let mut seen = HashSet::new();
        let mut stack = vec![from];
        while let Some(index) = stack.pop() {
            if !seen.insert(index) {
                continue;
            }
            let node = &self.nodes[index];
            if node.element_id.as_deref() == Some(element_id) {
                return Some(index);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        None
    }

    pub fn set_window_available(&self, available: bool) {
        self.window_available.set(available);
    }

    /// Make `text` panic, to exercise unwinding through the dispatcher
    pub fn panic_on_text(&self, enabled: bool) {
        self.panic_on_text.set(enabled);
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.get()
    }

    pub fn releases(&self) -> usize {
        self.releases.get()
    }

    /// Handles acquired and not yet released
    pub fn outstanding(&self) -> usize {
        self.live.borrow().len()
    }

    pub fn double_releases(&self) -> usize {
        self.double_releases.get()
    }

    pub fn max_depth_acquired(&self) -> usize {
        self.max_depth_acquired.get()
    }

    /// Text most recently written into the node with `element_id`
    pub fn filled_text(&self, element_id: &str) -> Option<String> {
        self.filled
            .borrow()
            .iter()
            .rev()
            .find(|(id, _)| id == element_id)
            .map(|(_, text)| text.clone())
    }

    /// Element ids written so far, in order
    pub fn filled_fields(&self) -> Vec<String> {
        self.filled.borrow().iter().map(|(id, _)| id.clone()).collect()
    }
}

fn flatten(
    nodes: &mut Vec<FlatNode>,
    package: &str,
    window_id: i64,
    node: &ScreenNode,
    depth: usize,
) -> usize {
    let index = nodes.len();
    let element_id = node.element_id.as_ref().map(|id| {
        if node.raw_element_id {
            id.clone()
        } else {
            format!("{}:id/{}", package, id)
        }
    });
    nodes.push(FlatNode {
        element_id,
        class_name: node.class_name.clone(),
        text: node.text.clone(),
        password: node.password,
        window_id: node.window_id.unwrap_or(window_id),
        children: Vec::new(),
        depth,
    });

    let mut children = Vec::new();
    if node.self_child {
        children.push(index);
    }
    for child in &node.children {
        children.push(flatten(nodes, package, window_id, child, depth + 1));
    }
    nodes[index].children = children;
    index
}

impl AccessibilityTree for SimulatedTree {
    type Node = SimNode;

    fn root_of_active_window(&self) -> Option<SimNode> {
        if !self.window_available.get() || self.nodes.is_empty() {
            return None;
        }
        Some(self.acquire(0))
    }

    fn child_count(&self, node: &SimNode) -> usize {
        self.nodes[node.index].children.len()
    }

    fn child_at(&self, node: &SimNode, index: usize) -> Option<SimNode> {
        let child = *self.nodes[node.index].children.get(index)?;
        Some(self.acquire(child))
    }

    fn find_by_element_id(&self, root: &SimNode, element_id: &str) -> Option<SimNode> {
        self.search(root.index, element_id)
            .map(|index| self.acquire(index))
    }

    fn retain(&self, node: &SimNode) -> SimNode {
        self.acquire(node.index)
    }

    fn set_text(&self, node: &SimNode, text: &str) -> Result<()> {
        if !self.live.borrow().contains(&node.handle) {
            return Err(AutofillError::FillFailed("handle already released".to_string()));
        }
        let id = self.nodes[node.index]
            .element_id
            .clone()
            .unwrap_or_else(|| format!("#{}", node.index));
        self.filled.borrow_mut().push((id, text.to_string()));
        Ok(())
    }

    fn release(&self, node: SimNode) {
        if self.live.borrow_mut().remove(&node.handle) {
            self.releases.set(self.releases.get() + 1);
        } else {
            self.double_releases.set(self.double_releases.get() + 1);
        }
    }

    fn same_node(&self, a: &SimNode, b: &SimNode) -> bool {
        a.index == b.index
    }

    fn package_name(&self, _node: &SimNode) -> Option<String> {
        Some(self.package.clone())
    }

    fn window_id(&self, node: &SimNode) -> i64 {
        self.nodes[node.index].window_id
    }

    fn element_id(&self, node: &SimNode) -> Option<String> {
        self.nodes[node.index].element_id.clone()
    }

    fn text(&self, node: &SimNode) -> Option<String> {
        if self.panic_on_text.get() {
            panic!("simulated host failure reading node text");
        }
        self.nodes[node.index].text.clone()
    }

    fn class_name(&self, node: &SimNode) -> Option<String> {
        Some(self.nodes[node.index].class_name.clone())
    }

    fn is_password(&self, node: &SimNode) -> bool {
        self.nodes[node.index].password
    }
}

/// Interactive/legacy switches
#[derive(Debug)]
pub struct SimulatedDevice {
    interactive: Cell<bool>,
    legacy: Cell<bool>,
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self {
            interactive: Cell::new(true),
            legacy: Cell::new(false),
        }
    }

    pub fn set_interactive(&self, interactive: bool) {
        self.interactive.set(interactive);
    }

    pub fn set_legacy(&self, legacy: bool) {
        self.legacy.set(legacy);
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceState for SimulatedDevice {
    fn is_interactive(&self) -> bool {
        self.interactive.get()
    }

    fn is_legacy_os(&self) -> bool {
        self.legacy.get()
    }
}

/// A call made to the notifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierCall {
    EnsureChannel(NotificationChannel),
    Post(AutofillNotification),
    Cancel(i32),
}

/// Notifier that records every call
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    calls: RefCell<Vec<NotifierCall>>,
    fail_posts: Cell<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_posts(&self, fail: bool) {
        self.fail_posts.set(fail);
    }

    pub fn calls(&self) -> Vec<NotifierCall> {
        self.calls.borrow().clone()
    }

    pub fn posts(&self) -> Vec<AutofillNotification> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                NotifierCall::Post(n) => Some(n.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn cancels(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| matches!(call, NotifierCall::Cancel(_)))
            .count()
    }

    pub fn channels(&self) -> Vec<NotificationChannel> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                NotifierCall::EnsureChannel(c) => Some(c.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn ensure_channel(&self, channel: &NotificationChannel) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(NotifierCall::EnsureChannel(channel.clone()));
        Ok(())
    }

    fn post(&self, notification: &AutofillNotification) -> Result<()> {
        if self.fail_posts.get() {
            return Err(AutofillError::NotificationFailed(
                "simulated post failure".to_string(),
            ));
        }
        self.calls
            .borrow_mut()
            .push(NotifierCall::Post(notification.clone()));
        Ok(())
    }

    fn cancel(&self, id: i32) -> Result<()> {
        self.calls.borrow_mut().push(NotifierCall::Cancel(id));
        Ok(())
    }
}

/// Fixed set of home-screen packages
#[derive(Debug, Default)]
pub struct StaticLaunchers {
    packages: HashSet<String>,
    calls: AtomicUsize,
}

impl StaticLaunchers {
    pub fn new(packages: &[&str]) -> Self {
        Self {
            packages: packages.iter().map(|p| p.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn resolve_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LauncherResolver for StaticLaunchers {
    fn resolve_home_activities(&self) -> HashSet<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.packages.clone()
    }
}

/// Clock moved by hand
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(now_ms),
        }
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Scheduler that queues tasks until told to run them
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<Vec<(Duration, Task)>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Run every queued task regardless of its delay. Returns how many ran.
    pub fn run_all(&self) -> usize {
        let tasks: Vec<(Duration, Task)> = match self.queue.lock() {
            Ok(mut queue) => queue.drain(..).collect(),
            Err(_) => return 0,
        };
        let count = tasks.len();
        for (_, task) in tasks {
            task();
        }
        count
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push((delay, task));
        }
    }
}

/// Host assembled from the simulated parts
#[derive(Debug)]
pub struct SimulatedHost {
    tree: SimulatedTree,
    device: SimulatedDevice,
    notifier: RecordingNotifier,
    launchers: StaticLaunchers,
    clock: ManualClock,
    scheduler: ManualScheduler,
}

impl SimulatedHost {
    pub fn new(tree: SimulatedTree) -> Self {
        Self {
            tree,
            device: SimulatedDevice::new(),
            notifier: RecordingNotifier::new(),
            launchers: StaticLaunchers::new(&[]),
            clock: ManualClock::new(START_TIME_MS),
            scheduler: ManualScheduler::new(),
        }
    }

    pub fn with_launchers(mut self, packages: &[&str]) -> Self {
        self.launchers = StaticLaunchers::new(packages);
        self
    }

    /// Show a different screen
    pub fn set_tree(&mut self, tree: SimulatedTree) {
        self.tree = tree;
    }

    pub fn device_state(&self) -> &SimulatedDevice {
        &self.device
    }

    pub fn notifier_log(&self) -> &RecordingNotifier {
        &self.notifier
    }

    pub fn scheduler_log(&self) -> &ManualScheduler {
        &self.scheduler
    }

    pub fn clock_handle(&self) -> &ManualClock {
        &self.clock
    }
}

impl Host for SimulatedHost {
    type Tree = SimulatedTree;

    fn tree(&self) -> &SimulatedTree {
        &self.tree
    }

    fn device(&self) -> &dyn DeviceState {
        &self.device
    }

    fn notifier(&self) -> &dyn Notifier {
        &self.notifier
    }

    fn launchers(&self) -> &dyn LauncherResolver {
        &self.launchers
    }

    fn clock(&self) -> &dyn Clock {
        &self.clock
    }

    fn scheduler(&self) -> &dyn Scheduler {
        &self.scheduler
    }
}

// ============================================================================
// Scenario replay
// ============================================================================

/// Credential staged by the fill-trigger flow before a step
#[derive(Debug, Clone, Deserialize)]
pub struct StagedCredential {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub uri: String,
}

impl From<&StagedCredential> for PendingCredential {
    fn from(staged: &StagedCredential) -> Self {
        PendingCredential::new(
            staged.username.clone(),
            staged
                .password
                .as_ref()
                .map(|p| SecretString::new(p.as_str().into())),
            staged.uri.clone(),
        )
    }
}

/// One delivered event, optionally preceded by a screen change
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioStep {
    pub app_id: String,
    #[serde(default = "default_window_id")]
    pub window_id: i64,
    pub kind: EventKind,
    /// Milliseconds to advance the clock before delivery
    #[serde(default)]
    pub advance_ms: i64,
    /// New screen; the previous one stays up when absent
    #[serde(default)]
    pub screen: Option<ScreenNode>,
    /// Package owning the new screen, defaults to `app_id`
    #[serde(default)]
    pub screen_package: Option<String>,
    /// Fully qualified element id of the event source
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub stage: Option<StagedCredential>,
    /// Withdraw the staged credential before delivery, as when the user
    /// backs out of the vault picker
    #[serde(default)]
    pub clear_pending: bool,
    /// Fire deferred timers after the event
    #[serde(default)]
    pub run_timers: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Falls back to the stored user settings when absent
    #[serde(default)]
    pub settings: Option<AutofillSettings>,
    /// Staged before the first step
    #[serde(default)]
    pub pending: Option<StagedCredential>,
    #[serde(default)]
    pub legacy_os: bool,
    #[serde(default)]
    pub launchers: Vec<String>,
    pub steps: Vec<ScenarioStep>,
}

/// What happened at one step
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub app_id: String,
    pub outcome: String,
    pub notifications_posted: usize,
    pub fields_filled: Vec<String>,
    pub handles_outstanding: usize,
}

/// Run a scenario against a fresh engine
pub fn replay(scenario: &Scenario) -> Vec<StepReport> {
    let launchers: Vec<&str> = scenario.launchers.iter().map(String::as_str).collect();
    let initial = SimulatedTree::new("", default_window_id(), ScreenNode::new("Root"));
    let host = SimulatedHost::new(initial).with_launchers(&launchers);
    host.device_state().set_legacy(scenario.legacy_os);

    let mut service = AutofillService::new(host, scenario.settings.unwrap_or_default());
    let pending = service.pending();
    if let Some(staged) = &scenario.pending {
        pending.set(PendingCredential::from(staged));
    }
    let mut reports = Vec::with_capacity(scenario.steps.len());

    for (step_index, step) in scenario.steps.iter().enumerate() {
        if let Some(screen) = &step.screen {
            let package = step.screen_package.as_deref().unwrap_or(&step.app_id);
            service
                .host_mut()
                .set_tree(SimulatedTree::new(package, step.window_id, screen.clone()));
        }
        if step.clear_pending {
            pending.clear();
        }
        if let Some(staged) = &step.stage {
            pending.set(PendingCredential::from(staged));
        }
        service.host().clock_handle().advance(step.advance_ms);

        let posts_before = service.host().notifier_log().posts().len();
        let filled_before = service.host().tree().filled_fields().len();

        let mut event = ForegroundEvent::new(step.app_id.clone(), step.window_id, step.kind);
        if let Some(source) = &step.source {
            if let Some(node) = service.host().tree().acquire_by_element_id(source) {
                event = event.with_source(node);
            }
        }

        let outcome = service.on_accessibility_event(event);
        if step.run_timers {
            service.host().scheduler_log().run_all();
        }

        let host = service.host();
        reports.push(StepReport {
            step: step_index,
            app_id: step.app_id.clone(),
            outcome: format!("{:?}", outcome),
            notifications_posted: host.notifier_log().posts().len() - posts_before,
            fields_filled: host.tree().filled_fields()[filled_before..].to_vec(),
            handles_outstanding: host.tree().outstanding(),
        });
    }

    reports
}
