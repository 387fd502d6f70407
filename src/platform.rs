//! Host Platform Interfaces
//!
//! Everything the engine needs from the operating system. The host owns the
//! accessibility tree; the engine only borrows node handles for the length of
//! one event callback and hands every one of them back through
//! [`AccessibilityTree::release`].

use crate::error::Result;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Borrowed access to the OS-owned UI tree
pub trait AccessibilityTree {
    /// An opaque handle to one node. Each handle obtained from this trait
    /// must be passed to [`release`](Self::release) exactly once.
    type Node;

    /// Root node of the window currently in the foreground
    fn root_of_active_window(&self) -> Option<Self::Node>;

    fn child_count(&self, node: &Self::Node) -> usize;

    /// Acquire a handle to the child at `index`. May be `None` if the tree
    /// changed since `child_count` was read.
    fn child_at(&self, node: &Self::Node, index: usize) -> Option<Self::Node>;

    /// Acquire the first descendant of `root` with the fully qualified
    /// element id (`<package>:id/<name>`).
    fn find_by_element_id(&self, root: &Self::Node, element_id: &str) -> Option<Self::Node>;

    /// Acquire a second handle to the same node
    fn retain(&self, node: &Self::Node) -> Self::Node;

    /// Replace the text content of an editable node
    fn set_text(&self, node: &Self::Node, text: &str) -> Result<()>;

    fn release(&self, node: Self::Node);

    /// Identity comparison, used to detect self-referencing children
    fn same_node(&self, a: &Self::Node, b: &Self::Node) -> bool;

    fn package_name(&self, node: &Self::Node) -> Option<String>;
    fn window_id(&self, node: &Self::Node) -> i64;
    fn element_id(&self, node: &Self::Node) -> Option<String>;
    fn text(&self, node: &Self::Node) -> Option<String>;
    fn class_name(&self, node: &Self::Node) -> Option<String>;
    fn is_password(&self, node: &Self::Node) -> bool;
}

/// Power and release state of the device
pub trait DeviceState {
    /// False while the screen is off or the device is locked
    fn is_interactive(&self) -> bool;

    /// Older OS releases render descriptive text in browser address bars
    fn is_legacy_os(&self) -> bool {
        false
    }
}

/// Channel importance, mapped by the host to its native levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Importance {
    Min,
    Low,
    Default,
}

/// Notification channel descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    pub importance: Importance,
}

/// A fully built notification ready for posting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutofillNotification {
    pub id: i32,
    pub channel_id: String,
    pub title: String,
    pub body: String,
    /// URI handed to the fill-trigger flow when the user taps the prompt
    pub payload_uri: String,
    /// Hide content on the lock screen
    pub secret: bool,
    /// Lowest priority so a persistent prompt stays out of the way
    pub min_priority: bool,
    pub posted_at_ms: i64,
}

/// The host's notification subsystem
pub trait Notifier {
    fn ensure_channel(&self, channel: &NotificationChannel) -> Result<()>;
    fn post(&self, notification: &AutofillNotification) -> Result<()>;
    fn cancel(&self, id: i32) -> Result<()>;
}

/// Resolves which packages currently act as home screens
pub trait LauncherResolver {
    fn resolve_home_activities(&self) -> HashSet<String>;
}

/// Milliseconds on a clock that never goes backwards
pub trait Clock {
    fn now_millis(&self) -> i64;
}

/// Monotonic clock anchored to the wall time at construction, so readings
/// look like epoch milliseconds but ignore later wall-clock adjustments.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    anchor: Instant,
    anchor_ms: i64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            anchor: Instant::now(),
            anchor_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        let elapsed = i64::try_from(self.anchor.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.anchor_ms.saturating_add(elapsed)
    }
}

/// A deferred task
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs work off the event-delivery thread after a delay
pub trait Scheduler {
    fn schedule(&self, delay: Duration, task: Task);
}

/// Scheduler backed by a tokio runtime
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running inside, if any
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }
}

/// Everything the dispatcher consumes from the host, bundled so the service
/// has a single type parameter.
pub trait Host {
    type Tree: AccessibilityTree;

    fn tree(&self) -> &Self::Tree;
    fn device(&self) -> &dyn DeviceState;
    fn notifier(&self) -> &dyn Notifier;
    fn launchers(&self) -> &dyn LauncherResolver;
    fn clock(&self) -> &dyn Clock;
    fn scheduler(&self) -> &dyn Scheduler;
}
