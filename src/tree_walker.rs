//! Accessibility Tree Walker
//!
//! Bounded depth-first search over the foreground window's node tree. The
//! tree comes from another process and may be malformed, so traversal is
//! limited in depth and fan-out and skips children that point back at their
//! parent.
//!
//! Matched handles are returned in a [`NodeList`] that owns their release.
//! Every other handle acquired during the walk is released before [`find`]
//! returns.
//!
//! [`find`]: TreeWalker::find

use crate::config::EngineConfig;
use crate::error::{AutofillError, TreeAnomaly};
use crate::node::{NodeGuard, NodeList};
use crate::platform::AccessibilityTree;
use tracing::{debug, info};

/// Class name fragment shared by all editable text widgets
const EDIT_TEXT_CLASS: &str = "EditText";

/// Matched nodes plus any structural problems seen on the way
pub struct ScanResult<'t, T: AccessibilityTree + ?Sized> {
    pub nodes: NodeList<'t, T>,
    pub anomalies: Vec<TreeAnomaly>,
}

impl<T: AccessibilityTree + ?Sized> ScanResult<'_, T> {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn saw(&self, anomaly: TreeAnomaly) -> bool {
        self.anomalies.contains(&anomaly)
    }
}

impl<T: AccessibilityTree + ?Sized> std::fmt::Debug for ScanResult<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanResult")
            .field("nodes", &self.nodes)
            .field("anomalies", &self.anomalies)
            .finish()
    }
}

/// Depth- and breadth-limited walker
#[derive(Debug, Clone)]
pub struct TreeWalker {
    max_depth: usize,
    max_children: usize,
    system_ui_namespace: String,
}

impl TreeWalker {
    pub fn new(max_depth: usize, max_children: usize, system_ui_namespace: &str) -> Self {
        Self {
            max_depth,
            max_children,
            system_ui_namespace: system_ui_namespace.to_string(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.max_depth,
            config.max_children,
            &config.system_ui_namespace,
        )
    }

    /// Collect every node under `root` (inclusive) that belongs to
    /// `window_id`, is not part of the system UI, and satisfies `predicate`.
    /// Results are in document order.
    ///
    /// `root` stays owned by the caller. If it matches, the result holds a
    /// separately retained handle to it.
    pub fn find<'t, T, F>(
        &self,
        tree: &'t T,
        root: &T::Node,
        window_id: i64,
        predicate: F,
    ) -> ScanResult<'t, T>
    where
        T: AccessibilityTree + ?Sized,
        F: FnMut(&T, &T::Node) -> bool,
    {
        let mut scan = Scan {
            walker: self,
            tree,
            window_id,
            predicate,
            nodes: NodeList::new(tree),
            anomalies: Vec::new(),
        };

        if scan.matches(root) {
            scan.nodes.push(tree.retain(root));
        }
        scan.descend(root, 0);

        debug!(
            "Tree scan matched {} nodes ({} anomalies)",
            scan.nodes.len(),
            scan.anomalies.len()
        );

        ScanResult {
            nodes: scan.nodes,
            anomalies: scan.anomalies,
        }
    }
}

impl Default for TreeWalker {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

struct Scan<'w, 't, T: AccessibilityTree + ?Sized, F> {
    walker: &'w TreeWalker,
    tree: &'t T,
    window_id: i64,
    predicate: F,
    nodes: NodeList<'t, T>,
    anomalies: Vec<TreeAnomaly>,
}

impl<'t, T, F> Scan<'_, 't, T, F>
where
    T: AccessibilityTree + ?Sized,
    F: FnMut(&T, &T::Node) -> bool,
{
    fn matches(&mut self, node: &T::Node) -> bool {
        if self.tree.window_id(node) != self.window_id {
            return false;
        }
        let system_ui = self
            .tree
            .element_id(node)
            .is_some_and(|id| id.starts_with(&self.walker.system_ui_namespace));
        !system_ui && (self.predicate)(self.tree, node)
    }

    /// Logged once per traversal
    fn note(&mut self, anomaly: TreeAnomaly) {
        if !self.anomalies.contains(&anomaly) {
            info!("{}", AutofillError::MalformedTree(anomaly));
            self.anomalies.push(anomaly);
        }
    }

    fn descend(&mut self, parent: &T::Node, depth: usize) {
        let count = self.tree.child_count(parent);
        let limit = if count > self.walker.max_children {
            self.note(TreeAnomaly::ExcessiveFanOut);
            self.walker.max_children
        } else {
            count
        };

        for index in 0..limit {
            let Some(child) = self.tree.child_at(parent, index) else {
                continue;
            };
            let child = NodeGuard::new(self.tree, child);

            if self.tree.same_node(child.node(), parent) {
                self.note(TreeAnomaly::Cycle);
                continue;
            }

            self.visit(child, depth + 1);
        }
    }

    fn visit(&mut self, node: NodeGuard<'t, T>, depth: usize) {
        if depth >= self.walker.max_depth {
            self.note(TreeAnomaly::ExcessiveDepth);
            return;
        }

        let matched = self.matches(node.node());
        let slot = self.nodes.len();
        self.descend(node.node(), depth);

        if matched {
            self.nodes.insert(slot, node.into_inner());
        }
    }
}

/// Predicate: node is a password input
pub fn is_password_field<T: AccessibilityTree + ?Sized>(tree: &T, node: &T::Node) -> bool {
    tree.is_password(node)
}

/// Predicate: node is an editable text widget
pub fn is_edit_text<T: AccessibilityTree + ?Sized>(tree: &T, node: &T::Node) -> bool {
    tree.class_name(node)
        .is_some_and(|class| class.contains(EDIT_TEXT_CLASS))
}
