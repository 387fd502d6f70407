//! Scoped ownership of borrowed node handles
//!
//! Every handle acquired from the host is wrapped in one of these types at
//! the acquisition site, so it is released on every exit path including
//! early returns and unwinding.

use crate::platform::AccessibilityTree;
use std::fmt;

/// A single node handle that is released when dropped
pub struct NodeGuard<'t, T: AccessibilityTree + ?Sized> {
    tree: &'t T,
    node: Option<T::Node>,
}

impl<'t, T: AccessibilityTree + ?Sized> NodeGuard<'t, T> {
    pub fn new(tree: &'t T, node: T::Node) -> Self {
        Self {
            tree,
            node: Some(node),
        }
    }

    pub fn node(&self) -> &T::Node {
        // Only `into_inner` empties the slot and it consumes the guard.
        match &self.node {
            Some(node) => node,
            None => unreachable!("node guard accessed after release"),
        }
    }

    /// Hand the raw handle (and its release obligation) to the caller
    pub fn into_inner(mut self) -> T::Node {
        match self.node.take() {
            Some(node) => node,
            None => unreachable!("node guard emptied twice"),
        }
    }
}

impl<T: AccessibilityTree + ?Sized> Drop for NodeGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(node) = self.node.take() {
            self.tree.release(node);
        }
    }
}

impl<T: AccessibilityTree + ?Sized> fmt::Debug for NodeGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeGuard")
            .field("held", &self.node.is_some())
            .finish()
    }
}

/// An ordered set of matched handles, all released when the list is dropped
pub struct NodeList<'t, T: AccessibilityTree + ?Sized> {
    tree: &'t T,
    nodes: Vec<T::Node>,
}

impl<'t, T: AccessibilityTree + ?Sized> NodeList<'t, T> {
    pub fn new(tree: &'t T) -> Self {
        Self {
            tree,
            nodes: Vec::new(),
        }
    }

    pub fn push(&mut self, node: T::Node) {
        self.nodes.push(node);
    }

    /// Insert at `index`, keeping document order when a parent is matched
    /// after its descendants were collected
    pub fn insert(&mut self, index: usize, node: T::Node) {
        self.nodes.insert(index, node);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T::Node> {
        self.nodes.iter()
    }

    pub fn first(&self) -> Option<&T::Node> {
        self.nodes.first()
    }
}

impl<T: AccessibilityTree + ?Sized> Drop for NodeList<'_, T> {
    fn drop(&mut self) {
        for node in self.nodes.drain(..) {
            self.tree.release(node);
        }
    }
}

impl<'a, 't, T: AccessibilityTree + ?Sized> IntoIterator for &'a NodeList<'t, T> {
    type Item = &'a T::Node;
    type IntoIter = std::slice::Iter<'a, T::Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

impl<T: AccessibilityTree + ?Sized> fmt::Debug for NodeList<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeList")
            .field("len", &self.nodes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{ScreenNode, SimulatedTree};

    fn tree() -> SimulatedTree {
        SimulatedTree::new(
            "com.example",
            1,
            ScreenNode::new("android.widget.FrameLayout")
                .child(ScreenNode::edit_text("user"))
                .child(ScreenNode::password("pass")),
        )
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let tree = tree();
        {
            let root = tree.root_of_active_window().unwrap();
            let _guard = NodeGuard::new(&tree, root);
            assert_eq!(tree.outstanding(), 1);
        }
        assert_eq!(tree.outstanding(), 0);
        assert_eq!(tree.releases(), 1);
    }

    #[test]
    fn test_guard_into_inner_transfers_release() {
        let tree = tree();
        let root = tree.root_of_active_window().unwrap();
        let raw = NodeGuard::new(&tree, root).into_inner();
        assert_eq!(tree.releases(), 0);
        tree.release(raw);
        assert_eq!(tree.outstanding(), 0);
    }

    #[test]
    fn test_list_releases_every_node() {
        let tree = tree();
        let root = NodeGuard::new(&tree, tree.root_of_active_window().unwrap());
        {
            let mut list = NodeList::new(&tree);
            for i in 0..tree.child_count(root.node()) {
                list.push(tree.child_at(root.node(), i).unwrap());
            }
            assert_eq!(list.len(), 2);
        }
        drop(root);
        assert_eq!(tree.acquisitions(), 3);
        assert_eq!(tree.releases(), 3);
        assert_eq!(tree.double_releases(), 0);
    }
}
