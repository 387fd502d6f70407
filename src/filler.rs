//! Credential Filler
//!
//! Writes a staged credential into the login fields of the current screen
//! through the accessibility set-text action. The password is only exposed
//! for the duration of the set-text call.

use crate::error::Result;
use crate::node::NodeList;
use crate::pending::PendingCredential;
use crate::platform::AccessibilityTree;
use secrecy::ExposeSecret;
use tracing::{debug, error};

/// Pick the username field: the last edit text that precedes the first
/// password field in document order.
pub fn username_field<'a, T>(tree: &T, edit_texts: &'a NodeList<'_, T>) -> Option<&'a T::Node>
where
    T: AccessibilityTree + ?Sized,
{
    edit_texts
        .iter()
        .take_while(|node| !tree.is_password(node))
        .last()
}

/// Fills login fields from a pending credential
#[derive(Debug, Default, Clone, Copy)]
pub struct CredentialFiller;

impl CredentialFiller {
    pub fn new() -> Self {
        Self
    }

    /// Fill the username field (if any) and every password field.
    /// Returns the number of fields written.
    pub fn fill<T>(
        &self,
        tree: &T,
        username_node: Option<&T::Node>,
        password_nodes: &NodeList<'_, T>,
        credential: &PendingCredential,
    ) -> Result<usize>
    where
        T: AccessibilityTree + ?Sized,
    {
        let mut filled = 0;

        if let (Some(node), Some(username)) = (username_node, credential.username.as_deref()) {
            tree.set_text(node, username).inspect_err(|e| {
                error!("Failed to fill username field: {}", e);
            })?;
            filled += 1;
        }

        if let Some(password) = &credential.password {
            let secret = password.expose_secret();
            for node in password_nodes {
                tree.set_text(node, secret).inspect_err(|e| {
                    error!("Failed to fill password field: {}", e);
                })?;
                filled += 1;
            }
        }

        debug!("Filled {} fields", filled);
        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeGuard;
    use crate::simulator::{ScreenNode, SimulatedTree};
    use crate::tree_walker::{is_edit_text, is_password_field, TreeWalker};
    use secrecy::SecretString;

    fn screen() -> ScreenNode {
        ScreenNode::new("Root")
            .child(ScreenNode::edit_text("search"))
            .child(ScreenNode::edit_text("email"))
            .child(ScreenNode::password("password"))
            .child(ScreenNode::edit_text("otp"))
    }

    fn credential() -> PendingCredential {
        PendingCredential::new(
            Some("alice@example.com".to_string()),
            Some(SecretString::new("correct horse".into())),
            "http://example.com",
        )
    }

    #[test]
    fn test_username_is_last_edit_before_password() {
        let tree = SimulatedTree::new("com.example", 1, screen());
        let root = NodeGuard::new(&tree, tree.root_of_active_window().unwrap());
        let edits = TreeWalker::default().find(&tree, root.node(), 1, is_edit_text);

        let username = username_field(&tree, &edits.nodes).unwrap();
        assert_eq!(tree.element_id(username).as_deref(), Some("com.example:id/email"));
    }

    #[test]
    fn test_no_username_when_password_comes_first() {
        let tree = SimulatedTree::new(
            "com.example",
            1,
            ScreenNode::new("Root")
                .child(ScreenNode::password("password"))
                .child(ScreenNode::edit_text("email")),
        );
        let root = NodeGuard::new(&tree, tree.root_of_active_window().unwrap());
        let edits = TreeWalker::default().find(&tree, root.node(), 1, is_edit_text);
        assert!(username_field(&tree, &edits.nodes).is_none());
    }

    #[test]
    fn test_fill_writes_username_and_password() {
        let tree = SimulatedTree::new("com.example", 1, screen());
        let root = NodeGuard::new(&tree, tree.root_of_active_window().unwrap());
        let walker = TreeWalker::default();
        let passwords = walker.find(&tree, root.node(), 1, is_password_field);
        let edits = walker.find(&tree, root.node(), 1, is_edit_text);

        let filled = CredentialFiller::new()
            .fill(
                &tree,
                username_field(&tree, &edits.nodes),
                &passwords.nodes,
                &credential(),
            )
            .unwrap();

        assert_eq!(filled, 2);
        assert_eq!(
            tree.filled_text("com.example:id/email").as_deref(),
            Some("alice@example.com")
        );
        assert_eq!(
            tree.filled_text("com.example:id/password").as_deref(),
            Some("correct horse")
        );
        assert!(tree.filled_text("com.example:id/otp").is_none());
    }

    #[test]
    fn test_fill_skips_missing_values() {
        let tree = SimulatedTree::new("com.example", 1, screen());
        let root = NodeGuard::new(&tree, tree.root_of_active_window().unwrap());
        let passwords = TreeWalker::default().find(&tree, root.node(), 1, is_password_field);

        let credential = PendingCredential::new(None, None, "http://example.com");
        let filled = CredentialFiller::new()
            .fill(&tree, None, &passwords.nodes, &credential)
            .unwrap();
        assert_eq!(filled, 0);
    }
}
