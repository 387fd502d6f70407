//! URI Resolver
//!
//! Turns the foreground app (and, for browsers, its address bar) into the
//! canonical URI that credentials are matched against.

use crate::browsers::{BrowserRegistry, BrowserRule};
use crate::node::NodeGuard;
use crate::platform::AccessibilityTree;
use tracing::debug;

/// Some legacy browsers append page descriptions after a sentence break
const SENTENCE_BREAK: &str = ". ";

#[derive(Debug, Clone)]
pub struct UriResolver {
    registry: BrowserRegistry,
    app_scheme: String,
}

impl UriResolver {
    pub fn new(registry: BrowserRegistry, app_scheme: &str) -> Self {
        Self {
            registry,
            app_scheme: app_scheme.to_string(),
        }
    }

    /// `<scheme><app_id>`, the URI of a native app screen
    pub fn app_uri(&self, app_id: &str) -> String {
        format!("{}{}", self.app_scheme, app_id)
    }

    /// Resolve the URI of the screen rooted at `root`
    pub fn resolve_uri<T>(&self, tree: &T, app_id: &str, root: &T::Node, legacy_os: bool) -> String
    where
        T: AccessibilityTree + ?Sized,
    {
        let default = self.app_uri(app_id);

        let Some(rule) = self.registry.get(app_id) else {
            return default;
        };

        let Some(address) = tree.find_by_element_id(root, &rule.qualified_element_id()) else {
            debug!("Address bar not found for browser {}", app_id);
            return default;
        };
        let address = NodeGuard::new(tree, address);

        tree.text(address.node())
            .and_then(|text| extract_uri(&text, rule, legacy_os))
            .unwrap_or(default)
    }
}

/// Clean up address bar text into a URI. `None` when nothing usable remains.
pub fn extract_uri(text: &str, rule: &BrowserRule, legacy_os: bool) -> Option<String> {
    let uri = rule.normalizer.apply(text).trim().to_string();
    if uri.is_empty() {
        return None;
    }

    if !uri.contains('.') {
        return Some(uri);
    }

    if !uri.contains("://") && !uri.contains(' ') {
        return Some(format!("http://{}", uri));
    }

    if legacy_os {
        // Best effort: the result is only as good as the browser's title text.
        let parts: Vec<&str> = uri.split(SENTENCE_BREAK).collect();
        if parts.len() > 1 {
            if let Some(url_part) = parts.iter().find(|p| p.starts_with("http")) {
                return Some(url_part.trim().to_string());
            }
        }
    }

    Some(uri)
}
