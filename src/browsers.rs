//! Browser Registry
//!
//! Maps a browser package to the element that shows its address bar, plus a
//! cleanup rule for browsers that decorate the address text.

use crate::error::{AutofillError, Result};
use std::collections::HashMap;

/// Text cleanup applied to a browser's address bar contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressNormalizer {
    /// Use the text as shown
    Identity,
    /// Keep everything before the first regular or no-break space
    FirstWord,
}

impl AddressNormalizer {
    pub fn apply(&self, text: &str) -> String {
        match self {
            AddressNormalizer::Identity => text.to_string(),
            AddressNormalizer::FirstWord => text
                .split([' ', '\u{a0}'])
                .next()
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// One supported browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserRule {
    pub app_id: &'static str,
    /// Unqualified element id of the address bar
    pub address_element_id: &'static str,
    pub normalizer: AddressNormalizer,
}

impl BrowserRule {
    pub const fn new(app_id: &'static str, address_element_id: &'static str) -> Self {
        Self {
            app_id,
            address_element_id,
            normalizer: AddressNormalizer::Identity,
        }
    }

    pub const fn with_normalizer(mut self, normalizer: AddressNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Element id as reported by the tree: `<package>:id/<name>`
    pub fn qualified_element_id(&self) -> String {
        format!("{}:id/{}", self.app_id, self.address_element_id)
    }
}

/// Browsers with a known address bar element
pub const SUPPORTED_BROWSERS: &[BrowserRule] = &[
    BrowserRule::new("com.android.chrome", "url_bar"),
    BrowserRule::new("com.chrome.beta", "url_bar"),
    BrowserRule::new("org.chromium.chrome", "url_bar"),
    BrowserRule::new("com.android.browser", "url"),
    BrowserRule::new("com.brave.browser", "url_bar"),
    BrowserRule::new("com.opera.browser", "url_field"),
    BrowserRule::new("com.opera.browser.beta", "url_field"),
    BrowserRule::new("com.opera.mini.native", "url_field"),
    BrowserRule::new("com.chrome.dev", "url_bar"),
    BrowserRule::new("com.chrome.canary", "url_bar"),
    BrowserRule::new("com.google.android.apps.chrome", "url_bar"),
    BrowserRule::new("com.google.android.apps.chrome_dev", "url_bar"),
    BrowserRule::new("org.codeaurora.swe.browser", "url_bar"),
    BrowserRule::new("org.iron.srware", "url_bar"),
    BrowserRule::new("com.sec.android.app.sbrowser", "location_bar_edit_text"),
    BrowserRule::new("com.sec.android.app.sbrowser.beta", "location_bar_edit_text"),
    BrowserRule::new("com.yandex.browser", "bro_omnibar_address_title_text")
        .with_normalizer(AddressNormalizer::FirstWord),
    BrowserRule::new("org.mozilla.firefox", "url_bar_title"),
    BrowserRule::new("org.mozilla.firefox_beta", "url_bar_title"),
    BrowserRule::new("org.mozilla.focus", "display_url"),
    BrowserRule::new("org.mozilla.klar", "display_url"),
    BrowserRule::new("com.ghostery.android.ghostery", "search_field"),
    BrowserRule::new("org.adblockplus.browser", "url_bar_title"),
    BrowserRule::new("com.htc.sense.browser", "title"),
    BrowserRule::new("com.amazon.cloud9", "url"),
    BrowserRule::new("mobi.mgeek.TunnyBrowser", "title"),
    BrowserRule::new("com.nubelacorp.javelin", "enterUrl"),
    BrowserRule::new("com.jerky.browser2", "enterUrl"),
    BrowserRule::new("com.mx.browser", "address_editor_with_progress"),
    BrowserRule::new("com.mx.browser.tablet", "address_editor_with_progress"),
    BrowserRule::new("com.linkbubble.playstore", "url_text"),
    BrowserRule::new("com.ksmobile.cb", "address_bar_edit_text"),
    BrowserRule::new("acr.browser.lightning", "search"),
    BrowserRule::new("acr.browser.barebones", "search"),
    BrowserRule::new("com.microsoft.emmx", "url_bar"),
    BrowserRule::new("com.duckduckgo.mobile.android", "omnibarTextInput"),
    BrowserRule::new("mark.via.gp", "aw"),
    BrowserRule::new("org.bromite.bromite", "url_bar"),
    BrowserRule::new("com.kiwibrowser.browser", "url_bar"),
    BrowserRule::new("com.ecosia.android", "url_bar"),
];

/// Lookup table keyed by package name
#[derive(Debug, Clone)]
pub struct BrowserRegistry {
    rules: HashMap<&'static str, BrowserRule>,
}

impl BrowserRegistry {
    /// Registry with every built-in browser
    pub fn new() -> Self {
        Self {
            rules: SUPPORTED_BROWSERS
                .iter()
                .map(|rule| (rule.app_id, rule.clone()))
                .collect(),
        }
    }

    /// Build from a custom table. Package names must be unique.
    pub fn from_rules(rules: impl IntoIterator<Item = BrowserRule>) -> Result<Self> {
        let mut map = HashMap::new();
        for rule in rules {
            let app_id = rule.app_id;
            if map.insert(app_id, rule).is_some() {
                return Err(AutofillError::ConfigError(format!(
                    "Duplicate browser rule for '{}'",
                    app_id
                )));
            }
        }
        Ok(Self { rules: map })
    }

    pub fn get(&self, app_id: &str) -> Option<&BrowserRule> {
        self.rules.get(app_id)
    }

    pub fn is_browser(&self, app_id: &str) -> bool {
        self.rules.contains_key(app_id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for BrowserRegistry {
    fn default() -> Self {
        Self::new()
    }
}
