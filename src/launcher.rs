//! Package filtering and the launcher cache
//!
//! Home screens and system overlays never host login forms, so their events
//! are dropped before the tree is touched.

use crate::platform::LauncherResolver;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

/// Literal that identifies most launcher packages
const LAUNCHER_MARKER: &str = "launcher";

/// Packages that are never filled
pub const FILTERED_PACKAGES: &[&str] = &[
    "com.android.systemui",
    "com.google.android.googlequicksearchbox",
    "com.google.android.apps.nexuslauncher",
    "com.google.android.launcher",
    "com.computer.desktop.ui.launcher",
    "com.launcher.notelauncher",
    "com.anddoes.launcher",
    "com.actionlauncher.playstore",
    "ch.deletescape.lawnchair.plah",
    "com.microsoft.launcher",
    "com.teslacoilsw.launcher",
    "com.teslacoilsw.launcher.prime",
    "is.shortcut",
    "me.craftsapp.nlauncher",
    "com.ss.squarehome2",
];

/// Time-boxed set of home-screen packages
#[derive(Debug, Clone)]
pub struct LauncherCache {
    package_ids: HashSet<String>,
    built_at_ms: Option<i64>,
    ttl: Duration,
}

impl LauncherCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            package_ids: HashSet::new(),
            built_at_ms: None,
            ttl,
        }
    }

    pub fn is_stale(&self, now_ms: i64) -> bool {
        let ttl = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        match self.built_at_ms {
            None => true,
            Some(built) => now_ms.saturating_sub(built) > ttl,
        }
    }

    /// Whether `app_id` is a home screen, rebuilding the set first if stale
    pub fn contains(&mut self, app_id: &str, resolver: &dyn LauncherResolver, now_ms: i64) -> bool {
        if self.is_stale(now_ms) {
            self.package_ids = resolver.resolve_home_activities();
            self.built_at_ms = Some(now_ms);
            debug!("Launcher cache rebuilt with {} packages", self.package_ids.len());
        }
        self.package_ids.contains(app_id)
    }
}

/// Decides which foreground packages are ignored outright
#[derive(Debug, Clone)]
pub struct PackageFilter {
    filtered: HashSet<String>,
    launchers: LauncherCache,
}

impl PackageFilter {
    pub fn new(launcher_ttl: Duration) -> Self {
        Self {
            filtered: FILTERED_PACKAGES.iter().map(|p| p.to_string()).collect(),
            launchers: LauncherCache::new(launcher_ttl),
        }
    }

    /// True for blank ids, static filtered packages, launcher-looking ids,
    /// and anything the OS currently resolves as a home screen
    pub fn should_skip(&mut self, app_id: &str, resolver: &dyn LauncherResolver, now_ms: i64) -> bool {
        if app_id.trim().is_empty()
            || self.filtered.contains(app_id)
            || app_id.contains(LAUNCHER_MARKER)
        {
            return true;
        }

        self.launchers.contains(app_id, resolver, now_ms)
    }
}
