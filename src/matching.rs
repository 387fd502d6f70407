//! Match Decision Engine
//!
//! Decides whether a staged credential may be reused on the current screen.
//! Matching is at host granularity only; path and query are ignored.

use crate::error::{AutofillError, Result};
use crate::pending::PendingCredential;
use url::Url;

fn host_of(uri: &str) -> Option<String> {
    let parsed = Url::parse(uri).ok()?;
    parsed
        .host_str()
        .filter(|host| !host.is_empty())
        .map(str::to_string)
}

/// True only when both URIs parse as absolute and have the same host
pub fn needs_fill(pending: Option<&PendingCredential>, current_uri: &str) -> bool {
    let Some(pending) = pending else {
        return false;
    };

    match (host_of(&pending.last_uri), host_of(current_uri)) {
        (Some(last), Some(current)) => last == current,
        _ => false,
    }
}

/// Strict form of [`needs_fill`] for callers that want the refusal as an error
pub fn check_fill(pending: Option<&PendingCredential>, current_uri: &str) -> Result<()> {
    if needs_fill(pending, current_uri) {
        Ok(())
    } else {
        Err(AutofillError::HostMismatch)
    }
}

/// What the dispatcher should do on a screen with a password field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillDecision {
    /// Fill the staged credential and drop the prompt
    Fill,
    /// Offer the user a manual autofill prompt
    Notify,
}

/// Choose between filling and prompting for a screen at `current_uri`
pub fn decide(pending: Option<&PendingCredential>, current_uri: &str) -> FillDecision {
    if needs_fill(pending, current_uri) {
        FillDecision::Fill
    } else {
        FillDecision::Notify
    }
}
