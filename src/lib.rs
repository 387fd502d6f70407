//! Accessibility Autofill
//!
//! A foreground-screen credential autofill engine. The host delivers UI-change
//! events for whatever app is in the foreground; the engine walks that app's
//! accessibility tree, works out which site or app is showing, and either
//! fills a staged credential into the login fields or offers an autofill
//! notification.
//!
//! ## Architecture
//! - `platform` - Traits for everything the host OS provides
//! - `node` - Guards that hand node handles back to the host
//! - `tree_walker` - Bounded depth-first search of the window tree
//! - `browsers` - Browser registry and address-bar rules
//! - `uri` - Resolves the URI of the current screen
//! - `matching` - Decides between filling and prompting
//! - `pending` - The credential staged by the fill-trigger flow
//! - `filler` - Writes credentials into fields
//! - `notification` - The autofill prompt and its throttling
//! - `launcher` - Package filter and launcher cache
//! - `service` - Event dispatcher
//! - `simulator` - In-memory host and scenario replay

pub mod browsers;
pub mod config;
pub mod error;
pub mod filler;
pub mod launcher;
pub mod matching;
pub mod node;
pub mod notification;
pub mod pending;
pub mod platform;
pub mod service;
pub mod simulator;
pub mod tree_walker;
pub mod uri;

pub use error::{AutofillError, Result};
pub use service::{AutofillService, EventKind, EventOutcome, ForegroundEvent, SkipReason};
