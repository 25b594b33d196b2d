//! Traits the embedding host application implements.
//!
//! The core never reaches for a global host singleton; every host query
//! (active document, console output, persisted settings) goes through an
//! injected trait object so the whole engine can be exercised without a
//! running host.

use std::sync::Arc;

use chrono::Local;
use colored::Colorize;

/// Host application surface consumed by the tracker.
pub trait HostApp: Send + Sync {
    /// Short host name, e.g. `"freecad"`. Used as the language tag and in
    /// the plugin identity string sent to the agent.
    fn app_name(&self) -> &str;

    /// Host version triplet (major, minor, patch).
    fn version(&self) -> (u32, u32, u32);

    /// Label of the currently open document, or `None` when no document is
    /// open.
    fn active_document_label(&self) -> Option<String>;

    /// Register a listener to be called on every document mutation. The host
    /// may deliver notifications on any thread; listeners are O(1) and
    /// non-blocking.
    fn register_mutation_listener(&self, listener: Arc<dyn MutationListener>);

    /// Remove a previously registered listener. Unknown listeners are a
    /// no-op.
    fn unregister_mutation_listener(&self, listener: &Arc<dyn MutationListener>);
}

/// User-visible message sink (the host's console panel).
pub trait Console: Send + Sync {
    fn info(&self, message: &str);
    fn notice(&self, message: &str);
    fn error(&self, message: &str);
}

/// Persisted key/value settings, namespaced per plugin.
pub trait SettingsStore: Send + Sync {
    fn get_bool(&self, namespace: &str, key: &str, default: bool) -> bool;
    fn set_bool(&self, namespace: &str, key: &str, value: bool);
}

/// Single-method callback the host invokes when the open document mutates.
pub trait MutationListener: Send + Sync {
    fn on_mutation(&self);
}

/// [`Console`] implementation that writes to stderr, for hosts without a
/// console panel of their own (and for examples/tests).
pub struct StderrConsole;

impl StderrConsole {
    fn stamp() -> String {
        format!("[{}]", Local::now().format("%H:%M:%S"))
    }
}

impl Console for StderrConsole {
    fn info(&self, message: &str) {
        eprintln!("{} {message}", Self::stamp().dimmed());
    }

    fn notice(&self, message: &str) {
        eprintln!("{} {}", Self::stamp().dimmed(), message.yellow());
    }

    fn error(&self, message: &str) {
        eprintln!("{} {}", Self::stamp().dimmed(), message.red().bold());
    }
}
