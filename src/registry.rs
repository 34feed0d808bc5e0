//! Command type to handler table.
//!
//! The table is built from the ordered `[command] implementation` identifiers in the settings.
//! Each identifier names an entry in the built-in [`CATALOGUE`]; the first identifier registered
//! for a command type wins. Lookups for unregistered types fall back to [`UnknownHandler`].

use crate::config::Settings;
use crate::handlers::abort::AbortHandler;
use crate::handlers::bias::BiasHandler;
use crate::handlers::config::ConfigHandler;
use crate::handlers::dark::DarkHandler;
use crate::handlers::get_status::GetStatusHandler;
use crate::handlers::multbias::MultbiasHandler;
use crate::handlers::multdark::MultdarkHandler;
use crate::handlers::multrun::MultrunHandler;
use crate::handlers::reboot::RebootHandler;
use crate::handlers::unknown::UnknownHandler;
use crate::handlers::CommandHandler;
use crate::network::protocol::CommandKind;
use std::collections::HashMap;
use tracing::{debug, error, info};

type HandlerFactory = fn() -> Box<dyn CommandHandler>;

/// A handler that can be named in the settings.
#[derive(Debug, Clone, Copy)]
pub struct HandlerEntry {
    /// Name used in `[command.implementation]`.
    pub identifier: &'static str,
    /// Command type served.
    pub kind: CommandKind,
    /// Builds a fresh handler per command.
    pub factory: HandlerFactory,
}

fn boxed<H: CommandHandler + Default + 'static>() -> Box<dyn CommandHandler> {
    Box::new(H::default())
}

/// Every handler the front end ships.
pub const CATALOGUE: &[HandlerEntry] = &[
    HandlerEntry {
        identifier: "liric::handlers::abort::AbortHandler",
        kind: CommandKind::Abort,
        factory: boxed::<AbortHandler>,
    },
    HandlerEntry {
        identifier: "liric::handlers::bias::BiasHandler",
        kind: CommandKind::Bias,
        factory: boxed::<BiasHandler>,
    },
    HandlerEntry {
        identifier: "liric::handlers::config::ConfigHandler",
        kind: CommandKind::Config,
        factory: boxed::<ConfigHandler>,
    },
    HandlerEntry {
        identifier: "liric::handlers::dark::DarkHandler",
        kind: CommandKind::Dark,
        factory: boxed::<DarkHandler>,
    },
    HandlerEntry {
        identifier: "liric::handlers::get_status::GetStatusHandler",
        kind: CommandKind::GetStatus,
        factory: boxed::<GetStatusHandler>,
    },
    HandlerEntry {
        identifier: "liric::handlers::multbias::MultbiasHandler",
        kind: CommandKind::Multbias,
        factory: boxed::<MultbiasHandler>,
    },
    HandlerEntry {
        identifier: "liric::handlers::multdark::MultdarkHandler",
        kind: CommandKind::Multdark,
        factory: boxed::<MultdarkHandler>,
    },
    HandlerEntry {
        identifier: "liric::handlers::multrun::MultrunHandler",
        kind: CommandKind::Multrun,
        factory: boxed::<MultrunHandler>,
    },
    HandlerEntry {
        identifier: "liric::handlers::reboot::RebootHandler",
        kind: CommandKind::Reboot,
        factory: boxed::<RebootHandler>,
    },
];

/// Looks up a catalogue entry by identifier.
pub fn catalogue_entry(identifier: &str) -> Option<&'static HandlerEntry> {
    CATALOGUE.iter().find(|entry| entry.identifier == identifier)
}

/// Handler table keyed by command type.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    handlers: HashMap<CommandKind, &'static HandlerEntry>,
}

impl CommandRegistry {
    /// An empty table. Every lookup falls back to [`UnknownHandler`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every identifier listed in the settings, in order.
    ///
    /// Unknown identifiers and second registrations for a type are logged and skipped.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut registry = Self::new();
        for identifier in settings.command_implementations() {
            match catalogue_entry(identifier) {
                Some(entry) => {
                    registry.register(entry);
                }
                None => error!(identifier, "No handler with this identifier"),
            }
        }
        info!(count = registry.handlers.len(), "Command handlers registered");
        registry
    }

    /// Returns false, leaving the table unchanged, if the type already has a handler.
    pub fn register(&mut self, entry: &'static HandlerEntry) -> bool {
        if let Some(existing) = self.handlers.get(&entry.kind) {
            error!(
                command = %entry.kind,
                existing = existing.identifier,
                rejected = entry.identifier,
                "Command type already has a handler"
            );
            return false;
        }
        debug!(command = %entry.kind, identifier = entry.identifier, "Registering handler");
        self.handlers.insert(entry.kind, entry);
        true
    }

    /// Whether `kind` has a handler.
    pub fn is_registered(&self, kind: CommandKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// A fresh handler for `kind`, or the fallback when `kind` is unknown or unregistered.
    pub fn get(&self, kind: Option<CommandKind>) -> Box<dyn CommandHandler> {
        kind.and_then(|kind| self.handlers.get(&kind))
            .map_or_else(|| boxed::<UnknownHandler>(), |entry| (entry.factory)())
    }
}
