//! Explicit event-name → handler registry.
//!
//! Names are normalized before lookup: case is ignored and the delimiters
//! `.`, `-` and `_` are dropped, so `user.registered`, `User-Registered` and
//! `user_registered` all resolve to the same handler.

use std::collections::HashMap;

const DELIMITERS: [char; 3] = ['.', '-', '_'];

/// Normalized lookup key for an event name.
pub fn handler_key(event_name: &str) -> String {
    event_name
        .chars()
        .filter(|c| !DELIMITERS.contains(c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Conventional handler name for an event, used in diagnostics.
///
/// `user.registered` → `apply_user_registered`.
pub fn handler_name(event_name: &str) -> String {
    let snake: String = event_name
        .chars()
        .map(|c| if DELIMITERS.contains(&c) { '_' } else { c })
        .flat_map(char::to_lowercase)
        .collect();
    format!("apply_{snake}")
}

/// Maps event names to handler functions.
///
/// `H` is normally a function pointer such as
/// `fn(&mut Account, &DomainEvent) -> Result<()>`.
#[derive(Debug, Clone)]
pub struct HandlerRegistry<H> {
    handlers: HashMap<String, H>,
}

impl<H: Copy> HandlerRegistry<H> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers `handler` for `event_name`, replacing any handler whose name
    /// normalizes to the same key.
    pub fn on(mut self, event_name: &str, handler: H) -> Self {
        self.handlers.insert(handler_key(event_name), handler);
        self
    }

    pub fn get(&self, event_name: &str) -> Option<H> {
        self.handlers.get(&handler_key(event_name)).copied()
    }

    pub fn handles(&self, event_name: &str) -> bool {
        self.handlers.contains_key(&handler_key(event_name))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<H: Copy> Default for HandlerRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}
