//! Subscription pattern matching.
//!
//! A routing key is `namespace.event_id`, split on the first dot:
//!
//! | key            | matches                                          |
//! |----------------|--------------------------------------------------|
//! | `*.*`, `*`, `` | every event                                      |
//! | `user.*`       | names starting with `user.`                      |
//! | `!user.*`      | names *not* starting with `user.`                |
//! | `user.created` | exactly `user.created`                           |
//!
//! Any other shape (for example `*.created`) matches nothing. Matching is
//! case-insensitive.

/// A routing key parsed into its matching rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingPattern {
    Any,
    Namespace(String),
    NotNamespace(String),
    Exact(String),
    Never,
}

impl RoutingPattern {
    pub fn parse(routing_key: &str) -> Self {
        let (namespace, event_id) = routing_key.split_once('.').unwrap_or((routing_key, "*"));
        let namespace = if namespace.is_empty() { "*" } else { namespace };
        let event_id = if event_id.is_empty() { "*" } else { event_id };

        match (namespace, event_id) {
            ("*", "*") => Self::Any,
            ("*", _) => Self::Never,
            (ns, "*") => match ns.strip_prefix('!') {
                Some(negated) => Self::NotNamespace(negated.to_lowercase()),
                None => Self::Namespace(ns.to_lowercase()),
            },
            (ns, _) if ns.starts_with('!') => Self::Never,
            _ => Self::Exact(routing_key.to_lowercase()),
        }
    }

    pub fn matches(&self, event_name: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Namespace(ns) => in_namespace(ns, event_name),
            Self::NotNamespace(ns) => !in_namespace(ns, event_name),
            Self::Exact(name) => event_name.to_lowercase() == *name,
            Self::Never => false,
        }
    }
}

// `ns.` followed by at least one character.
fn in_namespace(namespace: &str, event_name: &str) -> bool {
    let name = event_name.to_lowercase();
    name.strip_prefix(namespace)
        .and_then(|rest| rest.strip_prefix('.'))
        .is_some_and(|rest| !rest.is_empty())
}

/// Matches routing keys against event names.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventRouter;

impl EventRouter {
    /// Returns whether `routing_key` subscribes to `event_name`.
    pub fn matches(routing_key: &str, event_name: &str) -> bool {
        RoutingPattern::parse(routing_key).matches(event_name)
    }
}
