//! Routing-key based event dispatcher.

use std::sync::Arc;

use event_store::DomainEvent;

use crate::listener::{HandlesEvent, Listener, ListenerFn, ListenerResolver};
use crate::router::RoutingPattern;
use crate::{DispatchError, Result};

#[derive(Clone)]
enum Resolved {
    Closure(Arc<ListenerFn>),
    Handler(Arc<dyn HandlesEvent>),
}

impl Resolved {
    fn replays_events(&self) -> bool {
        match self {
            Self::Closure(_) => false,
            Self::Handler(handler) => handler.replays_events(),
        }
    }

    fn invoke(&self, event_name: &str, event: &DomainEvent) -> Result<()> {
        match self {
            Self::Closure(f) => f(event_name, event),
            Self::Handler(handler) => handler.handle(event_name, event),
        }
    }
}

struct Route {
    routing_key: String,
    pattern: RoutingPattern,
    listeners: Vec<Resolved>,
}

/// Delivers events to listeners subscribed under matching routing keys.
///
/// Routing keys are kept in registration order, as are the listeners under
/// each key. Delivery stops at the first listener error, which is returned
/// to the caller.
#[derive(Default)]
pub struct EventDispatcher {
    routes: Vec<Route>,
    resolver: Option<Arc<dyn ListenerResolver>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a dispatcher that resolves [`Listener::Named`] through `resolver`.
    pub fn with_resolver(resolver: Arc<dyn ListenerResolver>) -> Self {
        Self {
            routes: Vec::new(),
            resolver: Some(resolver),
        }
    }

    /// Registers a listener under `routing_key`.
    ///
    /// Named listeners are resolved immediately; an unknown name, or a name
    /// with no resolver configured, fails with
    /// [`DispatchError::ListenerNotResolvable`].
    pub fn listen(&mut self, routing_key: impl Into<String>, listener: Listener) -> Result<&mut Self> {
        let resolved = self.make_listener(listener)?;
        let routing_key = routing_key.into();

        match self.routes.iter_mut().find(|r| r.routing_key == routing_key) {
            Some(route) => route.listeners.push(resolved),
            None => self.routes.push(Route {
                pattern: RoutingPattern::parse(&routing_key),
                routing_key,
                listeners: vec![resolved],
            }),
        }
        Ok(self)
    }

    /// Registers several listeners under the same routing key.
    pub fn listen_many(
        &mut self,
        routing_key: impl Into<String>,
        listeners: impl IntoIterator<Item = Listener>,
    ) -> Result<&mut Self> {
        let routing_key = routing_key.into();
        for listener in listeners {
            self.listen(routing_key.clone(), listener)?;
        }
        Ok(self)
    }

    fn make_listener(&self, listener: Listener) -> Result<Resolved> {
        match listener {
            Listener::Closure(f) => Ok(Resolved::Closure(f)),
            Listener::Handler(handler) => Ok(Resolved::Handler(handler)),
            Listener::Named(name) => {
                let resolver = self
                    .resolver
                    .as_ref()
                    .ok_or_else(|| DispatchError::ListenerNotResolvable(name.clone()))?;
                Ok(Resolved::Handler(resolver.resolve(&name)?))
            }
        }
    }

    /// Delivers `event` to every listener whose routing key matches its name.
    ///
    /// Returns the number of listeners invoked.
    pub fn dispatch(&self, event: &DomainEvent) -> Result<usize> {
        let delivered = self.deliver(event, false)?;
        metrics::counter!("event_bus_events_dispatched").increment(1);
        Ok(delivered)
    }

    /// Like [`dispatch`](Self::dispatch), but only replay-safe listeners
    /// (projectors) are invoked.
    pub fn replay(&self, event: &DomainEvent) -> Result<usize> {
        let delivered = self.deliver(event, true)?;
        metrics::counter!("event_bus_events_replayed").increment(1);
        Ok(delivered)
    }

    fn deliver(&self, event: &DomainEvent, replaying: bool) -> Result<usize> {
        let event_name = Self::event_name(event)?;
        let mut delivered = 0;

        for route in self.routes.iter().filter(|r| r.pattern.matches(event_name)) {
            for listener in &route.listeners {
                if replaying && !listener.replays_events() {
                    continue;
                }
                tracing::debug!(
                    event_name,
                    routing_key = %route.routing_key,
                    replaying,
                    "delivering event"
                );
                listener.invoke(event_name, event)?;
                delivered += 1;
            }
        }

        Ok(delivered)
    }

    /// The topic name an event is routed by.
    pub fn event_name(event: &DomainEvent) -> Result<&str> {
        let name = event.name();
        if name.trim().is_empty() {
            return Err(DispatchError::EventNameUndefined);
        }
        Ok(name)
    }

    /// Whether `routing_key` would receive `event_name`.
    pub fn matches(&self, routing_key: &str, event_name: &str) -> bool {
        RoutingPattern::parse(routing_key).matches(event_name)
    }

    /// Whether any listener would receive `event_name` on live dispatch.
    pub fn has_listeners(&self, event_name: &str) -> bool {
        self.routes
            .iter()
            .any(|r| !r.listeners.is_empty() && r.pattern.matches(event_name))
    }

    pub fn listener_count(&self) -> usize {
        self.routes.iter().map(|r| r.listeners.len()).sum()
    }
}
