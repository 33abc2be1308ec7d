//! Listener kinds, reactors/projectors, and name-based resolution.

use std::collections::HashMap;
use std::sync::Arc;

use event_store::DomainEvent;

use crate::handler::{HandlerRegistry, handler_name};
use crate::{DispatchError, Result};

/// Uniform entry point for instance listeners.
pub trait HandlesEvent: Send + Sync {
    fn handle(&self, event_name: &str, event: &DomainEvent) -> Result<()>;

    /// Whether the listener may be re-invoked while rebuilding read models.
    fn replays_events(&self) -> bool {
        false
    }
}

/// Handler signature for reactors and projectors.
pub type ReactorHandler<R> = fn(&R, &DomainEvent) -> Result<()>;

/// Handler registry of a reactor or projector.
pub type ReactorHandlers<R> = HandlerRegistry<ReactorHandler<R>>;

/// A consumer whose handlers may have side effects outside the event log.
///
/// Handlers are looked up by event name in [`Reactor::handlers`]. An event
/// with no registered handler fails with [`DispatchError::HandlerNotFound`].
pub trait Reactor: Send + Sync + Sized + 'static {
    /// Name used in diagnostics.
    const NAME: &'static str;

    fn handlers() -> &'static ReactorHandlers<Self>;

    fn handle(&self, event_name: &str, event: &DomainEvent) -> Result<()> {
        let handler =
            Self::handlers()
                .get(event_name)
                .ok_or_else(|| DispatchError::HandlerNotFound {
                    target: Self::NAME,
                    handler: handler_name(event_name),
                    event_name: event_name.to_string(),
                })?;
        handler(self, event)
    }
}

/// A reactor whose handlers only update read models, so replaying history
/// through it is safe.
pub trait Projector: Reactor {}

struct ReactorListener<R>(Arc<R>);

impl<R: Reactor> HandlesEvent for ReactorListener<R> {
    fn handle(&self, event_name: &str, event: &DomainEvent) -> Result<()> {
        self.0.handle(event_name, event)
    }
}

struct ProjectorListener<P>(Arc<P>);

impl<P: Projector> HandlesEvent for ProjectorListener<P> {
    fn handle(&self, event_name: &str, event: &DomainEvent) -> Result<()> {
        self.0.handle(event_name, event)
    }

    fn replays_events(&self) -> bool {
        true
    }
}

/// Callable listener signature.
pub type ListenerFn = dyn Fn(&str, &DomainEvent) -> Result<()> + Send + Sync;

/// Something that can be registered with the dispatcher.
#[derive(Clone)]
pub enum Listener {
    /// Invoked directly with `(event_name, event)`. Never replayed.
    Closure(Arc<ListenerFn>),
    /// Invoked through [`HandlesEvent::handle`].
    Handler(Arc<dyn HandlesEvent>),
    /// Resolved to a [`Listener::Handler`] by the dispatcher's resolver.
    Named(String),
}

impl Listener {
    pub fn closure<F>(f: F) -> Self
    where
        F: Fn(&str, &DomainEvent) -> Result<()> + Send + Sync + 'static,
    {
        Self::Closure(Arc::new(f))
    }

    pub fn handler(handler: Arc<dyn HandlesEvent>) -> Self {
        Self::Handler(handler)
    }

    /// Registers a reactor. It is skipped during replay.
    pub fn reactor<R: Reactor>(reactor: Arc<R>) -> Self {
        Self::Handler(Arc::new(ReactorListener(reactor)))
    }

    /// Registers a projector. It receives replayed events.
    pub fn projector<P: Projector>(projector: Arc<P>) -> Self {
        Self::Handler(Arc::new(ProjectorListener(projector)))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closure(_) => f.write_str("Listener::Closure"),
            Self::Handler(h) => write!(f, "Listener::Handler(replays={})", h.replays_events()),
            Self::Named(name) => write!(f, "Listener::Named({name})"),
        }
    }
}

/// Turns a listener name into an invocable instance.
pub trait ListenerResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Arc<dyn HandlesEvent>>;
}

type ListenerFactory = Box<dyn Fn() -> Arc<dyn HandlesEvent> + Send + Sync>;

/// Name → factory resolver.
#[derive(Default)]
pub struct ListenerRegistry {
    factories: HashMap<String, ListenerFactory>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory producing a fresh instance on every resolution.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn HandlesEvent> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
        self
    }

    /// Registers a shared reactor instance.
    pub fn register_reactor<R: Reactor>(&mut self, name: impl Into<String>, reactor: Arc<R>) -> &mut Self {
        self.register(name, move || {
            Arc::new(ReactorListener(Arc::clone(&reactor))) as Arc<dyn HandlesEvent>
        })
    }

    /// Registers a shared projector instance.
    pub fn register_projector<P: Projector>(
        &mut self,
        name: impl Into<String>,
        projector: Arc<P>,
    ) -> &mut Self {
        self.register(name, move || {
            Arc::new(ProjectorListener(Arc::clone(&projector))) as Arc<dyn HandlesEvent>
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl ListenerResolver for ListenerRegistry {
    fn resolve(&self, name: &str) -> Result<Arc<dyn HandlesEvent>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| DispatchError::ListenerNotResolvable(name.to_string()))
    }
}
