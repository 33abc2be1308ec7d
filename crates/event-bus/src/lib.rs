//! Event routing and delivery.
//!
//! Listeners subscribe under routing keys (`order.*`, `!payment.*`,
//! `order.placed`, `*.*`) and receive every event whose name matches.
//! Reactors and projectors map event names to handler functions through an
//! explicit [`HandlerRegistry`]; only projectors take part in replay.

pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod listener;
pub mod router;

pub use dispatcher::EventDispatcher;
pub use error::{DispatchError, Result};
pub use handler::{HandlerRegistry, handler_key, handler_name};
pub use listener::{
    HandlesEvent, Listener, ListenerFn, ListenerRegistry, ListenerResolver, Projector, Reactor,
    ReactorHandler, ReactorHandlers,
};
pub use router::{EventRouter, RoutingPattern};
