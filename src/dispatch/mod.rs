//! The dispatch core.
//!
//! This module matches a (method, path) pair to a registered endpoint, runs
//! the endpoint's middleware hooks and invokes its handler, normalizing
//! whatever the handler returns into a [`CallResult`]. It performs no I/O.

mod api;
mod context;
mod endpoint;
mod error;
mod handler;
mod pattern;
mod recover;
mod tests;

// Re-export public items
pub use api::Api;
pub use context::{Context, ContextKey};
pub use endpoint::{Endpoint, EndpointInput, Hook};
pub use error::{ApiError, Error, ErrorKind, PatternError};
pub use handler::{
    Arg, CallResult, DynamicHandler, Handler, InputShape, IntoHandler, IntoOutcome, IntoReturned, Json,
    Outcome, OutputShape, Param, Returned,
};
pub use pattern::{PathVars, RoutePattern, Segment};
