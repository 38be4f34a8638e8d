//! The endpoint registry and the dispatch entry point.

use std::cell::Cell;

use log::{debug, error, warn};

use crate::dispatch::context::Context;
use crate::dispatch::endpoint::{Endpoint, EndpointInput};
use crate::dispatch::error::{Error, PatternError};
use crate::dispatch::handler::{CallResult, IntoHandler};
use crate::dispatch::pattern::{PathVars, RoutePattern};
use crate::dispatch::recover::guarded;

/// Holds all endpoints of an API and dispatches calls to them.
///
/// Registration takes `&mut self` and calls take `&self`, so once an `Api` is
/// shared between threads (for example behind an `Arc`) it is frozen.
#[derive(Debug, Default)]
pub struct Api {
    endpoints: Vec<Endpoint>,
}

impl Api {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `pattern`, e.g. `GET/user/{id}`.
    ///
    /// Endpoints are matched in registration order and the first match wins,
    /// so more specific patterns must be registered before overlapping,
    /// more general ones. Duplicates are allowed.
    pub fn add_endpoint<H, Args>(&mut self, pattern: &str, handler: H) -> Result<&mut Endpoint, PatternError>
    where
        H: IntoHandler<Args>,
    {
        let pattern: RoutePattern = pattern.parse()?;
        let handler = handler.into_handler();
        if let Some(fault) = handler.fault() {
            warn!("Handler {pattern} {fault}; calls to it will fail");
        }

        self.endpoints.push(Endpoint::new(pattern, handler));
        let index = self.endpoints.len() - 1;
        Ok(&mut self.endpoints[index])
    }

    /// All endpoints, in registration order.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Find the first endpoint matching `method` and `path`.
    pub fn match_endpoint(&self, method: &str, path: &str) -> Option<(&Endpoint, PathVars)> {
        self.endpoints.iter().find_map(|endpoint| {
            endpoint
                .pattern()
                .match_route(method, path)
                .map(|vars| (endpoint, vars))
        })
    }

    /// The methods registered for `path`, in registration order.
    ///
    /// A path registered twice for the same method lists that method twice.
    pub fn methods_for_path(&self, path: &str) -> Vec<&str> {
        self.endpoints
            .iter()
            .filter(|endpoint| endpoint.pattern().match_path(path))
            .map(|endpoint| endpoint.pattern().method())
            .collect()
    }

    /// Dispatch one call and return its normalized result.
    ///
    /// A panic raised anywhere during the call is caught, logged with the
    /// matched endpoint's pattern and the panicking stack, and turned into
    /// [`Error::Internal`].
    pub fn call(&self, ctx: Context, method: &str, path: &str, body: &[u8]) -> CallResult {
        let matched = Cell::new(None);
        match guarded(|| self.dispatch(&matched, ctx, method, path, body)) {
            Ok(result) => result,
            Err(panic) => {
                let endpoint = matched
                    .get()
                    .map_or_else(|| "<unmatched>".to_string(), |pattern: &RoutePattern| pattern.to_string());
                error!(
                    "API call panic in {endpoint} on {method} {path} at {location}: {message}\n{backtrace}",
                    location = panic.location.as_deref().unwrap_or("<unknown>"),
                    message = panic.message,
                    backtrace = panic.backtrace
                );
                Err(Error::Internal)
            }
        }
    }

    fn dispatch<'a>(
        &'a self,
        matched: &Cell<Option<&'a RoutePattern>>,
        ctx: Context,
        method: &str,
        path: &str,
        body: &[u8],
    ) -> CallResult {
        let (endpoint, vars) = self.match_endpoint(method, path).ok_or(Error::NotFound)?;
        matched.set(Some(endpoint.pattern()));
        debug!("Dispatching {method} {path} to {pattern}", pattern = endpoint.pattern());

        let input = endpoint.run_hooks(EndpointInput {
            method: method.to_string(),
            path: path.to_string(),
            context: ctx.with_path_vars(vars),
            body: body.to_vec(),
        })?;

        endpoint
            .handler()
            .invoke(endpoint.pattern(), input.context, &input.body)
    }
}
