//! Endpoints and the middleware hooks that run before their handler.

use std::fmt;
use std::sync::Arc;

use crate::dispatch::context::Context;
use crate::dispatch::error::Error;
use crate::dispatch::handler::Handler;
use crate::dispatch::pattern::RoutePattern;

/// The inputs of a call as seen by middleware hooks.
#[derive(Debug, Clone)]
pub struct EndpointInput {
    pub method: String,
    pub path: String,
    pub context: Context,
    /// The raw request body.
    pub body: Vec<u8>,
}

/// A middleware hook: continue with a replacement input, or abort with an error.
pub type Hook = Arc<dyn Fn(EndpointInput) -> Result<EndpointInput, Error> + Send + Sync>;

/// A registered route: pattern, handler and middleware chain.
pub struct Endpoint {
    pattern: RoutePattern,
    handler: Handler,
    hooks: Vec<Hook>,
}

impl Endpoint {
    pub(crate) fn new(pattern: RoutePattern, handler: Handler) -> Self {
        Self {
            pattern,
            handler,
            hooks: Vec::new(),
        }
    }

    /// Append a hook to this endpoint's middleware chain.
    pub fn with_hook<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(EndpointInput) -> Result<EndpointInput, Error> + Send + Sync + 'static,
    {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn hooks(&self) -> &[Hook] {
        &self.hooks
    }

    /// Run the middleware chain in order, stopping at the first abort.
    pub(crate) fn run_hooks(&self, mut input: EndpointInput) -> Result<EndpointInput, Error> {
        for hook in &self.hooks {
            input = hook(input)?;
        }
        Ok(input)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("pattern", &self.pattern.to_string())
            .field("handler", &self.handler)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
