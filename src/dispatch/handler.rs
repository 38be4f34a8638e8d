//! Handlers and their calling convention.
//!
//! A handler may take no input, the [`Context`], a body decoded into a data
//! type, or both, and may return nothing, a single value that is either data
//! or an error, or a data/error pair. Every handler is classified into exactly
//! one [`InputShape`] and one [`OutputShape`] when it is registered; calls
//! never inspect the handler again.
//!
//! Typed closures get their shape from [`IntoHandler`]:
//!
//! ```
//! use dispatch_rs::{Api, ApiError, Context, Json};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Greeting {
//!     name: String,
//! }
//!
//! let mut api = Api::new();
//! api.add_endpoint("GET/ping", || "pong").unwrap();
//! api.add_endpoint("GET/teapot", || ApiError::new(418, "I'm a teapot")).unwrap();
//! api.add_endpoint("POST/greet/{lang}", |ctx: Context, Json(body): Json<Greeting>| {
//!     let lang = ctx.path_var("lang").unwrap_or("en").to_string();
//!     Ok::<_, ApiError>(format!("[{lang}] hello {}", body.name))
//! })
//! .unwrap();
//! ```
//!
//! Strings, booleans, numbers, `Vec`s of serializable items and
//! [`serde_json::Value`] are returned as data directly. Any other
//! serializable type is returned by wrapping it in [`Json`], e.g.
//! `Json(user)` or `Ok::<_, Error>(Json(user))`. `Result<(), E>` is a handler
//! that yields no data unless it fails.
//!
//! Handlers whose shape is only known at run time are declared with a
//! [`DynamicHandler`], which is validated once at registration.

use std::fmt;

use log::error;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::dispatch::context::Context;
use crate::dispatch::error::{ApiError, Error};
use crate::dispatch::pattern::RoutePattern;

/// The normalized outcome of a call: data (possibly absent) or an error.
pub type CallResult = Result<Option<Value>, Error>;

/// Which inputs a handler takes, in declared order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputShape {
    Nothing,
    Context,
    Data,
    ContextThenData,
    DataThenContext,
}

/// What a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    Nothing,
    /// One value that is either data or an error.
    DataOrError,
    /// Data first, then an optional error.
    DataAndError,
}

/// Handler input decoded from the request body as JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

/// A single value returned by a handler.
#[derive(Debug)]
pub enum Returned {
    Nil,
    Data(Value),
    Error(Error),
}

/// Everything a handler returned, before normalization.
#[derive(Debug)]
pub enum Outcome {
    Empty,
    Single(Returned),
    Pair(Option<Value>, Option<Error>),
    /// The handler broke its declared calling convention.
    Invalid(String),
}

fn non_null(value: Value) -> Option<Value> {
    (!value.is_null()).then_some(value)
}

impl Outcome {
    /// Build an outcome from a dynamic result list.
    ///
    /// The first of two values is always taken as data; the second must be
    /// nil or an error.
    pub fn from_results(values: Vec<Returned>, declared: usize) -> Self {
        if values.len() != declared {
            return Outcome::Invalid(format!(
                "returned {len} values but declared {declared}",
                len = values.len()
            ));
        }

        let mut values = values.into_iter();
        match (values.next(), values.next(), values.next()) {
            (None, _, _) => Outcome::Empty,
            (Some(only), None, _) => Outcome::Single(only),
            (Some(first), Some(second), None) => {
                let data = match first {
                    Returned::Nil => None,
                    Returned::Data(value) => non_null(value),
                    Returned::Error(err) => Some(Value::String(err.to_string())),
                };
                match second {
                    Returned::Nil => Outcome::Pair(data, None),
                    Returned::Error(err) => Outcome::Pair(data, Some(err)),
                    Returned::Data(_) => {
                        Outcome::Invalid("returned data where an error was expected".to_string())
                    }
                }
            }
            (Some(_), Some(_), Some(_)) => Outcome::Invalid("returned too many values".to_string()),
        }
    }

    pub(crate) fn normalize(self, pattern: &RoutePattern) -> CallResult {
        match self {
            Outcome::Empty | Outcome::Single(Returned::Nil) => Ok(None),
            Outcome::Single(Returned::Data(value)) => Ok(non_null(value)),
            Outcome::Single(Returned::Error(err)) => Err(err),
            Outcome::Pair(_, Some(err)) => Err(err),
            Outcome::Pair(data, None) => Ok(data.and_then(non_null)),
            Outcome::Invalid(reason) => {
                error!("Handler {pattern} {reason}");
                Err(Error::Internal)
            }
        }
    }
}

/// Conversion of a single returned value.
pub trait IntoReturned {
    fn into_returned(self) -> Returned;
}

impl IntoReturned for Returned {
    fn into_returned(self) -> Returned {
        self
    }
}

impl IntoReturned for () {
    fn into_returned(self) -> Returned {
        Returned::Nil
    }
}

impl IntoReturned for Error {
    fn into_returned(self) -> Returned {
        Returned::Error(self)
    }
}

impl IntoReturned for ApiError {
    fn into_returned(self) -> Returned {
        Returned::Error(self.into())
    }
}

impl IntoReturned for Value {
    fn into_returned(self) -> Returned {
        match non_null(self) {
            Some(value) => Returned::Data(value),
            None => Returned::Nil,
        }
    }
}

impl<T: Serialize> IntoReturned for Json<T> {
    fn into_returned(self) -> Returned {
        match serde_json::to_value(&self.0) {
            Ok(value) => value.into_returned(),
            Err(err) => {
                error!("Failed to serialize handler result: {err}");
                Returned::Error(Error::Internal)
            }
        }
    }
}

impl<R: IntoReturned> IntoReturned for Option<R> {
    fn into_returned(self) -> Returned {
        self.map_or(Returned::Nil, IntoReturned::into_returned)
    }
}

macro_rules! returned_as_data {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoReturned for $ty {
                fn into_returned(self) -> Returned {
                    Returned::Data(Value::from(self))
                }
            }
        )*
    };
}

returned_as_data!(
    String,
    &'static str,
    bool,
    i8,
    i16,
    i32,
    i64,
    isize,
    u8,
    u16,
    u32,
    u64,
    usize,
    f32,
    f64,
);

impl<T: Serialize> IntoReturned for Vec<T> {
    fn into_returned(self) -> Returned {
        Json(self).into_returned()
    }
}

/// Conversion of everything a handler returns.
pub trait IntoOutcome {
    const SHAPE: OutputShape;

    fn into_outcome(self) -> Outcome;
}

impl IntoOutcome for () {
    const SHAPE: OutputShape = OutputShape::Nothing;

    fn into_outcome(self) -> Outcome {
        Outcome::Empty
    }
}

impl<T: IntoReturned, E: Into<Error>> IntoOutcome for Result<T, E> {
    const SHAPE: OutputShape = OutputShape::DataAndError;

    fn into_outcome(self) -> Outcome {
        match self.map(IntoReturned::into_returned) {
            Ok(Returned::Nil) => Outcome::Pair(None, None),
            Ok(Returned::Data(value)) => Outcome::Pair(Some(value), None),
            Ok(Returned::Error(err)) => Outcome::Pair(None, Some(err)),
            Err(err) => Outcome::Pair(None, Some(err.into())),
        }
    }
}

macro_rules! single_value_outcome {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoOutcome for $ty {
                const SHAPE: OutputShape = OutputShape::DataOrError;

                fn into_outcome(self) -> Outcome {
                    Outcome::Single(self.into_returned())
                }
            }
        )*
    };
}

single_value_outcome!(
    Returned,
    Error,
    ApiError,
    Value,
    String,
    &'static str,
    bool,
    i8,
    i16,
    i32,
    i64,
    isize,
    u8,
    u16,
    u32,
    u64,
    usize,
    f32,
    f64,
);

impl<T: Serialize> IntoOutcome for Json<T> {
    const SHAPE: OutputShape = OutputShape::DataOrError;

    fn into_outcome(self) -> Outcome {
        Outcome::Single(self.into_returned())
    }
}

impl<T: Serialize> IntoOutcome for Vec<T> {
    const SHAPE: OutputShape = OutputShape::DataOrError;

    fn into_outcome(self) -> Outcome {
        Outcome::Single(self.into_returned())
    }
}

impl<R: IntoReturned> IntoOutcome for Option<R> {
    const SHAPE: OutputShape = OutputShape::DataOrError;

    fn into_outcome(self) -> Outcome {
        Outcome::Single(self.into_returned())
    }
}

type Invoke = Box<dyn Fn(Context, &[u8]) -> Result<Outcome, Error> + Send + Sync>;

enum Kind {
    Ready {
        input: InputShape,
        output: OutputShape,
        invoke: Invoke,
    },
    Misconfigured(String),
}

/// A handler classified into its calling convention.
pub struct Handler {
    kind: Kind,
}

impl Handler {
    /// Build a handler from an already-erased invocation.
    ///
    /// `invoke` receives the call's context and raw body; a returned error is
    /// surfaced to the caller unchanged.
    pub fn new<F>(input: InputShape, output: OutputShape, invoke: F) -> Self
    where
        F: Fn(Context, &[u8]) -> Result<Outcome, Error> + Send + Sync + 'static,
    {
        Self {
            kind: Kind::Ready {
                input,
                output,
                invoke: Box::new(invoke),
            },
        }
    }

    /// A handler that can never be called; every call ends in `Error::Internal`.
    pub fn misconfigured(reason: impl Into<String>) -> Self {
        Self {
            kind: Kind::Misconfigured(reason.into()),
        }
    }

    pub fn shape(&self) -> Option<(InputShape, OutputShape)> {
        match &self.kind {
            Kind::Ready { input, output, .. } => Some((*input, *output)),
            Kind::Misconfigured(_) => None,
        }
    }

    /// Why the handler cannot be called, if it cannot.
    pub fn fault(&self) -> Option<&str> {
        match &self.kind {
            Kind::Misconfigured(reason) => Some(reason.as_str()),
            Kind::Ready { .. } => None,
        }
    }

    pub(crate) fn invoke(&self, pattern: &RoutePattern, ctx: Context, body: &[u8]) -> CallResult {
        match &self.kind {
            Kind::Ready { invoke, .. } => invoke(ctx, body)?.normalize(pattern),
            Kind::Misconfigured(reason) => {
                error!("Handler {pattern} {reason}");
                Err(Error::Internal)
            }
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Ready { input, output, .. } => f
                .debug_struct("Handler")
                .field("input", input)
                .field("output", output)
                .finish(),
            Kind::Misconfigured(reason) => f.debug_tuple("Misconfigured").field(reason).finish(),
        }
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, Error> {
    Ok(serde_json::from_slice(body)?)
}

/// Conversion of a callable into a classified [`Handler`].
///
/// `Args` only disambiguates the implementations; it is inferred.
pub trait IntoHandler<Args> {
    fn into_handler(self) -> Handler;
}

impl IntoHandler<Handler> for Handler {
    fn into_handler(self) -> Handler {
        self
    }
}

impl<F, R> IntoHandler<()> for F
where
    F: Fn() -> R + Send + Sync + 'static,
    R: IntoOutcome + 'static,
{
    fn into_handler(self) -> Handler {
        Handler::new(InputShape::Nothing, R::SHAPE, move |_ctx, _body| {
            Ok(self().into_outcome())
        })
    }
}

impl<F, R> IntoHandler<(Context,)> for F
where
    F: Fn(Context) -> R + Send + Sync + 'static,
    R: IntoOutcome + 'static,
{
    fn into_handler(self) -> Handler {
        Handler::new(InputShape::Context, R::SHAPE, move |ctx, _body| {
            Ok(self(ctx).into_outcome())
        })
    }
}

impl<F, T, R> IntoHandler<(Json<T>,)> for F
where
    F: Fn(Json<T>) -> R + Send + Sync + 'static,
    T: DeserializeOwned + 'static,
    R: IntoOutcome + 'static,
{
    fn into_handler(self) -> Handler {
        Handler::new(InputShape::Data, R::SHAPE, move |_ctx, body| {
            Ok(self(Json(decode(body)?)).into_outcome())
        })
    }
}

impl<F, T, R> IntoHandler<(Context, Json<T>)> for F
where
    F: Fn(Context, Json<T>) -> R + Send + Sync + 'static,
    T: DeserializeOwned + 'static,
    R: IntoOutcome + 'static,
{
    fn into_handler(self) -> Handler {
        Handler::new(InputShape::ContextThenData, R::SHAPE, move |ctx, body| {
            Ok(self(ctx, Json(decode(body)?)).into_outcome())
        })
    }
}

impl<F, T, R> IntoHandler<(Json<T>, Context)> for F
where
    F: Fn(Json<T>, Context) -> R + Send + Sync + 'static,
    T: DeserializeOwned + 'static,
    R: IntoOutcome + 'static,
{
    fn into_handler(self) -> Handler {
        Handler::new(InputShape::DataThenContext, R::SHAPE, move |ctx, body| {
            Ok(self(Json(decode(body)?), ctx).into_outcome())
        })
    }
}

/// A declared parameter of a [`DynamicHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Context,
    /// The request body, decoded as a JSON value.
    Data,
}

/// An argument passed to a [`DynamicHandler`].
#[derive(Debug, Clone)]
pub enum Arg {
    Context(Context),
    Data(Value),
}

/// A handler whose parameter list and result count are declared at run time.
///
/// The declaration is checked when the handler is registered. An invalid
/// declaration still registers, but every call to it ends in
/// `Error::Internal`.
pub struct DynamicHandler {
    params: Vec<Param>,
    results: usize,
    func: Box<dyn Fn(Vec<Arg>) -> Vec<Returned> + Send + Sync>,
}

impl DynamicHandler {
    pub fn new<F>(params: impl IntoIterator<Item = Param>, results: usize, func: F) -> Self
    where
        F: Fn(Vec<Arg>) -> Vec<Returned> + Send + Sync + 'static,
    {
        Self {
            params: params.into_iter().collect(),
            results,
            func: Box::new(func),
        }
    }

    /// Classify the declaration, or explain why it cannot be called.
    pub fn classify(&self) -> Result<(InputShape, OutputShape), String> {
        let input = match self.params.as_slice() {
            [] => InputShape::Nothing,
            [Param::Context] => InputShape::Context,
            [Param::Data] => InputShape::Data,
            [Param::Context, Param::Data] => InputShape::ContextThenData,
            [Param::Data, Param::Context] => InputShape::DataThenContext,
            [Param::Context, Param::Context] => {
                return Err("takes multiple context inputs".to_string())
            }
            [Param::Data, Param::Data] => return Err("takes multiple inputs".to_string()),
            _ => return Err("takes too many args".to_string()),
        };
        let output = match self.results {
            0 => OutputShape::Nothing,
            1 => OutputShape::DataOrError,
            2 => OutputShape::DataAndError,
            _ => return Err("returns too many values".to_string()),
        };
        Ok((input, output))
    }
}

impl IntoHandler<DynamicHandler> for DynamicHandler {
    fn into_handler(self) -> Handler {
        let (input, output) = match self.classify() {
            Ok(shape) => shape,
            Err(reason) => return Handler::misconfigured(reason),
        };

        let DynamicHandler {
            params,
            results,
            func,
        } = self;
        Handler::new(input, output, move |ctx, body| {
            let mut args = Vec::with_capacity(params.len());
            for param in &params {
                args.push(match param {
                    Param::Context => Arg::Context(ctx.clone()),
                    Param::Data => Arg::Data(decode(body)?),
                });
            }
            Ok(Outcome::from_results(func(args), results))
        })
    }
}
