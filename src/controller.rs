//! Controllers: named groups of actions with declared signatures.
//!
//! Actions do not receive the request. They declare their parameters up
//! front, and the framework binds request parameters to positional
//! arguments from that declaration:
//!
//! ```rust,no_run
//! use waylay::controller::{Args, Controller, Param, Signature};
//! use waylay::{HandlerError, Method};
//!
//! async fn greet(args: Args) -> Result<Option<String>, HandlerError> {
//!     Ok(args.text("name").map(|n| format!("hello {n}")))
//! }
//!
//! let users = Controller::new("app::controller::Users", "/users")
//!     .action(Method::Get, "/greet", "greet",
//!             Signature::new().param(Param::text("name").required()), greet);
//! ```
//!
//! The declaration doubles as handler metadata: interceptors query it
//! through a [`Registry`] rather than by inspecting the action.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::error::InstrumentationError;
use crate::handler::{Action, BoxFuture, BoxedAction, BoxedHandler, ErasedHandler};
use crate::method::Method;
use crate::middleware::{Completion, Interceptor, Invocation, Next, Outcome, Selector};
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

// ── HandlerId ─────────────────────────────────────────────────────────────────

/// Identity of an action: its declaring controller type and its own name.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct HandlerId {
    type_name: Arc<str>,
    method: Arc<str>,
}

impl HandlerId {
    pub fn new(type_name: impl Into<Arc<str>>, method: impl Into<Arc<str>>) -> Self {
        Self { type_name: type_name.into(), method: method.into() }
    }

    /// Fully qualified controller type, e.g. `demo::controller::LoginController`.
    pub fn type_name(&self) -> &str { &self.type_name }

    /// The action's simple name, e.g. `login2`.
    pub fn method(&self) -> &str { &self.method }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.method)
    }
}

// ── Parameters ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParamKind {
    Text,
    Int,
    Bool,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Int  => "an integer",
            Self::Bool => "a boolean",
        })
    }
}

/// One declared action parameter.
#[derive(Clone, Debug)]
pub struct Param {
    name: String,
    kind: ParamKind,
    required: bool,
}

impl Param {
    pub fn text(name: impl Into<String>) -> Self {
        Self::of(name, ParamKind::Text)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::of(name, ParamKind::Int)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::of(name, ParamKind::Bool)
    }

    fn of(name: impl Into<String>, kind: ParamKind) -> Self {
        Self { name: name.into(), kind, required: false }
    }

    /// Calls with this parameter absent or blank are rejected before the
    /// action runs (when a [`RequestInterceptor`](crate::middleware::RequestInterceptor)
    /// wraps it).
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn kind(&self) -> ParamKind { self.kind }
    pub fn is_required(&self) -> bool { self.required }
}

/// The ordered parameter declaration of an action.
#[derive(Clone, Debug, Default)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Binds request parameters to positional arguments.
    ///
    /// Absent parameters bind as `None`; values that do not parse as the
    /// declared kind fail the whole binding.
    pub fn bind(&self, req: &Request) -> Result<Args, BindError> {
        let mut args = Args::new();
        for param in &self.params {
            let value = match req.query(&param.name) {
                None => None,
                Some(raw) => Some(parse(param, raw)?),
            };
            args = args.with(param.name.clone(), value);
        }
        Ok(args)
    }
}

fn parse(param: &Param, raw: &str) -> Result<Arg, BindError> {
    let mismatch = || BindError {
        name: param.name.clone(),
        kind: param.kind,
        value: raw.to_owned(),
    };
    match param.kind {
        ParamKind::Text => Ok(Arg::Text(raw.to_owned())),
        ParamKind::Int => raw.trim().parse().map(Arg::Int).map_err(|_| mismatch()),
        ParamKind::Bool => raw.trim().parse().map(Arg::Bool).map_err(|_| mismatch()),
    }
}

/// A request parameter that does not parse as its declared kind.
#[derive(Debug, Error)]
#[error("parameter {name} expects {kind}, value given: {value}")]
pub struct BindError {
    name: String,
    kind: ParamKind,
    value: String,
}

// ── Arguments ─────────────────────────────────────────────────────────────────

/// A bound argument value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Arg {
    Text(String),
    Int(i64),
    Bool(bool),
}

impl Arg {
    /// Absent-or-blank test used by required parameters: only text can be
    /// blank.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::Int(_) | Self::Bool(_) => false,
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Positional arguments of one invocation, each tagged with its parameter
/// name.
#[derive(Clone, Debug, Default)]
pub struct Args {
    slots: Vec<(String, Option<Arg>)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the next positional argument.
    pub fn with(mut self, name: impl Into<String>, value: Option<Arg>) -> Self {
        self.slots.push((name.into(), value));
        self
    }

    pub fn len(&self) -> usize { self.slots.len() }
    pub fn is_empty(&self) -> bool { self.slots.is_empty() }

    /// The argument at `index`, `None` when absent or out of range.
    pub fn get(&self, index: usize) -> Option<&Arg> {
        self.slots.get(index).and_then(|(_, v)| v.as_ref())
    }

    pub fn by_name(&self, name: &str) -> Option<&Arg> {
        self.slots.iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_ref())
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.by_name(name)? {
            Arg::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.by_name(name)? {
            Arg::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.by_name(name)? {
            Arg::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The positional values as a JSON array, absent values as `null`.
    pub fn to_json(&self) -> String {
        let values: Vec<Option<&Arg>> = self.slots.iter().map(|(_, v)| v.as_ref()).collect();
        serde_json::to_string(&values).unwrap_or_default()
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Read-only lookup of declared signatures.
pub trait Registry: Send + Sync {
    fn signature(&self, id: &HandlerId) -> Result<Arc<Signature>, InstrumentationError>;
}

/// The signatures of one mounted controller.
#[derive(Debug, Default)]
pub struct Catalog {
    signatures: HashMap<HandlerId, Arc<Signature>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: HandlerId, signature: impl Into<Arc<Signature>>) -> Self {
        self.signatures.insert(id, signature.into());
        self
    }
}

impl Registry for Catalog {
    fn signature(&self, id: &HandlerId) -> Result<Arc<Signature>, InstrumentationError> {
        self.signatures.get(id)
            .cloned()
            .ok_or_else(|| InstrumentationError::UnknownHandler(id.clone()))
    }
}

// ── Controller ────────────────────────────────────────────────────────────────

struct ActionRoute {
    method: Method,
    path: String,
    id: HandlerId,
    signature: Arc<Signature>,
    action: BoxedAction,
}

/// A controller type: a base path and the actions mounted below it.
pub struct Controller {
    type_name: Arc<str>,
    base: String,
    actions: Vec<ActionRoute>,
}

impl Controller {
    /// `type_name` is the fully qualified name interceptor selectors match
    /// against; `base` prefixes every action path.
    pub fn new(type_name: impl Into<Arc<str>>, base: impl Into<String>) -> Self {
        Self { type_name: type_name.into(), base: base.into(), actions: Vec::new() }
    }

    /// Declare an action. `name` is its simple name in logs and selectors.
    pub fn action(
        mut self,
        method: Method,
        path: &str,
        name: &str,
        signature: Signature,
        action: impl Action,
    ) -> Self {
        self.actions.push(ActionRoute {
            method,
            path: format!("{}{}", self.base, path),
            id: HandlerId::new(Arc::clone(&self.type_name), name),
            signature: Arc::new(signature),
            action: action.into_boxed_action(),
        });
        self
    }

    /// Wraps every action in the matching interceptors and returns the
    /// routes to register.
    pub(crate) fn into_endpoints(
        self,
        interceptors: &[(Selector, Arc<dyn Interceptor>)],
    ) -> Vec<(Method, String, BoxedHandler)> {
        let catalog = self.actions.iter()
            .fold(Catalog::new(), |c, a| c.with(a.id.clone(), Arc::clone(&a.signature)));
        let registry: Arc<dyn Registry> = Arc::new(catalog);

        self.actions.into_iter()
            .map(|a| {
                let chain: Vec<Arc<dyn Interceptor>> = interceptors.iter()
                    .filter(|(sel, _)| sel.matches(&a.id))
                    .map(|(_, i)| Arc::clone(i))
                    .collect();
                let endpoint = Endpoint {
                    route: a.path.clone(),
                    id: a.id,
                    signature: a.signature,
                    action: a.action,
                    chain: Arc::from(chain),
                    registry: Arc::clone(&registry),
                };
                let handler: BoxedHandler = Arc::new(endpoint);
                (a.method, a.path, handler)
            })
            .collect()
    }
}

// ── Endpoint ──────────────────────────────────────────────────────────────────

/// A mounted action: binds arguments, runs the chain, renders the outcome.
struct Endpoint {
    route: String,
    id: HandlerId,
    signature: Arc<Signature>,
    action: BoxedAction,
    chain: Arc<[Arc<dyn Interceptor>]>,
    registry: Arc<dyn Registry>,
}

impl ErasedHandler for Endpoint {
    fn call(&self, req: Request) -> BoxFuture<Response> {
        let args = match self.signature.bind(&req) {
            Ok(args) => args,
            Err(e) => {
                warn!(handler = %self.id, "{e}");
                return Box::pin(async move {
                    Response::builder().status(Status::BadRequest).text(e.to_string())
                });
            }
        };

        let inv = Invocation::new(self.id.clone(), args)
            .with_route(self.route.clone())
            .with_request(req)
            .with_registry(Arc::clone(&self.registry));
        let next = Next::new(Arc::clone(&self.chain), Arc::clone(&self.action));
        let id = self.id.clone();

        Box::pin(async move { render(&id, next.proceed(inv).await) })
    }
}

/// Turns an action outcome into the response sent to the client.
fn render(id: &HandlerId, outcome: Outcome) -> Response {
    match outcome {
        Ok(Completion::Returned(Some(serde_json::Value::String(s)))) => Response::text(s),
        Ok(Completion::Returned(Some(value))) => Response::json(value.to_string().into_bytes()),
        Ok(Completion::Returned(None)) => Response::status(Status::NoContent),
        Ok(Completion::Rejected(msg)) => {
            Response::builder().status(Status::BadRequest).text(msg)
        }
        Err(e) => {
            error!(handler = %id, "request failed: {e}");
            Response::builder()
                .status(Status::InternalServerError)
                .text("internal server error")
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn request(uri: &str) -> Request {
        Request::from_http(http::Request::builder().uri(uri).body(Bytes::new()).unwrap())
    }

    fn login2() -> Signature {
        Signature::new().param(Param::text("name")).param(Param::int("age"))
    }

    #[test]
    fn binds_declared_parameters_in_order() {
        let args = login2().bind(&request("/login2?age=18&name=abc&extra=1")).unwrap();

        assert_eq!(args.len(), 2);
        assert_eq!(args.get(0), Some(&Arg::Text("abc".into())));
        assert_eq!(args.get(1), Some(&Arg::Int(18)));
        assert_eq!(args.text("name"), Some("abc"));
        assert_eq!(args.int("age"), Some(18));
        assert_eq!(args.to_json(), r#"["abc",18]"#);
    }

    #[test]
    fn missing_parameters_bind_as_absent() {
        let args = login2().bind(&request("/login2")).unwrap();

        assert_eq!(args.len(), 2);
        assert_eq!(args.get(0), None);
        assert_eq!(args.to_json(), "[null,null]");
    }

    #[test]
    fn malformed_values_fail_binding() {
        let err = login2().bind(&request("/login2?age=old")).unwrap_err();

        assert_eq!(err.to_string(), "parameter age expects an integer, value given: old");
    }

    #[test]
    fn only_text_can_be_blank() {
        assert!(Arg::Text(" \t".into()).is_blank());
        assert!(Arg::Text(String::new()).is_blank());
        assert!(!Arg::Text(" a ".into()).is_blank());
        assert!(!Arg::Int(0).is_blank());
    }

    #[test]
    fn catalog_reports_unknown_handlers() {
        let known = HandlerId::new("demo::controller::LoginController", "login1");
        let catalog = Catalog::new().with(known.clone(), Signature::new());

        assert!(catalog.signature(&known).is_ok());
        let err = catalog.signature(&HandlerId::new("demo::controller::LoginController", "nope"))
            .unwrap_err();
        assert!(matches!(err, InstrumentationError::UnknownHandler(_)));
    }

    #[test]
    fn handler_id_displays_type_and_method() {
        let id = HandlerId::new("demo::controller::LoginController", "login2");

        assert_eq!(id.to_string(), "demo::controller::LoginController.login2");
        assert_eq!(id.method(), "login2");
    }
}
