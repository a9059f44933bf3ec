//! Interception around controller actions.
//!
//! An [`Interceptor`] wraps the invocation of every controller action its
//! [`Selector`] matches. It receives the [`Invocation`] (who is being called,
//! with which arguments, for which request) and a [`Next`] continuation, and
//! decides what happens: inspect and proceed, or answer without proceeding.
//!
//! ```rust,no_run
//! use waylay::middleware::{RequestInterceptor, Selector};
//! use waylay::Router;
//!
//! let app = Router::new()
//!     .intercept(Selector::namespace("demo::controller"), RequestInterceptor::new());
//!     // .mount(...) controllers afterwards
//! ```
//!
//! Interceptors are composed when a controller is mounted: each action gets
//! the interceptors registered *before* the mount whose selector matches it,
//! first registered outermost.
//!
//! Built-in:
//! - [`RequestInterceptor`] — request/argument logging, required-parameter
//!   checks, result and latency logging.

mod trace;

pub use trace::RequestInterceptor;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::controller::{Args, Catalog, HandlerId, Registry};
use crate::error::InvokeError;
use crate::handler::{Action, BoxedAction};
use crate::request::Request;

/// How an intercepted call ended when it did not fail.
#[derive(Clone, Debug, PartialEq)]
pub enum Completion {
    /// The action ran and returned this value (or nothing).
    Returned(Option<serde_json::Value>),
    /// An interceptor answered in the action's place; the action never ran.
    Rejected(String),
}

pub type Outcome = Result<Completion, InvokeError>;

pub type InterceptFuture<'a> = Pin<Box<dyn Future<Output = Outcome> + Send + 'a>>;

/// Code that runs around a controller action.
pub trait Interceptor: Send + Sync + 'static {
    /// Handle one invocation. Call [`Next::proceed`] to continue towards the
    /// action, or return without calling it to short-circuit.
    fn around<'a>(&'a self, inv: Invocation, next: Next) -> InterceptFuture<'a>;
}

// ── Selector ──────────────────────────────────────────────────────────────────

/// Decides which actions an interceptor wraps.
#[derive(Clone, Debug)]
pub enum Selector {
    Any,
    /// Every action of every controller type declared directly in this
    /// module path: `demo::controller` matches
    /// `demo::controller::LoginController`, not `demo::controller::admin::Panel`.
    Namespace(String),
    /// Like `Namespace`, but also matches types in nested modules.
    Tree(String),
}

impl Selector {
    pub fn any() -> Self {
        Self::Any
    }

    pub fn namespace(ns: impl Into<String>) -> Self {
        Self::Namespace(ns.into())
    }

    pub fn tree(ns: impl Into<String>) -> Self {
        Self::Tree(ns.into())
    }

    pub fn matches(&self, id: &HandlerId) -> bool {
        match self {
            Self::Any => true,
            Self::Namespace(ns) => type_below(id, ns).is_some_and(|ty| !ty.contains("::")),
            Self::Tree(ns) => type_below(id, ns).is_some(),
        }
    }
}

/// The part of the handler's type path after `ns::`, if it lives under `ns`.
fn type_below<'a>(id: &'a HandlerId, ns: &str) -> Option<&'a str> {
    id.type_name()
        .strip_prefix(ns)?
        .strip_prefix("::")
        .filter(|rest| !rest.is_empty())
}

// ── Invocation ────────────────────────────────────────────────────────────────

/// One call of a controller action, as seen by interceptors.
pub struct Invocation {
    route: String,
    handler: HandlerId,
    args: Args,
    request: Option<Request>,
    registry: Arc<dyn Registry>,
}

impl Invocation {
    /// An invocation with no request attached and an empty registry.
    pub fn new(handler: HandlerId, args: Args) -> Self {
        Self {
            route: String::new(),
            handler,
            args,
            request: None,
            registry: Arc::new(Catalog::new()),
        }
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = route.into();
        self
    }

    pub fn with_request(mut self, req: Request) -> Self {
        self.request = Some(req);
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = registry;
        self
    }

    /// The route pattern the action was registered under.
    pub fn route(&self) -> &str { &self.route }
    pub fn handler(&self) -> &HandlerId { &self.handler }
    pub fn args(&self) -> &Args { &self.args }

    /// The request this call serves, if it came in over HTTP.
    pub fn request(&self) -> Option<&Request> { self.request.as_ref() }

    pub fn registry(&self) -> &dyn Registry { self.registry.as_ref() }
}

// ── Next ──────────────────────────────────────────────────────────────────────

/// The rest of the chain: the remaining interceptors, then the action.
pub struct Next {
    chain: Arc<[Arc<dyn Interceptor>]>,
    pos: usize,
    action: BoxedAction,
}

impl Next {
    pub(crate) fn new(chain: Arc<[Arc<dyn Interceptor>]>, action: BoxedAction) -> Self {
        Self { chain, pos: 0, action }
    }

    /// A continuation that goes straight to `action`.
    pub fn handler(action: impl Action) -> Self {
        Self::new(Arc::from(Vec::new()), action.into_boxed_action())
    }

    /// Runs the next interceptor, or the action once the chain is exhausted.
    pub async fn proceed(self, inv: Invocation) -> Outcome {
        match self.chain.get(self.pos).cloned() {
            Some(interceptor) => {
                let next = Next { pos: self.pos + 1, ..self };
                interceptor.around(inv, next).await
            }
            None => {
                let value = self.action.call(inv.args).await?;
                Ok(Completion::Returned(value))
            }
        }
    }
}
