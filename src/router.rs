//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. Plain handlers are
//! stored as registered; controller actions are stored already wrapped in
//! their interceptor chain, so dispatch never consults selectors.

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;

use crate::controller::Controller;
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::middleware::{Interceptor, Selector};
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Every builder method returns `self` so registrations chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    interceptors: Vec<(Selector, Arc<dyn Interceptor>)>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), interceptors: Vec::new() }
    }

    /// Register a plain handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax — `req.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if the path is malformed or conflicts with an existing route.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.add(method, path, handler.into_boxed_handler())
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Get, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Post, path, handler)
    }

    /// Wrap every controller action mounted from now on whose handler
    /// matches `selector`. Earlier registrations run outermost.
    pub fn intercept(mut self, selector: Selector, interceptor: impl Interceptor) -> Self {
        let interceptor: Arc<dyn Interceptor> = Arc::new(interceptor);
        self.interceptors.push((selector, interceptor));
        self
    }

    /// Register every action of `controller`, wrapped in the matching
    /// interceptors.
    ///
    /// # Panics
    ///
    /// Same as [`Router::on`].
    pub fn mount(mut self, controller: Controller) -> Self {
        for (method, path, handler) in controller.into_endpoints(&self.interceptors) {
            self = self.add(method, &path, handler);
        }
        self
    }

    fn add(mut self, method: Method, path: &str, handler: BoxedHandler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    /// Routes one request and produces one response.
    ///
    /// Unknown methods answer `405`, unknown paths `404`.
    pub async fn dispatch(&self, mut req: Request) -> Response {
        let Ok(method) = req.method().parse::<Method>() else {
            return Response::status(Status::MethodNotAllowed);
        };
        match self.lookup(method, req.path()) {
            Some((handler, params)) => {
                req.params = params;
                handler.call(req).await
            }
            None => Response::status(Status::NotFound),
        }
    }

    pub(crate) fn lookup(
        &self,
        method: Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(&method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}
