//! Handler traits and type erasure.
//!
//! # Two kinds of handler
//!
//! - A plain **handler** takes the whole [`Request`] and returns anything that
//!   is [`IntoResponse`]. Interceptors never see it.
//! - A controller **action** takes the bound [`Args`] and returns
//!   `Result<Option<T>, HandlerError>`. Its invocation runs through the
//!   interceptor chain, and the framework turns its outcome into a response.
//!
//! # How async handlers are stored
//!
//! The router holds handlers of *different* concrete types, so each one is
//! hidden behind a trait object:
//!
//! ```text
//! async fn hello(req: Request) -> Response { … }   ← user writes this
//!        ↓ router.get("/", hello)
//! hello.into_boxed_handler()                       ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))                       ← stored as BoxedHandler
//!        ↓
//! handler.call(req)  at request time               ← one vtable dispatch
//! ```
//!
//! Actions follow the same path through [`Action`] and `FnAction`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;

use crate::controller::Args;
use crate::error::HandlerError;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future.
///
/// `Send + 'static` let tokio move the future across threads.
pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// What an erased action resolves to: the (possibly absent) return value in
/// its JSON form, or the action's failure.
pub type ActionResult = Result<Option<serde_json::Value>, HandlerError>;

/// Internal dispatch interface for plain handlers.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture<Response>;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Internal dispatch interface for controller actions.
#[doc(hidden)]
pub trait ErasedAction {
    fn call(&self, args: Args) -> BoxFuture<ActionResult>;
}

#[doc(hidden)]
pub type BoxedAction = Arc<dyn ErasedAction + Send + Sync + 'static>;

// ── Public traits ─────────────────────────────────────────────────────────────

/// Implemented for every valid plain route handler:
///
/// ```text
/// async fn name(req: Request) -> impl IntoResponse
/// ```
///
/// Sealed: only the blanket impl below can satisfy it.
pub trait Handler: private::SealedHandler + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

/// Implemented for every valid controller action:
///
/// ```text
/// async fn name(args: Args) -> Result<Option<impl Serialize>, HandlerError>
/// ```
///
/// Sealed, like [`Handler`].
pub trait Action: private::SealedAction + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_action(self) -> BoxedAction;
}

mod private {
    pub trait SealedHandler {}
    pub trait SealedAction {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R> private::SealedHandler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

impl<F, Fut, T> private::SealedAction for F
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<T>, HandlerError>> + Send + 'static,
    T: Serialize + Send + 'static,
{
}

impl<F, Fut, T> Action for F
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<T>, HandlerError>> + Send + 'static,
    T: Serialize + Send + 'static,
{
    fn into_boxed_action(self) -> BoxedAction {
        Arc::new(FnAction(self))
    }
}

// ── Concrete wrappers ─────────────────────────────────────────────────────────

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<Response> {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

struct FnAction<F>(F);

impl<F, Fut, T> ErasedAction for FnAction<F>
where
    F: Fn(Args) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<T>, HandlerError>> + Send + 'static,
    T: Serialize + Send + 'static,
{
    fn call(&self, args: Args) -> BoxFuture<ActionResult> {
        let fut = (self.0)(args);
        Box::pin(async move {
            match fut.await? {
                Some(value) => serde_json::to_value(value)
                    .map(Some)
                    .map_err(|e| HandlerError::failed(format!("unserializable return value: {e}"))),
                None => Ok(None),
            }
        })
    }
}
