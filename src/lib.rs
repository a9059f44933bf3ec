//! # waylay
//!
//! A minimal HTTP framework whose controller actions run inside an
//! interceptor chain.
//!
//! - Radix-tree routing — O(path-length) lookup via [`matchit`]
//! - Async I/O — tokio + hyper, HTTP/1.1 and HTTP/2
//! - Graceful shutdown — SIGTERM / Ctrl-C, drains in-flight requests
//! - Interceptors — code that runs around controller actions selected by
//!   namespace, see [`middleware`]
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use waylay::controller::{Args, Controller, Param, Signature};
//! use waylay::middleware::{RequestInterceptor, Selector};
//! use waylay::{HandlerError, Method, Router, Server};
//!
//! async fn greet(args: Args) -> Result<Option<String>, HandlerError> {
//!     Ok(args.text("name").map(|n| format!("hello {n}")))
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let users = Controller::new("app::controller::Users", "/users")
//!         .action(Method::Get, "/greet", "greet",
//!                 Signature::new().param(Param::text("name").required()), greet);
//!
//!     let app = Router::new()
//!         .intercept(Selector::namespace("app::controller"), RequestInterceptor::new())
//!         .mount(users);
//!
//!     Server::bind("0.0.0.0:8080").serve(app).await.unwrap();
//! }
//! ```
//!
//! `GET /users/greet?name=ann` answers `hello ann`; without `name` the
//! interceptor answers `400` with
//! `parameter name requires a non-empty value, value given: ` and `greet`
//! never runs.

mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;
mod status;

pub mod controller;
pub mod middleware;

pub use error::{Error, HandlerError, InstrumentationError, InvokeError};
pub use handler::{Action, ActionResult, Handler};
pub use method::Method;
pub use middleware::{Completion, Interceptor, Invocation, Next, Outcome};
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::{DEFAULT_BODY_LIMIT, Server};
pub use status::Status;
