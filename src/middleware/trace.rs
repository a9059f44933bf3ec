//! Request logging and required-parameter checks around controller actions.
//!
//! Per intercepted call, [`RequestInterceptor`] goes through:
//!
//! ```text
//! START → LOG_REQUEST → RESOLVE_METADATA ─┬─ ok ──────────────────┐
//!                                         └─ instrumentation error ┤ (logged, ignored)
//!                                                                  ↓
//!                       VALIDATE ─┬─ fail → Completion::Rejected   (action never runs)
//!                                 └─ pass → INVOKE → LOG_RESULT → LOG_TIMING → return
//! ```
//!
//! A failure raised by the action is logged on the way out and propagated
//! untouched; result and timing lines are skipped for it.

use std::time::Instant;

use tracing::{error, info};

use crate::controller::{Arg, HandlerId};
use crate::error::{InstrumentationError, InvokeError};
use crate::request::Request;

use super::{Completion, InterceptFuture, Interceptor, Invocation, Next};

/// Logs every intercepted call and rejects calls whose required parameters
/// are absent or blank.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestInterceptor;

impl RequestInterceptor {
    pub fn new() -> Self {
        Self
    }

    /// Entry logging: arguments, handler identity, request parameters.
    pub fn before(&self, inv: &Invocation, req: &Request) {
        let handler = inv.handler();
        info!(handler = %handler, args = %inv.args().to_json(), "handler arguments");
        info!(
            method = handler.method(),
            declaring_type = handler.type_name(),
            "intercepting handler"
        );
        let params = serde_json::to_string(&req.parameter_map()).unwrap_or_default();
        info!(handler = %handler, params = %params, "request parameters");
    }

    /// Exit logging after the action returned.
    pub fn after_returning(&self, handler: &HandlerId, completion: &Completion) {
        let returned = match completion {
            Completion::Returned(Some(serde_json::Value::String(s))) => s.clone(),
            Completion::Returned(Some(value)) => value.to_string(),
            Completion::Returned(None) => "<none>".to_owned(),
            Completion::Rejected(msg) => msg.clone(),
        };
        info!(handler = %handler, returned = %returned, "handler returned");
    }

    /// Exit logging after the action failed. Never recovers the failure.
    pub fn after_throwing(&self, handler: &HandlerId, err: &InvokeError) {
        error!(handler = %handler, error = %err, "exception occurred in {}", handler.method());
        if matches!(err, InvokeError::Handler(e) if e.is_null_dereference()) {
            error!(handler = %handler, "null dereference raised by handler");
        }
    }

    /// Runs after the action whatever its outcome.
    pub fn after(&self, handler: &HandlerId) {
        info!(handler = %handler, "after handler");
    }

    /// Resolves the handler's signature, logs what is being executed and
    /// with which request parameters, then checks required arguments.
    ///
    /// Returns the rejection message of the first required argument that is
    /// absent or blank.
    fn inspect(
        &self,
        inv: &Invocation,
        req: &Request,
    ) -> Result<Option<String>, InstrumentationError> {
        let handler = inv.handler();
        let signature = inv.registry().signature(handler)?;
        info!("now executing: {handler}");

        for (name, value) in req.parameters() {
            info!("parameter {name} : {value}");
        }

        let args = inv.args();
        if signature.params().len() != args.len() {
            return Err(InstrumentationError::Arity {
                handler: handler.clone(),
                declared: signature.params().len(),
                given: args.len(),
            });
        }

        for (i, param) in signature.params().iter().enumerate() {
            if !param.is_required() {
                continue;
            }
            let arg = args.get(i);
            if arg.is_none_or(Arg::is_blank) {
                let given = arg.map(Arg::to_string).unwrap_or_default();
                let msg = format!(
                    "parameter {} requires a non-empty value, value given: {given}",
                    param.name()
                );
                info!(handler = %handler, "{msg}");
                return Ok(Some(msg));
            }
        }
        Ok(None)
    }
}

impl Interceptor for RequestInterceptor {
    fn around<'a>(&'a self, inv: Invocation, next: Next) -> InterceptFuture<'a> {
        Box::pin(async move {
            let Some(req) = inv.request() else {
                error!(handler = %inv.handler(), "no request context for intercepted call");
                return Err(InvokeError::ContextUnavailable);
            };
            info!(url = %req.url(), route = inv.route(), "request received");
            let start = Instant::now();

            match self.inspect(&inv, req) {
                Ok(Some(rejection)) => return Ok(Completion::Rejected(rejection)),
                Ok(None) => {}
                Err(e) => error!(handler = %inv.handler(), "request interceptor failed: {e}"),
            }

            let handler = inv.handler().clone();
            self.before(&inv, req);
            let outcome = next.proceed(inv).await;
            match &outcome {
                Ok(completion) => self.after_returning(&handler, completion),
                Err(e) => self.after_throwing(&handler, e),
            }
            self.after(&handler);
            let completion = outcome?;

            let returned = match &completion {
                Completion::Returned(Some(value)) => value.to_string(),
                Completion::Returned(None) => "empty".to_owned(),
                Completion::Rejected(msg) => serde_json::Value::from(msg.as_str()).to_string(),
            };
            info!(handler = %handler, "returned: {returned}");

            let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
            info!(handler = %handler, elapsed_ms, "response time");

            Ok(completion)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;

    use super::*;
    use crate::controller::{Args, Catalog, Param, Registry, Signature};
    use crate::error::HandlerError;

    fn id() -> HandlerId {
        HandlerId::new("demo::controller::LoginController", "login4")
    }

    fn request(uri: &str) -> Request {
        Request::from_http(
            http::Request::builder()
                .uri(uri)
                .header("host", "localhost:8080")
                .body(Bytes::new())
                .unwrap(),
        )
    }

    fn registry() -> Arc<dyn Registry> {
        Arc::new(Catalog::new().with(id(), Signature::new().param(Param::text("name").required())))
    }

    fn invocation(name: Option<&str>, uri: &str) -> Invocation {
        let args = Args::new().with("name", name.map(|n| Arg::Text(n.to_owned())));
        Invocation::new(id(), args)
            .with_request(request(uri))
            .with_registry(registry())
    }

    fn counting(calls: &Arc<AtomicUsize>) -> Next {
        let calls = Arc::clone(calls);
        Next::handler(move |_args: Args| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, HandlerError>(Some("-- login4 --"))
            }
        })
    }

    struct Broken;

    impl Registry for Broken {
        fn signature(&self, id: &HandlerId) -> Result<Arc<Signature>, InstrumentationError> {
            Err(InstrumentationError::UnknownHandler(id.clone()))
        }
    }

    #[tokio::test]
    async fn absent_required_parameter_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));

        let outcome = RequestInterceptor::new()
            .around(invocation(None, "/login4"), counting(&calls))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Completion::Rejected("parameter name requires a non-empty value, value given: ".into()),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_required_parameter_short_circuits_with_its_value() {
        let calls = Arc::new(AtomicUsize::new(0));

        let outcome = RequestInterceptor::new()
            .around(invocation(Some("  "), "/login4?name=++"), counting(&calls))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Completion::Rejected("parameter name requires a non-empty value, value given:   ".into()),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn present_required_parameter_runs_the_action_once() {
        let calls = Arc::new(AtomicUsize::new(0));

        let outcome = RequestInterceptor::new()
            .around(invocation(Some("abc"), "/login4?name=abc"), counting(&calls))
            .await
            .unwrap();

        assert_eq!(outcome, Completion::Returned(Some("-- login4 --".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn metadata_failure_does_not_block_the_action() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inv = invocation(None, "/login4").with_registry(Arc::new(Broken));

        let outcome = RequestInterceptor::new().around(inv, counting(&calls)).await.unwrap();

        assert_eq!(outcome, Completion::Returned(Some("-- login4 --".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn arity_mismatch_does_not_block_the_action() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inv = Invocation::new(id(), Args::new())
            .with_request(request("/login4"))
            .with_registry(registry());

        let outcome = RequestInterceptor::new().around(inv, counting(&calls)).await.unwrap();

        assert!(matches!(outcome, Completion::Returned(Some(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn action_failure_propagates_unchanged() {
        let next = Next::handler(|_args: Args| async {
            Err::<Option<String>, _>(HandlerError::null_dereference("aa"))
        });

        let err = RequestInterceptor::new()
            .around(invocation(Some("abc"), "/login4?name=abc"), next)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            InvokeError::Handler(HandlerError::NullDereference { ref binding }) if binding == "aa"
        ));
    }

    #[tokio::test]
    async fn missing_request_context_fails_the_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inv = Invocation::new(id(), Args::new().with("name", None));

        let err = RequestInterceptor::new().around(inv, counting(&calls)).await.unwrap_err();

        assert!(matches!(err, InvokeError::ContextUnavailable));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn absent_return_value_is_not_an_error() {
        let next = Next::handler(|_args: Args| async { Ok::<Option<String>, HandlerError>(None) });

        let outcome = RequestInterceptor::new()
            .around(invocation(Some("abc"), "/login4?name=abc"), next)
            .await
            .unwrap();

        assert_eq!(outcome, Completion::Returned(None));
    }
}
