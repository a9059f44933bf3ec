//! Login demo — placeholder actions with request interception.
//!
//! Run with:
//!   cargo run --example login
//!
//! Try:
//!   curl 'http://localhost:8080/loginController/login1'
//!   curl 'http://localhost:8080/loginController/login2?name=abc&age=18'
//!   curl 'http://localhost:8080/loginController/login3'     # 500, see the logs
//!   curl 'http://localhost:8080/loginController/login4'     # 400, name is required
//!
//! Bind address: `WAYLAY_ADDR` (default `0.0.0.0:8080`).

use waylay::middleware::{RequestInterceptor, Selector};
use waylay::{Router, Server};

mod controller {
    use waylay::controller::{Args, Controller, Param, Signature};
    use waylay::{HandlerError, Method};
    use tracing::info;

    pub fn login() -> Controller {
        Controller::new("demo::controller::LoginController", "/loginController")
            .action(Method::Get, "/login1", "login1", Signature::new(), login1)
            .action(
                Method::Get,
                "/login2",
                "login2",
                Signature::new().param(Param::text("name")).param(Param::int("age")),
                login2,
            )
            .action(Method::Get, "/login3", "login3", Signature::new(), login3)
            .action(
                Method::Get,
                "/login4",
                "login4",
                Signature::new().param(Param::text("name").required()),
                login4,
            )
    }

    async fn login1(_args: Args) -> Result<Option<&'static str>, HandlerError> {
        info!("-- login1()");
        Ok(Some("-- login1 --"))
    }

    async fn login2(_args: Args) -> Result<Option<&'static str>, HandlerError> {
        info!("-- login2()");
        Ok(Some("-- login2 --"))
    }

    // Fails on purpose: reads a value that was never set.
    async fn login3(_args: Args) -> Result<Option<&'static str>, HandlerError> {
        info!("-- login3()");
        let aa: Option<&str> = None;
        let _bb = aa.ok_or_else(|| HandlerError::null_dereference("aa"))? == "123";
        Ok(Some("-- login3 --"))
    }

    async fn login4(args: Args) -> Result<Option<String>, HandlerError> {
        info!("-- login4()");
        Ok(args.text("name").map(|name| format!("-- login4 {name} --")))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let addr = std::env::var("WAYLAY_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());

    let app = Router::new()
        .intercept(Selector::namespace("demo::controller"), RequestInterceptor::new())
        .mount(controller::login());

    Server::bind(addr)
        .serve(app)
        .await
        .expect("server error");
}
