//! Echo and arithmetic endpoints on the bundled server.
//!
//! Connect with any WebSocket client, passing an allowed origin:
//!
//! ```text
//! wscat -c ws://127.0.0.1:8080/echo -o http://localhost:8080
//! wscat -c ws://127.0.0.1:8080/calc -s summa -o http://localhost:8080
//! ```
//!
//! `/echo` answers every frame with itself. `/calc` reads operands in
//! pairs and answers with their sum (`summa`) or difference (`erotus`),
//! chosen by subprotocol.

use tracing_subscriber::EnvFilter;
use weft::prelude::*;

/// Origins admitted by the demo's guard.
const DEV_ORIGINS: [&str; 2] = ["http://localhost:8080", "http://127.0.0.1:8080"];

// ---------------------------------------------------------------------------
// Dispatch targets
// ---------------------------------------------------------------------------

async fn echo(session: Session) -> Result<(), SessionError> {
    loop {
        let payload = session.receive().await;
        session.send(payload).await?;
    }
}

struct Operand {
    value: f64,
    scale: usize,
}

fn operand(payload: &Payload) -> Result<Operand, SessionError> {
    let text = payload
        .as_text()
        .ok_or_else(|| SessionError::app("operand must be text"))?
        .trim();
    let value = text
        .parse()
        .map_err(|_| SessionError::app(format!("not a number: {text}")))?;
    let scale = text.split_once('.').map_or(0, |(_, frac)| frac.len());
    Ok(Operand { value, scale })
}

/// Adds or subtracts operand pairs, per the negotiated subprotocol.
/// Answers keep as many decimals as the more precise operand.
async fn calculator(session: Session) -> Result<(), SessionError> {
    loop {
        let left = operand(&session.receive().await)?;
        let right = operand(&session.receive().await)?;
        let value = match session.subprotocol() {
            Some("erotus") => left.value - right.value,
            _ => left.value + right.value,
        };
        let precision = left.scale.max(right.scale);
        session.send(format!("{value:.precision$}")).await?;
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn routes() -> Result<Router, ConfigError> {
    Router::new()
        .socket("/echo", SocketEndpoint::new(echo))?
        .socket(
            "/calc",
            SocketEndpoint::new(calculator).subprotocols(["summa", "erotus"])?,
        )
}

fn middleware() -> [SocketMiddleware; 2] {
    [
        SocketMiddleware::guard(OriginGuard::new(DEV_ORIGINS)),
        SocketMiddleware::dropped("static-files"),
    ]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let server = Server::builder()
        .router(routes()?)
        .middleware(middleware())
        .bind("0.0.0.0:8080")
        .await?;

    server.serve().await?;
    Ok(())
}
