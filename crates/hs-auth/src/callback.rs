//! One-shot local listener for the OAuth redirect.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::Html,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::callback_port;
use crate::errors::{AuthError, Result};

const SUCCESS_PAGE: &str = "<!doctype html><html><head><title>Signed in</title></head>\
<body><h1>Signed in to Halo stats</h1><p>You can close this tab and return to your assistant.</p></body></html>";

const ERROR_PAGE: &str = "<!doctype html><html><head><title>Sign-in incomplete</title></head>\
<body><h1>No authorization code received</h1><p>Start the sign-in again from your assistant.</p></body></html>";

struct CallbackState {
    expected_state: String,
    code_tx: Mutex<Option<oneshot::Sender<String>>>,
}

/// Pull the authorization code out of redirect query parameters
///
/// The `state` parameter must echo `expected_state`.
pub fn extract_code(params: &HashMap<String, String>, expected_state: &str) -> Result<String> {
    if let Some(error) = params.get("error") {
        if error == "access_denied" {
            return Err(AuthError::UserCancelled);
        }
        return Err(AuthError::InvalidRedirect(format!("redirect carried error {error}")));
    }

    match params.get("state") {
        Some(actual) if actual == expected_state => {}
        _ => return Err(AuthError::StateMismatch),
    }

    params
        .get("code")
        .filter(|code| !code.is_empty())
        .cloned()
        .ok_or_else(|| AuthError::InvalidRedirect("missing code".to_string()))
}

async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Html<&'static str>) {
    let code = match extract_code(&params, &state.expected_state) {
        Ok(code) => code,
        Err(AuthError::InvalidRedirect(reason)) if params.is_empty() => {
            debug!("Ignoring callback request: {}", reason);
            return (StatusCode::BAD_REQUEST, Html(ERROR_PAGE));
        }
        Err(e) => {
            warn!("Rejected authorization redirect: {}", e);
            return (StatusCode::BAD_REQUEST, Html(ERROR_PAGE));
        }
    };

    let sender = state.code_tx.lock().ok().and_then(|mut slot| slot.take());
    if let Some(sender) = sender {
        let _ = sender.send(code);
    }
    (StatusCode::OK, Html(SUCCESS_PAGE))
}

/// Bound, not yet serving, callback listener
#[derive(Debug)]
pub struct CallbackListener {
    listener: TcpListener,
}

impl CallbackListener {
    /// Bind loopback on the port of `redirect_uri`
    pub async fn bind(redirect_uri: &Url) -> Result<Self> {
        let port = callback_port(redirect_uri)?;
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
            .await
            .map_err(|source| AuthError::CallbackBind { port, source })?;

        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the first request carrying `code` and the matching
    /// `state`, then stop listening
    ///
    /// Any other request gets an error page and the listener keeps waiting.
    /// `None` waits indefinitely.
    pub async fn wait_for_code(
        self,
        expected_state: &str,
        timeout: Option<Duration>,
    ) -> Result<String> {
        let (code_tx, code_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = Arc::new(CallbackState {
            expected_state: expected_state.to_string(),
            code_tx: Mutex::new(Some(code_tx)),
        });
        let app = Router::new().fallback(handle_callback).with_state(state);

        let listener = self.listener;
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, code_rx).await {
                Ok(received) => received.map_err(|_| AuthError::CallbackClosed),
                Err(_) => Err(AuthError::CallbackTimeout(limit)),
            },
            None => code_rx.await.map_err(|_| AuthError::CallbackClosed),
        };

        let _ = shutdown_tx.send(());
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Callback listener failed: {}", e),
            Err(e) => warn!("Callback listener task failed: {}", e),
        }

        if outcome.is_ok() {
            info!("Received authorization code");
        }
        outcome
    }
}

/// Bind on the redirect URI's port and wait for the authorization code
pub async fn await_authorization_code(
    redirect_uri: &Url,
    expected_state: &str,
    timeout: Option<Duration>,
) -> Result<String> {
    CallbackListener::bind(redirect_uri)
        .await?
        .wait_for_code(expected_state, timeout)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ephemeral() -> (CallbackListener, String) {
        let listener = CallbackListener::bind(&Url::parse("http://127.0.0.1:0/callback").unwrap())
            .await
            .unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        (listener, base)
    }

    #[tokio::test]
    async fn test_returns_first_code() {
        let (listener, base) = ephemeral().await;
        let waiter = tokio::spawn(listener.wait_for_code("st", Some(Duration::from_secs(10))));

        let response = reqwest::get(format!("{base}/callback?code=M.C123&state=st"))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert!(response.text().await.unwrap().contains("Signed in"));

        assert_eq!(waiter.await.unwrap().unwrap(), "M.C123");
    }

    #[tokio::test]
    async fn test_keeps_listening_after_request_without_code() {
        let (listener, base) = ephemeral().await;
        let waiter = tokio::spawn(listener.wait_for_code("st", Some(Duration::from_secs(10))));

        let favicon = reqwest::get(format!("{base}/favicon.ico")).await.unwrap();
        assert_eq!(favicon.status(), reqwest::StatusCode::BAD_REQUEST);

        let denied = reqwest::get(format!("{base}/callback?error=access_denied"))
            .await
            .unwrap();
        assert_eq!(denied.status(), reqwest::StatusCode::BAD_REQUEST);
        assert!(!waiter.is_finished());

        reqwest::get(format!("{base}/callback?code=late&state=st"))
            .await
            .unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), "late");
    }

    #[tokio::test]
    async fn test_times_out_without_callback() {
        let (listener, _base) = ephemeral().await;
        let result = listener
            .wait_for_code("st", Some(Duration::from_millis(50)))
            .await;
        assert!(matches!(result, Err(AuthError::CallbackTimeout(_))));
        let message = result.unwrap_err().to_string();
        assert!(message.contains("50ms"), "{message}");
    }

    #[tokio::test]
    async fn test_rejects_code_with_wrong_or_missing_state() {
        let (listener, base) = ephemeral().await;
        let waiter = tokio::spawn(listener.wait_for_code("st", Some(Duration::from_secs(10))));

        let forged = reqwest::get(format!("{base}/callback?code=FORGED&state=other"))
            .await
            .unwrap();
        assert_eq!(forged.status(), reqwest::StatusCode::BAD_REQUEST);

        let stateless = reqwest::get(format!("{base}/callback?code=FORGED"))
            .await
            .unwrap();
        assert_eq!(stateless.status(), reqwest::StatusCode::BAD_REQUEST);
        assert!(!waiter.is_finished());

        reqwest::get(format!("{base}/callback?code=genuine&state=st"))
            .await
            .unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), "genuine");
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_extract_code() {
        assert_eq!(
            extract_code(&params(&[("code", "abc"), ("state", "st")]), "st").unwrap(),
            "abc"
        );
        assert!(matches!(
            extract_code(&params(&[("code", "abc"), ("state", "nope")]), "st"),
            Err(AuthError::StateMismatch)
        ));
        assert!(matches!(
            extract_code(&params(&[("error", "access_denied"), ("state", "st")]), "st"),
            Err(AuthError::UserCancelled)
        ));
        assert!(matches!(
            extract_code(&params(&[("state", "st")]), "st"),
            Err(AuthError::InvalidRedirect(_))
        ));
    }

    #[tokio::test]
    async fn test_bind_failure_when_port_taken() {
        let taken = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = taken.local_addr().unwrap().port();

        let redirect = Url::parse(&format!("http://127.0.0.1:{port}/callback")).unwrap();
        let result = CallbackListener::bind(&redirect).await;
        assert!(matches!(result, Err(AuthError::CallbackBind { port: p, .. }) if p == port));
    }
}
