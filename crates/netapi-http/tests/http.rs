//! End-to-end transport tests against an in-process HTTP server.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, Method as HttpMethod, StatusCode, Uri};
use axum::Router;
use netapi::modules::test;
use netapi::{
    AuthContext, AuthError, AuthModule, ClientConfig, ClientSettings, NetApiError, NodeId,
    Request, SaltClient, Target, Transport, TransportError,
};
use netapi_http::{HttpTransport, AUTH_TOKEN_HEADER};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Fake backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Seen {
    method: String,
    path: String,
    content_type: Option<String>,
    accept: Option<String>,
    token: Option<String>,
    body: String,
}

type Log = Arc<Mutex<Vec<Seen>>>;

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn backend(
    State(log): State<Log>,
    method: HttpMethod,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    log.lock().unwrap().push(Seen {
        method: method.to_string(),
        path: uri.path().to_string(),
        content_type: header(&headers, "content-type"),
        accept: header(&headers, "accept"),
        token: header(&headers, "x-auth-token"),
        body: body.clone(),
    });

    match uri.path() {
        "/login" => {
            let creds: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
            if creds["password"] == json!("secret") {
                let token = json!({"return": [{
                    "token": "0b7a1f", "start": 1.0, "expire": 2.0,
                    "user": creds["username"], "eauth": creds["eauth"], "perms": []
                }]});
                (StatusCode::OK, token.to_string())
            } else {
                (StatusCode::UNAUTHORIZED, "Could not authenticate".to_string())
            }
        }
        "/" | "/run" => (
            StatusCode::OK,
            r#"{"return":[{"m1":true,"m2":"'test.ping' is not available."}]}"#.to_string(),
        ),
        "/logout" => (
            StatusCode::OK,
            r#"{"return": "Your token has been cleared"}"#.to_string(),
        ),
        "/stats" => (
            StatusCode::OK,
            r#"{"CherryPy Applications": {"Enabled": true}}"#.to_string(),
        ),
        "/slow" => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            (StatusCode::OK, "{}".to_string())
        }
        "/broken" => (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string()),
        path if path.starts_with("/hook/") => (StatusCode::OK, r#"{"success":true}"#.to_string()),
        _ => (StatusCode::NOT_FOUND, String::new()),
    }
}

/// Starts the fake backend on an ephemeral port in its own runtime thread.
fn spawn_backend() -> (SocketAddr, Log) {
    let log = Log::default();
    let router = Router::new().fallback(backend).with_state(log.clone());

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, router).await.unwrap();
        });
    });

    (addr, log)
}

fn config_for(addr: SocketAddr) -> ClientConfig {
    ClientConfig::new(ClientSettings {
        socket_timeout_ms: Some(500),
        ..ClientSettings::new(format!("http://{addr}/"))
    })
}

fn client_for(addr: SocketAddr) -> SaltClient<HttpTransport> {
    let config = config_for(addr);
    let transport = HttpTransport::from_config(&config).unwrap();
    SaltClient::new(config, transport)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn session_token_is_sent_after_login() {
    let (addr, log) = spawn_backend();
    let client = client_for(addr);

    client.login("saltdev", "secret", AuthModule::Pam).unwrap();
    let results = client
        .call_sync(&test::ping(), &Target::glob("*"), &AuthContext::Token)
        .unwrap();

    assert_eq!(results[&NodeId::new("m1").unwrap()], Ok(true));
    assert!(results[&NodeId::new("m2").unwrap()].is_err());

    let seen = log.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].path, "/login");
    assert_eq!(seen[0].token, None);
    assert_eq!(seen[1].method, "POST");
    assert_eq!(seen[1].path, "/");
    assert_eq!(seen[1].token.as_deref(), Some("0b7a1f"));
    assert_eq!(seen[1].content_type.as_deref(), Some("application/json"));
    assert_eq!(seen[1].accept.as_deref(), Some("application/json"));
    let body: Value = serde_json::from_str(&seen[1].body).unwrap();
    assert_eq!(body[0]["fun"], json!("test.ping"));
}

#[test]
fn logout_and_stats_round_trip() {
    let (addr, log) = spawn_backend();
    let client = client_for(addr);

    client.login("saltdev", "secret", AuthModule::Pam).unwrap();
    let stats = client.stats().unwrap();
    assert!(client.logout().unwrap());

    assert_eq!(stats.applications["Enabled"], json!(true));
    assert!(!client.config().has_token());

    let seen = log.lock().unwrap().clone();
    assert_eq!(seen[1].method, "GET");
    assert_eq!(seen[1].path, "/stats");
    assert_eq!(seen[1].content_type, None);
    assert_eq!(seen[2].method, "POST");
    assert_eq!(seen[2].path, "/logout");
    assert_eq!(seen[2].token.as_deref(), Some("0b7a1f"));
    assert_eq!(seen[2].body, "");
}

#[test]
fn rejected_login_maps_to_auth_error() {
    let (addr, _log) = spawn_backend();
    let client = client_for(addr);

    let err = client.login("saltdev", "wrong", AuthModule::Pam).unwrap_err();

    assert_eq!(
        err,
        NetApiError::Auth(AuthError::Rejected {
            username: "saltdev".to_string(),
            status: 401
        })
    );
}

#[test]
fn error_statuses_carry_the_body() {
    let (addr, _log) = spawn_backend();
    let config = config_for(addr);
    let transport = HttpTransport::from_config(&config).unwrap();

    let err = transport
        .execute(&Request::post("/broken", "[]"), &config)
        .unwrap_err();
    assert_eq!(
        err,
        TransportError::Status {
            status: 500,
            body: "boom".to_string()
        }
    );

    let err = transport
        .execute(&Request::post("/login", "{}"), &config)
        .unwrap_err();
    assert_eq!(err.status(), Some(401));
}

#[test]
fn slow_backend_times_out() {
    let (addr, _log) = spawn_backend();
    let config = config_for(addr);
    let transport = HttpTransport::from_config(&config).unwrap();

    let err = transport.execute(&Request::get("/slow"), &config).unwrap_err();

    assert!(matches!(err, TransportError::Timeout { .. }), "got {err:?}");
}

#[test]
fn raw_transport_sends_the_held_token() {
    let (addr, log) = spawn_backend();
    let config = config_for(addr);
    let transport = HttpTransport::from_config(&config).unwrap();
    config.set_token("abc");

    transport.execute(&Request::get("/stats"), &config).unwrap();

    let seen = log.lock().unwrap().clone();
    assert_eq!(seen[0].method, "GET");
    assert_eq!(seen[0].content_type, None);
    assert_eq!(seen[0].token.as_deref(), Some("abc"));
    assert_eq!(AUTH_TOKEN_HEADER.to_ascii_lowercase(), "x-auth-token");
}

#[test]
fn events_are_posted_verbatim() {
    let (addr, log) = spawn_backend();
    let client = client_for(addr);

    assert!(client.send_event("app/deployed", r#"{"version":"1.2"}"#).unwrap());

    let seen = log.lock().unwrap().clone();
    assert_eq!(seen[0].path, "/hook/app/deployed");
    assert_eq!(seen[0].body, r#"{"version":"1.2"}"#);
}
