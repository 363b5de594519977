//! Shared fixtures for integration tests.
//!
//! [`ControlPlane`] is a real HTTP/1.1 server on `127.0.0.1:0` standing in
//! for the remote control plane. It records every lookup and answers with a
//! scripted status, body and delay.

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::HeaderMap;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Install a test subscriber once per binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// One lookup as received by the control plane.
#[derive(Debug, Clone)]
pub struct RecordedLookup {
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body parsed as JSON (`Value::Null` if it was not JSON).
    pub body: Value,
}

#[derive(Debug)]
struct Script {
    status: StatusCode,
    body: Bytes,
    delay: Duration,
}

#[derive(Debug)]
struct State {
    script: Mutex<Script>,
    lookups: Mutex<Vec<RecordedLookup>>,
    accepted: AtomicUsize,
    closed: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scripted control-plane server. Stops when dropped.
pub struct ControlPlane {
    addr: SocketAddr,
    state: Arc<State>,
    server: JoinHandle<()>,
}

impl ControlPlane {
    /// Start a server answering `200 []`.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let state = Arc::new(State {
            script: Mutex::new(Script {
                status: StatusCode::OK,
                body: Bytes::from_static(b"[]"),
                delay: Duration::ZERO,
            }),
            lookups: Mutex::new(Vec::new()),
            accepted: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        });

        let server = tokio::spawn({
            let state = state.clone();
            async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };
                    state.accepted.fetch_add(1, Ordering::SeqCst);
                    let state = state.clone();
                    tokio::spawn(async move {
                        let service = {
                            let state = state.clone();
                            service_fn(move |request| handle(state.clone(), request))
                        };
                        let _ = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await;
                        state.closed.fetch_add(1, Ordering::SeqCst);
                    });
                }
            }
        });

        Self {
            addr,
            state,
            server,
        }
    }

    /// Start a server answering `200` with `experiments`.
    pub async fn with_experiments(experiments: Value) -> Self {
        let control_plane = Self::start().await;
        control_plane.respond_json(StatusCode::OK, &experiments);
        control_plane
    }

    /// Lookup endpoint of this server.
    pub fn endpoint(&self) -> String {
        format!("http://{}/experiment", self.addr)
    }

    /// Answer subsequent lookups with `status` and a raw body.
    pub fn respond(&self, status: StatusCode, body: impl Into<Bytes>) {
        let mut script = lock(&self.state.script);
        script.status = status;
        script.body = body.into();
    }

    /// Answer subsequent lookups with `status` and a JSON body.
    pub fn respond_json(&self, status: StatusCode, body: &Value) {
        self.respond(status, body.to_string());
    }

    /// Hold every answer for `delay` before sending it.
    pub fn delay(&self, delay: Duration) {
        lock(&self.state.script).delay = delay;
    }

    /// Every lookup received so far.
    pub fn lookups(&self) -> Vec<RecordedLookup> {
        lock(&self.state.lookups).clone()
    }

    /// Number of TCP connections accepted so far.
    pub fn connections_accepted(&self) -> usize {
        self.state.accepted.load(Ordering::SeqCst)
    }

    /// Number of TCP connections the client has closed so far.
    pub fn connections_closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Number of lookups received so far.
    pub fn lookup_count(&self) -> usize {
        lock(&self.state.lookups).len()
    }
}

impl Drop for ControlPlane {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn handle(
    state: Arc<State>,
    request: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let headers = request.headers().clone();
    let body = match request.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => Bytes::new(),
    };
    lock(&state.lookups).push(RecordedLookup {
        headers,
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });

    let (status, body, delay) = {
        let script = lock(&state.script);
        (script.status, script.body.clone(), script.delay)
    };
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let response = Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(body))
        .expect("valid response");
    Ok(response)
}

/// An endpoint nothing listens on.
pub async fn unreachable_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{}/experiment", addr)
}
