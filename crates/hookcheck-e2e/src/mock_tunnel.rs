//! Mock tunnel agent for E2E tests
//!
//! Stands in for ngrok without leaving the machine: one listener serves the
//! agent API (`/api/tunnels`), a second one is the "public" side and forwards
//! every request to the target service.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{
    HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST, TRANSFER_ENCODING,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use hookcheck_protocol::{TunnelDescriptor, TUNNELS_API_PATH};

use crate::error::Result;

struct TunnelState {
    target: String,
    public_url: String,
    active: AtomicBool,
    forwarded: AtomicUsize,
    client: reqwest::Client,
}

/// A local tunnel: agent API plus a forwarding public endpoint
pub struct MockTunnel {
    api_addr: SocketAddr,
    public_addr: SocketAddr,
    state: Arc<TunnelState>,
    handles: Vec<JoinHandle<()>>,
}

impl MockTunnel {
    /// Start a tunnel forwarding to `target` (e.g. `http://127.0.0.1:41234`)
    pub async fn start(target: impl Into<String>) -> Result<Self> {
        let api_listener = TcpListener::bind("127.0.0.1:0").await?;
        let public_listener = TcpListener::bind("127.0.0.1:0").await?;
        let api_addr = api_listener.local_addr()?;
        let public_addr = public_listener.local_addr()?;

        let state = Arc::new(TunnelState {
            target: target.into().trim_end_matches('/').to_string(),
            public_url: format!("http://{}", public_addr),
            active: AtomicBool::new(true),
            forwarded: AtomicUsize::new(0),
            client: reqwest::Client::new(),
        });

        let api_state = state.clone();
        let api = spawn_server(api_listener, move |req| {
            let state = api_state.clone();
            async move { handle_api(&state, req) }
        });

        let public_state = state.clone();
        let public = spawn_server(public_listener, move |req| {
            let state = public_state.clone();
            async move { forward(&state, req).await }
        });

        tracing::debug!(
            "Mock tunnel {} -> {} (api on {})",
            state.public_url,
            state.target,
            api_addr
        );

        Ok(Self {
            api_addr,
            public_addr,
            state,
            handles: vec![api, public],
        })
    }

    /// Root of the agent API, e.g. `http://127.0.0.1:41235`
    pub fn api_url(&self) -> String {
        format!("http://{}", self.api_addr)
    }

    /// The URL `/api/tunnels` advertises
    pub fn public_url(&self) -> &str {
        &self.state.public_url
    }

    pub fn public_addr(&self) -> SocketAddr {
        self.public_addr
    }

    /// An inactive tunnel reports no tunnels and refuses to forward
    pub fn set_active(&self, active: bool) {
        self.state.active.store(active, Ordering::SeqCst);
    }

    /// Number of requests forwarded to the target so far
    pub fn forwarded_count(&self) -> usize {
        self.state.forwarded.load(Ordering::SeqCst)
    }
}

impl Drop for MockTunnel {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

fn spawn_server<F, Fut>(listener: TcpListener, handler: F) -> JoinHandle<()>
where
    F: Fn(Request<Incoming>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };

            let handler = handler.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let fut = handler(req);
                    async move { Ok::<_, Infallible>(fut.await) }
                });

                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    })
}

fn handle_api(state: &TunnelState, req: Request<Incoming>) -> Response<Full<Bytes>> {
    if req.method() != Method::GET || req.uri().path() != TUNNELS_API_PATH {
        return respond(StatusCode::NOT_FOUND, Bytes::from_static(b"Not found"), None);
    }

    let descriptor = if state.active.load(Ordering::SeqCst) {
        TunnelDescriptor::single(state.public_url.clone())
    } else {
        TunnelDescriptor::default()
    };

    match serde_json::to_vec(&descriptor) {
        Ok(body) => respond(StatusCode::OK, Bytes::from(body), Some("application/json")),
        Err(e) => respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            Bytes::from(e.to_string()),
            None,
        ),
    }
}

async fn forward(state: &TunnelState, req: Request<Incoming>) -> Response<Full<Bytes>> {
    if !state.active.load(Ordering::SeqCst) {
        return respond(
            StatusCode::NOT_FOUND,
            Bytes::from_static(b"Tunnel not found"),
            None,
        );
    }

    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let url = format!("{}{}", state.target, path);
    let method = req.method().clone();
    tracing::debug!("Forwarding {} {}", method, url);

    let mut upstream = state.client.request(method, &url);
    for (name, value) in req.headers() {
        if !is_hop_header(name) {
            upstream = upstream.header(name, value);
        }
    }

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return respond(
                StatusCode::BAD_REQUEST,
                Bytes::from(format!("Failed to read body: {}", e)),
                None,
            );
        }
    };
    if !body.is_empty() {
        upstream = upstream.body(body);
    }

    match upstream.send().await {
        Ok(resp) => {
            state.forwarded.fetch_add(1, Ordering::SeqCst);
            let status = resp.status();
            let headers = resp.headers().clone();
            let body = match resp.bytes().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!("Failed to read upstream response: {}", e);
                    return respond(
                        StatusCode::BAD_GATEWAY,
                        Bytes::from(format!("Forwarding error: {}", e)),
                        None,
                    );
                }
            };

            let mut response = Response::new(Full::new(body));
            *response.status_mut() = status;
            for (name, value) in headers.iter().filter(|(name, _)| !is_hop_header(name)) {
                response.headers_mut().append(name, value.clone());
            }
            response
        }
        Err(e) => {
            tracing::warn!("Failed to forward request: {}", e);
            respond(
                StatusCode::BAD_GATEWAY,
                Bytes::from(format!("Forwarding error: {}", e)),
                None,
            )
        }
    }
}

/// Headers the forwarder recomputes instead of copying
fn is_hop_header(name: &HeaderName) -> bool {
    name == HOST || name == CONTENT_LENGTH || name == TRANSFER_ENCODING || name == CONNECTION
}

fn respond(
    status: StatusCode,
    body: Bytes,
    content_type: Option<&'static str>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    if let Some(content_type) = content_type {
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    response
}
