use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use hookcheck_protocol::{HEALTH_PATH, LAST_REQUEST_PATH, REGISTER_REQUEST_PATH};

use crate::state::LastRequestStore;

/// HTTP front of the last-request slot
pub struct WebhookServer {
    store: LastRequestStore,
}

impl WebhookServer {
    pub fn new() -> Arc<Self> {
        Self::with_store(LastRequestStore::new())
    }

    pub fn with_store(store: LastRequestStore) -> Arc<Self> {
        Arc::new(Self { store })
    }

    pub fn store(&self) -> &LastRequestStore {
        &self.store
    }

    /// Bind `addr` and serve until the listener fails
    pub async fn run(self: Arc<Self>, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.run_with_listener(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn run_with_listener(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        tracing::info!("Webhook server listening on {}", listener.local_addr()?);

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            tracing::debug!("Connection from {}", peer_addr);
            let this = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let this = this.clone();
                    async move { this.handle_request(req).await }
                });

                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    tracing::debug!("HTTP connection error from {}: {}", peer_addr, e);
                }
            });
        }
    }

    async fn handle_request(
        self: Arc<Self>,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        tracing::debug!("{} {}", req.method(), req.uri());

        let path = req.uri().path().to_string();
        let response = match (req.method(), path.as_str()) {
            (&Method::POST, REGISTER_REQUEST_PATH) => self.register_request(req).await,
            (&Method::GET, LAST_REQUEST_PATH) => self.last_request(),
            (&Method::GET, HEALTH_PATH) => text(StatusCode::OK, "OK"),
            (_, REGISTER_REQUEST_PATH | LAST_REQUEST_PATH | HEALTH_PATH) => {
                text(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
            }
            _ => text(StatusCode::NOT_FOUND, "Not found"),
        };

        Ok(response)
    }

    async fn register_request(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        let body = match req.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::warn!("Failed to read request body: {}", e);
                return text(StatusCode::BAD_REQUEST, "Failed to read request body");
            }
        };

        let value: serde_json::Value = match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Rejected non-JSON webhook body: {}", e);
                return text(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {}", e));
            }
        };

        // A `null` document empties the slot
        if value.is_null() {
            self.store.clear();
            tracing::info!("Received null, last request cleared");
            return json(StatusCode::OK, body);
        }

        let raw = match String::from_utf8(body.to_vec()) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Rejected non UTF-8 webhook body: {}", e);
                return text(StatusCode::BAD_REQUEST, "Body is not valid UTF-8");
            }
        };

        self.store.record(raw);
        tracing::info!("Received");

        json(StatusCode::OK, body)
    }

    fn last_request(&self) -> Response<Full<Bytes>> {
        match self.store.get() {
            Some(body) => json(StatusCode::OK, body),
            None => empty(StatusCode::NO_CONTENT),
        }
    }
}

fn empty(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    with_content_type(status, body, "text/plain; charset=utf-8")
}

fn json(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    with_content_type(status, body, "application/json")
}

fn with_content_type(
    status: StatusCode,
    body: impl Into<Bytes>,
    content_type: &'static str,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn start() -> (Arc<WebhookServer>, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = WebhookServer::new();
        tokio::spawn(server.clone().run_with_listener(listener));
        (server, format!("http://{}", addr))
    }

    #[tokio::test]
    async fn test_last_request_empty() {
        let (_server, base) = start().await;

        let resp = reqwest::get(format!("{}{}", base, LAST_REQUEST_PATH))
            .await
            .unwrap();
        assert_eq!(resp.status(), 204);
        assert!(resp.text().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_then_fetch() {
        let (server, base) = start().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{}{}", base, REGISTER_REQUEST_PATH))
            .header("Content-Type", "application/json")
            .body(r#"{"greet":"hi"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), r#"{"greet":"hi"}"#);
        assert!(server.store().get().is_some());

        let resp = client
            .get(format!("{}{}", base, LAST_REQUEST_PATH))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "application/json"
        );
        assert_eq!(resp.text().await.unwrap(), r#"{"greet":"hi"}"#);
    }

    #[tokio::test]
    async fn test_body_kept_verbatim() {
        let (server, base) = start().await;
        let client = reqwest::Client::new();
        let body = "{\"greet\": \"hi\",\n  \"at\": 1}";

        let resp = client
            .post(format!("{}{}", base, REGISTER_REQUEST_PATH))
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), body);
        assert_eq!(server.store().get().as_deref(), Some(body));

        let resp = client
            .get(format!("{}{}", base, LAST_REQUEST_PATH))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.text().await.unwrap(), body);
    }

    #[tokio::test]
    async fn test_null_clears_last_request() {
        let (server, base) = start().await;
        let client = reqwest::Client::new();
        server.store().record(r#"{"greet":"hi"}"#);

        let resp = client
            .post(format!("{}{}", base, REGISTER_REQUEST_PATH))
            .body("null")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "null");
        assert!(server.store().get().is_none());

        let resp = client
            .get(format!("{}{}", base, LAST_REQUEST_PATH))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 204);
    }

    #[tokio::test]
    async fn test_invalid_json_rejected() {
        let (server, base) = start().await;
        server.store().record(r#"{"kept":true}"#);

        let resp = reqwest::Client::new()
            .post(format!("{}{}", base, REGISTER_REQUEST_PATH))
            .body("not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert_eq!(server.store().get().as_deref(), Some(r#"{"kept":true}"#));
    }

    #[tokio::test]
    async fn test_routing_errors() {
        let (_server, base) = start().await;
        let client = reqwest::Client::new();

        let resp = client
            .get(format!("{}{}", base, REGISTER_REQUEST_PATH))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 405);

        let resp = client
            .get(format!("{}/nope", base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);

        let resp = client
            .get(format!("{}{}", base, HEALTH_PATH))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "OK");
    }
}
