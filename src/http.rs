//! HTTP API for genealogy tracing
//!
//! ## Routes
//! - `GET /health` - liveness plus row counts
//! - `GET /tracing/forward?lp_id=..&max_depth=..&include_reversed=..` - what was made from an LP
//! - `GET /tracing/backward?lp_id=..&max_depth=..&include_reversed=..` - what an LP was made from
//! - `GET /tracing/production-event?production_event_id=..` - links of one
//!   production event grouped by operation type
//! - `POST /tracing/recall` - recall simulation, JSON body
//!   `{"lp_id": .., "batch_number": .., "max_depth": ..}`
//!
//! Every `/tracing/*` request must carry the tenant in `X-Org-Id`.
//!
//! ## Example Usage
//!
//! ```bash
//! curl -H "X-Org-Id: org-1" \
//!      "http://localhost:8095/tracing/forward?lp_id=lp-a&max_depth=5"
//!
//! curl -X POST -H "X-Org-Id: org-1" -H "Content-Type: application/json" \
//!      -d '{"batch_number": "BATCH-001"}' \
//!      http://localhost:8095/tracing/recall
//! ```

use crate::error::TraceError;
use crate::models::{Direction, RecallRequest};
use crate::services::{self, Services};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Method, Request, Response};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Header naming the tenant a request is scoped to
pub const ORG_HEADER: &str = "x-org-id";

/// Query string of the trace routes
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TraceQuery {
    #[serde(default)]
    pub lp_id: String,
    pub max_depth: Option<u32>,
    #[serde(default)]
    pub include_reversed: bool,
}

/// Query string of the production event route
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EventQuery {
    #[serde(default)]
    pub production_event_id: String,
}

/// HTTP server state
pub struct HttpServer {
    services: Arc<Services>,
    bind_addr: SocketAddr,
}

impl HttpServer {
    pub fn new(services: Arc<Services>, bind_addr: SocketAddr) -> Self {
        Self { services, bind_addr }
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), TraceError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new()
                    .serve_connection(io, service)
                    .await
                {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    async fn handle_request(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let (parts, body) = req.into_parts();
        let body = if parts.method == Method::POST {
            body.collect().await?.to_bytes()
        } else {
            Bytes::new()
        };

        Ok(self
            .dispatch(&parts.method, parts.uri.path(), parts.uri.query(), &parts.headers, body)
            .await)
    }

    /// Route a request that has already been read off the wire
    pub async fn dispatch(
        &self,
        method: &Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Response<Full<Bytes>> {
        debug!(method = %method, path = %path, "Incoming request");

        let result = match (method, path) {
            (&Method::GET, "/health") => return self.handle_health(),
            (&Method::GET, "/tracing/forward") => {
                self.handle_trace(Direction::Forward, query, headers).await
            }
            (&Method::GET, "/tracing/backward") => {
                self.handle_trace(Direction::Backward, query, headers).await
            }
            (&Method::GET, "/tracing/production-event") => self.handle_event(query, headers).await,
            (&Method::POST, "/tracing/recall") => self.handle_recall(headers, body).await,
            _ => return services::not_found("Not Found"),
        };

        match result {
            Ok(response) => response,
            Err(e) => {
                if services::status_for(&e).is_server_error() {
                    error!(path = %path, error = %e, "Request failed");
                } else {
                    debug!(path = %path, error = %e, "Request rejected");
                }
                services::error_response(e)
            }
        }
    }

    fn handle_health(&self) -> Response<Full<Bytes>> {
        let stats = self.services.db.as_ref().map(|db| db.stats()).transpose();
        match stats {
            Ok(stats) => services::ok(&serde_json::json!({
                "status": "ok",
                "stats": stats,
                "event_subscribers": self.services.events.subscriber_count(),
            })),
            Err(e) => services::error_response(e),
        }
    }

    /// GET /tracing/{forward,backward}
    async fn handle_trace(
        &self,
        direction: Direction,
        query: Option<&str>,
        headers: &HeaderMap,
    ) -> Result<Response<Full<Bytes>>, TraceError> {
        let org_id = org_id(headers)?;
        let query = parse_trace_query(query)?;
        let tracing = self.services.tracing.clone();

        let result = tokio::task::spawn_blocking(move || {
            tracing.trace(&org_id, &query.lp_id, direction, query.max_depth, query.include_reversed)
        })
        .await
        .map_err(|e| TraceError::Internal(format!("trace task failed: {}", e)))??;

        Ok(services::ok(&result))
    }

    /// GET /tracing/production-event
    async fn handle_event(
        &self,
        query: Option<&str>,
        headers: &HeaderMap,
    ) -> Result<Response<Full<Bytes>>, TraceError> {
        let org_id = org_id(headers)?;
        let query: EventQuery = parse_query(query)?;
        let tracing = self.services.tracing.clone();

        let grouped = tokio::task::spawn_blocking(move || {
            tracing.genealogy_by_event(&org_id, &query.production_event_id)
        })
        .await
        .map_err(|e| TraceError::Internal(format!("event lookup task failed: {}", e)))??;

        Ok(services::ok(&grouped))
    }

    /// POST /tracing/recall
    async fn handle_recall(
        &self,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response<Full<Bytes>>, TraceError> {
        let org_id = org_id(headers)?;
        let request: RecallRequest = serde_json::from_slice(&body)?;
        let tracing = self.services.tracing.clone();

        let simulation = tokio::task::spawn_blocking(move || tracing.simulate_recall(&org_id, &request))
            .await
            .map_err(|e| TraceError::Internal(format!("recall task failed: {}", e)))??;

        Ok(services::ok(&simulation))
    }
}

/// Tenant from the `X-Org-Id` header
pub fn org_id(headers: &HeaderMap) -> Result<String, TraceError> {
    headers
        .get(ORG_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| TraceError::InvalidArgument(format!("missing {} header", ORG_HEADER)))
}

pub fn parse_trace_query(query: Option<&str>) -> Result<TraceQuery, TraceError> {
    parse_query(query)
}

fn parse_query<T: serde::de::DeserializeOwned>(query: Option<&str>) -> Result<T, TraceError> {
    serde_urlencoded::from_str(query.unwrap_or(""))
        .map_err(|e| TraceError::InvalidArgument(format!("invalid query: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TraceDefaults;
    use crate::models::{GenealogyLink, LicensePlate, LpStatus, OperationType};
    use crate::source::MemorySource;
    use chrono::{Duration, TimeZone, Utc};
    use hyper::header::HeaderValue;
    use hyper::StatusCode;
    use rust_decimal::Decimal;

    fn lp(id: &str, qty: i64, minute: i64) -> LicensePlate {
        LicensePlate {
            id: id.into(),
            org_id: "org-1".into(),
            lp_number: None,
            product_id: "prod".into(),
            batch_number: Some("BATCH-001".into()),
            quantity: Decimal::new(qty, 0),
            uom: "kg".into(),
            status: LpStatus::Available,
            created_at: Utc.with_ymd_and_hms(2025, 12, 1, 8, 0, 0).unwrap() + Duration::minutes(minute),
        }
    }

    fn server() -> HttpServer {
        let link = GenealogyLink {
            id: "g1".into(),
            org_id: "org-1".into(),
            production_event_id: "wo-1".into(),
            input_lp_id: "lp-a".into(),
            output_lp_id: "lp-b".into(),
            operation_type: OperationType::Consume,
            is_reversed: false,
            created_at: Utc::now(),
        };
        let source = Arc::new(MemorySource::with_data(vec![lp("lp-a", 100, 0), lp("lp-b", 90, 1)], vec![link]));
        let services = Arc::new(Services::with_source(source, TraceDefaults::default()));
        HttpServer::new(services, "127.0.0.1:0".parse().unwrap())
    }

    fn org_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ORG_HEADER, HeaderValue::from_static("org-1"));
        headers
    }

    async fn body_json(resp: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_parse_trace_query() {
        let query = parse_trace_query(Some("lp_id=lp-a&max_depth=5")).unwrap();
        assert_eq!(query.lp_id, "lp-a");
        assert_eq!(query.max_depth, Some(5));
        assert!(!query.include_reversed);
        assert!(parse_trace_query(Some("lp_id=lp-a&include_reversed=true")).unwrap().include_reversed);

        assert_eq!(parse_trace_query(None).unwrap(), TraceQuery::default());
        assert!(parse_trace_query(Some("max_depth=deep")).is_err());
    }

    #[test]
    fn test_org_header_required() {
        assert!(matches!(org_id(&HeaderMap::new()), Err(TraceError::InvalidArgument(_))));
        assert_eq!(org_id(&org_headers()).unwrap(), "org-1");
    }

    #[tokio::test]
    async fn test_forward_route() {
        let server = server();
        let resp = server
            .dispatch(&Method::GET, "/tracing/forward", Some("lp_id=lp-a"), &org_headers(), Bytes::new())
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["root_lp"]["id"], "lp-a");
        assert_eq!(body["trace_tree"][0]["lp"]["id"], "lp-b");
        assert_eq!(body["trace_tree"][0]["depth"], 1);
        assert_eq!(body["summary"]["total_descendants"], 1);
    }

    #[tokio::test]
    async fn test_error_routes() {
        let server = server();

        let resp = server
            .dispatch(&Method::GET, "/tracing/backward", Some("lp_id=lp-b"), &HeaderMap::new(), Bytes::new())
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = server
            .dispatch(&Method::GET, "/tracing/backward", Some("lp_id=nope"), &org_headers(), Bytes::new())
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["code"], "not_found");

        let resp = server
            .dispatch(&Method::GET, "/tracing/forward", Some("lp_id=lp-a&max_depth=0"), &org_headers(), Bytes::new())
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = server
            .dispatch(&Method::DELETE, "/tracing/forward", None, &org_headers(), Bytes::new())
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_recall_route() {
        let server = server();
        let body = Bytes::from_static(br#"{"batch_number": "BATCH-001"}"#);
        let resp = server
            .dispatch(&Method::POST, "/tracing/recall", None, &org_headers(), body)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["summary"]["total_affected_lps"], 2);
        assert_eq!(body["summary"]["total_quantity"], "190");

        let resp = server
            .dispatch(&Method::POST, "/tracing/recall", None, &org_headers(), Bytes::from_static(b"{"))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_production_event_route() {
        let server = server();
        let resp = server
            .dispatch(
                &Method::GET,
                "/tracing/production-event",
                Some("production_event_id=wo-1"),
                &org_headers(),
                Bytes::new(),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["production_event_id"], "wo-1");
        assert_eq!(body["consume"][0]["id"], "g1");
        assert_eq!(body["output"].as_array().unwrap().len(), 0);

        let resp = server
            .dispatch(&Method::GET, "/tracing/production-event", None, &org_headers(), Bytes::new())
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let resp = server()
            .dispatch(&Method::GET, "/health", None, &HeaderMap::new(), Bytes::new())
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "ok");
    }
}
