//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Each request body is
//! collected up front and handed to [`dispatch`], which routes on
//! `(method, path)` and never touches the connection.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::{authenticate, require_role, AuthUser, JwtValidator, Role};
use crate::cache::{self, CacheConfig, DashboardCache};
use crate::config::Args;
use crate::db::Database;
use crate::routes::{self, FullBody};
use crate::services::notifications::{NotificationSink, StoreNotifier};
use crate::types::{Result, WellspringError};

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub db: Database,
    pub jwt: JwtValidator,
    /// Super-admin dashboard reads
    pub cache: Arc<DashboardCache>,
    pub notifier: Arc<dyn NotificationSink>,
}

impl AppState {
    pub fn new(args: Args, db: Database) -> Result<Self> {
        let jwt = args.jwt_validator()?;
        let cache = Arc::new(DashboardCache::new(CacheConfig::new(args.dashboard_cache)));
        let notifier: Arc<dyn NotificationSink> = Arc::new(StoreNotifier::new(db.clone()));
        Ok(Self {
            args,
            db,
            jwt,
            cache,
            notifier,
        })
    }

    pub fn system_rate(&self) -> i64 {
        self.args.system_counselor_rate
    }

    pub fn sink(&self) -> &dyn NotificationSink {
        self.notifier.as_ref()
    }

    /// Authenticate the request's bearer token
    pub async fn caller(&self, req: &Request<Bytes>) -> Result<AuthUser> {
        let header = req
            .headers()
            .get(hyper::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        authenticate(&self.jwt, &self.db, header).await
    }

    /// Authenticate and check the caller's role against `allowed`
    pub async fn caller_in(&self, req: &Request<Bytes>, allowed: &[Role]) -> Result<AuthUser> {
        let user = self.caller(req).await?;
        require_role(&user, allowed)?;
        Ok(user)
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let addr = state.args.listen_addr();
    let listener = TcpListener::bind(addr).await?;

    info!("Wellspring listening on {}", addr);

    if state.db.is_demo() {
        warn!("Demo mode - data lives in memory and is lost on restart");
    }
    if state.args.dev_mode {
        warn!("Development mode enabled - insecure token secret allowed");
    }

    if state.cache.is_enabled() {
        cache::spawn_cleanup_task(Arc::clone(&state.cache));
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Collect the body, then dispatch
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<FullBody>, hyper::Error> {
    info!("[{}] {} {}", addr, req.method(), req.uri().path());

    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Request body error from {}: {}", addr, e);
            return Ok(routes::error_response(WellspringError::BadRequest(
                "Failed to read request body".into(),
            )));
        }
    };

    Ok(dispatch(&state, Request::from_parts(parts, body)).await)
}

/// Route a fully-read request
pub async fn dispatch(state: &AppState, req: Request<Bytes>) -> Response<FullBody> {
    let method = req.method().clone();
    let path = req.uri().path().trim_end_matches('/').to_string();

    let result = match (&method, path.as_str()) {
        (&Method::OPTIONS, _) => Ok(preflight_response()),

        (&Method::GET, "/health") | (&Method::GET, "/healthz") => Ok(routes::health_check(state)),

        (_, p) if p.starts_with("/auth/") => routes::auth::handle(state, &req, p).await,
        (_, p) if p.starts_with("/counseling-sessions") => {
            routes::sessions::handle(state, &req, p).await
        }
        (_, p) if p.starts_with("/financial-sessions") => {
            routes::financial_sessions::handle(state, &req, p).await
        }
        (_, p) if p.starts_with("/counseling-centers") => {
            routes::centers::handle(state, &req, p).await
        }
        (_, p) if p.starts_with("/counselor-payments") => {
            routes::payments::handle(state, &req, p).await
        }
        (_, p) if p.starts_with("/counselors/") => routes::counselors::handle(state, &req, p).await,
        (_, p) if p.starts_with("/super-admin/") => {
            routes::super_admin::handle(state, &req, p).await
        }
        (_, p) if p.starts_with("/company-admin/") => {
            routes::company_admin::handle(state, &req, p).await
        }
        (_, p) if p.starts_with("/resources") => routes::resources::handle(state, &req, p).await,
        (_, p) if p.starts_with("/notifications") => {
            routes::notifications::handle(state, &req, p).await
        }
        (_, "/financial-profile") => routes::finance::handle_profile(state, &req).await,
        (_, p) if p.starts_with("/goals") => routes::finance::handle_goals(state, &req, p).await,

        _ => Ok(not_found_response(&path)),
    };

    let mut response = result.unwrap_or_else(routes::error_response);
    response.headers_mut().insert(
        hyper::header::ACCESS_CONTROL_ALLOW_ORIGIN,
        hyper::header::HeaderValue::from_static("*"),
    );
    response
}

/// CORS preflight response
fn preflight_response() -> Response<FullBody> {
    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert(
        hyper::header::ACCESS_CONTROL_ALLOW_HEADERS,
        hyper::header::HeaderValue::from_static("Authorization, Content-Type, If-None-Match"),
    );
    headers.insert(
        hyper::header::ACCESS_CONTROL_ALLOW_METHODS,
        hyper::header::HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    response
}

/// Not found response
fn not_found_response(path: &str) -> Response<FullBody> {
    let body = serde_json::json!({
        "success": false,
        "message": "Route not found",
        "path": path,
    });
    routes::json_response(StatusCode::NOT_FOUND, &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        AppState::new(Args::dev(), Database::memory()).unwrap()
    }

    fn request(method: Method, uri: &str) -> Request<Bytes> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Bytes::new())
            .unwrap()
    }

    #[tokio::test]
    async fn test_preflight_allows_any_path() {
        let response = dispatch(&state(), request(Method::OPTIONS, "/counselor-payments")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .contains_key(hyper::header::ACCESS_CONTROL_ALLOW_METHODS));
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let response = dispatch(&state(), request(Method::GET, "/nowhere")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_protected_route_without_token_is_401() {
        let response = dispatch(&state(), request(Method::GET, "/counseling-sessions")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Authentication required");
    }
}
