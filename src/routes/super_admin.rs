//! Super-admin endpoints
//!
//! Dashboard reads are served through the [`DashboardCache`]:
//!
//! - `GET /super-admin/stats`
//! - `GET /super-admin/companies`
//! - `GET /super-admin/dashboard-data`
//! - `GET /super-admin/settings`
//!
//! Responses carry `ETag` and `X-Cache: HIT|MISS|BYPASS`; `?refresh=true`
//! skips the cached copy and `If-None-Match` yields 304 on a hit.
//!
//! Writes:
//!
//! - `POST /super-admin/companies` - invalidates `companies` and `stats`
//! - `POST /super-admin/users` - invalidates `stats`
//! - `GET /super-admin/cache`, `DELETE /super-admin/cache`
//!
//! [`DashboardCache`]: crate::cache::DashboardCache

use bytes::Bytes;
use chrono::Utc;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use tracing::info;

use crate::auth::allow;
use crate::cache::{CacheEntry, DashboardKey};
use crate::routes::{created, ok, ok_with, parse_json, route_not_found, segments, ApiResponse, FullBody, Query};
use crate::server::AppState;
use crate::services::accounts::{self, CreateUserRequest, UserView};
use crate::services::companies::{self, CompanyView, CreateCompanyRequest};
use crate::services::dashboard;
use crate::types::{Result, WellspringError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatedCompany {
    company: CompanyView,
    #[serde(skip_serializing_if = "Option::is_none")]
    admin: Option<UserView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheStatsView {
    enabled: bool,
    entries: usize,
    hits: u64,
    misses: u64,
    invalidations: u64,
    hit_rate: f64,
}

fn dashboard_key(name: &str) -> Option<DashboardKey> {
    DashboardKey::ALL.into_iter().find(|k| k.as_str() == name)
}

fn encode<T: Serialize>(data: T) -> Result<Vec<u8>> {
    serde_json::to_vec(&ApiResponse {
        success: true,
        message: None,
        data,
    })
    .map_err(|e| WellspringError::Internal(format!("encode dashboard body: {e}")))
}

/// Compute the response body for a dashboard key
async fn compute(state: &AppState, key: DashboardKey) -> Result<Vec<u8>> {
    let db = &state.db;
    let now = Utc::now();
    match key {
        DashboardKey::Stats => encode(dashboard::stats(db).await?),
        DashboardKey::Companies => encode(dashboard::companies(db, now).await?),
        DashboardKey::DashboardData => encode(dashboard::dashboard_data(db, now).await?),
        DashboardKey::Settings => encode(dashboard::settings(
            state.system_rate(),
            state.jwt.expiry_seconds(),
            db.is_demo(),
            state.cache.is_enabled(),
        )),
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| WellspringError::Internal(format!("header value: {e}")))
}

fn cached_response(body: Vec<u8>, entry: Option<&CacheEntry>, status: &'static str) -> Result<Response<FullBody>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert("x-cache", HeaderValue::from_static(status));
    match entry {
        Some(entry) => {
            headers.insert(header::ETAG, header_value(&entry.etag)?);
            headers.insert(
                header::CACHE_CONTROL,
                header_value(&format!("private, max-age={}", entry.remaining_ttl_secs()))?,
            );
        }
        None => {
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        }
    }
    Ok(response)
}

fn not_modified(entry: &CacheEntry) -> Result<Response<FullBody>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NOT_MODIFIED;
    response.headers_mut().insert(header::ETAG, header_value(&entry.etag)?);
    response.headers_mut().insert("x-cache", HeaderValue::from_static("HIT"));
    Ok(response)
}

async fn serve_dashboard(
    state: &AppState,
    req: &Request<Bytes>,
    key: DashboardKey,
) -> Result<Response<FullBody>> {
    let refresh = Query::from_request(req).flag("refresh");

    if !refresh {
        if let Some(entry) = state.cache.get(key) {
            let client_etag = req
                .headers()
                .get(header::IF_NONE_MATCH)
                .and_then(|v| v.to_str().ok());
            if client_etag == Some(entry.etag.as_str()) {
                return not_modified(&entry);
            }
            return cached_response(entry.data.clone(), Some(&entry), "HIT");
        }
    }

    let body = compute(state, key).await?;
    match state.cache.set(key, body.clone()) {
        Some(entry) => cached_response(body, Some(&entry), "MISS"),
        None => cached_response(body, None, "BYPASS"),
    }
}

pub async fn handle(state: &AppState, req: &Request<Bytes>, path: &str) -> Result<Response<FullBody>> {
    let parts = segments(path, "/super-admin");
    let caller = state.caller_in(req, allow::SUPER_ADMIN).await?;
    let db = &state.db;

    match (req.method(), parts.as_slice()) {
        (&Method::GET, ["cache"]) => {
            let stats = state.cache.stats();
            ok(CacheStatsView {
                enabled: state.cache.is_enabled(),
                hit_rate: stats.hit_rate(),
                entries: stats.entries,
                hits: stats.hits,
                misses: stats.misses,
                invalidations: stats.invalidations,
            })
        }

        (&Method::DELETE, ["cache"]) => {
            state.cache.clear();
            info!(admin = %caller.id(), "dashboard cache cleared");
            ok_with("Dashboard cache cleared", serde_json::Value::Null)
        }

        (&Method::GET, [name]) => match dashboard_key(name) {
            Some(key) => serve_dashboard(state, req, key).await,
            None => route_not_found(),
        },

        (&Method::POST, ["companies"]) => {
            let body: CreateCompanyRequest = parse_json(req)?;
            let (company, admin) = companies::create_company(db, body).await?;
            state.cache.invalidate(DashboardKey::Companies);
            state.cache.invalidate(DashboardKey::Stats);
            info!(company_id = %company.id, admin = %caller.id(), "company created");
            created(
                "Company created",
                CreatedCompany {
                    company: CompanyView::from(&company),
                    admin: admin.map(|u| UserView::new(&u, state.system_rate())),
                },
            )
        }

        (&Method::POST, ["users"]) => {
            let body: CreateUserRequest = parse_json(req)?;
            let user = accounts::create_user(db, body).await?;
            state.cache.invalidate(DashboardKey::Stats);
            created("Account created", UserView::new(&user, state.system_rate()))
        }

        _ => route_not_found(),
    }
}
