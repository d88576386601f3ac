//! Company administration endpoints
//!
//! A company-admin acts on their own company; a super-admin passes
//! `?companyId=`.
//!
//! - `GET|PUT /company-admin/business-metrics[?year=]`
//! - `GET|PUT /company-admin/departments`
//! - `GET /company-admin/stats`
//! - `GET /company-admin/employees`

use bytes::Bytes;
use chrono::{Datelike, Utc};
use hyper::{Method, Request, Response};
use serde::Deserialize;

use crate::auth::allow;
use crate::routes::{ok, ok_with, parse_json, route_not_found, segments, FullBody, Query};
use crate::server::AppState;
use crate::services::companies::{self, BusinessMetricsInput};
use crate::types::Result;

#[derive(Debug, Deserialize)]
struct DepartmentsBody {
    #[serde(default)]
    departments: Vec<String>,
}

pub async fn handle(state: &AppState, req: &Request<Bytes>, path: &str) -> Result<Response<FullBody>> {
    let parts = segments(path, "/company-admin");
    let caller = state.caller_in(req, allow::COMPANY_ADMIN).await?;
    let query = Query::from_request(req);
    let company_id = companies::resolve_company(&caller, query.get("companyId"))?;
    let db = &state.db;
    let now = Utc::now();

    match (req.method(), parts.as_slice()) {
        (&Method::GET, ["business-metrics"]) => {
            let year = query.parse("year")?.unwrap_or(now.year());
            ok(companies::business_metrics(db, &company_id, year).await?)
        }
        (&Method::PUT, ["business-metrics"]) => {
            let body: BusinessMetricsInput = parse_json(req)?;
            let view = companies::set_business_metrics(db, &company_id, body, now.year()).await?;
            ok_with("Business metrics updated", view)
        }
        (&Method::GET, ["departments"]) => ok(companies::departments(db, &company_id).await?),
        (&Method::PUT, ["departments"]) => {
            let body: DepartmentsBody = parse_json(req)?;
            let departments = companies::set_departments(db, &company_id, body.departments).await?;
            ok_with("Departments updated", departments)
        }
        (&Method::GET, ["stats"]) => ok(companies::stats(db, &company_id, now).await?),
        (&Method::GET, ["employees"]) => ok(companies::employees(db, &company_id, now).await?),
        _ => route_not_found(),
    }
}
