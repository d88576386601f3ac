//! Knowledge-base resources
//!
//! - `GET /resources[?category=&kind=&search=]`
//! - `POST /resources` - counselors, advisors, super-admins
//! - `GET|PUT|DELETE /resources/{id}`
//! - `POST /resources/{id}/like` - toggle

use bytes::Bytes;
use hyper::{Method, Request, Response};

use crate::auth::allow;
use crate::db::schemas::ResourceKind;
use crate::routes::{created, ok, ok_with, parse_enum, parse_json, route_not_found, segments, FullBody, Query};
use crate::server::AppState;
use crate::services::resources::{self, ResourceInput, ResourceQuery, ResourceView};
use crate::types::Result;

pub async fn handle(state: &AppState, req: &Request<Bytes>, path: &str) -> Result<Response<FullBody>> {
    let parts = segments(path, "/resources");
    let db = &state.db;

    match (req.method(), parts.as_slice()) {
        (&Method::GET, []) => {
            let caller = state.caller(req).await?;
            let params = Query::from_request(req);
            let query = ResourceQuery {
                category: params.get("category").map(str::to_string),
                kind: params
                    .get("kind")
                    .map(|k| parse_enum::<ResourceKind>("kind", k))
                    .transpose()?,
                search: params.get("search").map(str::to_string),
            };
            let viewer = caller.viewer();
            let list = resources::list(db, &viewer, &query).await?;
            ok(list
                .iter()
                .map(|r| ResourceView::new(r, &viewer.id, false))
                .collect::<Vec<_>>())
        }

        (&Method::POST, []) => {
            let caller = state.caller_in(req, allow::CONTENT_AUTHORS).await?;
            let body: ResourceInput = parse_json(req)?;
            let resource = resources::create(db, &caller.viewer(), body).await?;
            created("Resource created", ResourceView::new(&resource, caller.id(), true))
        }

        (&Method::GET, [id]) => {
            let caller = state.caller(req).await?;
            let resource = resources::get(db, &caller.viewer(), id).await?;
            ok(ResourceView::new(&resource, caller.id(), true))
        }

        (&Method::PUT, [id]) => {
            let caller = state.caller_in(req, allow::CONTENT_AUTHORS).await?;
            let body: ResourceInput = parse_json(req)?;
            let resource = resources::update(db, &caller.viewer(), id, body).await?;
            ok_with("Resource updated", ResourceView::new(&resource, caller.id(), true))
        }

        (&Method::DELETE, [id]) => {
            let caller = state.caller_in(req, allow::CONTENT_AUTHORS).await?;
            resources::delete(db, &caller.viewer(), id).await?;
            ok_with("Resource deleted", serde_json::Value::Null)
        }

        (&Method::POST, [id, "like"]) | (&Method::PUT, [id, "like"]) => {
            let caller = state.caller(req).await?;
            let resource = resources::toggle_like(db, &caller.viewer(), id).await?;
            ok(ResourceView::new(&resource, caller.id(), false))
        }

        _ => route_not_found(),
    }
}
