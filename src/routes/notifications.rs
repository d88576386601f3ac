//! In-app notifications
//!
//! - `GET /notifications[?unread=true]`
//! - `PUT /notifications/{id}` - mark read
//! - `DELETE /notifications/{id}`
//! - `POST /notifications` - super-admin announcement, `{ title, message, role? }`

use bytes::Bytes;
use hyper::{Method, Request, Response};
use serde::{Deserialize, Serialize};

use crate::auth::{allow, Role};
use crate::routes::{created, ok, ok_with, parse_json, route_not_found, segments, FullBody, Query};
use crate::server::AppState;
use crate::services::notifications;
use crate::types::Result;

#[derive(Debug, Deserialize)]
struct AnnouncementBody {
    #[serde(default)]
    title: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    role: Option<Role>,
}

#[derive(Debug, Serialize)]
struct Delivered {
    recipients: usize,
}

pub async fn handle(state: &AppState, req: &Request<Bytes>, path: &str) -> Result<Response<FullBody>> {
    let parts = segments(path, "/notifications");
    let db = &state.db;

    match (req.method(), parts.as_slice()) {
        (&Method::GET, []) => {
            let caller = state.caller(req).await?;
            let unread_only = Query::from_request(req).flag("unread");
            ok(notifications::list_for(db, caller.id(), unread_only).await?)
        }

        (&Method::POST, []) => {
            state.caller_in(req, allow::SUPER_ADMIN).await?;
            let body: AnnouncementBody = parse_json(req)?;
            let recipients =
                notifications::broadcast(db, state.sink(), &body.title, &body.message, body.role)
                    .await?;
            created("Announcement sent", Delivered { recipients })
        }

        (&Method::PUT, [id]) => {
            let caller = state.caller(req).await?;
            ok(notifications::mark_read(db, caller.id(), id).await?)
        }

        (&Method::DELETE, [id]) => {
            let caller = state.caller(req).await?;
            notifications::delete(db, caller.id(), id).await?;
            ok_with("Notification deleted", serde_json::Value::Null)
        }

        _ => route_not_found(),
    }
}
