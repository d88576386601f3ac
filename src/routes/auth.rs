//! Authentication endpoints
//!
//! - `POST /auth/login` - exchange credentials for a token
//! - `POST /auth/register` - employee self-registration
//! - `GET /auth/me` - the caller's profile

use bytes::Bytes;
use hyper::{Method, Request, Response};

use crate::routes::{created, ok, parse_json, route_not_found, FullBody};
use crate::server::AppState;
use crate::services::accounts::{self, LoginRequest, RegisterRequest, UserView};
use crate::types::Result;

pub async fn handle(state: &AppState, req: &Request<Bytes>, path: &str) -> Result<Response<FullBody>> {
    match (req.method(), path) {
        (&Method::POST, "/auth/login") => {
            let body: LoginRequest = parse_json(req)?;
            ok(accounts::login(&state.db, &state.jwt, body, state.system_rate()).await?)
        }
        (&Method::POST, "/auth/register") => {
            let body: RegisterRequest = parse_json(req)?;
            let user = accounts::register(&state.db, body).await?;
            created("Registration complete", UserView::new(&user, state.system_rate()))
        }
        (&Method::GET, "/auth/me") => {
            let caller = state.caller(req).await?;
            ok(UserView::new(&caller.user, state.system_rate()))
        }
        _ => route_not_found(),
    }
}
