//! Test harness driving the dispatcher against an in-memory store

#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::header::HeaderMap;
use hyper::{Method, Request, StatusCode};
use serde_json::Value;

use wellspring::auth::hash_password;
use wellspring::db::schemas::{CounselorProfile, RoleProfile, UserDoc};
use wellspring::db::Database;
use wellspring::server::dispatch;
use wellspring::{AppState, Args};

pub const PASSWORD: &str = "wellspring-2024";

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Reply {
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }
}

pub struct TestApp {
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        Self {
            state: AppState::new(Args::dev(), Database::memory()).expect("dev state"),
        }
    }

    pub fn db(&self) -> &Database {
        &self.state.db
    }

    pub async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Reply {
        self.send_with(method, uri, token, body, &[]).await
    }

    pub async fn send_with(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
        extra: &[(&str, &str)],
    ) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        for (name, value) in extra {
            builder = builder.header(*name, *value);
        }
        let bytes = body.map(|b| Bytes::from(b.to_string())).unwrap_or_default();
        let response = dispatch(&self.state, builder.body(bytes).expect("request")).await;

        let status = response.status();
        let headers = response.headers().clone();
        let raw = response.into_body().collect().await.expect("body").to_bytes();
        let body = if raw.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&raw).expect("json body")
        };
        Reply { status, headers, body }
    }

    pub async fn get(&self, uri: &str, token: &str) -> Reply {
        self.send(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> Reply {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> Reply {
        self.send(Method::PUT, uri, Some(token), Some(body)).await
    }

    /// Insert a user straight into the store and return its id
    pub async fn seed_user(&self, email: &str, name: &str, profile: RoleProfile) -> String {
        let user = UserDoc::new(email, hash_password(PASSWORD).expect("hash"), name, profile)
            .expect("valid user");
        let id = user.id.clone();
        self.db().collection::<UserDoc>().insert_one(user).await.expect("insert user");
        id
    }

    pub async fn seed_counselor(&self, email: &str) -> String {
        self.seed_user(email, "Counselor", RoleProfile::Counselor(CounselorProfile::default()))
            .await
    }

    pub async fn login(&self, email: &str) -> String {
        let reply = self
            .send(
                Method::POST,
                "/auth/login",
                None,
                Some(serde_json::json!({ "email": email, "password": PASSWORD })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK, "login failed: {}", reply.body);
        reply.data()["token"].as_str().expect("token").to_string()
    }

    /// Seeded super-admin and its token
    pub async fn super_admin(&self) -> (String, String) {
        let id = self
            .seed_user("root@wellspring.kr", "Root", RoleProfile::SuperAdmin)
            .await;
        (id, self.login("root@wellspring.kr").await)
    }

    /// Company created over HTTP with a company-admin account; returns its id
    pub async fn company(&self, admin_token: &str, domain: &str) -> String {
        let reply = self
            .post(
                "/super-admin/companies",
                admin_token,
                serde_json::json!({
                    "name": domain,
                    "domain": domain,
                    "balance": 1_000_000,
                    "departments": ["Sales", "R&D"],
                    "admin": {
                        "email": format!("hr@{domain}"),
                        "password": PASSWORD,
                        "name": "HR"
                    }
                }),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
        reply.data()["company"]["id"].as_str().expect("company id").to_string()
    }

    /// Account created over HTTP by a super-admin; returns its id
    pub async fn account(&self, admin_token: &str, email: &str, role: &str, company: Option<&str>) -> String {
        let reply = self
            .post(
                "/super-admin/users",
                admin_token,
                serde_json::json!({
                    "email": email,
                    "password": PASSWORD,
                    "name": email,
                    "role": role,
                    "company": company,
                    "department": "Sales"
                }),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
        reply.data()["id"].as_str().expect("user id").to_string()
    }
}
