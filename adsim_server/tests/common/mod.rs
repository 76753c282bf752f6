#![allow(dead_code)]

use adsim_server::{AppState, SimConfig, build_app};
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use serde_json::Value;
use tower::ServiceExt;

pub fn app() -> Router {
    build_app(AppState::default())
}

pub fn app_with(config: SimConfig) -> Router {
    build_app(AppState::from_config(&config))
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Builder for one request against the router.
pub struct Call {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    body: Body,
}

impl Call {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Call { method, uri: uri.into(), headers: Vec::new(), body: Body::empty() }
    }

    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn post(uri: impl Into<String>) -> Self {
        Self::new(Method::POST, uri)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("authorization", &format!("Bearer {}", token))
    }

    pub fn json(mut self, body: Value) -> Self {
        self.headers.push((header::CONTENT_TYPE.to_string(), "application/json".to_string()));
        self.body = Body::from(body.to_string());
        self
    }

    pub fn form(mut self, body: &str) -> Self {
        self.headers.push((
            header::CONTENT_TYPE.to_string(),
            "application/x-www-form-urlencoded".to_string(),
        ));
        self.body = Body::from(body.to_string());
        self
    }

    pub async fn send(self, app: &Router) -> Reply {
        let mut request = Request::builder().method(self.method).uri(self.uri);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = app
            .clone()
            .oneshot(request.body(self.body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        Reply { status, headers, body }
    }
}

/// Query pairs of a redirect `Location`.
pub fn location_params(reply: &Reply) -> Vec<(String, String)> {
    let location = reply.headers[header::LOCATION].to_str().unwrap();
    url::Url::parse(location)
        .unwrap()
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

pub fn param<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}
