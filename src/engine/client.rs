use std::borrow::Cow;

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

use crate::{
    common::util::BodyBytes,
    engine::{origin_of, rule::ReplyTemplate, Engine, Error},
    Method,
};

/// A request as seen by the engine.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: BodyBytes,
}

impl InterceptedRequest {
    /// `scheme://host:port` of the request URL.
    pub fn origin(&self) -> Option<String> {
        origin_of(&self.url)
    }
}

/// The response of a matched rule.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: BodyBytes,
}

impl Response {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The first value of a header. Header names are case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn bytes(&self) -> Bytes {
        self.body.to_bytes()
    }

    pub fn text(&self) -> Cow<'_, str> {
        self.body.to_maybe_lossy_str()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(serde_json::from_slice(self.body.as_ref())?)
    }
}

impl From<&ReplyTemplate> for Response {
    fn from(reply: &ReplyTemplate) -> Self {
        Self {
            status: reply.status,
            headers: reply.headers.clone(),
            body: reply.body.clone(),
        }
    }
}

/// Sends requests through an [`Engine`] instead of the network.
#[derive(Clone)]
pub struct Client {
    engine: Engine,
}

impl Client {
    pub(crate) fn new(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        RequestBuilder {
            engine: self.engine.clone(),
            method,
            url: Url::parse(url).map_err(|e| Error::InvalidRequest(format!("{}: {}", url, e))),
            headers: Vec::new(),
            body: BodyBytes::default(),
        }
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: &str) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    pub fn patch(&self, url: &str) -> RequestBuilder {
        self.request(Method::PATCH, url)
    }

    pub fn delete(&self, url: &str) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }
}

/// Builds a request. Errors are collected and reported by [`send`](RequestBuilder::send).
pub struct RequestBuilder {
    engine: Engine,
    method: Method,
    url: Result<Url, Error>,
    headers: Vec<(String, String)>,
    body: BodyBytes,
}

impl RequestBuilder {
    pub fn header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Appends query parameters to the URL.
    pub fn query<K: AsRef<str>, V: AsRef<str>>(mut self, params: &[(K, V)]) -> Self {
        if let Ok(url) = self.url.as_mut() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k.as_ref(), v.as_ref());
            }
        }
        self
    }

    /// Serializes `body` as JSON and sets `content-type: application/json` unless a content
    /// type was set before.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        match serde_json::to_vec(body) {
            Ok(encoded) => {
                self.body = BodyBytes::from(encoded);
                if !self.has_header("content-type") {
                    self = self.header("content-type", "application/json");
                }
            }
            Err(e) => self.url = Err(Error::Json(e)),
        }
        self
    }

    pub fn body<B: Into<Bytes>>(mut self, body: B) -> Self {
        let body: Bytes = body.into();
        self.body = BodyBytes::from(body);
        self
    }

    pub fn build(self) -> Result<(Engine, InterceptedRequest), Error> {
        let url = self.url?;

        for (name, value) in &self.headers {
            http::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::InvalidRequest(format!("header name {}: {}", name, e)))?;
            http::HeaderValue::from_str(value)
                .map_err(|e| Error::InvalidRequest(format!("header {}: {}", name, e)))?;
        }

        Ok((
            self.engine,
            InterceptedRequest {
                method: self.method,
                url,
                headers: self.headers,
                body: self.body,
            },
        ))
    }

    pub async fn send(self) -> Result<Response, Error> {
        let (engine, request) = self.build()?;
        tracing::trace!("Sending {} {}", request.method, request.url);
        engine.dispatch(&request)
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{common::util::Join, engine::ErrorCode};
    use serde_json::{json, Value};

    #[test]
    fn json_sets_content_type_test() {
        let engine = Engine::new();
        let (_, request) = engine
            .client()
            .post("http://example.com/foo")
            .query(&[("a", "b"), ("c", "d")])
            .json(&json!({ "foo": "bar" }))
            .build()
            .unwrap();

        assert_eq!(request.url.as_str(), "http://example.com/foo?a=b&c=d");
        assert_eq!(
            request.headers,
            vec![("content-type".to_string(), "application/json".to_string())]
        );
        assert_eq!(request.body.to_string(), "{\"foo\":\"bar\"}");
    }

    #[test]
    fn invalid_url_is_reported_on_send_test() {
        let engine = Engine::new();
        let err = engine.client().get("::nope::").send().join().unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }

    #[test]
    fn invalid_header_is_reported_on_send_test() {
        let engine = Engine::new();
        let err = engine
            .client()
            .get("http://example.com/")
            .header("bad header", "x")
            .send()
            .join()
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }

    #[test]
    fn matched_request_returns_reply_test() {
        let engine = Engine::new();
        engine
            .scope("http://example.com")
            .unwrap()
            .get("/users/1")
            .reply_header("x-version", "1")
            .reply_json(200, json!({ "name": "Fred" }));

        let response = engine
            .client()
            .get("http://example.com/users/1")
            .send()
            .join()
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.header("X-Version"), Some("1"));
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.json::<Value>().unwrap(), json!({ "name": "Fred" }));
    }
}
