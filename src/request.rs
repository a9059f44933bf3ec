//! Incoming HTTP request type.
//!
//! A [`Request`] is the per-call request context. It is built once per
//! inbound call, handed to the matched handler (or moved into an
//! [`Invocation`](crate::Invocation) for controller actions), and dropped with
//! it. Nothing reads it from outside that call.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use tracing::debug;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// An incoming HTTP request.
pub struct Request {
    pub(crate) method: String,
    pub(crate) path: String,
    pub(crate) url: String,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) parameters: Vec<(String, String)>,
}

impl Request {
    /// Converts an `http::Request` with a fully collected body.
    ///
    /// Request parameters are read from the query string and, for
    /// `application/x-www-form-urlencoded` bodies, from the body, in that
    /// order.
    pub fn from_http(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::from_parts(parts, body)
    }

    pub(crate) fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        let headers: Vec<(String, String)> = parts.headers.iter()
            .filter_map(|(k, v)| Some((k.as_str().to_owned(), v.to_str().ok()?.to_owned())))
            .collect();

        let mut parameters = decode_pairs(parts.uri.query().unwrap_or("").as_bytes());
        let is_form = headers.iter().any(|(k, v)| {
            k.eq_ignore_ascii_case("content-type") && is_form_media_type(v)
        });
        if is_form {
            parameters.extend(decode_pairs(&body));
        }

        let path = parts.uri.path().to_owned();
        let scheme = parts.uri.scheme_str().unwrap_or("http");
        let host = parts.uri.authority().map(|a| a.as_str().to_owned())
            .or_else(|| {
                headers.iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case("host"))
                    .map(|(_, v)| v.clone())
            })
            .unwrap_or_else(|| "localhost".to_owned());
        let url = format!("{scheme}://{host}{path}");

        Self {
            method: parts.method.as_str().to_owned(),
            path,
            url,
            headers,
            body,
            params: HashMap::new(),
            parameters,
        }
    }

    pub fn method(&self) -> &str { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Absolute request URL without the query string, e.g.
    /// `http://localhost:8080/loginController/login2`.
    pub fn url(&self) -> &str { &self.url }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns a request parameter (query string or form body).
    ///
    /// When a name repeats, the last value wins.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.parameters.iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every request parameter pair, in arrival order, duplicates included.
    pub fn parameters(&self) -> &[(String, String)] {
        &self.parameters
    }

    /// Request parameters folded into a map; the last value of a repeated
    /// name wins.
    pub fn parameter_map(&self) -> BTreeMap<&str, &str> {
        self.parameters.iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

/// Media types are case-insensitive and may carry parameters (`; charset=...`).
fn is_form_media_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
}

fn decode_pairs(raw: &[u8]) -> Vec<(String, String)> {
    if raw.is_empty() {
        return Vec::new();
    }
    serde_urlencoded::from_bytes(raw).unwrap_or_else(|e| {
        debug!("ignoring undecodable request parameters: {e}");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> http::request::Builder {
        http::Request::builder().uri(uri).header("host", "localhost:8080")
    }

    #[test]
    fn builds_url_and_parameters_from_query() {
        let req = Request::from_http(
            request("/loginController/login2?name=abc&age=18").body(Bytes::new()).unwrap(),
        );

        assert_eq!(req.url(), "http://localhost:8080/loginController/login2");
        assert_eq!(req.path(), "/loginController/login2");
        assert_eq!(req.query("name"), Some("abc"));
        assert_eq!(req.query("age"), Some("18"));
        assert_eq!(req.query("missing"), None);
    }

    #[test]
    fn repeated_names_last_write_wins() {
        let req = Request::from_http(request("/x?a=1&b=2&a=3").body(Bytes::new()).unwrap());

        assert_eq!(req.parameters().len(), 3);
        assert_eq!(req.query("a"), Some("3"));
        let map = req.parameter_map();
        assert_eq!(map.get("a"), Some(&"3"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn form_body_follows_query() {
        let req = Request::from_http(
            request("/x?name=query")
                .method("POST")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Bytes::from_static(b"name=form+value&age=7"))
                .unwrap(),
        );

        assert_eq!(req.query("name"), Some("form value"));
        assert_eq!(req.query("age"), Some("7"));
        assert_eq!(req.parameters()[0], ("name".to_owned(), "query".to_owned()));
    }

    #[test]
    fn non_form_body_is_not_parsed() {
        let req = Request::from_http(
            request("/x")
                .method("POST")
                .header("content-type", "application/json")
                .body(Bytes::from_static(b"name=nope"))
                .unwrap(),
        );

        assert!(req.parameters().is_empty());
        assert_eq!(req.body(), b"name=nope");
    }

    #[test]
    fn form_media_type_ignores_case_and_parameters() {
        let req = Request::from_http(
            request("/x")
                .method("POST")
                .header("Content-Type", "Application/X-WWW-Form-Urlencoded; charset=UTF-8")
                .body(Bytes::from_static(b"name=abc"))
                .unwrap(),
        );

        assert_eq!(req.query("name"), Some("abc"));
        assert!(!is_form_media_type("application/x-www-form-urlencodedx"));
    }
}
