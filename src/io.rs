use crate::http::{Headers, Request, RequestDescriptor};
use crate::Result;
use serde::Serialize;

/// A trait for the HTTP protocol. Implementors accept a `Request` that wraps
/// headers, an optional payload and the HTTP method. Clients can do HTTP
/// calls against the remote delivery host or mock the responses for testing
/// purposes. `run` is the network path: it never consults the cache for
/// reads, although implementors are expected to store successful responses.
pub trait HttpRunner {
    type Response;
    fn run<T: Serialize>(&self, cmd: &mut Request<T>) -> Result<Self::Response>;
    /// Read side of the response cache for the given descriptor. A miss is
    /// `Ok(None)`.
    fn lookup_cache(&self, descriptor: &RequestDescriptor) -> Result<Option<Self::Response>>;
}

/// Adapts lower level HTTP outputs to a common response type.
#[derive(Clone, Debug, Builder)]
pub struct HttpResponse {
    #[builder(default)]
    pub status: i32,
    #[builder(default)]
    pub body: String,
    /// Optional headers as returned by the remote.
    #[builder(setter(into, strip_option), default)]
    pub headers: Option<Headers>,
}

impl HttpResponse {
    pub fn builder() -> HttpResponseBuilder {
        HttpResponseBuilder::default()
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .as_ref()
            .and_then(|h| h.get(key))
            .map(|s| s.as_str())
    }

    pub fn is_ok(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Approximate memory footprint, used by budgeted cache stores.
    pub fn size_bytes(&self) -> usize {
        let headers = self
            .headers
            .as_ref()
            .map(|h| h.iter().map(|(k, v)| k.len() + v.len()).sum())
            .unwrap_or(0);
        self.body.len() + headers
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_response_ok_2xx_only() {
        for status in [200, 201, 204, 299] {
            let response = HttpResponse::builder().status(status).build().unwrap();
            assert!(response.is_ok());
        }
        for status in [199, 301, 304, 404, 500] {
            let response = HttpResponse::builder().status(status).build().unwrap();
            assert!(!response.is_ok());
        }
    }

    #[test]
    fn test_response_size_counts_body_and_headers() {
        let mut headers = Headers::new();
        headers.set("content-type", "application/json");
        let response = HttpResponse::builder()
            .status(200)
            .body("0123456789".to_string())
            .headers(headers)
            .build()
            .unwrap();
        assert_eq!(10 + "content-type".len() + "application/json".len(), response.size_bytes());
    }

    #[test]
    fn test_response_header_lookup() {
        let mut headers = Headers::new();
        headers.set("etag", "abc");
        let response = HttpResponse::builder()
            .status(200)
            .headers(headers)
            .build()
            .unwrap();
        assert_eq!(Some("abc"), response.header("etag"));
        assert_eq!(None, response.header("link"));
    }
}
