use crate::api_defaults::METHOD_OVERRIDE_HEADER;
use crate::cache::Cache;
use crate::config::ConfigProperties;
use crate::error::{ApiErrorBody, CdaError};
use crate::io::{HttpResponse, HttpRunner};
use crate::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{hash_map, HashMap};
use std::fmt::{self, Display, Formatter};
use ureq::Error;

/// Executes requests against the delivery host. The cache instance is owned
/// by the client and shared by every dispatch going through it.
pub struct Client<C, D> {
    cache: C,
    config: D,
}

impl<C, D> Client<C, D> {
    pub fn new(cache: C, config: D) -> Self {
        Client { cache, config }
    }
}

impl<C: Cache, D: ConfigProperties> Client<C, D> {
    fn get<T>(&self, request: &Request<T>) -> Result<HttpResponse> {
        let ureq_req = ureq::get(request.url());
        let ureq_req = request
            .headers()
            .iter()
            .fold(ureq_req, |req, (key, value)| req.set(key, value));
        match ureq_req.call() {
            Ok(response) => build_response(response),
            Err(Error::Status(_, response)) => {
                // ureq returns error on status codes >= 400, the status is
                // preserved in the response for classification.
                build_response(response)
            }
            Err(err) => Err(CdaError::Transport(err.to_string()).into()),
        }
    }

    fn post<T: Serialize>(&self, request: &Request<T>) -> Result<HttpResponse> {
        let ureq_req = ureq::post(request.url());
        let ureq_req = request
            .headers()
            .iter()
            .fold(ureq_req, |req, (key, value)| req.set(key, value));
        let body = match &request.body {
            Some(body) => serde_json::to_value(body)
                .map_err(|e| CdaError::Decode(e.to_string()))?,
            None => serde_json::Value::Null,
        };
        match ureq_req.send_json(body) {
            Ok(response) => build_response(response),
            Err(Error::Status(_, response)) => build_response(response),
            Err(err) => Err(CdaError::Transport(err.to_string()).into()),
        }
    }

    fn set_auth_headers<T>(&self, cmd: &mut Request<T>) {
        cmd.set_header("api_key", self.config.api_key());
        cmd.set_header("access_token", self.config.delivery_token());
        if let Some(branch) = self.config.branch() {
            cmd.set_header("branch", branch);
        }
    }
}

fn build_response(response: ureq::Response) -> Result<HttpResponse> {
    let status: i32 = response.status().into();
    let headers = response
        .headers_names()
        .iter()
        .fold(Headers::new(), |mut headers, name| {
            if let Some(value) = response.header(name.as_str()) {
                headers.set(name.to_lowercase(), value);
            }
            headers
        });
    let body = response
        .into_string()
        .map_err(|e| CdaError::Transport(e.to_string()))?;
    let response = HttpResponse::builder()
        .status(status)
        .body(body)
        .headers(headers)
        .build()?;
    Ok(response)
}

/// Maps a non 2xx response to its structured error when the body carries
/// one, else reports it as unparseable.
pub fn classify(response: HttpResponse) -> Result<HttpResponse> {
    if response.is_ok() {
        return Ok(response);
    }
    match serde_json::from_str::<ApiErrorBody>(&response.body) {
        Ok(body) => Err(CdaError::from(body).into()),
        Err(_) => Err(CdaError::UnparseableResponse(response.status).into()),
    }
}

impl<C: Cache, D: ConfigProperties> HttpRunner for Client<C, D> {
    type Response = HttpResponse;

    fn run<T: Serialize>(&self, cmd: &mut Request<T>) -> Result<Self::Response> {
        self.set_auth_headers(cmd);
        let response = match cmd.method {
            Method::GET => self.get(cmd)?,
            Method::POST => self.post(cmd)?,
        };
        let response = classify(response)?;
        // Best effort. A failing store must not fail the fetch itself.
        if let Err(err) = self.cache.store(&cmd.descriptor(), &response) {
            debug!("response cache store failed: {}", err);
        }
        Ok(response)
    }

    fn lookup_cache(&self, descriptor: &RequestDescriptor) -> Result<Option<Self::Response>> {
        self.cache.lookup(descriptor)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Headers(HashMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Headers(HashMap::new())
    }

    pub fn set<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.0.get(key)
    }

    pub fn iter(&self) -> hash_map::Iter<String, String> {
        self.0.iter()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Method {
    #[default]
    GET,
    POST,
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Method::GET => write!(f, "GET"),
            Method::POST => write!(f, "POST"),
        }
    }
}

/// The normalized identity of one logical request, used as the cache key.
/// A POST carrying a GET method-override header is the same logical request
/// as the equivalent GET, so both normalize to the same key. Tunneled
/// requests carry their query in the body, so the body participates in the
/// key as well.
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
    method: Method,
    url: String,
    headers: Headers,
    body: Option<String>,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: &str, headers: Headers) -> Self {
        RequestDescriptor {
            method,
            url: url.to_string(),
            headers,
            body: None,
        }
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn canonical_method(&self) -> Method {
        if let Some(value) = self.headers.get(METHOD_OVERRIDE_HEADER) {
            if value.eq_ignore_ascii_case("GET") {
                return Method::GET;
            }
        }
        self.method
    }

    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{} {}", self.canonical_method(), self.url));
        if let Some(body) = &self.body {
            hasher.update("\n");
            hasher.update(body);
        }
        let hash = hasher.finalize();
        format!("{hash:x}")
    }
}

#[derive(Builder)]
#[builder(pattern = "owned")]
pub struct Request<T> {
    #[builder(setter(into, strip_option), default)]
    body: Option<T>,
    #[builder(default)]
    headers: Headers,
    method: Method,
    url: String,
}

impl<T> Request<T> {
    pub fn builder() -> RequestBuilder<T> {
        RequestBuilder::default()
    }

    pub fn new(url: &str, method: Method) -> Self {
        Request {
            body: None,
            headers: Headers::new(),
            method,
            url: url.to_string(),
        }
    }

    /// Marks a POST request as a tunneled GET. Used when the query string
    /// would exceed the URL length limit and has to travel in the body.
    pub fn with_method_override(mut self) -> Self {
        self.headers.set(METHOD_OVERRIDE_HEADER, "GET");
        self
    }

    pub fn with_body(mut self, body: T) -> Self {
        self.body = Some(body);
        self
    }

    pub fn set_header(&mut self, key: &str, value: &str) {
        self.headers.set(key, value);
    }

    pub fn set_url(&mut self, url: &str) {
        self.url = url.to_string();
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn method(&self) -> Method {
        self.method
    }
}

impl<T: Serialize> Request<T> {
    pub fn descriptor(&self) -> RequestDescriptor {
        let descriptor = RequestDescriptor::new(self.method, &self.url, self.headers.clone());
        match &self.body {
            Some(body) => match serde_json::to_string(body) {
                Ok(json) => descriptor.with_body(json),
                Err(_) => descriptor,
            },
            None => descriptor,
        }
    }
}
