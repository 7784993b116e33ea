use std::collections::BTreeMap;

use url::form_urlencoded;

use crate::api_defaults::API_VERSION;
use crate::config::ConfigProperties;

/// Named remote resource collections of the delivery API. Entries are nested
/// under their content type, so that variant owns the parent UID and a
/// malformed nested path cannot be built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    ContentTypes,
    Entries { content_type_uid: String },
    Assets,
    Taxonomies,
    Sync,
}

impl Endpoint {
    fn path(&self) -> String {
        match self {
            Endpoint::ContentTypes => "content_types".to_string(),
            Endpoint::Entries { content_type_uid } => {
                format!("content_types/{content_type_uid}/entries")
            }
            Endpoint::Assets => "assets".to_string(),
            Endpoint::Taxonomies => "taxonomies".to_string(),
            Endpoint::Sync => "stacks/sync".to_string(),
        }
    }
}

/// Query parameters for one request. Plain pairs are kept sorted by key so
/// the same logical query always renders the same URL, which keeps cache
/// keys stable across map iteration orders. The search query arrives
/// JSON-serialized from the query builder layer and is emitted as a single
/// `query` parameter.
#[derive(Clone, Debug, Default)]
pub struct QueryParams {
    params: BTreeMap<String, String>,
    search_query: Option<String>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.params.insert(key.into(), value.into());
    }

    pub fn with<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.add(key, value);
        self
    }

    pub fn with_search_query<S: Into<String>>(mut self, query_json: S) -> Self {
        self.search_query = Some(query_json.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.params.get(key)
    }

    /// Renders the parameters as a JSON body for tunneled POST requests.
    /// The map is key sorted, so the same logical query always produces the
    /// same body and hence the same cache key. The pre-serialized search
    /// query is embedded as a JSON value under `query`.
    pub fn to_body(&self, config: &impl ConfigProperties) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        for (key, value) in &self.params {
            body.insert(key.clone(), serde_json::Value::String(value.clone()));
        }
        if let Some(query_json) = &self.search_query {
            let value = serde_json::from_str(query_json)
                .unwrap_or(serde_json::Value::String(query_json.clone()));
            body.insert("query".to_string(), value);
        }
        body.insert(
            "environment".to_string(),
            serde_json::Value::String(config.environment().to_string()),
        );
        serde_json::Value::Object(body)
    }
}

/// Builds the absolute URL of an endpoint without any query string. This is
/// the request target of tunneled POST requests, whose query travels in the
/// body instead.
pub fn build_base_url(
    config: &impl ConfigProperties,
    endpoint: &Endpoint,
    uid: Option<&str>,
) -> String {
    let mut url = format!(
        "{}://{}/{}/{}",
        config.scheme(),
        config.host(),
        API_VERSION,
        endpoint.path()
    );
    if let Some(uid) = uid {
        url.push('/');
        url.push_str(uid);
    }
    url
}

/// Builds the absolute request URL for an endpoint. The environment is
/// always the trailing query parameter.
pub fn build_url(
    config: &impl ConfigProperties,
    endpoint: &Endpoint,
    uid: Option<&str>,
    params: &QueryParams,
) -> String {
    let url = build_base_url(config, endpoint, uid);
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in &params.params {
        serializer.append_pair(key, value);
    }
    if let Some(query_json) = &params.search_query {
        serializer.append_pair("query", query_json);
    }
    serializer.append_pair("environment", config.environment());
    format!("{}?{}", url, serializer.finish())
}
