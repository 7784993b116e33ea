use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api_defaults::MAX_QUERY_URL_LEN;
use crate::config::ConfigProperties;
use crate::error::{self, CdaError};
use crate::http::{Method, Request, RequestDescriptor};
use crate::io::{HttpResponse, HttpRunner};
use crate::query::{build_base_url, build_url, Endpoint, QueryParams};
use crate::{Error, Result};

/// Decides whether a dispatch hits network, cache, or both, and in what
/// order. Attached to a query at construction; never mutated mid-flight.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CachePolicy {
    #[default]
    NetworkOnly,
    CacheOnly,
    CacheElseNetwork,
    NetworkElseCache,
    CacheThenNetwork,
}

/// Where a reported outcome came from. Callers use this to tell a stale
/// cache answer from a fresh one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    Network,
    Cache,
}

/// One logical attempt's result. `CacheThenNetwork` produces two of these
/// for a single dispatch, every other policy exactly one.
#[derive(Debug)]
pub struct FetchOutcome {
    pub result: Result<HttpResponse>,
    pub origin: Origin,
}

impl FetchOutcome {
    fn success(response: HttpResponse, origin: Origin) -> Self {
        FetchOutcome {
            result: Ok(response),
            origin,
        }
    }

    fn failure(err: Error, origin: Origin) -> Self {
        FetchOutcome {
            result: Err(err),
            origin,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

fn network<T: Serialize, R: HttpRunner<Response = HttpResponse>>(
    runner: &R,
    request: &mut Request<T>,
) -> FetchOutcome {
    match runner.run(request) {
        Ok(response) => FetchOutcome::success(response, Origin::Network),
        Err(err) => FetchOutcome::failure(err, Origin::Network),
    }
}

fn cache_lookup<R: HttpRunner<Response = HttpResponse>>(
    runner: &R,
    descriptor: &RequestDescriptor,
) -> FetchOutcome {
    match runner.lookup_cache(descriptor) {
        Ok(Some(response)) => {
            debug!("cache hit for {}", descriptor.url());
            FetchOutcome::success(response, Origin::Cache)
        }
        Ok(None) => FetchOutcome::failure(
            CdaError::CacheMiss(descriptor.url().to_string()).into(),
            Origin::Cache,
        ),
        Err(err) => FetchOutcome::failure(err, Origin::Cache),
    }
}

/// Runs one logical dispatch under the given policy. The callback fires
/// once, except for `CacheThenNetwork` where it fires exactly twice: the
/// cache outcome first, then the network outcome, regardless of either
/// result.
pub fn dispatch<T, R, F>(runner: &R, request: &mut Request<T>, policy: CachePolicy, mut on_outcome: F)
where
    T: Serialize,
    R: HttpRunner<Response = HttpResponse>,
    F: FnMut(FetchOutcome),
{
    let descriptor = request.descriptor();
    match policy {
        CachePolicy::NetworkOnly => on_outcome(network(runner, request)),
        CachePolicy::CacheOnly => on_outcome(cache_lookup(runner, &descriptor)),
        CachePolicy::CacheElseNetwork => {
            let outcome = cache_lookup(runner, &descriptor);
            if outcome.is_success() {
                on_outcome(outcome);
                return;
            }
            on_outcome(network(runner, request));
        }
        CachePolicy::NetworkElseCache => {
            let outcome = network(runner, request);
            if outcome.is_success() {
                on_outcome(outcome);
                return;
            }
            match runner.lookup_cache(&descriptor) {
                Ok(Some(response)) => {
                    debug!("network failed, served {} from cache", descriptor.url());
                    on_outcome(FetchOutcome::success(response, Origin::Cache));
                }
                // The original network error is more specific than a cache
                // miss and must not be masked by it.
                _ => on_outcome(outcome),
            }
        }
        CachePolicy::CacheThenNetwork => {
            on_outcome(cache_lookup(runner, &descriptor));
            on_outcome(network(runner, request));
        }
    }
}

/// Typed single-result facade over `dispatch`. Builds the URL, runs the
/// policy and decodes the settling outcome, which for `CacheThenNetwork` is
/// the network one.
pub fn fetch<T, R, D>(
    runner: &R,
    config: &D,
    endpoint: &Endpoint,
    uid: Option<&str>,
    params: &QueryParams,
    policy: CachePolicy,
) -> Result<(T, Origin)>
where
    T: DeserializeOwned,
    R: HttpRunner<Response = HttpResponse>,
    D: ConfigProperties,
{
    let url = build_url(config, endpoint, uid, params);
    let mut settled: Option<FetchOutcome> = None;
    if url.len() > MAX_QUERY_URL_LEN {
        // The query string no longer fits in the URL. Tunnel it as a POST
        // body with the override header so the server still treats it as a
        // read and the cache key normalizes back to GET.
        debug!("query string over URL limit, tunneling as POST");
        let base = build_base_url(config, endpoint, uid);
        let mut request = Request::new(&base, Method::POST)
            .with_body(params.to_body(config))
            .with_method_override();
        dispatch(runner, &mut request, policy, |outcome| {
            settled = Some(outcome);
        });
    } else {
        let mut request: Request<()> = Request::new(&url, Method::GET);
        dispatch(runner, &mut request, policy, |outcome| {
            settled = Some(outcome);
        });
    }
    let outcome = settled.ok_or_else(|| error::gen("dispatch produced no outcome"))?;
    let response = outcome.result?;
    let value = serde_json::from_str::<T>(&response.body)
        .map_err(|e| CdaError::Decode(e.to_string()))?;
    Ok((value, outcome.origin))
}
