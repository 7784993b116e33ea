use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use crate::config::ConfigProperties;
use crate::error::CdaError;
use crate::http::{Method, Request};
use crate::io::{HttpResponse, HttpRunner};
use crate::query::{build_url, Endpoint, QueryParams};
use crate::Result;

/// Running state of an incremental sync. Exactly one of three shapes holds:
/// initial (both tokens empty), paginating (pagination token set) or settled
/// (sync token set, resumable for future delta fetches). A page is replaced
/// wholesale on every response.
#[derive(Clone, Debug, Default)]
pub struct SyncState {
    sync_token: String,
    pagination_token: String,
    total_count: i64,
    items: Vec<serde_json::Value>,
}

impl SyncState {
    pub fn new(
        sync_token: &str,
        pagination_token: &str,
        total_count: i64,
        items: Vec<serde_json::Value>,
    ) -> Result<Self> {
        if !sync_token.is_empty() && !pagination_token.is_empty() {
            return Err(CdaError::Configuration(
                "sync token and pagination token are mutually exclusive".to_string(),
            )
            .into());
        }
        Ok(SyncState {
            sync_token: sync_token.to_string(),
            pagination_token: pagination_token.to_string(),
            total_count,
            items,
        })
    }

    /// Resumable state for a delta fetch after a settled sync.
    pub fn from_sync_token(token: &str) -> Result<Self> {
        SyncState::new(token, "", 0, Vec::new())
    }

    fn from_page(page: SyncPage) -> Result<Self> {
        let sync_token = page.sync_token.unwrap_or_default();
        let pagination_token = page.pagination_token.unwrap_or_default();
        if sync_token.is_empty() && pagination_token.is_empty() {
            return Err(CdaError::Configuration(
                "sync page carries neither a sync token nor a pagination token".to_string(),
            )
            .into());
        }
        SyncState::new(&sync_token, &pagination_token, page.total_count, page.items)
    }

    pub fn sync_token(&self) -> &str {
        &self.sync_token
    }

    pub fn pagination_token(&self) -> &str {
        &self.pagination_token
    }

    pub fn total_count(&self) -> i64 {
        self.total_count
    }

    pub fn items(&self) -> &[serde_json::Value] {
        &self.items
    }

    pub fn has_more_pages(&self) -> bool {
        !self.pagination_token.is_empty()
    }

    fn is_initial(&self) -> bool {
        self.sync_token.is_empty() && self.pagination_token.is_empty()
    }
}

/// Wire shape of one sync page. The server returns either a sync token or a
/// pagination token, never both.
#[derive(Debug, Deserialize)]
struct SyncPage {
    #[serde(default)]
    sync_token: Option<String>,
    #[serde(default)]
    pagination_token: Option<String>,
    #[serde(default)]
    total_count: i64,
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

/// Filters applied to the initial sync request. Several can be combined;
/// their query fragments are unioned.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncType {
    All,
    ContentType(String),
    Locale(String),
    StartFrom(DateTime<Utc>),
    PublishType(PublishType),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishType {
    EntryPublished,
    AssetPublished,
    EntryUnpublished,
    AssetUnpublished,
    EntryDeleted,
    AssetDeleted,
    ContentTypeDeleted,
}

impl PublishType {
    fn as_str(&self) -> &str {
        match self {
            PublishType::EntryPublished => "entry_published",
            PublishType::AssetPublished => "asset_published",
            PublishType::EntryUnpublished => "entry_unpublished",
            PublishType::AssetUnpublished => "asset_unpublished",
            PublishType::EntryDeleted => "entry_deleted",
            PublishType::AssetDeleted => "asset_deleted",
            PublishType::ContentTypeDeleted => "content_type_deleted",
        }
    }
}

fn apply_filters(types: &[SyncType], params: &mut QueryParams) {
    let mut publish_types: Vec<&str> = Vec::new();
    for sync_type in types {
        match sync_type {
            SyncType::All => {}
            SyncType::ContentType(uid) => params.add("content_type_uid", uid.clone()),
            SyncType::Locale(code) => params.add("locale", code.clone()),
            SyncType::StartFrom(date) => params.add(
                "start_from",
                date.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            SyncType::PublishType(publish_type) => publish_types.push(publish_type.as_str()),
        }
    }
    if !publish_types.is_empty() {
        params.add("type", publish_types.join(","));
    }
}

/// Drives repeated fetches against the sync endpoint, one page per
/// `on_page` call, continuing automatically while the server hands back a
/// pagination token. Pages always come from the network; serving sync state
/// from cache would silently drop events. A failed page halts the loop and
/// propagates, the caller resumes from the last state it observed.
pub fn sync<R, D, F>(
    runner: &R,
    config: &D,
    state: Option<SyncState>,
    types: &[SyncType],
    mut on_page: F,
) -> Result<SyncState>
where
    R: HttpRunner<Response = HttpResponse>,
    D: ConfigProperties,
    F: FnMut(&SyncState),
{
    let mut current = state.unwrap_or_default();
    loop {
        let mut params = QueryParams::new();
        if current.has_more_pages() {
            params.add("pagination_token", current.pagination_token());
        } else if !current.sync_token().is_empty() {
            params.add("sync_token", current.sync_token());
        } else {
            params.add("init", "true");
            apply_filters(types, &mut params);
        }
        let url = build_url(config, &Endpoint::Sync, None, &params);
        debug!(
            "sync request: initial={} paginating={}",
            current.is_initial(),
            current.has_more_pages()
        );
        let mut request: Request<()> = Request::new(&url, Method::GET);
        let response = runner.run(&mut request)?;
        let page: SyncPage = serde_json::from_str(&response.body)
            .map_err(|e| CdaError::Decode(e.to_string()))?;
        current = SyncState::from_page(page)?;
        // The next request's token derives from the state the caller just
        // observed, so the callback runs before any continuation.
        on_page(&current);
        if !current.has_more_pages() {
            info!("sync settled after {} items", current.total_count());
            return Ok(current);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::utils::{ConfigMock, MockRunner};
    use chrono::TimeZone;

    fn page_response(body: &str) -> HttpResponse {
        HttpResponse::builder()
            .status(200)
            .body(body.to_string())
            .build()
            .unwrap()
    }

    #[test]
    fn test_sync_state_rejects_both_tokens() {
        let err = SyncState::new("sync1", "page1", 0, Vec::new()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CdaError>(),
            Some(CdaError::Configuration(_))
        ));
    }

    #[test]
    fn test_sync_state_from_page_rejects_tokenless_page() {
        let page = SyncPage {
            sync_token: None,
            pagination_token: None,
            total_count: 0,
            items: Vec::new(),
        };
        assert!(SyncState::from_page(page).is_err());
    }

    #[test]
    fn test_initial_sync_single_page_settles() {
        let runner = MockRunner::new(vec![page_response(
            r#"{"sync_token":"stoken","items":[{"uid":"blt1"}],"total_count":1}"#,
        )]);
        let mut pages = 0;
        let state = sync(&runner, &ConfigMock::new(), None, &[SyncType::All], |page| {
            pages += 1;
            assert_eq!(1, page.items().len());
        })
        .unwrap();
        assert_eq!(1, pages);
        assert_eq!("stoken", state.sync_token());
        assert!(!state.has_more_pages());
        let urls = runner.urls.borrow();
        assert_eq!(1, urls.len());
        assert!(urls[0].contains("init=true"));
        assert!(urls[0].contains("/v3/stacks/sync"));
        // an unfiltered sync carries no type fragments
        assert!(!urls[0].contains("content_type_uid="));
        assert!(!urls[0].contains("type="));
    }

    #[test]
    fn test_pagination_token_triggers_automatic_continuation() {
        // Mock responses pop from the end: first the paginated page, then
        // the settling one.
        let runner = MockRunner::new(vec![
            page_response(r#"{"sync_token":"stoken","items":[],"total_count":5}"#),
            page_response(r#"{"pagination_token":"p1","items":[{},{}],"total_count":5}"#),
        ]);
        let mut observed: Vec<bool> = Vec::new();
        let state = sync(&runner, &ConfigMock::new(), None, &[SyncType::All], |page| {
            observed.push(page.has_more_pages());
        })
        .unwrap();
        assert_eq!(vec![true, false], observed);
        assert_eq!("stoken", state.sync_token());
        let urls = runner.urls.borrow();
        assert_eq!(2, urls.len());
        assert!(urls[0].contains("init=true"));
        assert!(urls[1].contains("pagination_token=p1"));
        // continuation carries the token alone, no init marker or filters
        assert!(!urls[1].contains("init="));
    }

    #[test]
    fn test_delta_sync_uses_sync_token() {
        let runner = MockRunner::new(vec![page_response(
            r#"{"sync_token":"stoken2","items":[],"total_count":0}"#,
        )]);
        let resume = SyncState::from_sync_token("stoken1").unwrap();
        let state = sync(
            &runner,
            &ConfigMock::new(),
            Some(resume),
            &[SyncType::All],
            |_page| {},
        )
        .unwrap();
        assert_eq!("stoken2", state.sync_token());
        let urls = runner.urls.borrow();
        assert!(urls[0].contains("sync_token=stoken1"));
        assert!(!urls[0].contains("init="));
    }

    #[test]
    fn test_initial_sync_filters_are_unioned() {
        let runner = MockRunner::new(vec![page_response(
            r#"{"sync_token":"stoken","items":[],"total_count":0}"#,
        )]);
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let types = vec![
            SyncType::ContentType("blog_post".to_string()),
            SyncType::Locale("en-us".to_string()),
            SyncType::StartFrom(start),
            SyncType::PublishType(PublishType::EntryPublished),
            SyncType::PublishType(PublishType::AssetPublished),
        ];
        sync(&runner, &ConfigMock::new(), None, &types, |_page| {}).unwrap();
        let urls = runner.urls.borrow();
        assert!(urls[0].contains("content_type_uid=blog_post"));
        assert!(urls[0].contains("locale=en-us"));
        assert!(urls[0].contains("start_from=2024-05-01T00%3A00%3A00Z"));
        assert!(urls[0].contains("type=entry_published%2Casset_published"));
    }

    #[test]
    fn test_failed_page_halts_continuation() {
        let error = HttpResponse::builder()
            .status(500)
            .body("oops".to_string())
            .build()
            .unwrap();
        let runner = MockRunner::new(vec![
            error,
            page_response(r#"{"pagination_token":"p1","items":[],"total_count":9}"#),
        ]);
        let mut pages = 0;
        let err = sync(&runner, &ConfigMock::new(), None, &[SyncType::All], |_page| {
            pages += 1;
        })
        .unwrap_err();
        // one good page observed, then the failure propagates
        assert_eq!(1, pages);
        assert!(matches!(
            err.downcast_ref::<CdaError>(),
            Some(CdaError::UnparseableResponse(_))
        ));
        assert_eq!(2, *runner.run_count.borrow());
    }

    #[test]
    fn test_undecodable_page_is_decode_error() {
        let runner = MockRunner::new(vec![page_response("not json")]);
        let err = sync(&runner, &ConfigMock::new(), None, &[SyncType::All], |_page| {})
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CdaError>(),
            Some(CdaError::Decode(_))
        ));
    }
}
