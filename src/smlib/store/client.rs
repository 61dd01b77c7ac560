use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use slicemark_domain::{ErrorKind, SmResult, smerr, to_sm_kind};
use std::{sync::Arc, time::Duration};
use tracing::debug;

use super::{
    document::{LoadResponse, SaveRequest, SaveResponse},
    session_store::SessionStore,
};

pub const SAVE_PATH: &str = "/api/annotation/save";
pub const LOAD_PATH: &str = "/api/annotation/";

/// Client side of the annotation store as used by the sync layer.
#[allow(async_fn_in_trait)]
pub trait AnnotationStore {
    async fn save(&self, req: SaveRequest) -> SmResult<SaveResponse>;
    async fn load(&self, session_id: &str) -> SmResult<LoadResponse>;
}

/// Talks to a [`SessionStore`] in the same process.
#[derive(Debug)]
pub struct LocalStore<S: ?Sized> {
    inner: Arc<S>,
}
impl<S: ?Sized> Clone for LocalStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}
impl<S: SessionStore + ?Sized> LocalStore<S> {
    pub fn new(inner: Arc<S>) -> Self {
        Self { inner }
    }
    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }
}
impl<S: SessionStore + ?Sized> AnnotationStore for LocalStore<S> {
    async fn save(&self, req: SaveRequest) -> SmResult<SaveResponse> {
        req.validate()?;
        self.inner.upsert(req)?;
        Ok(SaveResponse { ok: true })
    }
    async fn load(&self, session_id: &str) -> SmResult<LoadResponse> {
        Ok(LoadResponse {
            records: self.inner.load(session_id)?,
        })
    }
}

/// Talks to the annotation server via HTTP.
#[derive(Clone, Debug)]
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
}
impl HttpStore {
    pub fn new(base_url: &str, timeout_s: u64) -> SmResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_s))
            .build()
            .map_err(to_sm_kind(ErrorKind::Transport))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
    pub fn save_url(&self) -> String {
        format!("{}{SAVE_PATH}", self.base_url)
    }
    pub fn load_url(&self, session_id: &str) -> String {
        format!(
            "{}{LOAD_PATH}{}",
            self.base_url,
            utf8_percent_encode(session_id, NON_ALPHANUMERIC)
        )
    }
}

async fn checked_body(resp: reqwest::Response) -> SmResult<String> {
    let status = resp.status();
    let body = resp.text().await.map_err(to_sm_kind(ErrorKind::Transport))?;
    if status.is_success() {
        Ok(body)
    } else if status.is_client_error() {
        Err(smerr!(ErrorKind::Precondition; "store rejected request with {}, {}", status, body))
    } else {
        Err(smerr!(ErrorKind::Transport; "store answered {}, {}", status, body))
    }
}

impl AnnotationStore for HttpStore {
    async fn save(&self, req: SaveRequest) -> SmResult<SaveResponse> {
        req.validate()?;
        debug!("saving {} of session {}", req.file_url, req.session_id);
        let resp = self
            .client
            .post(self.save_url())
            .json(&req)
            .send()
            .await
            .map_err(to_sm_kind(ErrorKind::Transport))?;
        let body = checked_body(resp).await?;
        serde_json::from_str(&body).map_err(to_sm_kind(ErrorKind::Parse))
    }
    async fn load(&self, session_id: &str) -> SmResult<LoadResponse> {
        if session_id.is_empty() {
            return Err(smerr!(ErrorKind::Precondition; "session id missing"));
        }
        let resp = self
            .client
            .get(self.load_url(session_id))
            .send()
            .await
            .map_err(to_sm_kind(ErrorKind::Transport))?;
        let body = checked_body(resp).await?;
        serde_json::from_str(&body).map_err(to_sm_kind(ErrorKind::Parse))
    }
}

#[test]
fn test_urls() -> SmResult<()> {
    let store = HttpStore::new("http://localhost:5000/", 1)?;
    assert_eq!(store.save_url(), "http://localhost:5000/api/annotation/save");
    assert_eq!(
        store.load_url("sess 1/a"),
        "http://localhost:5000/api/annotation/sess%201%2Fa"
    );
    Ok(())
}
