use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use slicemark_domain::{ErrorKind, SmResult, smerr, to_sm_kind};
use std::{
    collections::HashMap,
    fmt::Debug,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing::{debug, info};

use super::document::{AnnotationEntry, SaveRequest, SessionDocument};
use crate::file_util;

/// Server side of the annotation store. Upserts are atomic per session document.
pub trait SessionStore: Send + Sync + Debug {
    /// Inserts or replaces the entry of `(req.session_id, req.file_url)`.
    fn upsert(&self, req: SaveRequest) -> SmResult<()>;
    /// All entries of a session, empty if the session is unknown.
    fn load(&self, session_id: &str) -> SmResult<Vec<AnnotationEntry>>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<String, SessionDocument>>,
}
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}
impl SessionStore for MemoryStore {
    fn upsert(&self, req: SaveRequest) -> SmResult<()> {
        req.validate()?;
        let mut docs = self
            .docs
            .lock()
            .map_err(|e| smerr!("memory store lock poisoned, {:?}", e))?;
        docs.entry(req.session_id.clone())
            .or_insert_with(|| SessionDocument::new(req.session_id.clone()))
            .upsert(req);
        Ok(())
    }
    fn load(&self, session_id: &str) -> SmResult<Vec<AnnotationEntry>> {
        let docs = self
            .docs
            .lock()
            .map_err(|e| smerr!("memory store lock poisoned, {:?}", e))?;
        Ok(docs
            .get(session_id)
            .map(SessionDocument::records)
            .unwrap_or_default())
    }
}

/// One JSON document per session in a folder.
#[derive(Debug)]
pub struct FileStore {
    folder: PathBuf,
    // serializes read-modify-write cycles on documents
    write_lock: Mutex<()>,
}
impl FileStore {
    pub fn new(folder: PathBuf) -> Self {
        info!("file store in {folder:?}");
        Self {
            folder,
            write_lock: Mutex::new(()),
        }
    }
    pub fn folder(&self) -> &Path {
        &self.folder
    }
    /// Session ids are percent-encoded so that every id maps to a distinct valid file name.
    pub fn doc_path(&self, session_id: &str) -> PathBuf {
        let name = utf8_percent_encode(session_id, NON_ALPHANUMERIC).to_string();
        self.folder.join(format!("{name}.json"))
    }
    fn read_doc(&self, session_id: &str) -> SmResult<Option<SessionDocument>> {
        let path = self.doc_path(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let s = file_util::read_to_string(&path)?;
        serde_json::from_str(&s)
            .map(Some)
            .map_err(to_sm_kind(ErrorKind::Parse))
    }
}
impl SessionStore for FileStore {
    fn upsert(&self, req: SaveRequest) -> SmResult<()> {
        req.validate()?;
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| smerr!("file store lock poisoned, {:?}", e))?;
        let session_id = req.session_id.clone();
        let mut doc = self
            .read_doc(&session_id)?
            .unwrap_or_else(|| SessionDocument::new(session_id.clone()));
        doc.upsert(req);
        let s = serde_json::to_string(&doc).map_err(to_sm_kind(ErrorKind::Parse))?;
        let path = self.doc_path(&session_id);
        file_util::write_atomic(&path, s)?;
        debug!("wrote session {session_id} to {path:?}");
        Ok(())
    }
    fn load(&self, session_id: &str) -> SmResult<Vec<AnnotationEntry>> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| smerr!("file store lock poisoned, {:?}", e))?;
        Ok(self
            .read_doc(session_id)?
            .map(|doc| doc.records())
            .unwrap_or_default())
    }
}

#[cfg(test)]
use crate::{defer_folder_removal, tools_data::make_test_set};

#[cfg(test)]
fn check_store(store: &dyn SessionStore) -> SmResult<()> {
    assert!(store.load("unknown")?.is_empty());
    let set = make_test_set();
    let req = SaveRequest {
        session_id: "sess/1".to_string(),
        file_url: "http://h/img-42.dcm".to_string(),
        image_id: Some("http://h/img-42.dcm".to_string()),
        author_name: "Dr. User".to_string(),
        data: set.clone(),
    };
    store.upsert(req.clone())?;
    store.upsert(req.clone())?;
    let loaded = store.load("sess/1")?;
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].data, set);
    assert_eq!(loaded[0].author_name, "Dr. User");
    assert_eq!(loaded[0].image_id.as_deref(), Some("http://h/img-42.dcm"));
    store.upsert(SaveRequest {
        data: Default::default(),
        ..req.clone()
    })?;
    let loaded = store.load("sess/1")?;
    assert_eq!(loaded.len(), 1);
    assert!(loaded[0].data.is_empty());
    let err = store
        .upsert(SaveRequest {
            session_id: String::new(),
            ..req
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
    Ok(())
}

#[test]
fn test_memory_store() -> SmResult<()> {
    check_store(&MemoryStore::new())
}

#[test]
fn test_file_store() -> SmResult<()> {
    let folder = file_util::tmp_folder("file-store")?;
    defer_folder_removal!(&folder);
    let store = FileStore::new(folder.clone());
    check_store(&store)?;
    assert!(store.doc_path("sess/1").exists());
    assert_ne!(store.doc_path("a-b"), store.doc_path("a_b"));

    file_util::write(store.doc_path("broken"), "{not json")?;
    assert_eq!(store.load("broken").unwrap_err().kind(), ErrorKind::Parse);
    Ok(())
}
