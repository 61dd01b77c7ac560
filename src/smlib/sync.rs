use futures::future::join_all;
use slicemark_domain::{ErrorKind, SmError, SmResult, smerr, trace_ok_err};
use std::collections::HashSet;
use tracing::{info, warn};

use crate::{
    cfg::EmptySetPolicy,
    store::{AnnotationStore, SaveRequest},
    tools_data::{AnnotationsMap, ImageId},
};

/// Outcome of [`PersistenceSync::save_all`]. Every image that was sent ends up in exactly
/// one of the two lists.
#[derive(Debug, Default)]
pub struct SaveReport {
    pub succeeded: Vec<ImageId>,
    pub failed: Vec<(ImageId, SmError)>,
}
impl SaveReport {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Saves and loads the annotation sets of a session through an [`AnnotationStore`].
#[derive(Debug)]
pub struct PersistenceSync<S> {
    store: S,
    author_name: String,
    scheme: String,
    policy: EmptySetPolicy,
    // (session, image) pairs the store holds a record for
    persisted: HashSet<(String, ImageId)>,
}

impl<S: AnnotationStore> PersistenceSync<S> {
    pub fn new(store: S, author_name: &str, scheme: &str, policy: EmptySetPolicy) -> Self {
        Self {
            store,
            author_name: author_name.to_string(),
            scheme: scheme.to_string(),
            policy,
            persisted: HashSet::new(),
        }
    }
    pub fn store(&self) -> &S {
        &self.store
    }
    pub fn is_persisted(&self, session_id: &str, image: &ImageId) -> bool {
        self.persisted
            .contains(&(session_id.to_string(), image.clone()))
    }
    fn should_send(&self, session_id: &str, image: &ImageId, is_empty: bool) -> bool {
        !is_empty
            || (self.policy == EmptySetPolicy::Explicit && self.is_persisted(session_id, image))
    }

    /// Upserts one record per image concurrently and waits until all requests settled.
    /// Failures are reported per image, successful upserts are not rolled back.
    pub async fn save_all(&mut self, session_id: &str, sets: &AnnotationsMap) -> SaveReport {
        let mut report = SaveReport::default();
        let mut to_send = vec![];
        for (image, set) in sets {
            if !self.should_send(session_id, image, set.is_empty()) {
                continue;
            }
            let req = SaveRequest {
                session_id: session_id.to_string(),
                file_url: image.file_url(&self.scheme).to_string(),
                image_id: image.explicit_id(&self.scheme).map(str::to_string),
                author_name: self.author_name.clone(),
                data: set.clone(),
            };
            match req.validate() {
                Ok(()) => to_send.push((image.clone(), req)),
                Err(e) => report.failed.push((image.clone(), e)),
            }
        }
        info!(
            "saving {} images of session '{session_id}'",
            to_send.len()
        );
        let (images, requests): (Vec<_>, Vec<_>) = to_send.into_iter().unzip();
        let results = join_all(requests.into_iter().map(|req| self.store.save(req))).await;
        for (image, res) in images.into_iter().zip(results) {
            match res {
                Ok(resp) if resp.ok => {
                    self.persisted
                        .insert((session_id.to_string(), image.clone()));
                    report.succeeded.push(image);
                }
                Ok(_) => {
                    warn!("store did not confirm save of {image}");
                    report
                        .failed
                        .push((image, smerr!("store did not confirm the save")));
                }
                Err(e) => {
                    warn!("could not save {image}, {e:?}");
                    report.failed.push((image, e));
                }
            }
        }
        report
    }

    /// Fetches all records of a session. Points and metrics are recomputed from the stored
    /// handles. For duplicate records of one image the last one wins.
    pub async fn try_load_all(&mut self, session_id: &str) -> SmResult<AnnotationsMap> {
        if session_id.is_empty() {
            return Err(smerr!(ErrorKind::Precondition; "session id missing"));
        }
        let resp = self.store.load(session_id).await?;
        let mut res = AnnotationsMap::new();
        for record in resp.records {
            let image = ImageId::from_persisted(
                &record.file_url,
                record.image_id.as_deref(),
                &self.scheme,
            );
            self.persisted
                .insert((session_id.to_string(), image.clone()));
            res.insert(image, record.data.renormalized());
        }
        info!("loaded {} images of session '{session_id}'", res.len());
        Ok(res)
    }

    /// Like [`try_load_all`](Self::try_load_all) but failures are logged and lead to an
    /// empty map.
    pub async fn load_all(&mut self, session_id: &str) -> AnnotationsMap {
        trace_ok_err(self.try_load_all(session_id).await).unwrap_or_default()
    }
}

#[cfg(test)]
use {
    crate::{
        store::{LoadResponse, LocalStore, MemoryStore, SaveResponse, SessionStore},
        tools_data::{ImageAnnotationSet, make_test_set},
    },
    std::sync::Arc,
    tokio::runtime::Runtime,
};

#[cfg(test)]
fn make_sync(policy: EmptySetPolicy) -> PersistenceSync<LocalStore<MemoryStore>> {
    PersistenceSync::new(
        LocalStore::new(Arc::new(MemoryStore::new())),
        "Dr. User",
        "wadouri:",
        policy,
    )
}

#[test]
fn test_save_load() -> SmResult<()> {
    let rt = Runtime::new().map_err(slicemark_domain::to_sm)?;
    let mut sync = make_sync(EmptySetPolicy::Explicit);
    let mut sets = AnnotationsMap::new();
    let img1 = ImageId::new("wadouri:http://h/img-1.dcm");
    let img2 = ImageId::new("wadouri:http://h/img-2.dcm");
    sets.insert(img1.clone(), make_test_set());
    sets.insert(img2.clone(), ImageAnnotationSet::new());
    let report = rt.block_on(sync.save_all("sess-1", &sets));
    assert!(report.is_ok());
    // never persisted empty images are not sent
    assert_eq!(report.succeeded, vec![img1.clone()]);
    let records = sync.store().inner().load("sess-1")?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].file_url, "http://h/img-1.dcm");

    let loaded = rt.block_on(sync.load_all("sess-1"));
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[&img1], sets[&img1]);
    assert!(rt.block_on(sync.load_all("other")).is_empty());
    Ok(())
}

#[test]
fn test_reload_ids_without_scheme() -> SmResult<()> {
    let rt = Runtime::new().map_err(slicemark_domain::to_sm)?;
    let mut sync = make_sync(EmptySetPolicy::Explicit);
    let plain = ImageId::new("img-42");
    let prefixed = ImageId::new("wadouri:http://h/img-43.dcm");
    let mut sets = AnnotationsMap::new();
    sets.insert(plain.clone(), make_test_set());
    sets.insert(prefixed.clone(), make_test_set());
    assert!(rt.block_on(sync.save_all("s", &sets)).is_ok());
    let records = sync.store().inner().load("s")?;
    let plain_record = records.iter().find(|r| r.file_url == "img-42").unwrap();
    assert_eq!(plain_record.image_id.as_deref(), Some("img-42"));
    let prefixed_record = records
        .iter()
        .find(|r| r.file_url == "http://h/img-43.dcm")
        .unwrap();
    assert_eq!(prefixed_record.image_id, None);

    let loaded = rt.block_on(sync.try_load_all("s"))?;
    assert_eq!(loaded, sets);

    // records written without an explicit id get the scheme back
    sync.store().inner().upsert(SaveRequest {
        session_id: "legacy".to_string(),
        file_url: "http://h/img-44.dcm".to_string(),
        image_id: None,
        author_name: "Dr. Old".to_string(),
        data: make_test_set(),
    })?;
    let legacy = rt.block_on(sync.try_load_all("legacy"))?;
    assert!(legacy.contains_key(&ImageId::new("wadouri:http://h/img-44.dcm")));
    Ok(())
}

#[test]
fn test_load_skips_corrupt_annotations() -> SmResult<()> {
    use slicemark_domain::{Handles, Metrics, PtF};
    let rt = Runtime::new().map_err(slicemark_domain::to_sm)?;
    let mut sync = make_sync(EmptySetPolicy::Explicit);
    let mut data = make_test_set();
    // as stored by an older client, points and metrics are recomputed on load
    data.push(crate::CanonicalAnnotation {
        uid: uuid::Uuid::new_v4(),
        handles: Handles::Length {
            start: (0, 0).into(),
            end: PtF { x: 1e19, y: 0.0 },
        },
        derived_points: vec![],
        metrics: Metrics::default(),
    });
    sync.store().inner().upsert(SaveRequest {
        session_id: "s".to_string(),
        file_url: "img-1".to_string(),
        image_id: None,
        author_name: "Dr. Old".to_string(),
        data,
    })?;
    let loaded = rt.block_on(sync.try_load_all("s"))?;
    assert_eq!(loaded[&ImageId::new("wadouri:img-1")].len(), 5);
    Ok(())
}

#[test]
fn test_empty_set_policies() -> SmResult<()> {
    let rt = Runtime::new().map_err(slicemark_domain::to_sm)?;
    let img = ImageId::new("wadouri:img-42");
    let mut sets = AnnotationsMap::new();
    sets.insert(img.clone(), make_test_set());
    let mut cleared = AnnotationsMap::new();
    cleared.insert(img.clone(), ImageAnnotationSet::new());

    let mut explicit = make_sync(EmptySetPolicy::Explicit);
    rt.block_on(explicit.save_all("s", &sets));
    let report = rt.block_on(explicit.save_all("s", &cleared));
    assert_eq!(report.succeeded, vec![img.clone()]);
    assert!(rt.block_on(explicit.load_all("s"))[&img].is_empty());

    let mut omit = make_sync(EmptySetPolicy::Omit);
    rt.block_on(omit.save_all("s", &sets));
    let report = rt.block_on(omit.save_all("s", &cleared));
    assert!(report.succeeded.is_empty());
    assert_eq!(rt.block_on(omit.load_all("s"))[&img], sets[&img]);
    Ok(())
}

#[test]
fn test_precondition() {
    let rt = Runtime::new().unwrap();
    let mut sync = make_sync(EmptySetPolicy::Explicit);
    let mut sets = AnnotationsMap::new();
    sets.insert(ImageId::new("img-1"), make_test_set());
    sets.insert(ImageId::new("wadouri:"), make_test_set());
    let report = rt.block_on(sync.save_all("", &sets));
    assert!(report.succeeded.is_empty());
    assert_eq!(report.failed.len(), 2);
    assert!(
        report
            .failed
            .iter()
            .all(|(_, e)| e.kind() == ErrorKind::Precondition)
    );
    let report = rt.block_on(sync.save_all("s", &sets));
    assert_eq!(report.succeeded, vec![ImageId::new("img-1")]);
    assert_eq!(report.failed[0].0, ImageId::new("wadouri:"));
    assert!(rt.block_on(sync.try_load_all("")).is_err());
}

#[cfg(test)]
#[derive(Debug)]
struct FlakyStore {
    inner: LocalStore<MemoryStore>,
}
#[cfg(test)]
impl AnnotationStore for FlakyStore {
    async fn save(&self, req: SaveRequest) -> SmResult<SaveResponse> {
        if req.file_url.contains("bad") {
            Err(smerr!(ErrorKind::Transport; "connection reset"))
        } else {
            self.inner.save(req).await
        }
    }
    async fn load(&self, session_id: &str) -> SmResult<LoadResponse> {
        if session_id == "offline" {
            Err(smerr!(ErrorKind::Transport; "offline"))
        } else {
            self.inner.load(session_id).await
        }
    }
}

#[test]
fn test_partial_failure() {
    let rt = Runtime::new().unwrap();
    let mut sync = PersistenceSync::new(
        FlakyStore {
            inner: LocalStore::new(Arc::new(MemoryStore::new())),
        },
        "Dr. User",
        "",
        EmptySetPolicy::Explicit,
    );
    let mut sets = AnnotationsMap::new();
    for name in ["good-1", "bad-1", "good-2"] {
        sets.insert(ImageId::new(name), make_test_set());
    }
    let report = rt.block_on(sync.save_all("s", &sets));
    assert_eq!(report.succeeded.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].1.is_retryable());
    assert_eq!(rt.block_on(sync.load_all("s")).len(), 2);
    assert!(rt.block_on(sync.load_all("offline")).is_empty());
    assert_eq!(
        rt.block_on(sync.try_load_all("offline")).unwrap_err().kind(),
        ErrorKind::Transport
    );
}
