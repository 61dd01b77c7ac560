use slicemark_domain::{ErrorKind, SmResult, smerr, to_sm, trace_ok_warn};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::runtime::{Handle, Runtime};
use tracing::{info, warn};

use crate::{
    capture::{capture, stamp_uids},
    cfg::Cfg,
    registry::AnnotationRegistry,
    restore::{RestoreApplier, RestoreReport},
    store::{AnnotationStore, StoreFromCfg},
    sync::{PersistenceSync, SaveReport},
    tools_data::{AnnotationsMap, ImageId, annotated_ids},
};

pub const SAVE_OK_MSG: &str = "Annotations saved!";
pub const SAVE_FAILED_MSG: &str = "Failed to save annotations.";
pub const SAVE_STATUS_DURATION: Duration = Duration::from_secs(3);

/// Where an image is in its annotation lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ImageState {
    #[default]
    Unloaded,
    LoadedEmpty,
    Annotated,
    Saved,
    /// Loaded from the store. Behaves like `Annotated` for edits.
    Restored,
}
impl ImageState {
    pub fn is_persisted(&self) -> bool {
        matches!(self, ImageState::Saved | ImageState::Restored)
    }
    fn displayed(self) -> Self {
        match self {
            ImageState::Unloaded => ImageState::LoadedEmpty,
            s => s,
        }
    }
}

#[derive(Clone, Debug)]
struct SaveStatus {
    msg: &'static str,
    since: Instant,
}

/// Ties the drawing surface, the annotation store and the per-image lifecycle of one
/// viewer together.
///
/// `Control` drives the store on a runtime of its own and blocks until requests settle.
/// It is meant for the viewer's synchronous event handlers and cannot be created inside
/// an async context. Async hosts use [`PersistenceSync`] directly.
pub struct Control<S> {
    pub cfg: Cfg,
    registry: Arc<dyn AnnotationRegistry>,
    sync: PersistenceSync<S>,
    restore: RestoreApplier,
    images: Vec<ImageId>,
    states: HashMap<ImageId, ImageState>,
    // latest captured or loaded annotations
    annotations: AnnotationsMap,
    save_status: Option<SaveStatus>,
    rt: Runtime,
}

impl Control<StoreFromCfg> {
    pub fn from_cfg(cfg: Cfg, registry: Arc<dyn AnnotationRegistry>) -> SmResult<Self> {
        let store = StoreFromCfg::from_cfg(&cfg)?;
        Self::new(cfg, registry, store)
    }
}

impl<S: AnnotationStore> Control<S> {
    pub fn new(cfg: Cfg, registry: Arc<dyn AnnotationRegistry>, store: S) -> SmResult<Self> {
        if Handle::try_current().is_ok() {
            return Err(smerr!(
                ErrorKind::Precondition;
                "control blocks on its own runtime and cannot be created inside an async context"
            ));
        }
        let sync = PersistenceSync::new(
            store,
            cfg.author_name(),
            cfg.image_id_scheme(),
            cfg.empty_set_policy,
        );
        Ok(Self {
            cfg,
            registry,
            sync,
            restore: RestoreApplier::new(),
            images: vec![],
            states: HashMap::new(),
            annotations: AnnotationsMap::new(),
            save_status: None,
            rt: Runtime::new().map_err(to_sm)?,
        })
    }

    pub fn registry(&self) -> &Arc<dyn AnnotationRegistry> {
        &self.registry
    }
    pub fn sync(&self) -> &PersistenceSync<S> {
        &self.sync
    }

    /// Images of the currently opened series in display order.
    pub fn set_images(&mut self, images: Vec<ImageId>) {
        for image in &images {
            self.states.entry(image.clone()).or_default();
        }
        self.images = images;
    }
    pub fn images(&self) -> &[ImageId] {
        &self.images
    }
    pub fn image_state(&self, image: &ImageId) -> ImageState {
        self.states.get(image).copied().unwrap_or_default()
    }

    /// The viewer displays `image`, its surface is ready now. Pending restores are applied.
    pub fn on_image_displayed(&mut self, image: &ImageId) -> RestoreReport {
        let state = self.states.entry(image.clone()).or_default();
        *state = state.displayed();
        let report = self.restore.on_image_ready(self.registry.as_ref(), image);
        if report.applied.contains(image) {
            self.states.insert(image.clone(), ImageState::Restored);
        }
        report
    }

    /// The user drew, moved or deleted a shape on `image`.
    pub fn on_annotations_changed(&mut self, image: &ImageId) {
        self.states.insert(image.clone(), ImageState::Annotated);
    }

    /// Captures all images and upserts them. Live entries without uid get one first, so a
    /// later load into the same surface replaces them. The outcome is also reflected by
    /// [`save_status`](Self::save_status).
    pub fn save(&mut self, session_id: &str) -> SmResult<SaveReport> {
        let captured = stamp_uids(self.registry.as_ref(), &self.images)
            .and_then(|()| capture(self.registry.as_ref(), &self.images));
        let captured = match captured {
            Ok(captured) => captured,
            Err(e) => {
                self.set_save_status(SAVE_FAILED_MSG);
                return Err(e);
            }
        };
        let report = self.rt.block_on(self.sync.save_all(session_id, &captured));
        for image in &report.succeeded {
            self.states.insert(image.clone(), ImageState::Saved);
        }
        for (image, e) in &report.failed {
            warn!("saving {image} failed, {e:?}");
        }
        self.set_save_status(if report.is_ok() {
            SAVE_OK_MSG
        } else {
            SAVE_FAILED_MSG
        });
        self.annotations = captured;
        Ok(report)
    }

    /// Fetches the session from the store and restores it into the drawing surface. A
    /// failing store leads to an empty session.
    pub fn load(&mut self, session_id: &str) -> RestoreReport {
        let loaded = self.rt.block_on(self.sync.load_all(session_id));
        let report = self.restore.apply(self.registry.as_ref(), loaded.clone());
        for image in &report.applied {
            self.states.insert(image.clone(), ImageState::Restored);
        }
        info!(
            "restored {} images, deferred {}",
            report.applied.len(),
            report.deferred.len()
        );
        self.annotations = loaded;
        report
    }

    /// Refreshes the annotation index from the drawing surface without saving.
    pub fn refresh(&mut self) {
        if let Some(captured) = trace_ok_warn(capture(self.registry.as_ref(), &self.images)) {
            for (image, set) in captured {
                self.annotations.insert(image, set);
            }
        }
    }

    pub fn annotations(&self) -> &AnnotationsMap {
        &self.annotations
    }
    /// Images with at least one annotation.
    pub fn annotated_images(&self) -> Vec<&ImageId> {
        annotated_ids(&self.annotations)
    }

    fn set_save_status(&mut self, msg: &'static str) {
        self.save_status = Some(SaveStatus {
            msg,
            since: Instant::now(),
        });
    }
    pub fn save_status_at(&self, now: Instant) -> Option<&'static str> {
        self.save_status
            .as_ref()
            .filter(|s| now.saturating_duration_since(s.since) < SAVE_STATUS_DURATION)
            .map(|s| s.msg)
    }
    /// Message about the last save while it is fresh.
    pub fn save_status(&self) -> Option<&'static str> {
        self.save_status_at(Instant::now())
    }
}

#[cfg(test)]
use crate::{
    registry::{MemoryRegistry, RawHandles, RawToolData, RawToolState, raw_entry},
    restore::merge_into_state,
    store::{LocalStore, MemoryStore},
    tools_data::make_test_set,
};

#[cfg(test)]
fn make_ctrl(registry: Arc<MemoryRegistry>) -> Control<LocalStore<MemoryStore>> {
    Control::new(
        crate::cfg::get_default_cfg(),
        registry,
        LocalStore::new(Arc::new(MemoryStore::new())),
    )
    .unwrap()
}

#[test]
fn test_lifecycle() -> SmResult<()> {
    let registry = Arc::new(MemoryRegistry::new());
    let mut ctrl = make_ctrl(registry.clone());
    let img1 = ImageId::new("wadouri:img-1");
    let img2 = ImageId::new("wadouri:img-2");
    ctrl.set_images(vec![img1.clone(), img2.clone()]);
    assert_eq!(ctrl.image_state(&img1), ImageState::Unloaded);
    ctrl.on_image_displayed(&img1);
    assert_eq!(ctrl.image_state(&img1), ImageState::LoadedEmpty);

    let mut state = RawToolState::new();
    merge_into_state(&mut state, &make_test_set());
    registry.set(&img1, state)?;
    ctrl.on_annotations_changed(&img1);
    assert_eq!(ctrl.image_state(&img1), ImageState::Annotated);
    assert!(!ctrl.image_state(&img1).is_persisted());

    let report = ctrl.save("sess-1")?;
    assert_eq!(report.succeeded, vec![img1.clone()]);
    assert_eq!(ctrl.image_state(&img1), ImageState::Saved);
    assert_eq!(ctrl.image_state(&img2), ImageState::Unloaded);
    assert_eq!(ctrl.save_status(), Some(SAVE_OK_MSG));
    assert_eq!(
        ctrl.save_status_at(Instant::now() + SAVE_STATUS_DURATION),
        None
    );
    assert_eq!(ctrl.annotated_images(), vec![&img1]);

    let report = ctrl.load("sess-1");
    assert_eq!(report.applied, vec![img1.clone()]);
    assert_eq!(ctrl.image_state(&img1), ImageState::Restored);
    assert!(ctrl.image_state(&img1).is_persisted());
    ctrl.on_annotations_changed(&img1);
    assert_eq!(ctrl.image_state(&img1), ImageState::Annotated);
    Ok(())
}

#[test]
fn test_deferred_restore_on_display() -> SmResult<()> {
    let store = LocalStore::new(Arc::new(MemoryStore::new()));
    let img = ImageId::new("wadouri:img-7");
    {
        let registry = Arc::new(MemoryRegistry::new());
        let mut state = RawToolState::new();
        merge_into_state(&mut state, &make_test_set());
        registry.set(&img, state)?;
        let mut ctrl = Control::new(crate::cfg::get_default_cfg(), registry, store.clone())?;
        ctrl.set_images(vec![img.clone()]);
        ctrl.save("sess-2")?;
    }
    // reload with a viewer whose surfaces are created lazily
    let registry = Arc::new(MemoryRegistry::with_lazy_surfaces());
    let mut ctrl = Control::new(crate::cfg::get_default_cfg(), registry.clone(), store)?;
    ctrl.set_images(vec![img.clone()]);
    let report = ctrl.load("sess-2");
    assert_eq!(report.deferred, vec![img.clone()]);
    assert_eq!(ctrl.image_state(&img), ImageState::Unloaded);

    registry.mark_ready(&img)?;
    let report = ctrl.on_image_displayed(&img);
    assert_eq!(report.applied, vec![img.clone()]);
    assert_eq!(ctrl.image_state(&img), ImageState::Restored);
    let captured = capture(registry.as_ref(), std::slice::from_ref(&img))?;
    assert_eq!(captured[&img].len(), 5);
    Ok(())
}

#[test]
fn test_save_load_same_surface() -> SmResult<()> {
    let registry = Arc::new(MemoryRegistry::new());
    let mut ctrl = make_ctrl(registry.clone());
    // an id the viewer knows without the default scheme prefix
    let img = ImageId::new("img-42");
    let mut state = RawToolState::new();
    state.insert(
        "Length".to_string(),
        RawToolData {
            data: vec![raw_entry(
                None,
                RawHandles {
                    start: Some((0, 0).into()),
                    end: Some((3, 4).into()),
                    ..Default::default()
                },
            )],
        },
    );
    registry.set(&img, state)?;
    ctrl.set_images(vec![img.clone()]);
    let saved = ctrl.save("s")?;
    assert_eq!(saved.succeeded, vec![img.clone()]);

    let report = ctrl.load("s");
    assert_eq!(report.applied, vec![img.clone()]);
    assert!(ctrl.annotations().contains_key(&img));
    ctrl.load("s");
    let captured = capture(registry.as_ref(), std::slice::from_ref(&img))?;
    assert_eq!(captured[&img].len(), 1);
    assert_eq!(&captured[&img], &ctrl.annotations()[&img]);
    Ok(())
}

#[test]
fn test_no_control_inside_async_context() {
    let rt = Runtime::new().unwrap();
    let res = rt.block_on(async {
        Control::new(
            crate::cfg::get_default_cfg(),
            Arc::new(MemoryRegistry::new()),
            LocalStore::new(Arc::new(MemoryStore::new())),
        )
        .map(|_| ())
    });
    assert_eq!(res.unwrap_err().kind(), ErrorKind::Precondition);
}
