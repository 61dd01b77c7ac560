use slicemark_domain::{ErrorKind, SmResult};
use tracing::{error, info};

use crate::{
    registry::{AnnotationRegistry, RawEntry, RawToolState},
    tools_data::{AnnotationsMap, ImageAnnotationSet, ImageId},
};

/// Writes `set` into `state`. An entry whose uuid matches an annotation is replaced, other
/// live entries are kept, so applying the same set twice does not duplicate shapes. Live
/// entries without uuid are matched by their handles.
pub fn merge_into_state(state: &mut RawToolState, set: &ImageAnnotationSet) {
    for anno in set.iter() {
        let entries = &mut state
            .entry(anno.tool_kind().name().to_string())
            .or_default()
            .data;
        let restored = RawEntry::from(anno);
        let pos = entries
            .iter()
            .position(|e| e.uuid == Some(anno.uid))
            .or_else(|| {
                entries
                    .iter()
                    .position(|e| e.uuid.is_none() && e.handles == restored.handles)
            });
        match pos {
            Some(idx) => entries[idx] = restored,
            None => entries.push(restored),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub applied: Vec<ImageId>,
    /// Surface not ready, kept for a later retry.
    pub deferred: Vec<ImageId>,
    pub failed: Vec<ImageId>,
}

/// Re-injects loaded annotation sets into the drawing surface. Images whose surface is
/// not ready yet are kept and applied by [`retry_deferred`](Self::retry_deferred) or
/// [`on_image_ready`](Self::on_image_ready).
#[derive(Debug, Default)]
pub struct RestoreApplier {
    deferred: AnnotationsMap,
}

impl RestoreApplier {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn n_deferred(&self) -> usize {
        self.deferred.len()
    }
    pub fn is_deferred(&self, image: &ImageId) -> bool {
        self.deferred.contains_key(image)
    }

    fn apply_one(
        registry: &dyn AnnotationRegistry,
        image: &ImageId,
        set: &ImageAnnotationSet,
    ) -> SmResult<()> {
        registry.update(image, &mut |state| {
            merge_into_state(state, set);
            Ok(())
        })
    }

    fn apply_into_report(
        &mut self,
        registry: &dyn AnnotationRegistry,
        image: ImageId,
        set: ImageAnnotationSet,
        report: &mut RestoreReport,
    ) {
        match Self::apply_one(registry, &image, &set) {
            Ok(()) => report.applied.push(image),
            Err(e) if e.kind() == ErrorKind::NotReady => {
                info!("deferring restore of {image}, surface not ready");
                self.deferred.insert(image.clone(), set);
                report.deferred.push(image);
            }
            Err(e) => {
                error!("could not restore annotations of {image}, {e:?}");
                report.failed.push(image);
            }
        }
    }

    pub fn apply(
        &mut self,
        registry: &dyn AnnotationRegistry,
        loaded: AnnotationsMap,
    ) -> RestoreReport {
        let mut report = RestoreReport::default();
        for (image, set) in loaded {
            // a newer load supersedes what is still waiting
            self.deferred.remove(&image);
            self.apply_into_report(registry, image, set, &mut report);
        }
        report
    }

    pub fn retry_deferred(&mut self, registry: &dyn AnnotationRegistry) -> RestoreReport {
        let deferred = std::mem::take(&mut self.deferred);
        let mut report = RestoreReport::default();
        for (image, set) in deferred {
            self.apply_into_report(registry, image, set, &mut report);
        }
        report
    }

    /// To be called when the viewer displays `image` and its surface got initialized.
    pub fn on_image_ready(
        &mut self,
        registry: &dyn AnnotationRegistry,
        image: &ImageId,
    ) -> RestoreReport {
        let mut report = RestoreReport::default();
        if let Some(set) = self.deferred.remove(image) {
            self.apply_into_report(registry, image.clone(), set, &mut report);
        }
        report
    }
}

#[cfg(test)]
use crate::{
    capture::{canonicalize, capture},
    registry::{MemoryRegistry, RawHandles, RawToolData, raw_entry},
    tools_data::make_test_set,
};

#[test]
fn test_restore_idempotent() -> SmResult<()> {
    let reg = MemoryRegistry::new();
    let img = ImageId::new("img-1");
    let set = make_test_set();
    let mut loaded = AnnotationsMap::new();
    loaded.insert(img.clone(), set.clone());
    let mut applier = RestoreApplier::new();
    let report = applier.apply(&reg, loaded.clone());
    assert_eq!(report.applied, vec![img.clone()]);
    let report = applier.apply(&reg, loaded);
    assert_eq!(report.applied, vec![img.clone()]);

    let captured = capture(&reg, std::slice::from_ref(&img))?;
    assert_eq!(captured[&img], set);
    Ok(())
}

#[test]
fn test_restore_keeps_other_entries() -> SmResult<()> {
    let reg = MemoryRegistry::new();
    let img = ImageId::new("img-1");
    let live = make_test_set();
    let mut state = RawToolState::new();
    merge_into_state(&mut state, &live);
    reg.set(&img, state)?;

    let restored = make_test_set();
    let mut loaded = AnnotationsMap::new();
    loaded.insert(img.clone(), restored.clone());
    RestoreApplier::new().apply(&reg, loaded);
    let captured = capture(&reg, std::slice::from_ref(&img))?;
    assert_eq!(captured[&img].len(), live.len() + restored.len());
    Ok(())
}

#[test]
fn test_restore_matches_entries_without_uuid() -> SmResult<()> {
    let reg = MemoryRegistry::new();
    let img = ImageId::new("img-1");
    let line = |x: i32| RawHandles {
        start: Some((0, 0).into()),
        end: Some((x, 0).into()),
        ..Default::default()
    };
    let mut state = RawToolState::new();
    state.insert(
        "Length".to_string(),
        RawToolData {
            data: vec![raw_entry(None, line(3)), raw_entry(None, line(5))],
        },
    );
    reg.set(&img, state.clone())?;

    // a capture that was saved without writing its uids back
    let saved = canonicalize(&img, &state);
    let mut loaded = AnnotationsMap::new();
    loaded.insert(img.clone(), saved.clone());
    let mut applier = RestoreApplier::new();
    applier.apply(&reg, loaded.clone());
    applier.apply(&reg, loaded);
    let captured = capture(&reg, std::slice::from_ref(&img))?;
    assert_eq!(captured[&img], saved);
    Ok(())
}

#[test]
fn test_restore_deferred() -> SmResult<()> {
    let reg = MemoryRegistry::with_lazy_surfaces();
    let shown = ImageId::new("img-shown");
    let hidden = ImageId::new("img-hidden");
    reg.mark_ready(&shown)?;
    let mut loaded = AnnotationsMap::new();
    loaded.insert(shown.clone(), make_test_set());
    loaded.insert(hidden.clone(), make_test_set());

    let mut applier = RestoreApplier::new();
    let report = applier.apply(&reg, loaded.clone());
    assert_eq!(report.applied, vec![shown.clone()]);
    assert_eq!(report.deferred, vec![hidden.clone()]);
    assert!(applier.is_deferred(&hidden));

    let report = applier.retry_deferred(&reg);
    assert_eq!(report.deferred, vec![hidden.clone()]);
    assert_eq!(applier.n_deferred(), 1);

    reg.mark_ready(&hidden)?;
    let report = applier.on_image_ready(&reg, &hidden);
    assert_eq!(report.applied, vec![hidden.clone()]);
    assert_eq!(applier.n_deferred(), 0);
    let captured = capture(&reg, &[hidden.clone()])?;
    assert_eq!(captured[&hidden], loaded[&hidden]);
    Ok(())
}
