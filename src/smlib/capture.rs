use slicemark_domain::{SmResult, ToolKind};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    registry::{AnnotationRegistry, RawToolState},
    tools_data::{AnnotationsMap, CanonicalAnnotation, ImageAnnotationSet, ImageId},
};

/// Canonicalizes the raw state of one image. Unknown tools and incomplete entries are
/// skipped with a warning. Entries without uuid get a fresh one.
pub fn canonicalize(image: &ImageId, state: &RawToolState) -> ImageAnnotationSet {
    let mut set = ImageAnnotationSet::new();
    for (tool_name, tool_data) in state {
        let kind = match tool_name.parse::<ToolKind>() {
            Ok(kind) => kind,
            Err(_) => {
                warn!("skipping unknown tool '{tool_name}' of image {image}");
                continue;
            }
        };
        for (idx, entry) in tool_data.data.iter().enumerate() {
            let handles = entry.handles.as_ref().and_then(|h| h.to_handles(kind));
            match handles {
                Some(handles) => {
                    let uid = entry.uuid.unwrap_or_else(Uuid::new_v4);
                    set.push(CanonicalAnnotation::from_handles(uid, handles));
                }
                None => warn!("skipping incomplete {kind} entry {idx} of image {image}"),
            }
        }
    }
    set
}

/// Gives every entry of a known tool that lacks a uuid a fresh one. Returns the number
/// of entries that got one.
pub fn assign_missing_uids(state: &mut RawToolState) -> usize {
    let mut n = 0;
    let known = state
        .iter_mut()
        .filter(|(tool_name, _)| tool_name.parse::<ToolKind>().is_ok());
    for (_, tool_data) in known {
        for entry in tool_data.data.iter_mut().filter(|e| e.uuid.is_none()) {
            entry.uuid = Some(Uuid::new_v4());
            n += 1;
        }
    }
    n
}

/// Writes uuids into the live entries of `images` that have none, so the uids of a
/// capture stay valid for later restores into the same surface. Surfaces that are not
/// ready or hold no state are left alone.
pub fn stamp_uids(registry: &dyn AnnotationRegistry, images: &[ImageId]) -> SmResult<()> {
    for image in images {
        if !registry.is_ready(image) || registry.get(image)?.is_none() {
            continue;
        }
        let mut n_stamped = 0;
        registry.update(image, &mut |state| {
            n_stamped = assign_missing_uids(state);
            Ok(())
        })?;
        if n_stamped > 0 {
            debug!("assigned {n_stamped} uids on {image}");
        }
    }
    Ok(())
}

/// Reads the live state of every image without changing it. Images without state map to
/// an empty set.
pub fn capture(
    registry: &dyn AnnotationRegistry,
    images: &[ImageId],
) -> SmResult<AnnotationsMap> {
    let mut res = AnnotationsMap::new();
    for image in images {
        let set = match registry.get(image)? {
            Some(state) => canonicalize(image, &state),
            None => ImageAnnotationSet::new(),
        };
        debug!("captured {} annotations of {image}", set.len());
        res.insert(image.clone(), set);
    }
    Ok(res)
}

#[cfg(test)]
use crate::registry::{MemoryRegistry, RawEntry, RawHandles, RawToolData, raw_entry};

#[cfg(test)]
fn length_raw(x: f64) -> RawHandles {
    RawHandles {
        start: Some((0, 0).into()),
        end: Some(slicemark_domain::PtF { x, y: 0.0 }),
        ..Default::default()
    }
}

#[test]
fn test_capture() -> SmResult<()> {
    let reg = MemoryRegistry::new();
    let img = ImageId::new("img-1");
    let untouched = ImageId::new("img-2");
    let uid = Uuid::new_v4();
    let mut state = RawToolState::new();
    state.insert(
        "Length".to_string(),
        RawToolData {
            data: vec![
                raw_entry(Some(uid), length_raw(3.0)),
                RawEntry {
                    uuid: None,
                    handles: None,
                },
                raw_entry(None, length_raw(7.0)),
                raw_entry(None, length_raw(1e19)),
            ],
        },
    );
    state.insert(
        "ArrowAnnotate".to_string(),
        RawToolData {
            data: vec![raw_entry(None, length_raw(1.0))],
        },
    );
    reg.set(&img, state.clone())?;

    let captured = capture(&reg, &[img.clone(), untouched.clone()])?;
    assert_eq!(captured.len(), 2);
    assert!(captured[&untouched].is_empty());
    let set = &captured[&img];
    assert_eq!(set.len(), 2);
    let lengths = set.get(ToolKind::Length);
    assert_eq!(lengths[0].uid, uid);
    assert_eq!(lengths[0].metrics.length, Some(3.0));
    assert_eq!(lengths[1].metrics.length, Some(7.0));
    // capture is a pure read
    assert_eq!(reg.get(&img)?, Some(state));
    Ok(())
}

#[test]
fn test_stamp_uids() -> SmResult<()> {
    let reg = MemoryRegistry::with_lazy_surfaces();
    let img = ImageId::new("img-1");
    let hidden = ImageId::new("img-2");
    let kept = Uuid::new_v4();
    let mut state = RawToolState::new();
    state.insert(
        "Length".to_string(),
        RawToolData {
            data: vec![
                raw_entry(Some(kept), length_raw(3.0)),
                raw_entry(None, length_raw(7.0)),
            ],
        },
    );
    state.insert(
        "ArrowAnnotate".to_string(),
        RawToolData {
            data: vec![raw_entry(None, length_raw(1.0))],
        },
    );
    reg.mark_ready(&img)?;
    reg.set(&img, state)?;
    stamp_uids(&reg, &[img.clone(), hidden.clone()])?;
    assert_eq!(reg.get(&hidden)?, None);

    let stamped = reg.get(&img)?.unwrap();
    assert_eq!(stamped["Length"].data[0].uuid, Some(kept));
    assert!(stamped["Length"].data[1].uuid.is_some());
    assert_eq!(stamped["ArrowAnnotate"].data[0].uuid, None);
    // once stamped, uids are stable across captures
    let first = capture(&reg, std::slice::from_ref(&img))?;
    let second = capture(&reg, std::slice::from_ref(&img))?;
    assert_eq!(first, second);
    stamp_uids(&reg, std::slice::from_ref(&img))?;
    assert_eq!(reg.get(&img)?, Some(stamped));
    Ok(())
}

#[test]
fn test_capture_empty_state() -> SmResult<()> {
    let reg = MemoryRegistry::new();
    let img = ImageId::new("img-1");
    reg.set(&img, RawToolState::new())?;
    let captured = capture(&reg, std::slice::from_ref(&img))?;
    assert!(captured[&img].is_empty());
    Ok(())
}
