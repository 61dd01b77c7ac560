//! Access to the annotation state that the interactive drawing surface keeps per image.
use serde::{Deserialize, Serialize};
use slicemark_domain::{ErrorKind, Handles, PtF, SmResult, ToolKind, smerr};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex, RwLock},
};
use uuid::Uuid;

use crate::tools_data::{CanonicalAnnotation, ImageId};

/// Handles as the drawing surface stores them. Which fields are set depends on the tool.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RawHandles {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub start: Option<PtF>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub middle: Option<PtF>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end: Option<PtF>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub points: Option<Vec<PtF>>,
}

impl RawHandles {
    /// `None` if a field that `kind` requires is missing.
    pub fn to_handles(&self, kind: ToolKind) -> Option<Handles> {
        let handles = match kind {
            // the surface keeps the probe location in `end`, older entries in `start`
            ToolKind::Probe => Handles::Probe {
                point: self.end.or(self.start)?,
            },
            ToolKind::Length => Handles::Length {
                start: self.start?,
                end: self.end?,
            },
            ToolKind::Angle => Handles::Angle {
                start: self.start?,
                middle: self.middle?,
                end: self.end?,
            },
            ToolKind::RectangleRoi => Handles::RectangleRoi {
                start: self.start?,
                end: self.end?,
            },
            ToolKind::EllipticalRoi => Handles::EllipticalRoi {
                start: self.start?,
                end: self.end?,
            },
            ToolKind::FreehandRoi => Handles::FreehandRoi {
                points: self.points.clone()?,
            },
        };
        handles.is_complete().then_some(handles)
    }
    pub fn from_handles(handles: &Handles) -> Self {
        match handles {
            Handles::Probe { point } => Self {
                end: Some(*point),
                ..Default::default()
            },
            Handles::Length { start, end }
            | Handles::RectangleRoi { start, end }
            | Handles::EllipticalRoi { start, end } => Self {
                start: Some(*start),
                end: Some(*end),
                ..Default::default()
            },
            Handles::Angle { start, middle, end } => Self {
                start: Some(*start),
                middle: Some(*middle),
                end: Some(*end),
                ..Default::default()
            },
            Handles::FreehandRoi { points } => Self {
                points: Some(points.clone()),
                ..Default::default()
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RawEntry {
    #[serde(default)]
    pub uuid: Option<Uuid>,
    #[serde(default)]
    pub handles: Option<RawHandles>,
}
impl From<&CanonicalAnnotation> for RawEntry {
    fn from(anno: &CanonicalAnnotation) -> Self {
        Self {
            uuid: Some(anno.uid),
            handles: Some(RawHandles::from_handles(&anno.handles)),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RawToolData {
    #[serde(default)]
    pub data: Vec<RawEntry>,
}

/// Tool name to entries of one image. Names are not validated, the surface may know
/// tools that slicemark does not.
pub type RawToolState = BTreeMap<String, RawToolData>;

/// Interface to the drawing surface. All calls on one image are serialized, calls for
/// different images may run in parallel.
pub trait AnnotationRegistry: Send + Sync {
    /// Whether the surface of `image` has been initialized and accepts state.
    fn is_ready(&self, image: &ImageId) -> bool;
    /// Snapshot of the live state, `None` if the surface has never held state for `image`.
    fn get(&self, image: &ImageId) -> SmResult<Option<RawToolState>>;
    /// Replaces the state of `image`. Fails with [`ErrorKind::NotReady`] if the surface is
    /// not ready.
    fn set(&self, image: &ImageId, state: RawToolState) -> SmResult<()>;
    fn remove(&self, image: &ImageId) -> SmResult<()>;
    /// Read-modify-write of the state of `image` under its lock.
    fn update(
        &self,
        image: &ImageId,
        f: &mut dyn FnMut(&mut RawToolState) -> SmResult<()>,
    ) -> SmResult<()>;
}

type Slot = Arc<Mutex<Option<RawToolState>>>;

/// In-process registry with one lock per image.
#[derive(Debug)]
pub struct MemoryRegistry {
    slots: RwLock<HashMap<ImageId, Slot>>,
    ready: RwLock<HashSet<ImageId>>,
    ready_by_default: bool,
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            ready: RwLock::new(HashSet::new()),
            ready_by_default: true,
        }
    }
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
    /// Surfaces only become ready via [`mark_ready`](Self::mark_ready), like a viewer
    /// that initializes an image when it is displayed the first time.
    pub fn with_lazy_surfaces() -> Self {
        Self {
            ready_by_default: false,
            ..Self::default()
        }
    }
    pub fn mark_ready(&self, image: &ImageId) -> SmResult<()> {
        self.ready
            .write()
            .map_err(|e| smerr!("ready lock poisoned, {:?}", e))?
            .insert(image.clone());
        Ok(())
    }
    fn slot(&self, image: &ImageId) -> SmResult<Slot> {
        if let Some(slot) = self
            .slots
            .read()
            .map_err(|e| smerr!("registry lock poisoned, {:?}", e))?
            .get(image)
        {
            return Ok(slot.clone());
        }
        let mut slots = self
            .slots
            .write()
            .map_err(|e| smerr!("registry lock poisoned, {:?}", e))?;
        Ok(slots.entry(image.clone()).or_default().clone())
    }
    fn check_ready(&self, image: &ImageId) -> SmResult<()> {
        if self.is_ready(image) {
            Ok(())
        } else {
            Err(smerr!(ErrorKind::NotReady; "surface of image {} not ready", image))
        }
    }
}

impl AnnotationRegistry for MemoryRegistry {
    fn is_ready(&self, image: &ImageId) -> bool {
        self.ready_by_default
            || self
                .ready
                .read()
                .map(|ready| ready.contains(image))
                .unwrap_or(false)
    }
    fn get(&self, image: &ImageId) -> SmResult<Option<RawToolState>> {
        let slot = self.slot(image)?;
        let state = slot
            .lock()
            .map_err(|e| smerr!("lock of image {} poisoned, {:?}", image, e))?;
        Ok(state.clone())
    }
    fn set(&self, image: &ImageId, state: RawToolState) -> SmResult<()> {
        self.check_ready(image)?;
        let slot = self.slot(image)?;
        let mut current = slot
            .lock()
            .map_err(|e| smerr!("lock of image {} poisoned, {:?}", image, e))?;
        *current = Some(state);
        Ok(())
    }
    fn remove(&self, image: &ImageId) -> SmResult<()> {
        self.slots
            .write()
            .map_err(|e| smerr!("registry lock poisoned, {:?}", e))?
            .remove(image);
        Ok(())
    }
    fn update(
        &self,
        image: &ImageId,
        f: &mut dyn FnMut(&mut RawToolState) -> SmResult<()>,
    ) -> SmResult<()> {
        self.check_ready(image)?;
        let slot = self.slot(image)?;
        let mut current = slot
            .lock()
            .map_err(|e| smerr!("lock of image {} poisoned, {:?}", image, e))?;
        let state = current.get_or_insert_with(RawToolState::new);
        f(state)
    }
}

#[cfg(test)]
pub fn raw_entry(uuid: Option<Uuid>, handles: RawHandles) -> RawEntry {
    RawEntry {
        uuid,
        handles: Some(handles),
    }
}

#[test]
fn test_raw_handles() {
    let raw = RawHandles {
        start: Some((1, 2).into()),
        end: Some((3, 4).into()),
        ..Default::default()
    };
    assert_eq!(
        raw.to_handles(ToolKind::Length),
        Some(Handles::Length {
            start: (1, 2).into(),
            end: (3, 4).into()
        })
    );
    assert!(raw.to_handles(ToolKind::Angle).is_none());
    assert!(raw.to_handles(ToolKind::FreehandRoi).is_none());
    assert_eq!(
        raw.to_handles(ToolKind::Probe),
        Some(Handles::Probe {
            point: (3, 4).into()
        })
    );
    let empty_free = RawHandles {
        points: Some(vec![]),
        ..Default::default()
    };
    assert!(empty_free.to_handles(ToolKind::FreehandRoi).is_none());
    for kind in ToolKind::ALL {
        if let Some(h) = raw.to_handles(kind) {
            assert_eq!(RawHandles::from_handles(&h).to_handles(kind), Some(h));
        }
    }
    let parsed: RawHandles = serde_json::from_str(r#"{"end":{"x":5.0,"y":6.0}}"#).unwrap();
    assert_eq!(
        parsed.to_handles(ToolKind::Probe),
        Some(Handles::Probe {
            point: (5, 6).into()
        })
    );
}

#[test]
fn test_memory_registry() -> SmResult<()> {
    let reg = MemoryRegistry::with_lazy_surfaces();
    let img = ImageId::new("img-1");
    assert_eq!(reg.get(&img)?, None);
    let err = reg.set(&img, RawToolState::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotReady);
    reg.mark_ready(&img)?;
    let mut state = RawToolState::new();
    state.insert(
        "Length".to_string(),
        RawToolData {
            data: vec![raw_entry(
                None,
                RawHandles {
                    start: Some((0, 0).into()),
                    end: Some((1, 1).into()),
                    ..Default::default()
                },
            )],
        },
    );
    reg.set(&img, state.clone())?;
    assert_eq!(reg.get(&img)?, Some(state));
    reg.update(&img, &mut |s| {
        s.remove("Length");
        Ok(())
    })?;
    assert_eq!(reg.get(&img)?, Some(RawToolState::new()));
    reg.remove(&img)?;
    assert_eq!(reg.get(&img)?, None);
    Ok(())
}
