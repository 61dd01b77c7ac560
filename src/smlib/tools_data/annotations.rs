use serde::{Deserialize, Serialize};
use slicemark_domain::{BbF, Handles, Metrics, PtF, ToolKind, normalize};
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

use super::ImageId;

/// Canonical record of one drawn shape. Equal handles always lead to equal derived points
/// and metrics.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalAnnotation {
    pub uid: Uuid,
    pub handles: Handles,
    pub derived_points: Vec<PtF>,
    #[serde(default)]
    pub metrics: Metrics,
}

impl CanonicalAnnotation {
    pub fn from_handles(uid: Uuid, handles: Handles) -> Self {
        let (derived_points, metrics) = normalize(&handles);
        Self {
            uid,
            handles,
            derived_points,
            metrics,
        }
    }
    pub fn tool_kind(&self) -> ToolKind {
        self.handles.kind()
    }
    /// Recomputes points and metrics from the handles, e.g., after loading a record that
    /// was written by an older version.
    pub fn renormalized(self) -> Self {
        Self::from_handles(self.uid, self.handles)
    }

    /// Human readable summary of the metrics of the annotation.
    pub fn label(&self) -> String {
        match &self.handles {
            Handles::Probe { point } => format!("X: {:.1}, Y: {:.1}", point.x, point.y),
            Handles::Length { .. } => {
                format!("Length: {:.1} px", self.metrics.length.unwrap_or(0.0))
            }
            Handles::Angle { .. } => match self.metrics.angle_degrees {
                Some(deg) => format!("Angle: {deg:.1}°"),
                None => "Angle: n/a".to_string(),
            },
            Handles::RectangleRoi { start, end } => {
                let bb = BbF::from_points(*start, *end);
                format!("W × H: {:.1} × {:.1} px", bb.w, bb.h)
            }
            Handles::EllipticalRoi { .. } | Handles::FreehandRoi { .. } => format!(
                "Area: {:.1} px², Perimeter: {:.1} px",
                self.metrics.area.unwrap_or(0.0),
                self.metrics.perimeter.unwrap_or(0.0)
            ),
        }
    }
}

/// All annotations of one image grouped by tool kind. Each list is in draw order.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct ImageAnnotationSet {
    per_kind: BTreeMap<ToolKind, Vec<CanonicalAnnotation>>,
}

impl ImageAnnotationSet {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn is_empty(&self) -> bool {
        self.per_kind.values().all(Vec::is_empty)
    }
    pub fn len(&self) -> usize {
        self.per_kind.values().map(Vec::len).sum()
    }
    pub fn push(&mut self, anno: CanonicalAnnotation) {
        self.per_kind.entry(anno.tool_kind()).or_default().push(anno);
    }
    /// Replaces the annotation with the same uid in place or appends it.
    pub fn upsert(&mut self, anno: CanonicalAnnotation) {
        let annos = self.per_kind.entry(anno.tool_kind()).or_default();
        match annos.iter_mut().find(|a| a.uid == anno.uid) {
            Some(existing) => *existing = anno,
            None => annos.push(anno),
        }
    }
    pub fn get(&self, kind: ToolKind) -> &[CanonicalAnnotation] {
        self.per_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
    pub fn kinds(&self) -> impl Iterator<Item = ToolKind> + '_ {
        self.per_kind
            .iter()
            .filter(|(_, annos)| !annos.is_empty())
            .map(|(kind, _)| *kind)
    }
    pub fn iter(&self) -> impl Iterator<Item = &CanonicalAnnotation> {
        self.per_kind.values().flatten()
    }
    /// Recomputes every annotation, see [`CanonicalAnnotation::renormalized`]. Annotations
    /// whose handles do not describe a shape are dropped.
    pub fn renormalized(self) -> Self {
        let mut res = Self::new();
        for anno in self.per_kind.into_values().flatten() {
            if anno.handles.is_complete() {
                res.push(anno.renormalized());
            } else {
                warn!("dropping incomplete {} annotation {}", anno.tool_kind(), anno.uid);
            }
        }
        res
    }
}
impl FromIterator<CanonicalAnnotation> for ImageAnnotationSet {
    fn from_iter<I: IntoIterator<Item = CanonicalAnnotation>>(iter: I) -> Self {
        let mut res = Self::new();
        for anno in iter {
            res.push(anno);
        }
        res
    }
}

/// Annotation sets of all images of a session.
pub type AnnotationsMap = BTreeMap<ImageId, ImageAnnotationSet>;

/// Images that carry at least one annotation, in id order.
pub fn annotated_ids(annotations_map: &AnnotationsMap) -> Vec<&ImageId> {
    annotations_map
        .iter()
        .filter(|(_, set)| !set.is_empty())
        .map(|(id, _)| id)
        .collect()
}

#[cfg(test)]
pub fn make_test_set() -> ImageAnnotationSet {
    [
        Handles::Length {
            start: (0, 0).into(),
            end: (3, 4).into(),
        },
        Handles::Length {
            start: (1, 1).into(),
            end: (1, 9).into(),
        },
        Handles::Angle {
            start: (0, 1).into(),
            middle: (0, 0).into(),
            end: (1, 0).into(),
        },
        Handles::RectangleRoi {
            start: (10, 10).into(),
            end: (20, 15).into(),
        },
        Handles::Probe {
            point: (7, 8).into(),
        },
    ]
    .into_iter()
    .map(|h| CanonicalAnnotation::from_handles(Uuid::new_v4(), h))
    .collect()
}

#[test]
fn test_labels() {
    let set = make_test_set();
    let labels = set.iter().map(|a| a.label()).collect::<Vec<_>>();
    assert_eq!(
        labels,
        vec![
            "X: 7.0, Y: 8.0",
            "Length: 5.0 px",
            "Length: 8.0 px",
            "Angle: 90.0°",
            "W × H: 10.0 × 5.0 px",
        ]
    );
    let free = CanonicalAnnotation::from_handles(
        Uuid::new_v4(),
        Handles::FreehandRoi {
            points: vec![(0, 0).into(), (4, 0).into(), (4, 4).into(), (0, 4).into()],
        },
    );
    assert_eq!(free.label(), "Area: 16.0 px², Perimeter: 16.0 px");
}

#[test]
fn test_set() {
    let mut set = make_test_set();
    assert_eq!(set.len(), 5);
    assert_eq!(
        set.kinds().collect::<Vec<_>>(),
        vec![
            ToolKind::Probe,
            ToolKind::Length,
            ToolKind::Angle,
            ToolKind::RectangleRoi
        ]
    );
    // draw order within a kind
    let lengths = set.get(ToolKind::Length);
    assert_eq!(lengths[0].metrics.length, Some(5.0));
    assert_eq!(lengths[1].metrics.length, Some(8.0));

    let mut moved = lengths[0].clone();
    moved.handles = Handles::Length {
        start: (0, 0).into(),
        end: (6, 8).into(),
    };
    let moved = moved.renormalized();
    set.upsert(moved.clone());
    assert_eq!(set.len(), 5);
    assert_eq!(set.get(ToolKind::Length)[0], moved);
    assert!(ImageAnnotationSet::new().is_empty());
    assert!(set.get(ToolKind::FreehandRoi).is_empty());
}

#[test]
fn test_renormalized_drops_out_of_range() {
    let mut set = make_test_set();
    let far = Handles::Probe {
        point: PtF { x: 1e19, y: 0.0 },
    };
    set.push(CanonicalAnnotation::from_handles(Uuid::new_v4(), far));
    assert_eq!(set.len(), 6);
    let set = set.renormalized();
    assert_eq!(set.len(), 5);
    assert!(set.iter().all(|a| a.handles.is_complete()));
}

#[test]
fn test_set_serde() {
    let set = make_test_set();
    let s = serde_json::to_string(&set).unwrap();
    assert!(s.starts_with("{\"Probe\":[{\"uid\":"));
    assert!(s.contains("\"derivedPoints\""));
    let back: ImageAnnotationSet = serde_json::from_str(&s).unwrap();
    assert_eq!(back, set);

    let mut map = AnnotationsMap::new();
    map.insert("b".into(), set);
    map.insert("a".into(), ImageAnnotationSet::new());
    assert_eq!(annotated_ids(&map), vec![&ImageId::from("b")]);
}
