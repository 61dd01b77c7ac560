use std::{
    f64::consts::PI,
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{
    BbF, PtF, ShapeI, SmError, TPtF,
    line::{UniquePath, interpolate},
    smerr,
};

/// Angular step when sampling the outline of an ellipse.
pub const ELLIPSE_THETA_STEP: TPtF = 0.18;
/// Minimal distance between two consecutive ellipse samples.
pub const ELLIPSE_MIN_SPACING: TPtF = 0.5;
/// Largest absolute coordinate of a control point. Images are far smaller.
pub const MAX_COORDINATE: TPtF = 1e6;

/// Shape class of an annotation. The names are the tool names of the drawing surface.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ToolKind {
    Probe,
    Length,
    Angle,
    RectangleRoi,
    EllipticalRoi,
    FreehandRoi,
}

impl ToolKind {
    pub const ALL: [ToolKind; 6] = [
        ToolKind::Probe,
        ToolKind::Length,
        ToolKind::Angle,
        ToolKind::RectangleRoi,
        ToolKind::EllipticalRoi,
        ToolKind::FreehandRoi,
    ];
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::Probe => "Probe",
            ToolKind::Length => "Length",
            ToolKind::Angle => "Angle",
            ToolKind::RectangleRoi => "RectangleRoi",
            ToolKind::EllipticalRoi => "EllipticalRoi",
            ToolKind::FreehandRoi => "FreehandRoi",
        }
    }
    /// Closed shapes enclose a region and have an area.
    pub fn is_closed(&self) -> bool {
        match self {
            ToolKind::Probe | ToolKind::Length | ToolKind::Angle => false,
            ToolKind::RectangleRoi | ToolKind::EllipticalRoi | ToolKind::FreehandRoi => true,
        }
    }
}
impl Display for ToolKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
impl FromStr for ToolKind {
    type Err = SmError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolKind::ALL
            .iter()
            .find(|k| k.name() == s)
            .copied()
            .ok_or_else(|| smerr!("unknown tool kind '{}'", s))
    }
}

/// Control points of an annotation, one variant per [`ToolKind`](ToolKind).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "toolKind")]
pub enum Handles {
    Probe { point: PtF },
    Length { start: PtF, end: PtF },
    Angle { start: PtF, middle: PtF, end: PtF },
    RectangleRoi { start: PtF, end: PtF },
    EllipticalRoi { start: PtF, end: PtF },
    FreehandRoi { points: Vec<PtF> },
}

impl Handles {
    pub fn kind(&self) -> ToolKind {
        match self {
            Handles::Probe { .. } => ToolKind::Probe,
            Handles::Length { .. } => ToolKind::Length,
            Handles::Angle { .. } => ToolKind::Angle,
            Handles::RectangleRoi { .. } => ToolKind::RectangleRoi,
            Handles::EllipticalRoi { .. } => ToolKind::EllipticalRoi,
            Handles::FreehandRoi { .. } => ToolKind::FreehandRoi,
        }
    }

    /// The control points themselves in the order the drawing surface records them.
    pub fn control_points(&self) -> Vec<PtF> {
        match self {
            Handles::Probe { point } => vec![*point],
            Handles::Length { start, end }
            | Handles::RectangleRoi { start, end }
            | Handles::EllipticalRoi { start, end } => vec![*start, *end],
            Handles::Angle { start, middle, end } => vec![*start, *middle, *end],
            Handles::FreehandRoi { points } => points.clone(),
        }
    }

    /// Handles that cannot describe a shape, e.g., a freehand region without points or
    /// coordinates that are not finite or beyond [`MAX_COORDINATE`], are rejected.
    pub fn is_complete(&self) -> bool {
        let in_range = |p: &PtF| {
            p.is_finite() && p.x.abs() <= MAX_COORDINATE && p.y.abs() <= MAX_COORDINATE
        };
        let points = self.control_points();
        !points.is_empty() && points.iter().all(in_range)
    }

    pub fn bb(&self) -> Option<BbF> {
        match self {
            Handles::RectangleRoi { start, end } | Handles::EllipticalRoi { start, end } => {
                Some(BbF::from_points(*start, *end))
            }
            _ => None,
        }
    }

    /// Canonical ordered point sequence of the shape.
    pub fn derived_points(&self) -> Vec<PtF> {
        match self {
            Handles::Probe { point } => vec![*point],
            Handles::Length { start, end } => interpolate(*start, *end).collect(),
            Handles::Angle { start, middle, end } => {
                let mut path = UniquePath::new();
                path.extend_line(*start, *middle);
                path.extend_line(*middle, *end);
                path.into_points()
            }
            Handles::RectangleRoi { start, end } => {
                BbF::from_points(*start, *end).points_iter().collect()
            }
            Handles::EllipticalRoi { start, end } => ellipse_points(*start, *end),
            Handles::FreehandRoi { points } => points.clone(),
        }
    }
}

/// Integer border pixels of the rectangle spanned by `start` and `end` that lie on an image
/// of the given shape, walking top, right, bottom and left edge.
pub fn rectangle_outline(start: PtF, end: PtF, shape: ShapeI) -> Vec<PtF> {
    BbF::from_points(start, end).outline_within(shape)
}

/// Samples the ellipse inscribed into the box spanned by `start` and `end`. The first
/// sample at `θ = 0` is always kept, later ones only if they are at least
/// [`ELLIPSE_MIN_SPACING`](ELLIPSE_MIN_SPACING) away from the previously kept sample.
pub fn ellipse_points(start: PtF, end: PtF) -> Vec<PtF> {
    let center = (start + end) / 2.0;
    let semi = start - center;
    let at = |theta: TPtF| PtF {
        x: center.x + semi.x * theta.cos(),
        y: center.y + semi.y * theta.sin(),
    };
    let mut prev = at(0.0);
    let mut res = vec![prev];
    let mut theta = 0.0;
    while theta <= 2.0 * PI {
        let p = at(theta);
        if prev.dist(&p) >= ELLIPSE_MIN_SPACING {
            res.push(p);
            prev = p;
        }
        theta += ELLIPSE_THETA_STEP;
    }
    res
}

#[cfg(test)]
fn handles_for_all_kinds() -> Vec<Handles> {
    vec![
        Handles::Probe {
            point: (4, 2).into(),
        },
        Handles::Length {
            start: (0, 0).into(),
            end: (3, 4).into(),
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
        Handles::EllipticalRoi {
            start: (0, 0).into(),
            end: (20, 10).into(),
        },
        Handles::FreehandRoi {
            points: vec![(0, 0).into(), (5, 0).into(), (5, 5).into()],
        },
    ]
}

#[test]
fn test_kind_names() {
    for kind in ToolKind::ALL {
        assert_eq!(kind.name().parse::<ToolKind>().unwrap(), kind);
        assert_eq!(kind.to_string(), kind.name());
    }
    assert!("Eraser".parse::<ToolKind>().is_err());
    for h in handles_for_all_kinds() {
        assert_eq!(ToolKind::from_str(h.kind().name()).unwrap(), h.kind());
    }
}

#[test]
fn test_derived_points_non_empty() {
    for h in handles_for_all_kinds() {
        assert!(h.is_complete());
        assert!(!h.derived_points().is_empty(), "{:?}", h.kind());
    }
    let degenerate = Handles::EllipticalRoi {
        start: (3, 3).into(),
        end: (3, 3).into(),
    };
    assert_eq!(degenerate.derived_points(), vec![PtF::from((3, 3))]);
    let empty = Handles::FreehandRoi { points: vec![] };
    assert!(!empty.is_complete());
    let nan = Handles::Probe {
        point: PtF {
            x: f64::NAN,
            y: 1.0,
        },
    };
    assert!(!nan.is_complete());
}

#[test]
fn test_coordinates_out_of_range() {
    let far = Handles::Length {
        start: (0, 0).into(),
        end: PtF { x: 1e19, y: 0.0 },
    };
    assert!(!far.is_complete());
    let border = Handles::Length {
        start: PtF {
            x: -MAX_COORDINATE,
            y: 0.0,
        },
        end: PtF {
            x: MAX_COORDINATE,
            y: 0.0,
        },
    };
    assert!(border.is_complete());
    assert_eq!(border.derived_points().len(), 2_000_001);
}

#[test]
fn test_angle_points() {
    let h = Handles::Angle {
        start: (0, 2).into(),
        middle: (0, 0).into(),
        end: (2, 0).into(),
    };
    let pts = h.derived_points();
    assert_eq!(
        pts,
        vec![
            PtF::from((0, 2)),
            (0, 1).into(),
            (0, 0).into(),
            (1, 0).into(),
            (2, 0).into()
        ]
    );
    for w in pts.windows(2) {
        assert_ne!(w[0], w[1]);
    }
}

#[test]
fn test_ellipse_points() {
    let pts = ellipse_points((0, 0).into(), (20, 10).into());
    assert!(pts.len() > 10);
    // θ = 0 is the midpoint of the left edge of the box
    assert!(pts[0].is_close_to((0, 5).into()));
    for w in pts.windows(2) {
        assert!(w[0].dist(&w[1]) >= ELLIPSE_MIN_SPACING);
    }
    let center = PtF::from((10, 5));
    for p in &pts {
        let nx = (p.x - center.x) / 10.0;
        let ny = (p.y - center.y) / 5.0;
        assert!((nx * nx + ny * ny - 1.0).abs() < 1e-9);
    }
}

#[test]
fn test_handles_serde() {
    let h = Handles::Length {
        start: (0, 0).into(),
        end: (3, 4).into(),
    };
    let s = serde_json::to_string(&h).unwrap();
    assert_eq!(
        s,
        r#"{"toolKind":"Length","start":{"x":0.0,"y":0.0},"end":{"x":3.0,"y":4.0}}"#
    );
    let back: Handles = serde_json::from_str(&s).unwrap();
    assert_eq!(back, h);
}
