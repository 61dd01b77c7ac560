use serde::{Deserialize, Serialize};

use crate::{BbF, Handles, PtF, TPtF};

/// Euclidean distance between two points.
pub fn distance(p1: PtF, p2: PtF) -> TPtF {
    p1.dist(&p2)
}

/// Angle at vertex `p2` in degrees via the law of cosines. `None` if the triangle is
/// degenerate, i.e., if any of its sides has length zero.
pub fn angle_degrees(p1: PtF, p2: PtF, p3: PtF) -> Option<TPtF> {
    let a = distance(p2, p3);
    let b = distance(p1, p3);
    let c = distance(p1, p2);
    if a == 0.0 || b == 0.0 || c == 0.0 {
        return None;
    }
    let cos = ((a * a + c * c - b * b) / (2.0 * a * c)).clamp(-1.0, 1.0);
    let res = cos.acos().to_degrees();
    res.is_finite().then_some(res)
}

/// Absolute shoelace area of the closed polygon. Fewer than 3 points have area 0.
pub fn polygon_area(points: &[PtF]) -> TPtF {
    if points.len() < 3 {
        return 0.0;
    }
    let n = points.len();
    let twice_signed = (0..n)
        .map(|i| {
            let (p, q) = (points[i], points[(i + 1) % n]);
            p.x * q.y - q.x * p.y
        })
        .sum::<TPtF>();
    (twice_signed * 0.5).abs()
}

/// Sum of the edge lengths including the closing edge from the last to the first point.
pub fn polygon_perimeter(points: &[PtF]) -> TPtF {
    if points.len() < 2 {
        return 0.0;
    }
    let n = points.len();
    (0..n)
        .map(|i| distance(points[i], points[(i + 1) % n]))
        .sum()
}

/// Numeric measurements of one annotation, only those that apply to its kind are set.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub length: Option<TPtF>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub angle_degrees: Option<TPtF>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub area: Option<TPtF>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub perimeter: Option<TPtF>,
}

impl Metrics {
    /// Computes the metrics of `handles`. Ellipses and freehand regions are measured on
    /// `derived`, the canonical point sequence, rectangles on their box.
    pub fn compute(handles: &Handles, derived: &[PtF]) -> Self {
        match handles {
            Handles::Probe { .. } => Self::default(),
            Handles::Length { start, end } => Self {
                length: Some(distance(*start, *end)),
                ..Default::default()
            },
            Handles::Angle { start, middle, end } => Self {
                angle_degrees: angle_degrees(*start, *middle, *end),
                ..Default::default()
            },
            Handles::RectangleRoi { start, end } => {
                let bb = BbF::from_points(*start, *end);
                Self {
                    area: Some(bb.area()),
                    perimeter: Some(bb.perimeter()),
                    ..Default::default()
                }
            }
            Handles::EllipticalRoi { .. } | Handles::FreehandRoi { .. } => Self {
                area: Some(polygon_area(derived)),
                perimeter: Some(polygon_perimeter(derived)),
                ..Default::default()
            },
        }
    }
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
fn close(a: TPtF, b: TPtF) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_angle() {
    let right = angle_degrees((1, 0).into(), (0, 0).into(), (0, 1).into()).unwrap();
    assert!(close(right, 90.0));
    let straight = angle_degrees((-1, 0).into(), (0, 0).into(), (1, 0).into()).unwrap();
    assert!(close(straight, 180.0));
    let acute = angle_degrees((1, 0).into(), (0, 0).into(), (1, 1).into()).unwrap();
    assert!(close(acute, 45.0));
    assert!(angle_degrees((0, 0).into(), (0, 0).into(), (1, 1).into()).is_none());
    assert!(angle_degrees((1, 1).into(), (0, 0).into(), (1, 1).into()).is_none());
    for deg in [0.5, 10.0, 33.3, 89.0, 120.0, 179.5] {
        let rad = TPtF::to_radians(deg);
        let p3 = PtF {
            x: 5.0 * rad.cos(),
            y: 5.0 * rad.sin(),
        };
        let res = angle_degrees((3, 0).into(), (0, 0).into(), p3).unwrap();
        assert!((0.0..=180.0).contains(&res));
        assert!((res - deg).abs() < 1e-6, "{res} vs {deg}");
    }
}

#[test]
fn test_polygon() {
    let square: Vec<PtF> = vec![(0, 0).into(), (4, 0).into(), (4, 4).into(), (0, 4).into()];
    assert!(close(polygon_area(&square), 16.0));
    assert!(close(polygon_perimeter(&square), 16.0));

    let mut reversed = square.clone();
    reversed.reverse();
    assert!(close(polygon_area(&reversed), 16.0));
    let mut rotated = square.clone();
    rotated.rotate_left(1);
    assert!(close(polygon_area(&rotated), 16.0));
    assert!(close(polygon_perimeter(&rotated), 16.0));

    assert_eq!(polygon_area(&square[..2]), 0.0);
    assert!(close(polygon_perimeter(&square[..2]), 8.0));
    assert_eq!(polygon_perimeter(&square[..1]), 0.0);
    assert_eq!(polygon_area(&[]), 0.0);
}

#[test]
fn test_compute() {
    let h = Handles::Length {
        start: (0, 0).into(),
        end: (3, 4).into(),
    };
    let m = Metrics::compute(&h, &h.derived_points());
    assert!(close(m.length.unwrap(), 5.0));
    assert!(m.area.is_none() && m.angle_degrees.is_none());

    let h = Handles::RectangleRoi {
        start: (10, 10).into(),
        end: (20, 15).into(),
    };
    let m = Metrics::compute(&h, &h.derived_points());
    assert!(close(m.area.unwrap(), 50.0));
    assert!(close(m.perimeter.unwrap(), 30.0));

    let h = Handles::Probe {
        point: (1, 1).into(),
    };
    assert!(Metrics::compute(&h, &h.derived_points()).is_empty());

    let h = Handles::Angle {
        start: (2, 2).into(),
        middle: (2, 2).into(),
        end: (5, 5).into(),
    };
    let m = Metrics::compute(&h, &h.derived_points());
    assert!(m.is_empty());
    let s = serde_json::to_string(&m).unwrap();
    assert_eq!(s, "{}");
}

#[test]
fn test_ellipse_area() {
    let h = Handles::EllipticalRoi {
        start: (0, 0).into(),
        end: (40, 20).into(),
    };
    let m = Metrics::compute(&h, &h.derived_points());
    let exact = std::f64::consts::PI * 20.0 * 10.0;
    // sampled polygon lies inside the ellipse
    let area = m.area.unwrap();
    assert!(area < exact && area > 0.95 * exact, "{area}");
}

#[cfg(test)]
fn assert_cyclic_invariant(points: &[PtF]) {
    let same = |a: TPtF, b: TPtF| (a - b).abs() <= 1e-9 * b.abs().max(1.0);
    let area = polygon_area(points);
    let perimeter = polygon_perimeter(points);
    let mut reversed = points.to_vec();
    reversed.reverse();
    for k in 0..points.len() {
        for seq in [points, &reversed[..]] {
            let mut rotated = seq.to_vec();
            rotated.rotate_left(k);
            assert!(same(polygon_area(&rotated), area), "shift {k}");
            assert!(same(polygon_perimeter(&rotated), perimeter), "shift {k}");
        }
    }
}

#[test]
fn test_invariance_on_sampled_shapes() {
    let ellipse = Handles::EllipticalRoi {
        start: (3, 7).into(),
        end: (43, 29).into(),
    };
    let sampled = ellipse.derived_points();
    assert!(sampled.len() > 10);
    assert_cyclic_invariant(&sampled);

    // concave and with fractional coordinates
    let free: Vec<PtF> = vec![
        (0, 0).into(),
        (10, 0).into(),
        PtF { x: 10.5, y: 7.25 },
        (5, 3).into(),
        PtF { x: 1.75, y: 9.0 },
        (-2, 4).into(),
    ];
    assert_cyclic_invariant(&free);
    let m = Metrics::compute(
        &Handles::FreehandRoi {
            points: free.clone(),
        },
        &free,
    );
    let mut shifted = free.clone();
    shifted.rotate_left(2);
    shifted.reverse();
    let m_shifted = Metrics::compute(
        &Handles::FreehandRoi {
            points: shifted.clone(),
        },
        &shifted,
    );
    assert!(close(m.area.unwrap(), m_shifted.area.unwrap()));
    assert!(close(m.perimeter.unwrap(), m_shifted.perimeter.unwrap()));
}
