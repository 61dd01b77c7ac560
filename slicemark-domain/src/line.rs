use crate::{PtF, TPtF};

/// Upper bound of the number of steps [`interpolate`] takes.
pub const MAX_INTERPOLATION_STEPS: usize = 1 << 22;

/// Samples the segment from `start` to `end` with unit steps along the dominant axis, i.e.,
/// `steps = max(|dx|, |dy|)` and the points `start + (end - start) * i / steps` for
/// `i = 0..=floor(steps)`. Degenerates to `[start]` for `steps == 0`. Segments longer
/// than [`MAX_INTERPOLATION_STEPS`] are sampled with that many equal steps instead.
pub fn interpolate(start: PtF, end: PtF) -> impl Iterator<Item = PtF> {
    let d = end - start;
    let steps = d.x.abs().max(d.y.abs());
    let (n, denominator) = if steps > 0.0 && steps.is_finite() {
        let n = steps.floor() as usize;
        if n > MAX_INTERPOLATION_STEPS {
            (MAX_INTERPOLATION_STEPS, MAX_INTERPOLATION_STEPS as TPtF)
        } else {
            (n, steps)
        }
    } else {
        (0, 1.0)
    };
    (0..=n).map(move |i| {
        if n == 0 {
            start
        } else {
            start + d * (i as TPtF / denominator)
        }
    })
}

/// Appends points while never repeating the immediately preceding one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UniquePath {
    points: Vec<PtF>,
}
impl UniquePath {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn push(&mut self, p: PtF) {
        if self.points.last() != Some(&p) {
            self.points.push(p);
        }
    }
    /// Adds the rounded samples of the segment from `start` to `end`.
    pub fn extend_line(&mut self, start: PtF, end: PtF) {
        for p in interpolate(start, end) {
            self.push(p.round());
        }
    }
    pub fn into_points(self) -> Vec<PtF> {
        self.points
    }
}

#[test]
fn test_interpolate() {
    let pts = interpolate((0, 0).into(), (3, 4).into()).collect::<Vec<_>>();
    assert_eq!(pts.len(), 5);
    assert_eq!(pts[0], PtF::from((0, 0)));
    assert!(pts[4].is_close_to((3, 4).into()));
    assert!(pts[1].is_close_to(PtF { x: 0.75, y: 1.0 }));

    let pts = interpolate((2, 2).into(), (2, 2).into()).collect::<Vec<_>>();
    assert_eq!(pts, vec![PtF::from((2, 2))]);

    // fractional extents do not overshoot the end point
    let pts = interpolate(PtF { x: 0.0, y: 0.0 }, PtF { x: 2.5, y: 0.0 }).collect::<Vec<_>>();
    assert_eq!(pts.len(), 3);
    assert!(pts.iter().all(|p| p.x <= 2.5));
}

#[test]
fn test_interpolate_far_apart() {
    let end = PtF { x: 1e19, y: 0.0 };
    let mut n = 0;
    let mut last = None;
    for p in interpolate((0, 0).into(), end) {
        n += 1;
        last = Some(p);
    }
    assert_eq!(n, MAX_INTERPOLATION_STEPS + 1);
    assert_eq!(last, Some(end));
    let inf = PtF {
        x: TPtF::INFINITY,
        y: 0.0,
    };
    assert_eq!(interpolate((0, 0).into(), inf).count(), 1);
}

#[test]
fn test_unique_path() {
    let mut path = UniquePath::new();
    path.extend_line((0, 0).into(), (2, 0).into());
    path.extend_line((2, 0).into(), (2, 2).into());
    assert_eq!(
        path.into_points(),
        vec![
            PtF::from((0, 0)),
            (1, 0).into(),
            (2, 0).into(),
            (2, 1).into(),
            (2, 2).into()
        ]
    );
}
