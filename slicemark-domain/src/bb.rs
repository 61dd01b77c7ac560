use serde::{Deserialize, Serialize};

use super::{
    Point, PtF, ShapeI, TPtF,
    core::{max, min},
};

/// Axis aligned box spanned by two opposite corners of a rectangle annotation. Other than
/// pixel boxes, `w` and `h` are the distances between the corner coordinates, i.e., a box
/// from `(10, 10)` to `(20, 15)` has width 10 and height 5.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default)]
pub struct BbF {
    pub x: TPtF,
    pub y: TPtF,
    pub w: TPtF,
    pub h: TPtF,
}

impl BbF {
    pub fn from_points(p1: PtF, p2: PtF) -> Self {
        let x_min = min(p1.x, p2.x);
        let y_min = min(p1.y, p2.y);
        let x_max = max(p1.x, p2.x);
        let y_max = max(p1.y, p2.y);
        Self {
            x: x_min,
            y: y_min,
            w: x_max - x_min,
            h: y_max - y_min,
        }
    }
    pub fn x_max(&self) -> TPtF {
        self.x + self.w
    }
    pub fn y_max(&self) -> TPtF {
        self.y + self.h
    }
    pub fn area(&self) -> TPtF {
        self.w * self.h
    }
    pub fn perimeter(&self) -> TPtF {
        2.0 * (self.w + self.h)
    }

    /// Corners in clockwise order on screen (y pointing down), starting top-left.
    pub fn corner(&self, idx: usize) -> PtF {
        match idx {
            0 => Point {
                x: self.x,
                y: self.y,
            },
            1 => (self.x_max(), self.y).into(),
            2 => (self.x_max(), self.y_max()).into(),
            3 => (self.x, self.y_max()).into(),
            _ => panic!("rectangles only have 4 corners, {idx} is out of bounds"),
        }
    }
    pub fn points_iter(&self) -> impl Iterator<Item = PtF> + Clone + '_ {
        (0..4).map(|idx| self.corner(idx))
    }

    /// Integer points walking along the edges top, right, bottom, left. Each pixel on the
    /// border is visited exactly once.
    pub fn outline(&self) -> Vec<PtF> {
        self.outline_clipped(i64::MIN, i64::MIN, i64::MAX, i64::MAX)
    }

    /// The part of [`outline`](Self::outline) that lies on an image of the given shape.
    /// The work is bounded by the image size, not by the size of the box.
    pub fn outline_within(&self, shape: ShapeI) -> Vec<PtF> {
        if shape.w == 0 || shape.h == 0 {
            return vec![];
        }
        self.outline_clipped(0, 0, i64::from(shape.w) - 1, i64::from(shape.h) - 1)
    }

    fn outline_clipped(
        &self,
        clip_x_min: i64,
        clip_y_min: i64,
        clip_x_max: i64,
        clip_y_max: i64,
    ) -> Vec<PtF> {
        // rounding saturates, non-finite coordinates end up as 0
        let (x_min, y_min) = (self.x.round() as i64, self.y.round() as i64);
        let (x_max, y_max) = (self.x_max().round() as i64, self.y_max().round() as i64);
        let xs = |from: i64, to: i64| from.max(clip_x_min)..=to.min(clip_x_max);
        let ys = |from: i64, to: i64| from.max(clip_y_min)..=to.min(clip_y_max);
        let has_x = |x: i64| (clip_x_min..=clip_x_max).contains(&x);
        let has_y = |y: i64| (clip_y_min..=clip_y_max).contains(&y);
        let pt = |x: i64, y: i64| PtF {
            x: x as TPtF,
            y: y as TPtF,
        };
        let mut res = vec![];
        if has_y(y_min) {
            res.extend(xs(x_min, x_max).map(|x| pt(x, y_min)));
        }
        if has_x(x_max) {
            res.extend(ys(y_min.saturating_add(1), y_max).map(|y| pt(x_max, y)));
        }
        if y_max > y_min && has_y(y_max) {
            res.extend(xs(x_min, x_max.saturating_sub(1)).rev().map(|x| pt(x, y_max)));
        }
        if x_max > x_min && has_x(x_min) {
            let left = ys(y_min.saturating_add(1), y_max.saturating_sub(1));
            res.extend(left.rev().map(|y| pt(x_min, y)));
        }
        res
    }
}

#[test]
fn test_corners() {
    let bb = BbF::from_points((20, 15).into(), (10, 10).into());
    assert_eq!(
        bb,
        BbF {
            x: 10.0,
            y: 10.0,
            w: 10.0,
            h: 5.0
        }
    );
    let corners = bb.points_iter().collect::<Vec<_>>();
    assert_eq!(
        corners,
        vec![
            PtF::from((10, 10)),
            (20, 10).into(),
            (20, 15).into(),
            (10, 15).into()
        ]
    );
    assert_eq!(bb.area(), 50.0);
    assert_eq!(bb.perimeter(), 30.0);
}

#[test]
fn test_outline() {
    let bb = BbF::from_points((0, 0).into(), (2, 1).into());
    let outline = bb.outline();
    assert_eq!(
        outline,
        vec![
            PtF::from((0, 0)),
            (1, 0).into(),
            (2, 0).into(),
            (2, 1).into(),
            (1, 1).into(),
            (0, 1).into(),
        ]
    );
    // 2 * (w + h) border pixels for non-degenerate boxes
    let bb = BbF::from_points((3, 4).into(), (7, 9).into());
    assert_eq!(bb.outline().len(), 18);
    let line = BbF::from_points((3, 4).into(), (6, 4).into());
    assert_eq!(line.outline().len(), 4);
    let dot = BbF::from_points((3, 4).into(), (3, 4).into());
    assert_eq!(dot.outline(), vec![PtF::from((3, 4))]);
}

#[test]
fn test_outline_within() {
    let bb = BbF::from_points((0, 0).into(), (2, 1).into());
    assert_eq!(bb.outline_within(ShapeI::new(10, 10)), bb.outline());
    // only the left and top edge are on the image
    let bb = BbF::from_points((1, 1).into(), (20, 30).into());
    let visible = bb.outline_within(ShapeI::new(5, 4));
    assert_eq!(visible.len(), 4 + 2);
    assert!(visible.iter().all(|p| p.x < 5.0 && p.y < 4.0));
    assert!(visible.contains(&PtF::from((1, 3))));
    assert!(bb.outline_within(ShapeI::new(0, 4)).is_empty());

    // huge boxes cost no more than the image
    let far = BbF::from_points(PtF { x: 9.1e15, y: 0.0 }, PtF { x: 9.1e15 + 4.0, y: 1.0 });
    assert!(far.outline_within(ShapeI::new(16, 16)).is_empty());
    let huge = BbF::from_points(PtF { x: -1e300, y: -1e300 }, PtF { x: 1e300, y: 1e300 });
    assert!(huge.outline_within(ShapeI::new(16, 16)).is_empty());
    let covering = BbF::from_points(PtF { x: 0.0, y: 0.0 }, PtF { x: 1e300, y: 2.0 });
    // top and bottom edge plus one pixel of the left edge
    assert_eq!(covering.outline_within(ShapeI::new(16, 16)).len(), 16 + 16 + 1);
}
