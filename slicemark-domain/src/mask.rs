use image::{GrayImage, Luma};
use imageproc::{drawing, point::Point as IpPoint};

use crate::{Handles, PtF, ShapeI, geometry::rectangle_outline};

pub const MASK_ON: Luma<u8> = Luma([255]);

fn to_ip_points(points: &[PtF]) -> Vec<IpPoint<i32>> {
    let mut res: Vec<IpPoint<i32>> = Vec::with_capacity(points.len());
    for p in points.iter().filter(|p| p.is_finite()) {
        let p = p.round_signed();
        let p = IpPoint::new(p.x, p.y);
        if res.last() != Some(&p) {
            res.push(p);
        }
    }
    // polygons are closed implicitly
    while res.len() > 1 && res.first() == res.last() {
        res.pop();
    }
    res
}

fn put_if_inside(mask: &mut GrayImage, p: IpPoint<i32>) {
    if p.x >= 0 && p.y >= 0 && (p.x as u32) < mask.width() && (p.y as u32) < mask.height() {
        mask.put_pixel(p.x as u32, p.y as u32, MASK_ON);
    }
}

fn draw_polyline(mask: &mut GrayImage, points: &[IpPoint<i32>]) {
    match points {
        [] => (),
        [p] => put_if_inside(mask, *p),
        _ => {
            for w in points.windows(2) {
                let start = (w[0].x as f32, w[0].y as f32);
                let end = (w[1].x as f32, w[1].y as f32);
                drawing::draw_line_segment_mut(mask, start, end, MASK_ON);
            }
        }
    }
}

/// Draws the derived points of one annotation into `mask`. Regions are filled, lines and
/// angles are drawn as polylines, and probes set a single pixel. Points outside the image
/// are clipped.
pub fn draw_on_mask(mask: &mut GrayImage, handles: &Handles, derived: &[PtF]) {
    if let Handles::RectangleRoi { start, end } = handles {
        let shape = ShapeI::new(mask.width(), mask.height());
        for p in rectangle_outline(*start, *end, shape) {
            put_if_inside(mask, IpPoint::new(p.x as i32, p.y as i32));
        }
    }
    let points = to_ip_points(derived);
    if handles.kind().is_closed() && points.len() >= 3 {
        drawing::draw_polygon_mut(mask, &points, MASK_ON);
        let mut outline = points.clone();
        outline.push(points[0]);
        draw_polyline(mask, &outline);
    } else {
        draw_polyline(mask, &points);
    }
}

/// Renders all annotations of one image into a binary mask of the given shape.
pub fn render_mask<'a>(
    shape: ShapeI,
    annotations: impl Iterator<Item = (&'a Handles, &'a [PtF])>,
) -> GrayImage {
    let mut mask = GrayImage::new(shape.w, shape.h);
    for (handles, derived) in annotations {
        draw_on_mask(&mut mask, handles, derived);
    }
    mask
}

#[cfg(test)]
fn count_on(mask: &GrayImage) -> usize {
    mask.pixels().filter(|p| **p == MASK_ON).count()
}

#[test]
fn test_probe_and_line() {
    let probe = Handles::Probe {
        point: (3, 4).into(),
    };
    let outside = Handles::Probe {
        point: (30, 4).into(),
    };
    let mask = render_mask(ShapeI::new(10, 10), [(&probe, &[][..])].into_iter());
    assert_eq!(count_on(&mask), 0);

    let mut mask = GrayImage::new(10, 10);
    draw_on_mask(&mut mask, &probe, &probe.derived_points());
    draw_on_mask(&mut mask, &outside, &outside.derived_points());
    assert_eq!(count_on(&mask), 1);
    assert_eq!(*mask.get_pixel(3, 4), MASK_ON);

    let line = Handles::Length {
        start: (0, 0).into(),
        end: (9, 0).into(),
    };
    let mut mask = GrayImage::new(10, 10);
    draw_on_mask(&mut mask, &line, &line.derived_points());
    assert_eq!(count_on(&mask), 10);
}

#[test]
fn test_filled_rectangle() {
    let rect = Handles::RectangleRoi {
        start: (2, 2).into(),
        end: (5, 6).into(),
    };
    let derived = rect.derived_points();
    let mask = render_mask(ShapeI::new(10, 10), [(&rect, &derived[..])].into_iter());
    assert_eq!(count_on(&mask), 4 * 5);
    assert_eq!(*mask.get_pixel(3, 4), MASK_ON);
    assert_eq!(*mask.get_pixel(7, 7), Luma([0]));
}

#[test]
fn test_rectangle_beyond_image() {
    let rect = Handles::RectangleRoi {
        start: (-5, 2).into(),
        end: (100_000, 6).into(),
    };
    let derived = rect.derived_points();
    let mask = render_mask(ShapeI::new(10, 10), [(&rect, &derived[..])].into_iter());
    assert_eq!(count_on(&mask), 10 * 5);
    let far = Handles::RectangleRoi {
        start: PtF { x: 9.1e15, y: 0.0 },
        end: PtF {
            x: 9.1e15 + 4.0,
            y: 1.0,
        },
    };
    let mut mask = GrayImage::new(10, 10);
    draw_on_mask(&mut mask, &far, &[]);
    assert_eq!(count_on(&mask), 0);
}

#[test]
fn test_closing_duplicate() {
    let free = Handles::FreehandRoi {
        points: vec![(1, 1).into(), (1, 1).into(), (4, 1).into(), (1, 4).into(), (1, 1).into()],
    };
    let mut mask = GrayImage::new(6, 6);
    draw_on_mask(&mut mask, &free, &free.derived_points());
    assert_eq!(*mask.get_pixel(2, 2), MASK_ON);
    let collinear = Handles::FreehandRoi {
        points: vec![(1, 1).into(), (2, 1).into()],
    };
    let mut mask = GrayImage::new(6, 6);
    draw_on_mask(&mut mask, &collinear, &collinear.derived_points());
    assert_eq!(count_on(&mask), 2);
}
