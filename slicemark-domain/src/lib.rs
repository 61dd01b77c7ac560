mod bb;
mod core;
mod geometry;
mod line;
mod mask;
mod metrics;
pub mod result;
pub use bb::BbF;
pub use core::{
    Calc, Point, PtF, PtI, Shape, ShapeI, TPtF, TPtI, max_from_partial, min_from_partial,
};
pub use geometry::{
    ELLIPSE_MIN_SPACING, ELLIPSE_THETA_STEP, Handles, MAX_COORDINATE, ToolKind, ellipse_points,
    rectangle_outline,
};
pub use line::{MAX_INTERPOLATION_STEPS, UniquePath, interpolate};
pub use mask::{MASK_ON, draw_on_mask, render_mask};
pub use metrics::{Metrics, angle_degrees, distance, polygon_area, polygon_perimeter};
pub use result::{ErrorKind, SmError, SmResult, to_sm, to_sm_kind, trace_ok_err, trace_ok_warn};

/// Canonical points and metrics of `handles` in one go.
pub fn normalize(handles: &Handles) -> (Vec<PtF>, Metrics) {
    let derived = handles.derived_points();
    let metrics = Metrics::compute(handles, &derived);
    (derived, metrics)
}

#[test]
fn test_normalize_deterministic() {
    let h = Handles::FreehandRoi {
        points: vec![(0, 0).into(), (6, 0).into(), (6, 3).into(), (0, 3).into()],
    };
    let (p1, m1) = normalize(&h);
    let (p2, m2) = normalize(&h);
    assert_eq!(p1, p2);
    assert_eq!(m1, m2);
    assert_eq!(m1.area, Some(18.0));
    assert_eq!(m1.perimeter, Some(18.0));
}
