use std::sync::Arc;

use smlib::{
    ImageId, SmResult, ToolKind, capture,
    cfg::{Cfg, Connection, EmptySetPolicy, get_default_cfg},
    control::{Control, ImageState, SAVE_OK_MSG},
    defer_folder_removal, file_util,
    registry::{AnnotationRegistry, MemoryRegistry, RawToolState},
    store::StoreFromCfg,
    tracing_setup::init_tracing_for_tests,
};

// shaped like the tool state of the drawing surface
const SURFACE_STATE: &str = r#"{
    "Length": {"data": [{"handles": {"start": {"x": 0, "y": 0}, "end": {"x": 3, "y": 4}}}]},
    "Angle": {"data": [{"handles": {
        "start": {"x": 0, "y": 1}, "middle": {"x": 0, "y": 0}, "end": {"x": 1, "y": 0}
    }}]},
    "RectangleRoi": {"data": [{"handles": {"start": {"x": 10, "y": 10}, "end": {"x": 20, "y": 15}}}]},
    "Probe": {"data": [{"handles": {"end": {"x": 7, "y": 8}}}]},
    "ArrowAnnotate": {"data": [{"handles": {"start": {"x": 1, "y": 1}}}]},
    "Length ": {"data": []}
}"#;

fn file_cfg(folder: std::path::PathBuf, policy: EmptySetPolicy) -> Cfg {
    let mut cfg = get_default_cfg();
    cfg.store.connection = Connection::File;
    cfg.store.set_folder(folder);
    cfg.empty_set_policy = policy;
    cfg
}

fn surface_state() -> RawToolState {
    serde_json::from_str(SURFACE_STATE).unwrap()
}

#[test]
fn test_measurements_survive_reload() -> SmResult<()> {
    init_tracing_for_tests();
    let folder = file_util::tmp_folder("roundtrip")?;
    defer_folder_removal!(&folder);
    let img = ImageId::new("wadouri:http://pacs/img-42.dcm");

    let registry = Arc::new(MemoryRegistry::new());
    registry.set(&img, surface_state())?;
    let mut ctrl = Control::from_cfg(
        file_cfg(folder.clone(), EmptySetPolicy::Explicit),
        registry.clone(),
    )?;
    ctrl.set_images(vec![img.clone()]);
    let report = ctrl.save("study-1")?;
    assert!(report.is_ok());
    assert_eq!(ctrl.save_status(), Some(SAVE_OK_MSG));

    let captured = &ctrl.annotations()[&img].clone();
    assert_eq!(captured.len(), 4);
    let length = &captured.get(ToolKind::Length)[0];
    assert_eq!(length.metrics.length, Some(5.0));
    let angle = &captured.get(ToolKind::Angle)[0];
    assert!((angle.metrics.angle_degrees.unwrap() - 90.0).abs() < 1e-9);
    let rect = &captured.get(ToolKind::RectangleRoi)[0];
    assert_eq!(rect.metrics.area, Some(50.0));
    assert_eq!(rect.metrics.perimeter, Some(30.0));

    // loading into the surface the session was saved from keeps one shape each
    ctrl.load("study-1");
    let same_surface = capture(registry.as_ref(), std::slice::from_ref(&img))?;
    assert_eq!(&same_surface[&img], captured);

    // a fresh viewer with a fresh store instance on the same folder
    let registry = Arc::new(MemoryRegistry::new());
    let mut ctrl2 = Control::from_cfg(
        file_cfg(folder.clone(), EmptySetPolicy::Explicit),
        registry.clone(),
    )?;
    ctrl2.set_images(vec![img.clone()]);
    let report = ctrl2.load("study-1");
    assert_eq!(report.applied, vec![img.clone()]);
    assert_eq!(ctrl2.image_state(&img), ImageState::Restored);
    assert_eq!(&ctrl2.annotations()[&img], captured);

    // restoring twice does not duplicate shapes
    ctrl2.load("study-1");
    let recaptured = capture(registry.as_ref(), std::slice::from_ref(&img))?;
    assert_eq!(&recaptured[&img], captured);

    // saving again keeps one record per image
    ctrl2.save("study-1")?;
    assert!(matches!(ctrl2.sync().store(), StoreFromCfg::Local(_)));
    let reloaded = ctrl2.load("study-1");
    assert_eq!(reloaded.applied.len(), 1);
    Ok(())
}

fn check_cleared_image(policy: EmptySetPolicy) -> SmResult<()> {
    let folder = file_util::tmp_folder("cleared")?;
    defer_folder_removal!(&folder);
    let img = ImageId::new("img-42");
    let registry = Arc::new(MemoryRegistry::new());
    registry.set(&img, surface_state())?;
    let mut ctrl = Control::from_cfg(file_cfg(folder.clone(), policy), registry.clone())?;
    ctrl.set_images(vec![img.clone()]);
    ctrl.save("s")?;
    registry.set(&img, RawToolState::new())?;
    ctrl.on_annotations_changed(&img);
    ctrl.save("s")?;

    let immediately = ctrl.load("s");
    let annotations_immediately = ctrl.annotations().clone();

    let mut after_reload = Control::from_cfg(
        file_cfg(folder.clone(), policy),
        Arc::new(MemoryRegistry::new()),
    )?;
    after_reload.set_images(vec![img.clone()]);
    let reloaded = after_reload.load("s");
    assert_eq!(reloaded.applied, vec![img.clone()]);
    assert_eq!(&annotations_immediately, after_reload.annotations());
    match policy {
        EmptySetPolicy::Explicit => {
            assert_eq!(immediately.applied, vec![img.clone()]);
            assert!(annotations_immediately[&img].is_empty());
        }
        EmptySetPolicy::Omit => {
            // the earlier record stays
            assert_eq!(annotations_immediately[&img].len(), 4);
        }
    }
    Ok(())
}

#[test]
fn test_cleared_image() -> SmResult<()> {
    init_tracing_for_tests();
    check_cleared_image(EmptySetPolicy::Explicit)?;
    check_cleared_image(EmptySetPolicy::Omit)
}

#[test]
fn test_unknown_session() -> SmResult<()> {
    init_tracing_for_tests();
    let folder = file_util::tmp_folder("unknown-session")?;
    defer_folder_removal!(&folder);
    let mut ctrl = Control::from_cfg(
        file_cfg(folder.clone(), EmptySetPolicy::Explicit),
        Arc::new(MemoryRegistry::new()),
    )?;
    let report = ctrl.load("never-saved");
    assert!(report.applied.is_empty());
    assert!(ctrl.annotations().is_empty());
    assert!(ctrl.annotated_images().is_empty());
    Ok(())
}
