use slicemark_domain::{ErrorKind, ShapeI, SmResult, render_mask, smerr};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

use crate::{
    file_util,
    tools_data::{AnnotationsMap, ImageAnnotationSet, ImageId},
};

pub fn mask_path(folder: &Path, image: &ImageId) -> PathBuf {
    folder.join(format!("{}.png", file_util::sanitize_name(image.as_str())))
}

pub fn render(set: &ImageAnnotationSet, shape: ShapeI) -> image::GrayImage {
    render_mask(
        shape,
        set.iter()
            .map(|anno| (&anno.handles, anno.derived_points.as_slice())),
    )
}

/// Writes one binary PNG mask per annotated image into `folder`. Images without
/// annotations are skipped.
pub fn export_masks(
    annotations: &AnnotationsMap,
    folder: &Path,
    shape: ShapeI,
) -> SmResult<Vec<PathBuf>> {
    fs::create_dir_all(folder)
        .map_err(|e| smerr!(ErrorKind::Transport; "could not create {:?} due to {:?}", folder, e))?;
    let mut written = vec![];
    for (image, set) in annotations.iter().filter(|(_, set)| !set.is_empty()) {
        let target = mask_path(folder, image);
        render(set, shape).save(&target).map_err(
            |e| smerr!(ErrorKind::Transport; "could not write mask {:?} due to {:?}", target, e),
        )?;
        written.push(target);
    }
    info!("exported {} masks to {folder:?}", written.len());
    Ok(written)
}

#[cfg(test)]
use crate::{defer_folder_removal, tools_data::make_test_set};

#[test]
fn test_export() -> SmResult<()> {
    let folder = file_util::tmp_folder("masks")?;
    defer_folder_removal!(&folder);
    let mut annotations = AnnotationsMap::new();
    let img = ImageId::new("wadouri:http://h/img 1.dcm");
    annotations.insert(img.clone(), make_test_set());
    annotations.insert(ImageId::new("empty"), ImageAnnotationSet::new());
    let written = export_masks(&annotations, &folder, ShapeI::new(64, 64))?;
    assert_eq!(written, vec![mask_path(&folder, &img)]);
    let mask = image::open(&written[0]).map_err(slicemark_domain::to_sm)?.into_luma8();
    assert_eq!((mask.width(), mask.height()), (64, 64));
    assert!(mask.pixels().any(|p| p.0[0] == 255));
    assert!(mask.pixels().any(|p| p.0[0] == 0));
    Ok(())
}
