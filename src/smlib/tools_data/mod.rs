mod annotations;
mod image_id;

pub use annotations::{AnnotationsMap, CanonicalAnnotation, ImageAnnotationSet, annotated_ids};
#[cfg(test)]
pub use annotations::make_test_set;
pub use image_id::ImageId;
