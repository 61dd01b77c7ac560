mod capture;
pub mod cfg;
pub mod control;
pub mod file_util;
pub mod httpserver;
pub mod mask_export;
pub mod registry;
pub mod restore;
pub mod store;
pub mod sync;
mod tools_data;
pub mod tracing_setup;
pub mod result {
    pub use slicemark_domain::{trace_ok_err, trace_ok_warn};
}
pub use capture::{assign_missing_uids, canonicalize, capture, stamp_uids};
pub use slicemark_domain::{
    BbF, ErrorKind, Handles, Metrics, PtF, ShapeI, SmError, SmResult, ToolKind, normalize,
};
pub use tools_data::{
    AnnotationsMap, CanonicalAnnotation, ImageAnnotationSet, ImageId, annotated_ids,
};
