mod client;
mod document;
mod from_cfg;
mod session_store;

pub use client::{AnnotationStore, HttpStore, LOAD_PATH, LocalStore, SAVE_PATH};
pub use document::{AnnotationEntry, LoadResponse, SaveRequest, SaveResponse, SessionDocument};
pub use from_cfg::StoreFromCfg;
pub use session_store::{FileStore, MemoryStore, SessionStore};
