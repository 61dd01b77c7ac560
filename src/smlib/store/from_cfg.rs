use slicemark_domain::SmResult;
use std::sync::Arc;

use super::{
    AnnotationStore, FileStore, HttpStore, LoadResponse, LocalStore, MemoryStore, SaveRequest,
    SaveResponse, SessionStore,
};
use crate::cfg::{Cfg, Connection};

/// The annotation store selected in the config.
#[derive(Clone, Debug)]
pub enum StoreFromCfg {
    Http(HttpStore),
    Local(LocalStore<dyn SessionStore>),
}
impl StoreFromCfg {
    pub fn from_cfg(cfg: &Cfg) -> SmResult<Self> {
        Ok(match cfg.store.connection {
            Connection::Http => Self::Http(HttpStore::new(
                cfg.store.server_url(),
                cfg.store.request_timeout_s(),
            )?),
            Connection::File => {
                let store: Arc<dyn SessionStore> = Arc::new(FileStore::new(cfg.store.folder()));
                Self::Local(LocalStore::new(store))
            }
            Connection::Memory => {
                let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
                Self::Local(LocalStore::new(store))
            }
        })
    }
}
impl AnnotationStore for StoreFromCfg {
    async fn save(&self, req: SaveRequest) -> SmResult<SaveResponse> {
        match self {
            Self::Http(s) => s.save(req).await,
            Self::Local(s) => s.save(req).await,
        }
    }
    async fn load(&self, session_id: &str) -> SmResult<LoadResponse> {
        match self {
            Self::Http(s) => s.load(session_id).await,
            Self::Local(s) => s.load(session_id).await,
        }
    }
}

#[test]
fn test_from_cfg() -> SmResult<()> {
    let mut cfg = crate::cfg::get_default_cfg();
    assert!(matches!(StoreFromCfg::from_cfg(&cfg)?, StoreFromCfg::Http(_)));
    cfg.store.connection = Connection::Memory;
    assert!(matches!(
        StoreFromCfg::from_cfg(&cfg)?,
        StoreFromCfg::Local(_)
    ));
    Ok(())
}
