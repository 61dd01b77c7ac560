use crate::file_util::{self, DEFAULT_HOMEDIR};
use serde::{Deserialize, Serialize};
use slicemark_domain::{ErrorKind, SmResult, smerr, to_sm};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

const CFG_DEFAULT: &str = r#"
    author_name = "Dr. User"
    empty_set_policy = "Explicit"  # "Explicit" or "Omit"
    image_id_scheme = "wadouri:"
    [store]
    connection = "Http"  # "Http", "File" or "Memory"
    server_url = "http://127.0.0.1:5000"
    request_timeout_s = 30
    [server]
    http_address = "127.0.0.1:5000"
    "#;

/// What to do with images whose annotation set became empty since the last save.
#[derive(Deserialize, Serialize, Debug, Eq, PartialEq, Clone, Copy, Default)]
pub enum EmptySetPolicy {
    /// Upsert the empty set so that deleted annotations do not come back on reload. Only
    /// images the store is known to hold a record for are sent.
    #[default]
    Explicit,
    /// Never send empty sets.
    Omit,
}

#[derive(Deserialize, Serialize, Debug, Eq, PartialEq, Clone, Copy, Default)]
pub enum Connection {
    #[default]
    Http,
    File,
    Memory,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct StoreCfg {
    pub connection: Connection,
    server_url: Option<String>,
    request_timeout_s: Option<u64>,
    folder: Option<PathBuf>,
}
impl StoreCfg {
    pub fn server_url(&self) -> &str {
        match &self.server_url {
            Some(url) => url.trim_end_matches('/'),
            None => "http://127.0.0.1:5000",
        }
    }
    pub fn request_timeout_s(&self) -> u64 {
        self.request_timeout_s.unwrap_or(30)
    }
    /// Folder of the file store, one JSON document per session.
    pub fn folder(&self) -> PathBuf {
        match &self.folder {
            Some(f) => f.clone(),
            None => DEFAULT_HOMEDIR.join("sessions"),
        }
    }
    pub fn set_folder(&mut self, folder: PathBuf) {
        self.folder = Some(folder);
    }
    pub fn set_server_url(&mut self, url: String) {
        self.server_url = Some(url);
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerCfg {
    http_address: Option<String>,
}
impl ServerCfg {
    pub fn http_address(&self) -> &str {
        match &self.http_address {
            Some(http_addr) => http_addr,
            None => "127.0.0.1:5000",
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Cfg {
    author_name: Option<String>,
    #[serde(default)]
    pub empty_set_policy: EmptySetPolicy,
    image_id_scheme: Option<String>,
    #[serde(default)]
    pub store: StoreCfg,
    #[serde(default)]
    pub server: ServerCfg,
}

impl Cfg {
    pub fn author_name(&self) -> &str {
        match &self.author_name {
            Some(name) => name,
            None => "Dr. User",
        }
    }
    pub fn set_author_name(&mut self, name: String) {
        self.author_name = Some(name);
    }
    /// Loader prefix of image ids that is not part of the persisted file URL.
    pub fn image_id_scheme(&self) -> &str {
        match &self.image_id_scheme {
            Some(scheme) => scheme,
            None => "wadouri:",
        }
    }
    pub fn write(&self) -> SmResult<()> {
        write_cfg(self, &get_cfg_path())
    }
}

pub fn get_default_cfg() -> Cfg {
    // the default string is part of the binary and covered by tests
    toml::from_str(CFG_DEFAULT).unwrap_or_default()
}

pub fn get_cfg_path() -> PathBuf {
    DEFAULT_HOMEDIR.join("sm_cfg.toml")
}

pub fn get_log_folder() -> PathBuf {
    DEFAULT_HOMEDIR.join("logs")
}

/// Reads the cfg at `cfg_toml_path`. Fields missing in the file take their defaults, a
/// missing file yields the default cfg.
pub fn read_cfg_from_path(cfg_toml_path: &Path) -> SmResult<Cfg> {
    if cfg_toml_path.exists() {
        let toml_str = file_util::read_to_string(cfg_toml_path)?;
        toml::from_str(&toml_str).map_err(|e| {
            smerr!(ErrorKind::Parse; "could not parse cfg {:?} due to {:?}", cfg_toml_path, e)
        })
    } else {
        info!("no cfg file found at {cfg_toml_path:?}. using default cfg");
        Ok(get_default_cfg())
    }
}

pub fn read_cfg() -> SmResult<Cfg> {
    read_cfg_from_path(&get_cfg_path())
}

pub fn write_cfg(cfg: &Cfg, p: &Path) -> SmResult<()> {
    if let Some(cfg_parent) = p.parent() {
        fs::create_dir_all(cfg_parent).map_err(to_sm)?;
    }
    let cfg_str = toml::to_string_pretty(cfg).map_err(to_sm)?;
    file_util::write(p, cfg_str)?;
    info!("wrote cfg to {p:?}");
    Ok(())
}

#[cfg(test)]
use crate::defer_folder_removal;

#[test]
fn test_default_cfg() {
    let cfg: Cfg = toml::from_str(CFG_DEFAULT).unwrap();
    assert_eq!(cfg, get_default_cfg());
    assert_eq!(cfg.author_name(), "Dr. User");
    assert_eq!(cfg.empty_set_policy, EmptySetPolicy::Explicit);
    assert_eq!(cfg.image_id_scheme(), "wadouri:");
    assert_eq!(cfg.store.connection, Connection::Http);
    assert_eq!(cfg.store.server_url(), "http://127.0.0.1:5000");
    assert_eq!(cfg.store.request_timeout_s(), 30);
    assert_eq!(cfg.server.http_address(), "127.0.0.1:5000");
}

#[test]
fn test_write_read_cfg() -> SmResult<()> {
    let folder = file_util::tmp_folder("cfg")?;
    defer_folder_removal!(&folder);
    let path = folder.join("sm_cfg.toml");
    let mut cfg = get_default_cfg();
    cfg.set_author_name("Dr. Who".to_string());
    cfg.empty_set_policy = EmptySetPolicy::Omit;
    cfg.store.connection = Connection::File;
    cfg.store.set_folder(folder.join("sessions"));
    write_cfg(&cfg, &path)?;
    let read = read_cfg_from_path(&path)?;
    assert_eq!(read, cfg);
    assert_eq!(read.author_name(), "Dr. Who");

    let partial = folder.join("partial.toml");
    file_util::write(&partial, "author_name = \"Dr. Partial\"")?;
    let read = read_cfg_from_path(&partial)?;
    assert_eq!(read.author_name(), "Dr. Partial");
    assert_eq!(read.empty_set_policy, EmptySetPolicy::Explicit);
    assert_eq!(read.server.http_address(), "127.0.0.1:5000");

    assert_eq!(read_cfg_from_path(&folder.join("missing.toml"))?, get_default_cfg());
    let broken = folder.join("broken.toml");
    file_util::write(&broken, "empty_set_policy = \"Sometimes\"")?;
    let e = read_cfg_from_path(&broken).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Parse);
    Ok(())
}
