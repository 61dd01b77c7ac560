use lazy_static::lazy_static;
use slicemark_domain::{ErrorKind, SmResult, smerr};
use std::{
    ffi::OsStr,
    fmt::Debug,
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{error, info};

lazy_static! {
    pub static ref DEFAULT_TMPDIR: PathBuf = std::env::temp_dir().join("slicemark");
}
lazy_static! {
    pub static ref DEFAULT_HOMEDIR: PathBuf = match dirs::home_dir() {
        Some(p) => p.join(".slicemark"),
        _ => std::env::temp_dir().join("slicemark"),
    };
}

pub fn read_to_string<P>(p: P) -> SmResult<String>
where
    P: AsRef<Path> + Debug,
{
    fs::read_to_string(&p)
        .map_err(|e| smerr!(ErrorKind::Transport; "could not read {:?} due to {:?}", p, e))
}

pub fn write<P, C>(path: P, contents: C) -> SmResult<()>
where
    P: AsRef<Path> + Debug,
    C: AsRef<[u8]>,
{
    fs::write(&path, contents)
        .map_err(|e| smerr!(ErrorKind::Transport; "could not write to {:?} since {:?}", path, e))
}

/// Writes to a sibling temp file first and renames it, readers never see half a file.
pub fn write_atomic<P, C>(path: P, contents: C) -> SmResult<()>
where
    P: AsRef<Path> + Debug,
    C: AsRef<[u8]>,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(
            |e| smerr!(ErrorKind::Transport; "could not create {:?} due to {:?}", parent, e),
        )?;
    }
    let tmp_name = format!("{}.tmp", to_name_str(path)?);
    let tmp_path = path.with_file_name(tmp_name);
    write(&tmp_path, contents)?;
    fs::rename(&tmp_path, path).map_err(
        |e| smerr!(ErrorKind::Transport; "could not move {:?} to {:?} due to {:?}", tmp_path, path, e),
    )
}

pub fn osstr_to_str(p: Option<&OsStr>) -> io::Result<&str> {
    p.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{p:?} not found")))?
        .to_str()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{p:?} not convertible to unicode"),
            )
        })
}

pub fn to_name_str(p: &Path) -> SmResult<&str> {
    osstr_to_str(p.file_name())
        .map_err(|e| smerr!("to_name_str could not transform '{:?}' due to '{:?}'", p, e))
}

/// Replaces everything that is not ASCII alphanumeric by `_` to obtain a file-name-safe
/// string, e.g., for image ids that are URLs.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Fresh folder below the temp dir, mostly for tests.
pub fn tmp_folder(name: &str) -> SmResult<PathBuf> {
    let folder = DEFAULT_TMPDIR.join(format!("{}-{}", name, uuid::Uuid::new_v4()));
    fs::create_dir_all(&folder)
        .map_err(|e| smerr!("could not create {:?} due to {:?}", folder, e))?;
    Ok(folder)
}

pub struct Defer<F: FnMut()> {
    pub func: F,
}
impl<F: FnMut()> Drop for Defer<F> {
    fn drop(&mut self) {
        (self.func)();
    }
}
#[macro_export]
macro_rules! defer {
    ($f:expr) => {
        let _dfr = $crate::file_util::Defer { func: $f };
    };
}
pub fn checked_remove<'a, P: AsRef<Path> + Debug>(
    path: &'a P,
    func: fn(p: &'a P) -> io::Result<()>,
) {
    match func(path) {
        Ok(_) => info!("removed {path:?}"),
        Err(e) => error!("could not remove {path:?} due to {e:?}"),
    }
}
#[macro_export]
macro_rules! defer_folder_removal {
    ($path:expr) => {
        let func = || $crate::file_util::checked_remove($path, std::fs::remove_dir_all);
        $crate::defer!(func);
    };
}

#[test]
fn test_sanitize() {
    assert_eq!(
        sanitize_name("http://host/a b/img-42.dcm"),
        "http___host_a_b_img_42_dcm"
    );
    assert_eq!(sanitize_name(""), "");
}

#[test]
fn test_write_atomic() -> SmResult<()> {
    let folder = tmp_folder("write-atomic")?;
    defer_folder_removal!(&folder);
    let file = folder.join("sub").join("doc.json");
    write_atomic(&file, "{}")?;
    write_atomic(&file, "[]")?;
    assert_eq!(read_to_string(&file)?, "[]");
    assert!(!folder.join("sub").join("doc.json.tmp").exists());
    let e = read_to_string(folder.join("missing.json")).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Transport);
    Ok(())
}
