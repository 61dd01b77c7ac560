use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Stable id of one 2-D image within a session as the viewer's image loader knows it,
/// e.g., `wadouri:http://host/series/img-42.dcm`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(transparent)]
pub struct ImageId(String);

impl ImageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    /// The persisted form of the id, i.e., without the loader `scheme` prefix.
    pub fn file_url(&self, scheme: &str) -> &str {
        self.0.strip_prefix(scheme).unwrap_or(&self.0)
    }
    /// Inverse of [`file_url`](Self::file_url) for ids that start with `scheme`.
    pub fn from_file_url(file_url: &str, scheme: &str) -> Self {
        if file_url.starts_with(scheme) {
            Self(file_url.to_string())
        } else {
            Self(format!("{scheme}{file_url}"))
        }
    }
    /// The id itself if it cannot be recovered from its file URL, e.g., ids without the
    /// scheme prefix. Such ids are persisted next to the file URL.
    pub fn explicit_id(&self, scheme: &str) -> Option<&str> {
        let recovered = Self::from_file_url(self.file_url(scheme), scheme);
        (recovered != *self).then_some(self.as_str())
    }
    /// Counterpart of [`explicit_id`](Self::explicit_id) when loading.
    pub fn from_persisted(file_url: &str, explicit_id: Option<&str>, scheme: &str) -> Self {
        match explicit_id {
            Some(id) => Self::new(id),
            None => Self::from_file_url(file_url, scheme),
        }
    }
}
impl Display for ImageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
impl From<&str> for ImageId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
impl From<String> for ImageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[test]
fn test_file_url() {
    let id = ImageId::new("wadouri:http://h/img-42.dcm");
    assert_eq!(id.file_url("wadouri:"), "http://h/img-42.dcm");
    assert_eq!(
        ImageId::from_file_url(id.file_url("wadouri:"), "wadouri:"),
        id
    );
    assert_eq!(ImageId::from_file_url(id.as_str(), "wadouri:"), id);
    assert_eq!(id.explicit_id("wadouri:"), None);
    let plain = ImageId::new("img-42");
    assert_eq!(plain.file_url(""), "img-42");
    assert_eq!(ImageId::from_file_url("img-42", ""), plain);
    assert_eq!(plain.explicit_id(""), None);
    assert_eq!(serde_json::to_string(&plain).unwrap(), "\"img-42\"");
}

#[test]
fn test_ids_without_scheme() {
    let scheme = "wadouri:";
    for id in [
        "img-42",
        "wadouri:img-42",
        "wadouri:wadouri:img-42",
        "dicomweb:http://h/img-42",
        "",
    ] {
        let id = ImageId::new(id);
        let restored =
            ImageId::from_persisted(id.file_url(scheme), id.explicit_id(scheme), scheme);
        assert_eq!(restored, id);
    }
    let plain = ImageId::new("img-42");
    assert_eq!(plain.file_url(scheme), "img-42");
    assert_eq!(plain.explicit_id(scheme), Some("img-42"));
}
