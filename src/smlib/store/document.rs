use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slicemark_domain::{ErrorKind, SmResult, smerr};
use std::collections::BTreeMap;

use crate::tools_data::ImageAnnotationSet;

/// Body of a save call, one image of one session.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub session_id: String,
    #[serde(rename = "fileURL")]
    pub file_url: String,
    /// Viewer id of the image if it cannot be recovered from `file_url` alone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(alias = "doctorName")]
    pub author_name: String,
    pub data: ImageAnnotationSet,
}
impl SaveRequest {
    /// Requests without session or image are rejected before they reach a store.
    pub fn validate(&self) -> SmResult<()> {
        if self.session_id.is_empty() {
            Err(smerr!(ErrorKind::Precondition; "session id missing"))
        } else if self.file_url.is_empty() {
            Err(smerr!(ErrorKind::Precondition; "file URL missing in session {}", self.session_id))
        } else {
            Ok(())
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct SaveResponse {
    #[serde(alias = "success")]
    pub ok: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct LoadResponse {
    pub records: Vec<AnnotationEntry>,
}

/// Persisted annotation set of one image.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationEntry {
    #[serde(rename = "fileURL")]
    pub file_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(default, alias = "doctorName")]
    pub author_name: String,
    pub data: ImageAnnotationSet,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Everything stored for one session.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionDocument {
    pub session_id: String,
    #[serde(default)]
    pub annotations: Vec<AnnotationEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionDocument {
    pub fn new(session_id: String) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            annotations: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces the entry of the request's image wholesale or appends one. Legacy
    /// duplicates of the same image collapse into the replaced entry.
    pub fn upsert(&mut self, req: SaveRequest) {
        let now = Utc::now();
        let entry = AnnotationEntry {
            file_url: req.file_url,
            image_id: req.image_id,
            author_name: req.author_name,
            data: req.data,
            updated_at: Some(now),
        };
        let first = self
            .annotations
            .iter()
            .position(|a| a.file_url == entry.file_url);
        match first {
            Some(idx) => {
                let file_url = entry.file_url.clone();
                self.annotations[idx] = entry;
                let mut pos = 0;
                self.annotations.retain(|a| {
                    let keep = pos <= idx || a.file_url != file_url;
                    pos += 1;
                    keep
                });
            }
            None => self.annotations.push(entry),
        }
        self.updated_at = now;
    }

    /// One entry per image. For duplicates the last one wins.
    pub fn records(&self) -> Vec<AnnotationEntry> {
        let mut order = vec![];
        let mut latest = BTreeMap::new();
        for entry in &self.annotations {
            if latest.insert(entry.file_url.as_str(), entry).is_none() {
                order.push(entry.file_url.as_str());
            }
        }
        order
            .into_iter()
            .filter_map(|file_url| latest.get(file_url).map(|e| (*e).clone()))
            .collect()
    }
}

#[cfg(test)]
fn make_req(file_url: &str, set: ImageAnnotationSet) -> SaveRequest {
    SaveRequest {
        session_id: "sess-1".to_string(),
        file_url: file_url.to_string(),
        image_id: None,
        author_name: "Dr. User".to_string(),
        data: set,
    }
}

#[test]
fn test_upsert() {
    use crate::tools_data::make_test_set;
    let mut doc = SessionDocument::new("sess-1".to_string());
    doc.upsert(make_req("img-1", make_test_set()));
    doc.upsert(make_req("img-2", make_test_set()));
    let second = make_test_set();
    doc.upsert(make_req("img-1", second.clone()));
    assert_eq!(doc.annotations.len(), 2);
    assert_eq!(doc.annotations[0].file_url, "img-1");
    assert_eq!(doc.annotations[0].data, second);
    let before = doc.clone();
    doc.upsert(make_req("img-1", second.clone()));
    assert_eq!(doc.records().len(), 2);
    assert_eq!(doc.records()[0].data, before.records()[0].data);
    doc.upsert(make_req("img-1", ImageAnnotationSet::new()));
    assert!(doc.records()[0].data.is_empty());
    assert!(doc.updated_at >= doc.created_at);
}

#[test]
fn test_legacy_duplicates() {
    use crate::tools_data::make_test_set;
    let mut doc = SessionDocument::new("sess-1".to_string());
    let last = make_test_set();
    for (url, set) in [
        ("img-1", make_test_set()),
        ("img-2", make_test_set()),
        ("img-1", last.clone()),
    ] {
        doc.annotations.push(AnnotationEntry {
            file_url: url.to_string(),
            image_id: None,
            author_name: String::new(),
            data: set,
            updated_at: None,
        });
    }
    let records = doc.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].file_url, "img-1");
    assert_eq!(records[0].data, last);

    doc.upsert(make_req("img-1", ImageAnnotationSet::new()));
    assert_eq!(doc.annotations.len(), 2);
    assert!(doc.records()[0].data.is_empty());
}

#[test]
fn test_validate() {
    let req = make_req("img-1", ImageAnnotationSet::new());
    assert!(req.validate().is_ok());
    let mut no_session = req.clone();
    no_session.session_id = String::new();
    assert_eq!(
        no_session.validate().unwrap_err().kind(),
        ErrorKind::Precondition
    );
    let mut no_image = req;
    no_image.file_url = String::new();
    assert_eq!(
        no_image.validate().unwrap_err().kind(),
        ErrorKind::Precondition
    );
    let legacy: SaveRequest = serde_json::from_str(
        r#"{"sessionId":"s","fileURL":"f","doctorName":"Dr. Old","data":{}}"#,
    )
    .unwrap();
    assert_eq!(legacy.author_name, "Dr. Old");
    assert_eq!(legacy.image_id, None);
    let with_id = SaveRequest {
        image_id: Some("img-1".to_string()),
        ..legacy
    };
    let json = serde_json::to_string(&with_id).unwrap();
    assert!(json.contains(r#""imageId":"img-1""#));
    let resp: SaveResponse = serde_json::from_str(r#"{"success":true}"#).unwrap();
    assert!(resp.ok);
}
