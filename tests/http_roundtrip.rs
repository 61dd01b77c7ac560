use std::{
    io::{Read, Write},
    net::TcpStream,
    sync::Arc,
    thread,
    time::Duration,
};

use smlib::{
    AnnotationsMap, CanonicalAnnotation, ErrorKind, Handles, ImageAnnotationSet, ImageId,
    SmResult, cfg::EmptySetPolicy, httpserver,
    store::{AnnotationStore, HttpStore, MemoryStore, SaveRequest, SessionStore},
    sync::PersistenceSync,
    tracing_setup::init_tracing_for_tests,
};
use tokio::runtime::Runtime;
use uuid::Uuid;

fn make_set() -> ImageAnnotationSet {
    [
        Handles::Length {
            start: (0, 0).into(),
            end: (3, 4).into(),
        },
        Handles::EllipticalRoi {
            start: (10, 10).into(),
            end: (30, 20).into(),
        },
        Handles::FreehandRoi {
            points: vec![(0, 0).into(), (4, 0).into(), (4, 3).into()],
        },
    ]
    .into_iter()
    .map(|h| CanonicalAnnotation::from_handles(Uuid::new_v4(), h))
    .collect()
}

fn terminate(address: &str) {
    if let Ok(mut stream) = TcpStream::connect(address) {
        let _ = stream.write_all(b"GET /TERMINATE HTTP/1.1\r\n\r\n");
        let _ = stream.read_to_string(&mut String::new());
    }
}

#[test]
fn test_save_load_via_http() -> SmResult<()> {
    init_tracing_for_tests();
    let server_store = Arc::new(MemoryStore::new());
    let (address, handle, _rx) =
        httpserver::launch_with_retries("127.0.0.1:7961", server_store.clone(), 10)?;
    thread::sleep(Duration::from_millis(10));

    let rt = Runtime::new().unwrap();
    let client = HttpStore::new(&format!("http://{address}"), 5)?;
    let mut sync = PersistenceSync::new(client, "Dr. User", "wadouri:", EmptySetPolicy::Explicit);
    let img1 = ImageId::new("wadouri:http://pacs/series 1/img-1.dcm");
    let img2 = ImageId::new("wadouri:http://pacs/series 1/img-2.dcm");
    let mut sets = AnnotationsMap::new();
    sets.insert(img1.clone(), make_set());
    sets.insert(img2.clone(), make_set());

    let report = rt.block_on(sync.save_all("study/7", &sets));
    assert!(report.is_ok());
    assert_eq!(report.succeeded.len(), 2);
    assert_eq!(server_store.load("study/7")?.len(), 2);

    // upserting again does not add records
    rt.block_on(sync.save_all("study/7", &sets));
    assert_eq!(server_store.load("study/7")?.len(), 2);

    let loaded = rt.block_on(sync.try_load_all("study/7"))?;
    assert_eq!(loaded, sets);
    assert!(rt.block_on(sync.try_load_all("study/8"))?.is_empty());

    let rejected = rt
        .block_on(sync.store().save(SaveRequest {
            session_id: "study/7".to_string(),
            file_url: String::new(),
            image_id: None,
            author_name: "Dr. User".to_string(),
            data: make_set(),
        }))
        .unwrap_err();
    assert_eq!(rejected.kind(), ErrorKind::Precondition);

    terminate(&address);
    handle.join().unwrap()?;
    Ok(())
}

#[test]
fn test_unreachable_server() -> SmResult<()> {
    init_tracing_for_tests();
    let rt = Runtime::new().unwrap();
    // nothing listens on port 9 usually
    let client = HttpStore::new("http://127.0.0.1:9", 1)?;
    let mut sync = PersistenceSync::new(client, "Dr. User", "", EmptySetPolicy::Explicit);
    let mut sets = AnnotationsMap::new();
    sets.insert(ImageId::new("img-1"), make_set());
    let report = rt.block_on(sync.save_all("s", &sets));
    assert!(report.succeeded.is_empty());
    assert!(report.failed[0].1.is_retryable());
    assert!(rt.block_on(sync.load_all("s")).is_empty());
    Ok(())
}
