//! Minimal HTTP server in front of a [`SessionStore`]. Requests are handled one after the
//! other on a dedicated thread.
use httparse::{EMPTY_HEADER, Request, Status};
use slicemark_domain::{ErrorKind, SmResult, smerr, to_sm};
use std::{
    io::{Read, Write},
    net::{TcpListener, TcpStream},
    str,
    sync::{
        Arc,
        mpsc::{self, Receiver, Sender},
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{info, warn};

use crate::store::{LOAD_PATH, LoadResponse, SAVE_PATH, SaveRequest, SaveResponse, SessionStore};

const TERMINATE_PATH: &str = "/TERMINATE";
const MAX_HEAD_BYTES: usize = 64 * 1024;
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;
/// A client that stalls longer than this on one read is dropped.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, PartialEq, Eq)]
enum Route {
    Save,
    Load(String),
    Terminate,
}

#[derive(Debug, PartialEq, Eq)]
struct Head {
    route: SmResult<Route>,
    body_start: usize,
    content_length: usize,
}

fn route(method: &str, path: &str) -> SmResult<Route> {
    match (method, path) {
        (_, TERMINATE_PATH) => Ok(Route::Terminate),
        ("POST", SAVE_PATH) => Ok(Route::Save),
        ("GET", p) if p.starts_with(LOAD_PATH) && p.len() > LOAD_PATH.len() => {
            let session_id = percent_encoding::percent_decode_str(&p[LOAD_PATH.len()..])
                .decode_utf8()
                .map_err(to_sm)?
                .to_string();
            Ok(Route::Load(session_id))
        }
        _ => Err(smerr!(ErrorKind::Precondition; "no route for {} {}", method, path)),
    }
}

/// `Ok(None)` while the header is incomplete.
fn parse_head(buffer: &[u8]) -> SmResult<Option<Head>> {
    let mut headers = [EMPTY_HEADER; 64];
    let mut req = Request::new(&mut headers);
    let body_start = match req.parse(buffer).map_err(to_sm)? {
        Status::Complete(n) => n,
        Status::Partial => return Ok(None),
    };
    let content_length = req
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("content-length"))
        .map(|h| {
            str::from_utf8(h.value)
                .map_err(to_sm)
                .and_then(|v| v.trim().parse::<usize>().map_err(to_sm))
        })
        .transpose()?
        .unwrap_or(0);
    let route = match (req.method, req.path) {
        (Some(method), Some(path)) => route(method, path),
        _ => Err(smerr!("could not find method and path in request")),
    };
    Ok(Some(Head {
        route,
        body_start,
        content_length,
    }))
}

fn read_request(stream: &mut TcpStream) -> SmResult<(Head, Vec<u8>)> {
    let mut buffer = vec![];
    let mut chunk = [0u8; 4096];
    let head = loop {
        let n = stream.read(&mut chunk).map_err(to_sm)?;
        if n == 0 {
            return Err(smerr!("connection closed before request was complete"));
        }
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(head) = parse_head(&buffer)? {
            break head;
        }
        if buffer.len() > MAX_HEAD_BYTES {
            return Err(smerr!("request header exceeds {} bytes", MAX_HEAD_BYTES));
        }
    };
    if head.content_length > MAX_BODY_BYTES {
        return Err(smerr!("request body of {} bytes too large", head.content_length));
    }
    let body_end = head.body_start + head.content_length;
    while buffer.len() < body_end {
        let n = stream.read(&mut chunk).map_err(to_sm)?;
        if n == 0 {
            return Err(smerr!("connection closed before body was complete"));
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
    let body = buffer[head.body_start..body_end].to_vec();
    Ok((head, body))
}

fn error_json(msg: &str) -> String {
    serde_json::json!({ "error": msg }).to_string()
}

/// Status code and JSON body for one request.
fn respond(route: &Route, body: &[u8], store: &dyn SessionStore) -> (u16, String) {
    match route {
        Route::Save => {
            let req = match serde_json::from_slice::<SaveRequest>(body) {
                Ok(req) => req,
                Err(e) => return (400, error_json(&format!("invalid save request, {e}"))),
            };
            if let Err(e) = req.validate() {
                return (400, error_json(e.msg()));
            }
            match store.upsert(req) {
                Ok(()) => (
                    200,
                    serde_json::to_string(&SaveResponse { ok: true }).unwrap_or_default(),
                ),
                Err(e) => (500, error_json(e.msg())),
            }
        }
        Route::Load(session_id) => match store.load(session_id) {
            Ok(records) => (
                200,
                serde_json::to_string(&LoadResponse { records }).unwrap_or_default(),
            ),
            Err(e) => (500, error_json(e.msg())),
        },
        Route::Terminate => (200, "{}".to_string()),
    }
}

fn write_response(stream: &mut TcpStream, status: u16, body: &str) -> SmResult<()> {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Internal Server Error",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).map_err(to_sm)?;
    stream.flush().map_err(to_sm)
}

/// Handles one connection. Returns the served route, `Route::Terminate` stops the server.
fn serve_one(
    stream: &mut TcpStream,
    store: &dyn SessionStore,
    read_timeout: Duration,
) -> SmResult<Route> {
    stream.set_read_timeout(Some(read_timeout)).map_err(to_sm)?;
    stream.set_write_timeout(Some(read_timeout)).map_err(to_sm)?;
    let (head, body) = read_request(stream)?;
    match head.route {
        Ok(route) => {
            let (status, json) = respond(&route, &body, store);
            write_response(stream, status, &json)?;
            Ok(route)
        }
        Err(e) => {
            write_response(stream, 404, &error_json(e.msg()))?;
            Err(e)
        }
    }
}

fn describe(route: &Route) -> String {
    match route {
        Route::Save => SAVE_PATH.to_string(),
        Route::Load(session_id) => format!("{LOAD_PATH}{session_id}"),
        Route::Terminate => TERMINATE_PATH.to_string(),
    }
}

pub type LaunchResultType = SmResult<(JoinHandle<SmResult<()>>, Receiver<SmResult<String>>)>;

/// Binds `address` and serves `store` on a new thread. The receiver gets the path of each
/// served request or the error that occurred while serving it.
pub fn launch(address: &str, store: Arc<dyn SessionStore>) -> LaunchResultType {
    info!("spawning httpserver at {address}");
    let listener = TcpListener::bind(address)
        .map_err(|e| smerr!(ErrorKind::Transport; "could not bind {} due to {:?}", address, e))?;
    Ok(spawn_server(listener, store, READ_TIMEOUT))
}

fn spawn_server(
    listener: TcpListener,
    store: Arc<dyn SessionStore>,
    read_timeout: Duration,
) -> (JoinHandle<SmResult<()>>, Receiver<SmResult<String>>) {
    let (tx_from_server, rx_from_server): (Sender<SmResult<String>>, _) = mpsc::channel();
    let handle = thread::spawn(move || -> SmResult<()> {
        for stream in listener.incoming() {
            let served = stream
                .map_err(to_sm)
                .and_then(|mut stream| serve_one(&mut stream, store.as_ref(), read_timeout));
            if let Err(e) = &served {
                warn!("httpserver could not serve request, {e:?}");
            }
            let terminate = served == Ok(Route::Terminate);
            if tx_from_server.send(served.map(|r| describe(&r))).is_err() {
                info!("nobody listens to the httpserver anymore");
            }
            if terminate {
                info!("terminating httpserver");
                return Ok(());
            }
        }
        Ok(())
    });
    (handle, rx_from_server)
}

fn increase_port(address: &str) -> SmResult<String> {
    match address.rsplit_once(':') {
        Some((host, port)) => Ok(format!(
            "{}:{}",
            host,
            port.parse::<usize>().map_err(to_sm)? + 1
        )),
        None => Err(smerr!("is port of address {} missing?", address)),
    }
}

/// Tries `address` and, if it is taken, the next `n_retries` ports.
pub fn launch_with_retries(
    address: &str,
    store: Arc<dyn SessionStore>,
    n_retries: usize,
) -> SmResult<(String, JoinHandle<SmResult<()>>, Receiver<SmResult<String>>)> {
    let mut address = address.to_string();
    for _ in 0..n_retries {
        match launch(&address, store.clone()) {
            Ok((handle, rx)) => return Ok((address, handle, rx)),
            Err(e) => {
                warn!("{e:?}, restarting http server with increased port");
                address = increase_port(&address)?;
            }
        }
    }
    let (handle, rx) = launch(&address, store)?;
    Ok((address, handle, rx))
}

#[cfg(test)]
use crate::store::MemoryStore;

#[cfg(test)]
fn send_request(address: &str, req: &[u8]) -> SmResult<String> {
    let mut stream = TcpStream::connect(address).map_err(to_sm)?;
    stream.write_all(req).map_err(to_sm)?;
    stream.flush().map_err(to_sm)?;
    let mut resp = String::new();
    stream.read_to_string(&mut resp).map_err(to_sm)?;
    Ok(resp)
}

#[test]
fn test_parse_head() -> SmResult<()> {
    assert!(parse_head(b"garbage\r\n\r\n").is_err());
    assert_eq!(parse_head(b"GET /api/annotation/s1 HTTP/1.1\r\nHost:")?, None);

    let head = parse_head(b"GET /api/annotation/sess%201 HTTP/1.1\r\nHost: x\r\n\r\n")?.unwrap();
    assert_eq!(head.route, Ok(Route::Load("sess 1".to_string())));
    assert_eq!(head.content_length, 0);

    let raw = b"POST /api/annotation/save HTTP/1.1\r\nContent-Length: 2\r\n\r\n{}";
    let head = parse_head(raw)?.unwrap();
    assert_eq!(head.route, Ok(Route::Save));
    assert_eq!(head.content_length, 2);
    assert_eq!(&raw[head.body_start..], b"{}");

    let head = parse_head(b"GET /TERMINATE HTTP/1.1\r\n\r\n")?.unwrap();
    assert_eq!(head.route, Ok(Route::Terminate));
    let head = parse_head(b"GET /api/annotation/ HTTP/1.1\r\n\r\n")?.unwrap();
    assert!(head.route.is_err());
    let head = parse_head(b"DELETE /api/annotation/save HTTP/1.1\r\n\r\n")?.unwrap();
    assert!(head.route.is_err());
    Ok(())
}

#[test]
fn test_respond() {
    let store = MemoryStore::new();
    let (status, _) = respond(&Route::Save, b"{\"sessionId\":\"s\"}", &store);
    assert_eq!(status, 400);
    let (status, _) = respond(
        &Route::Save,
        br#"{"sessionId":"","fileURL":"f","authorName":"a","data":{}}"#,
        &store,
    );
    assert_eq!(status, 400);
    let (status, body) = respond(
        &Route::Save,
        br#"{"sessionId":"s","fileURL":"f","authorName":"a","data":{}}"#,
        &store,
    );
    assert_eq!(status, 200);
    assert_eq!(body, r#"{"ok":true}"#);
    let (status, body) = respond(&Route::Load("s".to_string()), b"", &store);
    assert_eq!(status, 200);
    let resp: LoadResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(resp.records.len(), 1);
    let (_, body) = respond(&Route::Load("unknown".to_string()), b"", &store);
    assert_eq!(body, r#"{"records":[]}"#);
}

#[test]
fn test_launch() -> SmResult<()> {
    let address = "127.0.0.1:7942";
    let (handle, rx) = launch(address, Arc::new(MemoryStore::new()))?;
    thread::sleep(Duration::from_millis(10));
    assert!(!handle.is_finished());

    let send_request = |req: &[u8]| send_request(address, req);
    let body = br#"{"sessionId":"s","fileURL":"f","authorName":"a","data":{}}"#;
    let mut req = format!(
        "POST /api/annotation/save HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    req.extend_from_slice(body);
    let resp = send_request(&req)?;
    assert!(resp.starts_with("HTTP/1.1 200 OK"));
    assert!(resp.ends_with(r#"{"ok":true}"#));
    let resp = send_request(b"GET /api/annotation/s HTTP/1.1\r\n\r\n")?;
    assert!(resp.contains("\"fileURL\":\"f\""));
    let resp = send_request(b"GET /nowhere HTTP/1.1\r\n\r\n")?;
    assert!(resp.starts_with("HTTP/1.1 404"));

    assert_eq!(rx.recv().map_err(to_sm)?, Ok(SAVE_PATH.to_string()));
    assert_eq!(rx.recv().map_err(to_sm)?, Ok(format!("{LOAD_PATH}s")));
    assert!(rx.recv().map_err(to_sm)?.is_err());

    send_request(b"GET /TERMINATE HTTP/1.1\r\n\r\n")?;
    thread::sleep(Duration::from_millis(500));
    assert!(handle.is_finished());
    Ok(())
}

#[test]
fn test_stalled_client() -> SmResult<()> {
    let listener = TcpListener::bind("127.0.0.1:0").map_err(to_sm)?;
    let address = listener.local_addr().map_err(to_sm)?.to_string();
    let (handle, rx) = spawn_server(
        listener,
        Arc::new(MemoryStore::new()),
        Duration::from_millis(100),
    );
    // connects, sends half a header and keeps the connection open
    let mut stalled = TcpStream::connect(&address).map_err(to_sm)?;
    stalled
        .write_all(b"GET /api/annotation/s HTTP/1.1\r\n")
        .map_err(to_sm)?;

    let resp = send_request(&address, b"GET /api/annotation/s HTTP/1.1\r\n\r\n")?;
    assert!(resp.starts_with("HTTP/1.1 200 OK"));
    assert!(rx.recv().map_err(to_sm)?.is_err());
    assert_eq!(rx.recv().map_err(to_sm)?, Ok(format!("{LOAD_PATH}s")));

    send_request(&address, b"GET /TERMINATE HTTP/1.1\r\n\r\n")?;
    handle.join().map_err(|e| smerr!("{:?}", e))??;
    drop(stalled);
    Ok(())
}

#[test]
fn test_oversized_head() -> SmResult<()> {
    let listener = TcpListener::bind("127.0.0.1:0").map_err(to_sm)?;
    let address = listener.local_addr().map_err(to_sm)?;
    let client = thread::spawn(move || {
        if let Ok(mut stream) = TcpStream::connect(address) {
            let mut req = b"GET /api/annotation/s HTTP/1.1\r\nX-Pad: ".to_vec();
            req.extend(std::iter::repeat_n(b'a', 2 * MAX_HEAD_BYTES));
            // the server hangs up before the header is complete
            let _ = stream.write_all(&req);
        }
    });
    let (mut stream, _) = listener.accept().map_err(to_sm)?;
    let store = MemoryStore::new();
    let err = serve_one(&mut stream, &store, Duration::from_secs(5)).unwrap_err();
    assert!(err.msg().contains("exceeds"));
    drop(stream);
    client.join().map_err(|e| smerr!("{:?}", e))?;
    Ok(())
}

#[test]
fn test_increase_port() -> SmResult<()> {
    assert_eq!(increase_port("address:1234")?, "address:1235");
    assert!(increase_port("address").is_err());
    Ok(())
}
