//! In-process repository server for tests: AQL search, HEAD metadata and
//! ranged GET downloads backed by in-memory files.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::json;
use sha1::{Digest, Sha1};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::subscriber::DefaultGuard;

struct StoredFile {
    key: String,
    repo: String,
    path: String,
    name: String,
    content: Vec<u8>,
    md5: String,
    sha1: String,
}

struct RepoState {
    files: Mutex<Vec<StoredFile>>,
    search_reply: Mutex<Option<(StatusCode, String)>>,
    last_query: Mutex<Option<String>>,
    last_headers: Mutex<HeaderMap>,
    accept_ranges: AtomicBool,
    failing_range_start: Mutex<Option<u64>>,
    requests: AtomicUsize,
    gets: AtomicUsize,
    range_gets: AtomicUsize,
}

impl RepoState {
    fn record(&self, headers: &HeaderMap) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        *self.last_headers.lock().unwrap() = headers.clone();
    }
}

pub fn md5_hex(content: &[u8]) -> String {
    format!("{:x}", md5::compute(content))
}

pub fn sha1_hex(content: &[u8]) -> String {
    format!("{:x}", Sha1::digest(content))
}

/// Deterministic, non-repeating-looking test payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Collects formatted log output of the current thread while the guard lives.
/// Spawned tasks are covered as long as the test runs on a current-thread
/// runtime.
#[derive(Clone, Default)]
pub struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn install() -> (Self, DefaultGuard) {
        let capture = LogCapture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_target(false)
            .finish();
        (capture, tracing::subscriber::set_default(subscriber))
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.buf.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn lines_containing(&self, needle: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| line.contains(needle))
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct MockRepo {
    addr: SocketAddr,
    state: Arc<RepoState>,
    handle: JoinHandle<()>,
}

impl MockRepo {
    pub async fn start() -> Self {
        let state = Arc::new(RepoState {
            files: Mutex::new(Vec::new()),
            search_reply: Mutex::new(None),
            last_query: Mutex::new(None),
            last_headers: Mutex::new(HeaderMap::new()),
            accept_ranges: AtomicBool::new(true),
            failing_range_start: Mutex::new(None),
            requests: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            range_gets: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/api/search/aql", post(search))
            .fallback(serve)
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockRepo {
            addr,
            state,
            handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Registers a file; it is returned by searches in registration order.
    pub fn add_file(&self, repo: &str, path: &str, name: &str, content: &[u8]) {
        let key = if path == "." {
            format!("{}/{}", repo, name)
        } else {
            format!("{}/{}/{}", repo, path, name)
        };
        self.state.files.lock().unwrap().push(StoredFile {
            key,
            repo: repo.to_string(),
            path: path.to_string(),
            name: name.to_string(),
            content: content.to_vec(),
            md5: md5_hex(content),
            sha1: sha1_hex(content),
        });
    }

    pub fn set_accept_ranges(&self, accept: bool) {
        self.state.accept_ranges.store(accept, Ordering::SeqCst);
    }

    /// Every range request starting at `start` answers 500.
    pub fn fail_range_starting_at(&self, start: u64) {
        *self.state.failing_range_start.lock().unwrap() = Some(start);
    }

    pub fn reply_to_search(&self, status: StatusCode, body: &str) {
        *self.state.search_reply.lock().unwrap() = Some((status, body.to_string()));
    }

    pub fn last_query(&self) -> Option<String> {
        self.state.last_query.lock().unwrap().clone()
    }

    pub fn last_headers(&self) -> HeaderMap {
        self.state.last_headers.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    pub fn get_count(&self) -> usize {
        self.state.gets.load(Ordering::SeqCst)
    }

    pub fn range_get_count(&self) -> usize {
        self.state.range_gets.load(Ordering::SeqCst)
    }
}

impl Drop for MockRepo {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn search(
    State(state): State<Arc<RepoState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    state.record(&headers);
    *state.last_query.lock().unwrap() = Some(body);

    if let Some((status, body)) = state.search_reply.lock().unwrap().clone() {
        return (status, body).into_response();
    }

    let results = state
        .files
        .lock()
        .unwrap()
        .iter()
        .map(|f| json!({ "repo": f.repo, "path": f.path, "name": f.name, "type": "file" }))
        .collect::<Vec<_>>();
    (StatusCode::OK, json!({ "results": results }).to_string()).into_response()
}

fn parse_range(value: &str) -> Option<(u64, u64)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

async fn serve(
    State(state): State<Arc<RepoState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    state.record(&headers);
    if method == Method::GET {
        state.gets.fetch_add(1, Ordering::SeqCst);
    }

    let key = uri.path().trim_start_matches('/');
    let files = state.files.lock().unwrap();
    let Some(file) = files.iter().find(|f| f.key == key) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let accept_ranges = state.accept_ranges.load(Ordering::SeqCst);
    let mut builder = Response::builder()
        .header("X-Checksum-Md5", file.md5.as_str())
        .header("X-Checksum-Sha1", file.sha1.as_str());
    if accept_ranges {
        builder = builder.header(header::ACCEPT_RANGES, "bytes");
    }

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_range);
    if let Some((start, end)) = range.filter(|_| method == Method::GET && accept_ranges) {
        state.range_gets.fetch_add(1, Ordering::SeqCst);
        if *state.failing_range_start.lock().unwrap() == Some(start) {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        let total = file.content.len() as u64;
        if start > end || end >= total {
            return StatusCode::RANGE_NOT_SATISFIABLE.into_response();
        }
        let slice = file.content[start as usize..=end as usize].to_vec();
        return builder
            .status(StatusCode::PARTIAL_CONTENT)
            .header(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", start, end, total),
            )
            .body(Body::from(slice))
            .unwrap();
    }

    builder
        .status(StatusCode::OK)
        .header(header::CONTENT_LENGTH, file.content.len())
        .body(Body::from(file.content.clone()))
        .unwrap()
}
