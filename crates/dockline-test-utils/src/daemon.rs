//! Mock Docker daemon for contract tests.
//!
//! [`MockDaemon`] serves a canned subset of the Engine API with `axum`, on a
//! Unix socket in a temp directory (or on a loopback TCP port), and records
//! every request it receives. Responses imitate the real daemon closely
//! enough to exercise JSON decoding, 204/304 handling, error pass-through,
//! chunked progress streams and multiplexed stdout/stderr.
//!
//! Magic names trigger failure paths:
//!
//! | Name | Effect |
//! |------|--------|
//! | container `missing` | 404 on every container call |
//! | container `running` | `start` answers 304 |
//! | container `stopped` | `stop` answers 304 |
//! | container `failing` | `wait` reports exit status 1 |
//! | container `tty` | created with a TTY; attach and logs are raw |
//! | image `missing` | 404 on create/pull/inspect/remove |
//! | image `private/denied` | pull stream ends with an in-band error |
//! | build context `FAIL` | build stream ends with an in-band error |
//! | auth password other than `good` | 401 from `/auth` |

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use dockline_config::AppConfig;

/// A request as seen by the mock daemon.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Request path as sent, including any `/vX.Y` prefix.
    pub raw_path: String,
    /// Path with the version prefix removed.
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl RecordedRequest {
    /// Body parsed as JSON, or `Null` when it is not JSON.
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    /// Header value by lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

#[derive(Default)]
struct MockState {
    requests: Mutex<Vec<RecordedRequest>>,
}

enum Endpoint {
    Unix(PathBuf),
    Tcp(SocketAddr),
}

/// A running mock daemon. Shuts down when dropped.
pub struct MockDaemon {
    endpoint: Endpoint,
    state: Arc<MockState>,
    shutdown: Option<oneshot::Sender<()>>,
    _handle: JoinHandle<()>,
    _temp_dir: Option<TempDir>,
}

impl MockDaemon {
    /// Start on a Unix socket inside a fresh temp directory.
    pub async fn start() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let path = temp_dir.path().join("docker.sock");
        let listener = UnixListener::bind(&path).expect("failed to bind mock socket");

        let state = Arc::new(MockState::default());
        let (shutdown, handle) = spawn_server(listener, Arc::clone(&state));

        Self {
            endpoint: Endpoint::Unix(path),
            state,
            shutdown: Some(shutdown),
            _handle: handle,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Start on an ephemeral loopback TCP port.
    pub async fn start_tcp() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock TCP port");
        let addr = listener.local_addr().expect("listener has no address");

        let state = Arc::new(MockState::default());
        let (shutdown, handle) = spawn_server(listener, Arc::clone(&state));

        Self {
            endpoint: Endpoint::Tcp(addr),
            state,
            shutdown: Some(shutdown),
            _handle: handle,
            _temp_dir: None,
        }
    }

    /// `DOCKER_HOST`-style address of this daemon.
    pub fn host(&self) -> String {
        match &self.endpoint {
            Endpoint::Unix(path) => format!("unix://{}", path.display()),
            Endpoint::Tcp(addr) => format!("tcp://{addr}"),
        }
    }

    /// Socket path, for Unix-socket daemons.
    pub fn socket_path(&self) -> Option<&Path> {
        match &self.endpoint {
            Endpoint::Unix(path) => Some(path),
            Endpoint::Tcp(_) => None,
        }
    }

    /// Config pointing at this daemon.
    pub fn config(&self) -> AppConfig {
        let mut config = AppConfig::default();
        config.docker.host = self.host();
        config
    }

    /// All requests received so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state
            .requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.requests().pop()
    }

    /// Most recent request matching method and (unversioned) path.
    pub fn find(&self, method: &str, path: &str) -> Option<RecordedRequest> {
        self.requests()
            .into_iter()
            .rev()
            .find(|r| r.method == method && r.path == path)
    }
}

impl Drop for MockDaemon {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn spawn_server<L>(listener: L, state: Arc<MockState>) -> (oneshot::Sender<()>, JoinHandle<()>)
where
    L: axum::serve::Listener,
    L::Addr: std::fmt::Debug,
{
    let (tx, rx) = oneshot::channel::<()>();
    let app = Router::new().fallback(dispatch).with_state(state);
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });
    (tx, handle)
}

/// Encode one multiplexed stdout/stderr frame.
pub fn mux_frame(stream: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![stream, 0, 0, 0];
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

// ── Dispatch ────────────────────────────────────────────────────────────

async fn dispatch(State(state): State<Arc<MockState>>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();

    let raw_path = parts.uri.path().to_string();
    let recorded = RecordedRequest {
        method: parts.method.as_str().to_string(),
        path: strip_version(&raw_path).to_string(),
        raw_path,
        query: parts
            .uri
            .query()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default(),
        headers: parts
            .headers
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect(),
        body,
    };
    debug!(method = %recorded.method, path = %recorded.raw_path, "mock daemon request");

    if let Ok(mut requests) = state.requests.lock() {
        requests.push(recorded.clone());
    }

    route(&recorded)
}

fn strip_version(path: &str) -> &str {
    if let Some(rest) = path.strip_prefix("/v")
        && rest.starts_with(|c: char| c.is_ascii_digit())
        && let Some(idx) = rest.find('/')
    {
        return &rest[idx..];
    }
    path
}

fn route(req: &RecordedRequest) -> Response {
    let trimmed = req.path.trim_start_matches('/');
    let segments: Vec<&str> = trimmed.split('/').collect();

    match (req.method.as_str(), segments.as_slice()) {
        ("GET", ["_ping"]) => (StatusCode::OK, "OK").into_response(),
        ("GET", ["version"]) => json_response(StatusCode::OK, version_body()),
        ("GET", ["info"]) => json_response(
            StatusCode::OK,
            json!({"ID": "MOCK:DAEMON", "Name": "mock-daemon", "Containers": 1, "Images": 2}),
        ),
        ("POST", ["auth"]) => auth(req),
        ("GET", ["events"]) => events(),
        ("GET", ["containers", "json"]) => json_response(StatusCode::OK, container_list()),
        ("POST", ["containers", "create"]) => create_container(req),
        ("POST", ["commit"]) => json_response(StatusCode::CREATED, json!({"Id": "sha256:c0mm17"})),
        ("GET", ["images", "json"]) => json_response(StatusCode::OK, image_list()),
        ("GET", ["images", "search"]) => search(req),
        ("POST", ["images", "create"]) => create_image(req),
        ("POST", ["build"]) => build(req),
        (_, ["containers", id, rest @ ..]) => container_route(req, id, rest),
        (_, ["exec", id, action]) => exec_route(req, id, action),
        (_, ["images", _, ..]) => image_route(req, &trimmed["images/".len()..]),
        _ => error(StatusCode::NOT_FOUND, "page not found"),
    }
}

// ── Response helpers ────────────────────────────────────────────────────

fn json_response(status: StatusCode, value: Value) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        value.to_string(),
    )
        .into_response()
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    json_response(status, json!({ "message": message.into() }))
}

fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Stream `data` in uneven chunks so clients must reassemble across reads.
fn chunked(content_type: &'static str, data: Vec<u8>, chunk: usize) -> Response {
    let chunks: Vec<Result<Bytes, std::io::Error>> = data
        .chunks(chunk.max(1))
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        Body::from_stream(futures::stream::iter(chunks)),
    )
        .into_response()
}

fn json_lines(docs: &[Value]) -> Vec<u8> {
    docs.iter()
        .flat_map(|d| format!("{d}\r\n").into_bytes())
        .collect()
}

// ── System ──────────────────────────────────────────────────────────────

fn version_body() -> Value {
    json!({
        "Version": "24.0.7",
        "ApiVersion": "1.43",
        "MinAPIVersion": "1.12",
        "GitCommit": "311b9ff",
        "GoVersion": "go1.20.10",
        "Os": "linux",
        "Arch": "amd64",
        "KernelVersion": "6.1.0-mock",
        "BuildTime": "2023-10-26T09:08:02.000000000+00:00"
    })
}

fn auth(req: &RecordedRequest) -> Response {
    let body = req.json();
    if body["password"] == "good" {
        json_response(
            StatusCode::OK,
            json!({"Status": "Login Succeeded", "IdentityToken": ""}),
        )
    } else {
        error(
            StatusCode::UNAUTHORIZED,
            "Get \"https://registry-1.docker.io/v2/\": unauthorized: incorrect username or password",
        )
    }
}

fn events() -> Response {
    let data = json_lines(&[
        json!({"status": "create", "id": "c0ffee", "from": "ubuntu", "Type": "container",
               "Action": "create", "Actor": {"ID": "c0ffee", "Attributes": {"image": "ubuntu"}},
               "time": 1_700_000_000, "timeNano": 1_700_000_000_000_000_000_i64}),
        json!({"status": "start", "id": "c0ffee", "from": "ubuntu", "Type": "container",
               "Action": "start", "Actor": {"ID": "c0ffee", "Attributes": {"image": "ubuntu"}},
               "time": 1_700_000_001, "timeNano": 1_700_000_001_000_000_000_i64}),
    ]);
    chunked("application/json", data, 37)
}

// ── Containers ──────────────────────────────────────────────────────────

fn container_list() -> Value {
    json!([{
        "Id": "c0ffee",
        "Names": ["/mock"],
        "Image": "ubuntu",
        "ImageID": "sha256:1111",
        "Command": "/bin/bash",
        "Created": 1_700_000_000,
        "State": "running",
        "Status": "Up 2 minutes",
        "Ports": [],
        "Labels": {}
    }])
}

fn create_container(req: &RecordedRequest) -> Response {
    let body = req.json();
    if body.is_null() {
        return error(StatusCode::BAD_REQUEST, "invalid JSON body");
    }
    if let Some(cmd) = body.get("Cmd")
        && !(cmd.is_array() || cmd.is_null())
    {
        return error(
            StatusCode::BAD_REQUEST,
            "json: cannot unmarshal string into Go struct field ContainerConfigWrapper.Cmd of type []string",
        );
    }
    match body["Image"].as_str() {
        None | Some("") => error(
            StatusCode::BAD_REQUEST,
            "Config cannot be empty in order to create a container",
        ),
        Some("missing") => error(StatusCode::NOT_FOUND, "No such image: missing:latest"),
        Some(image) => {
            let id = if body["Tty"] == true {
                "tty"
            } else if image == "failing" {
                "failing"
            } else {
                "c0ffee"
            };
            json_response(StatusCode::CREATED, json!({"Id": id, "Warnings": []}))
        }
    }
}

fn container_route(req: &RecordedRequest, id: &str, rest: &[&str]) -> Response {
    if id == "missing" {
        return error(StatusCode::NOT_FOUND, format!("No such container: {id}"));
    }

    match (req.method.as_str(), rest) {
        ("GET", ["json"]) => json_response(
            StatusCode::OK,
            json!({"Id": id, "Name": "/mock", "Config": {"Tty": id == "tty"},
                   "State": {"Running": false, "ExitCode": 0}}),
        ),
        ("POST", ["start"]) if id == "running" => StatusCode::NOT_MODIFIED.into_response(),
        ("POST", ["stop"]) if id == "stopped" => StatusCode::NOT_MODIFIED.into_response(),
        ("POST", ["start" | "stop" | "restart" | "kill" | "pause" | "unpause"]) => no_content(),
        ("POST", ["resize"]) => StatusCode::OK.into_response(),
        ("DELETE", []) => no_content(),
        ("POST", ["attach"]) if id == "tty" => {
            chunked("application/vnd.docker.raw-stream", b"tty output\r\n".to_vec(), 4)
        }
        ("POST", ["attach"]) => {
            let mut data = mux_frame(1, b"hello from mock\n");
            data.extend(mux_frame(2, b"warning: mock stderr\n"));
            data.extend(mux_frame(1, b"done\n"));
            chunked("application/vnd.docker.raw-stream", data, 5)
        }
        ("POST", ["wait"]) => {
            let code = if id == "failing" { 1 } else { 0 };
            json_response(StatusCode::OK, json!({"StatusCode": code}))
        }
        ("GET", ["top"]) => json_response(
            StatusCode::OK,
            json!({"Titles": ["PID", "CMD"], "Processes": [["1", "sleep infinity"]]}),
        ),
        ("GET", ["changes"]) => json_response(
            StatusCode::OK,
            json!([{"Path": "/tmp", "Kind": 0}, {"Path": "/tmp/new", "Kind": 1}]),
        ),
        ("GET", ["export"]) => chunked("application/x-tar", b"mock-tar-archive".to_vec(), 6),
        ("GET", ["logs"]) if id == "tty" => {
            chunked("text/plain", b"hello from tty\r\n".to_vec(), 4)
        }
        ("GET", ["logs"]) => {
            let mut data = mux_frame(1, b"log line 1\n");
            data.extend(mux_frame(2, b"log error\n"));
            chunked("application/vnd.docker.multiplexed-stream", data, 7)
        }
        ("POST", ["exec"]) => json_response(StatusCode::CREATED, json!({"Id": "exec-1"})),
        _ => error(StatusCode::NOT_FOUND, "page not found"),
    }
}

fn exec_route(req: &RecordedRequest, id: &str, action: &str) -> Response {
    match (req.method.as_str(), action) {
        ("POST", "start") => chunked(
            "application/vnd.docker.raw-stream",
            mux_frame(1, b"exec output\n"),
            3,
        ),
        ("POST", "resize") => StatusCode::CREATED.into_response(),
        ("GET", "json") => json_response(
            StatusCode::OK,
            json!({"ID": id, "Running": false, "ExitCode": 0}),
        ),
        _ => error(StatusCode::NOT_FOUND, "page not found"),
    }
}

// ── Images ──────────────────────────────────────────────────────────────

fn image_list() -> Value {
    json!([
        {
            "Id": "sha256:1111",
            "ParentId": "",
            "RepoTags": ["lightsofapollo/test-taskenv:fail"],
            "RepoDigests": [],
            "Created": 1_600_000_000,
            "Size": 1024,
            "Labels": null,
            "Containers": -1
        },
        {
            "Id": "sha256:2222",
            "ParentId": "",
            "RepoTags": null,
            "Created": 1_600_000_100,
            "Size": 2048
        }
    ])
}

fn search(req: &RecordedRequest) -> Response {
    let term = req.param("term").unwrap_or_default();
    json_response(
        StatusCode::OK,
        json!([{
            "name": term,
            "description": format!("Official {term} image"),
            "star_count": 12_000,
            "is_official": true,
            "is_automated": false
        }]),
    )
}

fn create_image(req: &RecordedRequest) -> Response {
    let Some(image) = req.param("fromImage").or(req.param("fromSrc")) else {
        return error(StatusCode::BAD_REQUEST, "fromImage or fromSrc is required");
    };
    let tag = req.param("tag").unwrap_or("latest");

    if image == "missing" {
        return error(
            StatusCode::NOT_FOUND,
            "pull access denied for missing, repository does not exist or may require 'docker login'",
        );
    }

    let mut docs = vec![
        json!({"status": format!("Pulling from {image}"), "id": tag}),
        json!({"status": "Downloading", "progressDetail": {"current": 512, "total": 1024},
               "progress": "[=====>     ]", "id": "a1b2c3"}),
    ];
    if image == "private/denied" {
        docs.push(json!({"errorDetail": {"message": "denied: requested access to the resource is denied"},
                         "error": "denied: requested access to the resource is denied"}));
    } else {
        docs.push(json!({"status": format!("Status: Downloaded newer image for {image}:{tag}")}));
    }
    chunked("application/json", json_lines(&docs), 29)
}

fn build(req: &RecordedRequest) -> Response {
    if req.header("content-type") != Some("application/x-tar") {
        return error(StatusCode::BAD_REQUEST, "Content-Type must be application/x-tar");
    }
    if req.body.is_empty() {
        return error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Cannot locate specified Dockerfile: Dockerfile",
        );
    }

    let mut docs = vec![json!({"stream": "Step 1/2 : FROM ubuntu\n"})];
    if req.body.as_ref() == b"FAIL" {
        docs.push(json!({"errorDetail": {"code": 1, "message": "The command '/bin/sh -c exit 1' returned a non-zero code: 1"},
                         "error": "The command '/bin/sh -c exit 1' returned a non-zero code: 1"}));
    } else {
        docs.push(json!({"stream": "Step 2/2 : CMD [\"bash\"]\n"}));
        docs.push(json!({"aux": {"ID": "sha256:0123456789ab"}}));
        docs.push(json!({"stream": "Successfully built 0123456789ab\n"}));
        if let Some(tag) = req.param("t") {
            docs.push(json!({"stream": format!("Successfully tagged {tag}\n")}));
        }
    }
    chunked("application/json", json_lines(&docs), 13)
}

fn image_route(req: &RecordedRequest, rest: &str) -> Response {
    let method = req.method.as_str();

    let (name, action) = match rest.rsplit_once('/') {
        Some((name, action @ ("json" | "history" | "push" | "tag" | "get"))) => (name, action),
        _ => (rest, ""),
    };

    if name == "missing" {
        return error(StatusCode::NOT_FOUND, format!("No such image: {name}"));
    }

    match (method, action) {
        ("GET", "json") => json_response(
            StatusCode::OK,
            json!({"Id": "sha256:abc", "RepoTags": [name], "Os": "linux"}),
        ),
        ("GET", "history") => json_response(
            StatusCode::OK,
            json!([{"Id": "sha256:abc", "Created": 1_600_000_000,
                    "CreatedBy": "/bin/sh -c #(nop)  CMD [\"bash\"]",
                    "Tags": [name], "Size": 0, "Comment": ""},
                   {"Id": "<missing>", "Created": 1_599_999_999,
                    "CreatedBy": "/bin/sh -c #(nop) ADD file:abc in / ",
                    "Tags": null, "Size": 72_800_000, "Comment": ""}]),
        ),
        ("POST", "push") => {
            let mut docs = vec![json!({"status": format!("The push refers to repository [{name}]")})];
            if req.header("x-registry-auth").is_some() {
                docs.push(json!({"status": "latest: digest: sha256:feed size: 529"}));
            } else {
                docs.push(json!({"errorDetail": {"message": "authentication required"},
                                 "error": "authentication required"}));
            }
            chunked("application/json", json_lines(&docs), 17)
        }
        ("POST", "tag") => StatusCode::CREATED.into_response(),
        ("GET", "get") => chunked("application/x-tar", b"mock-image-tarball".to_vec(), 8),
        ("DELETE", "") => json_response(
            StatusCode::OK,
            json!([{"Untagged": name}, {"Deleted": "sha256:abc"}]),
        ),
        _ => error(StatusCode::NOT_FOUND, "page not found"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_version() {
        assert_eq!(strip_version("/v1.43/containers/json"), "/containers/json");
        assert_eq!(strip_version("/containers/json"), "/containers/json");
        assert_eq!(strip_version("/version"), "/version");
    }

    #[test]
    fn test_mux_frame_header() {
        let frame = mux_frame(2, b"abc");
        assert_eq!(&frame[..8], &[2, 0, 0, 0, 0, 0, 0, 3]);
        assert_eq!(&frame[8..], b"abc");
    }
}
