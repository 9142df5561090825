//! HTTP/1.1 transport to the daemon over a Unix socket or TCP.
//!
//! Every call opens a fresh connection, performs a `hyper` handshake, drives
//! the connection in a background task and sends exactly one request. The
//! response is handed back either fully collected (JSON, empty) or as a live
//! [`ByteStream`].

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::client::conn::http1::SendRequest;
use hyper::header::{CONTENT_TYPE, HOST, USER_AGENT};
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use tracing::{debug, warn};

use dockline_config::DockerHost;

use crate::error::{Error, Result};
use crate::stream::ByteStream;

/// Request body.
#[derive(Debug)]
pub(crate) enum Payload {
    Empty,
    Json(Vec<u8>),
    Tar(Bytes),
}

impl Payload {
    /// Serialize `value` as a JSON body.
    pub(crate) fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Payload::Json(serde_json::to_vec(value)?))
    }

    fn content_type(&self) -> Option<&'static str> {
        match self {
            Payload::Empty => None,
            Payload::Json(_) => Some("application/json"),
            Payload::Tar(_) => Some("application/x-tar"),
        }
    }

    fn into_body(self) -> Full<Bytes> {
        match self {
            Payload::Empty => Full::new(Bytes::new()),
            Payload::Json(data) => Full::new(Bytes::from(data)),
            Payload::Tar(data) => Full::new(data),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Transport {
    host: DockerHost,
    api_version: Option<String>,
    timeout: Option<Duration>,
    user_agent: String,
}

impl Transport {
    pub(crate) fn new(host: DockerHost) -> Self {
        Self {
            host,
            api_version: None,
            timeout: None,
            user_agent: crate::build_info::user_agent(),
        }
    }

    pub(crate) fn host(&self) -> &DockerHost {
        &self.host
    }

    pub(crate) fn set_api_version(&mut self, version: Option<String>) {
        self.api_version = version;
    }

    pub(crate) fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Request target for an endpoint, prefixed with `/v{version}` when pinned.
    pub(crate) fn uri(&self, endpoint: &str) -> String {
        match &self.api_version {
            Some(version) => format!("/v{version}{endpoint}"),
            None => endpoint.to_string(),
        }
    }

    async fn connect(&self) -> Result<SendRequest<Full<Bytes>>> {
        match &self.host {
            DockerHost::Unix(path) => {
                if !path.exists() {
                    return Err(Error::NotRunning(path.clone()));
                }
                let stream = UnixStream::connect(path)
                    .await
                    .map_err(|e| Error::Connect {
                        addr: self.host.to_string(),
                        source: e,
                    })?;
                handshake(stream).await
            }
            DockerHost::Tcp { host, port } => {
                let name = host.trim_start_matches('[').trim_end_matches(']');
                let stream = TcpStream::connect((name, *port))
                    .await
                    .map_err(|e| Error::Connect {
                        addr: self.host.to_string(),
                        source: e,
                    })?;
                handshake(stream).await
            }
        }
    }

    async fn with_deadline<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => fut.await,
        }
    }

    /// Send one request and wait for the status line and headers.
    ///
    /// Any status outside 2xx, other than 304, is read to the end and turned
    /// into [`Error::Api`].
    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        payload: Payload,
        headers: &[(&'static str, String)],
    ) -> Result<Response<Incoming>> {
        let mut sender = self.connect().await?;
        let uri = self.uri(endpoint);

        debug!(method = %method, uri = %uri, host = %self.host, "docker request");

        let mut builder = Request::builder()
            .method(method)
            .uri(uri.as_str())
            .header(HOST, self.host.authority())
            .header(USER_AGENT, self.user_agent.as_str());

        if let Some(content_type) = payload.content_type() {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }

        let req = builder
            .body(payload.into_body())
            .map_err(|e| Error::Request(format!("failed to build request: {e}")))?;

        let resp = sender.send_request(req).await?;
        let status = resp.status();
        debug!(status = status.as_u16(), uri = %uri, "docker response");

        if status.is_success() || status == StatusCode::NOT_MODIFIED {
            return Ok(resp);
        }

        let body = resp.into_body().collect().await?.to_bytes();
        Err(Error::from_response(status.as_u16(), &body))
    }

    /// Send a request and decode the JSON response body.
    pub(crate) async fn json<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        payload: Payload,
        headers: &[(&'static str, String)],
    ) -> Result<T> {
        self.with_deadline(async {
            let resp = self.send(method, endpoint, payload, headers).await?;
            let body = resp.into_body().collect().await?.to_bytes();
            Ok(serde_json::from_slice(&body)?)
        })
        .await
    }

    /// Send a request whose success body carries nothing of interest.
    pub(crate) async fn empty(&self, method: Method, endpoint: &str, payload: Payload) -> Result<()> {
        self.with_deadline(async {
            let resp = self.send(method, endpoint, payload, &[]).await?;
            resp.into_body().collect().await?;
            Ok(())
        })
        .await
    }

    /// Send a request and return the body as text.
    pub(crate) async fn text(&self, method: Method, endpoint: &str) -> Result<String> {
        self.with_deadline(async {
            let resp = self.send(method, endpoint, Payload::Empty, &[]).await?;
            let body = resp.into_body().collect().await?.to_bytes();
            Ok(String::from_utf8_lossy(&body).into_owned())
        })
        .await
    }

    /// Send a request and hand the body to the caller as a live stream.
    ///
    /// The deadline covers only the wait for response headers.
    pub(crate) async fn stream(
        &self,
        method: Method,
        endpoint: &str,
        payload: Payload,
        headers: &[(&'static str, String)],
    ) -> Result<ByteStream> {
        let resp = self
            .with_deadline(self.send(method, endpoint, payload, headers))
            .await?;
        Ok(ByteStream::from_body(resp.into_body()))
    }
}

async fn handshake<S>(stream: S) -> Result<SendRequest<Full<Bytes>>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let (sender, conn) = hyper::client::conn::http1::handshake::<_, Full<Bytes>>(io).await?;

    // Drive the connection in the background
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            warn!(error = %e, "docker connection error");
        }
    });

    Ok(sender)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn test_uri_unversioned() {
        let t = Transport::new(DockerHost::Unix(PathBuf::from("/tmp/x.sock")));
        assert_eq!(t.uri("/containers/json?all=1"), "/containers/json?all=1");
    }

    #[test]
    fn test_uri_versioned() {
        let mut t = Transport::new(DockerHost::Unix(PathBuf::from("/tmp/x.sock")));
        t.set_api_version(Some("1.43".to_string()));
        assert_eq!(t.uri("/info"), "/v1.43/info");
    }

    #[test]
    fn test_payload_content_types() {
        assert_eq!(Payload::Empty.content_type(), None);
        assert_eq!(
            Payload::json(&serde_json::json!({})).unwrap().content_type(),
            Some("application/json")
        );
        assert_eq!(
            Payload::Tar(Bytes::from_static(b"tar")).content_type(),
            Some("application/x-tar")
        );
    }

    #[tokio::test]
    async fn test_missing_socket_is_not_running() {
        let t = Transport::new(DockerHost::Unix(PathBuf::from(
            "/tmp/nonexistent-dockline-test.sock",
        )));
        let result = t.text(Method::GET, "/_ping").await;
        assert!(matches!(result, Err(Error::NotRunning(_))));
    }

    #[tokio::test]
    async fn test_refused_tcp_is_connect_error() {
        // Bind and drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let t = Transport::new(DockerHost::Tcp {
            host: "127.0.0.1".to_string(),
            port,
        });
        let result = t.text(Method::GET, "/_ping").await;
        assert!(matches!(result, Err(Error::Connect { .. })));
    }
}
