//! The [`Docker`] client: connection configuration plus one method per
//! daemon endpoint.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hyper::Method;
use serde::Serialize;
use tokio::io::AsyncWrite;
use tracing::{debug, info};

use dockline_config::{AppConfig, DockerHost};

use crate::auth::{AuthConfig, registry_headers};
use crate::container::Container;
use crate::error::{Error, Result};
use crate::exec::Exec;
use crate::image::Image;
use crate::query::{
    AttachOptions, BuildImageOptions, CreateImageOptions, EventsOptions, ListContainersOptions,
    ListImagesOptions, SearchImagesOptions,
};
use crate::stream::{self, ByteStream, JsonStream};
use crate::transport::{Payload, Transport};
use crate::types::{
    AuthResponse, ContainerConfig, ContainerSummary, CreateContainerResponse, Event, HostConfig,
    ImageSummary, SearchResult, Version, WaitResponse,
};

/// Handle to a Docker daemon.
///
/// Cheap to clone; clones share the same connection settings. Each call
/// opens its own connection.
#[derive(Debug, Clone)]
pub struct Docker {
    transport: Arc<Transport>,
}

impl Docker {
    /// Create a client for the given daemon address.
    pub fn new(host: DockerHost) -> Self {
        Self {
            transport: Arc::new(Transport::new(host)),
        }
    }

    /// Connect over a Unix domain socket.
    pub fn connect_with_unix(path: impl Into<PathBuf>) -> Self {
        Self::new(DockerHost::Unix(path.into()))
    }

    /// Connect over plain TCP.
    pub fn connect_with_tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new(DockerHost::Tcp {
            host: host.into(),
            port,
        })
    }

    /// Build a client from loaded configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let host = config.docker_host()?;
        let timeout = match config.docker.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Ok(Self::new(host)
            .with_api_version(config.docker.api_version.clone())
            .with_timeout(timeout))
    }

    /// Default socket, overridden by `DOCKER_HOST` / `DOCKER_API_VERSION`.
    pub fn connect_with_defaults() -> Result<Self> {
        let mut config = AppConfig::default();
        config.apply_env()?;
        Self::from_config(&config)
    }

    /// Pin requests to an API version (`/v1.43/...`).
    pub fn with_api_version(mut self, version: Option<String>) -> Self {
        Arc::make_mut(&mut self.transport).set_api_version(version);
        self
    }

    /// Per-call deadline. Streams are bounded only until headers arrive.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        Arc::make_mut(&mut self.transport).set_timeout(timeout);
        self
    }

    /// The daemon address this client talks to.
    pub fn host(&self) -> &DockerHost {
        self.transport.host()
    }

    pub(crate) fn transport(&self) -> &Transport {
        &self.transport
    }

    // ── Handles (no I/O) ────────────────────────────────────────────────

    /// Handle for an existing container.
    pub fn get_container(&self, id: impl Into<String>) -> Container {
        Container::new(self.clone(), id.into())
    }

    /// Handle for an existing image.
    pub fn get_image(&self, name: impl Into<String>) -> Image {
        Image::new(self.clone(), name.into())
    }

    /// Handle for an existing exec instance.
    pub fn get_exec(&self, id: impl Into<String>) -> Exec {
        Exec::new(self.clone(), id.into())
    }

    // ── System ──────────────────────────────────────────────────────────

    /// `GET /_ping`.
    pub async fn ping(&self) -> Result<()> {
        let body = self.transport.text(Method::GET, "/_ping").await?;
        if body.trim() == "OK" {
            Ok(())
        } else {
            Err(Error::Request(format!("unexpected ping response: {body:?}")))
        }
    }

    /// `GET /version`.
    pub async fn version(&self) -> Result<Version> {
        self.transport
            .json(Method::GET, "/version", Payload::Empty, &[])
            .await
    }

    /// `GET /info`.
    pub async fn info(&self) -> Result<serde_json::Value> {
        self.transport
            .json(Method::GET, "/info", Payload::Empty, &[])
            .await
    }

    /// `POST /auth`: Ask the daemon to validate registry credentials.
    pub async fn check_auth(&self, auth: &AuthConfig) -> Result<AuthResponse> {
        self.transport
            .json(Method::POST, "/auth", Payload::json(auth)?, &[])
            .await
    }

    /// `GET /events`: Live event stream.
    pub async fn get_events(&self, opts: &EventsOptions) -> Result<JsonStream<Event>> {
        let stream = self
            .transport
            .stream(Method::GET, &opts.path(), Payload::Empty, &[])
            .await?;
        Ok(stream.json())
    }

    // ── Containers ──────────────────────────────────────────────────────

    /// `GET /containers/json`.
    pub async fn list_containers(
        &self,
        opts: &ListContainersOptions,
    ) -> Result<Vec<ContainerSummary>> {
        self.transport
            .json(Method::GET, &opts.path(), Payload::Empty, &[])
            .await
    }

    /// `POST /containers/create`.
    ///
    /// `config` may be a [`ContainerConfig`] or any value serializing to the
    /// body shape the daemon expects.
    pub async fn create_container<B>(&self, name: Option<&str>, config: &B) -> Result<Container>
    where
        B: Serialize + ?Sized,
    {
        let path = match name {
            Some(name) => {
                let mut q = crate::query::Query::new();
                q.push("name", name);
                q.to_path("/containers/create")
            }
            None => "/containers/create".to_string(),
        };
        let created: CreateContainerResponse = self
            .transport
            .json(Method::POST, &path, Payload::json(config)?, &[])
            .await?;
        for warning in created.warnings.iter().flatten() {
            tracing::warn!(id = %created.id, warning = %warning, "container created with warning");
        }
        debug!(id = %created.id, "container created");
        Ok(self.get_container(created.id))
    }

    // ── Images ──────────────────────────────────────────────────────────

    /// `GET /images/json`.
    pub async fn list_images(&self, opts: &ListImagesOptions) -> Result<Vec<ImageSummary>> {
        self.transport
            .json(Method::GET, &opts.path(), Payload::Empty, &[])
            .await
    }

    /// `GET /images/search`.
    pub async fn search_images(&self, opts: &SearchImagesOptions) -> Result<Vec<SearchResult>> {
        self.transport
            .json(Method::GET, &opts.path(), Payload::Empty, &[])
            .await
    }

    /// `POST /images/create`: Pull or import; returns the progress stream.
    pub async fn create_image(
        &self,
        auth: Option<&AuthConfig>,
        opts: &CreateImageOptions,
    ) -> Result<ByteStream> {
        let headers = registry_headers(auth)?;
        self.transport
            .stream(Method::POST, &opts.path(), Payload::Empty, &headers)
            .await
    }

    /// Pull `repo[:tag]` (tag defaults to `latest`).
    pub async fn pull(&self, repo_tag: &str, auth: Option<&AuthConfig>) -> Result<ByteStream> {
        let (repo, tag) = parse_repo_tag(repo_tag);
        info!(repo = %repo, tag = %tag, "pulling image");
        let opts = CreateImageOptions {
            from_image: Some(repo.to_string()),
            tag: (!tag.is_empty()).then(|| tag.to_string()),
            ..Default::default()
        };
        self.create_image(auth, &opts).await
    }

    /// `POST /build` with a tar build context; returns the progress stream.
    pub async fn build_image(
        &self,
        context: impl Into<Bytes>,
        opts: &BuildImageOptions,
    ) -> Result<ByteStream> {
        self.transport
            .stream(
                Method::POST,
                &opts.path(),
                Payload::Tar(context.into()),
                &[],
            )
            .await
    }

    /// Read a tar build context from disk and build it.
    pub async fn build_image_from_file(
        &self,
        path: &Path,
        opts: &BuildImageOptions,
    ) -> Result<ByteStream> {
        let context = tokio::fs::read(path).await?;
        debug!(path = %path.display(), bytes = context.len(), "build context loaded");
        self.build_image(context, opts).await
    }

    // ── Run ─────────────────────────────────────────────────────────────

    /// Create, attach, start and wait for a container.
    ///
    /// Output is written to `stdout`/`stderr` as it arrives: demultiplexed
    /// when the container has no TTY, all to `stdout` when it does. Any step
    /// that fails returns the daemon's error unchanged and leaves the
    /// container (if created) in place.
    pub async fn run<O, E>(
        &self,
        opts: RunOptions,
        stdout: &mut O,
        stderr: &mut E,
    ) -> Result<(WaitResponse, Container)>
    where
        O: AsyncWrite + Unpin + ?Sized,
        E: AsyncWrite + Unpin + ?Sized,
    {
        let tty = opts.tty;
        let name = opts.name.clone();
        let config = opts.into_config();

        let container = self.create_container(name.as_deref(), &config).await?;
        let output = container.attach(&AttachOptions::output()).await?;
        container.start().await?;

        if tty {
            stream::copy_stream(output, stdout).await?;
        } else {
            stream::demux_stream(output, stdout, stderr).await?;
        }

        let status = container.wait().await?;
        info!(id = %container.id(), status = status.status_code, "container exited");
        Ok((status, container))
    }
}

/// Parameters for [`Docker::run`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub image: String,
    pub cmd: Vec<String>,
    pub tty: bool,
    pub env: Vec<String>,
    pub name: Option<String>,
    pub host_config: Option<HostConfig>,
}

impl RunOptions {
    pub fn new<I, S>(image: impl Into<String>, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            image: image.into(),
            cmd: cmd.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_tty(mut self, tty: bool) -> Self {
        self.tty = tty;
        self
    }

    fn into_config(self) -> ContainerConfig {
        ContainerConfig {
            image: self.image,
            cmd: (!self.cmd.is_empty()).then_some(self.cmd),
            env: self.env,
            tty: self.tty,
            attach_stdin: false,
            attach_stdout: true,
            attach_stderr: true,
            open_stdin: false,
            host_config: self.host_config,
            ..Default::default()
        }
    }
}

/// Split `repo[:tag]` the way the daemon does.
///
/// The tag separator is the last `:` after the last `/`, so registry ports
/// (`localhost:5000/app`) are not mistaken for tags. A missing or empty tag
/// becomes `latest`. Digest references are passed through whole with an
/// empty tag.
pub fn parse_repo_tag(repo_tag: &str) -> (&str, &str) {
    if repo_tag.contains('@') {
        return (repo_tag, "");
    }
    let name_start = repo_tag.rfind('/').map_or(0, |i| i + 1);
    match repo_tag[name_start..].rfind(':') {
        Some(i) => {
            let split = name_start + i;
            match &repo_tag[split + 1..] {
                "" => (&repo_tag[..split], "latest"),
                tag => (&repo_tag[..split], tag),
            }
        }
        None => (repo_tag, "latest"),
    }
}
