//! Container handle: lifecycle and I/O calls under `/containers/{id}`.

use hyper::Method;
use serde::Serialize;
use tokio::io::AsyncWrite;

use crate::docker::Docker;
use crate::error::Result;
use crate::exec::Exec;
use crate::query::{
    AttachOptions, CommitOptions, LogsOptions, Query, RemoveContainerOptions, ResizeOptions,
};
use crate::stream::{self, ByteStream};
use crate::transport::Payload;
use crate::types::{ContainerChange, ExecCreateResponse, TopResponse, WaitResponse};

/// A container on the daemon, addressed by id or name.
///
/// Creating a handle performs no I/O; a missing container surfaces as a
/// 404 [`Error::Api`](crate::Error::Api) on first use.
#[derive(Debug, Clone)]
pub struct Container {
    docker: Docker,
    id: String,
}

impl Container {
    pub(crate) fn new(docker: Docker, id: String) -> Self {
        Self { docker, id }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn path(&self, suffix: &str) -> String {
        format!("/containers/{}{suffix}", self.id)
    }

    /// `GET /containers/{id}/json`.
    pub async fn inspect(&self) -> Result<serde_json::Value> {
        self.docker
            .transport()
            .json(Method::GET, &self.path("/json"), Payload::Empty, &[])
            .await
    }

    /// `POST /containers/{id}/start`. Already running (304) is not an error.
    pub async fn start(&self) -> Result<()> {
        self.docker
            .transport()
            .empty(Method::POST, &self.path("/start"), Payload::Empty)
            .await
    }

    /// `POST /containers/{id}/start` with a legacy host-config body.
    pub async fn start_with<B: Serialize + ?Sized>(&self, body: &B) -> Result<()> {
        self.docker
            .transport()
            .empty(Method::POST, &self.path("/start"), Payload::json(body)?)
            .await
    }

    /// `POST /containers/{id}/stop`. Already stopped (304) is not an error.
    pub async fn stop(&self, timeout_secs: Option<u64>) -> Result<()> {
        let mut q = Query::new();
        q.push_opt("t", timeout_secs);
        self.docker
            .transport()
            .empty(Method::POST, &q.to_path(&self.path("/stop")), Payload::Empty)
            .await
    }

    /// `POST /containers/{id}/restart`.
    pub async fn restart(&self, timeout_secs: Option<u64>) -> Result<()> {
        let mut q = Query::new();
        q.push_opt("t", timeout_secs);
        self.docker
            .transport()
            .empty(Method::POST, &q.to_path(&self.path("/restart")), Payload::Empty)
            .await
    }

    /// `POST /containers/{id}/kill`. Daemon default signal is `SIGKILL`.
    pub async fn kill(&self, signal: Option<&str>) -> Result<()> {
        let mut q = Query::new();
        q.push_opt("signal", signal);
        self.docker
            .transport()
            .empty(Method::POST, &q.to_path(&self.path("/kill")), Payload::Empty)
            .await
    }

    /// `POST /containers/{id}/pause`.
    pub async fn pause(&self) -> Result<()> {
        self.docker
            .transport()
            .empty(Method::POST, &self.path("/pause"), Payload::Empty)
            .await
    }

    /// `POST /containers/{id}/unpause`.
    pub async fn unpause(&self) -> Result<()> {
        self.docker
            .transport()
            .empty(Method::POST, &self.path("/unpause"), Payload::Empty)
            .await
    }

    /// `DELETE /containers/{id}`.
    pub async fn remove(&self, opts: &RemoveContainerOptions) -> Result<()> {
        self.docker
            .transport()
            .empty(Method::DELETE, &opts.path(&self.id), Payload::Empty)
            .await
    }

    /// `POST /containers/{id}/attach`.
    ///
    /// The stream is multiplexed unless the container was created with a TTY;
    /// use [`ByteStream::demux`] or [`crate::stream::demux_stream`] to split it.
    pub async fn attach(&self, opts: &AttachOptions) -> Result<ByteStream> {
        self.docker
            .transport()
            .stream(Method::POST, &opts.path(&self.id), Payload::Empty, &[])
            .await
    }

    /// `POST /containers/{id}/wait`: Blocks until the container exits.
    ///
    /// No deadline beyond the client's configured timeout is applied.
    pub async fn wait(&self) -> Result<WaitResponse> {
        self.docker
            .transport()
            .json(Method::POST, &self.path("/wait"), Payload::Empty, &[])
            .await
    }

    /// `POST /containers/{id}/resize`.
    pub async fn resize(&self, opts: &ResizeOptions) -> Result<()> {
        self.docker
            .transport()
            .empty(Method::POST, &opts.path(&self.path("")), Payload::Empty)
            .await
    }

    /// `GET /containers/{id}/top`.
    pub async fn top(&self, ps_args: Option<&str>) -> Result<TopResponse> {
        let mut q = Query::new();
        q.push_opt("ps_args", ps_args);
        self.docker
            .transport()
            .json(Method::GET, &q.to_path(&self.path("/top")), Payload::Empty, &[])
            .await
    }

    /// `GET /containers/{id}/changes`.
    pub async fn changes(&self) -> Result<Vec<ContainerChange>> {
        // The daemon answers `null` when nothing changed.
        let changes: Option<Vec<ContainerChange>> = self
            .docker
            .transport()
            .json(Method::GET, &self.path("/changes"), Payload::Empty, &[])
            .await?;
        Ok(changes.unwrap_or_default())
    }

    /// `GET /containers/{id}/export`: Filesystem as a tar stream.
    pub async fn export(&self) -> Result<ByteStream> {
        self.docker
            .transport()
            .stream(Method::GET, &self.path("/export"), Payload::Empty, &[])
            .await
    }

    /// `GET /containers/{id}/logs`.
    pub async fn logs(&self, opts: &LogsOptions) -> Result<ByteStream> {
        self.docker
            .transport()
            .stream(Method::GET, &opts.path(&self.id), Payload::Empty, &[])
            .await
    }

    /// Fetch logs and write them to `stdout`/`stderr`.
    ///
    /// A container created with a TTY logs raw bytes, which all go to
    /// `stdout`; otherwise the multiplexed stream is split by frame header.
    pub async fn write_logs<O, E>(
        &self,
        opts: &LogsOptions,
        stdout: &mut O,
        stderr: &mut E,
    ) -> Result<()>
    where
        O: AsyncWrite + Unpin + ?Sized,
        E: AsyncWrite + Unpin + ?Sized,
    {
        let details = self.inspect().await?;
        let tty = details["Config"]["Tty"].as_bool().unwrap_or(false);
        let output = self.logs(opts).await?;
        if tty {
            stream::copy_stream(output, stdout).await?;
        } else {
            stream::demux_stream(output, stdout, stderr).await?;
        }
        Ok(())
    }

    /// `POST /commit?container={id}`: Returns `{"Id": ...}`.
    pub async fn commit<B: Serialize + ?Sized>(
        &self,
        opts: &CommitOptions,
        config: &B,
    ) -> Result<serde_json::Value> {
        self.docker
            .transport()
            .json(Method::POST, &opts.path(&self.id), Payload::json(config)?, &[])
            .await
    }

    /// `POST /containers/{id}/exec`: Create an exec instance.
    pub async fn exec<B: Serialize + ?Sized>(&self, config: &B) -> Result<Exec> {
        let created: ExecCreateResponse = self
            .docker
            .transport()
            .json(Method::POST, &self.path("/exec"), Payload::json(config)?, &[])
            .await?;
        Ok(self.docker.get_exec(created.id))
    }
}
