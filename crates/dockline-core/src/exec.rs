//! Exec instance handle.

use hyper::Method;
use serde::Serialize;

use crate::docker::Docker;
use crate::error::Result;
use crate::query::ResizeOptions;
use crate::stream::ByteStream;
use crate::transport::Payload;

/// An exec instance created by [`Container::exec`](crate::Container::exec).
#[derive(Debug, Clone)]
pub struct Exec {
    docker: Docker,
    id: String,
}

impl Exec {
    pub(crate) fn new(docker: Docker, id: String) -> Self {
        Self { docker, id }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// `POST /exec/{id}/start`: Output stream (multiplexed unless TTY).
    ///
    /// `body` is usually an [`ExecStartConfig`](crate::types::ExecStartConfig).
    pub async fn start<B: Serialize + ?Sized>(&self, body: &B) -> Result<ByteStream> {
        self.docker
            .transport()
            .stream(
                Method::POST,
                &format!("/exec/{}/start", self.id),
                Payload::json(body)?,
                &[],
            )
            .await
    }

    /// `POST /exec/{id}/resize`.
    pub async fn resize(&self, opts: &ResizeOptions) -> Result<()> {
        self.docker
            .transport()
            .empty(
                Method::POST,
                &opts.path(&format!("/exec/{}", self.id)),
                Payload::Empty,
            )
            .await
    }

    /// `GET /exec/{id}/json`.
    pub async fn inspect(&self) -> Result<serde_json::Value> {
        self.docker
            .transport()
            .json(
                Method::GET,
                &format!("/exec/{}/json", self.id),
                Payload::Empty,
                &[],
            )
            .await
    }
}
