//! Image handle: calls under `/images/{name}`.

use hyper::Method;

use crate::auth::{AuthConfig, registry_headers};
use crate::docker::Docker;
use crate::error::Result;
use crate::query::{PushImageOptions, RemoveImageOptions, TagImageOptions};
use crate::stream::ByteStream;
use crate::transport::Payload;
use crate::types::{ImageHistoryEntry, RemovedImage};

/// An image on the daemon, addressed by id or `repo:tag`.
#[derive(Debug, Clone)]
pub struct Image {
    docker: Docker,
    name: String,
}

impl Image {
    pub(crate) fn new(docker: Docker, name: String) -> Self {
        Self { docker, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `GET /images/{name}/json`.
    pub async fn inspect(&self) -> Result<serde_json::Value> {
        self.docker
            .transport()
            .json(
                Method::GET,
                &format!("/images/{}/json", self.name),
                Payload::Empty,
                &[],
            )
            .await
    }

    /// `GET /images/{name}/history`.
    pub async fn history(&self) -> Result<Vec<ImageHistoryEntry>> {
        self.docker
            .transport()
            .json(
                Method::GET,
                &format!("/images/{}/history", self.name),
                Payload::Empty,
                &[],
            )
            .await
    }

    /// `POST /images/{name}/push`: Progress stream.
    pub async fn push(
        &self,
        auth: Option<&AuthConfig>,
        opts: &PushImageOptions,
    ) -> Result<ByteStream> {
        let headers = registry_headers(auth)?;
        self.docker
            .transport()
            .stream(Method::POST, &opts.path(&self.name), Payload::Empty, &headers)
            .await
    }

    /// `POST /images/{name}/tag`.
    pub async fn tag(&self, opts: &TagImageOptions) -> Result<()> {
        self.docker
            .transport()
            .empty(Method::POST, &opts.path(&self.name), Payload::Empty)
            .await
    }

    /// `DELETE /images/{name}`.
    pub async fn remove(&self, opts: &RemoveImageOptions) -> Result<Vec<RemovedImage>> {
        self.docker
            .transport()
            .json(Method::DELETE, &opts.path(&self.name), Payload::Empty, &[])
            .await
    }

    /// `GET /images/{name}/get`: Image tarball.
    pub async fn get(&self) -> Result<ByteStream> {
        self.docker
            .transport()
            .stream(
                Method::GET,
                &format!("/images/{}/get", self.name),
                Payload::Empty,
                &[],
            )
            .await
    }
}
