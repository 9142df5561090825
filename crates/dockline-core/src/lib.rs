#![deny(unsafe_code)]

//! Dockline: a client for the Docker Engine remote API.
//!
//! Each method maps to one daemon endpoint: parameters become the query
//! string or JSON body the daemon expects, and the response comes back either
//! decoded or as a live [`ByteStream`]. The daemon owns all state; the client
//! keeps nothing between calls.
//!
//! ```no_run
//! # async fn demo() -> dockline_core::Result<()> {
//! use dockline_core::{Docker, ListContainersOptions};
//!
//! let docker = Docker::connect_with_unix("/var/run/docker.sock");
//! let containers = docker
//!     .list_containers(&ListContainersOptions { all: true, ..Default::default() })
//!     .await?;
//! println!("{} containers", containers.len());
//! # Ok(())
//! # }
//! ```

/// Registry credentials and the `X-Registry-Auth` header.
pub mod auth;
/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Container handle.
pub mod container;
/// The client and its top-level endpoints.
pub mod docker;
/// Client error type.
pub mod error;
/// Exec instance handle.
pub mod exec;
/// Image handle.
pub mod image;
/// Query-string option structs.
pub mod query;
/// Streaming bodies, stdout/stderr demultiplexing, JSON document streams.
pub mod stream;
/// Request and response bodies.
pub mod types;

mod transport;

pub use auth::AuthConfig;
pub use container::Container;
pub use docker::{Docker, RunOptions};
pub use error::{Error, Result};
pub use exec::Exec;
pub use image::Image;
pub use query::*;
pub use stream::{ByteStream, JsonStream, LogOutput, ProgressMessage};

pub use dockline_config::DockerHost;
