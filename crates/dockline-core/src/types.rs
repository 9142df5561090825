//! Request and response bodies for the endpoints the client models.
//!
//! Field names follow the daemon's JSON (mostly PascalCase). Responses keep
//! any fields not modelled here in an `extra` map so nothing the daemon sends
//! is lost. Very wide documents (`/info`, container/image inspect) are left
//! as [`serde_json::Value`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Request bodies ──────────────────────────────────────────────────────

/// Body for `POST /containers/create`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub env: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default)]
    pub tty: bool,
    #[serde(default)]
    pub attach_stdin: bool,
    #[serde(default)]
    pub attach_stdout: bool,
    #[serde(default)]
    pub attach_stderr: bool,
    #[serde(default)]
    pub open_stdin: bool,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub labels: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_config: Option<HostConfig>,
    /// Any other field the daemon accepts, passed through as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContainerConfig {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn with_cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = Some(cmd.into_iter().map(Into::into).collect());
        self
    }
}

/// `HostConfig` section of a create body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub binds: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    #[serde(default)]
    pub auto_remove: bool,
    #[serde(default)]
    pub privileged: bool,
    /// Memory limit in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_bindings: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body for `POST /containers/{id}/exec`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecConfig {
    pub cmd: Vec<String>,
    #[serde(default)]
    pub attach_stdin: bool,
    #[serde(default)]
    pub attach_stdout: bool,
    #[serde(default)]
    pub attach_stderr: bool,
    #[serde(default)]
    pub tty: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub env: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default)]
    pub privileged: bool,
}

/// Body for `POST /exec/{id}/start`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecStartConfig {
    pub detach: bool,
    pub tty: bool,
}

// ── Responses ───────────────────────────────────────────────────────────

/// `GET /version`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Version {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub api_version: String,
    #[serde(default, rename = "MinAPIVersion")]
    pub min_api_version: Option<String>,
    #[serde(default)]
    pub git_commit: Option<String>,
    #[serde(default)]
    pub go_version: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default)]
    pub kernel_version: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Entry of `GET /containers/json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    pub id: String,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub image: String,
    #[serde(default, rename = "ImageID")]
    pub image_id: Option<String>,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Entry of `GET /images/json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageSummary {
    pub id: String,
    #[serde(default)]
    pub parent_id: String,
    /// `null` for untagged images on some daemon versions.
    #[serde(default)]
    pub repo_tags: Option<Vec<String>>,
    #[serde(default)]
    pub repo_digests: Option<Vec<String>>,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ImageSummary {
    /// Whether `repo_tag` is one of this image's tags.
    pub fn has_tag(&self, repo_tag: &str) -> bool {
        self.repo_tags
            .as_deref()
            .is_some_and(|tags| tags.iter().any(|t| t == repo_tag))
    }
}

/// Entry of `GET /images/search`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResult {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub star_count: u64,
    #[serde(default)]
    pub is_official: bool,
    #[serde(default)]
    pub is_automated: bool,
}

/// `POST /containers/create`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateContainerResponse {
    pub id: String,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

/// `POST /containers/{id}/wait`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WaitResponse {
    pub status_code: i64,
    #[serde(default)]
    pub error: Option<WaitError>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WaitError {
    #[serde(default)]
    pub message: String,
}

/// `POST /containers/{id}/exec`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecCreateResponse {
    pub id: String,
}

/// `POST /auth`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuthResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub identity_token: Option<String>,
}

/// `GET /containers/{id}/top`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TopResponse {
    #[serde(default)]
    pub titles: Vec<String>,
    #[serde(default)]
    pub processes: Vec<Vec<String>>,
}

/// Entry of `GET /containers/{id}/changes`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerChange {
    pub path: String,
    /// 0 = modified, 1 = added, 2 = deleted.
    pub kind: u8,
}

/// Entry of `GET /images/{name}/history`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageHistoryEntry {
    pub id: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub comment: String,
}

/// Entry of `DELETE /images/{name}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemovedImage {
    #[serde(default)]
    pub untagged: Option<String>,
    #[serde(default)]
    pub deleted: Option<String>,
}

/// One document from `GET /events`.
///
/// Carries both the current (`Type`/`Action`/`Actor`) and the legacy
/// (`status`/`id`/`from`) fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Event {
    #[serde(default, rename = "Type")]
    pub kind: Option<String>,
    #[serde(default, rename = "Action")]
    pub action: Option<String>,
    #[serde(default, rename = "Actor")]
    pub actor: Option<EventActor>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub time: i64,
    #[serde(default, rename = "timeNano")]
    pub time_nano: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventActor {
    #[serde(default, rename = "ID")]
    pub id: String,
    #[serde(default, rename = "Attributes")]
    pub attributes: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_container_config_wire_names() {
        let mut cfg = ContainerConfig::new("ubuntu").with_cmd(["bash", "-c", "uname -a"]);
        cfg.attach_stdout = true;
        cfg.host_config = Some(HostConfig {
            auto_remove: true,
            ..Default::default()
        });
        cfg.extra
            .insert("StopSignal".to_string(), Value::from("SIGTERM"));

        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["Image"], "ubuntu");
        assert_eq!(json["Cmd"], serde_json::json!(["bash", "-c", "uname -a"]));
        assert_eq!(json["AttachStdout"], true);
        assert_eq!(json["HostConfig"]["AutoRemove"], true);
        assert_eq!(json["StopSignal"], "SIGTERM");
        assert!(json.get("Env").is_none());
        assert!(json.get("Entrypoint").is_none());
    }

    #[test]
    fn test_image_summary_null_tags() {
        let img: ImageSummary =
            serde_json::from_str(r#"{"Id":"sha256:1","RepoTags":null,"Containers":-1}"#).unwrap();
        assert!(!img.has_tag("ubuntu:latest"));
        assert_eq!(img.extra["Containers"], -1);
    }

    #[test]
    fn test_container_summary_image_id() {
        let c: ContainerSummary = serde_json::from_str(
            r#"{"Id":"abc","Names":["/web"],"Image":"nginx","ImageID":"sha256:f","Status":"Up"}"#,
        )
        .unwrap();
        assert_eq!(c.image_id.as_deref(), Some("sha256:f"));
        assert_eq!(c.names, vec!["/web".to_string()]);
    }

    #[test]
    fn test_event_current_and_legacy_fields() {
        let ev: Event = serde_json::from_str(
            r#"{"status":"start","id":"abc","from":"ubuntu","Type":"container","Action":"start",
                "Actor":{"ID":"abc","Attributes":{"image":"ubuntu"}},"scope":"local",
                "time":1700000000,"timeNano":1700000000000000000}"#,
        )
        .unwrap();
        assert_eq!(ev.kind.as_deref(), Some("container"));
        assert_eq!(ev.status.as_deref(), Some("start"));
        assert_eq!(ev.actor.unwrap().attributes["image"], "ubuntu");
    }

    #[test]
    fn test_wait_response_with_error() {
        let w: WaitResponse =
            serde_json::from_str(r#"{"StatusCode":137,"Error":{"Message":"killed"}}"#).unwrap();
        assert_eq!(w.status_code, 137);
        assert_eq!(w.error.unwrap().message, "killed");
    }
}
