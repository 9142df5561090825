//! Query-string options for daemon endpoints.
//!
//! Each options struct renders itself with the daemon's own parameter names.
//! Legacy flags (`all`, `size`, `q`, `nocache`, `rm`, ...) are sent as
//! `1`/`0`; parameters the daemon documents as booleans are sent as
//! `true`/`false`.

use std::collections::BTreeMap;

use url::form_urlencoded;

/// Filter map sent as the JSON-encoded `filters` parameter.
pub type Filters = BTreeMap<String, Vec<String>>;

/// Form-urlencoded query builder.
pub(crate) struct Query {
    ser: form_urlencoded::Serializer<'static, String>,
    empty: bool,
}

impl Query {
    pub(crate) fn new() -> Self {
        Self {
            ser: form_urlencoded::Serializer::new(String::new()),
            empty: true,
        }
    }

    pub(crate) fn push(&mut self, key: &str, value: impl AsRef<str>) -> &mut Self {
        self.ser.append_pair(key, value.as_ref());
        self.empty = false;
        self
    }

    pub(crate) fn push_opt<V: ToString>(&mut self, key: &str, value: Option<V>) -> &mut Self {
        if let Some(v) = value {
            self.push(key, v.to_string());
        }
        self
    }

    /// `1`/`0` flag.
    pub(crate) fn flag(&mut self, key: &str, value: bool) -> &mut Self {
        self.push(key, if value { "1" } else { "0" })
    }

    /// `true`/`false` boolean.
    pub(crate) fn boolean(&mut self, key: &str, value: bool) -> &mut Self {
        self.push(key, if value { "true" } else { "false" })
    }

    pub(crate) fn filters(&mut self, filters: &Filters) -> &mut Self {
        if !filters.is_empty() {
            // A BTreeMap of string vectors always serializes.
            let encoded = serde_json::to_string(filters).unwrap_or_default();
            self.push("filters", encoded);
        }
        self
    }

    /// Append the query to `path`, omitting `?` when there are no parameters.
    pub(crate) fn to_path(mut self, path: &str) -> String {
        if self.empty {
            path.to_string()
        } else {
            format!("{path}?{}", self.ser.finish())
        }
    }
}

/// Options for `GET /containers/json`.
#[derive(Debug, Clone, Default)]
pub struct ListContainersOptions {
    /// Include stopped containers.
    pub all: bool,
    pub limit: Option<u64>,
    /// Report container sizes.
    pub size: bool,
    pub since: Option<String>,
    pub before: Option<String>,
    pub filters: Filters,
}

impl ListContainersOptions {
    pub(crate) fn path(&self) -> String {
        let mut q = Query::new();
        q.flag("all", self.all)
            .push_opt("limit", self.limit)
            .flag("size", self.size)
            .push_opt("since", self.since.as_deref())
            .push_opt("before", self.before.as_deref())
            .filters(&self.filters);
        q.to_path("/containers/json")
    }
}

/// Options for `GET /images/json`.
#[derive(Debug, Clone, Default)]
pub struct ListImagesOptions {
    /// Include intermediate layers.
    pub all: bool,
    pub digests: bool,
    pub filters: Filters,
}

impl ListImagesOptions {
    pub(crate) fn path(&self) -> String {
        let mut q = Query::new();
        q.flag("all", self.all).filters(&self.filters);
        if self.digests {
            q.flag("digests", true);
        }
        q.to_path("/images/json")
    }
}

/// Options for `POST /build`.
#[derive(Debug, Clone)]
pub struct BuildImageOptions {
    /// Repository name and optional tag for the result (`name:tag`).
    pub t: Option<String>,
    /// Dockerfile path within the build context.
    pub dockerfile: Option<String>,
    /// Suppress verbose build output.
    pub q: bool,
    pub nocache: bool,
    /// Remove intermediate containers after a successful build.
    pub rm: bool,
    /// Always remove intermediate containers.
    pub forcerm: bool,
    /// Always attempt to pull a newer base image.
    pub pull: bool,
    pub buildargs: BTreeMap<String, String>,
}

impl Default for BuildImageOptions {
    fn default() -> Self {
        Self {
            t: None,
            dockerfile: None,
            q: false,
            nocache: false,
            rm: true,
            forcerm: false,
            pull: false,
            buildargs: BTreeMap::new(),
        }
    }
}

impl BuildImageOptions {
    pub(crate) fn path(&self) -> String {
        let mut q = Query::new();
        q.push_opt("t", self.t.as_deref())
            .push_opt("dockerfile", self.dockerfile.as_deref())
            .flag("q", self.q)
            .flag("nocache", self.nocache)
            .flag("rm", self.rm)
            .flag("forcerm", self.forcerm)
            .flag("pull", self.pull);
        if !self.buildargs.is_empty() {
            let encoded = serde_json::to_string(&self.buildargs).unwrap_or_default();
            q.push("buildargs", encoded);
        }
        q.to_path("/build")
    }
}

/// Options for `POST /images/create` (pull or import).
#[derive(Debug, Clone, Default)]
pub struct CreateImageOptions {
    /// Image to pull.
    pub from_image: Option<String>,
    /// Source to import (`-` for the request body, or a URL).
    pub from_src: Option<String>,
    pub repo: Option<String>,
    pub tag: Option<String>,
    pub platform: Option<String>,
}

impl CreateImageOptions {
    pub(crate) fn path(&self) -> String {
        let mut q = Query::new();
        q.push_opt("fromImage", self.from_image.as_deref())
            .push_opt("fromSrc", self.from_src.as_deref())
            .push_opt("repo", self.repo.as_deref())
            .push_opt("tag", self.tag.as_deref())
            .push_opt("platform", self.platform.as_deref());
        q.to_path("/images/create")
    }
}

/// Options for `GET /images/search`.
#[derive(Debug, Clone, Default)]
pub struct SearchImagesOptions {
    pub term: String,
    pub limit: Option<u64>,
    pub filters: Filters,
}

impl SearchImagesOptions {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            ..Default::default()
        }
    }

    pub(crate) fn path(&self) -> String {
        let mut q = Query::new();
        q.push("term", &self.term)
            .push_opt("limit", self.limit)
            .filters(&self.filters);
        q.to_path("/images/search")
    }
}

/// Options for `GET /events`.
#[derive(Debug, Clone, Default)]
pub struct EventsOptions {
    /// Unix timestamp (or RFC 3339) to replay events from.
    pub since: Option<String>,
    pub until: Option<String>,
    pub filters: Filters,
}

impl EventsOptions {
    pub(crate) fn path(&self) -> String {
        let mut q = Query::new();
        q.push_opt("since", self.since.as_deref())
            .push_opt("until", self.until.as_deref())
            .filters(&self.filters);
        q.to_path("/events")
    }
}

/// Options for `GET /containers/{id}/logs`.
#[derive(Debug, Clone)]
pub struct LogsOptions {
    pub follow: bool,
    pub stdout: bool,
    pub stderr: bool,
    pub timestamps: bool,
    /// Only return logs since this Unix timestamp.
    pub since: Option<i64>,
    /// Number of lines from the end, or `"all"`.
    pub tail: Option<String>,
}

impl Default for LogsOptions {
    fn default() -> Self {
        Self {
            follow: false,
            stdout: true,
            stderr: true,
            timestamps: false,
            since: None,
            tail: None,
        }
    }
}

impl LogsOptions {
    pub(crate) fn path(&self, id: &str) -> String {
        let mut q = Query::new();
        q.boolean("follow", self.follow)
            .boolean("stdout", self.stdout)
            .boolean("stderr", self.stderr)
            .boolean("timestamps", self.timestamps)
            .push_opt("since", self.since)
            .push_opt("tail", self.tail.as_deref());
        q.to_path(&format!("/containers/{id}/logs"))
    }
}

/// Options for `POST /containers/{id}/attach`.
#[derive(Debug, Clone, Default)]
pub struct AttachOptions {
    /// Replay previous output.
    pub logs: bool,
    /// Keep streaming until the container exits.
    pub stream: bool,
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: bool,
    pub detach_keys: Option<String>,
}

impl AttachOptions {
    /// Live stdout and stderr, the shape `run` uses.
    pub fn output() -> Self {
        Self {
            stream: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        }
    }

    pub(crate) fn path(&self, id: &str) -> String {
        let mut q = Query::new();
        q.flag("logs", self.logs)
            .flag("stream", self.stream)
            .flag("stdin", self.stdin)
            .flag("stdout", self.stdout)
            .flag("stderr", self.stderr)
            .push_opt("detachKeys", self.detach_keys.as_deref());
        q.to_path(&format!("/containers/{id}/attach"))
    }
}

/// Options for `DELETE /containers/{id}`.
#[derive(Debug, Clone, Default)]
pub struct RemoveContainerOptions {
    /// Remove anonymous volumes too.
    pub v: bool,
    /// Kill the container first if it is running.
    pub force: bool,
    pub link: bool,
}

impl RemoveContainerOptions {
    pub(crate) fn path(&self, id: &str) -> String {
        let mut q = Query::new();
        q.boolean("v", self.v)
            .boolean("force", self.force)
            .boolean("link", self.link);
        q.to_path(&format!("/containers/{id}"))
    }
}

/// Options for `DELETE /images/{name}`.
#[derive(Debug, Clone, Default)]
pub struct RemoveImageOptions {
    pub force: bool,
    pub noprune: bool,
}

impl RemoveImageOptions {
    pub(crate) fn path(&self, name: &str) -> String {
        let mut q = Query::new();
        q.boolean("force", self.force)
            .boolean("noprune", self.noprune);
        q.to_path(&format!("/images/{name}"))
    }
}

/// Options for `POST /images/{name}/tag`.
#[derive(Debug, Clone, Default)]
pub struct TagImageOptions {
    pub repo: String,
    pub tag: Option<String>,
    /// Accepted by older daemons only.
    pub force: bool,
}

impl TagImageOptions {
    pub(crate) fn path(&self, name: &str) -> String {
        let mut q = Query::new();
        q.push("repo", &self.repo).push_opt("tag", self.tag.as_deref());
        if self.force {
            q.flag("force", true);
        }
        q.to_path(&format!("/images/{name}/tag"))
    }
}

/// Options for `POST /images/{name}/push`.
#[derive(Debug, Clone, Default)]
pub struct PushImageOptions {
    pub tag: Option<String>,
}

impl PushImageOptions {
    pub(crate) fn path(&self, name: &str) -> String {
        let mut q = Query::new();
        q.push_opt("tag", self.tag.as_deref());
        q.to_path(&format!("/images/{name}/push"))
    }
}

/// Options for `POST /commit`.
#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    pub repo: Option<String>,
    pub tag: Option<String>,
    pub comment: Option<String>,
    pub author: Option<String>,
    /// Pause the container while committing (daemon default: true).
    pub pause: Option<bool>,
}

impl CommitOptions {
    pub(crate) fn path(&self, container: &str) -> String {
        let mut q = Query::new();
        q.push("container", container)
            .push_opt("repo", self.repo.as_deref())
            .push_opt("tag", self.tag.as_deref())
            .push_opt("comment", self.comment.as_deref())
            .push_opt("author", self.author.as_deref())
            .push_opt("pause", self.pause);
        q.to_path("/commit")
    }
}

/// Terminal size for `resize` calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResizeOptions {
    pub height: u32,
    pub width: u32,
}

impl ResizeOptions {
    pub(crate) fn path(&self, base: &str) -> String {
        let mut q = Query::new();
        q.push("h", self.height.to_string())
            .push("w", self.width.to_string());
        q.to_path(&format!("{base}/resize"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_query_has_no_question_mark() {
        assert_eq!(Query::new().to_path("/info"), "/info");
    }

    #[test]
    fn test_list_containers_all() {
        let opts = ListContainersOptions {
            all: true,
            ..Default::default()
        };
        assert_eq!(opts.path(), "/containers/json?all=1&size=0");
    }

    #[test]
    fn test_list_containers_filters_encoded() {
        let mut filters = Filters::new();
        filters.insert("status".to_string(), vec!["running".to_string()]);
        let opts = ListContainersOptions {
            limit: Some(5),
            filters,
            ..Default::default()
        };
        assert_eq!(
            opts.path(),
            "/containers/json?all=0&limit=5&size=0&filters=%7B%22status%22%3A%5B%22running%22%5D%7D"
        );
    }

    #[test]
    fn test_build_defaults() {
        let opts = BuildImageOptions {
            t: Some("app:dev".to_string()),
            ..Default::default()
        };
        assert_eq!(
            opts.path(),
            "/build?t=app%3Adev&q=0&nocache=0&rm=1&forcerm=0&pull=0"
        );
    }

    #[test]
    fn test_create_image_names() {
        let opts = CreateImageOptions {
            from_image: Some("ubuntu".to_string()),
            tag: Some("22.04".to_string()),
            ..Default::default()
        };
        assert_eq!(opts.path(), "/images/create?fromImage=ubuntu&tag=22.04");
    }

    #[test]
    fn test_search_term() {
        let opts = SearchImagesOptions::new("node js");
        assert_eq!(opts.path(), "/images/search?term=node+js");
    }

    #[test]
    fn test_events_since() {
        let opts = EventsOptions {
            since: Some("1700000000".to_string()),
            ..Default::default()
        };
        assert_eq!(opts.path(), "/events?since=1700000000");
    }

    #[test]
    fn test_attach_output() {
        assert_eq!(
            AttachOptions::output().path("abc"),
            "/containers/abc/attach?logs=0&stream=1&stdin=0&stdout=1&stderr=1"
        );
    }

    #[test]
    fn test_logs_defaults() {
        let opts = LogsOptions {
            tail: Some("10".to_string()),
            ..Default::default()
        };
        assert_eq!(
            opts.path("abc"),
            "/containers/abc/logs?follow=false&stdout=true&stderr=true&timestamps=false&tail=10"
        );
    }

    #[test]
    fn test_remove_container_force() {
        let opts = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        assert_eq!(opts.path("abc"), "/containers/abc?v=false&force=true&link=false");
    }

    #[test]
    fn test_commit_container_param() {
        let opts = CommitOptions {
            repo: Some("snap".to_string()),
            pause: Some(false),
            ..Default::default()
        };
        assert_eq!(
            opts.path("abc"),
            "/commit?container=abc&repo=snap&pause=false"
        );
    }

    #[test]
    fn test_resize_path() {
        let opts = ResizeOptions {
            height: 40,
            width: 120,
        };
        assert_eq!(opts.path("/exec/e1"), "/exec/e1/resize?h=40&w=120");
    }

    #[test]
    fn test_tag_image() {
        let opts = TagImageOptions {
            repo: "registry.local/app".to_string(),
            tag: Some("v2".to_string()),
            force: false,
        };
        assert_eq!(
            opts.path("app:v1"),
            "/images/app:v1/tag?repo=registry.local%2Fapp&tag=v2"
        );
    }
}
