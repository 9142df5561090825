#![deny(unsafe_code)]

//! Dockline CLI: talk to a Docker daemon from the command line.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dockline_config::AppConfig;
use dockline_core::{
    AuthConfig, BuildImageOptions, ByteStream, Docker, EventsOptions, ListContainersOptions,
    ListImagesOptions, LogsOptions, RemoveContainerOptions, RemoveImageOptions, RunOptions,
    SearchImagesOptions,
};

/// Dockline: a thin client for the Docker Engine API.
#[derive(Parser)]
#[command(name = "dockline", version = dockline_core::build_info::VERSION, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "dockline.toml")]
    config: PathBuf,

    /// Daemon address, overriding config and DOCKER_HOST.
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the daemon answers.
    Ping,

    /// Show client and daemon versions.
    Version,

    /// Show daemon-wide information.
    Info,

    /// List containers.
    Ps {
        /// Include stopped containers.
        #[arg(short, long)]
        all: bool,
    },

    /// List images.
    Images {
        /// Include intermediate layers.
        #[arg(short, long)]
        all: bool,
    },

    /// Search the registry for images.
    Search { term: String },

    /// Pull an image (`repo[:tag]`).
    Pull { image: String },

    /// Build an image from a tar build context.
    Build {
        /// Tar archive containing a Dockerfile.
        context: PathBuf,

        /// Name and optional tag for the result.
        #[arg(short, long)]
        tag: Option<String>,
    },

    /// Stream daemon events until interrupted.
    Events {
        /// Replay events since this timestamp.
        #[arg(long)]
        since: Option<String>,
    },

    /// Create, start and wait for a container, streaming its output.
    Run {
        image: String,

        /// Command to run.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        cmd: Vec<String>,

        /// Allocate a pseudo-TTY.
        #[arg(short, long)]
        tty: bool,
    },

    /// Remove a container.
    Rm {
        id: String,

        /// Kill the container first if it is running.
        #[arg(short, long)]
        force: bool,
    },

    /// Remove an image.
    Rmi {
        image: String,

        #[arg(short, long)]
        force: bool,
    },

    /// Print a container's logs.
    Logs { id: String },

    /// Show a container's low-level details.
    Inspect { id: String },

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config, cli.host.as_deref()).await?;

    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let docker = Docker::from_config(&config)?;
    let auth = config.auth.as_ref().map(AuthConfig::from);

    match cli.command {
        Commands::Ping => {
            docker.ping().await?;
            println!("OK");
        }
        Commands::Version => cmd_version(&docker).await?,
        Commands::Info => print_json(&docker.info().await?)?,
        Commands::Ps { all } => cmd_ps(&docker, all).await?,
        Commands::Images { all } => cmd_images(&docker, all).await?,
        Commands::Search { term } => cmd_search(&docker, term).await?,
        Commands::Pull { image } => {
            let stream = docker.pull(&image, auth.as_ref()).await?;
            print_progress(stream).await?;
        }
        Commands::Build { context, tag } => {
            let opts = BuildImageOptions {
                t: tag,
                ..Default::default()
            };
            let stream = docker.build_image_from_file(&context, &opts).await?;
            print_progress(stream).await?;
        }
        Commands::Events { since } => cmd_events(&docker, since).await?,
        Commands::Run { image, cmd, tty } => {
            let code = cmd_run(&docker, image, cmd, tty).await?;
            if code != 0 {
                std::process::exit(i32::try_from(code).unwrap_or(1));
            }
        }
        Commands::Rm { id, force } => {
            let opts = RemoveContainerOptions {
                force,
                ..Default::default()
            };
            docker.get_container(&id).remove(&opts).await?;
            println!("{id}");
        }
        Commands::Rmi { image, force } => {
            let opts = RemoveImageOptions {
                force,
                ..Default::default()
            };
            for removed in docker.get_image(image).remove(&opts).await? {
                if let Some(tag) = removed.untagged {
                    println!("Untagged: {tag}");
                }
                if let Some(id) = removed.deleted {
                    println!("Deleted: {id}");
                }
            }
        }
        Commands::Logs { id } => {
            let mut stdout = tokio::io::stdout();
            let mut stderr = tokio::io::stderr();
            docker
                .get_container(id)
                .write_logs(&LogsOptions::default(), &mut stdout, &mut stderr)
                .await?;
        }
        Commands::Inspect { id } => print_json(&docker.get_container(id).inspect().await?)?,
        Commands::Config { show } => cmd_config(&cli.config, &config, show)?,
    }

    Ok(())
}

async fn cmd_version(docker: &Docker) -> Result<()> {
    println!("Client: {}", dockline_core::build_info::version_string());
    let version = docker.version().await?;
    println!(
        "Server: {} (API {}, {}/{})",
        version.version,
        version.api_version,
        version.os.as_deref().unwrap_or("?"),
        version.arch.as_deref().unwrap_or("?"),
    );
    Ok(())
}

async fn cmd_ps(docker: &Docker, all: bool) -> Result<()> {
    let opts = ListContainersOptions {
        all,
        ..Default::default()
    };
    println!("{:<14} {:<28} {:<20} STATUS", "CONTAINER ID", "IMAGE", "NAMES");
    for c in docker.list_containers(&opts).await? {
        let names: Vec<&str> = c.names.iter().map(|n| n.trim_start_matches('/')).collect();
        println!(
            "{:<14} {:<28} {:<20} {}",
            short_id(&c.id),
            c.image,
            names.join(","),
            c.status
        );
    }
    Ok(())
}

async fn cmd_images(docker: &Docker, all: bool) -> Result<()> {
    let opts = ListImagesOptions {
        all,
        ..Default::default()
    };
    println!("{:<40} {:<14} SIZE", "REPOSITORY:TAG", "IMAGE ID");
    for image in docker.list_images(&opts).await? {
        let tags = image.repo_tags.clone().unwrap_or_default();
        let id = short_id(image.id.trim_start_matches("sha256:"));
        if tags.is_empty() {
            println!("{:<40} {:<14} {}", "<none>:<none>", id, image.size);
        }
        for tag in tags {
            println!("{:<40} {:<14} {}", tag, id, image.size);
        }
    }
    Ok(())
}

async fn cmd_search(docker: &Docker, term: String) -> Result<()> {
    let results = docker
        .search_images(&SearchImagesOptions::new(term))
        .await?;
    println!("{:<40} {:>6}  {:<8} DESCRIPTION", "NAME", "STARS", "OFFICIAL");
    for r in results {
        println!(
            "{:<40} {:>6}  {:<8} {}",
            r.name,
            r.star_count,
            if r.is_official { "[OK]" } else { "" },
            r.description
        );
    }
    Ok(())
}

async fn cmd_events(docker: &Docker, since: Option<String>) -> Result<()> {
    let opts = EventsOptions {
        since,
        ..Default::default()
    };
    let mut events = docker.get_events(&opts).await?;
    while let Some(event) = events.next().await {
        let event = event?;
        let actor = event.actor.as_ref().map_or("", |a| a.id.as_str());
        println!(
            "{} {} {} {}",
            event.time,
            event.kind.as_deref().unwrap_or("-"),
            event.action.as_deref().or(event.status.as_deref()).unwrap_or("-"),
            short_id(actor)
        );
    }
    Ok(())
}

async fn cmd_run(docker: &Docker, image: String, cmd: Vec<String>, tty: bool) -> Result<i64> {
    let opts = RunOptions::new(image, cmd).with_tty(tty);
    // The container may outlive any per-call deadline.
    let docker = docker.clone().with_timeout(None);
    let mut stdout = tokio::io::stdout();
    let mut stderr = tokio::io::stderr();
    let (status, container) = docker.run(opts, &mut stdout, &mut stderr).await?;
    stdout.flush().await?;

    if let Some(err) = status.error {
        bail!("container {} failed: {}", container.id(), err.message);
    }
    info!(id = %container.id(), code = status.status_code, "run finished");
    Ok(status.status_code)
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    if show {
        println!("{}", render_config(config)?);
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

/// Resolved configuration as TOML; the registry password is redacted.
fn render_config(config: &AppConfig) -> Result<String> {
    toml::to_string_pretty(config).context("failed to render configuration")
}

/// Print each progress line; fail on the first in-band error.
async fn print_progress(stream: ByteStream) -> Result<()> {
    let mut messages = stream.progress();
    while let Some(message) = messages.next().await {
        let message = message?.into_result()?;
        if let Some(text) = &message.stream {
            print!("{text}");
            continue;
        }
        match (&message.id, &message.status, &message.progress) {
            (Some(id), Some(status), Some(progress)) => println!("{id}: {status} {progress}"),
            (Some(id), Some(status), None) => println!("{id}: {status}"),
            (None, Some(status), _) => println!("{status}"),
            _ => {}
        }
    }
    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

/// Config file (or defaults), then environment, then `--host`.
async fn load_config(path: &Path, host: Option<&str>) -> Result<AppConfig> {
    let mut config = if path.exists() {
        AppConfig::load(path)
            .await
            .with_context(|| format!("failed to load {}", path.display()))?
    } else {
        AppConfig::default()
    };
    config.apply_env()?;
    if let Some(host) = host {
        config.docker.host = host.to_string();
        config.validate()?;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_collects_trailing_command() {
        let cli = Cli::try_parse_from(["dockline", "run", "--tty", "ubuntu", "bash", "-c", "ls -l"])
            .unwrap();
        match cli.command {
            Commands::Run { image, cmd, tty } => {
                assert_eq!(image, "ubuntu");
                assert_eq!(cmd, vec!["bash", "-c", "ls -l"]);
                assert!(tty);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_global_host_flag() {
        let cli = Cli::try_parse_from(["dockline", "-H", "tcp://10.0.0.2:2375", "ping"]).unwrap();
        assert_eq!(cli.host.as_deref(), Some("tcp://10.0.0.2:2375"));
        assert_eq!(cli.config, PathBuf::from("dockline.toml"));
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn test_config_show_hides_password() {
        let config = AppConfig::parse(
            "[auth]\nusername = \"alice\"\npassword = \"s3cret-pw\"\n",
        )
        .unwrap();
        let shown = render_config(&config).unwrap();
        assert!(shown.contains("username = \"alice\""));
        assert!(!shown.contains("s3cret-pw"));
    }

    #[tokio::test]
    async fn test_load_config_host_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dockline.toml");
        std::fs::write(&path, "[docker]\nhost = \"unix:///tmp/a.sock\"\n").unwrap();

        let config = load_config(&path, Some("tcp://127.0.0.1:2375")).await.unwrap();
        assert_eq!(config.docker.host, "tcp://127.0.0.1:2375");
    }

    #[tokio::test]
    async fn test_load_config_rejects_bad_host_override() {
        let missing = Path::new("/nonexistent/dockline.toml");
        assert!(load_config(missing, Some("ftp://nope")).await.is_err());
    }
}
