//! DockDeck CLI - Command-line interface for the DockDeck orchestrator
//!
//! Manages containers, images, volumes, networks and compose stacks over the
//! orchestrator REST API

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

/// DockDeck CLI - Manage a container host
#[derive(Parser)]
#[command(name = "dockdeck")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CLI for the DockDeck container host manager", long_about = None)]
struct Cli {
    /// DockDeck API URL
    #[arg(short, long, default_value = "http://127.0.0.1:8080", env = "DOCKDECK_URL")]
    api_url: String,

    /// Print raw JSON responses
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Get server health status
    Health,

    /// List containers
    Ps {
        /// Include stopped containers
        #[arg(short, long)]
        all: bool,
    },

    /// Start a container
    Start { id: String },

    /// Stop a container
    Stop { id: String },

    /// Restart a container
    Restart { id: String },

    /// Remove a container
    Rm {
        id: String,

        /// Kill the container first if it is running
        #[arg(short, long)]
        force: bool,
    },

    /// Show CPU and memory usage of a container
    Stats { id: String },

    /// List images
    Images,

    /// Pull an image (`name[:tag]`)
    Pull { image: String },

    /// List volumes
    Volumes,

    /// List networks
    Networks,

    /// List active terminal sessions
    Sessions,

    /// Run compose documents
    Compose {
        #[command(subcommand)]
        action: ComposeAction,
    },
}

#[derive(Subcommand)]
enum ComposeAction {
    /// Start the stack (`up -d`)
    Up { file: PathBuf },

    /// Stop and remove the stack
    Down { file: PathBuf },

    /// List services declared in the file
    Services { file: PathBuf },
}

/// Non-success response from the orchestrator
#[derive(Debug, Error)]
#[error("{status} {code}: {message}")]
struct ApiFailure {
    status: u16,
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    active_sessions: u64,
    docker_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContainerRow {
    id: String,
    name: String,
    image: String,
    state: String,
    status: String,
    #[serde(default)]
    ports: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StatsRow {
    container_id: String,
    cpu: String,
    memory: String,
}

#[derive(Debug, Deserialize)]
struct ComposeOutput {
    success: bool,
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
}

/// Blocking client for the orchestrator API
struct Api {
    client: Client,
    base: String,
}

impl Api {
    fn new(base: &str) -> Self {
        Self {
            client: Client::new(),
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().context("Failed to send request")?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(failure(status.as_u16(), &text).into());
        }

        response.json().context("Failed to parse response")
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.client.get(self.url(path)))
    }

    fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        self.send(self.client.post(self.url(path)).json(body))
    }

    fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.client.delete(self.url(path)))
    }
}

/// Build an error from a failed response body, falling back to the raw text
fn failure(status: u16, body: &str) -> ApiFailure {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => ApiFailure {
            status,
            code: parsed.error,
            message: parsed.message,
        },
        Err(_) => ApiFailure {
            status,
            code: "UNKNOWN".to_string(),
            message: if body.is_empty() {
                "Unknown error".to_string()
            } else {
                body.to_string()
            },
        },
    }
}

fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes.max(0) as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes.max(0), UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

fn short_id(id: &str) -> &str {
    let id = id.trim_start_matches("sha256:");
    &id[..id.len().min(12)]
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_compose(file: &PathBuf) -> Result<Value> {
    let yaml = fs::read_to_string(file)
        .with_context(|| format!("Failed to read compose file: {}", file.display()))?;
    Ok(json!({ "yaml": yaml }))
}

fn lifecycle(api: &Api, id: &str, action: &str, done: &str) -> Result<()> {
    let _: Value = api.post(&format!("/api/v1/containers/{}/{}", id, action), &json!({}))?;
    println!("{} {}", format!("✓ {}:", done).green(), id);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let api = Api::new(&cli.api_url);

    match cli.command {
        Commands::Health => {
            let health: Value = api.get("/health")?;
            if cli.json {
                return print_json(&health);
            }
            let health: HealthResponse = serde_json::from_value(health)?;

            println!("{}", "DockDeck Orchestrator Status".bright_cyan().bold());
            println!("{}", "=".repeat(40).bright_blue());
            println!(
                "{} {}",
                "Status:".cyan(),
                if health.status == "healthy" {
                    health.status.green()
                } else {
                    health.status.yellow()
                }
            );
            println!("{} {}", "Version:".cyan(), health.version);
            println!("{} {}s", "Uptime:".cyan(), health.uptime_seconds);
            println!("{} {}", "Terminal Sessions:".cyan(), health.active_sessions);
            println!(
                "{} {}",
                "Docker:".cyan(),
                health.docker_version.as_deref().unwrap_or("unreachable")
            );
        }

        Commands::Ps { all } => {
            let path = format!("/api/v1/containers?all={}", all);
            let containers: Value = api.get(&path)?;
            if cli.json {
                return print_json(&containers);
            }
            let containers: Vec<ContainerRow> = serde_json::from_value(containers)?;

            println!(
                "{:<14} {:<24} {:<28} {:<10} {}",
                "ID".bold(),
                "NAME".bold(),
                "IMAGE".bold(),
                "STATE".bold(),
                "PORTS".bold()
            );
            for c in containers {
                let state = if c.state == "running" {
                    c.state.green()
                } else {
                    c.state.yellow()
                };
                println!(
                    "{:<14} {:<24} {:<28} {:<10} {}",
                    short_id(&c.id),
                    c.name,
                    c.image,
                    state,
                    c.ports.join(", ")
                );
                if !c.status.is_empty() {
                    println!("{:<14} {}", "", c.status.dimmed());
                }
            }
        }

        Commands::Start { id } => lifecycle(&api, &id, "start", "Started")?,
        Commands::Stop { id } => lifecycle(&api, &id, "stop", "Stopped")?,
        Commands::Restart { id } => lifecycle(&api, &id, "restart", "Restarted")?,

        Commands::Rm { id, force } => {
            let _: Value = api.delete(&format!("/api/v1/containers/{}?force={}", id, force))?;
            println!("{} {}", "✓ Removed:".green(), id);
        }

        Commands::Stats { id } => {
            let stats: Value = api.get(&format!("/api/v1/containers/{}/stats", id))?;
            if cli.json {
                return print_json(&stats);
            }
            let stats: StatsRow = serde_json::from_value(stats)?;
            println!("{} {}", "Container:".cyan(), stats.container_id);
            println!("{} {}", "CPU:".cyan(), stats.cpu);
            println!("{} {}", "Memory:".cyan(), stats.memory);
        }

        Commands::Images => {
            let images: Value = api.get("/api/v1/images")?;
            if cli.json {
                return print_json(&images);
            }
            println!("{}", "Images:".bright_cyan().bold());
            for image in images.as_array().context("Invalid response")? {
                let id = image["id"].as_str().unwrap_or("?");
                let tags: Vec<&str> = image["tags"]
                    .as_array()
                    .map(|tags| tags.iter().filter_map(|t| t.as_str()).collect())
                    .unwrap_or_default();
                let size = image["size_bytes"].as_i64().unwrap_or(0);
                let tags = if tags.is_empty() {
                    "<none>".to_string()
                } else {
                    tags.join(", ")
                };
                println!("  {} {} ({})", short_id(id), tags, format_bytes(size));
            }
        }

        Commands::Pull { image } => {
            println!("{} {}", "Pulling".cyan(), image);
            let _: Value = api.post("/api/v1/images/pull", &json!({ "image": image }))?;
            println!("{} {}", "✓ Pulled:".green(), image);
        }

        Commands::Volumes => {
            let volumes: Value = api.get("/api/v1/volumes")?;
            if cli.json {
                return print_json(&volumes);
            }
            println!("{}", "Volumes:".bright_cyan().bold());
            for volume in volumes.as_array().context("Invalid response")? {
                println!(
                    "  {} [{}] {}",
                    volume["name"].as_str().unwrap_or("?"),
                    volume["driver"].as_str().unwrap_or("?"),
                    volume["mountpoint"].as_str().unwrap_or("").dimmed()
                );
            }
        }

        Commands::Networks => {
            let networks: Value = api.get("/api/v1/networks")?;
            if cli.json {
                return print_json(&networks);
            }
            println!("{}", "Networks:".bright_cyan().bold());
            for network in networks.as_array().context("Invalid response")? {
                println!(
                    "  {} {} [{} / {}]",
                    short_id(network["id"].as_str().unwrap_or("?")),
                    network["name"].as_str().unwrap_or("?"),
                    network["driver"].as_str().unwrap_or("?"),
                    network["scope"].as_str().unwrap_or("?")
                );
            }
        }

        Commands::Sessions => {
            let sessions: Value = api.get("/api/v1/sessions")?;
            if cli.json {
                return print_json(&sessions);
            }
            let list = sessions["sessions"].as_array().context("Invalid response")?;
            if list.is_empty() {
                println!("{}", "No active terminal sessions".yellow());
            }
            for session in list {
                println!(
                    "  {} {} {} {}",
                    session["connection_id"].as_str().unwrap_or("?"),
                    session["container_id"].as_str().unwrap_or("?").bright_white(),
                    short_id(session["exec_id"].as_str().unwrap_or("?")),
                    session["created_at"].as_str().unwrap_or("").dimmed()
                );
            }
        }

        Commands::Compose { action } => match action {
            ComposeAction::Services { file } => {
                let services: Value = api.post("/api/v1/compose/services", &read_compose(&file)?)?;
                if cli.json {
                    return print_json(&services);
                }
                for service in services["services"].as_array().context("Invalid response")? {
                    println!("  {}", service.as_str().unwrap_or("?"));
                }
            }
            ComposeAction::Up { file } => compose_run(&api, "up", &file, cli.json)?,
            ComposeAction::Down { file } => compose_run(&api, "down", &file, cli.json)?,
        },
    }

    Ok(())
}

/// Run `docker compose up|down` on the server and relay its output
fn compose_run(api: &Api, verb: &str, file: &PathBuf, raw: bool) -> Result<()> {
    let output: Value = api.post(&format!("/api/v1/compose/{}", verb), &read_compose(file)?)?;
    if raw {
        return print_json(&output);
    }
    let output: ComposeOutput = serde_json::from_value(output)?;

    if !output.stdout.is_empty() {
        println!("{}", output.stdout);
    }
    if !output.stderr.is_empty() {
        eprintln!("{}", output.stderr);
    }
    if !output.success {
        anyhow::bail!(
            "docker compose {} failed (exit code {:?})",
            verb,
            output.exit_code
        );
    }
    println!("{} compose {}", "✓".green(), verb);
    Ok(())
}
