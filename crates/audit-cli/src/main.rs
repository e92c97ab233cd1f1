use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::{Client, Method, Response};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "audit-cli")]
#[command(about = "CLI client for the audit ledger node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a transaction
    Submit {
        /// Transaction category, e.g. project_submission
        #[arg(long = "type")]
        kind: String,
        /// Acting principal
        #[arg(long)]
        signed_by: String,
        /// Payload as JSON
        #[arg(long)]
        data: String,
        /// Annotations as JSON
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Mark a transaction confirmed
    Confirm {
        hash: String,
        #[arg(long)]
        by: String,
        #[arg(long)]
        signature: Option<String>,
    },
    /// Mark a transaction failed
    Fail {
        hash: String,
        #[arg(long)]
        reason: String,
    },
    /// Show where a transaction stands
    Status { hash: String },
    /// Show a transaction's lifecycle events
    History { hash: String },
    /// Transactions correlated with a project
    Project { id: String },
    /// Transactions signed by or correlated with a user
    User { id: String },
    /// Aggregate chain statistics
    Stats,
    /// Node and chain health
    Health,
    /// Show one block by index
    Block { index: u64 },
    /// Seal pending transactions into a block now
    Mine,
    /// Write a snapshot of the whole ledger
    Export {
        /// Output file; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Replace the node's ledger with a snapshot file
    Import { file: PathBuf },
    /// Purge pending transactions older than the given age
    Cleanup {
        #[arg(long)]
        max_age_hours: Option<u64>,
    },
}

impl Command {
    fn request(&self) -> Result<(Method, String, Option<Value>)> {
        let req = match self {
            Command::Submit {
                kind,
                signed_by,
                data,
                metadata,
            } => {
                let data: Value = serde_json::from_str(data).context("--data is not valid JSON")?;
                let metadata: Value = match metadata {
                    Some(raw) => serde_json::from_str(raw).context("--metadata is not valid JSON")?,
                    None => Value::Null,
                };
                let body = json!({
                    "type": kind,
                    "signedBy": signed_by,
                    "data": data,
                    "metadata": metadata,
                });
                (Method::POST, "/transactions".to_string(), Some(body))
            }
            Command::Confirm { hash, by, signature } => (
                Method::POST,
                format!("/transactions/{hash}/confirm"),
                Some(json!({"confirmedBy": by, "signature": signature})),
            ),
            Command::Fail { hash, reason } => (
                Method::POST,
                format!("/transactions/{hash}/fail"),
                Some(json!({"reason": reason})),
            ),
            Command::Status { hash } => (Method::GET, format!("/transactions/{hash}"), None),
            Command::History { hash } => {
                (Method::GET, format!("/transactions/{hash}/history"), None)
            }
            Command::Project { id } => (Method::GET, format!("/projects/{id}/transactions"), None),
            Command::User { id } => (Method::GET, format!("/users/{id}/transactions"), None),
            Command::Stats => (Method::GET, "/stats".to_string(), None),
            Command::Health => (Method::GET, "/health".to_string(), None),
            Command::Block { index } => (Method::GET, format!("/chain/blocks/{index}"), None),
            Command::Mine => (Method::POST, "/mine".to_string(), None),
            Command::Export { .. } => (Method::GET, "/export".to_string(), None),
            Command::Import { file } => {
                let raw = std::fs::read_to_string(file)
                    .with_context(|| format!("reading {}", file.display()))?;
                let snapshot: Value = serde_json::from_str(&raw).context("snapshot is not JSON")?;
                (Method::POST, "/import".to_string(), Some(snapshot))
            }
            Command::Cleanup { max_age_hours } => (
                Method::POST,
                "/cleanup".to_string(),
                Some(json!({"maxAgeHours": max_age_hours})),
            ),
        };
        Ok(req)
    }
}

async fn send(client: &Client, node: &str, cmd: &Command) -> Result<Response> {
    let (method, path, body) = cmd.request()?;
    let url = format!("{}{path}", node.trim_end_matches('/'));
    debug!(%method, %url, "sending request");
    let mut req = client.request(method, url);
    if let Some(body) = body {
        req = req.json(&body);
    }
    Ok(req.send().await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let client = Client::new();
    let res = send(&client, &cli.node, &cli.cmd).await?;
    let status = res.status();
    let body = res.text().await?;
    let pretty = serde_json::from_str::<Value>(&body)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .unwrap_or(body);

    match &cli.cmd {
        Command::Export { out: Some(path) } if status.is_success() => {
            std::fs::write(path, &pretty).with_context(|| format!("writing {}", path.display()))?;
            println!("snapshot written to {}", path.display());
        }
        _ => {
            println!("status: {}", status);
            println!("{pretty}");
        }
    }
    if !status.is_success() {
        anyhow::bail!("node answered {status}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_builds_camel_case_body() {
        let cli = Cli::try_parse_from([
            "audit-cli",
            "submit",
            "--type",
            "project_submission",
            "--signed-by",
            "user1",
            "--data",
            r#"{"amount":100}"#,
        ])
        .unwrap();
        let (method, path, body) = cli.cmd.request().unwrap();
        assert_eq!(method, Method::POST);
        assert_eq!(path, "/transactions");
        let body = body.unwrap();
        assert_eq!(body["type"], "project_submission");
        assert_eq!(body["signedBy"], "user1");
        assert_eq!(body["data"]["amount"], 100);
    }

    #[test]
    fn submit_rejects_bad_json() {
        let cli = Cli::try_parse_from([
            "audit-cli", "submit", "--type", "t", "--signed-by", "u", "--data", "{oops",
        ])
        .unwrap();
        assert!(cli.cmd.request().is_err());
    }

    #[test]
    fn confirm_routes_to_hash() {
        let cli = Cli::try_parse_from([
            "audit-cli", "--node", "http://node:9000", "confirm", "abc", "--by", "admin",
        ])
        .unwrap();
        assert_eq!(cli.node, "http://node:9000");
        let (method, path, body) = cli.cmd.request().unwrap();
        assert_eq!(method, Method::POST);
        assert_eq!(path, "/transactions/abc/confirm");
        assert_eq!(body.unwrap()["confirmedBy"], "admin");
    }

    #[test]
    fn read_commands_have_no_body() {
        for args in [
            vec!["audit-cli", "status", "abc"],
            vec!["audit-cli", "history", "abc"],
            vec!["audit-cli", "project", "p1"],
            vec!["audit-cli", "stats"],
            vec!["audit-cli", "block", "3"],
        ] {
            let cli = Cli::try_parse_from(args).unwrap();
            let (method, _, body) = cli.cmd.request().unwrap();
            assert_eq!(method, Method::GET);
            assert!(body.is_none());
        }
    }

    #[test]
    fn missing_subcommand_is_an_error() {
        assert!(Cli::try_parse_from(["audit-cli"]).is_err());
    }
}
