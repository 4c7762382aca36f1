//! Operator tool for the agent economy: register an agent keypair, seed a
//! funded poster/worker pair for a quick demo of spec scenario S1, generate
//! the platform's Ed25519 signing key file, and poll every service's
//! `/health`. Grounded in `eltris-cli/src/main.rs`'s `clap::Parser` +
//! subcommand-enum shape, extended with real `reqwest` calls since this tool
//! replaces `eltris-cli` entirely and carries no Bitcoin/Lightning concepts.

use agent_economy_common::envelope;
use agent_economy_common::identity_client::IdentityClient;
use agent_economy_common::logging;
use agent_economy_common::platform_signer::PlatformSigner;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "agent-cli")]
#[command(about = "Operator CLI for the agent economy's trust-plane services")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new agent with a freshly generated Ed25519 keypair.
    Register {
        display_name: String,
        #[arg(long, default_value = "http://127.0.0.1:8001")]
        identity_url: String,
        /// Write the base64-encoded signing seed here instead of stdout.
        #[arg(long)]
        key_out: Option<PathBuf>,
    },
    /// Register a poster and a worker, fund the poster's account, and print
    /// both agents' ids and keys - the starting point for spec scenario S1.
    Seed {
        #[arg(long, default_value = "http://127.0.0.1:8001")]
        identity_url: String,
        #[arg(long, default_value = "http://127.0.0.1:8002")]
        central_bank_url: String,
        #[arg(long, default_value = "platform")]
        platform_agent_id: String,
        #[arg(long, default_value = "./keys/platform.key")]
        platform_key_path: PathBuf,
        #[arg(long, default_value_t = 1000)]
        poster_balance: i64,
    },
    /// Generate a fresh Ed25519 seed for the platform agent and write it to
    /// disk in the format `PlatformSigner::load` expects.
    GenerateKey {
        #[arg(long, default_value = "./keys/platform.key")]
        out: PathBuf,
    },
    /// Poll `/health` on each of the four services and print their counters.
    Status {
        #[arg(long, default_value = "http://127.0.0.1:8001")]
        identity_url: String,
        #[arg(long, default_value = "http://127.0.0.1:8002")]
        central_bank_url: String,
        #[arg(long, default_value = "http://127.0.0.1:8003")]
        task_board_url: String,
        #[arg(long, default_value = "http://127.0.0.1:8004")]
        court_url: String,
    },
}

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    logging::init_tracing("info");
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Register { display_name, identity_url, key_out } => {
            register(&display_name, &identity_url, key_out.as_deref()).await
        }
        Commands::Seed { identity_url, central_bank_url, platform_agent_id, platform_key_path, poster_balance } => {
            seed(&identity_url, &central_bank_url, &platform_agent_id, &platform_key_path, poster_balance).await
        }
        Commands::GenerateKey { out } => generate_key(&out),
        Commands::Status { identity_url, central_bank_url, task_board_url, court_url } => {
            status(&identity_url, &central_bank_url, &task_board_url, &court_url).await
        }
    };

    if let Err(e) = result {
        eprintln!("agent-cli: {e:#}");
        std::process::exit(1);
    }
}

async fn register(display_name: &str, identity_url: &str, key_out: Option<&std::path::Path>) -> anyhow::Result<()> {
    let signing_key = SigningKey::generate(&mut OsRng);
    let public_key = envelope::format_public_key(&signing_key.verifying_key());
    let seed_b64 = STANDARD.encode(signing_key.to_bytes());

    let client = IdentityClient::new(identity_url, TIMEOUT);
    let agent = client.register(display_name, &public_key).await?;

    match key_out {
        Some(path) => {
            std::fs::write(path, &seed_b64)?;
            println!("registered {} as {}", display_name, agent.agent_id);
            println!("signing key written to {}", path.display());
        }
        None => {
            println!("registered {} as {}", display_name, agent.agent_id);
            println!("signing key (base64 seed, keep secret): {seed_b64}");
        }
    }
    Ok(())
}

fn generate_key(out: &std::path::Path) -> anyhow::Result<()> {
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let signing_key = SigningKey::generate(&mut OsRng);
    std::fs::write(out, STANDARD.encode(signing_key.to_bytes()))?;
    println!("platform signing key written to {}", out.display());
    Ok(())
}

async fn seed(
    identity_url: &str,
    central_bank_url: &str,
    platform_agent_id: &str,
    platform_key_path: &std::path::Path,
    poster_balance: i64,
) -> anyhow::Result<()> {
    let identity = IdentityClient::new(identity_url, TIMEOUT);
    let platform_signer = PlatformSigner::load(
        platform_key_path.to_str().expect("platform key path must be valid utf-8"),
        platform_agent_id.to_string(),
    )
    .map_err(anyhow::Error::msg)?;
    let http = reqwest::Client::builder().timeout(TIMEOUT).build()?;

    let poster_key = SigningKey::generate(&mut OsRng);
    let poster_public = envelope::format_public_key(&poster_key.verifying_key());
    let poster = identity.register("poster", &poster_public).await?;

    let worker_key = SigningKey::generate(&mut OsRng);
    let worker_public = envelope::format_public_key(&worker_key.verifying_key());
    let worker = identity.register("worker", &worker_public).await?;

    let create_poster_account = platform_signer.sign(&json!({
        "action": "create_account",
        "account_id": poster.agent_id,
        "initial_balance": poster_balance,
    }));
    post_token(&http, central_bank_url, "/accounts", &create_poster_account).await?;

    let create_worker_account = envelope::encode(
        &worker.agent_id,
        &json!({"action": "create_account", "account_id": worker.agent_id, "initial_balance": 0}),
        &worker_key,
    );
    post_token(&http, central_bank_url, "/accounts", &create_worker_account).await?;

    println!("seeded demo population:");
    println!(
        "  poster: {} (balance {}), signing key: {}",
        poster.agent_id,
        poster_balance,
        STANDARD.encode(poster_key.to_bytes())
    );
    println!(
        "  worker: {} (balance 0), signing key: {}",
        worker.agent_id,
        STANDARD.encode(worker_key.to_bytes())
    );
    Ok(())
}

async fn post_token(http: &reqwest::Client, base_url: &str, path: &str, token: &str) -> anyhow::Result<()> {
    let resp = http
        .post(format!("{}{path}", base_url.trim_end_matches('/')))
        .json(&json!({"token": token}))
        .send()
        .await?;
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("{path} returned {status}: {body}");
    }
    Ok(())
}

async fn status(identity_url: &str, central_bank_url: &str, task_board_url: &str, court_url: &str) -> anyhow::Result<()> {
    let http = reqwest::Client::builder().timeout(TIMEOUT).build()?;
    for (name, url) in [
        ("identity", identity_url),
        ("central-bank", central_bank_url),
        ("task-board", task_board_url),
        ("court", court_url),
    ] {
        match http.get(format!("{}/health", url.trim_end_matches('/'))).send().await {
            Ok(resp) if resp.status().is_success() => {
                let body: serde_json::Value = resp.json().await.unwrap_or_default();
                println!("{name}: ok {body}");
            }
            Ok(resp) => println!("{name}: unhealthy (status {})", resp.status()),
            Err(e) => println!("{name}: unreachable ({e})"),
        }
    }
    Ok(())
}
