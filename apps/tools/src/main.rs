use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use server_api::auth::{mint_session_token, AuthConfig};
use shared::domain::{Domain, UserId};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/temple.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create (or look up) a user by email.
    CreateUser {
        email: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Mark a user's subscription active.
    GrantSubscription {
        user_id: i64,
        #[arg(long, default_value = "sub_manual")]
        subscription_id: String,
    },
    /// Show a user's session counts per tool.
    Usage { user_id: i64 },
    /// Mint a session token for API calls and the demo client.
    MintSession {
        user_id: i64,
        #[arg(long, default_value = "dev-session-secret")]
        secret: String,
        #[arg(long, default_value_t = 7 * 24 * 3600)]
        ttl_seconds: i64,
    },
    /// Report dataset rows the loader or bucketizer would drop.
    ValidateDataset {
        /// Tool slug, e.g. emotion-decoder.
        domain: String,
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::CreateUser { email, name } => {
            let storage = Storage::new(&cli.database_url).await?;
            let user_id = storage.get_or_create_user(&email, name.as_deref()).await?;
            println!("user_id={}", user_id.0);
        }
        Command::GrantSubscription {
            user_id,
            subscription_id,
        } => {
            let storage = Storage::new(&cli.database_url).await?;
            storage
                .activate_subscription(UserId(user_id), &subscription_id)
                .await?;
            println!("subscription '{subscription_id}' active for user_id={user_id}");
        }
        Command::Usage { user_id } => {
            let storage = Storage::new(&cli.database_url).await?;
            let user_id = UserId(user_id);
            for domain in Domain::ALL {
                let count = storage.usage_count(user_id, domain).await?;
                println!("{}: {count}", domain.slug());
            }
            println!("total: {}", storage.total_usage(user_id).await?);
            println!("subscribed: {}", storage.is_subscribed(user_id).await?);
        }
        Command::MintSession {
            user_id,
            secret,
            ttl_seconds,
        } => {
            let cfg = AuthConfig {
                session_secret: secret,
                session_ttl_seconds: ttl_seconds,
            };
            let token = mint_session_token(&cfg, UserId(user_id))?;
            println!("{token}");
        }
        Command::ValidateDataset { domain, path } => {
            let Some(domain) = Domain::from_slug(&domain) else {
                bail!("unknown tool '{domain}'");
            };
            let text = std::fs::read_to_string(&path)?;
            let report = catalog::scan_dataset(domain, &text);
            println!("accepted rows: {}", report.accepted);
            for (line, fields) in &report.short_rows {
                println!("line {line}: dropped, only {fields} fields");
            }
            for (line, label) in &report.unknown_buckets {
                println!("line {line}: unknown bucket '{label}'");
            }
            if report.short_rows.is_empty() && report.unknown_buckets.is_empty() {
                println!("no rows would be dropped");
            }
        }
    }

    Ok(())
}
