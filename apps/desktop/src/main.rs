use anyhow::{bail, Result};
use clap::Parser;
use client_core::{Page, PageView, RitualPhase, RitualStep, Shell, TempleClient};
use shared::domain::Domain;

/// Walks one decoder session against a running server and narrates it
/// to stdout.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    server_url: String,
    /// Session token minted via `tools mint-session`.
    #[arg(long)]
    session_token: Option<String>,
    #[arg(long, default_value = "emotion-decoder")]
    tool: String,
    /// Label of the tile to select; the first tile when omitted.
    #[arg(long)]
    select: Option<String>,
    /// Replacement word for the high-vibration step.
    #[arg(long)]
    replacement: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let Some(domain) = Domain::from_slug(&args.tool) else {
        bail!("unknown tool '{}'", args.tool);
    };

    let mut client = TempleClient::new(&args.server_url)?;
    if let Some(token) = &args.session_token {
        client.set_session_token(Some(token.clone()));
    }
    let mut shell = Shell::new(client);

    shell.open(Page::Decoder(domain)).await;
    let tile = match shell.current() {
        PageView::SignInRequired { .. } => {
            println!("Sign in required: visit {}/api/login?email=you@example.com", args.server_url);
            return Ok(());
        }
        PageView::UpgradeRequired { usage_count, .. } => {
            println!(
                "{} of {} free sessions remaining. Upgrade to continue.",
                client_core::free_sessions_remaining(*usage_count),
                client_core::FREE_SESSION_QUOTA
            );
            return Ok(());
        }
        PageView::RetryableError { .. } => {
            println!("The gate check failed; try again.");
            return Ok(());
        }
        PageView::Catalog { grid, .. } => {
            println!("{}", domain.title());
            for section in grid.left.iter().chain(grid.right.iter()) {
                println!(
                    "  {}: {} - {}",
                    section.bucket.label(),
                    section.theme.title,
                    section.theme.description
                );
                for tile in &section.tiles {
                    println!("    {} ({})", tile.label, tile.subtitle);
                }
            }

            let mut all_tiles = grid
                .left
                .iter()
                .chain(grid.right.iter())
                .flat_map(|section| section.tiles.iter());
            match &args.select {
                Some(label) => all_tiles.find(|tile| &tile.label == label).cloned(),
                None => all_tiles.next().cloned(),
            }
        }
        other => {
            bail!("unexpected view: {other:?}");
        }
    };

    let Some(tile) = tile else {
        println!("Nothing to select; the catalog is empty or the label was not found.");
        return Ok(());
    };

    println!("\nSelected: {}", tile.label);
    shell.select_tile(tile).await;

    if matches!(shell.current(), PageView::UpgradeRequired { .. }) {
        println!("Free quota ran out; upgrade to continue.");
        return Ok(());
    }

    while let Some(session) = shell.ritual_mut() {
        let Some(prompt) = session.prompt() else {
            break;
        };
        println!("\nStep {}: {}", prompt.step.number(), prompt.title);
        println!("  {}", prompt.body);

        if prompt.step == RitualStep::Replace {
            if let Some(word) = &args.replacement {
                session.set_replacement_input(word.clone());
            }
        }
        if session.advance() == RitualPhase::Complete {
            break;
        }
    }

    println!("\nHealing complete. Returning to the catalog.");
    shell.return_to_catalog().await;
    Ok(())
}
