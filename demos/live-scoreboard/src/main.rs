use scorelink::prelude::*;
use tracing_subscriber::EnvFilter;

const EMAIL_ENV: &str = "SCORELINK_EMAIL";
const PASSWORD_ENV: &str = "SCORELINK_PASSWORD";

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// `live-scoreboard [email] [password]`; missing arguments fall back to
/// `SCORELINK_EMAIL` / `SCORELINK_PASSWORD`.
fn sign_in_details(
    args: &[String],
    env: impl Fn(&str) -> Option<String>,
) -> Option<(String, String)> {
    let email = args.first().cloned().or_else(|| env(EMAIL_ENV))?;
    let password = args.get(1).cloned().or_else(|| env(PASSWORD_ENV))?;
    Some((email, password))
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render_board(board: &LeaderboardUpdated) {
    println!("--- leaderboard @ {} ---", board.updated_at);
    for entry in &board.entries {
        println!("{:>3}. {:<20} {:>6}", entry.rank, entry.username, entry.score);
    }
}

// ---------------------------------------------------------------------------
// Client bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((email, password)) = sign_in_details(&args, |key| std::env::var(key).ok()) else {
        eprintln!("usage: live-scoreboard <email> <password>");
        eprintln!("       (or set {EMAIL_ENV} and {PASSWORD_ENV})");
        std::process::exit(2);
    };

    let client = Client::builder().config(ClientConfig::from_env()).build()?;

    client.events().on_score_updated(|update: &ScoreUpdated| {
        println!(
            "score: {} (+{}) at {}",
            update.new_score, update.points_earned, update.updated_at
        );
        Ok(())
    });
    client.events().on_leaderboard_updated(|board: &LeaderboardUpdated| {
        render_board(board);
        Ok(())
    });

    let me = client.login(&email, &password).await?;
    tracing::info!(user = %me.username, score = me.score, "signed in");

    let mut status = client.watch_status();
    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let now = *status.borrow_and_update();
                tracing::info!(status = ?now, "connection status changed");
                if now == ConnectionStatus::Disconnected && !client.is_authenticated() {
                    tracing::warn!("signed out by the server");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, signing out");
                client.logout().await;
                break;
            }
        }
    }

    Ok(())
}
