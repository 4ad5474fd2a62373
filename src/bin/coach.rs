use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use opening_coach::advice::MemoryBook;
use opening_coach::config::CoachConfig;
use opening_coach::curriculum::Tier;
use opening_coach::engine::EngineConfig;
use opening_coach::{Coach, CoachEvent, MoveVerdict};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;
use tracing_subscriber::EnvFilter;

/// Practise openings in the terminal.
///
/// Type moves in SAN or UCI. Other commands: `ai [LEVEL]`, `undo`, `redo`,
/// `reset`, `fen FEN`, `hint`, `quit`.
#[derive(Parser, Debug)]
#[command(name = "coach", version)]
struct Cli {
    /// Opening to practise, by id (see --list).
    #[arg(long)]
    opening: Option<String>,

    /// beginner or master.
    #[arg(long, default_value = "beginner")]
    tier: Tier,

    /// Configuration file. Defaults to $OPENING_COACH_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the catalog and exit.
    #[arg(long)]
    list: bool,

    /// Seed for reproducible AI and book choices.
    #[arg(long)]
    seed: Option<u64>,

    /// Print state as JSON lines instead of text.
    #[arg(long)]
    json: bool,

    /// Serve the engine over HTTP on this address instead.
    #[cfg(feature = "server")]
    #[arg(long)]
    serve: Option<std::net::SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    #[cfg(feature = "server")]
    if let Some(addr) = cli.serve {
        tracing::info!(%addr, "serving engine");
        axum::Server::bind(&addr)
            .serve(opening_coach::server::serve_engine().into_make_service())
            .await?;
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => CoachConfig::load(path)?,
        None => CoachConfig::from_env()?,
    }
    .sanitized();
    let catalog = config.catalog()?;

    if cli.list {
        for (title, id) in catalog.options() {
            println!("{id:<16} {title}");
        }
        return Ok(());
    }

    let book = MemoryBook::from_catalog(&catalog);
    let mut coach = Coach::new(catalog, config.settings.clone(), Handle::current())
        .with_book(Arc::new(book));
    if let Some(seed) = cli.seed {
        coach = coach.with_seed(seed);
    }

    match &cli.opening {
        Some(id) => coach.select_opening(id, cli.tier)?,
        None => {
            coach.on_position_changed();
        }
    }
    let events = coach.settle().await;
    report(&coach, &events, cli.json);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));

        match command {
            "quit" | "exit" => break,
            "undo" => {
                if !coach.undo() {
                    println!("nothing to undo");
                }
            }
            "redo" => {
                if !coach.redo() {
                    println!("nothing to redo");
                }
            }
            "reset" => coach.reset()?,
            "fen" => {
                if let Err(e) = coach.load_fen(rest) {
                    println!("{e}");
                }
            }
            "hint" => {
                let expected: Vec<String> =
                    coach.expected_moves().iter().map(|p| p.san.clone()).collect();
                if expected.is_empty() {
                    println!("no expected move here");
                } else {
                    println!("expected: {}", expected.join(", "));
                }
                continue;
            }
            "ai" => {
                let level = rest.trim().parse().unwrap_or(config.settings.suggestion_level);
                match coach.play_ai_move(EngineConfig::level(level)).await {
                    Ok(Some(result)) => {
                        if let Some(ply) = &result.best_move {
                            println!("AI plays {ply} ({:?}, eval {})", result.origin, result.evaluation);
                        }
                    }
                    Ok(None) => println!("AI move went stale"),
                    Err(e) => println!("{e}"),
                }
            }
            _ => match coach.attempt_text(line) {
                Ok(MoveVerdict::Accepted) => {}
                Ok(MoveVerdict::Blocked { note, expected }) => {
                    let expected: Vec<String> = expected.iter().map(|p| p.san.clone()).collect();
                    println!("blocked: {note} (expected {})", expected.join(", "));
                }
                Err(e) => println!("{e}"),
            },
        }

        let events = coach.settle().await;
        report(&coach, &events, cli.json);
    }
    Ok(())
}

fn report(coach: &Coach, events: &[CoachEvent], json: bool) {
    if json {
        let state = serde_json::json!({
            "key": coach.key(),
            "phase": coach.current_phase(),
            "feedback": coach.feedback(),
            "suggestions": coach.current_suggestions(),
            "events": events,
        });
        println!("{state}");
        return;
    }

    let moves: Vec<&str> = coach.moves().map(|p| p.san.as_str()).collect();
    println!("moves: {}", moves.join(" "));
    println!("phase: {}", coach.current_phase());
    for s in coach.current_suggestions() {
        println!("  {} {} ({:.0}%)", s.source, s.ply, s.weight * 100.0);
    }
}
