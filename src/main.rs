use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use card_style_swapper::audit::ChangeLogEntry;
use card_style_swapper::batch::{DEFAULT_LOOKUP_CHUNK_SIZE, DEFAULT_MUTATION_CHUNK_SIZE};
use card_style_swapper::card_store::{
    ArtworkKey, CardKey, CardQuery, CardSort, Selection, StyleOp,
};
use card_style_swapper::config::{AppConfig, CliConfig, FileConfig};
use card_style_swapper::style_engine::{StyleCommand, StyleEvent, StyleRequest};
use card_style_swapper::tagset::{StyleId, PARALLAX_STYLE};
use card_style_swapper::Swapper;

mod cli_style;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(
    name = "card-swapper",
    version,
    about = "Toggle card styles and swap card artwork",
    styles = cli_style::get_styles()
)]
struct CliArgs {
    /// Path to a TOML config file. Its values override the flags below.
    #[clap(long, global = true, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding config.json and the change log.
    #[clap(long, global = true, value_parser = parse_path)]
    pub data_dir: Option<PathBuf>,

    /// Directory receiving backups of modified files.
    #[clap(long, global = true, value_parser = parse_path)]
    pub backup_dir: Option<PathBuf>,

    /// Cards per committed chunk when editing styles.
    #[clap(long, global = true, default_value_t = DEFAULT_MUTATION_CHUNK_SIZE)]
    pub mutation_chunk_size: usize,

    /// Keys per read-only lookup query.
    #[clap(long, global = true, default_value_t = DEFAULT_LOOKUP_CHUNK_SIZE)]
    pub lookup_chunk_size: usize,

    /// Converter executable used to read and write artwork containers.
    #[clap(long, global = true)]
    pub texture_tool: Option<PathBuf>,

    /// Print machine-readable JSON instead of text.
    #[clap(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone, Copy)]
struct StyleArg {
    /// Style identifier to add or remove.
    #[clap(long, default_value_t = PARALLAX_STYLE, allow_hyphen_values = true)]
    style: StyleId,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the stored locations, or change them.
    Config {
        #[clap(long)]
        database_path: Option<String>,
        #[clap(long)]
        save_path: Option<String>,
    },
    /// Show whether the card database can be opened.
    Status,
    /// Browse named cards.
    Cards {
        #[clap(long)]
        search: Option<String>,
        #[clap(long, default_value_t = 100)]
        limit: usize,
        #[clap(long, default_value_t = 0)]
        offset: usize,
        #[clap(long, value_enum, default_value = "name")]
        sort: CardSort,
    },
    /// Show one card.
    Card { key: CardKey },
    /// List which of the given cards already carry a style.
    HasStyle {
        #[clap(required = true)]
        keys: Vec<CardKey>,
        #[command(flatten)]
        style: StyleArg,
    },
    #[command(flatten)]
    Batch(BatchCommand),
    /// Replace the artwork of a container with an image.
    Swap {
        artwork_key: ArtworkKey,
        #[clap(value_parser = parse_path)]
        image: PathBuf,
    },
    /// Write the current artwork of a container as an image.
    Export {
        artwork_key: ArtworkKey,
        #[clap(value_parser = parse_path)]
        out: Option<PathBuf>,
    },
    /// Show the change log.
    History {
        #[clap(long)]
        key: Option<i64>,
        #[clap(long, default_value_t = 20)]
        limit: usize,
    },
}

/// Commands that run a chunked style batch.
#[derive(Subcommand, Debug)]
enum BatchCommand {
    /// Add a style to the given cards.
    Unlock {
        #[clap(required = true)]
        keys: Vec<CardKey>,
        #[command(flatten)]
        style: StyleArg,
    },
    /// Add a style to every card matching the search, basic lands excepted.
    UnlockMatching {
        #[clap(long, default_value = "")]
        search: String,
        #[command(flatten)]
        style: StyleArg,
    },
    /// Add a style to every token.
    UnlockTokens {
        #[command(flatten)]
        style: StyleArg,
    },
    /// Remove a style from every token.
    ResetTokens {
        #[command(flatten)]
        style: StyleArg,
    },
    /// Remove a style from mono-colored vehicles.
    ResetColoredVehicles {
        #[command(flatten)]
        style: StyleArg,
    },
    /// Remove a style from every card.
    ResetAll {
        #[command(flatten)]
        style: StyleArg,
    },
    /// Add or remove any style on a search or key list.
    Style {
        #[clap(long, value_enum)]
        op: StyleOp,
        #[clap(long, allow_hyphen_values = true)]
        style: StyleId,
        #[clap(long, conflicts_with = "keys")]
        search: Option<String>,
        #[clap(long, value_delimiter = ',')]
        keys: Vec<CardKey>,
    },
}

impl BatchCommand {
    fn into_request(self) -> StyleRequest {
        let (command, style) = match self {
            BatchCommand::Unlock { keys, style } => (StyleCommand::Unlock { keys }, style.style),
            BatchCommand::UnlockMatching { search, style } => {
                (StyleCommand::UnlockMatching { search }, style.style)
            }
            BatchCommand::UnlockTokens { style } => (StyleCommand::UnlockTokens, style.style),
            BatchCommand::ResetTokens { style } => (StyleCommand::ResetTokens, style.style),
            BatchCommand::ResetColoredVehicles { style } => {
                (StyleCommand::ResetColoredVehicles, style.style)
            }
            BatchCommand::ResetAll { style } => (StyleCommand::ResetAll, style.style),
            BatchCommand::Style {
                op,
                style,
                search,
                keys,
            } => {
                let selection = match search {
                    Some(search) => Selection::search(search),
                    None => Selection::keys(keys),
                };
                (StyleCommand::Custom { selection, op }, style)
            }
        };
        StyleRequest::new(command).with_style(style)
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

fn print_history(entries: &[ChangeLogEntry]) {
    if entries.is_empty() {
        println!("No changes recorded.");
    }
    for entry in entries {
        let style = entry
            .style_id
            .map(|s| format!(" style {}", s))
            .unwrap_or_default();
        println!(
            "{}  {:<12} {:<8} {}{}",
            format_timestamp(entry.created_at),
            entry.operation.to_db_str(),
            entry.entity_kind.to_db_str(),
            entry.entity_key,
            style
        );
    }
}

/// Run a style batch on a blocking thread while rendering its events.
async fn run_style_batch(swapper: Arc<Swapper>, request: StyleRequest, json: bool) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        if !handler_token.is_cancelled() {
            eprintln!("Stopping after the current chunk...");
        }
        handler_token.cancel();
    })
    .context("Failed to install Ctrl-C handler")?;

    let worker = {
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            swapper.run_style_streaming(&request, &tx, Some(&cancel))
        })
    };

    let bar = cli_style::batch_progress_bar(json);
    while let Some(event) = rx.recv().await {
        if json {
            println!("{}", serde_json::to_string(&event)?);
            continue;
        }
        match event {
            StyleEvent::Progress {
                current,
                total,
                changed,
                ..
            } => {
                bar.set_length(total as u64);
                bar.set_position(current as u64);
                bar.set_message(format!("{} changed", changed));
            }
            StyleEvent::Complete { message, .. } => bar.finish_with_message(message),
            StyleEvent::Error { message } => {
                bar.abandon_with_message(message);
            }
        }
    }

    let report = worker.await.context("Style batch worker panicked")??;
    if report.cancelled {
        warn!("Batch cancelled, {} cards were updated", report.processed);
    }
    if report.is_total_failure() {
        bail!("{}", report.summary());
    }
    if !json {
        println!("{}", report.summary());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let cli_config = CliConfig {
        data_dir: cli_args.data_dir.clone(),
        backup_dir: cli_args.backup_dir.clone(),
        mutation_chunk_size: cli_args.mutation_chunk_size,
        lookup_chunk_size: cli_args.lookup_chunk_size,
        texture_tool: cli_args.texture_tool.clone(),
    };
    let app_config = AppConfig::resolve(&cli_config, file_config)?;
    let swapper = Arc::new(Swapper::open(app_config)?);
    let json = cli_args.json;

    match cli_args.command {
        Command::Config {
            database_path,
            save_path,
        } => {
            let config = if database_path.is_none() && save_path.is_none() {
                swapper.user_config()
            } else {
                swapper.update_user_config(database_path.as_deref(), save_path.as_deref())?
            };
            print_json(&config)?;
        }
        Command::Status => {
            let status = swapper.status()?;
            if json {
                print_json(&status)?;
            } else {
                println!(
                    "Database: {}",
                    status
                        .database_path
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "<not configured>".to_string())
                );
                println!("Connected: {}", status.is_db_connected);
            }
        }
        Command::Cards {
            search,
            limit,
            offset,
            sort,
        } => {
            let cards = swapper.list_cards(&CardQuery {
                search,
                limit,
                offset,
                sort,
            })?;
            if json {
                print_json(&cards)?;
            } else {
                for card in &cards {
                    println!(
                        "{:>8}  {:>8}  {:<6} {}{}{}",
                        card.key,
                        card.artwork_key,
                        card.set_code.as_deref().unwrap_or("-"),
                        card.name,
                        card.localized_name
                            .as_deref()
                            .map(|name| format!(" [{}]", name))
                            .unwrap_or_default(),
                        if card.is_alchemy { "  (alchemy)" } else { "" }
                    );
                }
            }
        }
        Command::Card { key } => {
            let card = swapper.get_card(key)?;
            print_json(&card)?;
        }
        Command::HasStyle { keys, style } => {
            let found = swapper.keys_with_style(&keys, style.style)?;
            if json {
                print_json(&found)?;
            } else {
                println!("{} of {} cards carry style {}", found.len(), keys.len(), style.style);
                for key in &found {
                    println!("{:>8}", key);
                }
            }
        }
        Command::Swap { artwork_key, image } => {
            let bytes = tokio::fs::read(&image)
                .await
                .with_context(|| format!("Failed to read image {:?}", image))?;
            let outcome = swapper.swap_artwork(artwork_key, &bytes).await?;
            if json {
                print_json(&outcome)?;
            } else {
                println!(
                    "Replaced artwork {} in {:?} (backup at {:?})",
                    outcome.artwork_key, outcome.container, outcome.backup.backup_path
                );
            }
        }
        Command::Export { artwork_key, out } => {
            let out = out.unwrap_or_else(|| swapper.default_export_path(artwork_key));
            let bytes = swapper.render_artwork(artwork_key).await?;
            if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&out, &bytes)
                .await
                .with_context(|| format!("Failed to write {:?}", out))?;
            println!("Wrote artwork {} to {:?}", artwork_key, out);
        }
        Command::History { key, limit } => {
            let entries = swapper.history(key, limit)?;
            if json {
                print_json(&entries)?;
            } else {
                print_history(&entries);
            }
        }
        Command::Batch(batch) => {
            run_style_batch(swapper.clone(), batch.into_request(), json).await?;
        }
    }

    swapper.close()?;
    Ok(())
}
