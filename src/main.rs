//! # Card Sync CLI (`cardsync`)
//!
//! Manages the local card database and its folder backup.
//!
//! ## Usage
//!
//! ```bash
//! cardsync --config ./config/cardsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cardsync init` | Create the SQLite database and run schema migrations |
//! | `cardsync profile add\|list\|delete` | Manage your own affiliations |
//! | `cardsync card add\|list\|delete` | Manage contacts |
//! | `cardsync image add` | Attach a scanned image to a card |
//! | `cardsync tag add\|delete\|link\|unlink` | Manage tags |
//! | `cardsync note add\|delete` | Record interactions |
//! | `cardsync sync enable\|disable\|now\|status\|reconcile` | Folder backup |
//! | `cardsync export` / `cardsync import` | Manual backup file |
//! | `cardsync stats` | Dataset summary |
//!
//! Commands that change data schedule a folder backup when sync is enabled;
//! the pending backup is written before the command exits.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use card_sync::attachment::Attachment;
use card_sync::config::{self, Config};
use card_sync::db;
use card_sync::export;
use card_sync::folder::{FixedFolder, FolderAccess, FolderPrompt, FsFolderAccess, StdinPrompt};
use card_sync::migrate;
use card_sync::models::{ImageType, NoteType};
use card_sync::orchestrator::{
    AlwaysRestore, EnableOutcome, NeverRestore, ReconcileOutcome, RestoreDecider, RestorePrompt,
    SyncOrchestrator, SyncSettings,
};
use card_sync::records::{CardDraft, ProfileDraft, Records};
use card_sync::sqlite_store::SqliteStore;
use card_sync::stats;
use card_sync::status_report::{phase_label, ProgressMode};

/// Card Sync CLI: a local-first business-card manager with folder backup.
#[derive(Parser)]
#[command(
    name = "cardsync",
    about = "Card Sync: a local-first business-card manager with folder backup",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cardsync.toml")]
    config: PathBuf,

    /// Sync status reporting on stderr: human, json, or off.
    /// Defaults to human when stderr is a terminal.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Human,
    Json,
    Off,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
            ProgressArg::Off => ProgressMode::Off,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run more than once.
    Init,
    /// Manage your profiles (the companies and roles cards are filed under).
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// Manage cards.
    Card {
        #[command(subcommand)]
        action: CardAction,
    },
    /// Manage card images.
    Image {
        #[command(subcommand)]
        action: ImageAction,
    },
    /// Manage tags and card links.
    Tag {
        #[command(subcommand)]
        action: TagAction,
    },
    /// Manage interaction notes.
    Note {
        #[command(subcommand)]
        action: NoteAction,
    },
    /// Folder backup.
    Sync {
        #[command(subcommand)]
        action: SyncAction,
    },
    /// Export the dataset as a backup document.
    Export {
        /// Output file path. Prints to stdout if omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Import a backup document, upserting every row by id.
    Import {
        file: PathBuf,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Show dataset statistics and sync state.
    Stats,
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Add a profile. Prints the new id.
    Add {
        company: String,
        #[arg(long)]
        position: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        address: Option<String>,
        /// Image of your own card for this profile.
        #[arg(long)]
        image: Option<PathBuf>,
        /// Mark as your current affiliation.
        #[arg(long)]
        current: bool,
    },
    List,
    Delete { id: String },
}

#[derive(Subcommand)]
enum CardAction {
    /// Add a card. Prints the new id.
    Add {
        #[arg(long)]
        profile: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        company: String,
        #[arg(long)]
        kana: Option<String>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        position: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        mobile: Option<String>,
        #[arg(long)]
        memo: Option<String>,
        /// 1 (lowest) to 5 (highest).
        #[arg(long, default_value_t = 3)]
        priority: i64,
        /// Date the card was exchanged (YYYY-MM-DD or RFC 3339).
        #[arg(long, value_parser = parse_date)]
        exchanged: Option<DateTime<Utc>>,
    },
    /// List cards, for one profile or all of them.
    List {
        #[arg(long)]
        profile: Option<String>,
    },
    /// Delete a card with its images, tag links and notes.
    Delete { id: String },
}

#[derive(Subcommand)]
enum ImageAction {
    /// Attach an image file to a card. Prints the new id.
    Add {
        card: String,
        file: PathBuf,
        #[arg(long = "type", default_value = "front")]
        image_type: String,
    },
    Delete { id: String },
}

#[derive(Subcommand)]
enum TagAction {
    /// Create a tag. Prints the new id.
    Add {
        name: String,
        #[arg(long)]
        color: Option<String>,
    },
    List,
    /// Delete a tag and unlink it from every card.
    Delete { id: String },
    Link { card: String, tag: String },
    Unlink { card: String, tag: String },
}

#[derive(Subcommand)]
enum NoteAction {
    /// Add a note to a card. Prints the new id.
    Add {
        card: String,
        content: String,
        #[arg(long = "type", default_value = "memo")]
        note_type: String,
        /// Interaction date (YYYY-MM-DD or RFC 3339). Defaults to now.
        #[arg(long, value_parser = parse_date)]
        date: Option<DateTime<Utc>>,
    },
    List { card: String },
    Delete { id: String },
}

#[derive(Subcommand)]
enum SyncAction {
    /// Choose a backup folder and write the first backup.
    ///
    /// Prompts on stdin when no folder is given.
    Enable { folder: Option<PathBuf> },
    /// Stop syncing. The backup file stays in the folder.
    Disable,
    /// Write a backup now.
    Now,
    /// Show whether sync is enabled and when it last ran.
    Status,
    /// Compare the folder backup with local data and restore if newer.
    Reconcile {
        /// Restore without asking.
        #[arg(long, conflicts_with = "no")]
        yes: bool,
        /// Never restore.
        #[arg(long)]
        no: bool,
    },
}

fn parse_date(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("invalid date '{}': expected YYYY-MM-DD or RFC 3339", s))
}

/// Ask a yes/no question on stderr. Anything but y/yes is no.
fn ask(question: &str) -> bool {
    eprint!("{} [y/N] ", question);
    let _ = std::io::stderr().flush();
    let mut line = String::new();
    if std::io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn ask_restore(prompt: &RestorePrompt, owner_id: &str) -> bool {
    let local = match prompt.local_synced_at {
        Some(at) => at.to_rfc3339(),
        None => "never".to_string(),
    };
    eprintln!(
        "The backup folder holds data from {} ({}). This device last synced: {}.",
        prompt.remote_exported_at.to_rfc3339(),
        prompt.remote_counts,
        local
    );
    if !prompt.owner_matches(owner_id) {
        eprintln!(
            "It was written for owner '{}', not '{}'; restored rows will not appear here.",
            prompt.remote_owner_id, owner_id
        );
    }
    ask("Restore it? Local rows with the same ids will be overwritten.")
}

/// Everything a command needs, wired once.
struct App {
    store: Arc<SqliteStore>,
    folder: Arc<FsFolderAccess>,
    sync: SyncOrchestrator,
    records: Records,
}

impl App {
    async fn open(cfg: &Config, prompt: Box<dyn FolderPrompt>, progress: ProgressMode) -> Result<Self> {
        let pool = db::connect(cfg).await?;
        let store = Arc::new(SqliteStore::new(pool));
        let folder = Arc::new(FsFolderAccess::new(prompt, cfg.handle_store_path()));
        let sync = SyncOrchestrator::new(
            store.clone(),
            folder.clone(),
            SyncSettings::from_config(cfg),
        );
        progress.attach(&sync);
        sync.init().await?;

        let records = Records::new(store.clone(), Arc::new(sync.clone()), cfg.user.id.clone());
        Ok(Self {
            store,
            folder,
            sync,
            records,
        })
    }

    async fn close(self) {
        self.sync.shutdown().await;
        self.store.pool().close().await;
    }
}

fn read_attachment(path: &Path) -> Result<Attachment> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Attachment::new(Attachment::mime_for_extension(&ext), bytes))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let progress = cli
        .progress
        .map(ProgressMode::from)
        .unwrap_or_else(ProgressMode::default_for_tty);

    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let prompt: Box<dyn FolderPrompt> = match &cli.command {
        Commands::Sync {
            action: SyncAction::Enable {
                folder: Some(folder),
            },
        } => Box::new(FixedFolder::new(folder)),
        _ => Box::new(StdinPrompt),
    };

    let app = App::open(&cfg, prompt, progress).await?;
    let result = run(&cfg, &app, cli.command).await;
    app.close().await;
    result
}

async fn run(cfg: &Config, app: &App, command: Commands) -> Result<()> {
    let records = &app.records;

    match command {
        Commands::Init => unreachable!("handled before opening the database"),

        Commands::Profile { action } => match action {
            ProfileAction::Add {
                company,
                position,
                email,
                phone,
                address,
                image,
                current,
            } => {
                let card_image = image.as_deref().map(read_attachment).transpose()?;
                let profile = records
                    .create_profile(ProfileDraft {
                        company_name: company,
                        position,
                        email,
                        phone,
                        address,
                        card_image,
                        is_current: current.then_some(true),
                        ..ProfileDraft::default()
                    })
                    .await?;
                println!("{}", profile.id);
            }
            ProfileAction::List => {
                for p in records.list_profiles().await? {
                    println!(
                        "{}  {:>2}  {}{}",
                        p.id,
                        p.display_order,
                        p.company_name,
                        p.position.map(|s| format!(" / {}", s)).unwrap_or_default()
                    );
                }
            }
            ProfileAction::Delete { id } => {
                if !records.delete_profile(&id).await? {
                    anyhow::bail!("profile not found: {}", id);
                }
                eprintln!("Deleted profile {}", id);
            }
        },

        Commands::Card { action } => match action {
            CardAction::Add {
                profile,
                name,
                company,
                kana,
                department,
                position,
                email,
                phone,
                mobile,
                memo,
                priority,
                exchanged,
            } => {
                let mut draft = CardDraft::new(profile, name, company);
                draft.person_name_kana = kana;
                draft.department = department;
                draft.position = position;
                draft.email = email;
                draft.phone = phone;
                draft.mobile = mobile;
                draft.memo = memo;
                draft.priority = priority;
                draft.exchange_date = exchanged;
                let card = records.create_card(draft).await?;
                println!("{}", card.id);
            }
            CardAction::List { profile } => {
                let profile_ids = match profile {
                    Some(id) => vec![id],
                    None => records
                        .list_profiles()
                        .await?
                        .into_iter()
                        .map(|p| p.id)
                        .collect(),
                };
                for profile_id in profile_ids {
                    for c in records.list_cards(&profile_id).await? {
                        println!(
                            "{}  {}  {}  {}",
                            c.id,
                            "*".repeat(c.priority.clamp(0, 5) as usize),
                            c.person_name,
                            c.company_name
                        );
                    }
                }
            }
            CardAction::Delete { id } => {
                if !records.delete_card(&id).await? {
                    anyhow::bail!("card not found: {}", id);
                }
                eprintln!("Deleted card {}", id);
            }
        },

        Commands::Image { action } => match action {
            ImageAction::Add {
                card,
                file,
                image_type,
            } => {
                let image_type: ImageType = image_type.parse()?;
                let image = records
                    .add_image(&card, read_attachment(&file)?, image_type)
                    .await?;
                println!("{}", image.id);
            }
            ImageAction::Delete { id } => {
                if !records.delete_image(&id).await? {
                    anyhow::bail!("image not found: {}", id);
                }
            }
        },

        Commands::Tag { action } => match action {
            TagAction::Add { name, color } => {
                let tag = records.create_tag(&name, color).await?;
                println!("{}", tag.id);
            }
            TagAction::List => {
                for t in records.list_tags().await? {
                    println!("{}  {}", t.id, t.name);
                }
            }
            TagAction::Delete { id } => {
                if !records.delete_tag(&id).await? {
                    anyhow::bail!("tag not found: {}", id);
                }
            }
            TagAction::Link { card, tag } => {
                if !records.assign_tag(&card, &tag).await? {
                    eprintln!("Already linked.");
                }
            }
            TagAction::Unlink { card, tag } => {
                if !records.remove_tag(&card, &tag).await? {
                    eprintln!("Not linked.");
                }
            }
        },

        Commands::Note { action } => match action {
            NoteAction::Add {
                card,
                content,
                note_type,
                date,
            } => {
                let note_type: NoteType = note_type.parse()?;
                let date = date.unwrap_or_else(card_sync::models::now_ms);
                let note = records.add_note(&card, &content, date, note_type).await?;
                println!("{}", note.id);
            }
            NoteAction::List { card } => {
                for n in records.list_notes(&card).await? {
                    println!(
                        "{}  {}  {:<7}  {}",
                        n.id,
                        n.date.format("%Y-%m-%d"),
                        n.note_type.as_str(),
                        n.content
                    );
                }
            }
            NoteAction::Delete { id } => {
                if !records.delete_note(&id).await? {
                    anyhow::bail!("note not found: {}", id);
                }
            }
        },

        Commands::Sync { action } => run_sync(app, action).await?,

        Commands::Export { output } => {
            export::run_export(app.store.as_ref(), &cfg.user.id, output.as_deref()).await?;
        }

        Commands::Import { file, yes } => {
            let imported = export::run_import(app.store.as_ref(), &app.sync, &file, |counts| {
                yes || ask(&format!("Import {}?", counts))
            })
            .await?;
            match imported {
                Some(summary) => println!("Imported {}", summary.counts),
                None => println!("Import cancelled."),
            }
        }

        Commands::Stats => {
            let handle = app.folder.load_persisted_handle().await;
            stats::run_stats(cfg, app.store.as_ref(), handle.as_ref()).await?;
        }
    }

    Ok(())
}

async fn run_sync(app: &App, action: SyncAction) -> Result<()> {
    let sync = &app.sync;

    match action {
        SyncAction::Enable { .. } => match sync.enable().await? {
            EnableOutcome::Enabled {
                folder_label,
                report,
            } => {
                println!(
                    "Sync enabled: {} ({}, {} bytes)",
                    folder_label, report.counts, report.bytes
                );
            }
            EnableOutcome::Declined => println!("Sync not enabled."),
        },
        SyncAction::Disable => {
            sync.disable().await?;
            println!("Sync disabled.");
        }
        SyncAction::Now => {
            let report = sync.sync_now().await?;
            println!(
                "Backup written at {} ({}, {} bytes, digest {})",
                report.exported_at.to_rfc3339(),
                report.counts,
                report.bytes,
                &report.digest[..12]
            );
        }
        SyncAction::Status => {
            let status = sync.status();
            println!("Phase:       {}", phase_label(status.phase));
            println!(
                "Folder:      {}",
                status.folder_label.as_deref().unwrap_or("(none)")
            );
            println!(
                "Last sync:   {}",
                status
                    .last_synced_at
                    .map(stats::format_ts_relative)
                    .unwrap_or_else(|| "never".to_string())
            );
        }
        SyncAction::Reconcile { yes, no } => {
            let owner_id = sync.settings().owner_id.clone();
            let interactive = move |prompt: &RestorePrompt| ask_restore(prompt, &owner_id);
            let decider: &dyn RestoreDecider = if yes {
                &AlwaysRestore
            } else if no || !atty::is(atty::Stream::Stdin) {
                &NeverRestore
            } else {
                &interactive
            };
            match sync.load_and_reconcile(decider).await? {
                ReconcileOutcome::Seeded(report) => {
                    println!("No backup found; wrote the first one ({}).", report.counts)
                }
                ReconcileOutcome::Restored {
                    exported_at,
                    counts,
                    skipped,
                } => {
                    println!("Restored backup from {} ({}).", exported_at.to_rfc3339(), counts);
                    if skipped > 0 {
                        println!("Skipped {} row(s) with missing references.", skipped);
                    }
                }
                ReconcileOutcome::Declined { remote_exported_at } => println!(
                    "Kept local data; backup from {} not restored.",
                    remote_exported_at.to_rfc3339()
                ),
                ReconcileOutcome::LocalCurrent => println!("Local data is up to date."),
            }
        }
    }

    Ok(())
}
