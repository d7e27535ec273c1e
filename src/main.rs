use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cullrs::config::{EngineConfig, default_config_path};
use cullrs::core::{DirectoryLibrary, FileFingerprinter, MediaLibrary};
use cullrs::database::{AssetRepository, Database, GroupType, MediaType, default_database_path};
use cullrs::services::{
    GroupingOrchestrator, GroupingStatus, GroupingWorker, PassProgress, PassStage, delete_assets,
};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "cullrs", version, about = "Group duplicate and similar media")]
struct Cli {
    /// Config file (default: `<config dir>/cullrs/config.json`)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Catalog database (overrides the config file)
    #[arg(long, global = true, value_name = "FILE")]
    db: Option<PathBuf>,

    /// More log output; repeat for trace
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync the catalog with a library directory and regroup new assets
    Index {
        /// Library root
        #[arg(short, long, value_name = "DIR")]
        library: PathBuf,
        /// Largest normalized perceptual distance treated as similar
        #[arg(long)]
        threshold: Option<f64>,
        /// Media types to process (default: from config)
        #[arg(long, value_name = "TYPE")]
        media: Vec<MediaType>,
    },

    /// List duplicate and similar groups
    Groups {
        #[arg(long, value_name = "TYPE", default_value = "photo")]
        media: MediaType,
        /// Only show one kind of group
        #[arg(long, value_name = "KIND")]
        kind: Option<GroupType>,
    },

    /// Show counts and sizes per group type
    Summary {
        #[arg(long, value_name = "TYPE")]
        media: Vec<MediaType>,
    },

    /// Delete assets from the library and the catalog
    Delete {
        /// Library root
        #[arg(short, long, value_name = "DIR")]
        library: PathBuf,
        #[arg(long, value_name = "TYPE", default_value = "photo")]
        media: MediaType,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
        /// Asset ids, relative to the library root
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = load_config(cli.config.clone())?;
    let db_path = match cli.db.clone().or_else(|| config.database_path.clone()) {
        Some(path) => path,
        None => default_database_path()?,
    };
    let database = Database::open(&db_path)
        .with_context(|| format!("Failed to open catalog {}", db_path.display()))?;
    let repo = AssetRepository::new(database);

    match cli.command {
        Commands::Index {
            library,
            threshold,
            media,
        } => {
            let mut config = config;
            if let Some(threshold) = threshold {
                config.similarity_threshold = threshold;
            }
            if !media.is_empty() {
                config.media_types = media;
            }
            config.validate()?;
            run_index(repo, library, &config)?;
        }

        Commands::Groups { media, kind } => {
            let kinds = match kind {
                Some(GroupType::Other) => anyhow::bail!("`other` assets are not grouped"),
                Some(kind) => vec![kind],
                None => vec![GroupType::Duplicate, GroupType::Similar],
            };

            for kind in kinds {
                let summaries = repo.group_summaries(media, kind)?;
                println!("▶ {} {} group(s): {}", media, kind, summaries.len());
                for (i, summary) in summaries.iter().enumerate() {
                    println!(
                        "\n✨ Group {} ({} members, {}):",
                        i + 1,
                        summary.members,
                        format_bytes(summary.total_size)
                    );
                    for member in repo.fetch_group(media, summary.subgroup_id)? {
                        println!(
                            "   ▶ {} ({}, {})",
                            member.asset_id,
                            format_bytes(member.size_bytes),
                            member.creation_date.format("%Y-%m-%d %H:%M")
                        );
                    }
                }
                println!();
            }
        }

        Commands::Summary { media } => {
            let media = if media.is_empty() {
                config.media_types.clone()
            } else {
                media
            };
            for media_type in media {
                print_totals(&repo, media_type)?;
            }
        }

        Commands::Delete {
            library,
            media,
            yes,
            ids,
        } => {
            let library = DirectoryLibrary::new(&library)
                .with_context(|| format!("Invalid library {}", library.display()))?;

            println!("▶ About to permanently delete {} {} asset(s):", ids.len(), media);
            for id in &ids {
                println!("   🗑️  {}", id);
            }
            if !yes
                && !Confirm::new()
                    .with_prompt("Delete these files?")
                    .default(false)
                    .interact()?
            {
                println!("Aborted; nothing was deleted.");
                return Ok(());
            }

            let report = delete_assets(&library, &repo, media, &ids)?;
            println!(
                "\n✅ Deleted {} asset(s), freed {}, {} group(s) dissolved",
                report.removed,
                format_bytes(report.freed_bytes),
                report.demoted
            );
        }
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<EngineConfig> {
    match path.or_else(default_config_path) {
        Some(path) => EngineConfig::load(&path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

/// Runs one pass through the background worker, feeding a spinner with its
/// progress events.
fn run_index(repo: AssetRepository, root: PathBuf, config: &EngineConfig) -> Result<()> {
    let library = DirectoryLibrary::new(&root)
        .with_context(|| format!("Invalid library {}", root.display()))?;
    let fingerprinter = FileFingerprinter::new(
        library.clone(),
        config.hash_algorithm,
        config.hash_size,
    );
    let library: Arc<dyn MediaLibrary> = Arc::new(library);

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<PassProgress>();
    let orchestrator = Arc::new(
        GroupingOrchestrator::new(repo.clone(), library, Arc::new(fingerprinter))
            .with_similarity_threshold(config.similarity_threshold)
            .with_media_types(config.media_types.clone())
            .with_progress_sender(progress_tx),
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    let worker = GroupingWorker::spawn(orchestrator.clone(), runtime.handle());

    println!("▶ Indexing {}", root.display());
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message("Starting…");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let started = Instant::now();
    let mut status = worker.subscribe();
    worker.trigger();
    runtime.block_on(async {
        loop {
            tokio::select! {
                Some(progress) = progress_rx.recv() => {
                    spinner.set_message(describe(&progress));
                }
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if *status.borrow_and_update() != GroupingStatus::InProgress {
                        break;
                    }
                }
            }
        }
        worker.shutdown().await;
    });

    if orchestrator.status() != GroupingStatus::Completed {
        spinner.abandon_with_message("Indexing failed");
        anyhow::bail!("Grouping pass did not complete; rerun with -v for details");
    }
    spinner.finish_with_message(format!("Indexed in {:.2?}", started.elapsed()));

    for &media_type in &config.media_types {
        print_totals(&repo, media_type)?;
    }
    Ok(())
}

fn describe(progress: &PassProgress) -> String {
    match progress.stage {
        PassStage::Diff => format!("Syncing {} catalog…", progress.media_type),
        PassStage::Duplicates => format!("Hashing {}s…", progress.media_type),
        PassStage::Similarity => format!(
            "Comparing {}s {}/{}",
            progress.media_type, progress.processed, progress.total
        ),
    }
}

fn print_totals(repo: &AssetRepository, media_type: MediaType) -> Result<()> {
    let totals = repo.category_totals(media_type)?;
    println!("\n🗂️  {} ({} assets)", media_type, totals.total_count());
    println!(
        "   duplicate: {:>6}  {}",
        totals.duplicate_count,
        format_bytes(totals.duplicate_size)
    );
    println!(
        "   similar:   {:>6}  {}",
        totals.similar_count,
        format_bytes(totals.similar_size)
    );
    println!(
        "   other:     {:>6}  {}",
        totals.other_count,
        format_bytes(totals.other_size)
    );
    Ok(())
}

fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
