mod output;

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use storekeep_core::{AppConfig, CancellationToken, DEFAULT_CONFIG};
use storekeep_workflow::{UploadInput, Workspace};

const DEFAULT_STORE_DISPLAY_NAME: &str = "default-store";

#[derive(Parser, Debug)]
#[command(
    name = "storekeep",
    version,
    about = "Manage Gemini File Search stores and ask questions against them"
)]
struct Cli {
    /// TOML config file (defaults to $STOREKEEP_CONFIG, then storekeep.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a remote store and record it locally
    CreateStore {
        #[arg(long = "display-name", default_value = DEFAULT_STORE_DISPLAY_NAME)]
        display_name: String,
    },
    /// List remote stores and mark the active one
    ListStores,
    /// Delete a remote store with its documents and drop local records for it
    DeleteStore { store: String },
    /// Make a recorded store the default for upload and ask
    ActivateStore { store: String },
    /// Upload a file into a store and wait until it is indexed
    Upload {
        file: PathBuf,
        #[arg(long = "display-name")]
        display_name: Option<String>,
        #[arg(long)]
        store: Option<String>,
    },
    /// Ask a question grounded on a store
    Ask {
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
        #[arg(long)]
        store: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
    /// List files recorded locally
    ListFiles {
        #[arg(long)]
        store: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("failed to load configuration ({})", config_path.display()))?;
    let workspace = Workspace::new(config)
        .with_default_store_override()
        .with_last_created_fallback();
    run(&workspace, cli.command).await
}

fn resolve_config_path(flag: Option<&Path>) -> PathBuf {
    flag.map(Path::to_path_buf)
        .or_else(|| env::var_os("STOREKEEP_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
}

async fn run(workspace: &Workspace, command: Commands) -> Result<()> {
    match command {
        Commands::CreateStore { display_name } => {
            output::stage("create-store", format!("creating {display_name}"));
            let store = workspace.create_store(&display_name).await?;
            output::info(format!("created {} ({})", store.name, store.display_name));
            if store.is_active {
                output::detail("first store recorded; it is now active");
            }
        }
        Commands::ListStores => {
            let listing = workspace.list_stores().await?;
            if listing.stores.is_empty() {
                output::info("no stores");
                return Ok(());
            }
            output::info(format!(
                "{} store(s), active: {}",
                listing.stores.len(),
                listing.active_store_name.as_deref().unwrap_or("none")
            ));
            for (index, store) in listing.stores.iter().enumerate() {
                let marker = if store.is_active { " *" } else { "" };
                if store.display_name.is_empty() {
                    println!("{}. {}{}", index + 1, store.name, marker);
                } else {
                    println!(
                        "{}. {} ({}){}",
                        index + 1,
                        store.name,
                        store.display_name,
                        marker
                    );
                }
                output::detail(format!(
                    "activeDocumentsCount: {}, sizeBytes: {}",
                    store.active_documents_count, store.size_bytes
                ));
                if let Some(created) = &store.create_time {
                    output::detail(format!("createTime: {created}"));
                }
            }
        }
        Commands::DeleteStore { store } => {
            output::stage("delete-store", format!("deleting {store}"));
            workspace.delete_store(&store).await?;
            output::info(format!("deleted {store}"));
        }
        Commands::ActivateStore { store } => {
            if workspace.activate_store(&store).await? {
                output::info(format!("active store: {store}"));
            } else {
                warn!(store = %store, "store is not recorded locally");
                output::info(format!("{store} is not a known store; no store is active"));
            }
        }
        Commands::Upload {
            file,
            display_name,
            store,
        } => {
            if !file.is_file() {
                bail!("file not found: {}", file.display());
            }
            let cancel = CancellationToken::new();
            let guard = cancel.clone();
            let watcher = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    guard.cancel();
                }
            });
            output::stage("upload", format!("uploading {}", file.display()));
            let result = workspace
                .upload(
                    UploadInput {
                        path: file,
                        store,
                        display_name,
                        ..Default::default()
                    },
                    Some(&cancel),
                )
                .await;
            watcher.abort();
            let document = result?;
            output::info(format!(
                "indexed {} as {}",
                document.display_name, document.document_name
            ));
            output::detail(format!("store: {}", document.parent));
        }
        Commands::Ask {
            question,
            store,
            model,
        } => {
            let question = question.join(" ");
            let outcome = workspace
                .ask(&question, store.as_deref(), model.as_deref())
                .await?;
            output::stage(
                "ask",
                format!("{} on {}", outcome.model, outcome.store_name),
            );
            println!("{}", outcome.answer);
            if !outcome.citations.is_empty() {
                println!();
                println!("Sources:");
                for citation in &outcome.citations {
                    match (&citation.title, &citation.uri) {
                        (Some(title), Some(uri)) => println!("- {title} ({uri})"),
                        (Some(title), None) => println!("- {title}"),
                        (None, Some(uri)) => println!("- {uri}"),
                        (None, None) => {}
                    }
                }
            }
        }
        Commands::ListFiles { store } => {
            let files = workspace.list_files(store.as_deref()).await?;
            if files.is_empty() {
                output::info("no files recorded");
                return Ok(());
            }
            for file in files {
                println!("{}\t{}\t{}", file.store_name, file.file_name, file.display_name);
            }
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_store_defaults_display_name() {
        let cli = Cli::try_parse_from(["storekeep", "create-store"]).unwrap();
        match cli.command {
            Commands::CreateStore { display_name } => {
                assert_eq!(display_name, DEFAULT_STORE_DISPLAY_NAME)
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn ask_joins_words_and_accepts_global_config() {
        let cli = Cli::try_parse_from([
            "storekeep",
            "ask",
            "how",
            "do",
            "I",
            "reset",
            "--store",
            "fileSearchStores/a",
            "--config",
            "custom.toml",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("custom.toml")));
        match cli.command {
            Commands::Ask {
                question,
                store,
                model,
            } => {
                assert_eq!(question.join(" "), "how do I reset");
                assert_eq!(store.as_deref(), Some("fileSearchStores/a"));
                assert!(model.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn positional_arguments_are_required() {
        assert!(Cli::try_parse_from(["storekeep", "ask"]).is_err());
        assert!(Cli::try_parse_from(["storekeep", "delete-store"]).is_err());
        assert!(Cli::try_parse_from(["storekeep", "upload"]).is_err());
    }

    #[test]
    fn config_flag_wins_over_default() {
        assert_eq!(
            resolve_config_path(Some(Path::new("/etc/storekeep.toml"))),
            PathBuf::from("/etc/storekeep.toml")
        );
    }
}
