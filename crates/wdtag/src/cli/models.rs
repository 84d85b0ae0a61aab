//! The `wdtag models` command for managing model bundles.

use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};
use wdtag_core::model::{MODEL_FILENAME, VOCABULARY_FILENAME};
use wdtag_core::{Config, ModelRegistry};

/// Arguments for the `models` command.
#[derive(Args, Debug)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommand,
}

/// Subcommands for model management.
#[derive(Subcommand, Debug)]
pub enum ModelsCommand {
    /// Download a model bundle (model.onnx + selected_tags.csv)
    Download {
        /// Bundle name; defaults to the configured model
        name: Option<String>,

        /// Re-download files that already exist
        #[arg(long)]
        force: bool,
    },

    /// List installed and partially downloaded model bundles
    List,

    /// Show model directory path
    Path,
}

/// Hugging Face account hosting the WD14 tagger bundles.
const HF_OWNER: &str = "SmilingWolf";

/// Bundles known to be published under [`HF_OWNER`].
pub const KNOWN_MODELS: &[&str] = &[
    "wd-convnext-tagger-v3",
    "wd-swinv2-tagger-v3",
    "wd-vit-tagger-v3",
    "wd-vit-large-tagger-v3",
    "wd-eva02-large-tagger-v3",
    "wd-v1-4-moat-tagger-v2",
    "wd-v1-4-swinv2-tagger-v2",
    "wd-v1-4-convnext-tagger-v2",
    "wd-v1-4-convnextv2-tagger-v2",
    "wd-v1-4-vit-tagger-v2",
];

/// Files making up a bundle, in download order.
const BUNDLE_FILES: &[&str] = &[VOCABULARY_FILENAME, MODEL_FILENAME];

/// Execute the models command.
pub async fn execute(args: ModelsArgs, config: Config) -> anyhow::Result<()> {
    let registry = ModelRegistry::new(config.model_dir());

    match args.command {
        ModelsCommand::Download { name, force } => {
            let name = name.unwrap_or_else(|| config.general.model.clone());
            if !KNOWN_MODELS.contains(&name.as_str()) {
                tracing::warn!(
                    "{} is not a known {} bundle; trying anyway",
                    name,
                    HF_OWNER
                );
            }

            let client = reqwest::Client::new();
            download_bundle(&client, &registry, &name, force).await?;
            println!(
                "Model {} installed at {}",
                name,
                registry.bundle_dir(&name).display()
            );
        }

        ModelsCommand::List => {
            println!("Model directory: {}\n", registry.root().display());

            for (name, status) in list_bundles(&registry) {
                let default_marker = if name == config.general.model {
                    "  (default)"
                } else {
                    ""
                };
                println!("  - {:32} {:22}{}", name, status, default_marker);
            }

            if !registry.is_installed(&config.general.model) {
                println!(
                    "\nRun `wdtag models download {}` to install the default model.",
                    config.general.model
                );
            }
        }

        ModelsCommand::Path => {
            println!("{}", registry.root().display());
        }
    }

    Ok(())
}

/// Readiness of a bundle directory, or `None` if it holds neither file.
fn bundle_status(dir: &Path) -> Option<&'static str> {
    match (
        dir.join(MODEL_FILENAME).is_file(),
        dir.join(VOCABULARY_FILENAME).is_file(),
    ) {
        (true, true) => Some("ready"),
        (true, false) => Some("missing vocabulary"),
        (false, true) => Some("missing weights"),
        (false, false) => None,
    }
}

/// Every bundle directory under the model root, complete or partial, with
/// its status. Falls back to the registry's default listing when the root
/// holds no bundles at all.
fn list_bundles(registry: &ModelRegistry) -> Vec<(String, &'static str)> {
    let mut bundles: Vec<(String, &'static str)> = std::fs::read_dir(registry.root())
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_dir())
                .filter_map(|e| {
                    let status = bundle_status(&e.path())?;
                    Some((e.file_name().to_str()?.to_string(), status))
                })
                .collect()
        })
        .unwrap_or_default();

    if bundles.is_empty() {
        return registry
            .list_available()
            .into_iter()
            .map(|name| {
                let status = if registry.is_installed(&name) {
                    "ready"
                } else {
                    "not installed"
                };
                (name, status)
            })
            .collect();
    }

    bundles.sort();
    bundles
}

/// Download URL of one file in a bundle.
fn bundle_url(name: &str, file: &str) -> String {
    format!("https://huggingface.co/{HF_OWNER}/{name}/resolve/main/{file}")
}

/// Download every file of bundle `name` into the registry. Existing files
/// are kept unless `force` is set.
async fn download_bundle(
    client: &reqwest::Client,
    registry: &ModelRegistry,
    name: &str,
    force: bool,
) -> anyhow::Result<()> {
    let bundle_dir = registry.bundle_dir(name);
    std::fs::create_dir_all(&bundle_dir)?;

    for file in BUNDLE_FILES {
        let dest = bundle_dir.join(file);
        if dest.exists() && !force {
            tracing::info!("{} already exists at {:?}", file, dest);
            continue;
        }

        let url = bundle_url(name, file);
        tracing::info!("Downloading {}...", file);
        tracing::info!("  Source: {}", url);
        tracing::info!("  Destination: {:?}", dest);

        download_file(client, &url, &dest).await?;

        let file_size = std::fs::metadata(&dest)?.len();
        tracing::info!(
            "  {} complete ({:.1} MB)",
            file,
            file_size as f64 / (1024.0 * 1024.0)
        );
    }

    Ok(())
}

/// Partial-download path next to `dest`.
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Download a file from a URL to a local path, streaming to disk.
///
/// Data lands in a `.part` file that is renamed into place once complete,
/// so an interrupted download never looks like an installed bundle.
async fn download_file(client: &reqwest::Client, url: &str, dest: &Path) -> anyhow::Result<()> {
    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;

    let response = client
        .get(url)
        .send()
        .await?
        .error_for_status()
        .map_err(|e| anyhow::anyhow!("Download failed: {e}"))?;

    let total_size = response.content_length();
    if let Some(size) = total_size {
        tracing::info!("  Size: {:.1} MB", size as f64 / (1024.0 * 1024.0));
    }

    let part = partial_path(dest);
    let mut file = tokio::fs::File::create(&part).await?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&part).await;
                anyhow::bail!("Download of {url} interrupted: {e}");
            }
        };
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;

        if let Some(total) = total_size {
            if downloaded % (50 * 1024 * 1024) < chunk.len() as u64 {
                tracing::info!(
                    "  Progress: {:.0}%",
                    downloaded as f64 / total as f64 * 100.0
                );
            }
        }
    }

    file.flush().await?;
    drop(file);
    tokio::fs::rename(&part, dest).await?;

    Ok(())
}
