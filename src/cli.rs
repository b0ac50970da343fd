use crate::cache::CaptionCache;
use crate::config::Config;
use crate::db;
use crate::error::Error;
use crate::generator::{Describer, GeminiClient, ModelDescriber};
use crate::intake;
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, warn};

const CAPTIONABLE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "avif"];

#[derive(Parser)]
#[command(name = "artisan")]
#[command(about = "Artisan captioning dashboard", long_about = None)]
pub struct Cli {
    /// Without a subcommand the dashboard is started.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Caption one image, or every image in a folder, and update the caption cache
    Caption {
        /// Image file or folder (defaults to the image folder)
        path: Option<PathBuf>,
    },

    /// Rename images in a folder to img1, img2, ... keeping their extensions
    Rename {
        /// Folder to rename in (defaults to the image folder)
        dir: Option<PathBuf>,
    },

    /// Check that the database can be opened
    CheckDb,

    /// List the models available to the text-generation API key
    ListModels,
}

pub async fn run(command: Command, config: &Config) -> anyhow::Result<()> {
    match command {
        Command::Caption { path } => {
            let path = path.unwrap_or_else(|| config.image_folder.clone());
            caption(&path, config).await
        }
        Command::Rename { dir } => {
            let dir = dir.unwrap_or_else(|| config.image_folder.clone());
            let renamed = intake::rename_sequential(&dir)
                .await
                .with_context(|| format!("failed to rename images in {}", dir.display()))?;
            for (old, new) in &renamed {
                println!("Renamed {old} -> {new}");
            }
            Ok(())
        }
        Command::CheckDb => {
            let conn = db::establish_connection(&config.database_path).with_context(|| {
                format!("connection to {} failed", config.database_path.display())
            })?;
            println!("Database connected: {}", config.database_path.display());
            db::close(conn);
            Ok(())
        }
        Command::ListModels => {
            let api_key = config
                .models
                .gemini_api_key
                .as_deref()
                .context("GENIE_API_KEY is not set")?;
            let client = GeminiClient::new(api_key, &config.models.text_model)?;
            for model in client.list_models().await? {
                println!("{} - {:?}", model.name, model.supported_generation_methods);
            }
            Ok(())
        }
    }
}

async fn caption(path: &Path, config: &Config) -> anyhow::Result<()> {
    let cache = CaptionCache::new(config.captions_file());
    let describer = ModelDescriber::from_config(&config.models, cache)
        .context("caption models are not configured")?;

    if path.is_dir() {
        return caption_folder(&describer, path).await;
    }
    if !path.exists() {
        bail!("File not found: {}", path.display());
    }
    caption_one(&describer, path).await?;
    Ok(())
}

async fn caption_folder(describer: &dyn Describer, folder: &Path) -> anyhow::Result<()> {
    let images = captionable_images(folder)
        .await
        .with_context(|| format!("failed to read {}", folder.display()))?;
    if images.is_empty() {
        warn!("No images found in {}", folder.display());
        return Ok(());
    }

    println!("Found {} images in {}", images.len(), folder.display());
    let mut failed = 0;
    for (idx, path) in images.iter().enumerate() {
        println!("\n--- [{}/{}] {} ---", idx + 1, images.len(), label_of(path));
        if let Err(e) = caption_one(describer, path).await {
            error!("Error processing {}: {e}", path.display());
            failed += 1;
        }
    }

    if failed > 0 {
        warn!("{failed} of {} images failed", images.len());
    }
    Ok(())
}

async fn caption_one(describer: &dyn Describer, path: &Path) -> Result<(), Error> {
    let label = label_of(path);
    let generation = describer.describe(path, &label).await?;

    println!("\nImage: {label}");
    println!("Caption: {}", generation.caption);
    println!("{}", "-".repeat(60));
    println!("Rich description:\n{}", generation.description);
    println!("{}", "-".repeat(60));
    Ok(())
}

async fn captionable_images(folder: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    let mut entries = tokio::fs::read_dir(folder).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let supported = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| CAPTIONABLE_EXTENSIONS.contains(&ext.as_str()));
        if supported && entry.file_type().await?.is_file() {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

fn label_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
