mod gemini;
mod huggingface;
mod placeholder;
mod thumbnail;

pub use gemini::{GeminiClient, ModelInfo};
pub use huggingface::CaptionClient;
pub use placeholder::PlaceholderDescriber;
pub use thumbnail::prepare_image;

use crate::cache::CaptionCache;
use crate::config::ModelConfig;
use crate::error::{Error, Result};
use crate::models::Generation;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[async_trait]
pub trait Describer: Send + Sync {
    fn name(&self) -> &str;

    /// `label` is the name the user knows the image by.
    async fn describe(&self, image: &Path, label: &str) -> Result<Generation>;
}

pub fn artisan_prompt(caption: &str, min_sentences: u32) -> String {
    format!(
        "Take the following image caption and expand it into a vivid, artisan-style description. \
         Include colors, textures, materials, patterns, environment, lighting, and emotions. \
         Make it at least {min_sentences} sentences.\n\nCaption: {caption}"
    )
}

pub struct ModelDescriber {
    captioner: CaptionClient,
    writer: GeminiClient,
    cache: CaptionCache,
    min_sentences: u32,
    thumb_size: u32,
}

impl ModelDescriber {
    pub fn new(
        captioner: CaptionClient,
        writer: GeminiClient,
        cache: CaptionCache,
        config: &ModelConfig,
    ) -> Self {
        Self {
            captioner,
            writer,
            cache,
            min_sentences: config.min_sentences,
            thumb_size: config.thumb_size,
        }
    }

    /// Fails when either model credential is missing.
    pub fn from_config(config: &ModelConfig, cache: CaptionCache) -> Result<Self> {
        let token = config
            .huggingface_token
            .as_deref()
            .ok_or_else(|| Error::Config("HUGGINGFACE_TOKEN is not set".into()))?;
        let api_key = config
            .gemini_api_key
            .as_deref()
            .ok_or_else(|| Error::Config("GENIE_API_KEY is not set".into()))?;

        let captioner = CaptionClient::new(token, config)?;
        let writer = GeminiClient::new(api_key, &config.text_model)?;
        Ok(Self::new(captioner, writer, cache, config))
    }
}

#[async_trait]
impl Describer for ModelDescriber {
    fn name(&self) -> &str {
        "hosted-models"
    }

    async fn describe(&self, image: &Path, label: &str) -> Result<Generation> {
        let png = prepare_image(image, self.thumb_size).await?;

        let caption = self.captioner.caption(&png).await?;
        let description = match self
            .writer
            .generate(&artisan_prompt(&caption, self.min_sentences))
            .await
        {
            Ok(description) => description,
            Err(Error::EmptyResponse(service)) => {
                warn!("{service} returned no text for {label}; using the caption");
                caption.clone()
            }
            Err(e) => return Err(e),
        };
        info!("Generated caption for {label}: {caption}");

        let generation = Generation {
            caption,
            description,
        };

        let key = image
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| label.to_string());
        self.cache.record(&key, &generation).await?;

        Ok(generation)
    }
}

/// Hosted models when configured, otherwise the placeholder.
pub fn describer_from_config(config: &ModelConfig, cache: CaptionCache) -> Arc<dyn Describer> {
    match ModelDescriber::from_config(config, cache) {
        Ok(describer) => Arc::new(describer),
        Err(e) => {
            warn!("Caption models unavailable ({e}); using placeholder text");
            Arc::new(PlaceholderDescriber)
        }
    }
}
