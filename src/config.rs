use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_CAPTION_MODEL: &str = "Salesforce/blip2-opt-2.7b";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-flash-latest";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub image_folder: PathBuf,
    pub bind_addr: SocketAddr,
    pub admin_password: String,
    pub bcrypt_cost: u32,
    pub models: ModelConfig,
}

/// Hosted model credentials and fixed decoding parameters.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub huggingface_token: Option<String>,
    pub gemini_api_key: Option<String>,
    pub caption_model: String,
    pub text_model: String,
    pub num_beams: u32,
    pub max_length: u32,
    pub min_sentences: u32,
    pub thumb_size: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            huggingface_token: None,
            gemini_api_key: None,
            caption_model: DEFAULT_CAPTION_MODEL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            num_beams: 8,
            max_length: 128,
            min_sentences: 3,
            thumb_size: 400,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let bcrypt_cost = parse_or(&var, "ARTISAN_BCRYPT_COST", bcrypt::DEFAULT_COST)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(Error::Config(format!(
                "ARTISAN_BCRYPT_COST must be between 4 and 31, got {bcrypt_cost}"
            )));
        }

        Ok(Self {
            database_path: var("ARTISAN_DATABASE")
                .unwrap_or_else(|| "artisan_marketplace.db".into())
                .into(),
            image_folder: var("IMAGE_FOLDER")
                .unwrap_or_else(|| "artisan_images".into())
                .into(),
            bind_addr: parse_or(&var, "ARTISAN_ADDR", SocketAddr::from(([127, 0, 0, 1], 3000)))?,
            admin_password: var("ARTISAN_ADMIN_PASSWORD").unwrap_or_else(|| "123456789".into()),
            bcrypt_cost,
            models: ModelConfig {
                huggingface_token: var("HUGGINGFACE_TOKEN"),
                gemini_api_key: var("GENIE_API_KEY"),
                caption_model: var("CAPTION_MODEL")
                    .unwrap_or_else(|| DEFAULT_CAPTION_MODEL.into()),
                text_model: var("TEXT_MODEL").unwrap_or_else(|| DEFAULT_TEXT_MODEL.into()),
                ..ModelConfig::default()
            },
        })
    }

    pub fn captions_file(&self) -> PathBuf {
        self.image_folder.join("captions.json")
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("invalid {key} `{raw}`: {e}"))),
        None => Ok(default),
    }
}
