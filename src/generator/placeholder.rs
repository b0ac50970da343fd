use super::Describer;
use crate::error::Result;
use crate::models::Generation;
use async_trait::async_trait;
use std::path::Path;

/// Deterministic stand-in text used when the hosted models are not configured.
pub struct PlaceholderDescriber;

#[async_trait]
impl Describer for PlaceholderDescriber {
    fn name(&self) -> &str {
        "placeholder"
    }

    async fn describe(&self, _image: &Path, label: &str) -> Result<Generation> {
        Ok(Generation {
            caption: format!("Placeholder caption for {label}"),
            description: format!("Placeholder description for {label} -- model not loaded."),
        })
    }
}
