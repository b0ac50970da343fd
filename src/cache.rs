use crate::error::Result;
use crate::models::Generation;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

pub type CaptionMap = BTreeMap<String, Generation>;

/// Flat JSON file mapping image file names to their generated text.
///
/// Every write rewrites the whole file. Writers in this process take turns;
/// other processes writing the same file race and the last one wins.
#[derive(Clone)]
pub struct CaptionCache {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl CaptionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<CaptionMap> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(CaptionMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn record(&self, image_name: &str, generation: &Generation) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut entries = self.load().await?;
        entries.insert(image_name.to_string(), generation.clone());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, to_pretty_json(&entries)?).await?;
        fs::rename(&tmp, &self.path).await?;

        debug!("Cached captions for {image_name} in {}", self.path.display());
        Ok(())
    }
}

fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    Ok(out)
}
