use crate::error::Result;
use crate::models::StoredImage;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::{info, warn};

const RENAMEABLE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Filesystem-safe form of a username.
pub fn slugify(username: &str) -> String {
    let slug: String = username
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if slug.is_empty() {
        "user".to_string()
    } else {
        slug
    }
}

/// Extension of `name` including the leading dot, `.jpg` when there is none.
pub fn extension_of(name: &Path) -> String {
    name.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_else(|| ".jpg".to_string())
}

/// Copies `source` into `image_dir` under `<slug>_<millis><ext>`.
pub async fn store(source: &Path, username: &str, image_dir: &Path) -> Result<StoredImage> {
    let mut input = BufReader::new(fs::File::open(source).await?);
    let original_name = display_name(source);

    let (dest, mut output) = reserve(image_dir, username, &extension_of(source)).await?;
    if let Err(e) = copy_into(&mut input, &mut output).await {
        discard(&dest).await;
        return Err(e.into());
    }

    info!("Stored {} as {}", source.display(), dest.display());
    Ok(StoredImage::new(dest, original_name))
}

/// Writes uploaded bytes into `image_dir` with the same naming rules as [`store`].
pub async fn store_bytes(
    bytes: &[u8],
    file_name: &str,
    username: &str,
    image_dir: &Path,
) -> Result<StoredImage> {
    let original_name = display_name(Path::new(file_name));
    let (dest, mut output) =
        reserve(image_dir, username, &extension_of(Path::new(&original_name))).await?;

    if let Err(e) = write_into(bytes, &mut output).await {
        discard(&dest).await;
        return Err(e.into());
    }

    info!("Stored upload `{original_name}` as {}", dest.display());
    Ok(StoredImage::new(dest, original_name))
}

/// Creates a fresh destination file, bumping the timestamp until the name is free.
async fn reserve(image_dir: &Path, username: &str, ext: &str) -> Result<(PathBuf, fs::File)> {
    fs::create_dir_all(image_dir).await?;

    let slug = slugify(username.trim());
    let mut millis = Utc::now().timestamp_millis();
    loop {
        let dest = image_dir.join(format!("{slug}_{millis}{ext}"));
        match OpenOptions::new().write(true).create_new(true).open(&dest).await {
            Ok(file) => return Ok((dest, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => millis += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

async fn copy_into(input: &mut BufReader<fs::File>, output: &mut fs::File) -> std::io::Result<()> {
    tokio::io::copy_buf(input, output).await?;
    output.flush().await?;
    output.sync_all().await
}

async fn write_into(bytes: &[u8], output: &mut fs::File) -> std::io::Result<()> {
    output.write_all(bytes).await?;
    output.flush().await?;
    output.sync_all().await
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        warn!("Failed to remove partial file {}: {e}", path.display());
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

/// Renames supported images in `dir` to `img1.<ext>`, `img2.<ext>`, ... in sorted order.
///
/// Files are first moved to temporary names so that a target name already in
/// use by another image in the batch is never overwritten.
pub async fn rename_sequential(dir: &Path) -> Result<Vec<(String, String)>> {
    let mut names = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let supported = Path::new(&name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| RENAMEABLE_EXTENSIONS.contains(&ext.as_str()));
        if supported {
            names.push(name);
        }
    }
    names.sort();

    let staged: Vec<PathBuf> = names
        .iter()
        .enumerate()
        .map(|(idx, name)| dir.join(format!(".renaming-{idx}-{name}")))
        .collect();
    let targets: Vec<String> = names
        .iter()
        .enumerate()
        .map(|(idx, name)| format!("img{}{}", idx + 1, extension_of(Path::new(name))))
        .collect();

    for (idx, (name, temp)) in names.iter().zip(&staged).enumerate() {
        if let Err(e) = fs::rename(dir.join(name), temp).await {
            restore_names(dir, &names[..idx], &staged[..idx], &[]).await;
            return Err(e.into());
        }
    }

    for (idx, (temp, target)) in staged.iter().zip(&targets).enumerate() {
        if let Err(e) = fs::rename(temp, dir.join(target)).await {
            restore_names(dir, &names, &staged, &targets[..idx]).await;
            return Err(e.into());
        }
    }

    Ok(names.into_iter().zip(targets).collect())
}

/// Puts a partly renamed batch back under its original names, going through
/// the temporary names so no original name is still taken.
async fn restore_names(dir: &Path, names: &[String], staged: &[PathBuf], placed: &[String]) {
    for (target, temp) in placed.iter().zip(staged) {
        if let Err(e) = fs::rename(dir.join(target), temp).await {
            warn!("Failed to move {target} back: {e}");
        }
    }
    for (name, temp) in names.iter().zip(staged) {
        if let Err(e) = fs::rename(temp, dir.join(name)).await {
            warn!("Failed to restore {name} from {}: {e}", temp.display());
        }
    }
}
