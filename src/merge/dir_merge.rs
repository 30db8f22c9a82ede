// src/merge/dir_merge.rs

//! Default merge operation: recursive copy with a content-addressed cache.
//!
//! Files are blake3-hashed and their bytes stored once under the node's
//! `.cache/objects/<hex>`, then hard-linked into the generation's output
//! directory (plain copy as fallback). Re-merging an unchanged file costs a
//! hash, not a copy, and the object store survives across generations.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use blake3::Hasher;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::trace;

use super::{CACHE_DIR, MergeOperation};
use crate::errors::BuildError;

/// Copy-merge: mirrors `input` into `output`, later calls overwriting
/// earlier files. A file/directory kind conflict between input and the
/// accumulated output is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirMerge;

#[async_trait]
impl MergeOperation for DirMerge {
    async fn merge(&self, input: &Path, output: &Path) -> Result<(), BuildError> {
        // The output dir is `scratch/<node>/<generation>`; the object store
        // lives beside the generations, under the reserved `.cache` entry.
        let objects = output
            .parent()
            .map(|scratch| scratch.join(CACHE_DIR).join("objects"))
            .ok_or_else(|| BuildError::merge(output, "output directory has no parent"))?;
        fs::create_dir_all(&objects)
            .await
            .map_err(|err| BuildError::io(&objects, &err))?;

        merge_dir(input, output, &objects).await
    }
}

fn merge_dir<'a>(
    input: &'a Path,
    output: &'a Path,
    objects: &'a Path,
) -> Pin<Box<dyn Future<Output = Result<(), BuildError>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = fs::read_dir(input)
            .await
            .map_err(|err| BuildError::io(input, &err))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| BuildError::io(input, &err))?
        {
            let src = entry.path();
            let dest = output.join(entry.file_name());
            let file_type = entry
                .file_type()
                .await
                .map_err(|err| BuildError::io(&src, &err))?;

            if file_type.is_dir() {
                if dest.is_file() {
                    return Err(BuildError::merge(
                        &dest,
                        "cannot merge a directory over an existing file",
                    ));
                }
                fs::create_dir_all(&dest)
                    .await
                    .map_err(|err| BuildError::io(&dest, &err))?;
                merge_dir(&src, &dest, objects).await?;
            } else {
                if dest.is_dir() {
                    return Err(BuildError::merge(
                        &dest,
                        "cannot merge a file over an existing directory",
                    ));
                }
                merge_file(&src, &dest, objects).await?;
            }
        }

        Ok(())
    })
}

async fn merge_file(src: &Path, dest: &Path, objects: &Path) -> Result<(), BuildError> {
    let hash = hash_file(src).await?;
    let object = objects.join(&hash);

    let cached = fs::try_exists(&object)
        .await
        .map_err(|err| BuildError::io(&object, &err))?;
    if !cached {
        store_object(src, &object).await?;
    } else {
        trace!(src = %src.display(), hash = %hash, "object cache hit");
    }

    // Later inputs win: remove first, so an overwrite never writes through
    // an existing hard link into an older generation.
    match fs::remove_file(dest).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(BuildError::io(dest, &err)),
    }

    if fs::hard_link(&object, dest).await.is_err() {
        // Filesystem without hard-link support (or a raced unlink); fall
        // back to a plain copy.
        fs::copy(&object, dest)
            .await
            .map_err(|err| BuildError::io(dest, &err))?;
    }

    Ok(())
}

static TMP_SUFFIX: AtomicU64 = AtomicU64::new(0);

/// Populate the object store via a temp name + rename, so a reader never
/// observes a partially written object.
async fn store_object(src: &Path, object: &Path) -> Result<(), BuildError> {
    let tmp: PathBuf = object.with_extension(format!(
        "tmp-{}-{}",
        std::process::id(),
        TMP_SUFFIX.fetch_add(1, Ordering::Relaxed)
    ));

    fs::copy(src, &tmp)
        .await
        .map_err(|err| BuildError::io(src, &err))?;
    fs::rename(&tmp, object)
        .await
        .map_err(|err| BuildError::io(object, &err))?;
    Ok(())
}

/// Streaming blake3 of one file's contents.
async fn hash_file(path: &Path) -> Result<String, BuildError> {
    let mut file = fs::File::open(path)
        .await
        .map_err(|err| BuildError::io(path, &err))?;

    let mut hasher = Hasher::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|err| BuildError::io(path, &err))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_contents_hash_identically() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        tokio::fs::write(&a, b"same bytes").await.expect("write a");
        tokio::fs::write(&b, b"same bytes").await.expect("write b");

        assert_eq!(
            hash_file(&a).await.expect("hash a"),
            hash_file(&b).await.expect("hash b")
        );
    }

    #[tokio::test]
    async fn missing_file_hash_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = hash_file(&dir.path().join("absent.txt"))
            .await
            .expect_err("should fail");
        assert_eq!(err.code(), "EIO");
    }
}
