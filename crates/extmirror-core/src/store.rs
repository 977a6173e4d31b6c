//! Write-once, content-addressed package store.
//!
//! Blobs live under `depth` levels of `width` hex characters taken from the
//! SHA-256 digest, followed by the rest of the digest and `.zip`:
//!
//! ```text
//! webext_data/a/b/c/d/ef0123….zip
//! ```
//!
//! Content is streamed into a temporary file inside the store and renamed
//! into place only after its digest checked out, so a partial download is
//! never visible under its hash.

use std::{
    collections::BTreeSet,
    io::{self, BufWriter, ErrorKind, Read, Write},
    path::{Path, PathBuf},
};

use extmirror_utils::{
    fs::ensure_dir_exists,
    hash::{calculate_checksum, is_sha256_hex, DigestWriter, SHA256_HEX_LEN},
};
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::{
    constants::{BLOB_EXTENSION, INCOMING_PREFIX},
    error::{StoreError, StoreResult},
};

const COPY_BUFFER: usize = 64 * 1024;

#[derive(Clone, Debug)]
pub struct ContentStore {
    root: PathBuf,
    depth: usize,
    width: usize,
}

impl ContentStore {
    /// Opens the store at `root`, creating the directory if needed.
    pub fn open<P: AsRef<Path>>(root: P, depth: usize, width: usize) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        if width == 0 || depth * width >= SHA256_HEX_LEN {
            return Err(StoreError::IoError {
                action: format!("opening store with depth {depth} and width {width}"),
                source: io::Error::new(ErrorKind::InvalidInput, "invalid sharding"),
            });
        }
        ensure_dir_exists(&root)?;

        Ok(Self { root, depth, width })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn normalize(hash: &str) -> StoreResult<String> {
        if is_sha256_hex(hash) {
            Ok(hash.to_ascii_lowercase())
        } else {
            Err(StoreError::InvalidHash(hash.to_string()))
        }
    }

    fn blob_path(&self, hex: &str) -> PathBuf {
        let split = self.depth * self.width;
        let mut path = self.root.clone();
        for shard in hex[..split].as_bytes().chunks(self.width) {
            path.push(String::from_utf8_lossy(shard).as_ref());
        }
        path.push(format!("{}.{BLOB_EXTENSION}", &hex[split..]));
        path
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.get(hash).is_some()
    }

    /// Path of the stored blob, if present.
    pub fn get(&self, hash: &str) -> Option<PathBuf> {
        let hex = Self::normalize(hash).ok()?;
        let path = self.blob_path(&hex);
        path.is_file().then_some(path)
    }

    /// Stores `reader`'s content under `hash`.
    ///
    /// The content is digested while it is written. An already stored hash is
    /// left untouched and `reader` is not consumed.
    ///
    /// # Errors
    ///
    /// * [`StoreError::InvalidHash`] if `hash` is not a SHA-256 hex digest
    /// * [`StoreError::Read`] if `reader` fails
    /// * [`StoreError::DigestMismatch`] if the content hashes differently
    pub fn put_at<R: Read>(&self, hash: &str, reader: R) -> StoreResult<PathBuf> {
        let expected = Self::normalize(hash)?;
        let target = self.blob_path(&expected);
        if target.is_file() {
            trace!(hash = expected.as_str(), "already stored");
            return Ok(target);
        }

        let (tmp, actual) = self.receive(&expected, reader)?;
        if actual != expected {
            return Err(StoreError::DigestMismatch { expected, actual });
        }

        self.commit(tmp, &target)?;
        debug!(hash = expected.as_str(), "stored {}", target.display());
        Ok(target)
    }

    /// Stores `reader`'s content under its own digest.
    pub fn put<R: Read>(&self, reader: R) -> StoreResult<(String, PathBuf)> {
        let (tmp, actual) = self.receive("unknown", reader)?;
        let target = self.blob_path(&actual);
        if !target.is_file() {
            self.commit(tmp, &target)?;
        }
        Ok((actual, target))
    }

    fn receive<R: Read>(&self, label: &str, mut reader: R) -> StoreResult<(NamedTempFile, String)> {
        let io_err = |action: &str, source| {
            StoreError::IoError {
                action: format!("{action} incoming blob for {label}"),
                source,
            }
        };

        let mut tmp = Builder::new()
            .prefix(INCOMING_PREFIX)
            .suffix(".part")
            .tempfile_in(&self.root)
            .map_err(|err| io_err("creating", err))?;

        let mut writer = DigestWriter::new(BufWriter::new(tmp.as_file_mut()));
        let mut buf = vec![0u8; COPY_BUFFER];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    return Err(StoreError::Read {
                        hash: label.to_string(),
                        source: err,
                    })
                }
            };
            writer
                .write_all(&buf[..n])
                .map_err(|err| io_err("writing", err))?;
        }

        let (mut buffered, actual) = writer.finish();
        buffered.flush().map_err(|err| io_err("flushing", err))?;
        drop(buffered);
        tmp.as_file()
            .sync_all()
            .map_err(|err| io_err("syncing", err))?;

        Ok((tmp, actual))
    }

    fn commit(&self, tmp: NamedTempFile, target: &Path) -> StoreResult<()> {
        if let Some(parent) = target.parent() {
            ensure_dir_exists(parent)?;
        }
        tmp.persist(target).map_err(|err| {
            StoreError::IoError {
                action: format!("moving blob into {}", target.display()),
                source: err.error,
            }
        })?;
        Ok(())
    }

    /// Every stored hash.
    ///
    /// Files that do not follow the store layout are ignored.
    pub fn hashes(&self) -> BTreeSet<String> {
        let blob_depth = self.depth + 1;
        WalkDir::new(&self.root)
            .min_depth(blob_depth)
            .max_depth(blob_depth)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| self.hash_of(entry.path()))
            .collect()
    }

    fn hash_of(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut hex = String::with_capacity(SHA256_HEX_LEN);
        for component in relative.components() {
            hex.push_str(component.as_os_str().to_str()?);
        }
        let hex = hex.strip_suffix(&format!(".{BLOB_EXTENSION}"))?;
        is_sha256_hex(hex).then(|| hex.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.hashes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Re-digests the stored blob. A missing blob does not verify.
    pub fn verify(&self, hash: &str) -> StoreResult<bool> {
        let expected = Self::normalize(hash)?;
        match self.get(&expected) {
            Some(path) => Ok(calculate_checksum(path)? == expected),
            None => Ok(false),
        }
    }
}
