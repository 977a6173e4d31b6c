//! In-memory catalog with id and hash indexes, persisted as zstd-compressed
//! JSON.

use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufReader},
    path::Path,
};

use extmirror_utils::fs::write_atomic;
use tracing::{debug, warn};

use crate::{
    error::{ErrorContext, Result},
    record::CatalogRecord,
};

const ZSTD_LEVEL: i32 = 3;

#[derive(Clone, Debug, Default)]
pub struct CatalogSnapshot {
    records: Vec<CatalogRecord>,
    by_id: HashMap<u64, usize>,
    by_hash: HashMap<String, usize>,
}

impl CatalogSnapshot {
    pub fn new(records: Vec<CatalogRecord>) -> Self {
        let mut snapshot = Self {
            records,
            ..Default::default()
        };
        snapshot.rebuild_indexes();
        snapshot
    }

    /// Loads a snapshot; a missing file yields an empty snapshot.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!("No catalog snapshot stored in {}", path.display());
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("opening {}", path.display()));
            }
        };

        debug!("Loading catalog snapshot from {}", path.display());
        let decoder = zstd::Decoder::new(BufReader::new(file))
            .with_context(|| format!("creating zstd decoder for {}", path.display()))?;
        let records: Vec<CatalogRecord> = serde_json::from_reader(decoder)?;

        Ok(Self::new(records))
    }

    /// Writes the snapshot atomically; the previous file stays intact on
    /// failure.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        debug!(
            records = self.records.len(),
            "Writing catalog snapshot to {}",
            path.display()
        );

        write_atomic(path, |writer| {
            let mut encoder = zstd::Encoder::new(writer, ZSTD_LEVEL)?;
            serde_json::to_writer(&mut encoder, &self.records).map_err(io::Error::other)?;
            encoder.finish()?;
            Ok(())
        })?;

        Ok(())
    }

    /// Replaces every record and rebuilds both indexes.
    pub fn replace(&mut self, records: Vec<CatalogRecord>) {
        self.records = records;
        self.rebuild_indexes();
    }

    /// Drops records without any web extension file.
    pub fn webext_only(self) -> Self {
        let records = self
            .records
            .into_iter()
            .filter(CatalogRecord::is_webextension)
            .collect();
        Self::new(records)
    }

    fn rebuild_indexes(&mut self) {
        self.by_id.clear();
        self.by_hash.clear();

        for (idx, record) in self.records.iter().enumerate() {
            self.by_id.insert(record.id, idx);

            for digest in record.files().filter_map(|f| f.digest()) {
                let digest = digest.to_ascii_lowercase();
                if let Some(previous) = self.by_hash.insert(digest.clone(), idx) {
                    let previous_id = self.records[previous].id;
                    if previous_id != record.id {
                        warn!(
                            hash = %digest,
                            "hash shared by catalog records {} and {}", previous_id, record.id
                        );
                    }
                }
            }
        }
    }

    /// Web extension records, in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &CatalogRecord> {
        self.records.iter().filter(|r| r.is_webextension())
    }

    /// Every record, including those that are not web extensions.
    pub fn raw_records(&self) -> &[CatalogRecord] {
        &self.records
    }

    /// Number of web extension records.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `token` parses as an id present in the catalog.
    pub fn is_known_id(&self, token: &str) -> bool {
        token
            .parse::<u64>()
            .is_ok_and(|id| self.by_id.contains_key(&id))
    }

    /// Hashes compare case-insensitively.
    pub fn is_known_hash(&self, hash: &str) -> bool {
        self.by_hash.contains_key(&hash.to_ascii_lowercase())
    }

    pub fn get_by_id(&self, id: u64) -> Option<&CatalogRecord> {
        self.by_id.get(&id).map(|&idx| &self.records[idx])
    }

    pub fn get_by_hash(&self, hash: &str) -> Option<&CatalogRecord> {
        self.by_hash
            .get(&hash.to_ascii_lowercase())
            .map(|&idx| &self.records[idx])
    }

    /// Looks a token up as an id first, then as a hash.
    pub fn get(&self, token: &str) -> Option<&CatalogRecord> {
        token
            .parse::<u64>()
            .ok()
            .and_then(|id| self.get_by_id(id))
            .or_else(|| self.get_by_hash(token))
    }

    /// SHA-256 digests of the web extension files of `id`.
    pub fn id_to_hashes(&self, id: u64) -> Option<Vec<String>> {
        self.get_by_id(id).map(CatalogRecord::file_hashes)
    }

    pub fn hash_to_id(&self, hash: &str) -> Option<u64> {
        self.get_by_hash(hash).map(CatalogRecord::id)
    }
}
