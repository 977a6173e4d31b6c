//! Resolution of selector tokens into stored content hashes.

use std::collections::{BTreeMap, BTreeSet};

use extmirror_registry::CatalogSnapshot;
use extmirror_utils::hash::SHA256_HEX_LEN;
use regex::RegexBuilder;
use tracing::{debug, warn};

use crate::{
    constants::{SELECT_ALL, SELECT_ORPHANS},
    store::ContentStore,
};

/// Content hashes per catalog id; `None` collects orphans.
pub type Selection = BTreeMap<Option<u64>, BTreeSet<String>>;

pub struct SelectorResolver<'a> {
    snapshot: &'a CatalogSnapshot,
    store: &'a ContentStore,
}

impl<'a> SelectorResolver<'a> {
    pub fn new(snapshot: &'a CatalogSnapshot, store: &'a ContentStore) -> Self {
        Self { snapshot, store }
    }

    /// Resolves every token and unions the results per id.
    ///
    /// Each token is tried as, in order: `all`, `orphans`, a known catalog id,
    /// a known content hash, a stored hash no record refers to, and finally a
    /// case-insensitive regular expression anchored at the start of the
    /// display name. Tokens matching nothing are ignored.
    pub fn resolve<S: AsRef<str>>(&self, selectors: &[S]) -> Selection {
        let mut selection = Selection::new();
        let mut stored = None;

        for token in selectors {
            let token = token.as_ref();
            if token == SELECT_ALL {
                for record in self.snapshot.iter() {
                    add(&mut selection, Some(record.id), record.file_hashes());
                }
            } else if token == SELECT_ORPHANS {
                let orphans: Vec<String> = stored
                    .get_or_insert_with(|| self.store.hashes())
                    .iter()
                    .filter(|hash| !self.snapshot.is_known_hash(hash))
                    .cloned()
                    .collect();
                add(&mut selection, None, orphans);
            } else if let Some(id) = self.known_id(token) {
                let hashes = self.snapshot.id_to_hashes(id).unwrap_or_default();
                add(&mut selection, Some(id), hashes);
            } else if let Some(id) = self.snapshot.hash_to_id(token) {
                add(&mut selection, Some(id), [token.to_ascii_lowercase()]);
            } else if is_hash_like(token) && self.store.contains(token) {
                add(&mut selection, None, [token.to_ascii_lowercase()]);
            } else {
                self.match_names(&mut selection, token);
            }
        }

        selection
    }

    fn known_id(&self, token: &str) -> Option<u64> {
        self.snapshot
            .is_known_id(token)
            .then(|| token.parse().ok())
            .flatten()
    }

    fn match_names(&self, selection: &mut Selection, pattern: &str) {
        let regex = match RegexBuilder::new(&format!("^(?:{pattern})"))
            .case_insensitive(true)
            .build()
        {
            Ok(regex) => regex,
            Err(err) => {
                warn!("Invalid selector `{pattern}`: {err}");
                return;
            }
        };

        for record in self.snapshot.iter() {
            if regex.is_match(record.display_name()) {
                debug!(id = record.id, "`{pattern}` matches {}", record.display_name());
                add(selection, Some(record.id), record.file_hashes());
            }
        }
    }
}

fn is_hash_like(token: &str) -> bool {
    token.len() == SHA256_HEX_LEN && token.chars().all(|c| c.is_ascii_alphanumeric())
}

fn add<I>(selection: &mut Selection, id: Option<u64>, hashes: I)
where
    I: IntoIterator<Item = String>,
{
    let mut hashes = hashes.into_iter().peekable();
    if hashes.peek().is_some() {
        selection.entry(id).or_default().extend(hashes);
    }
}
