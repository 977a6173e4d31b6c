use std::collections::BTreeMap;

use extmirror_core::context::MirrorContext;
use extmirror_registry::CatalogRecord;
use miette::{IntoDiagnostic, Result};
use nu_ansi_term::Color::{Blue, Cyan, Green};
use serde::{Serialize, Serializer};
use tracing::info;

use crate::utils::{display_id, Colored};

/// Prints `id  hash  name` per selected hash. Returns false when nothing
/// matched.
pub fn query(ctx: &MirrorContext, selectors: &[String]) -> bool {
    let selection = ctx.select(selectors);

    for (id, hashes) in &selection {
        let name = id
            .and_then(|id| ctx.snapshot().get_by_id(id))
            .map(|record| record.display_name())
            .unwrap_or_default();
        for hash in hashes {
            info!(
                id = ?id,
                hash = hash.as_str(),
                name,
                "{}\t{}\t{}",
                Colored(Blue, display_id(*id)),
                Colored(Cyan, hash),
                Colored(Green, name)
            );
        }
    }

    !selection.is_empty()
}

/// Prints `id  path` per stored file.
pub fn get(ctx: &MirrorContext, selectors: &[String]) -> bool {
    let files = ctx.get_files(selectors);

    for (id, paths) in &files {
        for (hash, path) in paths {
            info!(
                id = ?id,
                hash = hash.as_str(),
                path = %path.display(),
                "{}\t{}",
                Colored(Blue, display_id(*id)),
                path.display()
            );
        }
    }

    !files.is_empty()
}

/// Prints the selected records as pretty JSON keyed by id. Orphans map to
/// `null`.
pub fn meta(ctx: &MirrorContext, selectors: &[String]) -> Result<bool> {
    let records = MetaOutput(ctx.get_meta(selectors));
    if records.0.is_empty() {
        return Ok(false);
    }

    let json = serde_json::to_string_pretty(&records).into_diagnostic()?;
    println!("{json}");
    Ok(true)
}

/// Keeps numeric id order in the JSON object.
struct MetaOutput<'a>(BTreeMap<Option<u64>, Option<&'a CatalogRecord>>);

impl Serialize for MetaOutput<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(id, record)| (display_id(*id), record)))
    }
}

pub fn show_info(ctx: &MirrorContext) {
    let info = ctx.info();

    info!(ids = info.ids, "AMO IDs in local cache: {}", info.ids);
    info!(
        referenced = info.referenced,
        "Referenced extensions in cache: {}", info.referenced
    );
    info!(files = info.files, "Total files in cache: {}", info.files);
    info!(orphans = info.orphans, "Orphans in cache: {}", info.orphans);
}
