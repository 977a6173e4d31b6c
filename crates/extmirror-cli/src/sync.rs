use extmirror_core::{
    context::{MirrorContext, SyncOptions},
    MirrorResult,
};
use nu_ansi_term::Color::{Green, Yellow};
use tracing::{debug, info, warn};

use crate::utils::Colored;

/// Runs a sync and reports its counts, including after a partial catalog
/// refresh. The catalog failure is returned once the counts are logged.
pub async fn sync_mirror(ctx: &mut MirrorContext, options: SyncOptions) -> MirrorResult<()> {
    debug!(?options, "starting sync");

    let mut report = ctx.sync(&options).await?;
    let files = &report.files;

    info!(
        records = report.records,
        stored = files.stored,
        already_present = files.already_present,
        skipped = files.skipped,
        missing = files.missing.len(),
        "{} web extensions in catalog, {} new files stored, {} unavailable",
        Colored(Green, report.records),
        Colored(Green, files.stored),
        Colored(Yellow, files.missing.len()),
    );

    if !report.is_complete() {
        warn!("Sync incomplete, run it again later to fetch the rest");
    }
    match report.catalog_error.take() {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}
