use extmirror_core::context::MirrorContext;
use miette::{miette, Result};
use nu_ansi_term::Color::{Green, Red, Yellow};
use tracing::{error, info, warn};

use crate::utils::Colored;

/// Re-digests the selected files. Returns false when nothing was selected.
///
/// Fails if any stored file does not match its hash.
pub fn verify_files(ctx: &MirrorContext, selectors: &[String]) -> Result<bool> {
    let report = ctx.verify(selectors);

    for hash in &report.missing {
        warn!(hash = hash.as_str(), "{hash} is not stored");
    }
    for hash in &report.corrupt {
        error!(hash = hash.as_str(), "{hash} failed verification");
    }

    info!(
        checked = report.checked,
        corrupt = report.corrupt.len(),
        missing = report.missing.len(),
        "{} files checked, {} corrupt, {} missing",
        Colored(Green, report.checked),
        Colored(Red, report.corrupt.len()),
        Colored(Yellow, report.missing.len())
    );

    if !report.corrupt.is_empty() {
        return Err(miette!(
            help = "Remove the files and run `extmirror sync -n` to fetch them again",
            "{} stored files failed verification",
            report.corrupt.len()
        ));
    }
    Ok(report.checked + report.missing.len() > 0)
}
