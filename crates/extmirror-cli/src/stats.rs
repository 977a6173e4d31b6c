use std::{
    collections::BTreeSet,
    fs::File,
    io::{self, BufWriter, Write},
};

use extmirror_core::context::MirrorContext;
use extmirror_registry::CatalogRecord;
use extmirror_utils::path::resolve_path;
use miette::{IntoDiagnostic, Result, WrapErr};
use tracing::info;

const HEADER: [&str; 6] = [
    "amo_id",
    "name",
    "average_daily_users",
    "weekly_downloads",
    "host_permissions",
    "api_permissions",
];

/// Writes one CSV row per web extension, to `output` or stdout.
pub fn write_stats(ctx: &MirrorContext, output: Option<&str>) -> Result<()> {
    match output {
        Some(output) => {
            let path = resolve_path(output).into_diagnostic()?;
            let file = File::create(&path)
                .into_diagnostic()
                .wrap_err_with(|| format!("creating {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            write_csv(&mut writer, ctx.snapshot().iter()).into_diagnostic()?;
            writer.flush().into_diagnostic()?;
            info!("Statistics written to {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            write_csv(&mut stdout.lock(), ctx.snapshot().iter()).into_diagnostic()?;
        }
    }
    Ok(())
}

fn write_csv<'a, W, I>(writer: &mut W, records: I) -> io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a CatalogRecord>,
{
    writeln!(writer, "{}", HEADER.join(","))?;

    for record in records {
        let permissions = record.permissions();
        let row = [
            record.id.to_string(),
            record.display_name().to_string(),
            number(record.average_daily_users),
            number(record.weekly_downloads),
            joined(permissions.host.as_ref()),
            joined(permissions.api.as_ref()),
        ];
        let row: Vec<String> = row.iter().map(|field| escape(field)).collect();
        writeln!(writer, "{}", row.join(","))?;
    }

    Ok(())
}

fn number(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn joined(set: Option<&BTreeSet<String>>) -> String {
    set.map(|set| set.iter().cloned().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_write_csv() {
        let record: CatalogRecord = serde_json::from_value(json!({
            "id": 7,
            "name": { "en-US": "Tabs, \"Pro\"" },
            "average_daily_users": 1200,
            "current_version": { "files": [{
                "hash": format!("sha256:{}", "a".repeat(64)),
                "url": "https://example.org/a.xpi",
                "is_webextension": true,
                "permissions": ["tabs", "storage", "<all_urls>"]
            }]}
        }))
        .unwrap();

        let mut out = Vec::new();
        write_csv(&mut out, [&record]).unwrap();
        let out = String::from_utf8(out).unwrap();
        let lines: Vec<_> = out.lines().collect();

        assert_eq!(
            lines[0],
            "amo_id,name,average_daily_users,weekly_downloads,host_permissions,api_permissions"
        );
        assert_eq!(lines[1], "7,\"Tabs, \"\"Pro\"\"\",1200,,<all_urls>,storage tabs");
    }
}
