use std::any::type_name;

use documented::{Documented, DocumentedFields};
use toml_edit::{Decor, Item, RawString, Table};
use tracing::warn;

use crate::error::{ConfigError, Result};

/// Appends each line of `docs` to the decor prefix as a `#` comment.
pub fn append_docs_as_toml_comments(decor: &mut Decor, docs: &str) {
    let mut prefix = decor
        .prefix()
        .and_then(RawString::as_str)
        .unwrap_or_default()
        .to_string();

    if !prefix.is_empty() && !prefix.ends_with("\n\n") {
        prefix.push_str("#\n");
    }

    for line in docs.lines() {
        if line.is_empty() {
            prefix.push_str("#\n");
        } else {
            prefix.push_str("# ");
            prefix.push_str(line);
            prefix.push('\n');
        }
    }

    decor.set_prefix(prefix);
}

/// Annotates every key of `table` with the field documentation of `T`.
///
/// Keys that have no matching documented field are logged and left as they
/// are.
pub fn annotate_toml_table<T>(table: &mut Table) -> Result<()>
where
    T: Documented + DocumentedFields,
{
    for (mut key, item) in table.iter_mut() {
        let name = key.get().to_string();
        let Ok(docs) = T::get_field_docs(&name) else {
            warn!(
                "Field '{}' has no documentation in '{}'",
                name,
                type_name::<T>()
            );
            continue;
        };

        match item {
            Item::None => return Err(ConfigError::UnexpectedTomlItem(name)),
            Item::Value(_) => append_docs_as_toml_comments(key.leaf_decor_mut(), docs),
            Item::Table(sub) => append_docs_as_toml_comments(sub.decor_mut(), docs),
            Item::ArrayOfTables(array) => {
                if let Some(first) = array.iter_mut().next() {
                    append_docs_as_toml_comments(first.decor_mut(), docs);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn prefix_of(decor: &Decor) -> String {
        decor
            .prefix()
            .and_then(|p| p.as_str())
            .unwrap_or_default()
            .to_string()
    }

    #[test]
    fn test_append_docs_multiline() {
        let mut decor = Decor::new("", "");
        append_docs_as_toml_comments(&mut decor, "Line 1\n\nLine 2");

        assert_eq!(prefix_of(&decor), "# Line 1\n#\n# Line 2\n");
    }

    #[test]
    fn test_append_docs_after_existing_prefix() {
        let mut decor = Decor::new("# existing\n", "");
        append_docs_as_toml_comments(&mut decor, "added");

        assert_eq!(prefix_of(&decor), "# existing\n#\n# added\n");
    }

    #[test]
    fn test_annotated_document_has_field_docs() {
        let config = Config::default_config();
        let doc = config.to_annotated_document().unwrap().to_string();

        assert!(doc.contains("# Number of catalog records requested per page."));
        assert!(doc.contains("page_size = 50"));
    }
}
