use std::{env, path::PathBuf};

use crate::error::{PathError, PathResult};

/// Expands a user supplied path.
///
/// `$VAR` and `${VAR}` are replaced from the environment, a leading `~`
/// becomes the home directory, and relative results are anchored at the
/// current working directory.
///
/// # Errors
///
/// * [`PathError::Empty`] if the path is blank
/// * [`PathError::MissingEnvVar`] if a referenced variable is not set
/// * [`PathError::UnclosedVariable`] for `${VAR` without the closing brace
/// * [`PathError::CurrentDir`] if the working directory cannot be determined
///
/// # Example
///
/// ```no_run
/// use extmirror_utils::path::resolve_path;
///
/// let workdir = resolve_path("~/.extmirror").unwrap();
/// assert!(workdir.is_absolute());
/// ```
pub fn resolve_path(path: &str) -> PathResult<PathBuf> {
    let path = path.trim();
    if path.is_empty() {
        return Err(PathError::Empty);
    }

    let expanded = PathBuf::from(expand_variables(path)?);
    if expanded.is_absolute() {
        return Ok(expanded);
    }

    env::current_dir()
        .map(|cwd| cwd.join(expanded))
        .map_err(|err| PathError::CurrentDir { source: err })
}

fn expand_variables(path: &str) -> PathResult<String> {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;

    if let Some(stripped) = rest.strip_prefix('~') {
        if stripped.is_empty() || stripped.starts_with('/') {
            out.push_str(&home_dir().to_string_lossy());
            rest = stripped;
        }
    }

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, remainder) = if let Some(braced) = after.strip_prefix('{') {
            let end = braced.find('}').ok_or_else(|| {
                PathError::UnclosedVariable {
                    input: format!("${{{braced}"),
                }
            })?;
            (&braced[..end], &braced[end + 1..])
        } else {
            let end = after
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], &after[end..])
        };

        if name.is_empty() {
            out.push('$');
        } else {
            let value = env::var(name).map_err(|_| {
                PathError::MissingEnvVar {
                    var: name.to_string(),
                    input: path.to_string(),
                }
            })?;
            out.push_str(&value);
        }
        rest = remainder;
    }

    out.push_str(rest);
    Ok(out)
}

/// The user's home directory, from `$HOME`.
pub fn home_dir() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/"))
}

/// `$XDG_CONFIG_HOME`, defaulting to `$HOME/.config`.
pub fn xdg_config_home() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", ".config")
}

/// `$XDG_DATA_HOME`, defaulting to `$HOME/.local/share`.
pub fn xdg_data_home() -> PathBuf {
    xdg_dir("XDG_DATA_HOME", ".local/share")
}

fn xdg_dir(var: &str, fallback: &str) -> PathBuf {
    env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| home_dir().join(fallback))
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    fn with_vars<F: FnOnce()>(vars: &[(&str, Option<&str>)], f: F) {
        let saved: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var_os(k))).collect();
        for (key, value) in vars {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
        f();
        for (key, value) in saved {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }

    #[test]
    #[serial]
    fn test_resolve_absolute_and_relative() {
        assert_eq!(
            resolve_path("/absolute/path").unwrap(),
            PathBuf::from("/absolute/path")
        );
        assert_eq!(
            resolve_path("relative/path").unwrap(),
            env::current_dir().unwrap().join("relative/path")
        );
        assert!(matches!(resolve_path("  "), Err(PathError::Empty)));
    }

    #[test]
    #[serial]
    fn test_resolve_tilde_only_at_start() {
        with_vars(&[("HOME", Some("/tmp/home"))], || {
            assert_eq!(resolve_path("~").unwrap(), PathBuf::from("/tmp/home"));
            assert_eq!(
                resolve_path("~/.extmirror").unwrap(),
                PathBuf::from("/tmp/home/.extmirror")
            );
            assert_eq!(
                resolve_path("/srv/~/x").unwrap(),
                PathBuf::from("/srv/~/x")
            );
        });
    }

    #[test]
    #[serial]
    fn test_expand_variables() {
        with_vars(&[("EXTM_A", Some("alpha")), ("EXTM_B", Some("beta"))], || {
            assert_eq!(expand_variables("/$EXTM_A/${EXTM_B}x").unwrap(), "/alpha/betax");
            assert_eq!(expand_variables("/data/$").unwrap(), "/data/$");
            assert_eq!(expand_variables("/data/$!x").unwrap(), "/data/$!x");
        });
    }

    #[test]
    #[serial]
    fn test_expand_variables_errors() {
        with_vars(&[("EXTM_MISSING", None)], || {
            assert!(matches!(
                expand_variables("$EXTM_MISSING/x"),
                Err(PathError::MissingEnvVar { .. })
            ));
            assert!(matches!(
                expand_variables("${EXTM_MISSING"),
                Err(PathError::UnclosedVariable { .. })
            ));
        });
    }

    #[test]
    #[serial]
    fn test_xdg_dirs() {
        with_vars(
            &[
                ("HOME", Some("/tmp/home")),
                ("XDG_CONFIG_HOME", None),
                ("XDG_DATA_HOME", Some("/tmp/data")),
            ],
            || {
                assert_eq!(xdg_config_home(), PathBuf::from("/tmp/home/.config"));
                assert_eq!(xdg_data_home(), PathBuf::from("/tmp/data"));
            },
        );
    }
}
