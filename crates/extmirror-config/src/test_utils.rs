use std::env;

/// Runs `f` with the given environment variables set, restoring the previous
/// values afterwards. Callers must be `#[serial]`.
pub fn with_env<F>(vars: &[(&str, &str)], f: F)
where
    F: FnOnce(),
{
    let saved: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var_os(k))).collect();

    for (key, value) in vars {
        env::set_var(key, value);
    }

    f();

    for (key, previous) in saved {
        match previous {
            Some(v) => env::set_var(key, v),
            None => env::remove_var(key),
        }
    }
}
