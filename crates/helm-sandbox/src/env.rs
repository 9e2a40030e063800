use std::path::Path;

const REDIRECTED_VARS: [&str; 3] = ["TMPDIR", "TEMP", "TMP"];

/// Redirects the process' scratch-space environment variables to a session's
/// `tmp/<sid>/` directory and restores whatever was there before on drop.
/// `std::env::set_var` is process-global, so only one sandbox may be entered
/// at a time per process — this matches the single-session-per-worker model
/// the executor runs under.
pub struct EnvGuard {
    previous: Vec<(&'static str, Option<String>)>,
}

impl EnvGuard {
    pub fn apply(tmp_dir: &Path) -> Self {
        let tmp_str = tmp_dir.display().to_string();
        let mut previous = Vec::with_capacity(REDIRECTED_VARS.len() + 1);

        for var in REDIRECTED_VARS {
            previous.push((var, std::env::var(var).ok()));
            std::env::set_var(var, &tmp_str);
        }
        previous.push((
            "PYTHONDONTWRITEBYTECODE",
            std::env::var("PYTHONDONTWRITEBYTECODE").ok(),
        ));
        std::env::set_var("PYTHONDONTWRITEBYTECODE", "1");

        Self { previous }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (var, value) in &self.previous {
            match value {
                Some(v) => std::env::set_var(var, v),
                None => std::env::remove_var(var),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restores_prior_value_on_drop() {
        std::env::set_var("TMPDIR", "/prior/tmp");
        {
            let _guard = EnvGuard::apply(Path::new("/sandbox/tmp/s-1"));
            assert_eq!(std::env::var("TMPDIR").unwrap(), "/sandbox/tmp/s-1");
        }
        assert_eq!(std::env::var("TMPDIR").unwrap(), "/prior/tmp");
    }

    #[test]
    fn removes_var_that_was_previously_unset() {
        std::env::remove_var("PYTHONDONTWRITEBYTECODE");
        {
            let _guard = EnvGuard::apply(Path::new("/sandbox/tmp/s-2"));
            assert_eq!(std::env::var("PYTHONDONTWRITEBYTECODE").unwrap(), "1");
        }
        assert!(std::env::var("PYTHONDONTWRITEBYTECODE").is_err());
    }
}
