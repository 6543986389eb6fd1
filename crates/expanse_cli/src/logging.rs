//! Tracing subscriber setup for the CLI.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::GlobalArgs;

/// Picks the filter directive: `-q` and `-v` win, then `RUST_LOG`, then the
/// configured default.
fn filter(global: &GlobalArgs, configured: &str) -> EnvFilter {
    if global.quiet {
        EnvFilter::new("error")
    } else if global.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured))
    }
}

/// Installs a stderr `fmt` subscriber. Later calls are no-ops.
pub fn init(global: &GlobalArgs, configured: &str) {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter(global, configured))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global(quiet: bool, verbose: bool) -> GlobalArgs {
        GlobalArgs {
            quiet,
            verbose,
            config: None,
            store: None,
        }
    }

    #[test]
    fn quiet_wins() {
        let f = filter(&global(true, true), "trace");
        assert_eq!(f.to_string(), "error");
    }

    #[test]
    fn verbose_overrides_config() {
        let f = filter(&global(false, true), "warn");
        assert_eq!(f.to_string(), "debug");
    }

    #[test]
    fn init_twice_is_harmless() {
        init(&global(true, false), "warn");
        init(&global(true, false), "warn");
    }
}
