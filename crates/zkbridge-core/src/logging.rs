//! Tracing setup for binaries and demos embedding the bridge.

use crate::{Error, Result};

/// Install a stderr `fmt` subscriber filtered by `RUST_LOG`, at `info` and
/// above by default.
///
/// # Errors
///
/// Returns `InvalidConfig` if a global subscriber is already installed.
pub fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| Error::invalid_config(format!("Failed to initialize tracing subscriber: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        // Another test may already have installed a subscriber; either way the
        // second attempt in this test must be rejected.
        let _ = init_tracing();
        assert!(init_tracing().is_err());
    }
}
