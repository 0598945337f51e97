//! Tracing bootstrap for binaries embedding Modelgate.
//!
//! Library code only emits `tracing` events; the host decides whether to
//! install this subscriber or its own.

use tracing_subscriber::EnvFilter;

/// Install a compact `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `verbose` selects
/// `modelgate=debug,info` over `warn`. Calling it twice is harmless.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

fn default_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("modelgate=debug,info")
    } else {
        EnvFilter::new("warn")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_does_not_panic() {
        init(false);
        init(true);
    }
}
