//! Tracing subscriber setup.

use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise the level is `debug` or `info`.
/// Returns `false` if a subscriber was already installed.
pub fn init_tracing(debug: bool) -> bool {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| build_env_filter(debug));
    let fmt_layer = tracing_subscriber::fmt::layer().compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
}

fn build_env_filter(debug: bool) -> tracing_subscriber::EnvFilter {
    if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::new("info")
    }
}

#[cfg(test)]
mod tests {
    use super::init_tracing;

    #[test]
    fn second_install_is_a_no_op() {
        init_tracing(true);
        assert!(!init_tracing(false));
    }
}
