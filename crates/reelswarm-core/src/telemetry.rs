//! Tracing setup for the `reelswarm` binary.
//!
//! Without `RUST_LOG`, our own crates log at the requested level and HTTP
//! plumbing (reqwest, hyper, rustls) stays at `warn`.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const OWN_CRATES: [&str; 3] = ["reelswarm_core", "reel_store", "reelswarm"];

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(level: Level) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(OWN_CRATES.iter().map(|krate| format!("{krate}={level}")));
    directives.join(",")
}

/// Install the global subscriber. Returns `false` if one was already set.
///
/// Pretty output goes to stderr so stdout stays free for command results;
/// `json` switches to newline-delimited JSON on stdout for log shippers.
pub fn init_tracing(json: bool, level: Level) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
    installed.is_ok()
}
