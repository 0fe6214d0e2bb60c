//! Process-wide tracing setup.

use std::sync::Once;

use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

static INIT: Once = Once::new();

/// Install the global subscriber once. `RUST_LOG` wins; otherwise `info`.
pub fn init(level: Option<&str>) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("RUST_LOG")
            .or_else(|_| EnvFilter::try_new(level.unwrap_or("info")))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let fmt_layer = fmt::layer().with_target(false).with_ansi(true).boxed();

        let subscriber = Registry::default().with(filter).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
            .expect("failed to set global tracing subscriber");
    });
}
