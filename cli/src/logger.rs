//! Logger init: a `tracing_subscriber` `Registry` with one stdio layer
//! built from an `EnvFilter`. No file layer — a rolling file sink is a
//! deployment convenience this binary doesn't need since it always runs
//! attached to a controlling process.

use tracing_subscriber::{Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_logger(level: &str) {
    let filter = tracing_subscriber::EnvFilter::new(level);
    let stdio_layer = fmt::Layer::default().with_filter(filter);
    Registry::default().with(stdio_layer).init();
}
