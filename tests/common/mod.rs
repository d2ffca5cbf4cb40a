#![allow(dead_code)]

pub mod mocks;

use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a per-binary test subscriber; `RUST_LOG` controls the level.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
