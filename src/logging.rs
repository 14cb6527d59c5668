// SPDX-License-Identifier: AGPL-3.0-or-later

use tracing_subscriber::FmtSubscriber;

/// Initializes the global `tracing` subscriber. Call once, near the start
/// of a host process embedding this crate.
pub fn init(debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Setting default log subscriber failed");
}
