//! Logger construction (spec §9 "Global state"): built once, explicitly,
//! at the entrypoint and never touched again — no lazily-initialized
//! global logger config file, per the redesign note.

use tracing_subscriber::{fmt, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_env("KUBESTAGE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(atty_stderr())
        .init();
}

fn atty_stderr() -> bool {
    use std::io::IsTerminal;
    std::io::stderr().is_terminal()
}
