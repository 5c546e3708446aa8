//! CLI command implementations

mod config;
mod info;
mod run;

pub use config::{config, ConfigArgs};
pub use info::info;
pub use run::{run, RunArgs};

use deskstream_core::DeskstreamError;

/// Convert a core error, appending its hint when there is one
pub(crate) fn with_hint(err: DeskstreamError) -> anyhow::Error {
    match err.user_hint() {
        Some(hint) => anyhow::anyhow!("{}\nHint: {}", err, hint),
        None => err.into(),
    }
}
