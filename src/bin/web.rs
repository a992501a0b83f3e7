#![cfg(not(tarpaulin_include))]

use sheetdesk::app;
use sheetdesk::config::Settings;

/// Serve the dataset API and the static front end.
///
/// Settings come from `SHEETDESK_*` variables; `RUST_LOG` controls logging.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::from_env()?;
    app::run(settings).await
}
