//! Command handlers.

pub mod connect;
pub mod validate;

use tm_core::config::ConfigHandle;
use tm_core::error::TmResult;

/// Print the active configuration.
pub async fn show_config(config: ConfigHandle) -> TmResult<()> {
    let config = config.read().await;
    println!("{}", serde_json::to_string_pretty(&*config)?);
    Ok(())
}
