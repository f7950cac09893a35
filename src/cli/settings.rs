use std::error::Error;
use std::path::Path;

use crate::cli::CliContext;
use crate::core::config::data::path_display;
use crate::core::config::{Config, ConfigKey};

/// `toolchat set <key> <value>`; with no key or value, print the config.
pub fn set(
    config: &mut Config,
    config_path: &Path,
    key: Option<&str>,
    value: &[String],
) -> Result<(), Box<dyn Error>> {
    let (Some(key), false) = (key, value.is_empty()) else {
        config.print_all();
        return Ok(());
    };

    let key = ConfigKey::parse(key)?;
    let value = value.join(" ");
    config.set(key, &value)?;
    config.save_to_path(config_path)?;
    println!("✅ Set {} to: {value}", key.as_str());
    Ok(())
}

pub fn unset(config: &mut Config, config_path: &Path, key: &str) -> Result<(), Box<dyn Error>> {
    let key = ConfigKey::parse(key)?;
    config.unset(key);
    config.save_to_path(config_path)?;
    println!("✅ Unset {}", key.as_str());
    Ok(())
}

pub fn reset_session(context: &mut CliContext) -> Result<(), Box<dyn Error>> {
    context.session.reset()?;
    println!(
        "🔄 New session {} (stored in {})",
        context.session.session_id(),
        path_display(context.config.session_file_path())
    );
    Ok(())
}
