//! Built-in plugins
//!
//! Plugins are looked up by implementation name when a configuration file
//! declares them.

use crate::categories::CategoryRule;
use crate::error::{Error, Result};
use crate::plugin::{Plugin, PluginOptions};

pub mod data;

pub use data::DataPlugin;

/// Implementation names accepted by [`create_plugin`]
pub const AVAILABLE_PLUGINS: &[&str] = &["data"];

/// Instantiate the built-in plugin called `implementation`
///
/// `categories` are the configured failure category rules, for plugins
/// that classify failures.
pub fn create_plugin(
    implementation: &str,
    options: &PluginOptions,
    categories: &[CategoryRule],
) -> Result<Box<dyn Plugin>> {
    match implementation {
        "data" => Ok(Box::new(
            DataPlugin::from_options(options)?.with_category_rules(categories.to_vec()),
        )),
        other => Err(Error::Config(format!(
            "Unknown plugin '{}' (available: {})",
            other,
            AVAILABLE_PLUGINS.join(", ")
        ))),
    }
}
