use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::anyhow;
use config::{Config, File};
use log::debug;
use serde::Deserialize;
use tenropes_core::api::DEFAULT_BASE_URL;

use crate::cli::Args;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub dedupe_live: Option<bool>,
}

const CONFIG_DIR_NAME: &str = env!("CARGO_PKG_NAME");

fn get_xdg_config_path() -> Option<PathBuf> {
    if let Ok(xdg_config) = env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config));
    }

    if let Ok(home) = env::var("HOME") {
        return Some(PathBuf::from(home).join(".config"));
    }

    None
}

pub fn config_file_in(config_home: &Path) -> PathBuf {
    config_home.join(CONFIG_DIR_NAME).join("config.toml")
}

pub fn load_settings(config_path: &Path) -> anyhow::Result<Settings> {
    if !config_path.exists() {
        return Ok(Settings::default());
    }

    Config::builder()
        .add_source(File::from(config_path.to_path_buf()).required(false))
        .build()?
        .try_deserialize()
        .map_err(|e| {
            anyhow!(
                "Failed to deserialize config file {}: {}",
                config_path.display(),
                e
            )
        })
}

/// Fills the arguments the command line left empty from `settings`, then falls
/// back to the public backend URL.
pub fn apply_settings(args: &Args, settings: Settings) -> Args {
    let mut new_args = args.clone();

    macro_rules! apply_if_empty {
        ($args:expr, $field:ident, $config:expr) => {
            if let Some(value) = $config.$field {
                if $args.$field.is_empty() {
                    $args.$field = value;
                }
            }
        };
    }

    apply_if_empty!(new_args, base_url, settings);
    apply_if_empty!(new_args, token, settings);

    if settings.dedupe_live == Some(true) {
        new_args.dedupe = true;
    }

    if new_args.base_url.is_empty() {
        new_args.base_url = DEFAULT_BASE_URL.to_string();
    }

    new_args
}

pub fn merge_settings_with_args(args: &Args) -> anyhow::Result<Args> {
    let settings = match get_xdg_config_path() {
        Some(config_home) => load_settings(&config_file_in(&config_home))?,
        None => Settings::default(),
    };

    let merged = apply_settings(args, settings);
    debug!(
        "merged config: base_url={} dedupe={} token set={}",
        merged.base_url,
        merged.dedupe,
        !merged.token.is_empty()
    );

    Ok(merged)
}
