//! `pget config` – print the effective configuration.

use anyhow::Result;
use pget_core::config::{self, FetchConfig};
use std::path::Path;

pub fn run_config(cfg: &FetchConfig, explicit: Option<&Path>) -> Result<()> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => config::config_path()?,
    };
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}
