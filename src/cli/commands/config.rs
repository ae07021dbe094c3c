//! Config Command
//!
//! Usage:
//!   sampling-lab config show [-f json]
//!   sampling-lab config path
//!   sampling-lab config init [-g] [--force]

use crate::cli::ui::Output;
use crate::config::ConfigLoader;
use crate::constants::history as history_constants;
use crate::types::Result;

/// Print the effective configuration (all layers merged)
pub fn show(format: &str) -> Result<()> {
    let config = ConfigLoader::load()?;
    println!("{}", ConfigLoader::render(&config, format == "json")?);
    Ok(())
}

pub fn path() -> Result<()> {
    let out = Output::new();
    let describe = |path: &std::path::Path| {
        let state = if path.exists() { "" } else { " (not found)" };
        format!("{}{}", path.display(), state)
    };

    match ConfigLoader::global_config_path() {
        Some(global) => out.field("Global", describe(&global)),
        None => out.field("Global", "unavailable"),
    }
    out.field("Project", describe(&ConfigLoader::project_config_path()));

    let history = ConfigLoader::load()
        .map(|config| ConfigLoader::history_path(&config))
        .unwrap_or_else(|_| ConfigLoader::project_dir().join(history_constants::FILE_NAME));
    out.field("History", describe(&history));
    Ok(())
}

pub fn init(global: bool, force: bool) -> Result<()> {
    let out = Output::new();
    let existed = if global {
        ConfigLoader::global_config_path().is_some_and(|p| p.exists())
    } else {
        ConfigLoader::project_config_path().exists()
    };

    let path = ConfigLoader::init(global, force)?;
    if existed && !force {
        out.warning(&format!(
            "Config already exists: {} (use --force to overwrite)",
            path.display()
        ));
    } else {
        out.success(&format!("Wrote {}", path.display()));
    }
    Ok(())
}
