//! CLI command implementations
//!
//! Each command loads what it needs from `ablr_core` and prints through
//! [`crate::output`].

use ablr_core::{
    AblScanner, ConfigLoader, Processor, RefactorConfig, RollbackManager, ScanManager, TokenStore,
};
use anyhow::{Context, bail};
use std::path::Path;
use tracing::{debug, info};

use crate::output;

/// Load the explicit config file, else the one discovered upward from
/// `start_dir`, else the defaults
pub fn load_config(custom: Option<&Path>, start_dir: Option<&Path>) -> anyhow::Result<RefactorConfig> {
    let start_dir = start_dir.filter(|dir| !dir.as_os_str().is_empty());
    let config = ConfigLoader::load(custom, start_dir).context("Failed to load configuration")?;
    debug!("Effective propath: {:?}", config.propath);
    Ok(config)
}

/// Scan command implementation
pub fn scan_command(file: &Path) -> anyhow::Result<()> {
    let mut store = TokenStore::new();
    let mut scans = ScanManager::new(AblScanner);
    let scan = scans.scan_for_path(&mut store, file)?;
    for id in store.scan_tokens(scan)? {
        output::print_token(store.node(id)?);
    }
    Ok(())
}

/// Expand command implementation
pub fn expand_command(
    config: &RefactorConfig,
    file: &Path,
    text: bool,
    includes: bool,
) -> anyhow::Result<()> {
    let tree = Processor::new(config)
        .generate_tree(file)
        .with_context(|| format!("Failed to expand {}", file.display()))?;

    if text {
        if let Some(root) = tree.root() {
            print!("{}", tree.expansion_text(root));
        }
    } else if includes {
        let mut store = TokenStore::new();
        let listing = tree.include_listing(store.files_mut());
        output::print_include_listing(&listing, store.files());
    } else {
        print!("{}", tree.render());
    }
    Ok(())
}

/// Indent command implementation
pub fn indent_command(
    config: &RefactorConfig,
    file: &Path,
    from: u32,
    to: u32,
    indent: Option<&str>,
) -> anyhow::Result<()> {
    if from == 0 || from > to {
        bail!("Invalid line range {from}..{to}");
    }
    let indent = indent.unwrap_or(&config.indent);
    if indent.is_empty() {
        bail!("Indent string must not be empty");
    }

    let mut manager = RollbackManager::from_config(config);
    let rollback = manager.begin()?;

    let mut store = TokenStore::new();
    let mut scans = ScanManager::new(AblScanner);
    let scan = scans.scan_for_path(&mut store, file)?;
    store.indent(scan, from, to, indent)?;
    let text = store.scan_text(scan)?;
    rollback.preserve_and_write(&text, file)?;

    info!("Indented lines {from}..{to} of {}", file.display());
    if rollback.is_empty() {
        println!("No changes");
    } else {
        output::print_changes(rollback.changes(), false);
    }
    Ok(())
}

/// Changes command implementation
pub fn changes_command(config: &RefactorConfig, diff: bool) -> anyhow::Result<()> {
    let manager = RollbackManager::open(&config.rollback_dir)?;
    match manager.current() {
        Some(rollback) if !rollback.is_empty() => output::print_changes(rollback.changes(), diff),
        _ => println!("No changes recorded"),
    }
    Ok(())
}

/// Rollback command implementation
pub fn rollback_command(config: &RefactorConfig) -> anyhow::Result<()> {
    let mut manager = RollbackManager::open(&config.rollback_dir)?;
    let Some(rollback) = manager.current_mut() else {
        println!("Nothing to roll back");
        return Ok(());
    };
    if rollback.is_empty() {
        println!("Nothing to roll back");
        return Ok(());
    }

    let count = rollback.changes().len();
    if let Some(errors) = rollback.rollback() {
        bail!("Rollback incomplete:\n{}", errors.trim_end());
    }
    println!("Rolled back {count} file(s)");
    Ok(())
}

pub fn config_schema_command() -> anyhow::Result<()> {
    let schema = RefactorConfig::json_schema();
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

pub fn config_show_command(config: &RefactorConfig) -> anyhow::Result<()> {
    println!("{}", config.to_json()?);
    Ok(())
}
