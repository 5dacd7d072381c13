// JSON config file for the moderation engine, plus a polling watcher that
// hot-reloads it.

use crate::core::moderation::{ModerationConfig, ModerationEngine, ScopeId, ScopeOverrides};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Read the config file, writing the defaults out first if it does not exist.
pub fn load_config(path: &Path) -> Result<ModerationConfig> {
    if !path.exists() {
        let defaults = ModerationConfig::default();
        write_config(path, &defaults)?;
        tracing::info!(path = %path.display(), "Wrote default moderation config");
        return Ok(defaults);
    }

    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open moderation config {}", path.display()))?;
    let config: ModerationConfig = serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("Failed to parse moderation config {}", path.display()))?;
    Ok(config)
}

pub fn write_config(path: &Path, config: &ModerationConfig) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create moderation config {}", path.display()))?;
    serde_json::to_writer_pretty(file, config)?;
    Ok(())
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Load the file and hand it to the engine. The engine keeps its current
/// configuration when this fails.
pub fn reload_from_file(engine: &ModerationEngine, path: &Path) -> Result<()> {
    let config = load_config(path)?;
    engine.reload_config(config)?;
    Ok(())
}

/// Change one scope's overrides on the running engine and save the result.
/// Nothing is written when the engine rejects the change.
pub fn update_scope_overrides(
    engine: &ModerationEngine,
    path: &Path,
    scope: &ScopeId,
    change: impl FnOnce(&mut ScopeOverrides),
) -> Result<()> {
    let mut config = engine.config().settings().clone();
    change(config.scopes.entry(scope.to_string()).or_default());

    engine.reload_config(config.clone())?;
    write_config(path, &config)?;
    tracing::info!(scope_id = %scope, path = %path.display(), "Saved scope overrides");
    Ok(())
}

/// Poll the file's modification time and reload whenever it changes.
pub async fn watch_config_file(engine: Arc<ModerationEngine>, path: PathBuf, every: Duration) {
    let mut last_seen = modified_at(&path);
    let mut interval = tokio::time::interval(every);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        interval.tick().await;

        let current = modified_at(&path);
        if current.is_none() || current == last_seen {
            continue;
        }
        last_seen = current;

        match reload_from_file(&engine, &path) {
            Ok(()) => tracing::info!(path = %path.display(), "Moderation config file changed; reloaded"),
            Err(e) => tracing::warn!(path = %path.display(), "Moderation config reload failed: {:#}", e),
        }
    }
}
