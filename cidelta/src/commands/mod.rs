//! Subcommand implementations.

pub mod register;
pub mod sync;

use anyhow::{Context, Result};
use cidelta_core::config::CideltaConfig;
use cidelta_core::workspace::Workspace;
use std::path::Path;

/// Configuration and workspace every command starts from.
pub(crate) async fn load(config: &Path, workspace: &Path) -> Result<(CideltaConfig, Workspace)> {
    let config = CideltaConfig::load(config)
        .with_context(|| format!("failed to load {}", config.display()))?;
    let workspace = Workspace::load(workspace)
        .await
        .with_context(|| format!("failed to load workspace {}", workspace.display()))?;
    Ok((config, workspace))
}
