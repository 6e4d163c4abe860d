use crate::report::{OutputFormat, ReportSink};
use crate::server::HttpBuildServer;
use anyhow::Result;
use cidelta_core::sync::Synchronizer;
use std::path::PathBuf;
use tracing::info;

pub struct SyncArgs {
    pub config: PathBuf,
    pub workspace: PathBuf,
    pub format: OutputFormat,
    pub report_dir: Option<PathBuf>,
}

pub async fn run(args: SyncArgs) -> Result<()> {
    let (config, mut workspace) = super::load(&args.config, &args.workspace).await?;
    let server = HttpBuildServer::new(&config.server)?;
    let reporter = ReportSink::new(args.format, args.report_dir);

    let summary = Synchronizer::new(&server, &reporter, &config.tracking)
        .update(&mut workspace)
        .await?;

    info!(
        "Sync done: {} polled, {} pending, {} reported, {} requests resolved",
        summary.polled, summary.pending, summary.reported, summary.resolved
    );
    Ok(())
}
