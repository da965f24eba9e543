//! Harvest entry points.
//!
//! [`harvest`] returns the records in memory; [`harvest_to_dir`] also writes
//! them as `<stem>.json` and `<stem>.csv`, where the stem names the docket and
//! the page window actually covered.

use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::output::{output_stem, write_csv, write_json, HarvestOutput, HarvestStats, OutputPaths};
use crate::pipeline::paginate;
use crate::source::resolve_source;
use std::path::Path;
use tracing::info;

/// Harvest every comment in the configured page window.
///
/// # Returns
/// `Ok(HarvestOutput)` even if some details or attachments failed (see
/// `output.stats.detail_failures` and `attachments_empty`).
///
/// # Errors
/// Returns `Err(HarvestError)` only for fatal errors:
/// - no API key and no injected source
/// - a list page could not be fetched after all retries
pub async fn harvest(config: &HarvestConfig) -> Result<HarvestOutput, HarvestError> {
    let source = resolve_source(config)?;
    info!(
        docket = %config.docket_id,
        start_page = config.start_page,
        end_page = ?config.end_page,
        "Starting harvest"
    );
    paginate::run(source.as_ref(), config).await
}

/// Harvest and write `<dir>/<stem>.json` and `<dir>/<stem>.csv`.
///
/// Uses atomic writes (temp file + rename). The end page in the file name is
/// the configured end page, or the last page requested when none was set.
pub async fn harvest_to_dir(
    config: &HarvestConfig,
    dir: impl AsRef<Path>,
) -> Result<(HarvestStats, OutputPaths), HarvestError> {
    let output = harvest(config).await?;
    let dir = dir.as_ref();

    let end = config
        .end_page
        .unwrap_or_else(|| output.stats.last_page.max(config.start_page));
    let stem = output_stem(&config.docket_id, config.start_page, end);
    let paths = OutputPaths {
        json: dir.join(format!("{stem}.json")),
        csv: dir.join(format!("{stem}.csv")),
    };

    write_json(&paths.json, &output.records)?;
    write_csv(&paths.csv, &output.records)?;
    info!(
        records = output.records.len(),
        json = %paths.json.display(),
        csv = %paths.csv.display(),
        "Wrote harvest output"
    );

    Ok((output.stats, paths))
}

/// Synchronous wrapper around [`harvest`].
///
/// Creates a temporary tokio runtime internally.
pub fn harvest_sync(config: &HarvestConfig) -> Result<HarvestOutput, HarvestError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| HarvestError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(harvest(config))
}
