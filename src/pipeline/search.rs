// src/pipeline/search.rs

use std::io::Write;

use futures::StreamExt;

use crate::error::{AppError, Result};
use crate::services::QueryOrchestrator;
use crate::services::ranking::normalize;

/// Stream a query's results as NDJSON, one flushed line per result.
///
/// Returns the number of results written.
pub async fn run_search<W: Write>(
    orchestrator: &QueryOrchestrator,
    query: &str,
    mut out: W,
) -> Result<usize> {
    let query = query.trim();
    if normalize(query).is_empty() {
        return Err(AppError::validation("search query has no searchable words"));
    }

    let mut results = orchestrator.get_or_start(query).await;
    let mut written = 0;
    while let Some(result) = results.next().await {
        serde_json::to_writer(&mut out, &result)?;
        out.write_all(b"\n")?;
        out.flush()?;
        written += 1;
    }

    log::info!("Streamed {written} results for '{query}'");
    Ok(written)
}
