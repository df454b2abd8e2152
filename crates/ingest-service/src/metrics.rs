use anyhow::Result;
use metrics::counter;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::path::Path;

const SYNC_DURATION_SECONDS: &[f64] = &[0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 1800.0, 3600.0];

fn builder() -> Result<PrometheusBuilder> {
    Ok(PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("ingest_sync_duration_seconds".to_string()),
        SYNC_DURATION_SECONDS,
    )?)
}

/// Install the process-wide Prometheus recorder
pub fn init_metrics() -> Result<PrometheusHandle> {
    Ok(builder()?.install_recorder()?)
}

/// Write the rendered exposition text to `path`
pub fn write_snapshot(handle: &PrometheusHandle, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, handle.render())?;
    Ok(())
}

pub fn record_group_failure(group: &str, reason: &str) {
    counter!(
        "ingest_group_failures_total",
        "group" => group.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

pub fn record_summary_rows(group: &str, rows: usize) {
    counter!("ingest_summary_rows_total", "group" => group.to_string()).increment(rows as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_written_to_nested_path() {
        let recorder = builder().unwrap().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_group_failure("Company", "upstream");
            record_summary_rows("Company", 3);
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics").join("ingest.prom");
        write_snapshot(&handle, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("ingest_group_failures_total"));
        assert!(text.contains("ingest_summary_rows_total{group=\"Company\"} 3"));
    }
}
