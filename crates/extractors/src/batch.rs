// batch.rs - run one step over many files, one at a time
//
// A failing file is logged and skipped. The batch itself fails only when
// every file failed.

use std::path::{Path, PathBuf};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
}

pub fn run_batch<F>(label: &str, files: &[PathBuf], mut process: F) -> anyhow::Result<BatchReport>
where
    F: FnMut(&Path) -> anyhow::Result<()>,
{
    let mut report = BatchReport::default();
    for file in files {
        match process(file) {
            Ok(()) => report.succeeded += 1,
            Err(e) => {
                report.failed += 1;
                tracing::error!("{}: {}: {:#}", label, file.display(), e);
            }
        }
    }

    tracing::info!("{}: {} ok, {} failed", label, report.succeeded, report.failed);
    if report.succeeded == 0 && report.failed > 0 {
        anyhow::bail!("{}: all {} file(s) failed", label, report.failed);
    }
    Ok(report)
}
