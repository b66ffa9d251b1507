//! Bounded scan worker pool on a dedicated rayon thread pool

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::PalaceError;
use crate::extraction::{Analyzer, AnalyzerFactory, AnalyzerOptions};

/// Run `work` for every index in `0..count` on a pool of `workers` threads.
///
/// Every rayon job builds its own analyzer with language servers disabled,
/// so no analyzer is shared between threads. The indexed collect keeps
/// results in input order. The first failure sets the cancel flag, the
/// remaining jobs are skipped, and that failure is returned in place of any
/// partial results.
pub fn run_parallel<T, F>(
    count: usize,
    workers: usize,
    factory: &dyn AnalyzerFactory,
    work: F,
) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize, &mut dyn Analyzer) -> Result<T> + Sync,
{
    if count == 0 {
        return Ok(Vec::new());
    }
    let workers = workers.clamp(1, count);
    let options = AnalyzerOptions {
        language_servers: false,
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("palace-scan-{}", i))
        .build()
        .context("Failed to start scan worker pool")?;

    let cancel = AtomicBool::new(false);
    let first_error: Mutex<Option<anyhow::Error>> = Mutex::new(None);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        pool.install(|| {
            (0..count)
                .into_par_iter()
                .map_init(
                    || factory.create(&options),
                    |analyzer, index| {
                        if cancel.load(Ordering::Acquire) {
                            return Err(anyhow!("scan cancelled"));
                        }
                        match work(index, analyzer.as_mut()) {
                            Ok(value) => Ok(value),
                            Err(e) => {
                                if !cancel.swap(true, Ordering::AcqRel) {
                                    debug!(index, "scan job failed; cancelling");
                                    if let Ok(mut slot) = first_error.lock() {
                                        *slot = Some(e);
                                    }
                                }
                                Err(anyhow!("scan job {} failed", index))
                            }
                        }
                    },
                )
                .collect::<Result<Vec<T>>>()
        })
    }));

    match outcome {
        Ok(Ok(results)) => Ok(results),
        Ok(Err(e)) => {
            let first = first_error.lock().ok().and_then(|mut slot| slot.take());
            Err(first.unwrap_or(e))
        }
        Err(_) => {
            warn!("scan worker panicked; discarding results");
            Err(PalaceError::WorkerPanicked.into())
        }
    }
}
