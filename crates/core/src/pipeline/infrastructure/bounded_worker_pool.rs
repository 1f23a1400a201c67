use std::panic::{self, AssertUnwindSafe};

/// Fixed-size pool of scoped threads fed from a crossbeam channel.
///
/// Jobs are picked up in submission order by whichever worker is free;
/// results are returned in submission order once every job has finished.
pub struct BoundedWorkerPool {
    workers: usize,
    name: String,
}

impl BoundedWorkerPool {
    pub fn new(name: &str, workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            name: name.to_string(),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `job` over every item. A job that panics yields `None` in its
    /// slot without disturbing the others.
    pub fn run<T, R, F>(&self, items: Vec<T>, job: F) -> Vec<Option<R>>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync,
    {
        let count = items.len();
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, T)>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<(usize, Option<R>)>();
        for entry in items.into_iter().enumerate() {
            // The receiver is alive in this scope, so sends cannot fail.
            let _ = job_tx.send(entry);
        }
        drop(job_tx);

        let job = &job;
        std::thread::scope(|scope| {
            for w in 0..self.workers.min(count) {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let spawned = std::thread::Builder::new()
                    .name(format!("{}-{w}", self.name))
                    .spawn_scoped(scope, move || {
                        for (index, item) in job_rx {
                            let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(item)));
                            if outcome.is_err() {
                                log::error!("Job {index} panicked");
                            }
                            if result_tx.send((index, outcome.ok())).is_err() {
                                break;
                            }
                        }
                    });
                if let Err(e) = spawned {
                    log::error!("Failed to spawn worker {w}: {e}");
                }
            }
        });
        drop(result_tx);

        let mut results: Vec<Option<R>> = (0..count).map(|_| None).collect();
        for (index, result) in result_rx {
            results[index] = result;
        }
        results
    }
}
