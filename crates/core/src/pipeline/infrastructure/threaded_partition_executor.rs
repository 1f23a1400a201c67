use crate::pipeline::frame_batch_processor::FrameFaces;
use crate::pipeline::pipeline_executor::{PartitionExecutor, PartitionTask};

/// Runs every partition on its own scoped thread and joins them all.
///
/// A panicking task yields an empty partition; its siblings still run to
/// completion and the shortfall shows up in the merge count check.
#[derive(Default)]
pub struct ThreadedPartitionExecutor;

impl ThreadedPartitionExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl PartitionExecutor for ThreadedPartitionExecutor {
    fn run_all<'a>(&self, tasks: Vec<PartitionTask<'a>>) -> Vec<Vec<FrameFaces>> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = tasks
                .into_iter()
                .enumerate()
                .map(|(i, task)| {
                    std::thread::Builder::new()
                        .name(format!("partition-{i}"))
                        .spawn_scoped(scope, task)
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(i, handle)| match handle {
                    Ok(handle) => handle.join().unwrap_or_else(|_| {
                        log::error!("Partition {i} panicked");
                        Vec::new()
                    }),
                    Err(e) => {
                        log::error!("Failed to spawn partition {i}: {e}");
                        Vec::new()
                    }
                })
                .collect()
        })
    }
}
