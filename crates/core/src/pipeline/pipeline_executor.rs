use crate::pipeline::frame_batch_processor::FrameFaces;

/// One partition's worth of detection work.
pub type PartitionTask<'a> = Box<dyn FnOnce() -> Vec<FrameFaces> + Send + 'a>;

/// Abstracts how a video's partitions are run.
///
/// This is a port (application-layer interface). Infrastructure provides
/// concrete implementations. Whatever the scheduling, results come back
/// in task order and every task has finished before `run_all` returns.
pub trait PartitionExecutor: Send + Sync {
    fn run_all<'a>(&self, tasks: Vec<PartitionTask<'a>>) -> Vec<Vec<FrameFaces>>;
}
