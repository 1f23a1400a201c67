pub mod bounded_worker_pool;
pub mod threaded_partition_executor;
