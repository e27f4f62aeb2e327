pub mod supervisor;
pub mod task_runner;
