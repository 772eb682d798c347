pub mod lifecycle;
pub mod orchestrator;
pub mod queue;
pub mod retrieval;
pub mod scheduler;

pub use lifecycle::{Daemon, DaemonConfig, LifecycleError, default_data_dir};
pub use orchestrator::{ExecutionMode, Orchestrator, StepOutcome, UploadRequest};
pub use queue::{Delivery, PipelineMessage, Queue};
pub use retrieval::RetrievalEngine;
pub use scheduler::{Scheduler, SchedulerConfig, spawn_scheduler, spawn_scheduler_with_config};
