pub mod config;
pub mod error;
pub mod event;
pub mod handle;
pub mod id;
pub mod job;
pub mod registry;
pub mod runner;
pub mod shell;

pub use config::RegistryConfig;
pub use error::RegistryError;
pub use event::JobEvent;
pub use handle::{CancellationHandle, TaskHandle};
pub use id::JobId;
pub use job::{Job, Routine};
pub use registry::{CancelResult, JobDescriptor, JobRegistry};
pub use runner::JobRunner;
