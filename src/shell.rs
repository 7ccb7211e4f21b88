use std::{str::FromStr, time::Duration};

use thiserror::Error;

use crate::{id::JobId, job::DelayJob, registry::CancelResult, runner::JobRunner};

pub const HELP: &str = "\
start-task [secs]   start a delay job in the background
cancel-job <id>     cancel one job
cancel-all-jobs     cancel every job
list-jobs [--json]  list active jobs
is-running <id>     check whether a job is still running
help                show this text
quit                cancel everything and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartTask { secs: Option<u64> },
    CancelJob(String),
    CancelAllJobs,
    ListJobs { json: bool },
    IsRunning(String),
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),
    #[error("'{0}' needs a job id")]
    MissingId(&'static str),
    #[error("invalid argument '{0}'")]
    InvalidArgument(String),
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or(ParseError::Empty)?;
        let arg = words.next();

        if let Some(extra) = words.next() {
            return Err(ParseError::InvalidArgument(extra.to_string()));
        }

        match (name, arg) {
            ("start-task", None) => Ok(Command::StartTask { secs: None }),
            ("start-task", Some(secs)) => secs
                .parse()
                .map(|secs| Command::StartTask { secs: Some(secs) })
                .map_err(|_| ParseError::InvalidArgument(secs.to_string())),
            ("cancel-job", Some(id)) => Ok(Command::CancelJob(id.to_string())),
            ("cancel-job", None) => Err(ParseError::MissingId("cancel-job")),
            ("is-running", Some(id)) => Ok(Command::IsRunning(id.to_string())),
            ("is-running", None) => Err(ParseError::MissingId("is-running")),
            ("cancel-all-jobs", None) => Ok(Command::CancelAllJobs),
            ("list-jobs", None) => Ok(Command::ListJobs { json: false }),
            ("list-jobs", Some("--json")) => Ok(Command::ListJobs { json: true }),
            ("help", None) => Ok(Command::Help),
            ("quit" | "exit", None) => Ok(Command::Quit),
            ("cancel-all-jobs" | "list-jobs" | "help" | "quit" | "exit", Some(arg)) => {
                Err(ParseError::InvalidArgument(arg.to_string()))
            }
            (other, _) => Err(ParseError::Unknown(other.to_string())),
        }
    }
}

/// Operator commands on top of a runner and its registry.
pub struct Shell {
    runner: JobRunner,
    default_delay: Duration,
}

impl Shell {
    pub fn new(runner: JobRunner, default_delay: Duration) -> Self {
        Shell {
            runner,
            default_delay,
        }
    }

    pub fn execute(&self, command: Command) -> String {
        let registry = self.runner.registry();

        match command {
            Command::StartTask { secs } => {
                let duration = secs.map(Duration::from_secs).unwrap_or(self.default_delay);
                match self.runner.submit_job(DelayJob { duration }) {
                    Ok(id) => format!(
                        "Async task started with ID: {}. You can continue doing other work.",
                        id
                    ),
                    Err(e) => {
                        tracing::error!(error = %e, "Could not start task");
                        format!("Failed to start task: {}", e)
                    }
                }
            }
            Command::CancelJob(raw) => match raw.parse::<JobId>() {
                Ok(id) => match registry.cancel(&id) {
                    CancelResult::Cancelled => format!("Job [{}] cancelled!", id),
                    CancelResult::AlreadyFinished => format!("Job [{}] had already finished.", id),
                    CancelResult::NotFound => format!("Job [{}] not found.", id),
                },
                Err(_) => format!("Job [{}] not found.", raw),
            },
            Command::CancelAllJobs => {
                let cancelled = registry.cancel_all();
                format!("All jobs cancelled! ({} stopped)", cancelled)
            }
            Command::ListJobs { json: true } => match serde_json::to_string(&registry.list_all()) {
                Ok(json) => json,
                Err(e) => format!("Failed to render jobs: {}", e),
            },
            Command::ListJobs { json: false } => {
                let mut ids = registry
                    .list_ids()
                    .into_iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>();
                if ids.is_empty() {
                    "No active jobs.".to_string()
                } else {
                    ids.sort();
                    format!("Active jobs: {}", ids.join(", "))
                }
            }
            Command::IsRunning(raw) => {
                let running = raw
                    .parse::<JobId>()
                    .map(|id| registry.is_running(&id))
                    .unwrap_or(false);
                if running {
                    format!("Job [{}] is running.", raw)
                } else {
                    format!("Job [{}] is not running.", raw)
                }
            }
            Command::Help => HELP.to_string(),
            Command::Quit => "Bye.".to_string(),
        }
    }
}
