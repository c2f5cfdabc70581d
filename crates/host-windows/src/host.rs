use crate::mstask::{MstaskScheduler, MstaskTask};
use tracing::warn;
use vss_scheduler::{SchedulerError, TaskScheduler};

/// The machine's task scheduler, or the reason it could not be reached.
pub enum HostScheduler {
    Mstask(MstaskScheduler),
    Offline(String),
}

impl HostScheduler {
    pub fn connect() -> Self {
        match MstaskScheduler::new() {
            Ok(scheduler) => HostScheduler::Mstask(scheduler),
            Err(err) => {
                warn!(error = %err, "task scheduler unavailable");
                HostScheduler::Offline(err.to_string())
            }
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, HostScheduler::Mstask(_))
    }
}

impl TaskScheduler for HostScheduler {
    type Task = MstaskTask;

    fn activate(&self, task_name: &str) -> Result<MstaskTask, SchedulerError> {
        match self {
            HostScheduler::Mstask(scheduler) => scheduler.activate(task_name),
            HostScheduler::Offline(reason) => Err(SchedulerError::Unavailable(reason.clone())),
        }
    }
}
