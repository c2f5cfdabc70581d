use vss_scheduler::{RawTrigger, ScheduledTask, SchedulerError, TaskScheduler};

pub struct MstaskScheduler {
    _private: (),
}

impl MstaskScheduler {
    pub fn new() -> Result<Self, SchedulerError> {
        Err(SchedulerError::Unavailable(
            "Task Scheduler requires Windows".to_string(),
        ))
    }
}

impl TaskScheduler for MstaskScheduler {
    type Task = MstaskTask;

    fn activate(&self, task_name: &str) -> Result<MstaskTask, SchedulerError> {
        Err(SchedulerError::TaskNotFound(task_name.to_string()))
    }
}

/// Never constructed off Windows.
pub enum MstaskTask {}

impl ScheduledTask for MstaskTask {
    fn trigger_count(&self) -> Result<usize, SchedulerError> {
        match *self {}
    }

    fn trigger(&self, _index: usize) -> Result<RawTrigger, SchedulerError> {
        match *self {}
    }

    fn delete_trigger(&mut self, _index: usize) -> Result<(), SchedulerError> {
        match *self {}
    }

    fn append_trigger(&mut self, _trigger: &RawTrigger) -> Result<(), SchedulerError> {
        match *self {}
    }

    fn save(&mut self) -> Result<(), SchedulerError> {
        match *self {}
    }
}
