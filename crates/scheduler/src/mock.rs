//! In-memory scheduling service for tests and dry runs.
//!
//! Tasks hold a list of trigger slots; a `None` slot reads back as a
//! scheduler error, standing in for trigger kinds the OS binding cannot decode.

use crate::{RawTrigger, ScheduledTask, SchedulerError, TaskScheduler};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Default)]
struct MockTaskState {
    triggers: Vec<Option<RawTrigger>>,
    saves: usize,
    fail_writes: bool,
}

type Tasks = Rc<RefCell<HashMap<String, MockTaskState>>>;

#[derive(Debug, Clone, Default)]
pub struct MockScheduler {
    tasks: Tasks,
    unavailable: bool,
}

impl MockScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scheduler whose every activation fails, as when the service is down.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn with_task(self, name: &str, triggers: Vec<RawTrigger>) -> Self {
        self.add_task(name, triggers);
        self
    }

    pub fn add_task(&self, name: &str, triggers: Vec<RawTrigger>) {
        self.tasks.borrow_mut().insert(
            name.to_string(),
            MockTaskState {
                triggers: triggers.into_iter().map(Some).collect(),
                ..MockTaskState::default()
            },
        );
    }

    pub fn push_trigger(&self, name: &str, trigger: RawTrigger) {
        if let Some(task) = self.tasks.borrow_mut().get_mut(name) {
            task.triggers.push(Some(trigger));
        }
    }

    pub fn push_unreadable(&self, name: &str) {
        if let Some(task) = self.tasks.borrow_mut().get_mut(name) {
            task.triggers.push(None);
        }
    }

    pub fn fail_writes(&self, name: &str) {
        if let Some(task) = self.tasks.borrow_mut().get_mut(name) {
            task.fail_writes = true;
        }
    }

    pub fn triggers(&self, name: &str) -> Option<Vec<RawTrigger>> {
        self.tasks
            .borrow()
            .get(name)
            .map(|task| task.triggers.iter().flatten().copied().collect())
    }

    pub fn save_count(&self, name: &str) -> usize {
        self.tasks.borrow().get(name).map_or(0, |task| task.saves)
    }
}

impl TaskScheduler for MockScheduler {
    type Task = MockTask;

    fn activate(&self, task_name: &str) -> Result<MockTask, SchedulerError> {
        if self.unavailable {
            return Err(SchedulerError::Unavailable("mock scheduler offline".to_string()));
        }
        if !self.tasks.borrow().contains_key(task_name) {
            return Err(SchedulerError::TaskNotFound(task_name.to_string()));
        }
        Ok(MockTask {
            name: task_name.to_string(),
            tasks: Rc::clone(&self.tasks),
        })
    }
}

#[derive(Debug)]
pub struct MockTask {
    name: String,
    tasks: Tasks,
}

impl MockTask {
    fn with_state<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut MockTaskState) -> Result<R, SchedulerError>,
    ) -> Result<R, SchedulerError> {
        let mut tasks = self.tasks.borrow_mut();
        let state = tasks.get_mut(&self.name).ok_or_else(|| SchedulerError::Operation {
            operation,
            reason: format!("task `{}` was removed", self.name),
        })?;
        f(state)
    }

    fn writable(state: &MockTaskState, operation: &'static str) -> Result<(), SchedulerError> {
        if state.fail_writes {
            return Err(SchedulerError::Operation {
                operation,
                reason: "access denied".to_string(),
            });
        }
        Ok(())
    }
}

impl ScheduledTask for MockTask {
    fn trigger_count(&self) -> Result<usize, SchedulerError> {
        self.with_state("trigger count", |state| Ok(state.triggers.len()))
    }

    fn trigger(&self, index: usize) -> Result<RawTrigger, SchedulerError> {
        self.with_state("read trigger", |state| match state.triggers.get(index) {
            Some(Some(trigger)) => Ok(*trigger),
            Some(None) => Err(SchedulerError::TriggerRead {
                index,
                reason: "unhandled trigger type".to_string(),
            }),
            None => Err(SchedulerError::TriggerRead {
                index,
                reason: "index out of range".to_string(),
            }),
        })
    }

    fn delete_trigger(&mut self, index: usize) -> Result<(), SchedulerError> {
        self.with_state("delete trigger", |state| {
            Self::writable(state, "delete trigger")?;
            if index >= state.triggers.len() {
                return Err(SchedulerError::Operation {
                    operation: "delete trigger",
                    reason: format!("index {} out of range", index),
                });
            }
            state.triggers.remove(index);
            Ok(())
        })
    }

    fn append_trigger(&mut self, trigger: &RawTrigger) -> Result<(), SchedulerError> {
        self.with_state("append trigger", |state| {
            Self::writable(state, "append trigger")?;
            state.triggers.push(Some(*trigger));
            Ok(())
        })
    }

    fn save(&mut self) -> Result<(), SchedulerError> {
        self.with_state("save task", |state| {
            Self::writable(state, "save task")?;
            state.saves += 1;
            Ok(())
        })
    }
}
