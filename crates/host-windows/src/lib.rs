//! Windows scheduling service binding for snapshot tasks.

#[cfg(windows)]
mod mstask;
#[cfg(not(windows))]
#[path = "mstask_stub.rs"]
mod mstask;
mod host;

pub use host::HostScheduler;
pub use mstask::{MstaskScheduler, MstaskTask};

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(windows))]
    #[test]
    fn scheduler_is_unavailable_off_windows() {
        assert!(matches!(
            MstaskScheduler::new(),
            Err(vss_scheduler::SchedulerError::Unavailable(_))
        ));
    }
}
