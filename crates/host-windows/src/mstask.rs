use tracing::debug;
use vss_scheduler::{RawTrigger, ScheduledTask, SchedulerError, TaskScheduler, TriggerData};

use windows::core::{Interface, PCWSTR};
use windows::Win32::Foundation::{BOOL, ERROR_FILE_NOT_FOUND};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoUninitialize, IPersistFile, CLSCTX_INPROC_SERVER,
    COINIT_APARTMENTTHREADED,
};
use windows::Win32::System::TaskScheduler::{
    CTaskScheduler, ITask, ITaskScheduler, DAILY, MONTHLYDATE, MONTHLYDOW, TASK_TRIGGER,
    TASK_TRIGGER_TYPE, TRIGGER_TYPE_UNION, WEEKLY,
};

fn wide(s: &str) -> Vec<u16> {
    use std::os::windows::prelude::*;
    std::ffi::OsStr::new(s)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

fn failed(operation: &'static str, err: windows::core::Error) -> SchedulerError {
    SchedulerError::Operation {
        operation,
        reason: err.message().to_string(),
    }
}

fn slot(index: usize) -> Result<u16, SchedulerError> {
    u16::try_from(index).map_err(|_| SchedulerError::TriggerRead {
        index,
        reason: "index exceeds the trigger table".to_string(),
    })
}

/// Task Scheduler 1.0 (`mstask`), where `.job` tasks such as
/// `ShadowCopyVolume{..}.job` live.
pub struct MstaskScheduler {
    service: ITaskScheduler,
    uninitialize: bool,
}

impl MstaskScheduler {
    pub fn new() -> Result<Self, SchedulerError> {
        // S_FALSE means COM was already initialised on this thread and still
        // needs a balancing CoUninitialize.
        let init = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) };
        let uninitialize = init.is_ok();
        let service: ITaskScheduler =
            match unsafe { CoCreateInstance(&CTaskScheduler, None, CLSCTX_INPROC_SERVER) } {
                Ok(service) => service,
                Err(err) => {
                    if uninitialize {
                        unsafe { CoUninitialize() };
                    }
                    return Err(SchedulerError::Unavailable(err.message().to_string()));
                }
            };
        Ok(Self {
            service,
            uninitialize,
        })
    }
}

impl Drop for MstaskScheduler {
    fn drop(&mut self) {
        if self.uninitialize {
            unsafe { CoUninitialize() };
        }
    }
}

impl TaskScheduler for MstaskScheduler {
    type Task = MstaskTask;

    fn activate(&self, task_name: &str) -> Result<MstaskTask, SchedulerError> {
        let name = wide(task_name);
        let task: ITask = unsafe { self.service.Activate(PCWSTR(name.as_ptr())) }.map_err(|err| {
            if err.code() == ERROR_FILE_NOT_FOUND.to_hresult() {
                SchedulerError::TaskNotFound(task_name.to_string())
            } else {
                failed("activate task", err)
            }
        })?;
        debug!(task = %task_name, "activated scheduled task");
        Ok(MstaskTask { task })
    }
}

pub struct MstaskTask {
    task: ITask,
}

impl ScheduledTask for MstaskTask {
    fn trigger_count(&self) -> Result<usize, SchedulerError> {
        let count = unsafe { self.task.GetTriggerCount() }.map_err(|err| failed("count triggers", err))?;
        Ok(usize::from(count))
    }

    fn trigger(&self, index: usize) -> Result<RawTrigger, SchedulerError> {
        let unreadable = |err: windows::core::Error| SchedulerError::TriggerRead {
            index,
            reason: err.message().to_string(),
        };
        let handle = unsafe { self.task.GetTrigger(slot(index)?) }.map_err(unreadable)?;
        let mut raw = TASK_TRIGGER {
            cbTriggerSize: std::mem::size_of::<TASK_TRIGGER>() as u16,
            ..Default::default()
        };
        unsafe { handle.GetTrigger(&mut raw) }.map_err(unreadable)?;
        Ok(from_native(&raw))
    }

    fn delete_trigger(&mut self, index: usize) -> Result<(), SchedulerError> {
        unsafe { self.task.DeleteTrigger(slot(index)?) }.map_err(|err| failed("delete trigger", err))
    }

    fn append_trigger(&mut self, trigger: &RawTrigger) -> Result<(), SchedulerError> {
        let mut new_index = 0u16;
        let handle = unsafe { self.task.CreateTrigger(&mut new_index) }
            .map_err(|err| failed("create trigger", err))?;
        let native = to_native(trigger);
        unsafe { handle.SetTrigger(&native) }.map_err(|err| failed("set trigger", err))?;
        debug!(index = new_index, "appended trigger");
        Ok(())
    }

    fn save(&mut self) -> Result<(), SchedulerError> {
        let file: IPersistFile = self.task.cast().map_err(|err| failed("save task", err))?;
        unsafe { file.Save(PCWSTR::null(), BOOL::from(true)) }.map_err(|err| failed("save task", err))
    }
}

fn from_native(raw: &TASK_TRIGGER) -> RawTrigger {
    let trigger_type = raw.TriggerType.0 as u32;
    let data = unsafe {
        match trigger_type {
            vss_scheduler::TASK_TIME_TRIGGER_DAILY => TriggerData {
                days_interval: raw.Type.Daily.DaysInterval,
                ..TriggerData::default()
            },
            vss_scheduler::TASK_TIME_TRIGGER_WEEKLY => TriggerData {
                weeks_interval: raw.Type.Weekly.WeeksInterval,
                days_of_week: raw.Type.Weekly.rgfDaysOfTheWeek,
                ..TriggerData::default()
            },
            vss_scheduler::TASK_TIME_TRIGGER_MONTHLYDATE => TriggerData {
                days: raw.Type.MonthlyDate.rgfDays,
                months: raw.Type.MonthlyDate.rgfMonths,
                ..TriggerData::default()
            },
            vss_scheduler::TASK_TIME_TRIGGER_MONTHLYDOW => TriggerData {
                which_week: raw.Type.MonthlyDOW.wWhichWeek,
                days_of_week: raw.Type.MonthlyDOW.rgfDaysOfTheWeek,
                months: raw.Type.MonthlyDOW.rgfMonths,
                ..TriggerData::default()
            },
            _ => TriggerData::default(),
        }
    };
    RawTrigger {
        begin_year: raw.wBeginYear,
        begin_month: raw.wBeginMonth,
        begin_day: raw.wBeginDay,
        end_year: raw.wEndYear,
        end_month: raw.wEndMonth,
        end_day: raw.wEndDay,
        start_hour: raw.wStartHour,
        start_minute: raw.wStartMinute,
        minutes_duration: raw.MinutesDuration,
        minutes_interval: raw.MinutesInterval,
        flags: raw.rgFlags,
        trigger_type,
        data,
        random_minutes_interval: raw.wRandomMinutesInterval,
    }
}

fn to_native(trigger: &RawTrigger) -> TASK_TRIGGER {
    let data = &trigger.data;
    let kind = match trigger.trigger_type {
        vss_scheduler::TASK_TIME_TRIGGER_DAILY => TRIGGER_TYPE_UNION {
            Daily: DAILY {
                DaysInterval: data.days_interval,
            },
        },
        vss_scheduler::TASK_TIME_TRIGGER_WEEKLY => TRIGGER_TYPE_UNION {
            Weekly: WEEKLY {
                WeeksInterval: data.weeks_interval,
                rgfDaysOfTheWeek: data.days_of_week,
            },
        },
        vss_scheduler::TASK_TIME_TRIGGER_MONTHLYDATE => TRIGGER_TYPE_UNION {
            MonthlyDate: MONTHLYDATE {
                rgfDays: data.days,
                rgfMonths: data.months,
            },
        },
        vss_scheduler::TASK_TIME_TRIGGER_MONTHLYDOW => TRIGGER_TYPE_UNION {
            MonthlyDOW: MONTHLYDOW {
                wWhichWeek: data.which_week,
                rgfDaysOfTheWeek: data.days_of_week,
                rgfMonths: data.months,
            },
        },
        _ => TRIGGER_TYPE_UNION::default(),
    };
    TASK_TRIGGER {
        cbTriggerSize: std::mem::size_of::<TASK_TRIGGER>() as u16,
        wBeginYear: trigger.begin_year,
        wBeginMonth: trigger.begin_month,
        wBeginDay: trigger.begin_day,
        wEndYear: trigger.end_year,
        wEndMonth: trigger.end_month,
        wEndDay: trigger.end_day,
        wStartHour: trigger.start_hour,
        wStartMinute: trigger.start_minute,
        MinutesDuration: trigger.minutes_duration,
        MinutesInterval: trigger.minutes_interval,
        rgFlags: trigger.flags,
        TriggerType: TASK_TRIGGER_TYPE(trigger.trigger_type as i32),
        Type: kind,
        wRandomMinutesInterval: trigger.random_minutes_interval,
        ..Default::default()
    }
}
