//! # dialpace-scheduler
//!
//! Paced batch calling for dialpace.
//!
//! This crate provides:
//! - The daily cap store (per-number call counts for today)
//! - Schedule construction with up-front quota reservation and random pacing
//! - Sequential schedule execution that survives per-call failures
//! - Background batch tasks with observable status
//! - The single-call dialer shared by the API and batches

mod batch;
mod caps;
mod dialer;
mod schedule;

pub use batch::{BatchHandle, BatchManager, BatchState, BatchStatus};
pub use caps::{DailyCapStore, DailyCounters};
pub use dialer::Dialer;
pub use schedule::{
    build_schedule, execute_schedule, run_batch, BatchReport, BatchRequest, EntryFailure,
    ScheduleEntry,
};
