//! Scheduling constraints: per-operation limits, working hours, vacations.
//!
//! This module holds the configured ceilings and boundaries that shape
//! availability:
//!
//! - **SchedulingConstraints**: hour/lesson caps per day and week, the flat
//!   operating-hours window, and the minimum buffer between lessons
//! - **WeeklySchedule**: per-weekday working-hours overrides and enabled flags
//! - **Vacation dates**: days that generate no slots at all
//! - **ConstraintStore**: lazily loaded, snapshot-on-read access with an
//!   explicit invalidate/reload operation

mod store;
mod types;

pub use store::{ConstraintRepository, ConstraintSnapshot, ConstraintStore, MemoryConstraintRepository};
pub use types::{
    parse_time_of_day, ConstraintUpdate, DayHours, SchedulingConstraints, WeeklySchedule,
};
