//! Cycle domain errors

use crate::cycle::CycleStatus;
use chrono::NaiveDate;
use core_kernel::CycleId;
use thiserror::Error;

/// Errors raised by cycle lifecycle and scheduling operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CycleError {
    #[error("Invalid cycle transition from {from} to {to}")]
    InvalidTransition { from: CycleStatus, to: CycleStatus },

    #[error("Cycle period {start}..{end} overlaps cycle {existing}")]
    Overlap {
        start: NaiveDate,
        end: NaiveDate,
        existing: CycleId,
    },

    #[error("Gap in cycle stream: previous cycle ends {previous_end}, next starts {next_start}")]
    Gap {
        previous_end: NaiveDate,
        next_start: NaiveDate,
    },

    #[error("Cycle cannot be approved: {pending} readings have not reached a terminal status")]
    ReadingsNotTerminal { pending: usize },

    #[error("Cycle {0} not found")]
    NotFound(CycleId),

    #[error("Invalid schedule configuration: {0}")]
    InvalidSchedule(String),
}
