//! Status transitions for a review task.
//!
//! `unset -> pending -> {success, failure}`. Repeating the current state is a
//! no-op, terminal states never change, and `success` is only reachable
//! together with the analysis payload.

use crate::error::ReviewError;
use crate::models::{AnalysisResult, TaskStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Started,
    Succeeded { analysis: Option<AnalysisResult> },
    Failed,
}

impl LifecycleEvent {
    pub fn target(&self) -> TaskStatus {
        match self {
            LifecycleEvent::Started => TaskStatus::Pending,
            LifecycleEvent::Succeeded { .. } => TaskStatus::Success,
            LifecycleEvent::Failed => TaskStatus::Failure,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Unchanged,
    Apply {
        status: TaskStatus,
        analysis_result: Option<AnalysisResult>,
    },
}

pub fn advance(current: TaskStatus, event: LifecycleEvent) -> Result<Transition, ReviewError> {
    let target = event.target();
    if current == target {
        return Ok(Transition::Unchanged);
    }

    match (current, event) {
        (TaskStatus::Unset, LifecycleEvent::Started) => Ok(Transition::Apply {
            status: TaskStatus::Pending,
            analysis_result: None,
        }),
        (
            TaskStatus::Pending,
            LifecycleEvent::Succeeded {
                analysis: Some(analysis),
            },
        ) => Ok(Transition::Apply {
            status: TaskStatus::Success,
            analysis_result: Some(analysis),
        }),
        (TaskStatus::Pending, LifecycleEvent::Failed) => Ok(Transition::Apply {
            status: TaskStatus::Failure,
            analysis_result: None,
        }),
        _ => Err(ReviewError::InvalidTransition {
            from: current,
            to: target,
        }),
    }
}
