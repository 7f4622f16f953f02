// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Failures at the thread boundary.

/// Convenience result type for [`ThreadedPipeline`](crate::ThreadedPipeline)
/// calls.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Something went wrong between the producer and the consumer thread.
///
/// Aborted commits and undrawn frames are not errors; they are reported
/// through [`CommitOutcome`](lamella_core::orchestrator::CommitOutcome),
/// [`ConsumerEvent`](crate::ConsumerEvent)s and swap promises.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// The consumer thread stopped receiving or replying.
    #[error("consumer thread disconnected during {0}")]
    Disconnected(&'static str),

    /// The consumer thread panicked.
    #[error("consumer thread panicked")]
    WorkerPanicked,

    /// The consumer thread could not be started.
    #[error("failed to spawn consumer thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl PipelineError {
    pub(crate) fn disconnected(during: &'static str) -> Self {
        Self::Disconnected(during)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_operation() {
        let err = PipelineError::disconnected("commit");
        assert_eq!(err.to_string(), "consumer thread disconnected during commit");
        assert_eq!(
            PipelineError::WorkerPanicked.to_string(),
            "consumer thread panicked"
        );
    }
}
