//! Failure classification and exit-code aggregation.
//!
//! The batch exit code is the **maximum** severity across all results: the
//! worst single failure decides the batch status. One fatal task fails the
//! batch signal even if every other task succeeded. Counts and averages are
//! deliberately not used.

use crate::error::TaskError;
use crate::types::TaskResult;

/// Exit code when every task succeeded
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code when the batch was cancelled before completion
pub const EXIT_INTERRUPTED: i32 = 130;

/// Maps a task failure to a severity integer
///
/// Results are clamped to at least 1, so a classifier cannot turn a failure
/// into a success. Any `Fn(&TaskError) -> i32` is a classifier.
pub trait Classifier: Send + Sync {
    /// Severity for `error` (higher is worse)
    fn severity(&self, error: &TaskError) -> i32;
}

/// Ranks failures by [`FailureKind::severity`](crate::error::FailureKind::severity)
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultClassifier;

impl Classifier for DefaultClassifier {
    fn severity(&self, error: &TaskError) -> i32 {
        error.kind.severity()
    }
}

impl<F> Classifier for F
where
    F: Fn(&TaskError) -> i32 + Send + Sync,
{
    fn severity(&self, error: &TaskError) -> i32 {
        self(error)
    }
}

/// Worst severity across `results`, or [`EXIT_SUCCESS`] if all succeeded
pub fn aggregate_exit_code(results: &[TaskResult]) -> i32 {
    results
        .iter()
        .map(|r| r.severity)
        .max()
        .unwrap_or(EXIT_SUCCESS)
}
