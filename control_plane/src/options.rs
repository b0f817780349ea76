use getset::CopyGetters;
use std::time::Duration;
use typed_builder::TypedBuilder;

#[derive(Debug, TypedBuilder, CopyGetters, Clone, PartialEq, Eq)]
pub struct Options {
    /// Periodic resync of every reconciled object.
    #[getset(get_copy = "pub")]
    #[builder(default = Duration::from_secs(60))]
    controller_requeue_duration: Duration,

    #[getset(get_copy = "pub")]
    #[builder(default = Duration::from_secs(5))]
    controller_error_requeue_duration: Duration,

    #[getset(get_copy = "pub")]
    #[builder(default = Duration::from_secs(1))]
    conflict_requeue_duration: Duration,

    /// How old `lastReconciledTime` may get before an otherwise unchanged
    /// status is written again after a successful reconcile.
    ///
    /// A status write is itself a watch event, so stamping the time on every
    /// pass would re-trigger the reconciler forever. Within this interval a
    /// repeated reconcile writes nothing at all, and `lastReconciledTime` lags
    /// the latest successful pass by at most this much.
    #[getset(get_copy = "pub")]
    #[builder(default = Duration::from_secs(60))]
    status_refresh_interval: Duration,

    #[getset(get_copy = "pub")]
    #[builder(default = 3)]
    conflict_retry_attempts: u32,

    #[getset(get_copy = "pub")]
    #[builder(default = 4)]
    concurrency: u16,

    /// Time a leader may go without renewing before another replica takes over.
    #[getset(get_copy = "pub")]
    #[builder(default = Duration::from_secs(15))]
    lease_duration: Duration,

    #[getset(get_copy = "pub")]
    #[builder(default = Duration::from_secs(2))]
    lease_retry_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self::builder().build()
    }
}
