use gwc_api::constants::{CONDITION_TYPE_READY, Reason};
use gwc_api::v1::WrappedGatewayStatus;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use k8s_openapi::chrono::{DateTime, Utc};
use std::time::Duration;

/// Result of one pass of the wrapped gateway reconciler, as reported on its
/// Ready condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    reason: Reason,
    message: String,
}

impl Outcome {
    pub fn succeeded() -> Self {
        Self {
            reason: Reason::ReconciliationSucceeded,
            message: String::new(),
        }
    }

    pub fn failed(reason: Reason, error: impl ToString) -> Self {
        Self {
            reason,
            message: error.to_string(),
        }
    }

    pub fn reason(&self) -> Reason {
        self.reason
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    fn status(&self) -> &'static str {
        if self.reason.is_success() {
            "True"
        } else {
            "False"
        }
    }
}

/// Replaces the condition of the same type or appends it. The previous
/// `lastTransitionTime` is kept unless the condition status flips. Returns
/// whether anything other than the transition time changed.
pub fn upsert_condition(conditions: &mut Vec<Condition>, mut condition: Condition) -> bool {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time.clone();
            }
            let changed = existing.status != condition.status
                || existing.reason != condition.reason
                || existing.message != condition.message
                || existing.observed_generation != condition.observed_generation;
            *existing = condition;
            changed
        }
        None => {
            conditions.push(condition);
            true
        }
    }
}

/// Records `outcome` on `status`. Successful outcomes also stamp the observed
/// generation and reconcile time. Returns whether the status changed in a way
/// worth writing regardless of its age.
pub fn apply_outcome(
    status: &mut WrappedGatewayStatus,
    outcome: &Outcome,
    generation: Option<i64>,
    now: DateTime<Utc>,
) -> bool {
    let condition = Condition {
        type_: CONDITION_TYPE_READY.to_string(),
        status: outcome.status().to_string(),
        observed_generation: generation,
        reason: outcome.reason().to_string(),
        message: outcome.message().to_string(),
        last_transition_time: Time(now),
    };
    let mut changed = upsert_condition(&mut status.conditions, condition);

    if outcome.reason().is_success() {
        changed |= status.observed_generation != generation;
        status.observed_generation = generation;
        status.last_reconciled_time = Some(Time(now));
    }

    changed
}

/// Whether the last recorded reconcile is older than `refresh_interval`.
pub fn is_stale(status: &WrappedGatewayStatus, now: DateTime<Utc>, refresh_interval: Duration) -> bool {
    let Some(Time(last)) = &status.last_reconciled_time else {
        return true;
    };
    match (now - *last).to_std() {
        Ok(age) => age >= refresh_interval,
        // Reconciled "in the future" means clock skew; refresh.
        Err(_) => true,
    }
}
