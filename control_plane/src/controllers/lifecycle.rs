use gwc_api::constants::FINALIZER;
use kube::api::ObjectMeta;

/// Where an object stands in the finalizer-gated deletion protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Active,
    /// Deletion was requested and our finalizer still holds the object.
    PendingDeletion,
    /// Deletion was requested and nothing of ours blocks it any more.
    Gone,
}

impl Lifecycle {
    pub fn of(metadata: &ObjectMeta) -> Self {
        match (metadata.deletion_timestamp.is_some(), has_finalizer(metadata)) {
            (false, _) => Lifecycle::Active,
            (true, true) => Lifecycle::PendingDeletion,
            (true, false) => Lifecycle::Gone,
        }
    }
}

pub fn has_finalizer(metadata: &ObjectMeta) -> bool {
    metadata
        .finalizers
        .as_ref()
        .is_some_and(|finalizers| finalizers.iter().any(|f| f == FINALIZER))
}

/// Returns whether the metadata changed.
pub fn add_finalizer(metadata: &mut ObjectMeta) -> bool {
    if has_finalizer(metadata) {
        return false;
    }
    metadata
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(FINALIZER.to_string());
    true
}

/// Returns whether the metadata changed.
pub fn remove_finalizer(metadata: &mut ObjectMeta) -> bool {
    let Some(finalizers) = metadata.finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|f| f != FINALIZER);
    finalizers.len() != before
}
