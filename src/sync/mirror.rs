use crate::identity::UserId;
use crate::models::{CropFormData, FarmStats, InventoryFormData, Record};

use super::decode::Rejected;

/// Published state of a synchronizer.
///
/// `records` is always the full decoded collection of the most recent
/// snapshot for `identity`, in key order. It is empty whenever `identity` is
/// `None` or `loading` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct Mirror<T, A = ()> {
    pub records: Vec<Record<T>>,
    /// Subscribed, first snapshot not yet applied.
    pub loading: bool,
    /// User the mirror belongs to.
    pub identity: Option<UserId>,
    /// Incremented on every identity change.
    pub epoch: u64,
    /// Derived from `records`.
    pub summary: A,
    /// Entries of the last snapshot that did not decode.
    pub rejected: Vec<Rejected>,
    /// Last subscription or decoding failure for this identity.
    pub error: Option<String>,
}

pub type FarmMirror = Mirror<CropFormData, FarmStats>;
pub type InventoryMirror = Mirror<InventoryFormData>;

impl<T, A> Mirror<T, A> {
    /// No identity bound.
    pub fn unbound(epoch: u64, summary: A) -> Self {
        Self {
            records: Vec::new(),
            loading: false,
            identity: None,
            epoch,
            summary,
            rejected: Vec::new(),
            error: None,
        }
    }

    /// Bound to `identity`, waiting for the first snapshot.
    pub fn loading(identity: UserId, epoch: u64, summary: A) -> Self {
        Self {
            loading: true,
            identity: Some(identity),
            ..Self::unbound(epoch, summary)
        }
    }

    /// Bound to `identity`, but the subscription failed.
    pub fn failed(identity: UserId, epoch: u64, summary: A, error: impl Into<String>) -> Self {
        Self {
            identity: Some(identity),
            error: Some(error.into()),
            ..Self::unbound(epoch, summary)
        }
    }

    pub fn is_bound(&self) -> bool {
        self.identity.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_states_have_no_records() {
        let unbound: FarmMirror = Mirror::unbound(3, FarmStats::default());
        assert!(unbound.records.is_empty());
        assert!(!unbound.loading);
        assert!(!unbound.is_bound());

        let loading: InventoryMirror = Mirror::loading(UserId::new("u1"), 4, ());
        assert!(loading.records.is_empty());
        assert!(loading.loading);
        assert_eq!(loading.epoch, 4);

        let failed: InventoryMirror = Mirror::failed(UserId::new("u1"), 4, (), "offline");
        assert!(!failed.loading);
        assert_eq!(failed.error.as_deref(), Some("offline"));
    }
}
