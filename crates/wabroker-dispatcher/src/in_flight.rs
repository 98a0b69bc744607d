use dashmap::DashSet;
use wabroker_core::types::ConversationKey;
use wabroker_debounce::InFlightGuard;

/// The side map enforcing single-flight-per-conversation (spec §4.4, §5:
/// "guarded by a lock per shard"). A worker inserts its key before running a
/// Turn and removes it on completion, success or failure; the Debouncer
/// consults it through `InFlightGuard` without needing to know this type.
#[derive(Default)]
pub struct InFlightSet {
    keys: DashSet<ConversationKey>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self { keys: DashSet::new() }
    }

    /// Returns `true` if this call newly marked the key in flight — `false`
    /// means it was already in flight (the worker must not proceed).
    pub fn try_acquire(&self, key: ConversationKey) -> bool {
        self.keys.insert(key)
    }

    pub fn release(&self, key: ConversationKey) {
        self.keys.remove(&key);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }
}

impl InFlightGuard for InFlightSet {
    fn is_in_flight(&self, key: ConversationKey) -> bool {
        self.keys.contains(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wabroker_core::types::{ContactId, TenantId};

    #[test]
    fn second_acquire_of_same_key_fails() {
        let set = InFlightSet::new();
        let key = ConversationKey { tenant_id: TenantId(1), contact_id: ContactId(1) };
        assert!(set.try_acquire(key));
        assert!(!set.try_acquire(key));
        set.release(key);
        assert!(set.try_acquire(key));
    }
}
