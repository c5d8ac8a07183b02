// ============================================================================
// KEY STORE
// ============================================================================
// Flat shared-secret membership. The allow-list is fixed at startup.
// ============================================================================

use std::fmt;

use ahash::AHashSet;

use crate::activity::CallerId;

/// Membership test over the set of accepted caller keys.
#[cfg_attr(test, mockall::automock)]
pub trait KeyStore: Send + Sync {
    fn contains(&self, caller: &CallerId) -> bool;

    /// Number of accepted keys, for startup logging.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Allow-list loaded from configuration.
#[derive(Clone, Default)]
pub struct StaticKeyStore {
    keys: AHashSet<CallerId>,
}

impl StaticKeyStore {
    /// Build from raw keys; blank entries are dropped.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = keys
            .into_iter()
            .filter_map(|k| {
                let k = k.as_ref().trim();
                (!k.is_empty()).then(|| CallerId::new(k))
            })
            .collect();
        Self { keys }
    }
}

impl KeyStore for StaticKeyStore {
    fn contains(&self, caller: &CallerId) -> bool {
        self.keys.contains(caller)
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}

// Keys are secrets; only their count is printable.
impl fmt::Debug for StaticKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticKeyStore")
            .field("keys", &self.keys.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("demo-key" => true)]
    #[test_case("other" => true)]
    #[test_case("bad" => false)]
    #[test_case("" => false)]
    #[test_case("DEMO-KEY" => false; "membership is case sensitive")]
    fn test_membership(key: &str) -> bool {
        StaticKeyStore::new(["demo-key", "other"]).contains(&CallerId::from(key))
    }

    #[test]
    fn test_blank_keys_dropped() {
        let store = StaticKeyStore::new(["a", "", "  ", "b"]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_debug_does_not_print_keys() {
        let store = StaticKeyStore::new(["super-secret"]);
        assert!(!format!("{store:?}").contains("super-secret"));
    }
}
