//! # Metadata Cache
//!
//! Resolved signatures keyed by the exact procedure name the caller asked
//! for. The cache is a plain concurrent map; it can be shared between
//! connections through an `Arc`, and nothing is held locked while a signature
//! is fetched from a remote system.
//!
//! ## Invariants
//! - **Immutability**: A cached `Signature` is never modified, only replaced
//!   or dropped.
//! - **No Stale Reads**: An entry past its expiry is treated as absent and
//!   removed on the lookup that notices it.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rfcwire::Signature;
use tokio::time::Instant;

/// How long a cached signature stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Entries live until invalidated or cleared.
    #[default]
    Forever,
    /// Entries are refetched once they are older than the given age.
    ExpireAfter(Duration),
}

#[derive(Debug, Clone)]
struct Entry {
    signature: Arc<Signature>,
    inserted: Instant,
}

#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: DashMap<String, Entry>,
    policy: CachePolicy,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: CachePolicy) -> Self {
        Self { entries: DashMap::new(), policy }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn get(&self, name: &str) -> Option<Arc<Signature>> {
        let (signature, inserted) = {
            let entry = self.entries.get(name)?;
            (entry.signature.clone(), entry.inserted)
        };

        if self.is_expired(inserted) {
            self.entries.remove_if(name, |_, e| self.is_expired(e.inserted));
            return None;
        }
        Some(signature)
    }

    pub fn insert(&self, name: impl Into<String>, signature: Arc<Signature>) {
        self.entries.insert(name.into(), Entry { signature, inserted: Instant::now() });
    }

    /// Drops one entry. Returns whether it was present.
    pub fn invalidate(&self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, inserted: Instant) -> bool {
        match self.policy {
            CachePolicy::Forever => false,
            CachePolicy::ExpireAfter(ttl) => inserted.elapsed() >= ttl,
        }
    }
}
