//! Memoization of compiled opaque fragments.
//!
//! Keyed by fragment identity ([`FragmentId`]), not by structure: two
//! separately built but identical fragments are compiled once each.
//!
//! Entries only hold a weak reference to their fragment. Once every
//! descriptor sharing a fragment is dropped its compiled form is dead and
//! is released by the next prune, which runs after every
//! [`PRUNE_INTERVAL`] compilations or on demand via
//! [`CompiledFragments::prune`].

use crate::expression::{Fragment, FragmentId, Invokable};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Compilations between two automatic prunes.
pub const PRUNE_INTERVAL: u64 = 64;

struct Compiled {
    fragment: Weak<Fragment>,
    invokable: Invokable,
}

/// Concurrent map from fragment identity to its compiled form.
#[derive(Default)]
pub struct CompiledFragments {
    fragments: DashMap<FragmentId, Compiled>,
    compilations: AtomicU64,
    since_prune: AtomicU64,
}

impl CompiledFragments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the compiled form of `fragment`, compiling it on first use.
    pub fn get_compiled(&self, fragment: &Arc<Fragment>) -> Invokable {
        if let Some(found) = self.fragments.get(&fragment.id()) {
            return Arc::clone(&found.value().invokable);
        }

        let mut compiled_now = false;
        let invokable = {
            let entry = self.fragments.entry(fragment.id()).or_insert_with(|| {
                compiled_now = true;
                debug!(
                    "Compiling fragment #{} ({})",
                    fragment.id().get(),
                    fragment.label()
                );
                Compiled {
                    fragment: Arc::downgrade(fragment),
                    invokable: fragment.compile(),
                }
            });
            Arc::clone(&entry.value().invokable)
        };

        if compiled_now {
            self.compilations.fetch_add(1, Ordering::Relaxed);
            if self.since_prune.fetch_add(1, Ordering::Relaxed) + 1 >= PRUNE_INTERVAL {
                self.prune();
            }
        }
        invokable
    }

    /// Drop compiled forms whose fragment no longer exists. Returns how many
    /// were dropped.
    pub fn prune(&self) -> usize {
        self.since_prune.store(0, Ordering::Relaxed);
        let before = self.fragments.len();
        self.fragments
            .retain(|_, compiled| compiled.fragment.strong_count() > 0);
        let pruned = before.saturating_sub(self.fragments.len());
        if pruned > 0 {
            debug!("Pruned {} compiled fragments", pruned);
        }
        pruned
    }

    /// Number of compilations performed so far.
    pub fn compilations(&self) -> u64 {
        self.compilations.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Drop every compiled form.
    pub fn clear(&self) {
        self.fragments.clear();
    }
}
