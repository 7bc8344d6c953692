//! Round-robin backend pool.
//!
//! A [`BackendPool`] is immutable once published: its member list is
//! fixed at construction, and reconfiguration builds a successor pool with
//! [`BackendPool::update_targets`] instead of mutating the shared one.
//! Concurrent readers therefore never see a partially built list.
//!
//! Selection skips members the health monitor marked not-alive, scanning
//! at most `len()` candidates from the rotation point.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::backend::Backend;

#[derive(Debug, Default)]
pub struct BackendPool {
    members: Vec<Arc<Backend>>,
    counter: AtomicUsize,
}

impl BackendPool {
    /// Build a pool from endpoint URLs, dropping (and logging) malformed ones.
    ///
    /// An input where every address is malformed yields a valid, empty pool.
    #[must_use]
    pub fn new<S: AsRef<str>>(addresses: &[S]) -> Self {
        Self::build(addresses, 0, &[])
    }

    /// Members whose origin already appears in `previous` reuse that
    /// `Backend`, so their last recorded liveness carries over.
    fn build<S: AsRef<str>>(addresses: &[S], counter: usize, previous: &[Arc<Backend>]) -> Self {
        let members = addresses
            .iter()
            .filter_map(|address| {
                let address = address.as_ref();
                match Backend::parse(address) {
                    Ok(backend) => Some(
                        previous
                            .iter()
                            .find(|known| known.origin() == backend.origin())
                            .map_or_else(|| Arc::new(backend), Arc::clone),
                    ),
                    Err(reason) => {
                        tracing::warn!(address = %address, reason = %reason, "dropping malformed backend address");
                        None
                    }
                }
            })
            .collect();

        Self {
            members,
            counter: AtomicUsize::new(counter),
        }
    }

    /// Build the successor of this pool with a wholesale-replaced member list.
    ///
    /// The rotation counter continues from this pool's current value so the
    /// rotation stays fair across reconfiguration. Backends kept from this
    /// pool keep their liveness; new ones start alive.
    #[must_use]
    pub fn update_targets<S: AsRef<str>>(&self, addresses: &[S]) -> Self {
        Self::build(addresses, self.counter.load(Ordering::Relaxed), &self.members)
    }

    /// Whether both pools hold the same origins in the same order.
    #[must_use]
    pub fn same_members(&self, other: &Self) -> bool {
        self.members.len() == other.members.len()
            && self
                .members
                .iter()
                .zip(&other.members)
                .all(|(a, b)| a.origin() == b.origin())
    }

    /// Select the next alive member in rotation order.
    ///
    /// Every call takes a distinct slot from the shared counter, so with all
    /// members alive any window of `len()` consecutive calls returns each
    /// member exactly once, whatever the number of concurrent callers.
    /// Returns `None` when the pool is empty or no member is alive.
    #[must_use]
    pub fn next(&self) -> Option<Arc<Backend>> {
        let len = self.members.len();
        if len == 0 {
            return None;
        }

        let start = self.counter.fetch_add(1, Ordering::Relaxed);
        (0..len)
            .map(|offset| &self.members[start.wrapping_add(offset) % len])
            .find(|backend| backend.is_alive())
            .cloned()
    }

    #[must_use]
    pub fn members(&self) -> &[Arc<Backend>] {
        &self.members
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.members.iter().filter(|b| b.is_alive()).count()
    }
}
