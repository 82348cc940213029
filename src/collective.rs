//! Collective layer: the synchronization primitives ranks use to agree.
//!
//! Three primitives cover everything the clustering loop needs: elementwise
//! sum all-reduce, varying-count all-gather along a [`PartitionPlan`], and a
//! plain barrier. All collectives block until every rank arrives, and every
//! rank must invoke them in the same order; between collective points ranks
//! run independently.
//!
//! Reductions stage each rank's contribution separately and combine them in
//! rank order, so a run with a fixed world size is bitwise reproducible.

use std::sync::{Arc, Barrier, Mutex};

use crate::labels::Label;
use crate::partition::PartitionPlan;

/// Collective operations available to a single rank.
pub trait Collective: Send {
    /// This rank's index in `[0, size)`.
    fn rank(&self) -> usize;

    /// World size.
    fn size(&self) -> usize;

    /// Block until every rank arrives.
    fn barrier(&self);

    /// Elementwise sum across ranks; every rank receives the result.
    fn all_reduce_sum_f64(&self, local: &[f64], global: &mut [f64]);

    /// Elementwise sum across ranks for counters.
    fn all_reduce_sum_u64(&self, local: &[u64], global: &mut [u64]);

    /// Reassemble a plan-striped vector into a full copy on every rank.
    /// `local` is this rank's slab; `global` receives all slabs.
    fn all_gather_labels(&self, local: &[Label], plan: &PartitionPlan, global: &mut [Label]);
}

/// Shared in-memory world backing one [`RankComm`] per rank.
///
/// Each collective runs in two phases separated by barriers: every rank
/// writes its contribution into the typed slot, then every rank reads the
/// combined result. The trailing barrier keeps a fast rank from overwriting
/// the slot before a slow rank has finished reading.
pub struct ThreadWorld {
    size: usize,
    barrier: Barrier,
    f64_slot: Mutex<Vec<f64>>,
    u64_slot: Mutex<Vec<u64>>,
    label_slot: Mutex<Vec<Label>>,
}

impl ThreadWorld {
    /// Create a world of `size` ranks.
    ///
    /// # Panics
    /// Panics if `size` is zero.
    pub fn new(size: usize) -> Arc<ThreadWorld> {
        assert!(size > 0, "world requires at least one rank");
        Arc::new(ThreadWorld {
            size,
            barrier: Barrier::new(size),
            f64_slot: Mutex::new(Vec::new()),
            u64_slot: Mutex::new(Vec::new()),
            label_slot: Mutex::new(Vec::new()),
        })
    }

    /// Handle for one rank. Every rank in `[0, size)` must obtain exactly
    /// one handle and drive it from its own thread.
    pub fn rank_comm(self: &Arc<ThreadWorld>, rank: usize) -> RankComm {
        assert!(rank < self.size, "rank {} out of range", rank);
        RankComm {
            world: Arc::clone(self),
            rank,
        }
    }
}

/// One rank's endpoint into a [`ThreadWorld`].
pub struct RankComm {
    world: Arc<ThreadWorld>,
    rank: usize,
}

impl RankComm {
    fn staged_reduce<T: Copy + Default>(
        slot: &Mutex<Vec<T>>,
        barrier: &Barrier,
        size: usize,
        rank: usize,
        local: &[T],
        global: &mut [T],
        add: impl Fn(&mut T, T),
    ) {
        let len = local.len();
        {
            let mut staged = slot.lock().unwrap();
            if staged.len() != size * len {
                staged.clear();
                staged.resize(size * len, T::default());
            }
            staged[rank * len..(rank + 1) * len].copy_from_slice(local);
        }
        barrier.wait();
        {
            let staged = slot.lock().unwrap();
            for slot_value in global.iter_mut() {
                *slot_value = T::default();
            }
            for contributor in 0..size {
                let segment = &staged[contributor * len..(contributor + 1) * len];
                for (acc, &value) in global.iter_mut().zip(segment) {
                    add(acc, value);
                }
            }
        }
        barrier.wait();
    }
}

impl Collective for RankComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.world.size
    }

    fn barrier(&self) {
        self.world.barrier.wait();
    }

    fn all_reduce_sum_f64(&self, local: &[f64], global: &mut [f64]) {
        assert_eq!(local.len(), global.len());
        if self.world.size == 1 {
            global.copy_from_slice(local);
            return;
        }
        Self::staged_reduce(
            &self.world.f64_slot,
            &self.world.barrier,
            self.world.size,
            self.rank,
            local,
            global,
            |acc, v| *acc += v,
        );
    }

    fn all_reduce_sum_u64(&self, local: &[u64], global: &mut [u64]) {
        assert_eq!(local.len(), global.len());
        if self.world.size == 1 {
            global.copy_from_slice(local);
            return;
        }
        Self::staged_reduce(
            &self.world.u64_slot,
            &self.world.barrier,
            self.world.size,
            self.rank,
            local,
            global,
            |acc, v| *acc += v,
        );
    }

    fn all_gather_labels(&self, local: &[Label], plan: &PartitionPlan, global: &mut [Label]) {
        assert_eq!(local.len(), plan.count(self.rank));
        assert_eq!(global.len(), plan.total());
        if self.world.size == 1 {
            global[plan.slab(self.rank)].copy_from_slice(local);
            return;
        }
        {
            let mut staged = self.world.label_slot.lock().unwrap();
            if staged.len() != plan.total() {
                staged.clear();
                staged.resize(plan.total(), 0);
            }
            staged[plan.slab(self.rank)].copy_from_slice(local);
        }
        self.world.barrier.wait();
        {
            let staged = self.world.label_slot.lock().unwrap();
            global.copy_from_slice(&staged);
        }
        self.world.barrier.wait();
    }
}
