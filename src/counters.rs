//! Sharded counters and reducers.
//!
//! All types in this module spread updates over an array of cells, each
//! wrapped in [`crossbeam_utils::CachePadded`] so two cells never share a
//! cache line. The cell a caller updates is chosen from its worker id (see
//! [`crate::worker`]).
//!
//! ```text
//!                          ┌─────────────────────────────────────┐
//!                          │       PartitionedCounter            │
//!                          ├─────────────────────────────────────┤
//!   Worker 0 ──add──►      │ [Cell 0] ████████ (CachePadded)     │──┐
//!   Worker 1 ──add──►      │ [Cell 1] ████████ (CachePadded)     │──┤ |cell| > threshold
//!        ...               │    ...                              │  │ or sync()
//!   Worker S-1 ─add──►     │ [Cell S-1] ██████ (CachePadded)     │──┤
//!                          └─────────────────────────────────────┘  │
//!                                                                   ▼
//!                                                  ┌──────────────────────────┐
//!                                                  │ global accumulator       │
//!                                                  └──────────────────────────┘
//! ```
//!
//! | Type | Read | Use Case |
//! |------|------|----------|
//! | [`PartitionedCounter`](partitioned::PartitionedCounter) | exact after `sync()` | reader counts, bounded-drift totals |
//! | [`ReducerSum`](reducer::ReducerSum) | sum of slots | per-worker statistics |
//! | [`ReducerMax`](reducer::ReducerMax) | max of slots | peak values |
//! | [`ReducerVec`](reducer::ReducerVec) | concatenation | collecting results of parallel loops |

pub mod partitioned;
pub mod reducer;
