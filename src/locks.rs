//! Locks.
//!
//! | Type | Mode | Waiting |
//! |------|------|---------|
//! | [`Lock`](spin::Lock) | exclusive | bounded CAS retries, then yield |
//! | [`SpinLock`](spin::SpinLock) | exclusive | test-and-test-and-set spin, or try once |
//! | [`SpinMutex`](spin::SpinMutex) | exclusive, owns data | as `Lock` |
//! | [`ReaderWriterLock`](rwlock::ReaderWriterLock) | shared / exclusive | spin-then-yield backoff |

pub mod rwlock;
pub mod spin;
