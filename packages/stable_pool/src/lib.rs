//! An object pool with stable keys that recycles removed slots through an
//! intrusive free list and never moves an item once it has been inserted.
//!
//! This crate provides [`StablePool`], a dynamically growing pool whose
//! storage is a sequence of fixed-capacity blocks. Blocks are allocated as
//! needed and released only in bulk, so items stay at the same address and
//! keys to unrelated items survive every insertion and removal.
//!
//! # Key features
//!
//! - **Stable keys**: a [`Key`] stays valid until its own item is removed or
//!   the pool is cleared - never invalidated by operations on other items
//! - **Stable addresses**: items never move once inserted; block storage is
//!   never resized or relocated
//! - **Slot recycling**: removed slots are threaded onto a pool-wide free
//!   list and reused before any new block is allocated
//! - **O(1) operations**: insertion, removal, and keyed access are constant
//!   time; growth cost is amortized across the slots it adds
//! - **Iteration**: forward traversal in storage order that skips recycled
//!   slots, yielding each item with its key
//! - **Flexible drop policies**: configure behavior when the pool is dropped
//!   with remaining items
//!
//! # Examples
//!
//! ```rust
//! use stable_pool::StablePool;
//!
//! let mut pool = StablePool::<String>::new();
//!
//! let key_a = pool.insert("alpha".to_string());
//! let key_b = pool.insert("beta".to_string());
//!
//! // Removing one item does not disturb the keys of others.
//! pool.remove(key_a);
//! assert_eq!(&*pool.get(key_b), "beta");
//!
//! // The freed slot is reused by the next insertion.
//! let key_c = pool.insert("gamma".to_string());
//! assert_eq!(pool.len(), 2);
//! # _ = key_c;
//! ```
//!
//! ## Iteration after churn
//!
//! ```rust
//! use stable_pool::StablePool;
//!
//! let mut pool = StablePool::<u32>::new();
//!
//! let keys: Vec<_> = (0..6).map(|i| pool.insert(i)).collect();
//!
//! for key in keys.iter().step_by(2) {
//!     pool.remove(*key);
//! }
//!
//! // Iteration visits exactly the live items, skipping recycled slots.
//! let live: Vec<u32> = pool.iter().map(|(_, value)| *value).collect();
//! assert_eq!(live, vec![1, 3, 5]);
//! ```

mod block;
mod builder;
mod drop_policy;
mod pool;

pub use builder::*;
pub use drop_policy::*;
pub use pool::*;

pub(crate) use block::*;
