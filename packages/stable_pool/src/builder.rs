use std::fmt;
use std::marker::PhantomData;
use std::num::NonZero;

use new_zealand::nz;

use crate::{DropPolicy, StablePool};

/// Capacity of the first block allocated by a pool with the default
/// configuration. Every later block matches the pool's total capacity at the
/// time it is allocated, up to [`DEFAULT_MAX_BLOCK_CAPACITY`].
#[cfg(not(miri))]
pub(crate) const DEFAULT_FIRST_BLOCK_CAPACITY: NonZero<usize> = nz!(16);

// Under Miri, we use a smaller first block because Miri test runtime scales
// by memory usage.
#[cfg(miri)]
pub(crate) const DEFAULT_FIRST_BLOCK_CAPACITY: NonZero<usize> = nz!(4);

/// Largest capacity any single block may have, regardless of how big the pool
/// grows. Bounding the block size keeps individual allocations reasonable
/// while preserving amortized O(1) insertion.
pub(crate) const DEFAULT_MAX_BLOCK_CAPACITY: NonZero<usize> = nz!(8192);

/// Builder for creating an instance of [`StablePool`].
///
/// You only need to use this builder if you want to customize the pool
/// configuration. The default configuration used by [`StablePool::new()`][1]
/// is sufficient for most use cases.
///
/// # Examples
///
/// ```
/// use new_zealand::nz;
/// use stable_pool::{DropPolicy, StablePool};
///
/// let pool = StablePool::<u32>::builder()
///     .first_block_capacity(nz!(64))
///     .drop_policy(DropPolicy::MayDropItems)
///     .build();
/// ```
///
/// [1]: StablePool::new
#[must_use]
pub struct StablePoolBuilder<T> {
    first_block_capacity: NonZero<usize>,
    max_block_capacity: NonZero<usize>,
    drop_policy: DropPolicy,

    _item: PhantomData<T>,
}

impl<T> fmt::Debug for StablePoolBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StablePoolBuilder")
            .field(
                "item_type",
                &std::format_args!("{}", std::any::type_name::<T>()),
            )
            .field("first_block_capacity", &self.first_block_capacity)
            .field("max_block_capacity", &self.max_block_capacity)
            .field("drop_policy", &self.drop_policy)
            .finish()
    }
}

impl<T> StablePoolBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            first_block_capacity: DEFAULT_FIRST_BLOCK_CAPACITY,
            max_block_capacity: DEFAULT_MAX_BLOCK_CAPACITY,
            drop_policy: DropPolicy::default(),
            _item: PhantomData,
        }
    }

    /// Sets the capacity of the first storage block.
    ///
    /// Later blocks match the pool's total capacity at the time they are
    /// allocated, so total capacity doubles on each growth until blocks reach
    /// the [maximum block capacity][1].
    ///
    /// # Examples
    ///
    /// ```
    /// use new_zealand::nz;
    /// use stable_pool::StablePool;
    ///
    /// let mut pool = StablePool::<u32>::builder()
    ///     .first_block_capacity(nz!(4))
    ///     .build();
    ///
    /// _ = pool.insert(42);
    /// assert_eq!(pool.capacity(), 4);
    /// ```
    ///
    /// [1]: Self::max_block_capacity
    pub fn first_block_capacity(mut self, capacity: NonZero<usize>) -> Self {
        self.first_block_capacity = capacity;
        self
    }

    /// Sets the upper bound on the capacity of any single storage block.
    ///
    /// Once the pool's total capacity reaches this value, every further block
    /// is allocated at exactly this capacity - growth becomes linear instead
    /// of doubling, which bounds the size of individual allocations.
    ///
    /// # Examples
    ///
    /// ```
    /// use new_zealand::nz;
    /// use stable_pool::StablePool;
    ///
    /// let pool = StablePool::<u32>::builder()
    ///     .max_block_capacity(nz!(1024))
    ///     .build();
    ///
    /// assert_eq!(pool.capacity(), 0);
    /// ```
    pub fn max_block_capacity(mut self, capacity: NonZero<usize>) -> Self {
        self.max_block_capacity = capacity;
        self
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how
    /// to treat remaining items in the pool when the pool is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use stable_pool::{DropPolicy, StablePool};
    ///
    /// let pool = StablePool::<u32>::builder()
    ///     .drop_policy(DropPolicy::MustNotDropItems)
    ///     .build();
    /// ```
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the pool with the specified configuration.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized or the first block capacity exceeds the
    /// maximum block capacity.
    ///
    /// # Examples
    ///
    /// ```
    /// use stable_pool::StablePool;
    ///
    /// let pool = StablePool::<u32>::builder().build();
    /// ```
    #[must_use]
    pub fn build(self) -> StablePool<T> {
        StablePool::new_inner(
            self.first_block_capacity,
            self.max_block_capacity,
            self.drop_policy,
        )
    }
}
