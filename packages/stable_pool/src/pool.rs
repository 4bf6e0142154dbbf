use std::iter::FusedIterator;
use std::num::NonZero;

use crate::{Block, DropPolicy, StablePoolBuilder};

#[cfg(any(test, debug_assertions))]
use std::any::type_name;

/// An object pool of unbounded size whose items never move and whose keys
/// survive unrelated insertions and removals.
///
/// Storage is a sequence of fixed-capacity blocks. A block, once allocated, is
/// never resized or released until the pool is cleared or dropped, so an item
/// stays at the same address for as long as it is in the pool. Removed slots
/// are threaded onto a pool-wide free list and recycled by later insertions
/// before any new block is allocated.
///
/// There are multiple ways to insert items into the collection:
///
/// * [`insert()`][3] - inserts a value and returns the key. This is the simplest way to add an
///   item but requires you to later look it up by the key. That lookup is fast but not free.
/// * [`begin_insert().insert()`][4] - returns a shared reference to the inserted item; you may
///   also obtain the key in advance from the inserter through [`key()`][5] which may be
///   useful if the item needs to know its own key in the collection.
/// * [`begin_insert().insert_mut()`][6] - returns an exclusive reference to the inserted item.
///
/// # Iteration
///
/// The pool supports forward iteration over its items in storage order (block
/// order, then slot order within each block), skipping recycled slots. See
/// [`iter()`][7] and [`iter_mut()`][8].
///
/// # Resource usage
///
/// The collection automatically grows as items are added, doubling its total
/// capacity on each growth until new blocks reach a configurable maximum size.
/// Capacity is only released in bulk, by [`clear()`][9] or by dropping the
/// pool - individual blocks are never freed, as that would break the promise
/// that items never move.
///
/// # Thread safety
///
/// The pool is single-threaded. It can be moved to another thread (when `T`
/// is `Send`) but cannot be shared between threads without external
/// synchronization such as a `Mutex`.
///
/// [3]: Self::insert
/// [4]: StablePoolInserter::insert
/// [5]: StablePoolInserter::key
/// [6]: StablePoolInserter::insert_mut
/// [7]: Self::iter
/// [8]: Self::iter_mut
/// [9]: Self::clear
#[derive(Debug)]
pub struct StablePool<T> {
    /// The blocks that provide the storage of the pool, in allocation order.
    ///
    /// The Vec may reallocate as blocks are appended, but each block's slot
    /// storage is a separate heap allocation that never moves, so items stay
    /// put even when this Vec grows.
    blocks: Vec<Block<T>>,

    /// Head of the free list threading every vacant slot across all blocks.
    /// `None` means there is no vacant slot anywhere in the pool.
    free_head: Option<SlotAddr>,

    /// The number of items in the pool.
    length: usize,

    /// Sum of the capacities of all blocks allocated so far.
    total_capacity: usize,

    /// Capacity of the first block; later blocks double the total capacity
    /// until they reach `max_block_capacity`.
    first_block_capacity: NonZero<usize>,

    /// Upper bound on the capacity of any single block.
    max_block_capacity: NonZero<usize>,

    drop_policy: DropPolicy,
}

/// A key that can be used to reference an item in a [`StablePool`].
///
/// Keys are opaque handles returned by [`StablePool::insert()`] and related
/// methods. They provide efficient access to items in the pool via
/// [`StablePool::get()`] and [`StablePool::get_mut()`].
///
/// A key remains valid until the item it references is removed or the pool is
/// cleared or dropped. It is never invalidated by insertions or removals of
/// *other* items.
///
/// # Key reuse
///
/// Keys may be reused by the pool after an item is removed. This means that
/// using a key after its associated item has been removed may access a
/// different item or panic.
///
/// # Example
///
/// ```rust
/// use stable_pool::{Key, StablePool};
///
/// let mut pool = StablePool::<i32>::new();
///
/// // Insert items and store their keys.
/// let key1 = pool.insert(42);
/// let key2 = pool.insert(24);
///
/// // Keys can be copied and stored.
/// let stored_keys = vec![key1, key2];
///
/// // Use keys to access items.
/// for &key in &stored_keys {
///     let item = pool.get(key);
///     println!("Item: {}", *item);
/// }
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Key {
    addr: SlotAddr,
}

/// Location of one slot: which block, and which slot within that block.
///
/// Always a (block, slot) index pair, never a raw pointer - a key can go stale
/// but it can never dangle, and every resolution goes through the pool.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct SlotAddr {
    block_index: usize,
    slot_index: usize,
}

impl SlotAddr {
    #[must_use]
    pub(crate) fn new(block_index: usize, slot_index: usize) -> Self {
        Self {
            block_index,
            slot_index,
        }
    }
}

impl<T> StablePool<T> {
    /// # Panics
    ///
    /// Panics if `T` is zero-sized or if the configured first block capacity
    /// exceeds the configured maximum block capacity.
    #[must_use]
    pub(crate) fn new_inner(
        first_block_capacity: NonZero<usize>,
        max_block_capacity: NonZero<usize>,
        drop_policy: DropPolicy,
    ) -> Self {
        assert!(
            size_of::<T>() > 0,
            "StablePool must have non-zero item size"
        );
        assert!(
            first_block_capacity <= max_block_capacity,
            "StablePool first block capacity must not exceed the maximum block capacity"
        );

        Self {
            blocks: Vec::new(),
            free_head: None,
            length: 0,
            total_capacity: 0,
            first_block_capacity,
            max_block_capacity,
            drop_policy,
        }
    }

    /// Creates a new [`StablePool`] with the default configuration.
    ///
    /// The pool starts empty and will automatically grow as needed when items
    /// are inserted.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stable_pool::StablePool;
    ///
    /// let mut pool = StablePool::<String>::new();
    ///
    /// assert_eq!(pool.len(), 0);
    /// assert!(pool.is_empty());
    ///
    /// let key = pool.insert("Hello".to_string());
    /// assert_eq!(pool.len(), 1);
    /// assert!(!pool.is_empty());
    ///
    /// let item = pool.get(key);
    /// assert_eq!(&*item, "Hello");
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building a new [`StablePool`].
    ///
    /// Use this when you want to customize the pool configuration beyond the
    /// defaults.
    ///
    /// # Example
    ///
    /// ```rust
    /// use new_zealand::nz;
    /// use stable_pool::StablePool;
    ///
    /// let pool = StablePool::<u32>::builder()
    ///     .first_block_capacity(nz!(4))
    ///     .build();
    ///
    /// assert_eq!(pool.len(), 0);
    /// assert!(pool.is_empty());
    /// ```
    pub fn builder() -> StablePoolBuilder<T> {
        StablePoolBuilder::new()
    }

    /// The number of items in the pool.
    ///
    /// This is a simple field read, not a scan of the storage.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stable_pool::StablePool;
    ///
    /// let mut pool = StablePool::<i32>::new();
    /// assert_eq!(pool.len(), 0);
    ///
    /// let key1 = pool.insert(42);
    /// assert_eq!(pool.len(), 1);
    ///
    /// _ = pool.insert(24);
    /// assert_eq!(pool.len(), 2);
    ///
    /// pool.remove(key1);
    /// assert_eq!(pool.len(), 1);
    /// ```
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use.
    pub fn len(&self) -> usize {
        self.length
    }

    /// Whether the pool is empty.
    ///
    /// An empty pool may still be holding unused capacity.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stable_pool::StablePool;
    ///
    /// let mut pool = StablePool::<u16>::new();
    /// assert!(pool.is_empty());
    ///
    /// let key = pool.insert(123);
    /// assert!(!pool.is_empty());
    ///
    /// pool.remove(key);
    /// assert!(pool.is_empty());
    /// ```
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The number of items the pool can accommodate without additional
    /// resource allocation.
    ///
    /// This is the total capacity, including any existing items. The capacity
    /// grows automatically when items are inserted and no vacant slot is
    /// available.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stable_pool::StablePool;
    ///
    /// let mut pool = StablePool::<u8>::new();
    ///
    /// // New pool starts with zero capacity.
    /// assert_eq!(pool.capacity(), 0);
    ///
    /// // Inserting items may increase capacity.
    /// _ = pool.insert(42);
    /// assert!(pool.capacity() > 0);
    /// assert!(pool.capacity() >= pool.len());
    /// ```
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.total_capacity
    }

    /// Reserves capacity for at least `additional` more items to be inserted
    /// in the pool.
    ///
    /// The pool may reserve more space to speculatively avoid frequent
    /// reallocations. After calling `reserve`, capacity will be greater than
    /// or equal to `self.len() + additional`. Does nothing if capacity is
    /// already sufficient.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stable_pool::StablePool;
    ///
    /// let mut pool = StablePool::<u32>::new();
    ///
    /// // Reserve space for 10 more items.
    /// pool.reserve(10);
    /// assert!(pool.capacity() >= 10);
    ///
    /// // Insert an item - should not need to allocate more capacity.
    /// _ = pool.insert(42);
    ///
    /// // Reserve additional space on top of existing items.
    /// pool.reserve(5);
    /// assert!(pool.capacity() >= pool.len() + 5);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the required capacity overflows `usize`.
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use.
    pub fn reserve(&mut self, additional: usize) {
        let required_capacity = self
            .length
            .checked_add(additional)
            .expect("capacity overflow: requested capacity exceeds maximum possible value");

        while self.total_capacity < required_capacity {
            self.grow();
        }
    }

    /// Gets a reference to an item in the pool by its key.
    ///
    /// The item is guaranteed not to move in memory for as long as it is in
    /// the pool, but the reference borrows the pool, so only pool operations
    /// that take `&self` may be used while it is held.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stable_pool::StablePool;
    ///
    /// let mut pool = StablePool::<String>::new();
    /// let key = pool.insert("Hello, World!".to_string());
    ///
    /// let item = pool.get(key);
    /// assert_eq!(&*item, "Hello, World!");
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the key is not associated with an item.
    #[must_use]
    pub fn get(&self, key: Key) -> &T {
        self.blocks
            .get(key.addr.block_index)
            .map(|block| block.get(key.addr.slot_index))
            .expect("key was not associated with an item in the pool")
    }

    /// Gets an exclusive reference to an item in the pool by its key.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stable_pool::StablePool;
    ///
    /// let mut pool = StablePool::<String>::new();
    /// let key = pool.insert("Hello".to_string());
    ///
    /// pool.get_mut(key).push_str(", World!");
    ///
    /// assert_eq!(&*pool.get(key), "Hello, World!");
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the key is not associated with an item.
    #[must_use]
    pub fn get_mut(&mut self, key: Key) -> &mut T {
        self.blocks
            .get_mut(key.addr.block_index)
            .map(|block| block.get_mut(key.addr.slot_index))
            .expect("key was not associated with an item in the pool")
    }

    /// Creates an inserter that enables advanced techniques for inserting an
    /// item into the pool.
    ///
    /// Using an inserter allows you to obtain the key before the item is
    /// inserted and immediately obtain a reference to the item. This can be
    /// more efficient than [`insert()`] when you need immediate access to the
    /// inserted item.
    ///
    /// Abandoning the inserter without inserting anything is a no-op.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stable_pool::StablePool;
    ///
    /// let mut pool = StablePool::<String>::new();
    ///
    /// // Get the key before insertion.
    /// let inserter = pool.begin_insert();
    /// let key = inserter.key();
    ///
    /// // Insert and get immediate access to the item.
    /// let item = inserter.insert("Hello".to_string());
    /// assert_eq!(&*item, "Hello");
    ///
    /// // The key can be used for later access.
    /// let same_item = pool.get(key);
    /// assert_eq!(&*same_item, "Hello");
    /// ```
    ///
    /// [`insert()`]: Self::insert
    #[must_use]
    pub fn begin_insert<'a, 'b>(&'a mut self) -> StablePoolInserter<'b, T>
    where
        'a: 'b,
    {
        if self.free_head.is_none() {
            self.grow();
        }

        // The slot is only popped off the free list when the insert completes,
        // which is what makes abandoning the inserter a no-op.
        let addr = self
            .free_head
            .expect("grow() always threads at least one slot onto the free list");

        StablePoolInserter { pool: self, addr }
    }

    /// Inserts an item into the pool and returns its key.
    ///
    /// The item will not move in memory until it is removed from the pool or
    /// the pool is cleared or dropped. The returned key can be used to access
    /// the item via [`get()`] or [`get_mut()`].
    ///
    /// If a previously removed slot is available, it is reused; a new block is
    /// allocated only when every slot in the pool is occupied.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stable_pool::StablePool;
    ///
    /// let mut pool = StablePool::<i32>::new();
    ///
    /// let key = pool.insert(42);
    /// let item = pool.get(key);
    /// assert_eq!(*item, 42);
    ///
    /// // Keys can be stored and used later.
    /// let another_key = pool.insert(24);
    /// assert_eq!(*pool.get(another_key), 24);
    /// ```
    ///
    /// [`get()`]: Self::get
    /// [`get_mut()`]: Self::get_mut
    #[must_use]
    pub fn insert(&mut self, value: T) -> Key {
        let inserter = self.begin_insert();
        let key = inserter.key();
        inserter.insert(value);
        key
    }

    /// Removes an item from the pool by its key.
    ///
    /// The item is dropped and its slot is pushed onto the free list for reuse
    /// by a later insertion. Keys to *other* items remain valid; only the
    /// removed item's key becomes stale.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stable_pool::StablePool;
    ///
    /// let mut pool = StablePool::<String>::new();
    /// let key = pool.insert("Hello".to_string());
    ///
    /// assert_eq!(pool.len(), 1);
    ///
    /// pool.remove(key);
    ///
    /// assert_eq!(pool.len(), 0);
    /// assert!(pool.is_empty());
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the key is not associated with an item.
    pub fn remove(&mut self, key: Key) {
        let addr = key.addr;

        let free_head = self.free_head;

        let Some(block) = self.blocks.get_mut(addr.block_index) else {
            panic!("key was not associated with an item in the pool")
        };

        block.vacate(addr.slot_index, free_head);

        // Push the vacated slot onto the free list head.
        self.free_head = Some(addr);

        self.length = self
            .length
            .checked_sub(1)
            .expect("we just vacated an occupied slot so the pool cannot have been empty");
    }

    /// Drops every item and releases all block storage, returning the pool to
    /// its initial empty state.
    ///
    /// Every outstanding key is invalidated by this call - unlike
    /// [`remove()`][1], which only invalidates the key of the removed item.
    /// No capacity is retained.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stable_pool::StablePool;
    ///
    /// let mut pool = StablePool::<u32>::new();
    /// _ = pool.insert(1);
    /// _ = pool.insert(2);
    ///
    /// pool.clear();
    ///
    /// assert!(pool.is_empty());
    /// assert_eq!(pool.capacity(), 0);
    /// assert_eq!(pool.iter().count(), 0);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the pool is not empty and its [drop policy][DropPolicy]
    /// forbids dropping items.
    ///
    /// [1]: Self::remove
    pub fn clear(&mut self) {
        // Dropping the blocks drops any items they still hold.
        self.blocks.clear();

        self.free_head = None;
        self.length = 0;
        self.total_capacity = 0;
    }

    /// Returns an iterator over the items of the pool, yielding each item with
    /// its key.
    ///
    /// Items are visited in storage order: block order, then slot order within
    /// each block, skipping vacant slots. Storage order is unrelated to
    /// insertion order once slots have been recycled.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stable_pool::StablePool;
    ///
    /// let mut pool = StablePool::<u32>::new();
    /// let key_a = pool.insert(1);
    /// _ = pool.insert(2);
    ///
    /// pool.remove(key_a);
    ///
    /// let values: Vec<u32> = pool.iter().map(|(_, value)| *value).collect();
    /// assert_eq!(values, vec![2]);
    /// ```
    #[must_use]
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self)
    }

    /// Returns an iterator over the items of the pool, yielding each item with
    /// its key and allowing the items to be modified.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stable_pool::StablePool;
    ///
    /// let mut pool = StablePool::<u32>::new();
    /// let key = pool.insert(1);
    ///
    /// for (_, value) in pool.iter_mut() {
    ///     *value += 10;
    /// }
    ///
    /// assert_eq!(*pool.get(key), 11);
    /// ```
    #[must_use]
    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut::new(self)
    }

    /// Allocates one more block and threads all of its slots onto the free
    /// list in a single pass.
    ///
    /// The new block's capacity equals the current total capacity, clamped to
    /// the configured bounds - so total capacity doubles on each growth until
    /// blocks reach their maximum size.
    fn grow(&mut self) {
        let capacity = self
            .total_capacity
            .clamp(self.first_block_capacity.get(), self.max_block_capacity.get());
        let capacity = NonZero::new(capacity)
            .expect("clamp to a non-zero lower bound always yields a non-zero value");

        let block_index = self.blocks.len();

        self.blocks.push(Block::new(
            capacity,
            block_index,
            self.free_head,
            self.drop_policy,
        ));

        self.free_head = Some(SlotAddr::new(block_index, 0));

        self.total_capacity = self
            .total_capacity
            .checked_add(capacity.get())
            .expect("total capacity cannot exceed the range of virtual memory");
    }

    /// Verifies the internal bookkeeping of the pool: every slot on the free
    /// list is vacant and appears exactly once, every vacant slot is on the
    /// free list, and the recorded counts agree with the observed slot states.
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(any(test, debug_assertions))]
    pub(crate) fn integrity_check(&self) {
        let mut visited: Vec<Vec<bool>> = self
            .blocks
            .iter()
            .map(|block| vec![false; block.capacity().get()])
            .collect();

        let mut free_count: usize = 0;
        let mut cursor = self.free_head;

        while let Some(addr) = cursor {
            let block = self
                .blocks
                .get(addr.block_index)
                .expect("free list references a block that does not exist");

            let already_seen = visited
                .get_mut(addr.block_index)
                .and_then(|slots| slots.get_mut(addr.slot_index))
                .expect("free list references a slot beyond its block's capacity");

            // A revisited slot means the free list has a cycle or a duplicate.
            assert!(
                !*already_seen,
                "free list visits slot {}/{} twice in pool of {}",
                addr.block_index,
                addr.slot_index,
                type_name::<T>()
            );
            *already_seen = true;

            assert!(
                block.is_vacant(addr.slot_index),
                "free list contains occupied slot {}/{} in pool of {}",
                addr.block_index,
                addr.slot_index,
                type_name::<T>()
            );

            free_count = free_count
                .checked_add(1)
                .expect("free list cannot be longer than total capacity");

            cursor = block.free_link(addr.slot_index);
        }

        let expected_free_count = self
            .total_capacity
            .checked_sub(self.length)
            .expect("length cannot exceed total capacity");

        assert!(
            free_count == expected_free_count,
            "free list length {} does not match capacity {} minus length {} in pool of {}",
            free_count,
            self.total_capacity,
            self.length,
            type_name::<T>()
        );

        let mut occupied_count: usize = 0;

        for block in &self.blocks {
            let mut observed_in_block: usize = 0;

            for index in 0..block.capacity().get() {
                if !block.is_vacant(index) {
                    observed_in_block = observed_in_block
                        .checked_add(1)
                        .expect("occupied count cannot exceed block capacity");
                }
            }

            assert!(
                observed_in_block == block.len(),
                "block count {} does not match the observed occupied count {} in pool of {}",
                block.len(),
                observed_in_block,
                type_name::<T>()
            );

            occupied_count = occupied_count
                .checked_add(observed_in_block)
                .expect("occupied count cannot exceed total capacity");
        }

        assert!(
            occupied_count == self.length,
            "pool length {} does not match the observed occupied count {} in pool of {}",
            self.length,
            occupied_count,
            type_name::<T>()
        );
    }
}

impl<T> Default for StablePool<T> {
    /// Creates a new [`StablePool`] with the default configuration.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    fn default() -> Self {
        Self::new()
    }
}

/// An inserter for a [`StablePool`], enabling advanced item insertion
/// scenarios.
///
/// The inserter allows you to:
/// - Obtain the key before inserting the item via [`key()`]
/// - Insert an item and get immediate access via [`insert()`] or [`insert_mut()`]
/// - Avoid separate lookup operations when immediate access is needed
///
/// Created by calling [`StablePool::begin_insert()`]. Abandoning the inserter
/// without inserting anything is a no-op - the reserved slot simply stays at
/// the head of the free list.
///
/// # Example
///
/// ```rust
/// use stable_pool::StablePool;
///
/// let mut pool = StablePool::<String>::new();
///
/// let inserter = pool.begin_insert();
/// let key = inserter.key();
///
/// let item = inserter.insert_mut("Hello".to_string());
/// item.push_str(", World!");
///
/// assert_eq!(&*pool.get(key), "Hello, World!");
/// ```
///
/// [`key()`]: Self::key
/// [`insert()`]: Self::insert
/// [`insert_mut()`]: Self::insert_mut
/// [`StablePool::begin_insert()`]: StablePool::begin_insert
#[derive(Debug)]
pub struct StablePoolInserter<'p, T> {
    pool: &'p mut StablePool<T>,

    /// Slot at which the item will be inserted - the current free list head.
    addr: SlotAddr,
}

impl<'p, T> StablePoolInserter<'p, T> {
    /// Inserts an item and returns a reference to it.
    ///
    /// This provides immediate access to the inserted item without requiring a
    /// separate lookup.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stable_pool::StablePool;
    ///
    /// let mut pool = StablePool::<String>::new();
    /// let inserter = pool.begin_insert();
    /// let key = inserter.key();
    ///
    /// let item = inserter.insert("Hello, World!".to_string());
    /// assert_eq!(&*item, "Hello, World!");
    ///
    /// // The item can also be accessed later via the key.
    /// assert_eq!(&*pool.get(key), "Hello, World!");
    /// ```
    pub fn insert<'v>(self, value: T) -> &'v T
    where
        'p: 'v,
    {
        // Inserting an item always results in an exclusive reference, so this
        // method simply downgrades the exclusive reference to a shared one.
        self.insert_mut(value)
    }

    /// Inserts an item and returns an exclusive reference to it.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stable_pool::StablePool;
    ///
    /// let mut pool = StablePool::<u32>::new();
    /// let inserter = pool.begin_insert();
    /// let key = inserter.key();
    ///
    /// let item = inserter.insert_mut(42);
    /// *item = 99;
    ///
    /// assert_eq!(*pool.get(key), 99);
    /// ```
    pub fn insert_mut<'v>(self, value: T) -> &'v mut T
    where
        'p: 'v,
    {
        let pool = self.pool;
        let addr = self.addr;

        let block = pool
            .blocks
            .get_mut(addr.block_index)
            .expect("free list head always references an existing block");

        // Pop the slot off the free list by advancing the head to the link
        // the slot carried.
        let next_free = block.occupy(addr.slot_index, value);

        pool.free_head = next_free;

        pool.length = pool
            .length
            .checked_add(1)
            .expect("length cannot exceed total capacity, which fits in usize");

        pool.blocks
            .get_mut(addr.block_index)
            .expect("the block we just inserted into still exists")
            .get_mut(addr.slot_index)
    }

    /// The key of the item that will be inserted by this inserter.
    ///
    /// This allows you to obtain the key before actually inserting the item,
    /// which can be useful when the item needs to know its own key during
    /// construction.
    ///
    /// If the inserter is abandoned, the key may be used by a different item
    /// inserted later.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stable_pool::StablePool;
    ///
    /// let mut pool = StablePool::<String>::new();
    /// let inserter = pool.begin_insert();
    ///
    /// // Get the key before insertion.
    /// let key = inserter.key();
    ///
    /// // Use the key to create the item (useful for self-referential data).
    /// let item_content = format!("Item with key: {key:?}");
    /// _ = inserter.insert(item_content);
    ///
    /// assert!(pool.get(key).contains("Item with key:"));
    /// ```
    #[must_use]
    pub fn key(&self) -> Key {
        Key { addr: self.addr }
    }
}

/// Iterator over the items of a [`StablePool`].
///
/// Yields `(Key, &T)` pairs in storage order - block order, then slot order
/// within each block - skipping vacant slots.
///
/// Created by [`StablePool::iter()`].
#[derive(Debug)]
pub struct Iter<'p, T> {
    pool: &'p StablePool<T>,

    // Position of the next slot to inspect. Once the iterator is exhausted,
    // this points past the last block.
    block_index: usize,
    slot_index: usize,

    // Total number of items already yielded.
    yielded_count: usize,
}

impl<'p, T> Iter<'p, T> {
    fn new(pool: &'p StablePool<T>) -> Self {
        Self {
            pool,
            block_index: 0,
            slot_index: 0,
            yielded_count: 0,
        }
    }
}

impl<'p, T> Iterator for Iter<'p, T> {
    type Item = (Key, &'p T);

    fn next(&mut self) -> Option<Self::Item> {
        while self.len() > 0 {
            let block = self.pool.blocks.get(self.block_index).expect(
                "iterator has items remaining, so there must still be a block to get them from",
            );

            while self.slot_index < block.capacity().get() {
                let slot_index = self.slot_index;

                // Will never wrap because a block cannot have more slots than
                // virtual memory can fit.
                self.slot_index = slot_index.wrapping_add(1);

                if let Some(value) = block.value(slot_index) {
                    self.yielded_count = self.yielded_count.wrapping_add(1);

                    let key = Key {
                        addr: SlotAddr::new(self.block_index, slot_index),
                    };

                    return Some((key, value));
                }
            }

            // No more slots in this block, move to the next.
            self.block_index = self.block_index.wrapping_add(1);
            self.slot_index = 0;
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len();
        (remaining, Some(remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {
    fn len(&self) -> usize {
        // Total items in the pool minus those we have already yielded.
        // Will not wrap because we cannot yield more items than exist.
        self.pool.len().wrapping_sub(self.yielded_count)
    }
}

// Once we return None, we will keep returning None.
impl<T> FusedIterator for Iter<'_, T> {}

impl<'p, T> IntoIterator for &'p StablePool<T> {
    type Item = (Key, &'p T);
    type IntoIter = Iter<'p, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the items of a [`StablePool`], yielding exclusive references.
///
/// Created by [`StablePool::iter_mut()`].
#[derive(Debug)]
pub struct IterMut<'p, T> {
    pool: &'p mut StablePool<T>,

    // Position of the next slot to inspect. Once the iterator is exhausted,
    // this points past the last block.
    block_index: usize,
    slot_index: usize,

    // Total number of items already yielded.
    yielded_count: usize,
}

impl<'p, T> IterMut<'p, T> {
    fn new(pool: &'p mut StablePool<T>) -> Self {
        Self {
            pool,
            block_index: 0,
            slot_index: 0,
            yielded_count: 0,
        }
    }
}

impl<'p, T> Iterator for IterMut<'p, T> {
    type Item = (Key, &'p mut T);

    fn next(&mut self) -> Option<Self::Item> {
        while self.len() > 0 {
            let block = self.pool.blocks.get_mut(self.block_index).expect(
                "iterator has items remaining, so there must still be a block to get them from",
            );

            while self.slot_index < block.capacity().get() {
                let slot_index = self.slot_index;

                // Will never wrap because a block cannot have more slots than
                // virtual memory can fit.
                self.slot_index = slot_index.wrapping_add(1);

                if let Some(mut value_ptr) = block.value_ptr(slot_index) {
                    self.yielded_count = self.yielded_count.wrapping_add(1);

                    let key = Key {
                        addr: SlotAddr::new(self.block_index, slot_index),
                    };

                    // This detaches the yielded reference's lifetime from this
                    // call's borrow of the iterator. The relationship to the
                    // pool borrow is restored via the 'p in our signature.
                    //
                    // SAFETY: The iterator holds the pool exclusively borrowed
                    // for 'p, each slot is yielded at most once, and slot
                    // storage never moves, so the references we hand out can
                    // never alias each other or anything else.
                    let value = unsafe { value_ptr.as_mut() };

                    return Some((key, value));
                }
            }

            // No more slots in this block, move to the next.
            self.block_index = self.block_index.wrapping_add(1);
            self.slot_index = 0;
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len();
        (remaining, Some(remaining))
    }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {
    fn len(&self) -> usize {
        // Total items in the pool minus those we have already yielded.
        // Will not wrap because we cannot yield more items than exist.
        self.pool.len().wrapping_sub(self.yielded_count)
    }
}

// Once we return None, we will keep returning None.
impl<T> FusedIterator for IterMut<'_, T> {}

impl<'p, T> IntoIterator for &'p mut StablePool<T> {
    type Item = (Key, &'p mut T);
    type IntoIter = IterMut<'p, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::indexing_slicing,
        clippy::cast_possible_truncation,
        reason = "we do not need to worry about these things when writing test code"
    )]

    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};
    use std::thread;

    use new_zealand::nz;
    use rand::rngs::SmallRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    // When T: Send, the pool should be Send but not Sync.
    assert_impl_all!(StablePool<u32>: Send);
    assert_not_impl_any!(StablePool<u32>: Sync);

    // When T: !Send, the pool should be neither Send nor Sync.
    assert_not_impl_any!(StablePool<Rc<u32>>: Send, Sync);

    /// Element type that balances a shared counter on construction and drop,
    /// for leak accounting in tests.
    struct Counted {
        live: Rc<Cell<isize>>,
    }

    impl Counted {
        fn new(live: &Rc<Cell<isize>>) -> Self {
            live.set(live.get() + 1);

            Self {
                live: Rc::clone(live),
            }
        }
    }

    impl Drop for Counted {
        fn drop(&mut self) {
            self.live.set(self.live.get() - 1);
        }
    }

    #[test]
    fn smoke_test() {
        let mut pool = StablePool::<u32>::new();

        assert_eq!(pool.len(), 0);
        assert!(pool.is_empty());

        let key_a = pool.insert(42);
        let key_b = pool.insert(43);
        let key_c = pool.insert(44);

        assert_eq!(pool.len(), 3);
        assert!(!pool.is_empty());
        assert!(pool.capacity() >= 3);

        assert_eq!(*pool.get(key_a), 42);
        assert_eq!(*pool.get(key_b), 43);
        assert_eq!(*pool.get(key_c), 44);

        pool.remove(key_b);

        let key_d = pool.insert(45);

        assert_eq!(*pool.get(key_a), 42);
        assert_eq!(*pool.get(key_c), 44);
        assert_eq!(*pool.get(key_d), 45);

        pool.integrity_check();
    }

    #[test]
    fn first_insert_allocates_first_block() {
        let mut pool = StablePool::<u32>::new();

        assert_eq!(pool.capacity(), 0);

        _ = pool.insert(1234);

        assert!(pool.capacity() > 0);
    }

    #[test]
    fn keys_survive_unrelated_removals() {
        let mut pool = StablePool::<u32>::new();

        let key_a = pool.insert(42);
        let key_b = pool.insert(43);
        let key_c = pool.insert(44);

        pool.remove(key_a);
        pool.remove(key_c);

        // Removing other items must not disturb what key_b refers to.
        assert_eq!(*pool.get(key_b), 43);

        // Even after the freed slots are recycled.
        _ = pool.insert(100);
        _ = pool.insert(101);

        assert_eq!(*pool.get(key_b), 43);
    }

    #[test]
    fn removed_slot_is_reused_before_growth() {
        let mut pool = StablePool::<u32>::new();

        let key_a = pool.insert(42);
        _ = pool.insert(43);

        let capacity_before = pool.capacity();

        pool.remove(key_a);
        let key_c = pool.insert(44);

        // LIFO free list: the most recently freed slot is handed out first.
        assert_eq!(key_c, key_a);
        assert_eq!(pool.capacity(), capacity_before);
    }

    #[test]
    fn begin_insert_returns_correct_key() {
        let mut pool = StablePool::<u32>::new();

        // We expect that we insert items in order, from the start (0, 1, 2, ...).

        let inserter = pool.begin_insert();
        let key = inserter.key();
        assert_eq!(key.addr, SlotAddr::new(0, 0));
        inserter.insert(10);
        assert_eq!(*pool.get(key), 10);

        let inserter = pool.begin_insert();
        let key = inserter.key();
        assert_eq!(key.addr, SlotAddr::new(0, 1));
        inserter.insert(11);
        assert_eq!(*pool.get(key), 11);

        let inserter = pool.begin_insert();
        let key = inserter.key();
        assert_eq!(key.addr, SlotAddr::new(0, 2));
        inserter.insert(12);
        assert_eq!(*pool.get(key), 12);
    }

    #[test]
    fn abandoned_inserter_is_noop() {
        let mut pool = StablePool::<u32>::new();

        // If you abandon an inserter, nothing happens.
        _ = pool.begin_insert();

        let inserter = pool.begin_insert();
        let key = inserter.key();
        inserter.insert(20);

        assert_eq!(*pool.get(key), 20);
        assert_eq!(pool.len(), 1);

        pool.integrity_check();
    }

    #[test]
    fn abandoned_inserter_does_not_leak_slot() {
        let mut pool = StablePool::<u32>::builder()
            .first_block_capacity(nz!(2))
            .max_block_capacity(nz!(2))
            .build();

        // Leave space for 1 item.
        _ = pool.insert(1234);

        // Begin an insert but do not complete it.
        _ = pool.begin_insert();

        // Ensure that the next inserted item still goes into the first block.
        _ = pool.insert(5678);

        assert_eq!(pool.capacity(), 2);
    }

    #[test]
    fn insert_mut_then_get_is_correct_value() {
        let mut pool = StablePool::<u32>::new();

        let inserter = pool.begin_insert();
        let key = inserter.key();
        let item = inserter.insert_mut(42);
        *item = 99;

        assert_eq!(*pool.get(key), 99);
    }

    #[test]
    #[should_panic]
    fn panic_when_empty_oob_get() {
        let pool = StablePool::<u32>::new();

        _ = pool.get(Key {
            addr: SlotAddr::new(0, 0),
        });
    }

    #[test]
    #[should_panic]
    fn get_vacant_panics() {
        let mut pool = StablePool::<u32>::new();

        // Ensure the first block is created, so the pool is not empty.
        let key = pool.insert(1234);
        pool.remove(key);

        _ = pool.get(key);
    }

    #[test]
    #[should_panic]
    fn get_mut_vacant_panics() {
        let mut pool = StablePool::<u32>::new();

        let key = pool.insert(1234);
        pool.remove(key);

        _ = pool.get_mut(key);
    }

    #[test]
    #[should_panic]
    fn remove_empty_panics() {
        let mut pool = StablePool::<u32>::new();

        pool.remove(Key {
            addr: SlotAddr::new(0, 0),
        });
    }

    #[test]
    #[should_panic]
    fn remove_vacant_panics() {
        let mut pool = StablePool::<u32>::new();

        let key = pool.insert(1234);
        pool.remove(key);

        // The slot is already vacant.
        pool.remove(key);
    }

    #[test]
    #[should_panic]
    fn remove_oob_panics() {
        let mut pool = StablePool::<u32>::new();

        // Ensure the first block is created, so the pool is not empty.
        _ = pool.insert(1234);

        // This key does not reference a valid block.
        pool.remove(Key {
            addr: SlotAddr::new(9999, 0),
        });
    }

    #[test]
    fn fill_first_block_before_allocating_second() {
        let mut pool = StablePool::<u32>::builder()
            .first_block_capacity(nz!(4))
            .max_block_capacity(nz!(4))
            .build();

        for _ in 0..4 {
            _ = pool.insert(1234);
        }

        assert_eq!(pool.capacity(), 4);

        // This will allocate a second block.
        _ = pool.insert(1234);

        assert_eq!(pool.capacity(), 8);

        pool.integrity_check();
    }

    #[test]
    fn fill_hole_before_allocating_new_block() {
        let mut pool = StablePool::<u32>::builder()
            .first_block_capacity(nz!(4))
            .max_block_capacity(nz!(4))
            .build();

        for _ in 0..3 {
            _ = pool.insert(1234);
        }
        let key_to_remove = pool.insert(1234);

        pool.remove(key_to_remove);

        // This fills the hole instead of allocating a new block.
        let key_filled = pool.insert(5678);

        assert_eq!(key_filled, key_to_remove);
        assert_eq!(pool.capacity(), 4);
        assert_eq!(*pool.get(key_filled), 5678);
    }

    #[test]
    fn growth_doubles_total_capacity_until_block_limit() {
        let mut pool = StablePool::<u32>::builder()
            .first_block_capacity(nz!(4))
            .max_block_capacity(nz!(8))
            .build();

        // Block capacities follow the schedule 4, 4, 8, 8, 8, ... - each new
        // block matches the current total capacity until the per-block cap.
        _ = pool.insert(0);
        assert_eq!(pool.capacity(), 4);

        for _ in 0..4 {
            _ = pool.insert(0);
        }
        assert_eq!(pool.capacity(), 8);

        for _ in 0..4 {
            _ = pool.insert(0);
        }
        assert_eq!(pool.capacity(), 16);

        for _ in 0..8 {
            _ = pool.insert(0);
        }
        assert_eq!(pool.capacity(), 24);

        pool.integrity_check();
    }

    #[test]
    fn reserve_increases_capacity() {
        let mut pool = StablePool::<u32>::new();

        // Initially no capacity.
        assert_eq!(pool.capacity(), 0);

        // Reserve space for 10 items.
        pool.reserve(10);
        assert!(pool.capacity() >= 10);

        // Insert an item - should not need to allocate more capacity.
        let initial_capacity = pool.capacity();
        _ = pool.insert(42);
        assert_eq!(pool.capacity(), initial_capacity);

        pool.integrity_check();
    }

    #[test]
    fn reserve_with_existing_items() {
        let mut pool = StablePool::<u32>::new();

        let key1 = pool.insert(1);
        let key2 = pool.insert(2);
        let current_len = pool.len();

        pool.reserve(5);
        assert!(pool.capacity() >= current_len + 5);

        // Verify existing items are still accessible.
        assert_eq!(*pool.get(key1), 1);
        assert_eq!(*pool.get(key2), 2);

        pool.integrity_check();
    }

    #[test]
    fn reserve_zero_does_nothing() {
        let mut pool = StablePool::<u32>::new();
        let initial_capacity = pool.capacity();

        pool.reserve(0);
        assert_eq!(pool.capacity(), initial_capacity);
    }

    #[test]
    fn reserve_with_sufficient_capacity_does_nothing() {
        let mut pool = StablePool::<u32>::new();

        pool.reserve(10);
        let capacity_after_reserve = pool.capacity();

        pool.reserve(5);
        assert_eq!(pool.capacity(), capacity_after_reserve);
    }

    #[test]
    #[should_panic(expected = "capacity overflow")]
    fn reserve_overflow_panics() {
        let mut pool = StablePool::<u32>::new();

        // Insert one item to make len() = 1, so that 1 + usize::MAX overflows
        // during the capacity calculation.
        _ = pool.insert(42);

        pool.reserve(usize::MAX);
    }

    #[test]
    fn clear_on_empty_pool_is_noop() {
        let mut pool = StablePool::<u32>::new();

        pool.clear();

        assert_eq!(pool.len(), 0);
        assert!(pool.is_empty());
        assert_eq!(pool.capacity(), 0);
    }

    #[test]
    fn clear_drops_items_and_releases_capacity() {
        let live = Rc::new(Cell::new(0));

        let mut pool = StablePool::<Counted>::new();

        for _ in 0..100 {
            _ = pool.insert(Counted::new(&live));
        }

        assert_eq!(live.get(), 100);

        pool.clear();

        assert_eq!(live.get(), 0);
        assert_eq!(pool.len(), 0);
        assert!(pool.is_empty());
        assert_eq!(pool.capacity(), 0);
        assert_eq!(pool.iter().count(), 0);
    }

    #[test]
    fn pool_is_usable_after_clear() {
        let mut pool = StablePool::<u32>::new();

        _ = pool.insert(1);
        _ = pool.insert(2);

        pool.clear();

        let key = pool.insert(3);

        assert_eq!(*pool.get(key), 3);
        assert_eq!(pool.len(), 1);

        pool.integrity_check();
    }

    #[test]
    #[should_panic]
    fn get_after_clear_panics() {
        let mut pool = StablePool::<u32>::new();

        let key = pool.insert(1);
        pool.clear();

        _ = pool.get(key);
    }

    #[test]
    fn drop_balances_constructions_and_destructions() {
        let live = Rc::new(Cell::new(0));

        {
            let mut pool = StablePool::<Counted>::new();

            let mut keys = Vec::new();
            for _ in 0..50 {
                keys.push(pool.insert(Counted::new(&live)));
            }

            // Remove some, leave the rest for the pool to drop.
            for key in keys.drain(..20) {
                pool.remove(key);
            }

            assert_eq!(live.get(), 30);
        }

        assert_eq!(live.get(), 0);
    }

    #[test]
    fn iter_empty_pool_yields_nothing() {
        let pool = StablePool::<u32>::new();

        assert_eq!(pool.iter().count(), 0);
        assert_eq!(pool.iter().size_hint(), (0, Some(0)));
    }

    #[test]
    fn iter_visits_every_item_exactly_once() {
        let mut pool = StablePool::<u32>::new();

        for i in 0..10 {
            _ = pool.insert(i);
        }

        let values: Vec<u32> = pool.iter().map(|(_, value)| *value).collect();

        assert_eq!(values, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn iter_skips_removed_items() {
        let mut pool = StablePool::<u32>::new();

        let keys: Vec<Key> = (0..10).map(|i| pool.insert(i)).collect();

        // Remove the even-indexed items.
        for key in keys.iter().step_by(2) {
            pool.remove(*key);
        }

        let values: Vec<u32> = pool.iter().map(|(_, value)| *value).collect();

        assert_eq!(values, vec![1, 3, 5, 7, 9]);
        assert_eq!(pool.iter().count(), pool.len());
    }

    #[test]
    fn iter_spans_multiple_blocks() {
        let mut pool = StablePool::<u32>::builder()
            .first_block_capacity(nz!(2))
            .max_block_capacity(nz!(4))
            .build();

        for i in 0..20 {
            _ = pool.insert(i);
        }

        let values: Vec<u32> = pool.iter().map(|(_, value)| *value).collect();

        assert_eq!(values, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn iter_yields_keys_that_resolve_to_the_items() {
        let mut pool = StablePool::<u32>::new();

        for i in 0..10 {
            _ = pool.insert(i);
        }

        let pairs: Vec<(Key, u32)> = pool.iter().map(|(key, value)| (key, *value)).collect();

        for (key, value) in pairs {
            assert_eq!(*pool.get(key), value);
        }
    }

    #[test]
    fn iter_is_exact_size_and_fused() {
        let mut pool = StablePool::<u32>::new();

        for i in 0..3 {
            _ = pool.insert(i);
        }

        let mut iter = pool.iter();

        assert_eq!(iter.len(), 3);
        _ = iter.next();
        assert_eq!(iter.len(), 2);
        _ = iter.next();
        _ = iter.next();
        assert_eq!(iter.len(), 0);

        // Once exhausted, stays exhausted.
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    fn iter_mut_allows_modification() {
        let mut pool = StablePool::<u32>::new();

        let keys: Vec<Key> = (0..5).map(|i| pool.insert(i)).collect();

        for (_, value) in pool.iter_mut() {
            *value += 100;
        }

        for (i, key) in keys.iter().enumerate() {
            assert_eq!(*pool.get(*key), i as u32 + 100);
        }
    }

    #[test]
    fn iter_mut_skips_removed_items() {
        let mut pool = StablePool::<u32>::new();

        let keys: Vec<Key> = (0..6).map(|i| pool.insert(i)).collect();

        pool.remove(keys[0]);
        pool.remove(keys[3]);

        let visited: Vec<u32> = pool.iter_mut().map(|(_, value)| *value).collect();

        assert_eq!(visited, vec![1, 2, 4, 5]);
    }

    #[test]
    fn into_iterator_for_references() {
        let mut pool = StablePool::<u32>::new();

        _ = pool.insert(1);
        _ = pool.insert(2);

        let mut total = 0;
        for (_, value) in &pool {
            total += *value;
        }
        assert_eq!(total, 3);

        for (_, value) in &mut pool {
            *value *= 10;
        }

        let values: Vec<u32> = pool.iter().map(|(_, value)| *value).collect();
        assert_eq!(values, vec![10, 20]);
    }

    #[test]
    fn iteration_count_matches_len_after_churn() {
        let mut pool = StablePool::<u32>::new();

        let mut keys = Vec::new();
        for i in 0..100 {
            keys.push(pool.insert(i));
        }

        for key in keys.into_iter().step_by(3) {
            pool.remove(key);
        }

        assert_eq!(pool.iter().count(), pool.len());
    }

    #[test]
    #[cfg_attr(miri, ignore = "too much memory traffic for Miri")]
    fn randomized_churn_preserves_accounting() {
        let live = Rc::new(Cell::new(0));

        let mut pool = StablePool::<Counted>::new();

        let mut keys = Vec::new();
        for _ in 0..16384 {
            keys.push(pool.insert(Counted::new(&live)));
        }

        assert_eq!(pool.len(), 16384);
        assert_eq!(live.get(), 16384);

        // Remove a uniformly random half of the items.
        let mut rng = SmallRng::seed_from_u64(0x5eed_cafe);
        keys.shuffle(&mut rng);

        for key in keys.drain(..8192) {
            pool.remove(key);
        }

        assert_eq!(pool.len(), 8192);
        assert_eq!(live.get(), 8192);
        assert_eq!(pool.iter().count(), 8192);

        pool.integrity_check();

        // Surviving keys still resolve.
        for key in &keys {
            _ = pool.get(*key);
        }

        // Refill: the freed slots are reused, no new blocks are needed.
        let capacity_before = pool.capacity();

        for _ in 0..8192 {
            keys.push(pool.insert(Counted::new(&live)));
        }

        assert_eq!(pool.len(), 16384);
        assert_eq!(live.get(), 16384);
        assert_eq!(pool.capacity(), capacity_before);

        pool.integrity_check();

        drop(pool);

        assert_eq!(live.get(), 0);
    }

    #[test]
    fn in_refcell_works_fine() {
        let pool = RefCell::new(StablePool::<u32>::new());

        let key_a = {
            let mut pool = pool.borrow_mut();
            let key_a = pool.insert(42);
            let key_b = pool.insert(43);
            let key_c = pool.insert(44);

            assert_eq!(*pool.get(key_a), 42);
            assert_eq!(*pool.get(key_b), 43);
            assert_eq!(*pool.get(key_c), 44);

            pool.remove(key_b);

            let key_d = pool.insert(45);

            assert_eq!(*pool.get(key_a), 42);
            assert_eq!(*pool.get(key_c), 44);
            assert_eq!(*pool.get(key_d), 45);

            key_a
        };

        {
            let pool = pool.borrow();
            assert_eq!(*pool.get(key_a), 42);
        }
    }

    #[test]
    fn multithreaded_via_mutex() {
        let shared_pool = Arc::new(Mutex::new(StablePool::<u32>::new()));

        let key_a;
        let key_b;
        let key_c;

        {
            let mut pool = shared_pool.lock().unwrap();
            key_a = pool.insert(42);
            key_b = pool.insert(43);
            key_c = pool.insert(44);

            assert_eq!(*pool.get(key_a), 42);
            assert_eq!(*pool.get(key_b), 43);
            assert_eq!(*pool.get(key_c), 44);
        }

        thread::spawn({
            let shared_pool = Arc::clone(&shared_pool);
            move || {
                let mut pool = shared_pool.lock().unwrap();

                pool.remove(key_b);

                let key_d = pool.insert(45);

                assert_eq!(*pool.get(key_a), 42);
                assert_eq!(*pool.get(key_c), 44);
                assert_eq!(*pool.get(key_d), 45);
            }
        })
        .join()
        .unwrap();

        let pool = shared_pool.lock().unwrap();
        assert!(!pool.is_empty());
    }

    #[test]
    #[should_panic]
    fn drop_item_with_forbidden_to_drop_policy_panics() {
        let mut pool = StablePool::<u32>::builder()
            .drop_policy(DropPolicy::MustNotDropItems)
            .build();
        _ = pool.insert(123);
    }

    #[test]
    fn drop_itemless_with_forbidden_to_drop_policy_ok() {
        drop(
            StablePool::<u32>::builder()
                .drop_policy(DropPolicy::MustNotDropItems)
                .build(),
        );
    }

    #[test]
    #[should_panic]
    fn clear_nonempty_with_forbidden_to_drop_policy_panics() {
        let mut pool = StablePool::<u32>::builder()
            .drop_policy(DropPolicy::MustNotDropItems)
            .build();

        _ = pool.insert(123);

        pool.clear();
    }

    #[test]
    #[should_panic]
    fn zst_is_panic() {
        drop(StablePool::<()>::new());
    }

    #[test]
    fn default_works_fine() {
        let mut pool: StablePool<u32> = StablePool::default();
        assert!(pool.is_empty());
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.capacity(), 0);

        let key = pool.insert(1234);
        assert!(!pool.is_empty());
        assert_eq!(pool.len(), 1);

        assert_eq!(*pool.get(key), 1234);

        pool.remove(key);
    }
}
