use std::alloc::{Layout, alloc, dealloc};
use std::any::type_name;
use std::num::NonZero;
use std::ptr::NonNull;
use std::{mem, thread};

use crate::DropPolicy;
use crate::pool::SlotAddr;

/// This is the backing storage of a `StablePool`. It is an implementation detail,
/// not exposed in the public API.
///
/// A fixed-capacity heap-allocated run of slots. The slot storage is allocated once
/// in the constructor and released only when the block is dropped - it never moves
/// and is never resized, which is what lets the pool promise that items stay put.
///
/// A block does not manage its own free list. The pool threads one free list through
/// the vacant slots of all of its blocks; the block only stores the links on behalf
/// of the pool and hands them back when a slot changes state.
#[derive(Debug)]
pub(crate) struct Block<T> {
    first_entry_ptr: NonNull<Entry<T>>,

    /// Number of slots in this block. Fixed at construction.
    capacity: NonZero<usize>,

    /// The number of occupied slots in this block. Used to cross-check pool
    /// bookkeeping and to detect items remaining at drop time.
    count: usize,

    drop_policy: DropPolicy,
}

/// One slot: either a live value or a vacant slot carrying the free list link
/// in its otherwise idle storage.
#[derive(Debug)]
enum Entry<T> {
    Occupied { value: T },

    Vacant { next_free: Option<SlotAddr> },
}

impl<T> Block<T> {
    /// Creates a new block with every slot vacant and threaded onto the free list:
    /// slot `i` links to slot `i + 1`, and the last slot links to `chain_to`,
    /// the pool's previous free list head. The pool's new free list head is
    /// slot 0 of this block.
    ///
    /// # Panics
    ///
    /// Panics if the item size is zero.
    #[must_use]
    pub(crate) fn new(
        capacity: NonZero<usize>,
        block_index: usize,
        chain_to: Option<SlotAddr>,
        drop_policy: DropPolicy,
    ) -> Self {
        assert!(size_of::<T>() > 0, "Block must have non-zero item size");

        // SAFETY: The layout must be valid for the target type (sure, we calculate it correctly)
        // and not zero-sized (capacity is non-zero and every entry carries a discriminant).
        let ptr = NonNull::new(unsafe { alloc(Self::layout(capacity)).cast::<Entry<T>>() }).expect(
            "we do not intend to handle allocation failure as a real possibility - OOM is panic",
        );

        // Thread all slots onto the free list in a single pass.
        for index in 0..capacity.get() {
            let next_free = index
                .checked_add(1)
                .filter(|&next| next < capacity.get())
                .map(|next| SlotAddr::new(block_index, next))
                .or(chain_to);

            // SAFETY: We ensure in `layout()` that there is enough space for all slots up to our
            // indicated capacity.
            let entry = unsafe { ptr.add(index) };

            // SAFETY: The pointer is valid for writes and of the right type, so all is well.
            unsafe {
                entry.as_ptr().write(Entry::Vacant { next_free });
            }
        }

        Self {
            first_entry_ptr: ptr,
            capacity,
            count: 0,
            drop_policy,
        }
    }

    #[must_use]
    fn layout(capacity: NonZero<usize>) -> Layout {
        Layout::array::<Entry<T>>(capacity.get())
            .expect("simple flat array layout must be calculable")
    }

    #[must_use]
    pub(crate) fn capacity(&self) -> NonZero<usize> {
        self.capacity
    }

    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use.
    pub(crate) fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, index: usize) -> &Entry<T> {
        let entry_ptr = self.entry_ptr(index);

        // SAFETY: We ensured in the ctor that every entry is initialized and ensured above
        // that the pointer is valid, so we can safely dereference it.
        unsafe { entry_ptr.as_ref() }
    }

    #[expect(clippy::needless_pass_by_ref_mut, reason = "false positive")]
    fn entry_mut(&mut self, index: usize) -> &mut Entry<T> {
        let mut entry_ptr = self.entry_ptr(index);

        // SAFETY: We ensured in the ctor that every entry is initialized and ensured above
        // that the pointer is valid, so we can safely dereference it.
        unsafe { entry_ptr.as_mut() }
    }

    fn entry_ptr(&self, index: usize) -> NonNull<Entry<T>> {
        assert!(
            index < self.capacity.get(),
            "slot {index} index out of bounds in block of {}",
            type_name::<T>()
        );

        // SAFETY: Guarded by bounds check above, so we are guaranteed that the pointer is valid.
        unsafe { self.first_entry_ptr.add(index) }
    }

    /// # Panics
    ///
    /// Panics if the index is out of bounds or the slot is vacant.
    #[must_use]
    pub(crate) fn get(&self, index: usize) -> &T {
        match self.entry(index) {
            Entry::Occupied { value } => value,
            Entry::Vacant { .. } => panic!(
                "get({index}) slot was vacant in block of {}",
                type_name::<T>()
            ),
        }
    }

    /// # Panics
    ///
    /// Panics if the index is out of bounds or the slot is vacant.
    #[must_use]
    pub(crate) fn get_mut(&mut self, index: usize) -> &mut T {
        match self.entry_mut(index) {
            Entry::Occupied { value } => value,
            Entry::Vacant { .. } => panic!(
                "get_mut({index}) slot was vacant in block of {}",
                type_name::<T>()
            ),
        }
    }

    /// The value at the given slot, or `None` if the slot is vacant.
    ///
    /// This is the non-panicking lookup used by iteration to skip vacant slots.
    #[must_use]
    pub(crate) fn value(&self, index: usize) -> Option<&T> {
        match self.entry(index) {
            Entry::Occupied { value } => Some(value),
            Entry::Vacant { .. } => None,
        }
    }

    /// A pointer to the value at the given slot, or `None` if the slot is vacant.
    ///
    /// Used by exclusive iteration, which must detach the yielded references from
    /// its own borrow. The caller is responsible for not creating aliasing
    /// references from the returned pointer.
    #[must_use]
    pub(crate) fn value_ptr(&mut self, index: usize) -> Option<NonNull<T>> {
        match self.entry_mut(index) {
            Entry::Occupied { value } => Some(NonNull::from(value)),
            Entry::Vacant { .. } => None,
        }
    }

    /// Places a value into the vacant slot at `index`, returning the free list
    /// link the slot previously carried so the pool can update its head.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds or the slot is already occupied.
    pub(crate) fn occupy(&mut self, index: usize, value: T) -> Option<SlotAddr> {
        let entry = self.entry_mut(index);

        let previous_entry = mem::replace(entry, Entry::Occupied { value });

        let next_free = match previous_entry {
            Entry::Vacant { next_free } => next_free,
            Entry::Occupied { .. } => panic!(
                "slot {index} was not vacant when we inserted into it in block of {}",
                type_name::<T>()
            ),
        };

        self.count = self
            .count
            .checked_add(1)
            .expect("count cannot exceed capacity, which fits in usize");

        next_free
    }

    /// Drops the value at `index` and marks the slot vacant, storing `next_free`
    /// as its free list link. The pool pushes the slot onto its free list head.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds or the slot is already vacant.
    pub(crate) fn vacate(&mut self, index: usize, next_free: Option<SlotAddr>) {
        {
            let entry = self.entry_mut(index);

            if matches!(entry, Entry::Vacant { .. }) {
                panic!(
                    "vacate({index}) slot was already vacant in block of {}",
                    type_name::<T>()
                );
            }

            // Replacing the entry drops the stored value.
            *entry = Entry::Vacant { next_free };
        }

        self.count = self
            .count
            .checked_sub(1)
            .expect("we asserted above that the slot is occupied so count must be non-zero");
    }

    #[cfg(any(test, debug_assertions))]
    #[must_use]
    pub(crate) fn is_vacant(&self, index: usize) -> bool {
        matches!(self.entry(index), Entry::Vacant { .. })
    }

    /// The free list link carried by the vacant slot at `index`.
    ///
    /// # Panics
    ///
    /// Panics if the slot is occupied.
    #[cfg(any(test, debug_assertions))]
    #[must_use]
    pub(crate) fn free_link(&self, index: usize) -> Option<SlotAddr> {
        match self.entry(index) {
            Entry::Vacant { next_free } => *next_free,
            Entry::Occupied { .. } => panic!(
                "free_link({index}) slot was occupied in block of {}",
                type_name::<T>()
            ),
        }
    }
}

impl<T> Drop for Block<T> {
    fn drop(&mut self) {
        let was_empty = self.is_empty();

        // Set them all to `Vacant` to drop any occupied data.
        for index in 0..self.capacity.get() {
            let entry = self.entry_mut(index);

            *entry = Entry::Vacant {
                // Intentionally anomalous - we are dropping so do not expect any more usage.
                next_free: None,
            };
        }

        // SAFETY: The layout must match between alloc and dealloc. It does.
        unsafe {
            dealloc(
                self.first_entry_ptr.as_ptr().cast(),
                Self::layout(self.capacity),
            );
        }

        // We do this check at the end so we clean up the memory first. Mostly to make Miri happy.
        // As we are going to panic anyway if something is wrong, there is little good to expect
        // for the app itself.
        //
        // If we are already panicking, we do not want to panic again because that will
        // simply obscure whatever the original panic was, leading to debug difficulties.
        if self.drop_policy == DropPolicy::MustNotDropItems && !thread::panicking() {
            assert!(
                was_empty,
                "dropped a non-empty block of {} with a policy that says it must be empty when dropped",
                type_name::<T>()
            );
        }
    }
}

// SAFETY: Yes, there are raw pointers involved here but nothing inherently non-thread-mobile
// about it, so as long as T itself can move between threads, the block can do so, too.
unsafe impl<T: Send> Send for Block<T> {}
