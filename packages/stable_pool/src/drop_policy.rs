/// Determines pool behavior when the pool is dropped.
///
/// By default, the pool will drop its items when it is dropped.
///
/// # Examples
///
/// ```
/// use stable_pool::{DropPolicy, StablePool};
///
/// // The drop policy is set at pool creation time.
/// let pool = StablePool::<u32>::builder()
///     .drop_policy(DropPolicy::MustNotDropItems)
///     .build();
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// The pool will drop its items when the pool is dropped. This is the default.
    #[default]
    MayDropItems,

    /// The pool will panic if it still contains items when it is dropped.
    ///
    /// This may be valuable if there are external requirements before the items can be dropped.
    /// For example, it may be known that some other data structure still holds keys to items
    /// in the pool, with items only removed after those keys have been discarded.
    MustNotDropItems,
}
