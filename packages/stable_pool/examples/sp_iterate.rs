//! Iterating a `stable_pool` pool after churn.
//!
//! Removed slots leave holes in the storage; iteration skips them and visits
//! exactly the live items, in storage order.

use stable_pool::StablePool;

fn main() {
    let mut pool = StablePool::<u64>::new();

    let keys: Vec<_> = (0..10).map(|i| pool.insert(i * i)).collect();

    // Remove every other item to punch holes into the storage.
    for key in keys.iter().step_by(2) {
        pool.remove(*key);
    }

    println!("{} items remain after removals", pool.len());

    for (key, value) in &pool {
        println!("{key:?} -> {value}");
    }

    // The holes are recycled before any new storage is allocated.
    let capacity_before = pool.capacity();

    for i in 0..5 {
        _ = pool.insert(i);
    }

    assert_eq!(pool.capacity(), capacity_before);
    println!(
        "Refilled to {} items without growing past {} slots",
        pool.len(),
        pool.capacity()
    );
}
