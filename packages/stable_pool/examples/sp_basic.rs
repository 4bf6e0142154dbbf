//! Basic usage of the `stable_pool` crate:
//!
//! * Creating a pool.
//! * Adding items.
//! * Retrieving items.
//! * Removing items.

use stable_pool::StablePool;

fn main() {
    let mut pool = StablePool::<String>::new();

    // Inserting an item gives you a key that you can later use to look up the item again.
    let alice_key = pool.insert("Alice".to_string());
    let bob_key = pool.insert("Bob".to_string());
    let charlie_key = pool.insert("Charlie".to_string());

    println!(
        "Object pool contains {} items, with an auto-adjusting capacity of {}",
        pool.len(),
        pool.capacity()
    );

    // Retrieving items from a pool is fast, similar to `Vec[key]`.
    let alice = pool.get(alice_key);
    println!("Retrieved item: {alice}");

    pool.remove(bob_key);
    pool.remove(charlie_key);

    // Removing other items never disturbs the keys you are still holding.
    // Retrieving an item borrows the pool for as long as you use the item,
    // so we re-lookup `alice` here because otherwise the above `remove()`
    // would be blocked.
    let alice = pool.get(alice_key);
    println!("Retrieved item after removal of other items: {alice}");

    // You can also modify the items in-place.
    let alice = pool.get_mut(alice_key);
    alice.push_str(" Smith");
    println!("Modified item: {alice}");
}
