//! Minimal registry example: register, touch, sweep.
//!
//! Registers three resources, keeps one alive, and evicts the rest with a
//! staleness predicate.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example basic_registry
//! ```

use reclaim_rs::registry::RegisterOptions;
use reclaim_rs::prelude::*;

fn main() {
    let registry = Registry::new();

    // 1. Register without counting registration as a touch.
    let untouched_on_register = RegisterOptions::with_touch(false);
    for name in ["a", "b", "c"] {
        let id = resource_id("image", name);
        let label = id.clone();
        registry.register_with(
            id,
            Some(Box::new(move || println!("cleanup: {label}"))),
            untouched_on_register,
        );
    }

    // 2. Only "image-b" is on screen.
    registry.touch("image-b");

    // 3. Evict whatever nobody touched.
    let evicted = registry.collect_where(untouched());
    println!("evicted {evicted}, still registered: {:?}", registry.ids());
}
