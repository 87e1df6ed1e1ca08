//! Demonstration of reactive effects

use serde_json::json;
use tinproxy::{computed, effect, flush_jobs, reactive, ReactiveError, Value};

fn main() -> Result<(), ReactiveError> {
    println!("=== Effects Example ===\n");

    // Effects run immediately, then again after each flush that touched what they read
    println!("1. Creating a view and an effect");
    let state = reactive(json!({"count": 0, "first": "John", "last": "Doe"}))?;

    let count_effect = effect({
        let state = state.clone();
        move || {
            println!("   [Effect] Count is now: {}", state.get("count"));
        }
    });

    println!("\n2. Writes are batched until the next flush");
    state.set("count", 5);
    state.set("count", 10);
    flush_jobs();

    // Multiple dependencies
    println!("\n3. Effect with multiple dependencies");
    let _name_effect = effect({
        let state = state.clone();
        move || {
            println!("   [Effect] Full name: {} {}", state.get("first"), state.get("last"));
        }
    });

    println!("\n4. Changing first name");
    state.set("first", "Jane");
    flush_jobs();

    println!("\n5. Disposing the count effect");
    count_effect.dispose();
    state.set("count", 20);
    flush_jobs();
    println!("   (nothing printed)");

    // Conditional dependencies are re-collected on every run
    println!("\n6. Effect with conditional logic");
    let _conditional_effect = effect({
        let state = state.clone();
        move || {
            if state.get("count").as_f64().unwrap_or_default() > 10.0 {
                println!("   [Effect] HIGH, watching {}", state.get("first"));
            } else {
                println!("   [Effect] LOW, watching {}", state.get("last"));
            }
        }
    });
    state.set("count", 3);
    flush_jobs();
    state.set("first", "Ada");
    flush_jobs();
    println!("   (first is not read while LOW, nothing printed)");

    println!("\n7. Computed values");
    let doubled = computed({
        let state = state.clone();
        move || state.get("count").as_f64().unwrap_or_default() * 2.0
    });
    println!("   doubled = {}", doubled.value());
    state.set("count", Value::from(21));
    flush_jobs();
    println!("   doubled = {}", doubled.value());

    println!("\nExample complete!");
    Ok(())
}
