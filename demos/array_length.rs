//! Watch the length of a reactive sequence while pushing to it.

use serde_json::json;
use tinproxy::{flush_jobs, reactive, watch, OnInvalidate, ReactiveError, WatchOptions};

fn main() -> Result<(), ReactiveError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let list = reactive(json!([]))?;

    watch(
        {
            let list = list.clone();
            move || list.len()
        },
        |len: &usize, old: Option<&usize>, _: &OnInvalidate| {
            println!("length changed: {old:?} -> {len}");
        },
        WatchOptions::default(),
    );

    list.push(1);
    list.push(2);
    println!("pushed twice, nothing printed yet");

    let report = flush_jobs();
    println!("flushed {} job(s): {}", report.ran, list.snapshot());
    Ok(())
}
