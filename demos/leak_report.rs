//! Shows what a forgotten operation looks like.
//!
//! Run with `RUST_LOG=tracked_async=debug cargo run --example leak_report`
//! to see operations start and settle, and with `TRACKED_ASYNC_BACKTRACE=1`
//! to get a cleaned stack for each pending entry.

use std::time::Duration;

use tracked_async::{render_arg, Instrumented, Registry, StepGuard, TrackedOperation, TrackerConfig};
use tracing_subscriber::EnvFilter;

struct Kitchen;

impl Kitchen {
    async fn fry(&self, flavor: &'static str) -> String {
        tokio::time::sleep(Duration::from_millis(20)).await;
        format!("{flavor} donut")
    }
}

fn fry(kitchen: &Instrumented<Kitchen>, flavor: &'static str) -> TrackedOperation<String> {
    let target = kitchen.target_arc();
    let args = vec![render_arg(flavor, kitchen.registry().config().max_arg_len)];
    kitchen.track("fry", args, async move { target.fry(flavor).await })
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let registry = Registry::with_config(
        TrackerConfig::from_env().default_timeout(Duration::from_millis(5)),
    );
    let kitchen = registry.wrap(Kitchen);
    let guard = StepGuard::new(&registry);

    // A step that starts work and returns without waiting for it.
    let order = guard.guard(|kitchen: Instrumented<Kitchen>| async move {
        tokio::spawn(fry(&kitchen, "Glazed").map(|donut| println!("served {donut}")));
    });

    if let Err(err) = order(kitchen.clone()).await {
        println!("step failed: {err}\n");
    }

    // Too short a wait shows the same work as a timeout.
    if let Err(err) = registry.wait_for_quiescence().await {
        println!("{err}\n");
    }

    match registry.wait_for_quiescence_for(Duration::from_secs(1)).await {
        Ok(()) => println!("kitchen is quiet"),
        Err(err) => println!("still busy: {err}"),
    }
}
