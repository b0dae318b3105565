//! The render loop re-rendering after tracked writes.

mod common;

use anyhow::Result;
use core::time::Duration;
use serde_json::json;
use tokio::task::LocalSet;
use tokio::time::sleep;
use trellis_reference::{Object as _, TrackedObject, Value};
use trellis_runtime::{RenderLoop, RuntimeConfig};

use common::{Harness, template};

/// Test that writes inside one debounce window share a single pass.
///
/// # Panics
/// Panics if the page is stale or more than one pass ran.
#[tokio::test(flavor = "current_thread")]
async fn writes_are_coalesced() -> Result<()> {
    LocalSet::new()
        .run_until(async {
            let harness = Harness::default();
            let state = TrackedObject::with_fields([("count", Value::from(0))]);
            let template = template(
                "counter",
                &json!([]),
                &json!([[9, "output", true], [10], [1, 0, 0, 0, [27, [24, 0], ["count"]]], [11]]),
                &json!([]),
            )?;
            let render_loop = RenderLoop::install(Duration::from_millis(5));
            render_loop.add(harness.render(&template, &state)?);
            let task = render_loop.spawn();

            for count in 1..=3 {
                assert!(state.set("count", Value::from(count)));
            }
            assert!(render_loop.is_dirty());
            sleep(Duration::from_millis(50)).await;

            assert_eq!(harness.html(), "<output>3</output>");
            assert_eq!(render_loop.passes(), 1);
            assert!(!render_loop.is_dirty());

            render_loop.stop();
            task.await??;
            Ok::<_, anyhow::Error>(())
        })
        .await
}

/// Test flushing by hand, without the task.
///
/// # Panics
/// Panics if a clean loop re-renders or a dirty one does not.
#[test]
fn flush_only_runs_when_dirty() -> Result<()> {
    let state = TrackedObject::with_fields([("word", Value::from("a"))]);
    let template = template("word", &json!([]), &json!([[1, 0, 0, 0, [27, [24, 0], ["word"]]]]), &json!([]))?;
    let harness = Harness::with_config(RuntimeConfig {
        debounce: Duration::ZERO,
        ..RuntimeConfig::default()
    });
    let render_loop = RenderLoop::for_runtime(&harness.runtime);
    render_loop.add(harness.render(&template, &state)?);

    assert!(!render_loop.flush()?);
    assert!(state.set("word", Value::from("b")));
    assert!(render_loop.flush()?);
    assert_eq!(harness.html(), "b");
    assert_eq!(render_loop.passes(), 1);

    let results = render_loop.take_results();
    assert_eq!(results.len(), 1);
    Ok(())
}

/// Test that dropping a loop hands writes back to the loop it replaced,
/// and never takes them from a loop installed after it.
///
/// # Panics
/// Panics if a write schedules the wrong loop.
#[test]
fn dropped_loops_hand_back_their_hook() -> Result<()> {
    common::init();
    let state = TrackedObject::with_fields([("count", Value::from(0))]);
    let outer = RenderLoop::install(Duration::ZERO);
    let inner = RenderLoop::install(Duration::ZERO);
    assert!(state.set("count", Value::from(1)));
    assert!(inner.is_dirty());
    assert!(!outer.is_dirty());

    drop(inner);
    assert!(state.set("count", Value::from(2)));
    assert!(outer.is_dirty());
    assert!(outer.flush()?);

    let newer = RenderLoop::install(Duration::ZERO);
    drop(outer);
    assert!(state.set("count", Value::from(3)));
    assert!(newer.is_dirty());
    Ok(())
}
