//! Integration tests for per-task isolation and slice lifecycle.
//!
//! Covers both regimes: preemptive threads and cooperative tokio tasks that
//! interleave on a single thread.

use crate::integration::FakeTenant;
use ambient::Context;
use std::sync::{Arc, Barrier};
use std::thread;

/// Two threads writing the same key each read back their own value
#[test]
fn test_thread_isolation() {
    let ctx = Context::new();
    let barrier = Barrier::new(2);

    thread::scope(|s| {
        for value in [1u32, 2u32] {
            let ctx = &ctx;
            let barrier = &barrier;
            s.spawn(move || {
                ctx.set("x", value);
                barrier.wait();
                assert_eq!(*ctx.get::<u32>("x").unwrap(), value);
                barrier.wait();
                assert_eq!(*ctx.get::<u32>("x").unwrap(), value);
            });
        }
    });

    // Nothing leaked into the spawning thread.
    assert!(ctx.get::<u32>("x").is_none());
}

#[test]
fn test_disjoint_keys_stay_private() {
    let ctx = Context::new();
    let barrier = Barrier::new(2);

    thread::scope(|s| {
        let a = s.spawn(|| {
            ctx.set("only_a", "a".to_string());
            barrier.wait();
            barrier.wait();
            ctx.keys()
        });
        let b = s.spawn(|| {
            ctx.set("only_b", "b".to_string());
            barrier.wait();
            barrier.wait();
            ctx.keys()
        });
        assert_eq!(a.join().unwrap(), vec!["only_a".to_string()]);
        assert_eq!(b.join().unwrap(), vec!["only_b".to_string()]);
    });
}

#[test]
fn test_tenant_stacks_are_per_thread() {
    let ctx = Context::new();
    let _main = ctx.with_tenant_context(FakeTenant::shared("main"));

    let seen = thread::scope(|s| {
        s.spawn(|| {
            let before = ctx.get_current_tenant::<FakeTenant>().map(|t| t.mark);
            let _scope = ctx.with_tenant_context(FakeTenant::shared("worker"));
            let inside = ctx.get_current_tenant::<FakeTenant>().map(|t| t.mark);
            (before, inside)
        })
        .join()
        .unwrap()
    });

    assert_eq!(seen, (None, Some("worker")));
    assert_eq!(ctx.get_current_tenant::<FakeTenant>().unwrap().mark, "main");
    assert_eq!(ctx.tenant_depth(), 1);
}

#[test]
fn test_thread_exit_releases_slice() {
    let ctx = Context::new();
    let worker = ctx.clone();
    thread::spawn(move || {
        worker.set("x", 1u8);
        assert_eq!(worker.active_slices(), 1);
    })
    .join()
    .unwrap();

    assert_eq!(ctx.active_slices(), 0);
}

#[test]
fn test_reads_do_not_create_slices() {
    let ctx = Context::new();
    assert!(ctx.get::<u8>("x").is_none());
    assert!(ctx.get_current_tenant::<FakeTenant>().is_none());
    assert!(!ctx.delete("x"));
    assert_eq!(ctx.active_slices(), 0);
}

/// Cooperative tasks on one thread interleaving at await points
#[tokio::test(flavor = "current_thread")]
async fn test_cooperative_task_isolation() {
    let ctx = Context::new();
    let mut handles = Vec::new();

    for i in 0..8u32 {
        let task_ctx = ctx.clone();
        handles.push(ctx.spawn(async move {
            task_ctx.set("x", i);
            let _scope = task_ctx.with_tenant_context(Arc::new(i));
            for _ in 0..4 {
                tokio::task::yield_now().await;
                assert_eq!(*task_ctx.get::<u32>("x").unwrap(), i);
                assert_eq!(*task_ctx.get_current_tenant::<u32>().unwrap(), i);
                assert_eq!(task_ctx.tenant_depth(), 1);
            }
            (thread::current().id(), task_ctx.keys())
        }));
    }

    let results = futures::future::join_all(handles).await;
    let main_thread = thread::current().id();
    for result in results {
        let (thread_id, keys) = result.unwrap();
        assert_eq!(thread_id, main_thread);
        assert_eq!(keys, vec!["x".to_string()]);
    }
    assert_eq!(ctx.active_slices(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_multi_thread_task_isolation() {
    let ctx = Context::new();
    let mut handles = Vec::new();

    for i in 0..32u64 {
        let task_ctx = ctx.clone();
        handles.push(ctx.spawn(async move {
            task_ctx.set("request_id", i);
            for _ in 0..8 {
                tokio::task::yield_now().await;
                if *task_ctx.get::<u64>("request_id").unwrap() != i {
                    return false;
                }
            }
            true
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap());
    }
    assert_eq!(ctx.active_slices(), 0);
}

/// Spawned tasks start empty rather than inheriting the spawner's state
#[tokio::test]
async fn test_spawned_task_starts_empty() {
    let ctx = Context::new();
    ctx.set("parent", 1u8);
    let _scope = ctx.with_tenant_context(FakeTenant::shared("parent"));

    let task_ctx = ctx.clone();
    let (parent, tenant) = ctx
        .spawn(async move {
            (
                task_ctx.get::<u8>("parent").is_some(),
                task_ctx.get_current_tenant::<FakeTenant>().is_some(),
            )
        })
        .await
        .unwrap();

    assert!(!parent);
    assert!(!tenant);
    assert!(ctx.get::<u8>("parent").is_some());
}

/// Aborting a task mid-scope releases its slice
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abort_releases_task_slice() {
    let ctx = Context::new();
    let (entered_tx, entered_rx) = tokio::sync::oneshot::channel();

    let task_ctx = ctx.clone();
    let handle = ctx.spawn(async move {
        task_ctx.set("x", 1u8);
        let _scope = task_ctx.with_tenant_context(FakeTenant::shared("cancelled"));
        let _ = entered_tx.send(());
        std::future::pending::<()>().await;
    });

    entered_rx.await.unwrap();
    assert_eq!(ctx.active_slices(), 1);

    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());
    assert_eq!(ctx.active_slices(), 0);
}

/// Tasks spawned without the wrapper keep their slice until released
#[tokio::test]
async fn test_unscoped_task_can_release_explicitly() {
    let ctx = Context::new();
    let task_ctx = ctx.clone();
    let released = tokio::spawn(async move {
        task_ctx.set("x", 1u8);
        task_ctx.release().unwrap()
    })
    .await
    .unwrap();

    assert!(released);
    assert_eq!(ctx.active_slices(), 0);
}

/// A nested wrapper finishing inside a task leaves the task's state intact
#[tokio::test]
async fn test_nested_scoped_keeps_outer_state() {
    let ctx = Context::new();
    let task_ctx = ctx.clone();

    let (tenant, request_id) = ctx
        .spawn(async move {
            task_ctx.set("request_id", 7u64);
            let _scope = task_ctx.with_tenant_context(FakeTenant::shared("acme"));

            task_ctx.scoped(async {}).await;
            let inner_ctx = task_ctx.clone();
            task_ctx
                .scoped(async move { inner_ctx.set("inner", true) })
                .await;

            (
                task_ctx.get_current_tenant::<FakeTenant>().map(|t| t.mark),
                task_ctx.get_cloned::<u64>("request_id"),
            )
        })
        .await
        .unwrap();

    assert_eq!(tenant, Some("acme"));
    assert_eq!(request_id, Some(7));
    assert_eq!(ctx.active_slices(), 0);
}

/// A task that leaks a scope guard keeps its slice instead of losing open frames
#[tokio::test]
async fn test_leaked_scope_keeps_slice() {
    let ctx = Context::new();
    let task_ctx = ctx.clone();

    ctx.spawn(async move {
        std::mem::forget(task_ctx.with_tenant_context(FakeTenant::shared("leaked")));
    })
    .await
    .unwrap();

    assert_eq!(ctx.active_slices(), 1);
}
