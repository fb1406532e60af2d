//! Integration tests for async wrapped calls.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use txscope_core::{
    AsyncTransactional, CallContext, ErrorCode, Failure, FailureClass, Propagation,
    RollbackRules, TransactionMode, TransactionOptions,
};
use txscope_testkit::prelude::*;

#[tokio::test]
async fn created_scope_commits_once() {
    let env = AsyncMemoryEnv::new();
    let save = env.wrap_with(Propagation::Required);
    let ctx = CallContext::new();

    let value = save
        .call(&ctx, |frame| async move {
            frame.scope().unwrap().put("k", "v")?;
            tokio::task::yield_now().await;
            Ok::<_, Failure>(7)
        })
        .await
        .unwrap();

    assert_eq!(value, 7);
    let journal = env.provider.journal();
    assert_eq!(journal.opens(), 1);
    assert_eq!(journal.commits(), 1);
    assert_eq!(journal.closes(), 1);
    assert_eq!(env.provider.get("k").as_deref(), Some("v"));
    assert_eq!(ctx.depth(), 0);
}

#[tokio::test]
async fn failing_body_rolls_back_once() {
    let env = AsyncMemoryEnv::new();
    let save = env.wrap_with(Propagation::Required);

    let err = save
        .call_root(|frame| async move {
            frame.scope().unwrap().put("k", "v")?;
            Err::<(), _>(app_failure("rejected"))
        })
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::TransactionFailed);
    let journal = env.provider.journal();
    assert_eq!(journal.rollbacks(), 1);
    assert_eq!(journal.closes(), 1);
    assert!(env.provider.committed().is_empty());
}

#[tokio::test]
async fn nested_calls_reuse_and_create() {
    let env = AsyncMemoryEnv::new();
    let outer = env.wrap_with(Propagation::Required);
    let join = env.wrap_with(Propagation::Mandatory);
    let fresh = env.wrap_with(Propagation::RequiresNew);

    outer
        .call_root(|frame| {
            let join = &join;
            let fresh = &fresh;
            async move {
                let outer_id = frame.scope().unwrap().id();

                let joined = join
                    .call(frame.context(), |nested| async move {
                        assert!(!nested.owns_scope());
                        Ok::<_, Failure>(nested.scope().unwrap().id())
                    })
                    .await?;
                assert_eq!(joined, outer_id);

                let created = fresh
                    .call(frame.context(), |nested| async move {
                        assert!(nested.owns_scope());
                        Ok::<_, Failure>(nested.scope().unwrap().id())
                    })
                    .await?;
                assert_ne!(created, outer_id);

                assert_eq!(frame.context().depth(), 1);
                Ok::<_, Failure>(())
            }
        })
        .await
        .unwrap();

    let journal = env.provider.journal();
    assert_eq!(journal.opens(), 2);
    assert_eq!(journal.commits(), 2);
    assert!(journal.verify_lifecycles().is_ok());
}

#[tokio::test]
async fn mandatory_without_scope_never_runs_body() {
    let env = AsyncMemoryEnv::new();
    let mandatory = env.wrap_with(Propagation::Mandatory);
    let runs = AtomicUsize::new(0);

    let err = mandatory
        .call_root(|_| {
            runs.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Failure>(()) }
        })
        .await
        .unwrap_err();

    assert!(err.is_propagation_violation());
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn never_inside_scope_is_rejected() {
    let env = AsyncMemoryEnv::new();
    let outer = env.wrap_with(Propagation::Required);
    let never = env.wrap_with(Propagation::Never);

    let err = outer
        .call_root(|frame| {
            let never = &never;
            async move {
                never
                    .call(frame.context(), |_| async { Ok::<_, Failure>(()) })
                    .await?;
                Ok::<_, Failure>(())
            }
        })
        .await
        .unwrap_err();

    assert_eq!(err.failure_class(), Some(FailureClass::Transaction));
    assert_eq!(env.provider.journal().rollbacks(), 1);
}

#[tokio::test]
async fn retry_succeeds_after_two_provider_failures() {
    let env = AsyncMemoryEnv::new();
    env.provider.fail_next_commits(2);
    let save = env.wrap(retrying(Propagation::Required, 2, Duration::from_millis(10)));

    save.call_root(|frame| async move {
        frame
            .scope()
            .unwrap()
            .put("attempt", frame.attempt().to_string())
    })
    .await
    .unwrap();

    let journal = env.provider.journal();
    assert_eq!(journal.opens(), 3);
    assert_eq!(journal.injected() + journal.commits(), 3);
    assert_eq!(env.provider.get("attempt").as_deref(), Some("3"));
    assert_eq!(save.stats().attempts(), 3);
}

#[tokio::test]
async fn timeout_cancels_body_and_cleans_up() {
    let env = AsyncMemoryEnv::new();
    let slow = env.wrap(with_timeout(Propagation::Required, Duration::from_millis(50)));
    let ctx = CallContext::new();

    let start = Instant::now();
    let err = slow
        .call(&ctx, |frame| async move {
            frame.scope().unwrap().put("k", "v")?;
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, Failure>(())
        })
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert!(err.is_timeout(), "{err}");
    assert!(elapsed < Duration::from_millis(150), "took {elapsed:?}");
    assert_eq!(ctx.depth(), 0);
    let journal = env.provider.journal();
    assert_eq!(journal.commits(), 0);
    assert_eq!(journal.rollbacks(), 1);
    assert_eq!(journal.closes(), 1);
    assert!(env.provider.committed().is_empty());
}

#[tokio::test]
async fn timed_out_attempt_is_retried_when_covered() {
    let env = AsyncMemoryEnv::new();
    let options = TransactionOptions::builder()
        .timeout(Duration::from_millis(50))
        .retry_count(2)
        .rollback_for(RollbackRules::only([FailureClass::Timeout]))
        .build()
        .unwrap();
    let save = env.wrap(options);

    let start = Instant::now();
    let value = save
        .call_root(|frame| async move {
            frame.scope().unwrap().put("k", frame.attempt().to_string())?;
            if frame.attempt() == 1 {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Ok::<_, Failure>(frame.attempt())
        })
        .await
        .unwrap();

    assert_eq!(value, 2);
    assert!(start.elapsed() < Duration::from_millis(500));
    let journal = env.provider.journal();
    assert_eq!(journal.opens(), 2);
    assert_eq!(journal.rollbacks(), 1);
    assert_eq!(journal.commits(), 1);
    assert_eq!(env.provider.get("k").as_deref(), Some("2"));
    assert_eq!(save.stats().attempts(), 2);
}

#[tokio::test]
async fn timeout_during_open_leaves_nothing_behind() {
    let provider = AsyncMemoryProvider::new().with_latency(Duration::from_millis(200));
    let env = AsyncMemoryEnv::with_provider(provider);
    let slow = env.wrap(with_timeout(Propagation::Required, Duration::from_millis(30)));
    let runs = AtomicUsize::new(0);

    let err = slow
        .call_root(|_| {
            runs.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Failure>(()) }
        })
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(!err.context().unwrap().scope_open);
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(env.provider.journal().opens(), 0);
}

#[tokio::test]
async fn dropped_call_future_closes_scope() {
    let env = AsyncMemoryEnv::new();
    let save = env.wrap_with(Propagation::Required);
    let ctx = CallContext::new();

    let outcome = tokio::time::timeout(
        Duration::from_millis(20),
        save.call(&ctx, |frame| async move {
            frame.scope().unwrap().put("abandoned", "write")?;
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, Failure>(())
        }),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(ctx.depth(), 0);
    let journal = env.provider.journal();
    assert_eq!(journal.opens(), 1);
    assert_eq!(journal.commits(), 0);
    assert_eq!(journal.closes(), 1);
    // Closing without a commit discards the pending write.
    assert_eq!(env.provider.get("abandoned"), None);
    assert!(env.provider.committed().is_empty());
}

#[tokio::test]
async fn sync_options_are_rejected_by_async_wrapper() {
    let env = AsyncMemoryEnv::new();
    let options = TransactionOptions::builder()
        .mode(TransactionMode::Sync)
        .build()
        .unwrap();
    let err = AsyncTransactional::new(Arc::clone(&env.registry), options).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Configuration);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tasks_never_see_each_other() {
    let env = AsyncMemoryEnv::new();
    let result = stress_async_chains(
        &env,
        &StressConfig {
            chains: 16,
            depth: 6,
            iterations: 20,
        },
    )
    .await;
    assert!(result.is_clean(), "{result:?}");
    assert_eq!(result.successful, 320);
    assert!(env.provider.journal().verify_lifecycles().is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn spawned_subtask_shares_the_chain() {
    let env = Arc::new(AsyncMemoryEnv::new());
    let outer = env.wrap_with(Propagation::Required);
    let join = Arc::new(env.wrap_with(Propagation::Mandatory));

    outer
        .call_root(|frame| {
            let join = Arc::clone(&join);
            async move {
                let outer_id = frame.scope().unwrap().id();
                let ctx = frame.context().clone();
                let joined = tokio::spawn(async move {
                    join.call(&ctx, |nested| async move {
                        Ok::<_, Failure>(nested.scope().unwrap().id())
                    })
                    .await
                })
                .await
                .unwrap()?;
                assert_eq!(joined, outer_id);
                Ok::<_, Failure>(())
            }
        })
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn spawned_siblings_join_only_their_enclosing_scope() {
    let env = AsyncMemoryEnv::new();
    let outer = env.wrap_with(Propagation::Required);
    let audit = Arc::new(env.wrap_with(Propagation::RequiresNew));
    let join = Arc::new(env.wrap_with(Propagation::Required));
    let barrier = Arc::new(tokio::sync::Barrier::new(2));

    outer
        .call_root(|frame| {
            let (audit, join, barrier) =
                (Arc::clone(&audit), Arc::clone(&join), Arc::clone(&barrier));
            async move {
                let outer_id = frame.scope().unwrap().id();

                let audited = tokio::spawn({
                    let ctx = frame.context().clone();
                    let barrier = Arc::clone(&barrier);
                    async move {
                        audit
                            .call(&ctx, |nested| {
                                let barrier = Arc::clone(&barrier);
                                async move {
                                    // Hold the new scope open while the sibling runs.
                                    barrier.wait().await;
                                    barrier.wait().await;
                                    nested.scope().unwrap().put("audit", "written")
                                }
                            })
                            .await
                    }
                });
                let joined = tokio::spawn({
                    let ctx = frame.context().clone();
                    async move {
                        barrier.wait().await;
                        let seen = join
                            .call(&ctx, |nested| async move {
                                assert!(!nested.owns_scope());
                                Ok::<_, Failure>(nested.scope().unwrap().id())
                            })
                            .await;
                        barrier.wait().await;
                        seen
                    }
                });

                audited.await.unwrap()?;
                assert_eq!(joined.await.unwrap()?, outer_id);
                Ok::<_, Failure>(())
            }
        })
        .await
        .unwrap();

    let journal = env.provider.journal();
    assert_eq!(journal.opens(), 2);
    assert_eq!(journal.commits(), 2);
}
