//! Integration tests for common Palisade workflows.
//!
//! These tests drive whole pipelines through scripted invocations and check
//! the observable behavior of each policy and of their composition.

use palisade::prelude::*;
use palisade::resilience::BulkheadIsolation;
use palisade_config::{ConfigManager, FailureTypeRegistry, FileFormat};
use palisade_testing::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn isolated(signature: MethodSignature) -> palisade::FaultToleranceBuilder<u32> {
    FaultTolerance::builder(signature)
        .registry(Arc::new(FaultToleranceRegistry::new()))
        .fallback_registry(Arc::new(FallbackRegistry::new()))
}

// =============================================================================
// Circuit Breaker Tests
// =============================================================================

#[tokio::test]
async fn test_full_window_at_ratio_opens_and_rejects_without_proceeding() {
    let signature = MethodSignature::new("Orders", "place");
    let pipeline = isolated(signature.clone())
        .circuit_breaker(
            CircuitBreakerConfig::default()
                .request_volume_threshold(4)
                .failure_ratio(0.5)
                .delay(Duration::ZERO),
        )
        .build()
        .unwrap();

    let invocation = ScriptedInvocation::new(signature)
        .fail_times(2, &IO_FAILURE, "refused")
        .succeed(1)
        .succeed(2)
        .succeed(3)
        .into_arc();

    for _ in 0..4 {
        let _ = pipeline.invoke(invocation.clone()).await;
    }
    assert_eq!(invocation.calls(), 4);

    // The pre-check of the fifth call opens the circuit.
    let rejected = pipeline.invoke(invocation.clone()).await;
    assert_circuit_open(&rejected);
    assert_eq!(invocation.calls(), 4);

    // With a zero delay the next call is a half-open trial.
    assert_eq!(pipeline.invoke(invocation.clone()).await.unwrap(), 3);
    assert_circuit_state(pipeline.circuit_breaker().unwrap(), CircuitState::Closed);
}

#[tokio::test]
async fn test_window_below_ratio_rolls_over() {
    let signature = MethodSignature::new("Orders", "list");
    let pipeline = isolated(signature.clone())
        .circuit_breaker(
            CircuitBreakerConfig::default()
                .request_volume_threshold(4)
                .failure_ratio(0.5),
        )
        .build()
        .unwrap();

    // One failure in each window of four.
    let invocation = ScriptedInvocation::new(signature)
        .fail(&IO_FAILURE, "refused")
        .succeed(1)
        .succeed(1)
        .succeed(1)
        .fail(&IO_FAILURE, "refused")
        .succeed(1)
        .otherwise(Step::Succeed(1))
        .into_arc();

    for _ in 0..8 {
        let _ = pipeline.invoke(invocation.clone()).await;
    }
    assert_circuit_state(pipeline.circuit_breaker().unwrap(), CircuitState::Closed);
    assert_eq!(invocation.calls(), 8);
}

#[tokio::test(start_paused = true)]
async fn test_open_circuit_fails_fast_until_delay() {
    let signature = MethodSignature::new("Orders", "cancel");
    let pipeline = isolated(signature.clone())
        .circuit_breaker(
            CircuitBreakerConfig::default()
                .request_volume_threshold(2)
                .delay(Duration::from_secs(1))
                .success_threshold(2),
        )
        .build()
        .unwrap();

    let invocation = ScriptedInvocation::new(signature)
        .fail_times(2, &IO_FAILURE, "refused")
        .otherwise(Step::Succeed(5))
        .into_arc();

    for _ in 0..2 {
        let _ = pipeline.invoke(invocation.clone()).await;
    }
    let circuit = pipeline.circuit_breaker().unwrap();
    assert_circuit_state(circuit, CircuitState::Open);

    tokio::time::advance(Duration::from_millis(999)).await;
    assert_circuit_open(&pipeline.invoke(invocation.clone()).await);
    assert_eq!(invocation.calls(), 2);

    tokio::time::advance(Duration::from_millis(1)).await;
    assert_eq!(pipeline.invoke(invocation.clone()).await.unwrap(), 5);
    assert_circuit_state(circuit, CircuitState::HalfOpen);

    assert_eq!(pipeline.invoke(invocation.clone()).await.unwrap(), 5);
    assert_circuit_state(circuit, CircuitState::Closed);
    assert_eq!(circuit.stats().times_opened, 1);
}

// =============================================================================
// Retry Tests
// =============================================================================

#[tokio::test]
async fn test_retry_exhaustion_surfaces_original_failure() {
    let signature = MethodSignature::new("Ledger", "post");
    let pipeline = isolated(signature.clone())
        .retry(RetryConfig::new(3).jitter(Duration::ZERO))
        .build()
        .unwrap();

    let invocation = ScriptedInvocation::<u32>::new(signature)
        .otherwise(Step::Fail(&CONNECT_FAILURE, "connection reset".to_string()))
        .into_arc();

    let result = pipeline.invoke(invocation.clone()).await;
    assert_failure_type(&result, &CONNECT_FAILURE);
    assert_eq!(
        result.unwrap_err().to_string(),
        "ConnectFailure: connection reset"
    );
    assert_eq!(invocation.calls(), 4);
}

#[tokio::test]
async fn test_retry_abort_runs_once() {
    let signature = MethodSignature::new("Ledger", "post");
    let pipeline = isolated(signature.clone())
        .retry(RetryConfig::new(5).abort_on(&PARSE_FAILURE))
        .build()
        .unwrap();

    let invocation = ScriptedInvocation::new(signature)
        .fail(&PARSE_FAILURE, "bad payload")
        .succeed(1)
        .into_arc();

    assert_failure_type(&pipeline.invoke(invocation.clone()).await, &PARSE_FAILURE);
    assert_eq!(invocation.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_waits_between_attempts() {
    let signature = MethodSignature::new("Ledger", "sync");
    let pipeline = isolated(signature.clone())
        .retry(
            RetryConfig::new(2)
                .delay(Duration::from_millis(100))
                .jitter(Duration::ZERO),
        )
        .build()
        .unwrap();

    let invocation = ScriptedInvocation::new(signature)
        .fail_times(2, &IO_FAILURE, "busy")
        .succeed(9)
        .into_arc();

    assert_eq!(pipeline.invoke(invocation.clone()).await.unwrap(), 9);

    let calls = invocation.call_instants();
    assert_eq!(calls.len(), 3);
    assert!(calls[1] - calls[0] >= Duration::from_millis(100));
    assert!(calls[2] - calls[1] >= Duration::from_millis(100));
}

// =============================================================================
// Bulkhead Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_semaphore_bulkhead_rejects_over_capacity() {
    let probe = ConcurrencyProbe::new();
    let pipeline = Arc::new(
        isolated(MethodSignature::new("Search", "query"))
            .bulkhead(BulkheadConfig::new(2))
            .build()
            .unwrap(),
    );

    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let pipeline = pipeline.clone();
            let probe = probe.clone();
            tokio::spawn(async move {
                pipeline
                    .call(move || {
                        let probe = probe.clone();
                        async move {
                            probe.occupy(Duration::from_millis(100)).await;
                            Ok(1)
                        }
                    })
                    .await
            })
        })
        .collect();

    let mut rejected = 0;
    for task in tasks {
        let result = task.await.unwrap();
        if result.is_err() {
            assert_bulkhead_full(&result);
            rejected += 1;
        }
    }

    assert_eq!(rejected, 1);
    assert_eq!(probe.peak(), 2);
    assert_eq!(probe.entered(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_thread_pool_bulkhead_queues_then_rejects() {
    let signature = MethodSignature::new("Reports", "render").returning(ReturnType::Future);
    let pipeline = isolated(signature.clone())
        .asynchronous()
        .bulkhead(BulkheadConfig::new(1).waiting_task_queue(1))
        .build()
        .unwrap();
    assert_eq!(
        pipeline.bulkhead().unwrap().isolation(),
        BulkheadIsolation::ThreadPool
    );

    let invocation = ScriptedInvocation::new(signature)
        .otherwise(Step::Succeed(3))
        .latency(Duration::from_millis(100))
        .into_arc();

    let handles: Vec<_> = (0..3)
        .map(|_| pipeline.invoke_async(invocation.clone()).unwrap())
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await);
    }

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
    assert!(results.iter().any(|r| matches!(r, Err(e) if e.is_bulkhead_full())));
    assert_eq!(invocation.calls(), 2);
}

// =============================================================================
// Timeout Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_timeout_fires_at_deadline() {
    let signature = MethodSignature::new("Pricing", "quote");
    let pipeline = isolated(signature.clone())
        .timeout(TimeoutConfig::new(Duration::from_millis(100)))
        .build()
        .unwrap();

    let invocation = ScriptedInvocation::new(signature)
        .succeed(1)
        .latency(Duration::from_secs(5))
        .into_arc();

    let start = Instant::now();
    let result = pipeline.invoke(invocation).await;
    let elapsed = start.elapsed();

    assert_timed_out(&result);
    assert_failure_type(&result, &palisade::failure::TIMEOUT);
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_fast_call_is_unaffected_by_timeout() {
    let signature = MethodSignature::new("Pricing", "quote");
    let pipeline = isolated(signature.clone())
        .timeout(TimeoutConfig::new(Duration::from_secs(1)))
        .build()
        .unwrap();

    let invocation = ScriptedInvocation::new(signature)
        .fail(&PARSE_FAILURE, "bad quote")
        .latency(Duration::from_millis(10))
        .into_arc();

    assert_failure_type(&pipeline.invoke(invocation).await, &PARSE_FAILURE);
}

// =============================================================================
// Fallback Tests
// =============================================================================

#[tokio::test]
async fn test_fallback_honours_apply_and_skip_lists() {
    let signature = MethodSignature::new("Profiles", "load");
    let pipeline = isolated(signature.clone())
        .fallback(
            FallbackConfig::handler(handler_fn(|_| async { Ok(0) }))
                .apply_on(&IO_FAILURE)
                .skip_on(&CONNECT_FAILURE),
        )
        .build()
        .unwrap();

    let invocation = ScriptedInvocation::new(signature)
        .fail(&IO_FAILURE, "disk")
        .fail(&CONNECT_FAILURE, "refused")
        .fail(&PARSE_FAILURE, "garbled")
        .into_arc();

    assert_eq!(pipeline.invoke(invocation.clone()).await.unwrap(), 0);
    assert_failure_type(&pipeline.invoke(invocation.clone()).await, &CONNECT_FAILURE);
    assert_failure_type(&pipeline.invoke(invocation.clone()).await, &PARSE_FAILURE);
    assert_eq!(pipeline.fallback().unwrap().stats().applied, 1);
}

#[tokio::test]
async fn test_named_fallback_found_on_target_type() {
    let signature = MethodSignature::new("Profiles", "load").with_parameters(["u64"]);
    let fallbacks = Arc::new(FallbackRegistry::new());
    fallbacks.register(
        signature.renamed("loadCached").on_type("CachedProfiles"),
        |args: Vec<serde_json::Value>| async move {
            Ok(args.first().and_then(|v| v.as_u64()).unwrap_or(0) as u32 * 10)
        },
    );

    let pipeline: FaultTolerance<u32> = FaultTolerance::builder(signature.clone())
        .registry(Arc::new(FaultToleranceRegistry::new()))
        .fallback_registry(fallbacks)
        .target_type("CachedProfiles")
        .fallback(FallbackConfig::method("loadCached"))
        .build()
        .unwrap();

    let invocation = ScriptedInvocation::<u32>::new(signature)
        .with_parameters(vec![serde_json::json!(4)])
        .with_target_type("CachedProfiles")
        .fail(&IO_FAILURE, "disk")
        .into_arc();

    assert_eq!(pipeline.invoke(invocation).await.unwrap(), 40);
}

// =============================================================================
// Composition Tests
// =============================================================================

#[tokio::test]
async fn test_fallback_inside_circuit_breaker_keeps_it_closed() {
    let signature = MethodSignature::new("Shipping", "rate");
    let pipeline = isolated(signature.clone())
        .circuit_breaker(
            CircuitBreakerConfig::default()
                .request_volume_threshold(2)
                .delay(Duration::from_secs(60)),
        )
        .retry(RetryConfig::new(1).jitter(Duration::ZERO))
        .fallback(FallbackConfig::handler(handler_fn(|ctx: ExecutionContext| async move {
            Ok(if ctx.failure().is_failure() { 1 } else { 2 })
        })))
        .build()
        .unwrap();

    let invocation = ScriptedInvocation::<u32>::new(signature)
        .otherwise(Step::Fail(&IO_FAILURE, "down".to_string()))
        .into_arc();

    for _ in 0..3 {
        assert_eq!(pipeline.invoke(invocation.clone()).await.unwrap(), 1);
    }
    assert_eq!(invocation.calls(), 6);
    assert_circuit_state(pipeline.circuit_breaker().unwrap(), CircuitState::Closed);
}

#[tokio::test]
async fn test_circuit_rejection_is_not_fallen_back() {
    let signature = MethodSignature::new("Shipping", "track");
    let pipeline = isolated(signature.clone())
        .circuit_breaker(CircuitBreakerConfig::default().request_volume_threshold(1))
        .fallback(FallbackConfig::handler(handler_fn(|_| async { Ok(0) })))
        .build()
        .unwrap();

    pipeline.circuit_breaker().unwrap().force_open();
    let invocation = ScriptedInvocation::new(signature).succeed(1).into_arc();

    assert_circuit_open(&pipeline.invoke(invocation.clone()).await);
    assert_eq!(invocation.calls(), 0);
    assert_eq!(pipeline.fallback().unwrap().stats().calls, 0);
}

#[tokio::test]
async fn test_async_failure_arrives_through_handle() {
    let signature = MethodSignature::new("Mailer", "send").returning(ReturnType::Promise);
    let pipeline = isolated(signature.clone())
        .asynchronous()
        .retry(RetryConfig::new(1).jitter(Duration::ZERO))
        .build()
        .unwrap();

    let invocation = ScriptedInvocation::<u32>::new(signature)
        .otherwise(Step::Fail(&IO_FAILURE, "smtp down".to_string()))
        .into_arc();

    let handle = pipeline.invoke_async(invocation.clone()).unwrap();
    assert_failure_type(&handle.await, &IO_FAILURE);
    assert_eq!(invocation.calls(), 2);
}

#[tokio::test]
async fn test_panicking_call_is_a_failure() {
    let signature = MethodSignature::new("Mailer", "send").returning(ReturnType::Future);
    let pipeline = isolated(signature.clone()).asynchronous().build().unwrap();

    let invocation = ScriptedInvocation::<u32>::new(signature)
        .panic("template missing")
        .into_arc();

    let result = pipeline.invoke(invocation).await;
    assert_failure_type(&result, &palisade::failure::PANICKED);
}

// =============================================================================
// Configuration Tests
// =============================================================================

#[tokio::test]
async fn test_pipeline_from_configuration_file() {
    let mut manager = ConfigManager::new().with_failure_types(
        FailureTypeRegistry::new()
            .register(&IO_FAILURE)
            .register(&CONNECT_FAILURE)
            .register(&PARSE_FAILURE),
    );
    manager
        .load_str(
            r#"
            [methods."Inventory/reserve".retry]
            max_retries = 2
            jitter_ms = 0
            abort_on = ["ParseFailure"]

            [methods."Inventory/reserve".timeout]
            value_ms = 500
            "#,
            FileFormat::Toml,
        )
        .unwrap();

    let signature = MethodSignature::new("Inventory", "reserve");
    let pipeline = manager
        .builder::<u32>(signature.clone())
        .unwrap()
        .registry(Arc::new(FaultToleranceRegistry::new()))
        .build()
        .unwrap();
    assert_eq!(
        pipeline.timeout().unwrap().duration(),
        Duration::from_millis(500)
    );

    let invocation = ScriptedInvocation::new(signature)
        .fail(&CONNECT_FAILURE, "refused")
        .fail(&PARSE_FAILURE, "bad stock level")
        .succeed(1)
        .into_arc();

    assert_failure_type(&pipeline.invoke(invocation.clone()).await, &PARSE_FAILURE);
    assert_eq!(invocation.calls(), 2);
}

#[tokio::test]
async fn test_disabled_retry_setting_from_configuration() {
    let mut manager = ConfigManager::new();
    manager
        .load_str(
            r#"{
                "settings": {"retry_enabled": false},
                "methods": {"Inventory/release": {"retry": {"max_retries": 4}}}
            }"#,
            FileFormat::Json,
        )
        .unwrap();

    let signature = MethodSignature::new("Inventory", "release");
    let pipeline = manager
        .builder::<u32>(signature.clone())
        .unwrap()
        .registry(Arc::new(FaultToleranceRegistry::new()))
        .build()
        .unwrap();
    assert!(pipeline.retry().is_none());

    let invocation = ScriptedInvocation::<u32>::new(signature).into_arc();
    tokio_test::assert_err!(pipeline.invoke(invocation.clone()).await);
    assert_eq!(invocation.calls(), 1);
}
