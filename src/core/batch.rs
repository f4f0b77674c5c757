//! Batch accumulation, dispatch and response demultiplexing
//!
//! Requests sharing a language pair accumulate in a per-key `PendingBatch`.
//! Reaching the size threshold atomically snapshots the slots and dispatches
//! them as one upstream call; a linger timer flushes sub-threshold batches
//! that would otherwise wait forever. Each slot's result travels back over a
//! oneshot channel, so fulfillment is exactly once and waits are bounded.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::core::config::TranslatorConfig;
use crate::core::errors::{Result, TranslateError};
use crate::core::models::{BatchKey, TranslationRequest};
use crate::core::parser;
use crate::core::prompt;
use crate::core::retry::RetryingCaller;

/// One caller's pending request inside a batch.
struct BatchSlot {
    text: String,
    tx: oneshot::Sender<Result<Option<String>>>,
}

/// Accumulating slots for one language pair.
///
/// Cleared, not removed, on every flush; the key's entry lives for the
/// coordinator's lifetime.
#[derive(Default)]
struct PendingBatch {
    slots: Vec<BatchSlot>,
    /// Bumped on every flush so a stale linger timer finds nothing to do.
    epoch: u64,
}

/// Coalesces same-language-pair requests into shared upstream calls and fans
/// the shared response back out to each waiter.
///
/// Each coordinator owns its own batch registry; nothing is process-global.
#[derive(Clone)]
pub struct BatchCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<TranslatorConfig>,
    caller: RetryingCaller,
    batches: Mutex<HashMap<BatchKey, Arc<Mutex<PendingBatch>>>>,
}

impl BatchCoordinator {
    /// Create a coordinator sharing the given retrying caller.
    pub fn new(config: Arc<TranslatorConfig>, caller: RetryingCaller) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                caller,
                batches: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Enqueue a request and wait for its slot's result.
    ///
    /// Blocks up to the configured batch wait timeout, then fails with
    /// `BatchWaitTimeout` without disturbing sibling slots or the in-flight
    /// upstream call.
    pub async fn submit(&self, request: &TranslationRequest) -> Result<Option<String>> {
        let key = request.batch_key();
        let batch = self.inner.batch_for(&key).await;

        let (rx, snapshot) = {
            let mut pending = batch.lock().await;
            let (tx, rx) = oneshot::channel();
            pending.slots.push(BatchSlot {
                text: request.text.clone(),
                tx,
            });
            debug!(key = %key, size = pending.slots.len(), "enqueued batch slot");

            if pending.slots.len() >= self.inner.config.batch_threshold {
                pending.epoch += 1;
                (rx, Some(std::mem::take(&mut pending.slots)))
            } else {
                if pending.slots.len() == 1 && self.inner.config.batch_linger_ms > 0 {
                    self.spawn_linger(key.clone(), Arc::clone(&batch), pending.epoch);
                }
                (rx, None)
            }
        };

        if let Some(slots) = snapshot {
            let inner = Arc::clone(&self.inner);
            let dispatch_key = key.clone();
            tokio::spawn(async move { inner.dispatch(dispatch_key, slots).await });
        }

        match timeout(self.inner.config.batch_wait_timeout(), rx).await {
            Err(_) => Err(TranslateError::BatchWaitTimeout),
            Ok(Err(_)) => Err(TranslateError::Internal {
                message: "batch slot dropped without a result".to_string(),
            }),
            Ok(Ok(result)) => result,
        }
    }

    /// Slots currently accumulated for a key.
    pub async fn pending(&self, key: &BatchKey) -> usize {
        let batch = self.inner.batch_for(key).await;
        let pending = batch.lock().await;
        pending.slots.len()
    }

    /// Arm a timer that flushes this batch generation if it is still
    /// sub-threshold when the linger elapses.
    fn spawn_linger(&self, key: BatchKey, batch: Arc<Mutex<PendingBatch>>, epoch: u64) {
        let inner = Arc::clone(&self.inner);
        let linger = Duration::from_millis(inner.config.batch_linger_ms);

        tokio::spawn(async move {
            sleep(linger).await;

            let snapshot = {
                let mut pending = batch.lock().await;
                if pending.epoch != epoch || pending.slots.is_empty() {
                    return;
                }
                pending.epoch += 1;
                std::mem::take(&mut pending.slots)
            };

            debug!(key = %key, size = snapshot.len(), "linger flush of sub-threshold batch");
            inner.dispatch(key, snapshot).await;
        });
    }
}

impl Inner {
    async fn batch_for(&self, key: &BatchKey) -> Arc<Mutex<PendingBatch>> {
        let mut batches = self.batches.lock().await;
        Arc::clone(batches.entry(key.clone()).or_default())
    }

    /// Translate a snapshot of slots with one upstream call and demultiplex
    /// the response by position.
    async fn dispatch(&self, key: BatchKey, slots: Vec<BatchSlot>) {
        let texts: Vec<String> = slots.iter().map(|slot| slot.text.clone()).collect();
        info!(key = %key, size = texts.len(), "dispatching batch");

        let rendered = prompt::build_batch_prompt(
            &self.config.batch_prompt,
            &key.source,
            &key.target,
            &texts,
        );
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "user", "content": rendered }
            ],
        });

        match self.caller.call(&body).await {
            Ok(payload) => {
                // Parse degradation stays inside the batch: undecodable
                // content becomes a null result per slot, never an error.
                let results = match parser::completion_text(&payload) {
                    Ok(content) => {
                        parser::assign_results(parser::parse_batch(&content), slots.len())
                    }
                    Err(err) => {
                        warn!(key = %key, error = %err, "batch completion unusable, degrading");
                        vec![None; slots.len()]
                    }
                };

                for (slot, result) in slots.into_iter().zip(results) {
                    // A waiter that already timed out has dropped its receiver
                    let _ = slot.tx.send(Ok(result));
                }
            }
            Err(err) => {
                warn!(key = %key, error = %err, "batch dispatch failed");
                for slot in slots {
                    let _ = slot.tx.send(Err(err.clone()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rate_limiter::RateLimiter;
    use crate::core::transport::testing::{completion, ScriptedTransport};
    use crate::core::transport::Transport;
    use async_trait::async_trait;

    fn coordinator(
        transport: Arc<dyn Transport>,
        threshold: usize,
        linger_ms: u64,
    ) -> BatchCoordinator {
        let config = Arc::new(TranslatorConfig {
            api_key: "test_key".to_string(),
            batch_threshold: threshold,
            batch_linger_ms: linger_ms,
            ..Default::default()
        });
        let caller = RetryingCaller::new(
            transport,
            RateLimiter::new(10),
            3,
            Duration::from_millis(10),
        );
        BatchCoordinator::new(config, caller)
    }

    fn batched(text: &str) -> TranslationRequest {
        TranslationRequest::new(text, "en", "es").batched()
    }

    async fn wait_for_pending(coordinator: &BatchCoordinator, key: &BatchKey, expected: usize) {
        while coordinator.pending(key).await < expected {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn threshold_dispatch_maps_results_positionally() {
        let transport = ScriptedTransport::new(vec![Ok(completion(
            r#"{"translations": ["uno", "dos"]}"#,
        ))]);
        let coordinator = coordinator(transport.clone(), 2, 0);
        let key = batched("one").batch_key();

        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.submit(&batched("one")).await })
        };
        wait_for_pending(&coordinator, &key, 1).await;

        let second = coordinator.submit(&batched("two")).await.unwrap();
        let first = first.await.unwrap().unwrap();

        assert_eq!(first, Some("uno".to_string()));
        assert_eq!(second, Some("dos".to_string()));
        assert_eq!(transport.calls(), 1);

        // The dispatched prompt carries the texts in enqueue order
        let body = &transport.bodies()[0];
        let content = body["messages"][0]["content"].as_str().unwrap();
        assert!(content.contains(r#"["one","two"]"#));
    }

    #[tokio::test]
    async fn undercount_leaves_trailing_slots_null() {
        let transport =
            ScriptedTransport::new(vec![Ok(completion(r#"{"translations": ["uno", "dos"]}"#))]);
        let coordinator = coordinator(transport.clone(), 3, 0);
        let key = batched("one").batch_key();

        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.submit(&batched("one")).await })
        };
        wait_for_pending(&coordinator, &key, 1).await;

        let second = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.submit(&batched("two")).await })
        };
        wait_for_pending(&coordinator, &key, 2).await;

        let third = coordinator.submit(&batched("three")).await.unwrap();
        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        assert_eq!(first, Some("uno".to_string()));
        assert_eq!(second, Some("dos".to_string()));
        assert_eq!(third, None);
    }

    #[tokio::test]
    async fn unparsable_response_degrades_every_slot_to_null() {
        let transport = ScriptedTransport::new(vec![Ok(completion("certainly, here you go"))]);
        let coordinator = coordinator(transport.clone(), 2, 0);
        let key = batched("one").batch_key();

        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.submit(&batched("one")).await })
        };
        wait_for_pending(&coordinator, &key, 1).await;

        let second = coordinator.submit(&batched("two")).await.unwrap();
        let first = first.await.unwrap().unwrap();

        assert_eq!(first, None);
        assert_eq!(second, None);
    }

    #[tokio::test]
    async fn empty_completion_degrades_instead_of_failing() {
        let transport = ScriptedTransport::new(vec![Ok(serde_json::json!({ "choices": [] }))]);
        let coordinator = coordinator(transport.clone(), 1, 0);

        let result = coordinator.submit(&batched("one")).await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn call_failure_fans_out_to_every_slot() {
        let transport = ScriptedTransport::new(vec![Err(TranslateError::PermanentRequest {
            status: 400,
            message: "bad request".into(),
        })]);
        let coordinator = coordinator(transport.clone(), 2, 0);
        let key = batched("one").batch_key();

        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.submit(&batched("one")).await })
        };
        wait_for_pending(&coordinator, &key, 1).await;

        let second = coordinator.submit(&batched("two")).await;
        let first = first.await.unwrap();

        assert!(matches!(
            first,
            Err(TranslateError::PermanentRequest { status: 400, .. })
        ));
        assert!(matches!(
            second,
            Err(TranslateError::PermanentRequest { status: 400, .. })
        ));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_threshold_race_dispatches_exactly_once() {
        let transport =
            ScriptedTransport::new(vec![Ok(completion(r#"{"translations": ["uno", "dos"]}"#))]);
        let coordinator = coordinator(transport.clone(), 2, 0);

        let (a, b) = tokio::join!(
            {
                let coordinator = coordinator.clone();
                async move { coordinator.submit(&batched("one")).await }
            },
            {
                let coordinator = coordinator.clone();
                async move { coordinator.submit(&batched("two")).await }
            }
        );

        let mut got = vec![a.unwrap(), b.unwrap()];
        got.sort();
        assert_eq!(got, vec![Some("dos".to_string()), Some("uno".to_string())]);
        assert_eq!(transport.calls(), 1);
        assert_eq!(coordinator.pending(&batched("x").batch_key()).await, 0);
    }

    #[tokio::test]
    async fn language_pairs_batch_independently() {
        let transport = ScriptedTransport::new(vec![Ok(completion(r#"{"translations": ["uno"]}"#))]);
        let coordinator = coordinator(transport.clone(), 2, 0);
        let es = batched("one").batch_key();

        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.submit(&batched("one")).await })
        };
        wait_for_pending(&coordinator, &es, 1).await;

        // A different pair lands in its own queue and must not trigger the
        // "en"->"es" batch.
        let fr = TranslationRequest::new("deux", "en", "fr").batched();
        let fr_key = fr.batch_key();
        let _other = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.submit(&fr).await })
        };
        wait_for_pending(&coordinator, &fr_key, 1).await;

        assert_eq!(coordinator.pending(&es).await, 1);
        assert_eq!(transport.calls(), 0);

        let second = coordinator.submit(&batched("two")).await.unwrap();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first, Some("uno".to_string()));
        assert_eq!(second, None);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn linger_flushes_a_sub_threshold_batch() {
        let transport = ScriptedTransport::new(vec![Ok(completion(r#"{"translations": ["uno"]}"#))]);
        let coordinator = coordinator(transport.clone(), 10, 5000);
        let key = batched("one").batch_key();

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.submit(&batched("one")).await })
        };
        wait_for_pending(&coordinator, &key, 1).await;
        assert_eq!(transport.calls(), 0);

        tokio::time::advance(Duration::from_millis(5001)).await;
        let result = waiter.await.unwrap().unwrap();

        assert_eq!(result, Some("uno".to_string()));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_linger_leaves_waiters_to_time_out() {
        let transport = ScriptedTransport::new(vec![]);
        let coordinator = coordinator(transport.clone(), 10, 0);
        let key = batched("one").batch_key();

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.submit(&batched("one")).await })
        };
        wait_for_pending(&coordinator, &key, 1).await;

        tokio::time::advance(Duration::from_millis(30_001)).await;
        let result = waiter.await.unwrap();

        assert!(matches!(result, Err(TranslateError::BatchWaitTimeout)));
        assert_eq!(transport.calls(), 0);
    }

    /// Transport that completes only after a long delay, for timeout tests.
    struct SlowTransport {
        delay: Duration,
        payload: serde_json::Value,
    }

    #[async_trait]
    impl Transport for SlowTransport {
        async fn post(&self, _body: &serde_json::Value) -> Result<serde_json::Value> {
            sleep(self.delay).await;
            Ok(self.payload.clone())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_waiters_do_not_cancel_the_call() {
        let transport = Arc::new(SlowTransport {
            delay: Duration::from_secs(45),
            payload: completion(r#"{"translations": ["uno", "dos"]}"#),
        });
        let coordinator = coordinator(transport, 2, 0);
        let key = batched("one").batch_key();

        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.submit(&batched("one")).await })
        };
        wait_for_pending(&coordinator, &key, 1).await;

        let second = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.submit(&batched("two")).await })
        };
        // Let the second slot enqueue and the dispatch task start its call
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        // Both waiters give up at 30 s; the dispatch completes at 45 s and
        // sends into dropped receivers without panicking.
        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(matches!(
            first.await.unwrap(),
            Err(TranslateError::BatchWaitTimeout)
        ));
        assert!(matches!(
            second.await.unwrap(),
            Err(TranslateError::BatchWaitTimeout)
        ));
    }
}
