//! Batch embedding with a bounded worker pool.
//!
//! Every input text is embedded with its own model invocation. At most
//! `num_workers` invocations run at once; the first failure halts the batch
//! and is the only error reported. Results land in preallocated per-index
//! slots, so output order always matches input order.

use super::protocol::titan;
use super::ModelInvoker;
use crate::models::EmbeddingJob;
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct EmbeddingDispatcher {
    invoker: Arc<dyn ModelInvoker>,
    model_id: Arc<str>,
    num_workers: usize,
}

/// State shared by the workers of one batch.
struct BatchState {
    /// One write-once slot per input; slot `i` is only written by the worker
    /// holding job `i`.
    slots: Vec<OnceLock<Vec<f32>>>,
    /// First failure wins; later ones are dropped.
    failure: OnceLock<Error>,
    halted: AtomicBool,
}

impl BatchState {
    fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| OnceLock::new()).collect(),
            failure: OnceLock::new(),
            halted: AtomicBool::new(false),
        }
    }

    fn record_failure(&self, err: Error) {
        if let Err(dropped) = self.failure.set(err) {
            debug!("discarding later embedding failure: {}", dropped);
        }
        self.halted.store(true, Ordering::Release);
    }

    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Consume the state once every worker has finished.
    fn into_outcome(self) -> Result<Vec<Vec<f32>>> {
        if let Some(err) = self.failure.into_inner() {
            return Err(err);
        }
        self.slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.into_inner()
                    .ok_or_else(|| Error::Worker(format!("no embedding produced for text {}", index)))
            })
            .collect()
    }
}

impl EmbeddingDispatcher {
    pub fn new(
        invoker: Arc<dyn ModelInvoker>,
        model_id: impl Into<String>,
        num_workers: usize,
    ) -> Result<Self> {
        let model_id = model_id.into();
        if !titan::supports(&model_id) {
            return Err(Error::UnsupportedModel(format!(
                "embedding model `{}` not supported",
                model_id
            )));
        }
        if num_workers == 0 {
            return Err(Error::Config("num_workers must be at least 1".to_string()));
        }

        Ok(Self {
            invoker,
            model_id: model_id.into(),
            num_workers,
        })
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Embed `texts`, returning one vector per input in input order.
    ///
    /// `cancel` is forwarded into every invocation; when it fires the
    /// in-flight invocations fail and the batch fails with them.
    pub async fn embed<T: AsRef<str>>(
        &self,
        texts: &[T],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let state = Arc::new(BatchState::new(texts.len()));
        let (job_tx, job_rx) = mpsc::channel::<EmbeddingJob>(self.num_workers);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let mut workers = JoinSet::new();
        for id in 0..self.num_workers.min(texts.len()) {
            workers.spawn(run_worker(
                id,
                job_rx.clone(),
                state.clone(),
                self.invoker.clone(),
                self.model_id.clone(),
                cancel.clone(),
            ));
        }
        // Workers hold the only receivers, so sends fail once they all exit.
        drop(job_rx);

        for (index, text) in texts.iter().enumerate() {
            if state.is_halted() {
                break;
            }
            let job = EmbeddingJob {
                index,
                text: text.as_ref().to_string(),
            };
            if job_tx.send(job).await.is_err() {
                debug!("all embedding workers exited, stopping submission at {}", index);
                break;
            }
        }
        drop(job_tx);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                state.record_failure(Error::Worker(format!("embedding worker failed: {}", e)));
            }
        }

        Arc::into_inner(state)
            .ok_or_else(|| Error::Worker("batch state still shared after join".to_string()))?
            .into_outcome()
    }
}

async fn run_worker(
    id: usize,
    jobs: Arc<Mutex<mpsc::Receiver<EmbeddingJob>>>,
    state: Arc<BatchState>,
    invoker: Arc<dyn ModelInvoker>,
    model_id: Arc<str>,
    cancel: CancellationToken,
) {
    debug!(worker = id, "start embedding worker");
    loop {
        let job = jobs.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };
        if state.is_halted() {
            debug!(worker = id, "embedding worker cancelled");
            return;
        }

        debug!(worker = id, index = job.index, "create embedding");
        match embed_one(invoker.as_ref(), &model_id, &job.text, &cancel).await {
            Ok(embedding) => {
                // Indices are unique, so the slot is always empty here.
                let _ = state.slots[job.index].set(embedding);
            }
            Err(err) => {
                debug!(worker = id, index = job.index, "failed to create embedding: {}", err);
                state.record_failure(Error::Batch {
                    index: job.index,
                    source: Box::new(err),
                });
                return;
            }
        }
    }
    debug!(worker = id, "finish embedding worker");
}

async fn embed_one(
    invoker: &dyn ModelInvoker,
    model_id: &str,
    text: &str,
    cancel: &CancellationToken,
) -> Result<Vec<f32>> {
    let body = titan::build_request(text)?;
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        response = invoker.invoke(model_id, body) => response?,
    };

    let (embedding, token_count) = titan::parse_response(&response)?;
    debug!(token_count, dimensions = embedding.len(), "embedding created");
    Ok(embedding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockInvoker;
    use crate::models::model_id::TITAN_EMBEDDING_G1_TEXT;
    use rand::Rng;
    use std::time::Duration;

    fn input_text(body: &[u8]) -> String {
        let json: serde_json::Value = serde_json::from_slice(body).unwrap();
        json["inputText"].as_str().unwrap().to_string()
    }

    /// Embeds "<n>" as `[n, n * 2]`; any other text fails.
    fn numeric_invoker() -> MockInvoker {
        MockInvoker::new().with_handler(|_, body| {
            let text = input_text(body);
            let n: f64 = text
                .parse()
                .map_err(|_| Error::Transport(format!("model rejected {}", text)))?;
            Ok(serde_json::to_vec(&serde_json::json!({
                "embedding": [n, n * 2.0],
                "inputTextTokenCount": 1
            }))
            .unwrap())
        })
    }

    fn dispatcher(invoker: Arc<MockInvoker>, workers: usize) -> EmbeddingDispatcher {
        EmbeddingDispatcher::new(invoker, TITAN_EMBEDDING_G1_TEXT, workers).unwrap()
    }

    #[tokio::test]
    async fn test_results_follow_input_order_under_varied_latency() {
        let invoker = Arc::new(numeric_invoker().with_latency(|_| {
            Duration::from_millis(rand::thread_rng().gen_range(0..15))
        }));
        let texts: Vec<String> = (0..40).map(|i| i.to_string()).collect();

        let result = dispatcher(invoker.clone(), 4)
            .embed(&texts, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.len(), texts.len());
        for (i, embedding) in result.iter().enumerate() {
            assert_eq!(embedding, &vec![i as f32, (i * 2) as f32]);
        }
        assert_eq!(invoker.get_call_count(), 40);
    }

    #[tokio::test]
    async fn test_in_flight_calls_bounded_by_worker_count() {
        let invoker = Arc::new(numeric_invoker().with_latency(|_| Duration::from_millis(5)));
        let texts: Vec<String> = (0..24).map(|i| i.to_string()).collect();

        dispatcher(invoker.clone(), 3)
            .embed(&texts, &CancellationToken::new())
            .await
            .unwrap();

        assert!(invoker.get_max_in_flight() <= 3);
    }

    #[tokio::test]
    async fn test_single_failure_fails_batch() {
        let invoker = Arc::new(numeric_invoker());
        let texts = vec!["0", "1", "oops", "3", "4"];

        let err = dispatcher(invoker, 2)
            .embed(&texts, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            Error::Batch { index, source } => {
                assert_eq!(index, 2);
                assert!(matches!(*source, Error::Transport(_)));
            }
            other => panic!("expected batch error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_stops_remaining_jobs() {
        let invoker = Arc::new(numeric_invoker());
        let texts = vec!["bad", "1", "2", "3", "4", "5"];

        let result = dispatcher(invoker.clone(), 1)
            .embed(&texts, &CancellationToken::new())
            .await;

        assert!(result.is_err());
        assert_eq!(invoker.get_call_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_halts_idle_workers() {
        let invoker = Arc::new(numeric_invoker().with_latency(|body| {
            if input_text(body) == "bad" {
                Duration::ZERO
            } else {
                Duration::from_millis(20)
            }
        }));
        let mut texts = vec!["bad".to_string()];
        texts.extend((1..20).map(|i| i.to_string()));

        let err = dispatcher(invoker.clone(), 2)
            .embed(&texts, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Batch { index: 0, .. }));
        // Only the job already taken by the second worker may still run.
        assert!(invoker.get_call_count() <= 2);
    }

    #[tokio::test]
    async fn test_first_failure_wins() {
        let invoker = Arc::new(MockInvoker::new().with_handler(|_, body| {
            Err(Error::Transport(format!("failed {}", input_text(body))))
        }));
        let texts = vec!["a", "b", "c", "d"];

        let err = dispatcher(invoker, 4)
            .embed(&texts, &CancellationToken::new())
            .await
            .unwrap_err();

        // Exactly one underlying error, never an aggregate.
        assert!(matches!(err, Error::Batch { .. }));
    }

    #[tokio::test]
    async fn test_caller_cancellation_fails_batch() {
        let invoker = Arc::new(numeric_invoker());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = dispatcher(invoker.clone(), 2)
            .embed(&["1", "2", "3"], &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Batch { ref source, .. } if matches!(**source, Error::Cancelled)));
        assert_eq!(invoker.get_call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_slow_invocation() {
        let invoker = Arc::new(numeric_invoker().with_latency(|_| Duration::from_secs(30)));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            dispatcher(invoker, 2).embed(&["1", "2"], &cancel),
        )
        .await
        .expect("batch should stop once cancelled");

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_malformed_response_fails_batch() {
        let invoker = Arc::new(MockInvoker::new().with_response(b"{\"embedding\":".to_vec()));

        let err = dispatcher(invoker, 2)
            .embed(&["x"], &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Batch { ref source, .. } if matches!(**source, Error::Translation { .. })));
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let invoker = Arc::new(numeric_invoker());
        let texts: Vec<String> = Vec::new();

        let result = dispatcher(invoker.clone(), 3)
            .embed(&texts, &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.is_empty());
        assert_eq!(invoker.get_call_count(), 0);
    }

    #[tokio::test]
    async fn test_more_workers_than_inputs() {
        let invoker = Arc::new(numeric_invoker());

        let result = dispatcher(invoker, 16)
            .embed(&["7"], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result, vec![vec![7.0, 14.0]]);
    }

    #[test]
    fn test_rejects_unsupported_model() {
        let err = EmbeddingDispatcher::new(Arc::new(MockInvoker::new()), "cohere.embed-english-v3", 2)
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnsupportedModel(_)));
    }

    #[test]
    fn test_rejects_zero_workers() {
        let err = EmbeddingDispatcher::new(Arc::new(MockInvoker::new()), TITAN_EMBEDDING_G1_TEXT, 0)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }
}
