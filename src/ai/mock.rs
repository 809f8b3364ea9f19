use super::{FetchedImage, ImageFetcher, ModelInvoker};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Handler = dyn Fn(&str, &[u8]) -> Result<Vec<u8>> + Send + Sync;
type Latency = dyn Fn(&[u8]) -> Duration + Send + Sync;

/// In-memory [`ModelInvoker`] for tests.
///
/// Answers with a handler when one is set, otherwise cycles through the
/// configured canned responses.
pub struct MockInvoker {
    responses: Arc<Mutex<Vec<Vec<u8>>>>,
    handler: Option<Arc<Handler>>,
    latency: Option<Arc<Latency>>,
    requests: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    call_count: Arc<Mutex<usize>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockInvoker {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            handler: None,
            latency: None,
            requests: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(Mutex::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_response(self, response: impl Into<Vec<u8>>) -> Self {
        self.responses.lock().unwrap().push(response.into());
        self
    }

    pub fn with_json_response(self, response: serde_json::Value) -> Self {
        let body = serde_json::to_vec(&response).unwrap();
        self.with_response(body)
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &[u8]) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Delay each call by a duration derived from its request body.
    pub fn with_latency<F>(mut self, latency: F) -> Self
    where
        F: Fn(&[u8]) -> Duration + Send + Sync + 'static,
    {
        self.latency = Some(Arc::new(latency));
        self
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    /// Model ids and bodies of every call, in arrival order.
    pub fn get_requests(&self) -> Vec<(String, Vec<u8>)> {
        self.requests.lock().unwrap().clone()
    }

    /// Highest number of calls observed running at the same time.
    pub fn get_max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn respond(&self, model_id: &str, body: &[u8], call: usize) -> Result<Vec<u8>> {
        if let Some(handler) = &self.handler {
            return handler(model_id, body);
        }

        let responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(Error::Transport("no mock response configured".to_string()));
        }
        let index = (call - 1) % responses.len();
        Ok(responses[index].clone())
    }
}

impl Default for MockInvoker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelInvoker for MockInvoker {
    async fn invoke(&self, model_id: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        let call = {
            let mut count = self.call_count.lock().unwrap();
            *count += 1;
            *count
        };
        self.requests
            .lock()
            .unwrap()
            .push((model_id.to_string(), body.clone()));

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(latency) = &self.latency {
            tokio::time::sleep(latency(&body)).await;
        }
        let result = self.respond(model_id, &body, call);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// In-memory [`ImageFetcher`] serving images registered by URL.
pub struct MockImageFetcher {
    images: Arc<Mutex<HashMap<String, FetchedImage>>>,
    call_count: Arc<Mutex<usize>>,
}

impl MockImageFetcher {
    pub fn new() -> Self {
        Self {
            images: Arc::new(Mutex::new(HashMap::new())),
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_image(self, url: impl Into<String>, image: FetchedImage) -> Self {
        self.images.lock().unwrap().insert(url.into(), image);
        self
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

impl Default for MockImageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageFetcher for MockImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage> {
        *self.call_count.lock().unwrap() += 1;

        self.images
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Transport(format!("failed to get image: 404 Not Found ({})", url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_invoker_cycles_responses() {
        let invoker = MockInvoker::new()
            .with_response(b"first".to_vec())
            .with_response(b"second".to_vec());

        assert_eq!(invoker.invoke("m", vec![]).await.unwrap(), b"first");
        assert_eq!(invoker.invoke("m", vec![]).await.unwrap(), b"second");
        // Should cycle back
        assert_eq!(invoker.invoke("m", vec![]).await.unwrap(), b"first");
        assert_eq!(invoker.get_call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_invoker_records_requests() {
        let invoker = MockInvoker::new().with_handler(|model, body| {
            Ok(format!("{}:{}", model, String::from_utf8_lossy(body)).into_bytes())
        });

        let response = invoker.invoke("model-a", b"ping".to_vec()).await.unwrap();

        assert_eq!(response, b"model-a:ping");
        assert_eq!(
            invoker.get_requests(),
            vec![("model-a".to_string(), b"ping".to_vec())]
        );
    }

    #[tokio::test]
    async fn test_mock_invoker_without_responses_errors() {
        let invoker = MockInvoker::new();
        let err = invoker.invoke("m", vec![]).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_mock_image_fetcher() {
        let image = FetchedImage {
            data: vec![1, 2, 3],
            mime_type: "image/gif".to_string(),
        };
        let fetcher = MockImageFetcher::new().with_image("https://a/b.gif", image.clone());

        assert_eq!(fetcher.fetch("https://a/b.gif").await.unwrap(), image);
        assert!(fetcher.fetch("https://a/missing.gif").await.is_err());
        assert_eq!(fetcher.get_call_count(), 2);
    }
}
