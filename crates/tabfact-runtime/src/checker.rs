//! Live fact checking against one backend.
//!
//! [`FactChecker`] allows a single active run. Starting a new check cancels
//! whatever run is still streaming, and [`FactChecker::abort`] cancels it
//! on request.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tabfact_core::{InferenceRequest, MarkerPair};
use tokio_util::sync::CancellationToken;

use crate::config::RuntimeConfig;
use crate::providers::{BackendRegistry, InferenceBackend};
use crate::session::{run_session, RunOutcome, SessionObserver};
use crate::RuntimeError;

/// Holds the cancellation token of the active run, if any.
#[derive(Debug, Default)]
pub struct SessionSlot {
    active: Mutex<Option<(u64, CancellationToken)>>,
    next_id: AtomicU64,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the previous run and register a new one.
    fn begin(&self) -> SlotGuard<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        let previous = self.active.lock().replace((id, token.clone()));
        if let Some((previous_id, previous_token)) = previous {
            tracing::info!(run = previous_id, "cancelling previous run");
            previous_token.cancel();
        }

        SlotGuard {
            slot: self,
            id,
            token,
        }
    }

    /// Cancel the active run. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        match self.active.lock().take() {
            Some((id, token)) => {
                tracing::info!(run = id, "aborting run");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    fn release(&self, id: u64) {
        let mut active = self.active.lock();
        if matches!(&*active, Some((active_id, _)) if *active_id == id) {
            *active = None;
        }
    }
}

/// Clears the slot when its run ends, however it ends.
struct SlotGuard<'a> {
    slot: &'a SessionSlot,
    id: u64,
    token: CancellationToken,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.slot.release(self.id);
    }
}

/// Runs fact checks, one at a time, against a backend.
pub struct FactChecker {
    backend: Arc<dyn InferenceBackend>,
    idle_timeout: Duration,
    slot: SessionSlot,
}

impl FactChecker {
    pub fn new(backend: Arc<dyn InferenceBackend>, idle_timeout: Duration) -> Self {
        Self {
            backend,
            idle_timeout,
            slot: SessionSlot::new(),
        }
    }

    /// Build the configured backend from the default registry.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        let registry = BackendRegistry::with_defaults();
        let backend = registry.create(&config.backend, &config.backend_json())?;
        tracing::debug!(backend = backend.name(), model = %config.model, "fact checker ready");
        Ok(Self::new(backend, config.idle_timeout))
    }

    pub fn backend(&self) -> &Arc<dyn InferenceBackend> {
        &self.backend
    }

    /// Check one claim, streaming output to `observer`.
    ///
    /// Cancels any run still in flight before this one starts. Marker
    /// detection follows `request.model`.
    pub async fn check(
        &self,
        request: &InferenceRequest,
        observer: &mut dyn SessionObserver,
    ) -> Result<RunOutcome, RuntimeError> {
        let guard = self.slot.begin();
        let markers = MarkerPair::for_model(&request.model);
        tracing::info!(
            run = guard.id,
            model = %request.model,
            backend = self.backend.name(),
            "starting fact check"
        );

        let stream = tokio::select! {
            biased;
            _ = guard.token.cancelled() => return Ok(RunOutcome::Cancelled),
            stream = self.backend.open_stream(request) => stream?,
        };

        let outcome = run_session(
            stream,
            markers,
            guard.token.clone(),
            observer,
            self.idle_timeout,
        )
        .await?;
        Ok(outcome)
    }

    /// Cancel the active run, if any.
    pub fn abort(&self) -> bool {
        self.slot.cancel()
    }

    pub fn is_running(&self) -> bool {
        self.slot.is_active()
    }

    /// Load a model ahead of the first check.
    pub async fn preload(&self, model: &str) -> Result<(), RuntimeError> {
        Ok(self.backend.preload(model).await?)
    }

    pub async fn health_check(&self) -> bool {
        self.backend.health_check().await
    }
}

/// Builder for [`FactChecker`].
pub struct FactCheckerBuilder {
    backend: Option<Arc<dyn InferenceBackend>>,
    config: RuntimeConfig,
}

impl FactCheckerBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            config: RuntimeConfig::default(),
        }
    }

    /// Use this backend instead of creating one from the config.
    pub fn backend(mut self, backend: Arc<dyn InferenceBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.config.idle_timeout = idle_timeout;
        self
    }

    pub fn build(self) -> Result<FactChecker, RuntimeError> {
        self.config.validate()?;
        match self.backend {
            Some(backend) => Ok(FactChecker::new(backend, self.config.idle_timeout)),
            None => FactChecker::from_config(&self.config),
        }
    }
}

impl Default for FactCheckerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ByteStream, ProviderError};
    use crate::session::NullObserver;
    use async_trait::async_trait;
    use futures::StreamExt;
    use tabfact_core::Answer;

    /// Streams the claim back as answer text. A claim of "hang" sends one
    /// token and then never finishes.
    struct EchoBackend;

    #[async_trait]
    impl InferenceBackend for EchoBackend {
        async fn open_stream(&self, request: &InferenceRequest) -> Result<ByteStream, ProviderError> {
            let line = format!(
                "{}\n",
                serde_json::json!({ "response": request.claim_text })
            );
            let first = futures::stream::iter(vec![Ok(line.into_bytes())]);
            if request.claim_text == "hang" {
                Ok(first.chain(futures::stream::pending()).boxed())
            } else {
                Ok(first.boxed())
            }
        }

        async fn preload(&self, _model: &str) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn checker() -> Arc<FactChecker> {
        Arc::new(
            FactCheckerBuilder::new()
                .backend(Arc::new(EchoBackend))
                .idle_timeout(Duration::from_secs(60))
                .build()
                .unwrap(),
        )
    }

    fn request(claim: &str) -> InferenceRequest {
        InferenceRequest::new("Name#Year\nAlice#1998", claim, "cogito")
    }

    async fn wait_until_running(checker: &FactChecker) {
        while !checker.is_running() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_check_completes_and_clears_slot() {
        let checker = checker();
        let outcome = checker
            .check(&request("{\"answer\": \"TRUE\"}"), &mut NullObserver)
            .await
            .unwrap();

        assert_eq!(outcome.report().unwrap().verdict.answer, Answer::True);
        assert!(!checker.is_running());
        assert!(!checker.abort());
    }

    #[tokio::test]
    async fn test_abort_cancels_active_run() {
        let checker = checker();
        let running = {
            let checker = checker.clone();
            tokio::spawn(async move { checker.check(&request("hang"), &mut NullObserver).await })
        };

        wait_until_running(&checker).await;
        assert!(checker.abort());

        let outcome = running.await.unwrap().unwrap();
        assert!(outcome.is_cancelled());
        assert!(!checker.is_running());
    }

    #[tokio::test]
    async fn test_new_run_cancels_previous() {
        let checker = checker();
        let first = {
            let checker = checker.clone();
            tokio::spawn(async move { checker.check(&request("hang"), &mut NullObserver).await })
        };
        wait_until_running(&checker).await;

        let second = checker
            .check(&request("The claim is false"), &mut NullObserver)
            .await
            .unwrap();

        assert!(first.await.unwrap().unwrap().is_cancelled());
        let report = second.report().unwrap();
        assert_eq!(report.answer, "The claim is false");
        assert_eq!(report.verdict.answer, Answer::False);
        assert!(!checker.is_running());
    }

    #[test]
    fn test_builder_requires_valid_config() {
        let result = FactCheckerBuilder::new()
            .backend(Arc::new(EchoBackend))
            .idle_timeout(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }

    #[test]
    fn test_builder_unknown_backend_type() {
        let config = RuntimeConfig {
            backend: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        let result = FactCheckerBuilder::new().config(config).build();
        assert!(matches!(result, Err(RuntimeError::Provider(_))));
    }

    #[test]
    fn test_slot_release_ignores_stale_run() {
        let slot = SessionSlot::new();
        let first = slot.begin();
        let first_token = first.token.clone();
        let second = slot.begin();
        assert!(first_token.is_cancelled());

        // The first run ending must not clear the second run's entry.
        drop(first);
        assert!(slot.is_active());
        drop(second);
        assert!(!slot.is_active());
    }
}
