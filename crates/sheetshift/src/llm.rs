//! Boundary to an external LLM translator
//!
//! The engine calls [`LlmTranslator::translate`] on a helper thread and waits on a
//! channel in short slices, so a slow or hung translator cannot hold a job past its
//! timeout or past cancellation. A translator still running when the engine gives up is
//! left to finish on its own; its answer is dropped.
//!
//! Each engine holds at most [`MAX_PENDING_CALLS`] helper threads, counting the ones it
//! stopped waiting for. Calls beyond that fail at once instead of starting a thread.

use crate::job::LocaleIds;
use crossbeam::channel::{self, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How often a waiting job checks for cancellation
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Helper threads one engine may have running at once
pub const MAX_PENDING_CALLS: usize = 32;

/// What the LLM is asked to translate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmRequest {
    /// Original formula text, without the leading `=`
    pub source_formula_text: String,
    pub locale_pair: LocaleIds,
    /// What the deterministic pipeline could not handle
    #[serde(default)]
    pub known_incompatibility_hints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub target_formula_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmCallError {
    #[error("LLM call timed out after {0:?}")]
    Timeout(Duration),

    #[error("LLM call cancelled")]
    Cancelled,

    #[error("LLM call failed: {0}")]
    Failed(String),

    #[error("LLM response rejected: {0}")]
    InvalidResponse(String),
}

/// A collaborator that translates formulas the deterministic pipeline cannot.
///
/// Implementations should honor `timeout` themselves where they can; the engine
/// enforces it either way.
pub trait LlmTranslator: Send + Sync {
    fn translate(&self, request: &LlmRequest, timeout: Duration) -> Result<LlmResponse, LlmCallError>;
}

impl<F> LlmTranslator for F
where
    F: Fn(&LlmRequest, Duration) -> Result<LlmResponse, LlmCallError> + Send + Sync,
{
    fn translate(&self, request: &LlmRequest, timeout: Duration) -> Result<LlmResponse, LlmCallError> {
        self(request, timeout)
    }
}

/// Shared flag that makes pending and future LLM calls give up
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counts helper threads that have not finished yet
#[derive(Debug, Clone)]
pub(crate) struct CallSlots {
    running: Arc<AtomicUsize>,
    limit: usize,
}

impl CallSlots {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            running: Arc::new(AtomicUsize::new(0)),
            limit,
        }
    }

    fn acquire(&self) -> Option<SlotGuard> {
        self.running
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.limit).then_some(n + 1)
            })
            .ok()
            .map(|_| SlotGuard(Arc::clone(&self.running)))
    }

    pub(crate) fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for CallSlots {
    fn default() -> Self {
        Self::new(MAX_PENDING_CALLS)
    }
}

/// Frees its slot when the helper thread ends, however it ends
struct SlotGuard(Arc<AtomicUsize>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Run one call on a helper thread, bounded by `timeout` and `token`
pub(crate) fn call_with_deadline(
    translator: &Arc<dyn LlmTranslator>,
    request: LlmRequest,
    timeout: Duration,
    token: &CancellationToken,
    slots: &CallSlots,
) -> Result<LlmResponse, LlmCallError> {
    if token.is_cancelled() {
        return Err(LlmCallError::Cancelled);
    }
    let Some(slot) = slots.acquire() else {
        tracing::warn!(running = slots.running(), "LLM call limit reached");
        return Err(LlmCallError::Failed(format!(
            "{} LLM calls still running",
            slots.limit
        )));
    };

    let (tx, rx) = channel::bounded(1);
    let worker = Arc::clone(translator);
    std::thread::Builder::new()
        .name("sheetshift-llm".into())
        .spawn(move || {
            let _slot = slot;
            let _ = tx.send(worker.translate(&request, timeout));
        })
        .map_err(|e| LlmCallError::Failed(format!("could not start LLM thread: {e}")))?;

    let deadline = Instant::now() + timeout;
    loop {
        if token.is_cancelled() {
            return Err(LlmCallError::Cancelled);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(LlmCallError::Timeout(timeout));
        }
        match rx.recv_timeout(remaining.min(WAIT_SLICE)) {
            Ok(result) => return result,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                return Err(LlmCallError::Failed(
                    "translator thread ended without an answer".into(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request() -> LlmRequest {
        LlmRequest {
            source_formula_text: "FOO(1)".into(),
            locale_pair: LocaleIds::new("en-US", "de-DE"),
            known_incompatibility_hints: vec!["no de-DE mapping for: FOO".into()],
        }
    }

    fn call(
        llm: &Arc<dyn LlmTranslator>,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<LlmResponse, LlmCallError> {
        call_with_deadline(llm, request(), timeout, token, &CallSlots::default())
    }

    fn translator<F>(f: F) -> Arc<dyn LlmTranslator>
    where
        F: Fn(&LlmRequest, Duration) -> Result<LlmResponse, LlmCallError> + Send + Sync + 'static,
    {
        Arc::new(f)
    }

    #[test]
    fn test_answer_is_returned() {
        let llm = translator(|req, _| {
            Ok(LlmResponse {
                target_formula_text: req.source_formula_text.replace("FOO", "BAR"),
            })
        });
        let response = call(&llm, Duration::from_secs(5), &CancellationToken::new()).unwrap();
        assert_eq!(response.target_formula_text, "BAR(1)");
    }

    #[test]
    fn test_slow_translator_times_out() {
        let llm = translator(|_, _| {
            std::thread::sleep(Duration::from_secs(2));
            Err(LlmCallError::Failed("too late".into()))
        });
        let timeout = Duration::from_millis(100);
        let started = Instant::now();
        let err = call(&llm, timeout, &CancellationToken::new()).unwrap_err();
        assert_eq!(err, LlmCallError::Timeout(timeout));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_cancellation_interrupts_wait() {
        let llm = translator(|_, _| {
            std::thread::sleep(Duration::from_secs(2));
            Err(LlmCallError::Failed("too late".into()))
        });
        let token = CancellationToken::new();
        let canceller = token.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            canceller.cancel();
        });
        let err = call(&llm, Duration::from_secs(10), &token).unwrap_err();
        assert_eq!(err, LlmCallError::Cancelled);
        assert_eq!(
            call(&llm, Duration::from_secs(10), &token),
            Err(LlmCallError::Cancelled)
        );
    }

    #[test]
    fn test_panicking_translator_is_a_failure() {
        let llm = translator(|_, _| panic!("boom"));
        let err = call(&llm, Duration::from_secs(5), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, LlmCallError::Failed(_)));
    }

    #[test]
    fn test_hung_translators_are_capped() {
        let (release_tx, release_rx) = channel::unbounded::<()>();
        let llm = translator(move |_, _| {
            let _ = release_rx.recv();
            Err(LlmCallError::Failed("released".into()))
        });
        let slots = CallSlots::new(2);
        let token = CancellationToken::new();
        let timeout = Duration::from_millis(50);

        for _ in 0..2 {
            let err = call_with_deadline(&llm, request(), timeout, &token, &slots).unwrap_err();
            assert_eq!(err, LlmCallError::Timeout(timeout));
        }
        assert_eq!(slots.running(), 2);
        let err = call_with_deadline(&llm, request(), timeout, &token, &slots).unwrap_err();
        assert_eq!(err, LlmCallError::Failed("2 LLM calls still running".into()));

        drop(release_tx);
        let started = Instant::now();
        while slots.running() > 0 && started.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(slots.running(), 0);
        assert_eq!(
            call_with_deadline(&llm, request(), Duration::from_secs(5), &token, &slots),
            Err(LlmCallError::Failed("released".into()))
        );
    }

    #[test]
    fn test_request_json_shape() {
        let json = serde_json::to_value(request()).unwrap();
        assert_eq!(json["locale_pair"]["target"], "de-DE");
        assert_eq!(json["known_incompatibility_hints"][0], "no de-DE mapping for: FOO");
    }
}
