//! Inline assistant summoned from chat
//!
//! A relayed message containing the marker (default `@ai`) becomes an
//! instruction for the completion provider. The reply is broadcast to the
//! whole room, sender included, under the reserved assistant identity.
//!
//! Marker detection is a plain case-sensitive substring match with no word
//! boundary check; only the first occurrence is stripped.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::broadcast::RoomBroadcaster;
use crate::llm::{GenerateRequest, LlmError, LlmProvider};
use crate::protocol::ServerMessage;
use crate::types::{Participant, RoomId};

pub const DEFAULT_MARKER: &str = "@ai";

/// Assistant settings
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Substring that summons the assistant
    pub marker: String,
    /// Upper bound on one completion call
    pub timeout: Duration,
    /// Max tokens requested from the provider
    pub max_tokens: u32,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
            timeout: Duration::from_secs(30),
            max_tokens: 1024,
        }
    }
}

impl AssistantConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        // Not trimmed: the marker matches exactly as configured
        let marker = std::env::var("ASSISTANT_MARKER")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(defaults.marker);

        Self {
            marker,
            timeout: std::env::var("ASSISTANT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_tokens: std::env::var("ASSISTANT_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_tokens),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    #[error("completion failed: {0}")]
    Failed(String),
    #[error("completion timed out after {0:?}")]
    Timeout(Duration),
}

impl From<LlmError> for CompletionError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Timeout(after) => CompletionError::Timeout(after),
            other => CompletionError::Failed(other.to_string()),
        }
    }
}

/// What became of one summon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// Reply broadcast; carries the number of members that accepted it
    Delivered(usize),
    /// Completion succeeded but the room had no members left
    RoomGone,
    /// Completion failed or timed out; nothing was sent
    Failed,
}

/// Watches relayed messages for the summon marker
#[derive(Clone)]
pub struct AssistantTrigger {
    config: AssistantConfig,
    provider: Option<Arc<dyn LlmProvider>>,
    broadcaster: Arc<RoomBroadcaster>,
}

impl AssistantTrigger {
    pub fn new(
        config: AssistantConfig,
        provider: Option<Arc<dyn LlmProvider>>,
        broadcaster: Arc<RoomBroadcaster>,
    ) -> Self {
        Self {
            config,
            provider,
            broadcaster,
        }
    }

    pub fn marker(&self) -> &str {
        &self.config.marker
    }

    /// Instruction text for a message body, or `None` if the marker is absent.
    /// Removes only the first occurrence of the marker; everything around it
    /// is kept verbatim.
    pub fn extract_instruction(&self, body: &str) -> Option<String> {
        let marker = self.config.marker.as_str();
        if marker.is_empty() || !body.contains(marker) {
            return None;
        }
        Some(body.replacen(marker, "", 1))
    }

    /// Run one completion under the configured timeout
    pub async fn complete(&self, instruction: &str) -> Result<String, CompletionError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| CompletionError::Failed("no completion provider configured".into()))?;

        let request = GenerateRequest {
            prompt: instruction.to_string(),
            max_tokens: Some(self.config.max_tokens),
            timeout: self.config.timeout,
        };

        let response = tokio::time::timeout(self.config.timeout, provider.generate(request))
            .await
            .map_err(|_| CompletionError::Timeout(self.config.timeout))??;

        tracing::debug!(
            provider = %response.metadata.provider,
            model = %response.metadata.model,
            latency_ms = response.metadata.latency_ms,
            tokens = ?response.metadata.tokens_used,
            "Completion finished"
        );
        Ok(response.text)
    }

    /// Inspect a message that has already been relayed to `room`. If it
    /// summons the assistant, spawn the completion and return its handle.
    ///
    /// Assistant messages are never inspected, so replies cannot re-trigger.
    pub fn on_relayed(
        &self,
        room: &RoomId,
        sender: &Participant,
        body: &str,
    ) -> Option<JoinHandle<ReplyOutcome>> {
        if sender.is_assistant() {
            return None;
        }
        let instruction = self.extract_instruction(body)?;

        tracing::info!(room = %room, sender = %sender.id, "Assistant summoned");

        let trigger = self.clone();
        let room = room.clone();
        Some(tokio::spawn(async move {
            trigger.reply(&room, &instruction).await
        }))
    }

    async fn reply(&self, room: &RoomId, instruction: &str) -> ReplyOutcome {
        let text = match self.complete(instruction).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(room = %room, error = %e, "Assistant completion failed, no reply sent");
                return ReplyOutcome::Failed;
            }
        };

        // The room, not the summoning connection, decides deliverability
        if !self.broadcaster.has_room(room) {
            tracing::info!(room = %room, "Room emptied before the assistant replied, dropping reply");
            return ReplyOutcome::RoomGone;
        }

        let delivered = self.broadcaster.broadcast(
            room,
            ServerMessage::project_message(text, Participant::assistant()),
            None,
        );
        tracing::debug!(room = %room, delivered, "Assistant reply broadcast");
        ReplyOutcome::Delivered(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::member_channel;
    use crate::llm::{GenerateResponse, LlmResult, ResponseMetadata};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Echoes a fixed answer and counts calls
    struct FixedProvider {
        answer: Result<String, String>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FixedProvider {
        fn ok(answer: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: Ok(answer.to_string()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                answer: Err("boom".to_string()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                answer: Ok("late".to_string()),
                delay,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for FixedProvider {
        async fn generate(&self, _request: GenerateRequest) -> LlmResult<GenerateResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            match &self.answer {
                Ok(text) => Ok(GenerateResponse {
                    text: text.clone(),
                    metadata: ResponseMetadata {
                        provider: "fixed".to_string(),
                        model: "fixed".to_string(),
                        tokens_used: None,
                        latency_ms: 0,
                    },
                }),
                Err(e) => Err(LlmError::ApiError(e.clone())),
            }
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn room() -> RoomId {
        RoomId::parse("aaaaaaaaaaaaaaaaaaaaaaaa").unwrap()
    }

    fn user() -> Participant {
        Participant {
            id: "u1".to_string(),
            email: "u1@example.com".to_string(),
        }
    }

    fn trigger_with(provider: Option<Arc<dyn LlmProvider>>) -> (AssistantTrigger, Arc<RoomBroadcaster>) {
        let broadcaster = Arc::new(RoomBroadcaster::new());
        let trigger = AssistantTrigger::new(
            AssistantConfig::default(),
            provider,
            broadcaster.clone(),
        );
        (trigger, broadcaster)
    }

    #[test]
    fn test_extract_instruction_strips_first_marker_only() {
        let (trigger, _) = trigger_with(None);
        assert_eq!(
            trigger.extract_instruction("@ai summarize this").as_deref(),
            Some(" summarize this")
        );
        assert_eq!(
            trigger.extract_instruction("hey @ai ask @ai twice").as_deref(),
            Some("hey  ask @ai twice")
        );
        // No word boundary check
        assert_eq!(
            trigger.extract_instruction("mail@aide.com").as_deref(),
            Some("mailde.com")
        );
    }

    #[test]
    fn test_extract_instruction_is_case_sensitive() {
        let (trigger, _) = trigger_with(None);
        assert!(trigger.extract_instruction("@AI summarize").is_none());
        assert!(trigger.extract_instruction("plain message").is_none());
    }

    #[tokio::test]
    async fn test_reply_goes_to_whole_room() {
        let provider = FixedProvider::ok("SUMMARY");
        let (trigger, broadcaster) = trigger_with(Some(provider.clone()));
        let (tx_a, mut rx_a) = member_channel();
        let (tx_b, mut rx_b) = member_channel();
        broadcaster.join(&room(), &"A".to_string(), tx_a);
        broadcaster.join(&room(), &"B".to_string(), tx_b);

        let handle = trigger
            .on_relayed(&room(), &user(), "@ai summarize this")
            .unwrap();
        assert_eq!(handle.await.unwrap(), ReplyOutcome::Delivered(2));

        let expected = ServerMessage::project_message("SUMMARY", Participant::assistant());
        assert_eq!(rx_a.recv().await.unwrap(), expected);
        assert_eq!(rx_b.recv().await.unwrap(), expected);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_marker_no_call() {
        let provider = FixedProvider::ok("SUMMARY");
        let (trigger, _) = trigger_with(Some(provider.clone()));
        assert!(trigger.on_relayed(&room(), &user(), "hello team").is_none());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_assistant_messages_are_not_rescanned() {
        let provider = FixedProvider::ok("@ai again");
        let (trigger, _) = trigger_with(Some(provider.clone()));
        assert!(trigger
            .on_relayed(&room(), &Participant::assistant(), "@ai again")
            .is_none());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_sends_nothing() {
        let (trigger, broadcaster) = trigger_with(Some(FixedProvider::failing()));
        let (tx, mut rx) = member_channel();
        broadcaster.join(&room(), &"A".to_string(), tx);

        let outcome = trigger
            .on_relayed(&room(), &user(), "@ai do it")
            .unwrap()
            .await
            .unwrap();
        assert_eq!(outcome, ReplyOutcome::Failed);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_provider_is_a_failure() {
        let (trigger, _) = trigger_with(None);
        assert!(matches!(
            trigger.complete("hi").await,
            Err(CompletionError::Failed(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout() {
        let broadcaster = Arc::new(RoomBroadcaster::new());
        let trigger = AssistantTrigger::new(
            AssistantConfig {
                timeout: Duration::from_millis(50),
                ..AssistantConfig::default()
            },
            Some(FixedProvider::slow(Duration::from_secs(5))),
            broadcaster,
        );

        assert_eq!(
            trigger.complete("hi").await,
            Err(CompletionError::Timeout(Duration::from_millis(50)))
        );
    }

    #[tokio::test]
    async fn test_reply_follows_room_not_summoner() {
        let (trigger, broadcaster) =
            trigger_with(Some(FixedProvider::slow(Duration::from_millis(200))));
        let (tx_a, _rx_a) = member_channel();
        let (tx_b, mut rx_b) = member_channel();
        broadcaster.join(&room(), &"A".to_string(), tx_a);
        broadcaster.join(&room(), &"B".to_string(), tx_b);

        let handle = trigger.on_relayed(&room(), &user(), "@ai hi").unwrap();
        // Summoner disconnects while the completion is in flight
        broadcaster.leave(&room(), &"A".to_string());

        assert_eq!(handle.await.unwrap(), ReplyOutcome::Delivered(1));
        assert_eq!(
            rx_b.try_recv().unwrap(),
            ServerMessage::project_message("late", Participant::assistant())
        );
    }

    #[tokio::test]
    async fn test_reply_dropped_when_room_empties_in_flight() {
        let provider = FixedProvider::slow(Duration::from_millis(200));
        let (trigger, broadcaster) = trigger_with(Some(provider.clone()));
        let (tx_a, mut rx_a) = member_channel();
        let (tx_b, mut rx_b) = member_channel();
        broadcaster.join(&room(), &"A".to_string(), tx_a);
        broadcaster.join(&room(), &"B".to_string(), tx_b);

        let handle = trigger.on_relayed(&room(), &user(), "@ai hi").unwrap();
        broadcaster.leave(&room(), &"A".to_string());
        broadcaster.leave(&room(), &"B".to_string());

        assert_eq!(handle.await.unwrap(), ReplyOutcome::RoomGone);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(!broadcaster.has_room(&room()));
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_llm_error_conversion() {
        assert_eq!(
            CompletionError::from(LlmError::Timeout(Duration::from_secs(5))),
            CompletionError::Timeout(Duration::from_secs(5))
        );
        assert!(matches!(
            CompletionError::from(LlmError::ParseError("x".into())),
            CompletionError::Failed(_)
        ));
    }
}
