//! Conversation service orchestrating one chat turn end to end.
//!
//! A turn moves through a fixed sequence of states:
//!
//! 1. `Received`: validate input, load the session and its history.
//! 2. `Persisted(user)`: the user message is durable. Failure aborts the turn.
//! 3. `Completed`: the completion endpoint answered. On failure the user
//!    message stays and the error is returned.
//! 4. `Finalized`: the assistant message and the updated session total are
//!    written in one transactional batch. On failure the generated text is
//!    returned inside [`ConversationError::PersistCompletion`]. Retrying the
//!    turn is not idempotent.
//! 5. On the first exchange, a summary label replaces the placeholder name.
//!    A summary failure is reported in the outcome, never as an error.
//!
//! Earlier successful steps are never rolled back. Turns in one session are
//! not serialized here; the session document's concurrency token makes a
//! losing concurrent batch fail instead of overwriting the token total.

use serde::Serialize;
use tracing::{Instrument, info, info_span, warn};

use convo_types::chat::{DEFAULT_SESSION_NAME, Document, Message, Sender, Session};
use convo_types::config::ConversationConfig;
use convo_types::error::StoreError;
use convo_types::llm::{CompletionError, CompletionRequest, CompletionResponse};

use crate::completion::client::CompletionClient;
use crate::store::context::CallContext;
use crate::store::conversation::{
    ConversationStore, DeleteReport, assign_identity, expect_message,
};
use crate::store::document::DocumentStore;

use super::prompts::turn_request;
use super::summary::generate_summary;

/// Errors from conversation service operations.
#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The completion call failed. Anything persisted earlier in the turn stays.
    #[error("completion failed for session '{session_id}': {source}")]
    Completion {
        session_id: String,
        #[source]
        source: CompletionError,
    },

    /// The completion succeeded but its result could not be persisted.
    ///
    /// `text` holds the generated reply so it is not lost.
    #[error(
        "completion for session '{session_id}' was generated but not persisted \
         ({completion_tokens} tokens): {source}"
    )]
    PersistCompletion {
        session_id: String,
        text: String,
        completion_tokens: u32,
        #[source]
        source: StoreError,
    },
}

/// Whether a summary label was applied after a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum SummaryStatus {
    NotRequested,
    Applied(String),
    Failed(String),
}

/// Everything a completed turn produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    /// Session after the turn (and after the summary, if applied).
    pub session: Session,
    pub user_message: Message,
    pub assistant_message: Message,
    pub prompt_tokens: u32,
    pub summary: SummaryStatus,
}

/// Orchestrates conversations over a document store and a completion endpoint.
///
/// Generic over `DocumentStore` and `CompletionClient` so convo-core never
/// depends on convo-infra.
pub struct ConversationService<D: DocumentStore, C: CompletionClient> {
    store: ConversationStore<D>,
    completion: C,
    options: ConversationConfig,
}

impl<D: DocumentStore, C: CompletionClient> ConversationService<D, C> {
    pub fn new(store: ConversationStore<D>, completion: C, options: ConversationConfig) -> Self {
        Self {
            store,
            completion,
            options,
        }
    }

    /// Access the conversation store.
    pub fn store(&self) -> &ConversationStore<D> {
        &self.store
    }

    /// Access the completion client.
    pub fn completion(&self) -> &C {
        &self.completion
    }

    // --- Session lifecycle ---

    /// Create a new session with zero tokens and the placeholder name.
    pub async fn start_session(
        &self,
        name: Option<String>,
        ctx: &CallContext,
    ) -> Result<Session, ConversationError> {
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_SESSION_NAME.to_string());
        let session = Session::new(name);
        Ok(self.store.create_session(&session, ctx).await?)
    }

    /// Replace the display name of a session.
    #[tracing::instrument(skip(self, ctx), fields(session_id = %session_id))]
    pub async fn rename_session(
        &self,
        session_id: &str,
        name: &str,
        ctx: &CallContext,
    ) -> Result<Session, ConversationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::validation("rename_session", "name must not be empty").into());
        }
        let mut session = self.store.get_session(session_id, ctx).await?;
        session.name = name.to_string();
        let session = self.store.replace_session(&session, ctx).await?;
        info!(session_id = %session_id, "Session renamed");
        Ok(session)
    }

    /// Re-run the summary label for an existing session.
    ///
    /// Unlike the summary step of a turn, failure here is an error.
    #[tracing::instrument(skip(self, ctx), fields(session_id = %session_id))]
    pub async fn summarize_session(
        &self,
        session_id: &str,
        ctx: &CallContext,
    ) -> Result<Session, ConversationError> {
        let session = self.store.get_session(session_id, ctx).await?;
        let messages = self.store.list_messages(session_id, ctx).await?;
        let Some(first) = messages.iter().find(|m| m.sender == Sender::User) else {
            return Err(StoreError::validation(
                "summarize_session",
                format!("session '{session_id}' has no user message to summarize"),
            )
            .into());
        };

        let label = self
            .cancellable(ctx, generate_summary(&self.completion, session_id, &first.text))
            .await
            .map_err(|source| ConversationError::Completion {
                session_id: session_id.to_string(),
                source,
            })?;

        let session = self
            .store
            .replace_session(&Session { name: label, ..session }, ctx)
            .await?;
        info!(session_id = %session_id, name = %session.name, "Session summarized");
        Ok(session)
    }

    /// Delete a session together with all of its messages.
    pub async fn delete_session(
        &self,
        session_id: &str,
        ctx: &CallContext,
    ) -> Result<DeleteReport, ConversationError> {
        Ok(self.store.delete_session_and_messages(session_id, ctx).await?)
    }

    // --- Turns ---

    /// Run one turn: persist the user text, complete, persist the reply.
    #[tracing::instrument(skip(self, text, ctx), fields(session_id = %session_id))]
    pub async fn send_message(
        &self,
        session_id: &str,
        text: &str,
        ctx: &CallContext,
    ) -> Result<TurnOutcome, ConversationError> {
        // Received
        if text.trim().is_empty() {
            return Err(StoreError::validation("send_message", "message text must not be empty").into());
        }
        let session = self.store.get_session(session_id, ctx).await?;
        let history = self.store.list_messages(session_id, ctx).await?;
        // A failed earlier turn can leave a lone user message behind.
        let first_exchange = !history.iter().any(|m| m.sender == Sender::Assistant);

        // Persisted(user)
        let user_message = self
            .store
            .create_message(Message::new(session_id, Sender::User, text, 0), ctx)
            .await?;

        // Completed
        let request = turn_request(session_id, &history, self.options.history_window, text);
        let response = self
            .complete_turn(&request, ctx)
            .await
            .map_err(|source| {
                warn!(session_id = %session_id, error = %source, "Completion failed; user message kept");
                ConversationError::Completion {
                    session_id: session_id.to_string(),
                    source,
                }
            })?;

        // Finalized
        let (session, user_message, assistant_message) = self
            .finalize_turn(session, user_message, &response, ctx)
            .await?;
        info!(
            session_id = %session_id,
            completion_tokens = response.completion_tokens,
            tokens_used = session.tokens_used,
            "Turn persisted"
        );

        let (session, summary) = if first_exchange && self.options.summarize_first_exchange {
            self.apply_first_summary(session, text, ctx).await
        } else {
            (session, SummaryStatus::NotRequested)
        };

        Ok(TurnOutcome {
            session,
            user_message,
            assistant_message,
            prompt_tokens: response.prompt_tokens,
            summary,
        })
    }

    async fn complete_turn(
        &self,
        request: &CompletionRequest,
        ctx: &CallContext,
    ) -> Result<CompletionResponse, CompletionError> {
        let span = info_span!(
            "gen_ai.complete",
            gen_ai.system = self.completion.name(),
            gen_ai.request.model = self.completion.model(),
            gen_ai.request.max_tokens = request.settings.max_tokens,
            gen_ai.request.temperature = request.settings.temperature,
            gen_ai.request.top_p = request.settings.top_p,
            gen_ai.operation.name = "chat",
        );
        self.cancellable(ctx, self.completion.complete(request).instrument(span))
            .await
    }

    /// Write the assistant reply and the new token total as one batch.
    async fn finalize_turn(
        &self,
        session: Session,
        user_message: Message,
        response: &CompletionResponse,
        ctx: &CallContext,
    ) -> Result<(Session, Message, Message), ConversationError> {
        let session_id = session.session_id.clone();
        // Messages are never rewritten, so metered prompt tokens go on the reply.
        let tokens = if self.options.meter_prompt_tokens {
            response.completion_tokens.saturating_add(response.prompt_tokens)
        } else {
            response.completion_tokens
        };
        let assistant = assign_identity(Message::new(
            session_id.as_str(),
            Sender::Assistant,
            response.text.clone(),
            tokens,
        ));
        let items: Vec<Document> = vec![
            assistant.into(),
            Session {
                tokens_used: session.tokens_used.saturating_add(tokens),
                ..session
            }
            .into(),
        ];

        let persist_failed = |source: StoreError| {
            warn!(session_id = %session_id, error = %source, "Completion generated but not persisted");
            ConversationError::PersistCompletion {
                session_id: session_id.clone(),
                text: response.text.clone(),
                completion_tokens: response.completion_tokens,
                source,
            }
        };

        let mut stored = self
            .store
            .upsert_batch(items, ctx)
            .await
            .map_err(persist_failed)?
            .into_iter();

        let pk = user_message.partition_key();
        let assistant = match stored.next() {
            Some(doc) => expect_message("send_message", &pk, doc).map_err(persist_failed)?,
            None => return Err(persist_failed(short_batch(&session_id))),
        };
        let session = match stored.next().and_then(Document::into_session) {
            Some(session) => session,
            None => return Err(persist_failed(short_batch(&session_id))),
        };

        Ok((session, user_message, assistant))
    }

    async fn apply_first_summary(
        &self,
        session: Session,
        prompt: &str,
        ctx: &CallContext,
    ) -> (Session, SummaryStatus) {
        let session_id = session.session_id.clone();
        let label = match self
            .cancellable(ctx, generate_summary(&self.completion, &session_id, prompt))
            .await
        {
            Ok(label) => label,
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "Summary generation failed");
                return (session, SummaryStatus::Failed(err.to_string()));
            }
        };

        let renamed = Session {
            name: label.clone(),
            ..session.clone()
        };
        match self.store.replace_session(&renamed, ctx).await {
            Ok(stored) => {
                info!(session_id = %session_id, name = %label, "Session summarized");
                (stored, SummaryStatus::Applied(label))
            }
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "Summary could not be saved");
                (session, SummaryStatus::Failed(err.to_string()))
            }
        }
    }

    async fn cancellable<T>(
        &self,
        ctx: &CallContext,
        fut: impl std::future::Future<Output = Result<T, CompletionError>>,
    ) -> Result<T, CompletionError> {
        let bounded = async {
            match ctx.timeout {
                Some(timeout) => tokio::time::timeout(timeout, fut).await.unwrap_or_else(|_| {
                    Err(CompletionError::TimedOut {
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    })
                }),
                None => fut.await,
            }
        };
        tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => Err(CompletionError::Cancelled),
            result = bounded => result,
        }
    }
}

fn short_batch(session_id: &str) -> StoreError {
    StoreError::transport(
        "send_message",
        Some(session_id),
        "transactional batch returned fewer documents than staged",
    )
}
