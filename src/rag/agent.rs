use std::sync::Arc;

use futures_util::stream::{self, StreamExt};

use super::context::ContextBuilder;
use crate::core::config::AgentConfig;
use crate::core::errors::AppError;
use crate::embeddings::EmbeddingsProvider;
use crate::llm::{ChatMessage, ChatProvider, ChatRequest};
use crate::store::{Document, VectorStore};

/// Outcome of a bulk ingestion. Failures are per-document and do not stop
/// the rest of the batch.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub stored: usize,
    pub failures: Vec<(String, AppError)>,
}

/// The RAG orchestrator: answers questions against the knowledge base and
/// ingests new documents.
///
/// Holds its three capabilities by injection; composing them is the
/// caller's job (see [`super::compose_agent`]).
pub struct KnowledgeAgent {
    chat_provider: Arc<dyn ChatProvider>,
    embeddings: Arc<dyn EmbeddingsProvider>,
    store: Arc<dyn VectorStore>,
    config: AgentConfig,
    context: ContextBuilder,
    history: Vec<ChatMessage>,
}

impl KnowledgeAgent {
    pub fn new(
        chat_provider: Arc<dyn ChatProvider>,
        embeddings: Arc<dyn EmbeddingsProvider>,
        store: Arc<dyn VectorStore>,
        config: AgentConfig,
    ) -> Self {
        let context = ContextBuilder::new(config.max_context_chars);
        Self {
            chat_provider,
            embeddings,
            store,
            config,
            context,
            history: Vec::new(),
        }
    }

    /// Answer a question: embed it, retrieve context, compose the prompt,
    /// generate, and record the turn.
    pub async fn chat(&mut self, question: &str) -> Result<String, AppError> {
        let request = self.compose(question).await?;
        let answer = self.chat_provider.chat(&request).await?;
        self.remember(question, &answer);
        Ok(answer)
    }

    /// Streaming variant of [`Self::chat`]; `on_token` sees each response
    /// fragment as it arrives and the completed answer is returned.
    pub async fn chat_streaming<F>(
        &mut self,
        question: &str,
        mut on_token: F,
    ) -> Result<String, AppError>
    where
        F: FnMut(&str),
    {
        let request = self.compose(question).await?;
        let mut rx = self.chat_provider.chat_stream(&request).await?;

        let mut answer = String::new();
        while let Some(fragment) = rx.recv().await {
            let fragment = fragment?;
            on_token(&fragment);
            answer.push_str(&fragment);
        }

        self.remember(question, &answer);
        Ok(answer)
    }

    /// Embed and store documents, reusing an embedding when a document
    /// already carries one. Embedding runs with bounded concurrency; one
    /// failed document does not block the rest, and every document is
    /// attempted before the report comes back.
    pub async fn add_documents(&self, documents: Vec<Document>) -> Result<IngestReport, AppError> {
        let concurrency = self.config.ingest_concurrency.max(1);
        let embeddings = &self.embeddings;

        let attempted: Vec<Result<(Document, Vec<f32>), (String, AppError)>> =
            stream::iter(documents.into_iter().map(|mut document| async move {
                match document.embedding.take() {
                    Some(vector) => {
                        document.embedding = Some(vector.clone());
                        Ok((document, vector))
                    }
                    None => match embeddings.embed(&document.content).await {
                        Ok(vector) => {
                            document.embedding = Some(vector.clone());
                            Ok((document, vector))
                        }
                        Err(err) => Err((document.id.clone(), AppError::from(err))),
                    },
                }
            }))
            .buffered(concurrency)
            .collect()
            .await;

        let mut report = IngestReport::default();
        let mut entries = Vec::new();
        for outcome in attempted {
            match outcome {
                Ok(entry) => entries.push(entry),
                Err(failure) => report.failures.push(failure),
            }
        }

        report.stored = entries.len();
        self.store.upsert(entries).await?;

        if !report.failures.is_empty() {
            tracing::warn!(
                "{} document(s) failed to embed, {} stored",
                report.failures.len(),
                report.stored
            );
        }

        Ok(report)
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Prompt order: system instructions, retrieved context, prior turns,
    /// then the current question.
    async fn compose(&self, question: &str) -> Result<ChatRequest, AppError> {
        let query_vector = self.embeddings.embed(question).await?;

        let results = self.store.query(&query_vector, self.config.top_k).await?;
        tracing::debug!("retrieved {} context chunk(s)", results.len());

        let mut messages = Vec::new();
        messages.push(ChatMessage::system(self.config.system_prompt.clone()));
        if let Some(context) = self.context.build(&results) {
            messages.push(ChatMessage::system(context));
        }

        let skip = self.history.len().saturating_sub(self.config.history_limit);
        messages.extend(self.history.iter().skip(skip).cloned());
        messages.push(ChatMessage::user(question));

        Ok(ChatRequest::new(messages))
    }

    fn remember(&mut self, question: &str, answer: &str) {
        self.history.push(ChatMessage::user(question));
        self.history.push(ChatMessage::assistant(answer));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::core::errors::{ProviderError, ProviderErrorKind};
    use crate::llm::Role;
    use crate::store::SearchResult;

    fn agent_config() -> AgentConfig {
        AgentConfig {
            system_prompt: "be helpful".to_string(),
            top_k: 3,
            history_limit: 4,
            max_context_chars: 4000,
            ingest_concurrency: 2,
            streaming: false,
        }
    }

    fn make_document(id: &str, content: &str) -> Document {
        Document {
            id: id.to_string(),
            content: content.to_string(),
            source: "kb.md".to_string(),
            metadata: None,
            embedding: None,
        }
    }

    /// Embeds every text as a fixed vector; texts containing "poison" fail.
    struct FakeEmbeddings;

    #[async_trait]
    impl EmbeddingsProvider for FakeEmbeddings {
        fn name(&self) -> &str {
            "fake"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            if text.contains("poison") {
                return Err(ProviderError::new(
                    "fake",
                    ProviderErrorKind::Server,
                    "refusing poisoned text",
                ));
            }
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            let mut vectors = Vec::with_capacity(texts.len());
            for text in texts {
                vectors.push(self.embed(text).await?);
            }
            Ok(vectors)
        }
    }

    /// Records upserts; `query` returns the canned results.
    #[derive(Default)]
    struct FakeStore {
        canned: Vec<SearchResult>,
        upserts: Mutex<Vec<(Document, Vec<f32>)>>,
    }

    #[async_trait]
    impl VectorStore for FakeStore {
        async fn upsert(&self, entries: Vec<(Document, Vec<f32>)>) -> Result<(), AppError> {
            self.upserts.lock().unwrap().extend(entries);
            Ok(())
        }

        async fn query(&self, _embedding: &[f32], k: usize) -> Result<Vec<SearchResult>, AppError> {
            Ok(self.canned.iter().take(k).cloned().collect())
        }

        async fn delete(&self, _id: &str) -> Result<bool, AppError> {
            Ok(false)
        }

        async fn count(&self) -> Result<usize, AppError> {
            Ok(self.upserts.lock().unwrap().len())
        }
    }

    /// Captures the composed request and answers with a fixed string.
    #[derive(Default)]
    struct FakeChat {
        seen: Mutex<Option<ChatRequest>>,
    }

    #[async_trait]
    impl ChatProvider for FakeChat {
        fn name(&self) -> &str {
            "fake"
        }

        async fn chat(&self, request: &ChatRequest) -> Result<String, ProviderError> {
            *self.seen.lock().unwrap() = Some(request.clone());
            Ok("a canned answer".to_string())
        }

        async fn chat_stream(
            &self,
            request: &ChatRequest,
        ) -> Result<mpsc::Receiver<Result<String, ProviderError>>, ProviderError> {
            *self.seen.lock().unwrap() = Some(request.clone());
            let (tx, rx) = mpsc::channel(4);
            tokio::spawn(async move {
                for piece in ["a canned", " answer"] {
                    if tx.send(Ok(piece.to_string())).await.is_err() {
                        return;
                    }
                }
            });
            Ok(rx)
        }
    }

    fn agent_with(
        chat: Arc<FakeChat>,
        store: Arc<FakeStore>,
    ) -> KnowledgeAgent {
        KnowledgeAgent::new(chat, Arc::new(FakeEmbeddings), store, agent_config())
    }

    #[tokio::test]
    async fn prompt_is_composed_in_fixed_order() {
        let chat = Arc::new(FakeChat::default());
        let store = Arc::new(FakeStore {
            canned: vec![SearchResult {
                document: make_document("c1", "Rust ships a borrow checker."),
                score: 0.9,
            }],
            ..Default::default()
        });
        let mut agent = agent_with(chat.clone(), store);

        agent.chat("an earlier question").await.unwrap();
        let answer = agent.chat("what checks borrows?").await.unwrap();
        assert_eq!(answer, "a canned answer");

        let request = chat.seen.lock().unwrap().clone().unwrap();
        let messages = &request.messages;

        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "be helpful");
        assert_eq!(messages[1].role, Role::System);
        assert!(messages[1].content.contains("borrow checker"));
        assert_eq!(messages[2].content, "an earlier question");
        assert_eq!(messages[3].content, "a canned answer");
        assert_eq!(messages.last().unwrap().role, Role::User);
        assert_eq!(messages.last().unwrap().content, "what checks borrows?");
    }

    #[tokio::test]
    async fn empty_retrieval_still_answers() {
        let chat = Arc::new(FakeChat::default());
        let mut agent = agent_with(chat.clone(), Arc::new(FakeStore::default()));

        let answer = agent.chat("anything at all?").await.unwrap();
        assert_eq!(answer, "a canned answer");

        let request = chat.seen.lock().unwrap().clone().unwrap();
        // System prompt, then straight to the question: no context block.
        assert_eq!(request.messages.len(), 2);
    }

    #[tokio::test]
    async fn history_grows_by_one_turn_per_chat() {
        let chat = Arc::new(FakeChat::default());
        let mut agent = agent_with(chat, Arc::new(FakeStore::default()));

        agent.chat("first").await.unwrap();
        agent.chat("second").await.unwrap();

        let history = agent.history();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[2].content, "second");
    }

    #[tokio::test]
    async fn streaming_collects_the_full_answer() {
        let chat = Arc::new(FakeChat::default());
        let mut agent = agent_with(chat, Arc::new(FakeStore::default()));

        let mut streamed = String::new();
        let answer = agent
            .chat_streaming("question", |token| streamed.push_str(token))
            .await
            .unwrap();

        assert_eq!(answer, "a canned answer");
        assert_eq!(streamed, answer);
        assert_eq!(agent.history().len(), 2);
    }

    #[tokio::test]
    async fn one_poisoned_document_does_not_block_the_rest() {
        let store = Arc::new(FakeStore::default());
        let agent = agent_with(Arc::new(FakeChat::default()), store.clone());

        let report = agent
            .add_documents(vec![
                make_document("d0", "fine text"),
                make_document("d1", "poison text"),
                make_document("d2", "also fine"),
            ])
            .await
            .unwrap();

        assert_eq!(report.stored, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "d1");

        let upserts = store.upserts.lock().unwrap();
        let ids: Vec<&str> = upserts.iter().map(|(d, _)| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d0", "d2"]);
    }

    #[tokio::test]
    async fn existing_embeddings_are_reused() {
        let store = Arc::new(FakeStore::default());
        let agent = agent_with(Arc::new(FakeChat::default()), store.clone());

        // "poison" would fail the fake embedder, so storing this document
        // proves the pre-computed vector was used instead.
        let mut document = make_document("d0", "poison but already embedded");
        document.embedding = Some(vec![0.0, 1.0]);

        let report = agent.add_documents(vec![document]).await.unwrap();
        assert_eq!(report.stored, 1);
        assert!(report.failures.is_empty());

        let upserts = store.upserts.lock().unwrap();
        assert_eq!(upserts[0].1, vec![0.0, 1.0]);
    }
}
