//! End-to-end pipeline tests against deterministic fake providers.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use serde_json::Value;
use tempfile::TempDir;

use pdfchat::chat::{ChatProvider, CompletionError};
use pdfchat::config::Config;
use pdfchat::extract::{extract_text, extract_text_from_bytes};
use pdfchat::embedding::{EmbeddingError, EmbeddingProvider};
use pdfchat::ingest::{ingest_pdf, ingest_pdf_bytes, ingest_text, IngestError};
use pdfchat::models::{ChatMessage, MetadataFilter, Role, SourceType};
use pdfchat::pipeline::Pipeline;
use pdfchat::session::ChatSession;
use pdfchat::stats::collect_stats;
use pdfchat::store::{InMemoryStore, SqliteStore, VectorStore};

/// Character-frequency embedding over 64 buckets.
struct CharEmbedder;

#[async_trait]
impl EmbeddingProvider for CharEmbedder {
    fn model_name(&self) -> &str {
        "char-buckets"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut v = vec![0.0f32; 64];
        for c in text.to_lowercase().chars().filter(|c| !c.is_whitespace()) {
            v[(c as u32 % 64) as usize] += 1.0;
        }
        Ok(v)
    }
}

/// Same vectors as [`CharEmbedder`] under a different model name.
struct RenamedEmbedder(&'static str);

#[async_trait]
impl EmbeddingProvider for RenamedEmbedder {
    fn model_name(&self) -> &str {
        self.0
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        CharEmbedder.embed(text).await
    }
}

/// Records every message list it receives and answers with a counter.
#[derive(Default)]
struct RecordingChat {
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl RecordingChat {
    fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatProvider for RecordingChat {
    fn model_name(&self) -> &str {
        "recording"
    }

    async fn try_complete(&self, messages: &[ChatMessage]) -> Result<String, CompletionError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(messages.to_vec());
        Ok(format!("answer {}", calls.len()))
    }
}

struct FailingChat;

#[async_trait]
impl ChatProvider for FailingChat {
    fn model_name(&self) -> &str {
        "failing"
    }

    async fn try_complete(&self, _messages: &[ChatMessage]) -> Result<String, CompletionError> {
        Err(CompletionError::InvalidResponse("upstream unavailable".into()))
    }
}

/// Build a PDF with one page per entry, each showing its text in Courier.
/// An empty entry becomes a page with an empty content stream.
fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let operations = if text.is_empty() {
            Vec::new()
        } else {
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ]
        };
        let content = Content { operations }.encode().unwrap();
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

async fn memory_pipeline(config: Config, chat: Arc<dyn ChatProvider>) -> Arc<Pipeline> {
    let pipeline = Pipeline::with_components(
        config,
        Arc::new(InMemoryStore::new()),
        Arc::new(CharEmbedder),
        chat,
    )
    .await
    .unwrap();
    Arc::new(pipeline)
}

#[tokio::test]
async fn fixed_width_chunks_are_stored_with_indices() {
    let mut config = Config::minimal();
    config.chunking.chunk_size = 4;
    let pipeline = memory_pipeline(config, Arc::new(RecordingChat::default())).await;

    let report = ingest_text(&pipeline, "letters.pdf", "ABCDEFGHIJ").await.unwrap();
    assert_eq!(report.chunks, 3);
    assert_eq!(report.embedded, 3);
    assert_eq!(report.unchanged, 0);

    let entries = pipeline
        .store()
        .get_all(pipeline.collection())
        .await
        .unwrap();
    let texts: Vec<&str> = entries.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(texts, vec!["ABCD", "EFGH", "IJ"]);

    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.id, format!("pdf:letters.pdf:{}", i));
        assert_eq!(entry.metadata.get("type"), Some(&Value::from("pdf")));
        assert_eq!(entry.metadata.get("chunkIndex"), Some(&Value::from(i as i64)));
        assert_eq!(
            entry.metadata.get("filename"),
            Some(&Value::from("letters.pdf"))
        );
    }
}

#[test]
fn pdf_pages_are_joined_and_blank_pages_skipped() {
    let bytes = pdf_with_pages(&["Alpha", "", "Omega"]);
    assert_eq!(extract_text_from_bytes(&bytes).unwrap(), "Alpha\nOmega\n");

    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("pages.pdf");
    std::fs::write(&path, &bytes).unwrap();
    assert_eq!(extract_text(&path).unwrap(), "Alpha\nOmega\n");
}

#[tokio::test]
async fn uploaded_pdf_is_chunked_with_indices() {
    let mut config = Config::minimal();
    config.chunking.chunk_size = 4;
    let pipeline = memory_pipeline(config, Arc::new(RecordingChat::default())).await;

    let bytes = pdf_with_pages(&["ABCDEFGHIJ"]);
    let report = ingest_pdf_bytes(&pipeline, "letters.pdf", &bytes).await.unwrap();
    assert_eq!(report.chunks, 3);
    assert_eq!(report.embedded, 3);

    let entries = pipeline
        .store()
        .get_all(pipeline.collection())
        .await
        .unwrap();
    let texts: Vec<&str> = entries.iter().map(|e| e.text.as_str()).collect();
    // The page separator newline stays on the last chunk.
    assert_eq!(texts, vec!["ABCD", "EFGH", "IJ\n"]);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.id, format!("pdf:letters.pdf:{}", i));
        assert_eq!(entry.metadata.get("chunkIndex"), Some(&Value::from(i as i64)));
    }
}

#[tokio::test]
async fn reingesting_unchanged_text_skips_embedding() {
    let mut config = Config::minimal();
    config.chunking.chunk_size = 4;
    let pipeline = memory_pipeline(config, Arc::new(RecordingChat::default())).await;

    ingest_text(&pipeline, "letters.pdf", "ABCDEFGHIJ").await.unwrap();
    let again = ingest_text(&pipeline, "letters.pdf", "ABCDEFGHIJ").await.unwrap();
    assert_eq!(again.embedded, 0);
    assert_eq!(again.unchanged, 3);

    let changed = ingest_text(&pipeline, "letters.pdf", "ABCDEFGHXY").await.unwrap();
    assert_eq!(changed.embedded, 1);
    assert_eq!(changed.unchanged, 2);
    assert_eq!(pipeline.store().count(pipeline.collection()).await.unwrap(), 3);
}

#[tokio::test]
async fn changing_embedding_model_reembeds_unchanged_text() {
    let mut config = Config::minimal();
    config.chunking.chunk_size = 4;
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryStore::new());

    let first = Pipeline::with_components(
        config.clone(),
        store.clone(),
        Arc::new(RenamedEmbedder("model-a")),
        Arc::new(RecordingChat::default()),
    )
    .await
    .unwrap();
    ingest_text(&first, "letters.pdf", "ABCDEFGHIJ").await.unwrap();
    let again = ingest_text(&first, "letters.pdf", "ABCDEFGHIJ").await.unwrap();
    assert_eq!(again.unchanged, 3);

    let second = Pipeline::with_components(
        config,
        store.clone(),
        Arc::new(RenamedEmbedder("model-b")),
        Arc::new(RecordingChat::default()),
    )
    .await
    .unwrap();
    let report = ingest_text(&second, "letters.pdf", "ABCDEFGHIJ").await.unwrap();
    assert_eq!(report.embedded, 3);
    assert_eq!(report.unchanged, 0);

    let entries = store.get_all(second.collection()).await.unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries
        .iter()
        .all(|e| e.metadata.get("embeddingModel") == Some(&Value::from("model-b"))));
}

#[tokio::test]
async fn empty_store_sends_only_the_user_message() {
    let chat = Arc::new(RecordingChat::default());
    let pipeline = memory_pipeline(Config::minimal(), chat.clone()).await;
    let question = "주문 취소는 어떻게 하나요?";

    let context = pipeline.assembler().assemble(question).await.unwrap();
    assert!(context.pdf_chunks.is_empty());
    assert!(context.conversation_history.is_empty());
    assert_eq!(context.context_text, "");

    let mut session = ChatSession::new(pipeline.clone());
    let outcome = session.ask(question).await.unwrap();
    assert!(outcome.completed);
    assert!(outcome.context.is_empty());

    let calls = chat.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], vec![ChatMessage::user(question)]);
}

#[tokio::test]
async fn logged_turn_is_recalled_by_similar_query() {
    let pipeline = memory_pipeline(Config::minimal(), Arc::new(RecordingChat::default())).await;
    let user = "how do I cancel my order";

    pipeline
        .logger()
        .log_turn(user, "open the order page and press cancel")
        .await
        .unwrap();

    let query_vec = pipeline.embedder().embed(user).await.unwrap();
    let filter = MetadataFilter::source_type(SourceType::Conversation);
    let hits = pipeline
        .store()
        .query(pipeline.collection(), &query_vec, 3, Some(&filter))
        .await
        .unwrap();
    assert!(hits.iter().any(|h| h.text == user));
    assert_eq!(hits[0].text, user);
}

#[tokio::test]
async fn at_most_one_system_message_across_turns() {
    let chat = Arc::new(RecordingChat::default());
    let pipeline = memory_pipeline(Config::minimal(), chat.clone()).await;
    ingest_text(
        &pipeline,
        "manual.pdf",
        "Orders can be cancelled before shipment from the order detail page.",
    )
    .await
    .unwrap();

    let mut session = ChatSession::new(pipeline.clone());
    for question in [
        "how do I cancel an order",
        "what about after shipment",
        "where is the order detail page",
        "thanks",
    ] {
        session.ask(question).await.unwrap();
        let systems = session
            .messages()
            .iter()
            .filter(|m| m.role == Role::System)
            .count();
        assert!(systems <= 1, "transcript has {} system messages", systems);
    }

    for call in chat.calls() {
        let systems: Vec<usize> = call
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role == Role::System)
            .map(|(i, _)| i)
            .collect();
        assert!(systems.len() <= 1);
        if let Some(&pos) = systems.first() {
            // The context message sits directly before the new user message.
            assert_eq!(pos, call.len() - 2);
        }
        assert_eq!(call.last().map(|m| m.role), Some(Role::User));
    }

    // Later turns see earlier answers as conversation history.
    let stats = pipeline.logger().get_stats().await.unwrap();
    assert_eq!(stats.user_messages, 4);
    assert_eq!(stats.assistant_messages, 4);
    let last = chat.calls().pop().unwrap();
    assert!(last[last.len() - 2].content.contains("[Conversation history]"));
}

#[tokio::test]
async fn failed_completion_is_shown_but_not_logged() {
    let pipeline = memory_pipeline(Config::minimal(), Arc::new(FailingChat)).await;
    let mut session = ChatSession::new(pipeline.clone());

    let outcome = session.ask("hello").await.unwrap();
    assert!(!outcome.completed);
    assert!(!outcome.logged);
    assert_eq!(outcome.reply, "Error: invalid chat response: upstream unavailable");
    assert_eq!(
        session.messages().last(),
        Some(&ChatMessage::assistant(outcome.reply.clone()))
    );

    let stats = pipeline.logger().get_stats().await.unwrap();
    assert_eq!(stats.total, 0);
}

#[tokio::test]
async fn reset_clears_transcript_only() {
    let pipeline = memory_pipeline(Config::minimal(), Arc::new(RecordingChat::default())).await;
    let mut session = ChatSession::new(pipeline.clone());
    session.ask("first question").await.unwrap();
    assert_eq!(session.messages().len(), 2);

    session.reset();
    assert!(session.messages().is_empty());
    assert_eq!(pipeline.logger().get_stats().await.unwrap().total, 2);
}

#[tokio::test]
async fn invalid_pdf_is_an_extraction_error() {
    let pipeline = memory_pipeline(Config::minimal(), Arc::new(RecordingChat::default())).await;

    let err = ingest_pdf_bytes(&pipeline, "broken.pdf", b"definitely not a pdf")
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Extraction(_)));

    let tmp = TempDir::new().unwrap();
    let err = ingest_pdf(&pipeline, &tmp.path().join("missing.pdf"))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Extraction(_)));
    assert_eq!(pipeline.store().count(pipeline.collection()).await.unwrap(), 0);
}

#[tokio::test]
async fn sqlite_pipeline_round_trip() {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::minimal();
    config.store.path = tmp.path().join("data/pdfchat.sqlite");
    config.chunking.chunk_size = 40;

    let chat = Arc::new(RecordingChat::default());
    {
        let store = SqliteStore::open(&config).await.unwrap();
        let pipeline = Arc::new(
            Pipeline::with_components(config.clone(), Arc::new(store), Arc::new(CharEmbedder), chat.clone())
                .await
                .unwrap(),
        );
        ingest_text(
            &pipeline,
            "faq.pdf",
            "To cancel an order, open the order detail page. Refunds take three business days.",
        )
        .await
        .unwrap();

        let mut session = ChatSession::new(pipeline.clone());
        let outcome = session.ask("how do I cancel an order").await.unwrap();
        assert!(outcome.logged);
        assert!(!outcome.context.pdf_chunks.is_empty());
        pipeline.close().await;
    }

    let store = SqliteStore::open(&config).await.unwrap();
    let collection = store.ensure_collection("documents").await.unwrap();
    let stats = collect_stats(&store, &collection).await.unwrap();
    assert_eq!(stats.pdf_files, 1);
    assert_eq!(stats.pdf_chunks, 3);
    assert_eq!(stats.conversation.user_messages, 1);
    assert_eq!(stats.conversation.assistant_messages, 1);
    store.close().await;

    let first_call = &chat.calls()[0];
    assert_eq!(first_call[0].role, Role::System);
}
