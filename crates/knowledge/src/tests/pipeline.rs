//! End-to-end pipeline scenarios with in-memory collaborators.

use std::sync::Arc;
use std::time::{Duration, Instant};

use docqa_core::config::PipelineSettings;
use docqa_core::{AppError, ErrorKind};

use super::{test_pipeline, ScriptedLlm, StaticSource, ANIMALS};
use crate::embeddings::EmbeddingMode;
use crate::types::{QueryRequest, FALLBACK_PREFIX};

fn request(document: &str, questions: &[&str]) -> QueryRequest {
    QueryRequest {
        document: document.to_string(),
        questions: questions.iter().map(|q| q.to_string()).collect(),
    }
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        request_timeout_ms: 10_000,
        ..PipelineSettings::default()
    }
}

#[tokio::test]
async fn test_answer_prompt_contains_the_retrieved_chunk() {
    let source = Arc::new(StaticSource::new().with("animals.txt", ANIMALS));
    let llm = Arc::new(ScriptedLlm::echo());
    let pipeline = test_pipeline(source, llm, settings());
    assert_eq!(pipeline.settings().request_timeout_ms, 10_000);

    let report = pipeline
        .retrieve("animals.txt", "Are dogs mammals?", pipeline.settings().top_k)
        .await
        .unwrap();
    assert_eq!(report.chunk_count, 1);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].chunk.text, ANIMALS);
    assert_eq!(report.embedding_mode, EmbeddingMode::Lexical);

    let response = pipeline
        .run(request("animals.txt", &["Are dogs mammals?"]))
        .await
        .unwrap();

    assert_eq!(response.answers.len(), 1);
    assert!(response.answers[0].contains(ANIMALS));
    assert!(response.answers[0].contains("Question: Are dogs mammals?"));

    let metadata = &response.metadata;
    assert_eq!(metadata.question_count, 1);
    assert_eq!(metadata.chunk_count, 1);
    assert_eq!(metadata.fallback_count, 0);
    assert_eq!(metadata.embedding_mode, Some(EmbeddingMode::Lexical));
    assert_eq!(metadata.document_fingerprint.as_deref(), Some(report.document_fingerprint.as_str()));
    assert!(!metadata.cache_hit);
    // retrieve() above already indexed the document
    assert!(metadata.index_cache_hit);
}

#[tokio::test]
async fn test_answers_keep_question_order() {
    let source = Arc::new(StaticSource::new().with("animals.txt", ANIMALS));
    let llm = Arc::new(
        ScriptedLlm::echo()
            .delaying("q1 cats?", Duration::from_millis(150))
            .delaying("q3 fish?", Duration::from_millis(60)),
    );
    let pipeline = test_pipeline(source, llm, settings());

    let response = pipeline
        .run(request("animals.txt", &["q1 cats?", "q2 dogs?", "q3 fish?"]))
        .await
        .unwrap();

    assert_eq!(response.answers.len(), 3);
    assert!(response.answers[0].contains("Question: q1 cats?"));
    assert!(response.answers[1].contains("Question: q2 dogs?"));
    assert!(response.answers[2].contains("Question: q3 fish?"));
}

#[tokio::test]
async fn test_exhausted_question_falls_back_alone() {
    let source = Arc::new(StaticSource::new().with("animals.txt", ANIMALS));
    let llm = Arc::new(ScriptedLlm::echo().failing_on("Are dogs mammals?"));
    let pipeline = test_pipeline(source, Arc::clone(&llm), settings());

    let questions = ["Are cats mammals?", "Are dogs mammals?", "Are fish mammals?"];
    let response = pipeline.run(request("animals.txt", &questions)).await.unwrap();

    assert!(!response.answers[0].starts_with(FALLBACK_PREFIX));
    assert!(response.answers[1].starts_with(FALLBACK_PREFIX));
    assert!(response.answers[1].contains("3 attempts"));
    assert!(!response.answers[2].starts_with(FALLBACK_PREFIX));
    assert_eq!(response.metadata.fallback_count, 1);

    // One call each for the good questions, three for the failing one
    assert_eq!(llm.call_count(), 5);

    // Sets with fallbacks are not cached
    let again = pipeline.run(request("animals.txt", &questions)).await.unwrap();
    assert!(!again.metadata.cache_hit);
    assert!(again.metadata.index_cache_hit);
}

#[tokio::test]
async fn test_deadline_turns_unanswered_questions_into_fallbacks() {
    let source = Arc::new(StaticSource::new().with("animals.txt", ANIMALS));
    let llm = Arc::new(
        ScriptedLlm::echo()
            .delaying("slow one?", Duration::from_secs(5))
            .delaying("slow two?", Duration::from_secs(5)),
    );
    let pipeline = test_pipeline(
        source,
        llm,
        PipelineSettings {
            request_timeout_ms: 200,
            ..PipelineSettings::default()
        },
    );

    let started = Instant::now();
    let response = pipeline
        .run(request("animals.txt", &["slow one?", "quick?", "slow two?"]))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(response.answers[0].starts_with(FALLBACK_PREFIX));
    assert!(response.answers[0].contains("deadline"));
    assert!(response.answers[1].contains("Question: quick?"));
    assert!(response.answers[2].starts_with(FALLBACK_PREFIX));
    assert_eq!(response.metadata.fallback_count, 2);
}

#[tokio::test]
async fn test_repeated_request_is_served_from_cache() {
    let source = Arc::new(StaticSource::new().with("animals.txt", ANIMALS));
    let llm = Arc::new(ScriptedLlm::echo());
    let pipeline = test_pipeline(Arc::clone(&source), Arc::clone(&llm), settings());

    let first = pipeline
        .run(request("animals.txt", &["Are dogs mammals?"]))
        .await
        .unwrap();
    assert!(!first.metadata.cache_hit);
    assert!(!first.metadata.index_cache_hit);

    let second = pipeline
        .run(request("animals.txt", &["  are DOGS mammals? "]))
        .await
        .unwrap();
    assert!(second.metadata.cache_hit);
    assert_eq!(second.answers, first.answers);
    assert_ne!(second.metadata.request_id, first.metadata.request_id);
    assert_eq!(llm.call_count(), 1);

    // New questions reuse the index but not the answers
    let third = pipeline
        .run(request("animals.txt", &["Are fish mammals?"]))
        .await
        .unwrap();
    assert!(!third.metadata.cache_hit);
    assert!(third.metadata.index_cache_hit);
    assert_eq!(source.fetch_count(), 1);
    assert_eq!(llm.call_count(), 2);
}

#[tokio::test]
async fn test_concurrent_requests_index_the_document_once() {
    let source = Arc::new(
        StaticSource::new()
            .with("animals.txt", ANIMALS)
            .with_delay(Duration::from_millis(50)),
    );
    let llm = Arc::new(ScriptedLlm::echo());
    let pipeline = test_pipeline(Arc::clone(&source), llm, settings());

    let (a, b, c) = tokio::join!(
        pipeline.run(request("animals.txt", &["Are cats mammals?"])),
        pipeline.run(request("animals.txt", &["Are dogs mammals?"])),
        pipeline.run(request("animals.txt", &["Are fish mammals?"])),
    );

    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(source.fetch_count(), 1);
    assert_eq!(pipeline.cache().stats().indexes.builds_started, 1);
}

#[tokio::test]
async fn test_fetch_failure_surfaces_as_build_failure() {
    let source = Arc::new(StaticSource::new());
    let llm = Arc::new(ScriptedLlm::echo());
    let pipeline = test_pipeline(Arc::clone(&source), llm, settings());

    for _ in 0..2 {
        match pipeline.run(request("missing.txt", &["q?"])).await {
            Err(AppError::CacheBuild { kind, .. }) => assert_eq!(kind, ErrorKind::Fetch),
            other => panic!("expected a build failure, got {:?}", other),
        }
    }

    // Failures are not cached, so each request tried again
    assert_eq!(source.fetch_count(), 2);
    assert_eq!(pipeline.cache().stats().indexes.ready, 0);
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let source = Arc::new(StaticSource::new().with("animals.txt", ANIMALS));
    let llm = Arc::new(ScriptedLlm::echo());
    let pipeline = test_pipeline(
        source,
        llm,
        PipelineSettings {
            max_questions: 2,
            ..settings()
        },
    );

    let cases = [
        request("animals.txt", &[]),
        request("animals.txt", &["a?", "b?", "c?"]),
        request("animals.txt", &["a?", "  "]),
        request("  ", &["a?"]),
    ];

    for case in cases {
        let err = pipeline.run(case).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }
}
