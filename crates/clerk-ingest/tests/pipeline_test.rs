//! End-to-end pipeline behavior against the in-memory store and a scripted
//! extraction backend.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use clerk_core::{Error, InputType, Owner, TaskPriority, UserSettings};
use clerk_inference::mock::MockExtractionBackend;
use clerk_inference::{BackendKind, BackendSelector};
use clerk_ingest::{IngestionPipeline, IngestionState, MemoryStore, PipelineConfig};

const AWS_INPUT: &str = "Meeting with AWS tomorrow 2pm, high priority";
const AWS_RESPONSE: &str =
    r#"[{"title":"Meeting with AWS","priority":"HIGH","category":"Meeting","tags":["aws"]}]"#;

fn pipeline_with(store: &MemoryStore, backend: MockExtractionBackend) -> IngestionPipeline {
    let selector =
        BackendSelector::new(BackendKind::Ollama).with_backend(BackendKind::Ollama, Arc::new(backend));
    IngestionPipeline::new(Arc::new(store.clone()), selector)
}

fn owner(store: &MemoryStore) -> Owner {
    store.add_owner("ann", UserSettings::default())
}

// =============================================================================
// EXTRACTED PATH
// =============================================================================

#[tokio::test]
async fn test_aws_meeting_example() {
    let store = MemoryStore::new();
    let owner = owner(&store);
    let pipeline = pipeline_with(&store, MockExtractionBackend::new().with_fixed_response(AWS_RESPONSE));

    let tasks = pipeline.ingest(owner.id, AWS_INPUT).await.unwrap();

    assert_eq!(tasks.len(), 1);
    let task = &tasks[0];
    assert_eq!(task.title, "Meeting with AWS");
    assert_eq!(task.priority, TaskPriority::High);
    assert_eq!(task.category.name, "Meeting");
    assert!(!task.category.is_default);
    assert_eq!(task.tag_names(), vec!["aws"]);
    assert_eq!(task.original_input_text.as_deref(), Some(AWS_INPUT));
    assert_eq!(task.owner_id, owner.id);
    assert!(!task.completed);
}

#[tokio::test]
async fn test_task_count_matches_array_length_in_order() {
    let store = MemoryStore::new();
    let owner = owner(&store);
    let response = r#"[
        {"title": "Book flights", "dueDate": "2026-11-02T09:00:00Z", "priority": "urgent"},
        {"title": "Renew passport", "description": "Before the trip", "tags": "travel, documents"},
        {"title": "Pack", "category": "Travel"}
    ]"#;
    let pipeline = pipeline_with(&store, MockExtractionBackend::new().with_fixed_response(response));

    let tasks = pipeline.ingest(owner.id, "trip prep").await.unwrap();

    let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["Book flights", "Renew passport", "Pack"]);

    assert_eq!(tasks[0].priority, TaskPriority::Urgent);
    assert_eq!(
        tasks[0].due_date.map(|d| d.to_rfc3339()),
        Some("2026-11-02T09:00:00+00:00".to_string())
    );
    assert_eq!(tasks[1].priority, TaskPriority::Medium);
    assert_eq!(tasks[1].description, "Before the trip");
    assert_eq!(tasks[1].tag_names(), vec!["travel", "documents"]);
    assert_eq!(tasks[1].category.name, "General");
    assert!(tasks[1].category.is_default);
    assert_eq!(tasks[2].category.name, "Travel");
    assert!(tasks[2].due_date.is_none());

    assert_eq!(store.tasks().len(), 3);
}

#[tokio::test]
async fn test_fenced_response_parses_like_bare_array() {
    let fenced = format!("Here you go:\n```json\n{}\n```\nAnything else?", AWS_RESPONSE);

    let bare_store = MemoryStore::new();
    let bare_owner = owner(&bare_store);
    let bare = pipeline_with(&bare_store, MockExtractionBackend::new().with_fixed_response(AWS_RESPONSE))
        .ingest(bare_owner.id, AWS_INPUT)
        .await
        .unwrap();

    let fenced_store = MemoryStore::new();
    let fenced_owner = owner(&fenced_store);
    let report = pipeline_with(&fenced_store, MockExtractionBackend::new().with_fixed_response(fenced))
        .ingest_detailed(fenced_owner.id, AWS_INPUT, InputType::Text)
        .await
        .unwrap();

    assert!(!report.is_degraded());
    assert_eq!(report.tasks.len(), bare.len());
    for (a, b) in report.tasks.iter().zip(bare.iter()) {
        assert_eq!(a.title, b.title);
        assert_eq!(a.priority, b.priority);
        assert_eq!(a.category.name, b.category.name);
        assert_eq!(a.tag_names(), b.tag_names());
        assert_eq!(a.description, b.description);
    }
}

#[tokio::test]
async fn test_extracted_transitions_and_audit() {
    let store = MemoryStore::new();
    let owner = owner(&store);
    let backend = MockExtractionBackend::new()
        .with_identity("ollama", "llama2")
        .with_fixed_response(AWS_RESPONSE);
    let pipeline = pipeline_with(&store, backend);

    let report = pipeline
        .ingest_detailed(owner.id, AWS_INPUT, InputType::Text)
        .await
        .unwrap();

    assert_eq!(
        report.transitions,
        vec![
            IngestionState::Received,
            IngestionState::Extracting,
            IngestionState::Extracted,
            IngestionState::Materialized,
        ]
    );

    let audit = &report.processing_result;
    assert_eq!(audit.raw_input_id, report.raw_input.id);
    assert_eq!(audit.ai_model_used, "ollama:llama2");
    assert_eq!(audit.confidence_score, 0.85);
    assert!(!audit.degraded);
    assert!(audit.failure_reason.is_none());
    assert!(audit.processing_time_ms >= 0);

    let processed: serde_json::Value = serde_json::from_str(&audit.processed_content).unwrap();
    assert_eq!(processed[0]["title"], "Meeting with AWS");
    let entities: serde_json::Value =
        serde_json::from_str(audit.extracted_entities.as_deref().unwrap()).unwrap();
    assert_eq!(entities["categories"], serde_json::json!(["Meeting"]));
    assert_eq!(entities["tags"], serde_json::json!(["aws"]));

    assert_eq!(store.processing_results().len(), 1);
}

#[tokio::test]
async fn test_raw_input_links_generated_tasks() {
    let store = MemoryStore::new();
    let owner = owner(&store);
    let response = r#"[{"title":"One"},{"title":"Two"}]"#;
    let pipeline = pipeline_with(&store, MockExtractionBackend::new().with_fixed_response(response));

    let report = pipeline
        .ingest_detailed(owner.id, "one and two", InputType::Text)
        .await
        .unwrap();

    let task_ids: Vec<Uuid> = report.tasks.iter().map(|t| t.id).collect();
    assert_eq!(report.raw_input.generated_task_ids, task_ids);
    for task in &report.tasks {
        assert_eq!(task.raw_input_id, Some(report.raw_input.id));
    }

    let stored = store.raw_inputs();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].generated_task_ids, task_ids);
    assert_eq!(stored[0].content, "one and two");
}

#[tokio::test]
async fn test_voice_input_type_recorded() {
    let store = MemoryStore::new();
    let owner = owner(&store);
    let pipeline = pipeline_with(&store, MockExtractionBackend::new().with_fixed_response(AWS_RESPONSE));

    let tasks = pipeline
        .ingest_with_type(owner.id, AWS_INPUT, InputType::Voice)
        .await
        .unwrap();

    assert_eq!(tasks.len(), 1);
    assert_eq!(store.raw_inputs()[0].input_type, InputType::Voice);
}

// =============================================================================
// DEGRADED PATH
// =============================================================================

#[tokio::test]
async fn test_unreachable_backend_degrades_to_single_task() {
    let store = MemoryStore::new();
    let owner = owner(&store);
    let pipeline = pipeline_with(
        &store,
        MockExtractionBackend::new().with_failure("connection refused"),
    );
    let input = format!("Call the Contractor about the kitchen {}", "and more ".repeat(20));

    let report = pipeline
        .ingest_detailed(owner.id, &input, InputType::Text)
        .await
        .unwrap();

    assert!(report.is_degraded());
    assert_eq!(
        report.transitions,
        vec![
            IngestionState::Received,
            IngestionState::Extracting,
            IngestionState::Degraded,
            IngestionState::Materialized,
        ]
    );

    assert_eq!(report.tasks.len(), 1);
    let task = &report.tasks[0];
    assert_eq!(task.description, input);
    assert_eq!(task.title.chars().count(), 100);
    assert!(task.title.ends_with("..."));
    assert!(task.title.starts_with("Call the Contractor about the kitchen"));
    assert_eq!(task.priority, TaskPriority::Medium);
    assert_eq!(task.category.name, "General");
    assert_eq!(task.category.color, "#808080");
    assert!(task.category.is_default);
    assert_eq!(task.tag_names(), vec!["Contractor"]);

    let due = task.due_date.unwrap();
    let reminder = task.reminder_time.unwrap();
    assert_eq!(due - reminder, chrono::Duration::minutes(15));
    assert_eq!(
        due - report.raw_input.created_at_utc,
        chrono::Duration::hours(24)
    );

    let audit = &report.processing_result;
    assert!(audit.degraded);
    assert_eq!(audit.confidence_score, 0.0);
    assert!(audit
        .failure_reason
        .as_deref()
        .unwrap()
        .contains("connection refused"));
}

#[tokio::test]
async fn test_short_input_title_not_truncated() {
    let store = MemoryStore::new();
    let owner = owner(&store);
    let pipeline = pipeline_with(&store, MockExtractionBackend::new().with_failure("down"));

    let tasks = pipeline.ingest(owner.id, "buy milk").await.unwrap();

    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "buy milk");
    assert_eq!(tasks[0].description, "buy milk");
}

#[tokio::test]
async fn test_unparseable_response_degrades() {
    let store = MemoryStore::new();
    let owner = owner(&store);
    let backend = MockExtractionBackend::new()
        .with_fixed_response("Sorry, I could not find any tasks in that text.");
    let pipeline = pipeline_with(&store, backend.clone());

    let report = pipeline
        .ingest_detailed(owner.id, "remind me to water plants", InputType::Text)
        .await
        .unwrap();

    assert!(report.is_degraded());
    assert_eq!(report.tasks.len(), 1);
    assert_eq!(report.tasks[0].description, "remind me to water plants");
    assert!(report
        .processing_result
        .failure_reason
        .as_deref()
        .unwrap()
        .starts_with("Malformed extraction"));
    // No retry against the backend.
    assert_eq!(backend.call_count(), 1);
}

#[tokio::test]
async fn test_empty_array_degrades() {
    let store = MemoryStore::new();
    let owner = owner(&store);
    let pipeline = pipeline_with(&store, MockExtractionBackend::new().with_fixed_response("[]"));

    let tasks = pipeline.ingest(owner.id, "something to do").await.unwrap();

    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].description, "something to do");
}

#[tokio::test]
async fn test_partially_valid_array_keeps_good_elements() {
    let store = MemoryStore::new();
    let owner = owner(&store);
    let response = r#"[{"title":"Keep me"},{"description":"no title"},{"title":"  "},{"title":"Me too"}]"#;
    let pipeline = pipeline_with(&store, MockExtractionBackend::new().with_fixed_response(response));

    let report = pipeline
        .ingest_detailed(owner.id, "mixed", InputType::Text)
        .await
        .unwrap();

    assert!(!report.is_degraded());
    let titles: Vec<&str> = report.tasks.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["Keep me", "Me too"]);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_backend_times_out_and_degrades() {
    let store = MemoryStore::new();
    let owner = owner(&store);
    let pipeline = pipeline_with(&store, MockExtractionBackend::new().hanging())
        .with_config(PipelineConfig::default().with_extraction_timeout(Duration::from_secs(2)));

    let report = pipeline
        .ingest_detailed(owner.id, "follow up with finance", InputType::Text)
        .await
        .unwrap();

    assert!(report.is_degraded());
    assert_eq!(report.tasks.len(), 1);
    let reason = report.processing_result.failure_reason.unwrap();
    assert!(reason.starts_with("Backend unavailable"));
    assert!(reason.contains("timed out"));
}

#[tokio::test]
async fn test_no_registered_backend_degrades() {
    let store = MemoryStore::new();
    let owner = owner(&store);
    let pipeline = IngestionPipeline::new(
        Arc::new(store.clone()),
        BackendSelector::new(BackendKind::Ollama),
    );

    let report = pipeline
        .ingest_detailed(owner.id, "anything", InputType::Text)
        .await
        .unwrap();

    assert!(report.is_degraded());
    assert_eq!(report.processing_result.ai_model_used, "none");
    assert_eq!(report.tasks.len(), 1);
}

// =============================================================================
// REJECTED INPUT
// =============================================================================

#[tokio::test]
async fn test_unknown_owner_aborts_before_any_write() {
    let store = MemoryStore::new();
    let backend = MockExtractionBackend::new().with_fixed_response(AWS_RESPONSE);
    let pipeline = pipeline_with(&store, backend.clone());
    let missing = Uuid::new_v4();

    let err = pipeline.ingest(missing, AWS_INPUT).await.unwrap_err();

    assert!(matches!(err, Error::OwnerNotFound(id) if id == missing));
    assert!(store.raw_inputs().is_empty());
    assert!(store.processing_results().is_empty());
    assert!(store.tasks().is_empty());
    assert!(store.categories(missing).is_empty());
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_blank_input_rejected() {
    let store = MemoryStore::new();
    let owner = owner(&store);
    let backend = MockExtractionBackend::new();
    let pipeline = pipeline_with(&store, backend.clone());

    let err = pipeline.ingest(owner.id, "  \n\t ").await.unwrap_err();

    assert!(matches!(err, Error::InvalidInput(_)));
    assert!(store.raw_inputs().is_empty());
    assert_eq!(backend.call_count(), 0);
}

// =============================================================================
// CATEGORY / TAG RESOLUTION
// =============================================================================

#[tokio::test]
async fn test_category_reused_across_calls() {
    let store = MemoryStore::new();
    let owner = owner(&store);
    let pipeline = pipeline_with(&store, MockExtractionBackend::new().with_fixed_response(AWS_RESPONSE));

    let first = pipeline.ingest(owner.id, AWS_INPUT).await.unwrap();
    let second = pipeline.ingest(owner.id, AWS_INPUT).await.unwrap();

    assert_eq!(first[0].category.id, second[0].category.id);
    assert_eq!(first[0].tags[0].id, second[0].tags[0].id);

    let meeting: Vec<_> = store
        .categories(owner.id)
        .into_iter()
        .filter(|c| c.name == "Meeting")
        .collect();
    assert_eq!(meeting.len(), 1);
    assert_eq!(store.tags(owner.id).len(), 1);
}

#[tokio::test]
async fn test_default_category_created_once() {
    let store = MemoryStore::new();
    let owner = owner(&store);
    let pipeline = pipeline_with(&store, MockExtractionBackend::new().with_failure("down"));

    let first = pipeline.ingest(owner.id, "first").await.unwrap();
    let second = pipeline.ingest(owner.id, "second").await.unwrap();

    assert_eq!(first[0].category.id, second[0].category.id);
    let defaults: Vec<_> = store
        .categories(owner.id)
        .into_iter()
        .filter(|c| c.is_default)
        .collect();
    assert_eq!(defaults.len(), 1);
}

#[tokio::test]
async fn test_invented_category_gets_deterministic_color() {
    let store = MemoryStore::new();
    let owner = owner(&store);
    let pipeline = pipeline_with(&store, MockExtractionBackend::new().with_fixed_response(AWS_RESPONSE));

    let tasks = pipeline.ingest(owner.id, AWS_INPUT).await.unwrap();

    assert_eq!(tasks[0].category.color, clerk_ingest::category_color("Meeting"));
    assert_eq!(tasks[0].category.icon, "folder");
}

#[tokio::test]
async fn test_categories_are_per_owner() {
    let store = MemoryStore::new();
    let ann = store.add_owner("ann", UserSettings::default());
    let bob = store.add_owner("bob", UserSettings::default());
    let pipeline = pipeline_with(&store, MockExtractionBackend::new().with_fixed_response(AWS_RESPONSE));

    let a = pipeline.ingest(ann.id, AWS_INPUT).await.unwrap();
    let b = pipeline.ingest(bob.id, AWS_INPUT).await.unwrap();

    assert_ne!(a[0].category.id, b[0].category.id);
    assert_eq!(b[0].category.owner_id, bob.id);
}

#[tokio::test]
async fn test_create_conflict_recovers_with_existing_rows() {
    let store = MemoryStore::new();
    let owner = owner(&store);
    let pipeline = pipeline_with(&store, MockExtractionBackend::new().with_fixed_response(AWS_RESPONSE));
    // Both the category and the tag lose to a concurrent writer.
    store.simulate_create_races(2);

    let tasks = pipeline.ingest(owner.id, AWS_INPUT).await.unwrap();

    let categories = store.categories(owner.id);
    assert_eq!(categories.len(), 1);
    assert_eq!(tasks[0].category.id, categories[0].id);

    let tags = store.tags(owner.id);
    assert_eq!(tags.len(), 1);
    assert_eq!(tasks[0].tags[0].id, tags[0].id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ingestion_shares_new_category() {
    let store = MemoryStore::new();
    let owner = owner(&store);
    let backend = MockExtractionBackend::new()
        .with_fixed_response(r#"[{"title":"Task","category":"Errands","tags":["shop","errand"]}]"#)
        .with_latency(Duration::from_millis(5));
    let pipeline = Arc::new(pipeline_with(&store, backend));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let pipeline = Arc::clone(&pipeline);
            let owner_id = owner.id;
            tokio::spawn(async move { pipeline.ingest(owner_id, &format!("errand {}", i)).await })
        })
        .collect();

    let mut category_ids = Vec::new();
    for handle in handles {
        let tasks = handle.await.unwrap().unwrap();
        assert_eq!(tasks.len(), 1);
        category_ids.push(tasks[0].category.id);
    }

    category_ids.dedup();
    assert_eq!(category_ids.len(), 1);

    let errands: Vec<_> = store
        .categories(owner.id)
        .into_iter()
        .filter(|c| c.name == "Errands")
        .collect();
    assert_eq!(errands.len(), 1);
    assert_eq!(store.tags(owner.id).len(), 2);
    assert_eq!(store.tasks().len(), 8);
    assert_eq!(store.raw_inputs().len(), 8);
}

// =============================================================================
// BACKEND SELECTION AND LOCALE
// =============================================================================

#[tokio::test]
async fn test_owner_preference_selects_backend() {
    let store = MemoryStore::new();
    let ollama = MockExtractionBackend::new()
        .with_identity("ollama", "llama2")
        .with_fixed_response(AWS_RESPONSE);
    let qianwen = MockExtractionBackend::new()
        .with_identity("qianwen", "qwen-max")
        .with_fixed_response(AWS_RESPONSE);
    let selector = BackendSelector::new(BackendKind::Ollama)
        .with_backend(BackendKind::Ollama, Arc::new(ollama.clone()))
        .with_backend(BackendKind::Qianwen, Arc::new(qianwen.clone()));
    let pipeline = IngestionPipeline::new(Arc::new(store.clone()), selector);

    let qwen_owner = store.add_owner(
        "li",
        UserSettings {
            ai_model: Some("qwen".to_string()),
            preferred_language: None,
        },
    );
    let report = pipeline
        .ingest_detailed(qwen_owner.id, AWS_INPUT, InputType::Text)
        .await
        .unwrap();
    assert_eq!(report.processing_result.ai_model_used, "qianwen:qwen-max");
    assert_eq!(qianwen.call_count(), 1);
    assert_eq!(ollama.call_count(), 0);

    // Unknown preference falls back to the default kind.
    let other = store.add_owner(
        "sam",
        UserSettings {
            ai_model: Some("claude".to_string()),
            preferred_language: None,
        },
    );
    let report = pipeline
        .ingest_detailed(other.id, AWS_INPUT, InputType::Text)
        .await
        .unwrap();
    assert_eq!(report.processing_result.ai_model_used, "ollama:llama2");
    assert_eq!(ollama.call_count(), 1);
}

#[tokio::test]
async fn test_explicit_backend_bypasses_selector() {
    let store = MemoryStore::new();
    let owner = owner(&store);
    let pipeline = IngestionPipeline::new(
        Arc::new(store.clone()),
        BackendSelector::new(BackendKind::Ollama),
    );
    let backend = MockExtractionBackend::new()
        .with_identity("openai", "gpt-4o-mini")
        .with_fixed_response(AWS_RESPONSE);

    let report = pipeline
        .ingest_with_backend(owner.id, AWS_INPUT, InputType::Text, Arc::new(backend))
        .await
        .unwrap();

    assert!(!report.is_degraded());
    assert_eq!(report.processing_result.ai_model_used, "openai:gpt-4o-mini");
}

#[tokio::test]
async fn test_preferred_language_selects_prompt_locale() {
    let store = MemoryStore::new();
    let backend = MockExtractionBackend::new().with_fixed_response(AWS_RESPONSE);
    let pipeline = pipeline_with(&store, backend.clone());

    let zh = store.add_owner(
        "wang",
        UserSettings {
            ai_model: None,
            preferred_language: Some("zh-CN".to_string()),
        },
    );
    let en = owner(&store);

    pipeline.ingest(zh.id, "明天下午两点开会").await.unwrap();
    pipeline.ingest(en.id, "meeting at 2pm").await.unwrap();

    let prompts = backend.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].ends_with("文本：明天下午两点开会"));
    assert!(prompts[1].ends_with("Text: meeting at 2pm"));
    for prompt in &prompts {
        assert!(prompt.contains(clerk_inference::SCHEMA_CONTRACT));
    }
}
