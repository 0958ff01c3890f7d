//! Concurrent requests against one shared service.

use std::sync::Arc;

use gec::{CorrectionRequest, CorrectionService, GecConfig, ScriptedGenerator};

const SENTENCES: [&str; 16] = [
    "She go to school yesterday.",
    "He have three cats at home.",
    "They was late for the meeting.",
    "I am agree with your opinion.",
    "We discussed about the project.",
    "My brother don't like vegetables.",
    "The childs played in the garden.",
    "Can you explain me this problem?",
    "Neither of them know the answer.",
    "Please borrow me your pencil.",
    "Our teacher gave us many homeworks.",
    "It depends of the weather tomorrow.",
    "Everybody have finished their lunch.",
    "The informations were very useful.",
    "Since two years I live in Berlin.",
    "He suggested me to take a taxi.",
];

fn shared_service(generator: Arc<ScriptedGenerator>) -> Arc<CorrectionService> {
    let mut cfg = GecConfig::default();
    cfg.embedding.dimension = 128;
    cfg.support_index.path = None;
    cfg.cache.path = None;
    Arc::new(CorrectionService::from_config_with_generator(&cfg, generator).unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_distinct_requests_all_complete() {
    let generator = Arc::new(ScriptedGenerator::repeating(
        r#"{"reasoning":"ok","correction":"Fixed sentence."}"#,
    ));
    let service = shared_service(generator.clone());

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service.correct(CorrectionRequest::new(SENTENCES[i])).await
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.input, SENTENCES[i]);
        assert_eq!(result.correction, "Fixed sentence.");
    }

    let metrics = service.metrics();
    assert_eq!((metrics.hits, metrics.misses), (0, 16));
    assert_eq!(generator.calls(), 16);
    assert_eq!(service.cache().len(), 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn blocking_fallback_does_not_stall_other_requests() {
    let generator = Arc::new(
        ScriptedGenerator::repeating(r#"{"reasoning":"ok","correction":"Done."}"#)
            .with_async_failures(4),
    );
    let service = shared_service(generator.clone());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service.correct(CorrectionRequest::new(SENTENCES[i])).await
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().correction, "Done.");
    }
    assert_eq!(generator.blocking_calls(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_see_whole_snapshots_during_writes() {
    let generator = Arc::new(ScriptedGenerator::repeating(
        r#"{"reasoning":"ok","correction":"Done."}"#,
    ));
    let service = shared_service(generator);
    let cache = Arc::clone(service.cache());

    let writer = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            for i in 0..50 {
                let result = gec::CorrectionResult {
                    input: format!("entry {i}"),
                    reasoning: String::new(),
                    correction: format!("Entry {i}."),
                    error_type: None,
                };
                cache.upsert(&result.input, &result).await.unwrap();
            }
        })
    };

    let reader = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            for _ in 0..200 {
                let snapshot = cache.index().snapshot();
                assert_eq!(snapshot.matrix().nrows(), snapshot.metadata().len());
                tokio::task::yield_now().await;
            }
        })
    };

    writer.await.unwrap();
    reader.await.unwrap();
    assert_eq!(cache.len(), 50);
}
