mod common;

use assert_matches::assert_matches;
use common::{chipmunk_file, TEN_EVENT_FILE};
use futures::TryStreamExt;
use replay_engine::config::{LocalSourceConfig, ObjectStorageConfig, SourceConfig, SourceType};
use replay_engine::domain_types::{EventRecord, EventType};
use replay_engine::source::{self, parser::event_stream, EventSource, LocalFileSource, SourceError};
use std::io::Cursor;

async fn collect(source: &dyn EventSource) -> Vec<EventRecord> {
    source.open().await.unwrap().try_collect().await.unwrap()
}

#[tokio::test]
async fn test_ten_event_file_classification() {
    let file = chipmunk_file(TEN_EVENT_FILE);
    let source = LocalFileSource::new(file.path());

    assert_eq!(source.count().await.unwrap(), Some(10));

    let events = collect(&source).await;
    assert_eq!(events.len(), 10);

    let count_of = |event_type| events.iter().filter(|e| e.event_type() == event_type).count();
    assert_eq!(count_of(EventType::Trade), 4);
    assert_eq!(count_of(EventType::MarketData), 3);
    assert_eq!(count_of(EventType::FxRate), 3);

    // 同時帶成交識別與貨幣對的記錄歸為成交
    assert!(events[6].payload().contains("T003"));
    assert_eq!(events[6].event_type(), EventType::Trade);

    // 缺少地區時為 UNKNOWN
    assert_eq!(events[7].region(), "UNKNOWN");
}

#[tokio::test]
async fn test_sequence_numbers_are_gapless_and_start_at_one() {
    let content = [
        r#"{"trade_id": "T1"}"#,
        "invalid json line",
        "",
        "# comment line",
        r#"{"symbol": "AAPL", "price": 1.0}"#,
        "{ incomplete json",
        "[1, 2]",
        r#"{"base_currency": "USD"}"#,
    ]
    .join("\n");
    let file = chipmunk_file(&content);
    let source = LocalFileSource::new(file.path());

    let events = collect(&source).await;
    let sequences: Vec<u64> = events.iter().map(EventRecord::sequence_number).collect();
    assert_eq!(sequences, vec![1, 2, 3]);

    let ids: std::collections::HashSet<&str> = events.iter().map(EventRecord::id).collect();
    assert_eq!(ids.len(), 3);
}

#[tokio::test]
async fn test_each_open_restarts_from_the_beginning() {
    let file = chipmunk_file(TEN_EVENT_FILE);
    let source = LocalFileSource::new(file.path());

    let first = collect(&source).await;
    let second = collect(&source).await;
    assert_eq!(first.len(), second.len());
    assert_eq!(second[0].sequence_number(), 1);
    assert_eq!(first[0].payload(), second[0].payload());
}

#[tokio::test]
async fn test_file_and_stream_backends_agree() {
    // 物件儲存來源使用相同的串流解析，對相同內容結果一致
    let file = chipmunk_file(TEN_EVENT_FILE);
    let from_file = collect(&LocalFileSource::new(file.path())).await;
    let from_bytes: Vec<EventRecord> = event_stream(Cursor::new(TEN_EVENT_FILE.as_bytes().to_vec()), "bytes")
        .try_collect()
        .await
        .unwrap();

    assert_eq!(from_file.len(), from_bytes.len());
    for (a, b) in from_file.iter().zip(&from_bytes) {
        assert_eq!(a.event_type(), b.event_type());
        assert_eq!(a.timestamp(), b.timestamp());
        assert_eq!(a.region(), b.region());
        assert_eq!(a.payload(), b.payload());
        assert_eq!(a.sequence_number(), b.sequence_number());
    }
}

#[tokio::test]
async fn test_missing_file_is_unavailable() {
    let source = LocalFileSource::new("/definitely/missing.chipmunk");
    assert_matches!(source.open().await.err(), Some(SourceError::Unavailable(_)));
    source.close().await.unwrap();
}

#[tokio::test]
async fn test_source_from_config() {
    let file = chipmunk_file(TEN_EVENT_FILE);
    let config = SourceConfig {
        source_type: SourceType::LocalFile,
        local: LocalSourceConfig {
            file_path: file.path().display().to_string(),
        },
        object_storage: ObjectStorageConfig::default(),
    };

    let source = source::from_config(&config);
    assert_eq!(source.source_id(), file.path().display().to_string());
    assert_eq!(collect(source.as_ref()).await.len(), 10);
}
