//! Encrypted log round trips, from raw bytes up to the companion reading logs remotely

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use devbridge::config::ProtocolConfig;
use devbridge::core::cobs;
use devbridge::core::codec::split_frames;
use devbridge::core::envelope::Payload;
use devbridge::crypto::{derive_key, StreamCipherEngine};
use devbridge::error::{ProtocolError, Result};
use devbridge::logstore::plugin::{
    register_log_types, register_trace_types, ListLabels, ListLabelsRequest, ListLogs,
    ListLogsRequest, ListTraces, ListTracesRequest, LiveLog, LiveLogRecord, LiveLogRequest,
    LiveTrace, LiveTraceRequest, LogEntry, ReadLog, ReadLogRequest, ReadTrace, ReadTraceRequest,
    TraceLiveRecord,
};
use devbridge::logstore::trace::Header;
use devbridge::logstore::{
    LiveFeed, LogPlugin, LogRecord, LogStore, TraceEvent, TracePlugin, TraceRecord, TraceStore,
};
use devbridge::protocol::{InboundMessage, Plugin, ProtocolEngine, TypedMessage};
use devbridge::transport::memory;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn temp_root(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "devbridge-it-{tag}-{}",
        devbridge::core::envelope::CorrelationId::random()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_known_record_scenario() {
    let material = derive_key("session1", "pw", "dev");
    assert_eq!(
        hex::encode(material.key()),
        "1d8f137e1eec713e0d12cc0f7e6e4f533e19f36e38426696533e38537e3e2a89"
    );
    assert_eq!(hex::encode(material.nonce()), "533d3b13486e2aec3d9c3edf");

    let mut writer_engine = StreamCipherEngine::from_material(&material);
    let ciphertext = writer_engine.encrypt(&[0x48, 0x69]);
    let mut disk = cobs::encode(ciphertext.as_slice());
    disk.push(0x00);
    assert_eq!(hex::encode(&disk), "0305e600");

    let mut reader_engine = StreamCipherEngine::from_material(&derive_key("session1", "pw", "dev"));
    let frames: Vec<&[u8]> = split_frames(&disk).collect();
    assert_eq!(frames.len(), 1);
    let decoded = cobs::decode(frames[0]).unwrap();
    assert_eq!(reader_engine.decrypt(&decoded).as_slice(), &[0x48, 0x69]);
}

#[derive(Default)]
struct LiveCollector {
    seen: Mutex<Vec<LogRecord>>,
}

impl Plugin for LiveCollector {
    fn handle(&self, message: &InboundMessage) -> Result<Option<Payload>> {
        if message.is::<LiveLogRecord>() {
            let live: LiveLogRecord = message.decode()?;
            self.seen.lock().unwrap().push(live.record);
        }
        // Pushes are one-way
        Ok(None)
    }
}

#[tokio::test]
async fn test_companion_reads_device_logs() {
    let root = temp_root("remote");
    let store = Arc::new(LogStore::new(&root, "hunter2", "device-42").with_session("session2"));
    store
        .open_writer("network", "session1")
        .unwrap()
        .append_record(&LogRecord::new("network", "info", "old run"))
        .unwrap();
    {
        let mut writer = store.open_session_writer("network").unwrap();
        writer
            .append_record(&LogRecord::new("network", "info", "GET /status").with_field("code", "200"))
            .unwrap();
        writer
            .append_record(&LogRecord::new("network", "warn", "slow response"))
            .unwrap();
    }

    let (device_link, companion_link) = memory::pair();
    let device = ProtocolEngine::new(device_link.transport, ProtocolConfig::default());
    register_log_types(&device).unwrap();
    let feed = LiveFeed::new();
    device
        .register_plugin(Arc::new(LogPlugin::new(store.clone(), feed.clone())))
        .unwrap();

    let companion = ProtocolEngine::new(companion_link.transport, ProtocolConfig::default());
    register_log_types(&companion).unwrap();
    let collector = Arc::new(LiveCollector::default());
    companion.register_plugin(collector.clone()).unwrap();

    let d = device.clone();
    tokio::spawn(async move { d.run(device_link.events).await });
    let c = companion.clone();
    tokio::spawn(async move { c.run(companion_link.events).await });

    companion.connect().await.unwrap();

    let listed = companion
        .send_and_await::<ListLogs>(&ListLogsRequest {
            label: "network".into(),
        })
        .await
        .unwrap();
    assert_eq!(
        listed.logs,
        [
            LogEntry {
                name: "session1".into(),
                is_active: false
            },
            LogEntry {
                name: "session2".into(),
                is_active: true
            },
        ]
    );

    let labels = companion
        .send_and_await::<ListLabels>(&ListLabelsRequest {})
        .await
        .unwrap();
    assert_eq!(labels.labels, ["network"]);

    let read = companion
        .send_and_await::<ReadLog>(&ReadLogRequest {
            label: "network".into(),
            name: "session2".into(),
        })
        .await
        .unwrap();
    let messages: Vec<&str> = read.records.iter().map(|r| r.message.as_str()).collect();
    assert_eq!(messages, ["GET /status", "slow response"]);
    assert_eq!(read.records[0].fields["code"], "200");

    let missing = companion
        .send_and_await::<ReadLog>(&ReadLogRequest {
            label: "network".into(),
            name: "nope".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(missing, ProtocolError::ApplicationError(_)));

    let live = companion
        .send_and_await::<LiveLog>(&LiveLogRequest { enabled: true })
        .await
        .unwrap();
    assert!(live.enabled);
    assert!(feed.is_enabled());

    feed.publish(&LogRecord::new("app", "info", "live line"));
    let mut waited = 0;
    while collector.seen.lock().unwrap().is_empty() && waited < 200 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        waited += 1;
    }
    let seen = collector.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].message, "live line");
    assert_eq!(LiveLogRecord::TYPE_TAG, "devbridge.Log.Live.Record");

    std::fs::remove_dir_all(root).unwrap();
}

#[test]
fn test_logs_are_keyed_per_name() {
    let root = temp_root("keys");
    let store = LogStore::new(&root, "pw", "dev");
    store
        .open_writer("app", "one")
        .unwrap()
        .append(b"same plaintext")
        .unwrap();
    store
        .open_writer("app", "two")
        .unwrap()
        .append(b"same plaintext")
        .unwrap();

    let one = std::fs::read(store.path("app", "one").unwrap()).unwrap();
    let two = std::fs::read(store.path("app", "two").unwrap()).unwrap();
    assert_eq!(one.len(), two.len());
    assert_ne!(one, two);

    std::fs::remove_dir_all(root).unwrap();
}

#[tokio::test]
async fn test_large_record_read_the_same_both_ways() {
    let root = temp_root("large");
    let store = LogStore::new(&root, "pw", "dev");
    {
        let mut writer = store.open_writer("app", "big").unwrap();
        writer
            .append_record(&LogRecord::new("app", "info", "before"))
            .unwrap();
        writer
            .append_record(&LogRecord::new("app", "debug", "x".repeat(17 * 1024 * 1024)))
            .unwrap();
        writer
            .append_record(&LogRecord::new("app", "info", "after"))
            .unwrap();
    }

    let sync = store.read("app", "big").unwrap();
    let async_read = store.read_async("app", "big").await.unwrap();
    assert_eq!(sync.len(), 3);
    assert_eq!(sync[1].message.len(), 17 * 1024 * 1024);
    assert_eq!(sync[2].message, "after");
    assert!(sync == async_read);

    std::fs::remove_dir_all(root).unwrap();
}

#[tokio::test]
async fn test_reopen_after_torn_write() {
    let root = temp_root("torn");
    let store = LogStore::new(&root, "pw", "dev");
    {
        let mut writer = store.open_writer("app", "main").unwrap();
        writer
            .append_record(&LogRecord::new("app", "info", "one"))
            .unwrap();
        writer
            .append_record(&LogRecord::new("app", "info", "two"))
            .unwrap();
    }

    // Cut the second record short, delimiter included
    let path = store.path("app", "main").unwrap();
    let full = std::fs::read(&path).unwrap();
    let torn_len = full.len() - 4;
    std::fs::write(&path, &full[..torn_len]).unwrap();

    store
        .open_writer("app", "main")
        .unwrap()
        .append_record(&LogRecord::new("app", "warn", "three"))
        .unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes[torn_len], 0x00);

    let messages: Vec<String> = store
        .read("app", "main")
        .unwrap()
        .into_iter()
        .map(|r| r.message)
        .collect();
    assert_eq!(messages, ["one", "three"]);
    assert_eq!(store.read_async("app", "main").await.unwrap().len(), 2);

    std::fs::remove_dir_all(root).unwrap();
}

#[derive(Default)]
struct TraceCollector {
    seen: Mutex<Vec<TraceLiveRecord>>,
}

impl Plugin for TraceCollector {
    fn handle(&self, message: &InboundMessage) -> Result<Option<Payload>> {
        if message.is::<TraceLiveRecord>() {
            self.seen.lock().unwrap().push(message.decode()?);
        }
        Ok(None)
    }
}

#[tokio::test]
async fn test_companion_reads_network_traces() {
    let root = temp_root("traces");
    TraceStore::new(&root, "pw", "dev")
        .with_session("session-0000000000001")
        .open_recorder(LiveFeed::new())
        .unwrap()
        .record(&TraceRecord::error("old", "offline"))
        .unwrap();

    let store = Arc::new(TraceStore::new(&root, "pw", "dev").with_session("session-0000000000002"));
    let feed = LiveFeed::new();
    let recorder = store.open_recorder(feed.clone()).unwrap();
    recorder
        .record(&TraceRecord::request(
            "req-1",
            "GET",
            "https://api.example.com/items",
            vec![Header::new("Accept", "application/json")],
            None,
        ))
        .unwrap();
    recorder
        .record(&TraceRecord::response("req-1", 200, Vec::new(), Some(b"[]".to_vec())))
        .unwrap();

    let (device_link, companion_link) = memory::pair();
    let device = ProtocolEngine::new(device_link.transport, ProtocolConfig::default());
    register_trace_types(&device).unwrap();
    device
        .register_plugin(Arc::new(TracePlugin::new(store.clone(), feed.clone())))
        .unwrap();

    let companion = ProtocolEngine::new(companion_link.transport, ProtocolConfig::default());
    register_trace_types(&companion).unwrap();
    let collector = Arc::new(TraceCollector::default());
    companion.register_plugin(collector.clone()).unwrap();

    let d = device.clone();
    tokio::spawn(async move { d.run(device_link.events).await });
    let c = companion.clone();
    tokio::spawn(async move { c.run(companion_link.events).await });
    companion.connect().await.unwrap();

    let listed = companion
        .send_and_await::<ListTraces>(&ListTracesRequest {})
        .await
        .unwrap();
    let active: Vec<(&str, bool)> = listed
        .sessions
        .iter()
        .map(|s| (s.name.as_str(), s.is_active))
        .collect();
    assert_eq!(
        active,
        [("session-0000000000001", false), ("session-0000000000002", true)]
    );

    let read = companion
        .send_and_await::<ReadTrace>(&ReadTraceRequest {
            label: "session-0000000000002".into(),
        })
        .await
        .unwrap();
    assert_eq!(read.records.len(), 2);
    assert!(matches!(
        read.records[1].data,
        TraceEvent::Response { code: 200, ref body, .. } if body.as_deref() == Some(&b"[]"[..])
    ));

    let live = companion
        .send_and_await::<LiveTrace>(&LiveTraceRequest { enabled: true })
        .await
        .unwrap();
    assert!(live.enabled);

    recorder
        .record(&TraceRecord::error("req-2", "The network connection was lost."))
        .unwrap();
    let mut waited = 0;
    while collector.seen.lock().unwrap().is_empty() && waited < 200 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        waited += 1;
    }
    {
        let seen = collector.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].label, "session-0000000000002");
        assert_eq!(seen[0].record.id, "req-2");
    }

    companion
        .send_and_await::<LiveTrace>(&LiveTraceRequest { enabled: false })
        .await
        .unwrap();
    assert!(!feed.is_enabled());

    std::fs::remove_dir_all(root).unwrap();
}
