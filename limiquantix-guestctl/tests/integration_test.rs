//! Integration tests for guest control.
//!
//! These tests drive the registry, stream parser and guest objects together
//! using the mock transport.

use limiquantix_guestctl::{
    ContextId, EventCategory, EventRegistry, FsObjData, FsObjType, GuestCtlConfig, GuestCtlError,
    GuestObject, HostCallback, HostParam, MockTransport, Payload, SequenceCounter, StreamCollector,
    StreamReassembler, GUEST_MSG_REPLY, RESULT_SUCCESS,
};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn registry() -> Arc<EventRegistry> {
    Arc::new(EventRegistry::with_counter(Arc::new(SequenceCounter::new())))
}

/// Every waiter receives exactly the reply sent to its own context id.
#[test]
fn test_concurrent_requests_get_their_own_replies() {
    const THREADS: usize = 100;
    let reg = registry();
    let start = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let reg = Arc::clone(&reg);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                let session = (i % 32) as u32;
                let (cid, event) = reg.register(session, 1, &[]).unwrap();
                start.wait();

                let replier = {
                    let reg = Arc::clone(&reg);
                    thread::spawn(move || {
                        let params = [
                            HostParam::U32(0),
                            HostParam::U32(0),
                            HostParam::Bytes(cid.as_u32().to_le_bytes().to_vec().into()),
                        ];
                        reg.dispatch_raw(cid, GUEST_MSG_REPLY, &params).unwrap();
                    })
                };

                assert_eq!(event.wait(Duration::from_secs(10)).unwrap(), RESULT_SUCCESS);
                replier.join().unwrap();

                let payload = event.payload().unwrap();
                assert_eq!(payload.data(), &cid.as_u32().to_le_bytes()[..]);
                assert_eq!(cid.session_id(), session);
                reg.unregister(cid);
                cid
            })
        })
        .collect();

    let mut ids: Vec<ContextId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), THREADS);
    assert!(reg.is_empty());
}

/// Streamed `stat` output is decoded and fanned out to every reader of the category.
#[test]
fn test_stream_blocks_fan_out_to_category() {
    let reg = registry();
    let (_, first) = reg.register(1, 4, &[EventCategory::FileRead]).unwrap();
    let (_, second) = reg
        .register(1, 5, &[EventCategory::FileRead, EventCategory::FileStateChanged])
        .unwrap();

    let config = GuestCtlConfig::default();
    let mut collector = StreamCollector::with_reassembler(StreamReassembler::from_config(&config.stream));
    let wire = b"node_id=7\0name=/var/log/syslog\0ftype=-\0st_size=2048\0\0";

    let mut blocks = Vec::new();
    for chunk in wire.chunks(5) {
        let collected = collector.push(chunk).unwrap();
        assert!(collected.is_clean());
        blocks.extend(collected.blocks);
    }
    assert_eq!(blocks.len(), 1);

    let data = FsObjData::from_stat(&blocks[0]).unwrap();
    assert_eq!(data.obj_type, FsObjType::File);
    assert_eq!(data.object_size, 2048);
    assert_eq!(data.node_id, 7);

    let payload = Payload::copy_from(1, data.name.as_bytes()).unwrap();
    assert_eq!(reg.signal_by_category(EventCategory::FileRead, &payload).unwrap(), 2);

    for event in [&first, &second] {
        assert_eq!(event.wait(Duration::from_millis(100)).unwrap(), RESULT_SUCCESS);
        assert_eq!(event.payload().unwrap().data(), b"/var/log/syslog");
    }
    assert_eq!(reg.category_len(EventCategory::FileRead), 0);
    assert_eq!(reg.category_len(EventCategory::FileStateChanged), 0);
}

/// Shutting down releases every indefinite waiter with `Cancelled`.
#[test]
fn test_cancel_all_releases_waiters() {
    let reg = registry();
    let started = Arc::new(Barrier::new(5));

    let waiters: Vec<_> = (0..4)
        .map(|i| {
            let (_, event) = reg.register(0, i, &[EventCategory::ProcessOutput]).unwrap();
            let started = Arc::clone(&started);
            thread::spawn(move || {
                started.wait();
                event.wait(Duration::ZERO)
            })
        })
        .collect();

    started.wait();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(reg.cancel_all(), 4);

    for waiter in waiters {
        assert_eq!(waiter.join().unwrap(), Err(GuestCtlError::Cancelled));
    }
}

/// Concurrent guest calls over one transport are correlated by context id.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_guest_object_calls_are_correlated() {
    let reg = registry();
    let transport = Arc::new(
        MockTransport::with_responder(Arc::clone(&reg), |_, _, params| {
            let tag = params.first().and_then(HostParam::as_u32)?;
            Some(HostCallback::Reply {
                guest_rc: 0,
                payload: Payload::new(tag, tag.to_le_bytes().to_vec()),
            })
        })
        .reply_after(Duration::from_millis(5)),
    );
    let object = Arc::new(GuestObject::new(3, 9, Arc::clone(&reg), transport.clone()).unwrap());

    let mut tasks = tokio::task::JoinSet::new();
    for tag in 0..20u32 {
        let object = Arc::clone(&object);
        tasks.spawn(async move {
            let outcome = object
                .call(1, &[HostParam::U32(tag)], &[], Duration::from_secs(5))
                .await
                .unwrap();
            (tag, outcome.payload.unwrap())
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let (tag, payload) = joined.unwrap();
        assert_eq!(payload.type_tag(), tag);
        assert_eq!(payload.data(), &tag.to_le_bytes()[..]);
    }

    assert_eq!(transport.sent_count(), 20);
    assert!(reg.is_empty());
}

/// Configuration written to disk drives the stream limits.
#[test]
fn test_config_file_limits_stream_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("guestctl.yaml");
    std::fs::write(
        &path,
        "log_level: debug\nlog_format: json\ndefault_wait_timeout_ms: 500\nstream:\n  grow_increment: 1024\n  max_record_len: 16\n",
    )
    .unwrap();

    let config = GuestCtlConfig::load_from_path(&path);
    assert!(config.validate().is_ok());
    assert_eq!(config.default_wait_timeout(), Duration::from_millis(500));

    let mut collector = StreamCollector::with_reassembler(StreamReassembler::from_config(&config.stream));
    assert_eq!(collector.push(b"name=short\0\0").unwrap().blocks.len(), 1);

    let collected = collector
        .push(b"name=this-record-is-far-too-long\0\0name=ok\0\0")
        .unwrap();
    assert!(matches!(collected.errors[..], [GuestCtlError::ProtocolMalformed(_)]));
    assert_eq!(collected.blocks.len(), 1);
    assert_eq!(collected.blocks[0].get_string("name"), Some("ok"));
}
