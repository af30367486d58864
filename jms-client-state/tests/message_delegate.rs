//! Copy-on-write behaviour of message delegates seen from the public API.
//!
//! Region and core identities are compared through their ids, which change
//! exactly when a region or core is copied.

use std::sync::Arc;

use jms_client_state::message::{
    CoreId, DelegateRole, DeliveryMode, MessageCore, MessageDelegate, Payload, PropertyMap,
    RegionId,
};
use jms_client_state::{MessageError, PropertyValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Snapshot {
    core: CoreId,
    header: RegionId,
    properties: RegionId,
    body: RegionId,
}

fn snapshot(delegate: &MessageDelegate) -> Snapshot {
    let core = delegate.core();
    Snapshot {
        core: core.id(),
        header: core.header_id(),
        properties: core.properties_id(),
        body: core.body_id(),
    }
}

/// A sent message with one property and a one-entry map body, plus the
/// delegate it was delivered as.
fn sent_and_received() -> (MessageDelegate, MessageDelegate) {
    let mut sent = MessageDelegate::new(MessageCore::default());
    sent.set_property("customer", "acme").unwrap();
    sent.set_map_entry("qty", 3i32).unwrap();
    let received = sent.deliver();
    (sent, received)
}

#[test]
fn test_sent_side_header_then_property_then_body() {
    let (mut sent, received) = sent_and_received();
    let sent_1 = snapshot(&sent);
    let rec_1 = snapshot(&received);
    assert_eq!(sent_1, rec_1);
    assert!(sent.shares_core_with(&received));

    // (a) header write: new core, regions still shared
    sent.set_delivery_mode(DeliveryMode::NonPersistent);
    let sent_2 = snapshot(&sent);
    assert_ne!(sent_2.core, sent_1.core);
    assert_eq!(snapshot(&received).core, sent_1.core);
    assert_ne!(sent_2.header, rec_1.header);
    assert_eq!(sent_2.properties, rec_1.properties);
    assert_eq!(sent_2.body, rec_1.body);
    assert_eq!(snapshot(&received), rec_1);

    // (b) property write: same core, only properties copied
    sent.set_property("count", 42i32).unwrap();
    let sent_3 = snapshot(&sent);
    assert_eq!(sent_3.core, sent_2.core);
    assert_ne!(sent_3.properties, sent_1.properties);
    assert_eq!(sent_3.header, sent_2.header);
    assert_eq!(sent_3.body, rec_1.body);
    assert_eq!(snapshot(&received).properties, rec_1.properties);

    // (c) body write: same core, only body copied
    sent.set_map_entry("qty", 4i32).unwrap();
    let sent_4 = snapshot(&sent);
    assert_eq!(sent_4.core, sent_2.core);
    assert_ne!(sent_4.body, rec_1.body);
    assert_eq!(sent_4.properties, sent_3.properties);
    assert_eq!(snapshot(&received), rec_1);

    // The receiver still sees the message as delivered.
    assert_eq!(received.header().delivery_mode, DeliveryMode::Persistent);
    assert!(received.property("count").is_none());
    assert_eq!(received.payload().map_int("qty"), Ok(Some(3)));
    assert_eq!(sent.payload().map_int("qty"), Ok(Some(4)));

    let stats = sent.copy_stats();
    assert_eq!(stats.core_rebuilds, 1);
    assert_eq!(stats.header_copies, 1);
    assert_eq!(stats.property_copies, 1);
    assert_eq!(stats.body_copies, 1);
    assert_eq!(received.copy_stats().region_copies(), 0);
}

#[test]
fn test_received_side_header_then_property_then_body() {
    let (sent, mut received) = sent_and_received();
    let sent_1 = snapshot(&sent);

    received.set_delivery_mode(DeliveryMode::NonPersistent);
    let rec_2 = snapshot(&received);
    assert_ne!(rec_2.core, sent_1.core);
    assert_ne!(rec_2.header, sent_1.header);
    assert_eq!(rec_2.properties, sent_1.properties);
    assert_eq!(rec_2.body, sent_1.body);
    assert_eq!(snapshot(&sent), sent_1);

    received.clear_properties();
    received.set_property("reply", true).unwrap();
    let rec_3 = snapshot(&received);
    assert_eq!(rec_3.core, rec_2.core);
    assert_ne!(rec_3.properties, sent_1.properties);
    assert_eq!(rec_3.body, sent_1.body);
    assert_eq!(snapshot(&sent), sent_1);
    assert_eq!(received.properties().len(), 1);
    assert_eq!(sent.properties().get_string("customer").as_deref(), Some("acme"));

    received.clear_body();
    received.set_text("ack");
    let rec_4 = snapshot(&received);
    assert_eq!(rec_4.core, rec_2.core);
    assert_ne!(rec_4.body, sent_1.body);
    assert_eq!(snapshot(&sent), sent_1);
    assert_eq!(received.payload().as_text(), Some("ack"));
    assert_eq!(sent.payload().map_int("qty"), Ok(Some(3)));
}

#[test]
fn test_second_header_write_is_in_place() {
    let (mut sent, received) = sent_and_received();

    sent.set_priority(8).unwrap();
    let first = snapshot(&sent);
    sent.set_correlation_id(Some("corr-7".into()));
    let second = snapshot(&sent);

    assert_eq!(first, second);
    assert_eq!(second.properties, snapshot(&received).properties);
    assert_eq!(sent.copy_stats().header_copies, 1);
}

#[test]
fn test_three_way_sharing() {
    let (mut sent, received) = sent_and_received();
    let other = received.deliver();
    assert_eq!(sent.core_sharers(), 3);

    sent.set_property("hops", 1i64).unwrap();
    assert_eq!(received.core_sharers(), 2);
    assert!(received.shares_core_with(&other));
    assert_eq!(sent.core_sharers(), 1);
    assert_eq!(received.core().header_region().sharers(), 2);
    assert_eq!(received.core().properties_region().sharers(), 1);
}

#[test]
fn test_failed_write_copies_nothing() {
    let (mut sent, received) = sent_and_received();
    let before = snapshot(&sent);

    let err = sent.set_property("1bad", 1i32).unwrap_err();
    assert!(matches!(err, MessageError::InvalidPropertyName { .. }));
    let err = sent.write_bytes(b"raw").unwrap_err();
    assert!(matches!(err, MessageError::WrongBodyKind { .. }));
    let err = sent.set_map_entry("", 1i32).unwrap_err();
    assert!(matches!(err, MessageError::InvalidPropertyName { .. }));
    let err = sent.push_stream(1i32).unwrap_err();
    assert!(matches!(err, MessageError::WrongBodyKind { .. }));
    assert!(sent.set_priority(42).is_err());

    assert_eq!(snapshot(&sent), before);
    assert!(sent.shares_core_with(&received));
    assert_eq!(sent.copy_stats(), Default::default());
}

#[test]
fn test_from_prebuilt_core() {
    let mut props = PropertyMap::new();
    props.set("region", PropertyValue::from("eu")).unwrap();
    let core = MessageCore::new(Default::default(), props, Payload::Bytes(vec![1, 2]));
    let shared = Arc::new(core);

    let a = MessageDelegate::from_shared(Arc::clone(&shared), DelegateRole::Received);
    let mut b = MessageDelegate::from_shared(shared, DelegateRole::Received);
    b.write_bytes(&[3]).unwrap();

    assert_eq!(a.payload().as_bytes(), Some(&[1u8, 2][..]));
    assert_eq!(b.payload().as_bytes(), Some(&[1u8, 2, 3][..]));
    assert_eq!(a.core().properties_id(), b.core().properties_id());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_on_shared_core() {
    const WRITERS: usize = 8;

    let (sent, _received) = sent_and_received();
    let original = snapshot(&sent);
    let mut handles = Vec::new();

    for i in 0..WRITERS {
        let mut delegate = sent.deliver();
        handles.push(tokio::task::spawn_blocking(move || {
            delegate.set_property("writer", i as i32).unwrap();
            delegate.set_map_entry("qty", i as i32).unwrap();
            delegate
        }));
    }

    let mut writers = Vec::new();
    for handle in handles {
        writers.push(handle.await.unwrap());
    }

    for (i, delegate) in writers.iter().enumerate() {
        assert_eq!(delegate.properties().get_int("writer"), Ok(Some(i as i32)));
        assert_eq!(delegate.payload().map_int("qty"), Ok(Some(i as i32)));
        assert_eq!(delegate.core_sharers(), 1);
        assert_eq!(delegate.core().header_id(), original.header);
    }

    assert_eq!(snapshot(&sent), original);
    assert_eq!(sent.core_sharers(), 2);
    assert!(sent.properties().get("writer").is_none());
    assert_eq!(sent.core().header_region().sharers(), WRITERS + 1);
}
