mod common;

use std::cell::{Cell, RefCell};

use common::{MockClock, MockTransport};
use libshadow::network::application::mqtt::{Error as MqttError, Message, QoS};
use libshadow::shadow::{
    AckStatus, ActionCallback, ConnectParams, Error, FieldValue, InitParams, JsonField, Shadow, ShadowAction,
    UpdateDocument,
};

const GET_ACCEPTED: &str = "things/lamp/shadow/get/accepted";
const GET_REJECTED: &str = "things/lamp/shadow/get/rejected";
const DELTA: &str = "things/lamp/shadow/update/delta";

/// Records every acknowledgement it is given.
#[derive(Default)]
struct Acks {
    seen: RefCell<Vec<(String, ShadowAction, AckStatus, Option<String>)>>,
}

impl Acks {
    fn statuses(&self) -> Vec<AckStatus> {
        self.seen.borrow().iter().map(|(_, _, status, _)| *status).collect()
    }
}

impl ActionCallback for Acks {
    fn on_ack(&self, thing_name: &str, action: ShadowAction, status: AckStatus, document: Option<&str>) {
        self.seen.borrow_mut().push((
            thing_name.to_string(),
            action,
            status,
            document.map(str::to_string),
        ));
    }
}

fn connected<'a>(transport: &MockTransport) -> Shadow<'a, MockTransport, MockClock> {
    let mut shadow = Shadow::new(transport.clone(), MockClock::new(1), InitParams::default()).unwrap();
    shadow.connect(ConnectParams::new("lamp", "dev")).unwrap();
    shadow
}

fn published_payloads(transport: &MockTransport, topic: &str) -> Vec<String> {
    transport
        .link()
        .published
        .iter()
        .filter(|(t, _, _)| t == topic)
        .map(|(_, payload, _)| String::from_utf8(payload.clone()).unwrap())
        .collect()
}

#[test]
fn test_get_accepted() {
    let acks = Acks::default();
    let transport = MockTransport::new();
    let mut shadow = connected(&transport);

    shadow.get("lamp", Some(&acks), 5, false).unwrap();
    assert_eq!(
        transport.link().subscribed,
        vec![(GET_ACCEPTED.to_string(), 0), (GET_REJECTED.to_string(), 0)]
    );
    assert_eq!(
        published_payloads(&transport, "things/lamp/shadow/get"),
        vec![r#"{"clientToken":"dev-0"}"#.to_string()]
    );
    assert_eq!(shadow.pending_requests(), 1);

    let response = r#"{"state":{"reported":{"on":true}},"version":7,"clientToken":"dev-0"}"#;
    transport
        .link()
        .deliver(GET_ACCEPTED, response.as_bytes(), QoS::AtMostOnce, 0);
    shadow.yield_for(100).unwrap();

    assert_eq!(
        acks.seen.borrow().as_slice(),
        &[(
            "lamp".to_string(),
            ShadowAction::Get,
            AckStatus::Accepted,
            Some(response.to_string())
        )]
    );
    assert_eq!(shadow.pending_requests(), 0);
    assert_eq!(shadow.last_received_version(), 7);
    assert_eq!(
        transport.link().unsubscribed,
        vec![GET_ACCEPTED.to_string(), GET_REJECTED.to_string()]
    );
    assert_eq!(shadow.client().subscription_count(), 0);
}

#[test]
fn test_get_rejected() {
    let acks = Acks::default();
    let transport = MockTransport::new();
    let mut shadow = connected(&transport);

    shadow.get("lamp", Some(&acks), 5, false).unwrap();
    transport.link().deliver(
        GET_REJECTED,
        br#"{"code":404,"message":"No shadow exists with name: 'lamp'","clientToken":"dev-0"}"#,
        QoS::AtMostOnce,
        0,
    );
    shadow.yield_for(100).unwrap();

    assert_eq!(acks.statuses(), vec![AckStatus::Rejected]);
    assert_eq!(shadow.last_received_version(), 0);
}

#[test]
fn test_thing_named_like_a_response_topic() {
    let acks = Acks::default();
    let transport = MockTransport::new();
    let mut shadow: Shadow<'_, _, _> =
        Shadow::new(transport.clone(), MockClock::new(1), InitParams::default()).unwrap();
    shadow.connect(ConnectParams::new("acceptedLamp", "dev")).unwrap();

    shadow.get("acceptedLamp", Some(&acks), 5, false).unwrap();
    transport.link().deliver(
        "things/acceptedLamp/shadow/get/rejected",
        br#"{"code":404,"message":"No shadow exists","clientToken":"dev-0"}"#,
        QoS::AtMostOnce,
        0,
    );
    shadow.yield_for(100).unwrap();

    assert_eq!(acks.statuses(), vec![AckStatus::Rejected]);
    assert_eq!(shadow.pending_requests(), 0);
}

#[test]
fn test_version_of_another_thing_is_not_tracked() {
    let acks = Acks::default();
    let transport = MockTransport::new();
    let mut shadow = connected(&transport);

    shadow.get("lamp2", Some(&acks), 5, false).unwrap();
    transport.link().deliver(
        "things/lamp2/shadow/get/accepted",
        br#"{"state":{},"version":9,"clientToken":"dev-0"}"#,
        QoS::AtMostOnce,
        0,
    );
    shadow.yield_for(100).unwrap();

    assert_eq!(acks.statuses(), vec![AckStatus::Accepted]);
    assert_eq!(shadow.last_received_version(), 0);
}

#[test]
fn test_new_subscription_pair_waits_to_settle() {
    let acks = Acks::default();
    let transport = MockTransport::new();
    let clock = MockClock::new(1);
    let mut shadow: Shadow<'_, _, _> =
        Shadow::new(transport.clone(), clock.clone(), InitParams::default()).unwrap();
    shadow.connect(ConnectParams::new("lamp", "dev")).unwrap();

    shadow.get("lamp", Some(&acks), 5, false).unwrap();
    assert_eq!(clock.delays(), vec![2_000]);

    // The pair is already subscribed; no second wait.
    shadow.get("lamp", Some(&acks), 5, false).unwrap();
    assert_eq!(clock.delays(), vec![2_000]);
}

#[test]
fn test_timeout_longer_than_four_minutes() {
    let acks = Acks::default();
    let transport = MockTransport::new();
    let clock = MockClock::new(1);
    let mut shadow: Shadow<'_, _, _> =
        Shadow::new(transport.clone(), clock.clone(), InitParams::default()).unwrap();
    shadow.connect(ConnectParams::new("lamp", "dev")).unwrap();

    shadow.get("lamp", Some(&acks), 600, false).unwrap();
    clock.advance(300_000);
    shadow.yield_for(100).unwrap();
    assert!(acks.seen.borrow().is_empty());
    assert_eq!(shadow.pending_requests(), 1);

    clock.advance(300_000);
    shadow.yield_for(100).unwrap();
    assert_eq!(acks.statuses(), vec![AckStatus::Timeout]);
}

#[test]
fn test_get_times_out_once() {
    let acks = Acks::default();
    let transport = MockTransport::new();
    let mut shadow = connected(&transport);

    shadow.get("lamp", Some(&acks), 1, false).unwrap();
    for _ in 0..30 {
        shadow.yield_for(100).unwrap();
        if !acks.seen.borrow().is_empty() {
            break;
        }
    }
    {
        let seen = acks.seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].2, AckStatus::Timeout);
        assert_eq!(seen[0].3, None);
    }
    assert_eq!(shadow.pending_requests(), 0);
    assert_eq!(transport.link().unsubscribed.len(), 2);

    // A response after the timeout finds nobody waiting.
    transport
        .link()
        .deliver(GET_ACCEPTED, br#"{"clientToken":"dev-0"}"#, QoS::AtMostOnce, 0);
    shadow.yield_for(100).unwrap();
    assert_eq!(acks.seen.borrow().len(), 1);
}

#[test]
fn test_unrelated_token_is_ignored() {
    let acks = Acks::default();
    let transport = MockTransport::new();
    let mut shadow = connected(&transport);

    shadow.get("lamp", Some(&acks), 5, false).unwrap();
    transport
        .link()
        .deliver(GET_ACCEPTED, br#"{"clientToken":"other-3"}"#, QoS::AtMostOnce, 0);
    shadow.yield_for(100).unwrap();

    assert!(acks.seen.borrow().is_empty());
    assert_eq!(shadow.pending_requests(), 1);
    assert!(transport.link().unsubscribed.is_empty());
}

#[test]
fn test_sticky_subscriptions_stay() {
    let acks = Acks::default();
    let transport = MockTransport::new();
    let mut shadow = connected(&transport);

    shadow.get("lamp", Some(&acks), 5, true).unwrap();
    transport
        .link()
        .deliver(GET_ACCEPTED, br#"{"clientToken":"dev-0"}"#, QoS::AtMostOnce, 0);
    shadow.yield_for(100).unwrap();
    assert_eq!(acks.statuses(), vec![AckStatus::Accepted]);
    assert!(transport.link().unsubscribed.is_empty());
    assert_eq!(shadow.client().subscription_count(), 2);

    // The pair is reused without subscribing again.
    shadow.get("lamp", Some(&acks), 5, true).unwrap();
    assert_eq!(transport.link().subscribed.len(), 2);
    transport
        .link()
        .deliver(GET_ACCEPTED, br#"{"clientToken":"dev-1"}"#, QoS::AtMostOnce, 0);
    shadow.yield_for(100).unwrap();
    assert_eq!(acks.statuses(), vec![AckStatus::Accepted, AckStatus::Accepted]);
    assert!(transport.link().unsubscribed.is_empty());
}

#[test]
fn test_requests_share_one_subscription_pair() {
    let acks = Acks::default();
    let transport = MockTransport::new();
    let mut shadow = connected(&transport);

    shadow.get("lamp", Some(&acks), 5, false).unwrap();
    shadow.get("lamp", Some(&acks), 5, false).unwrap();
    assert_eq!(transport.link().subscribed.len(), 2);
    assert_eq!(shadow.pending_requests(), 2);

    transport
        .link()
        .deliver(GET_ACCEPTED, br#"{"clientToken":"dev-1"}"#, QoS::AtMostOnce, 0);
    shadow.yield_for(100).unwrap();
    assert_eq!(acks.statuses(), vec![AckStatus::Accepted]);
    assert!(transport.link().unsubscribed.is_empty());

    transport
        .link()
        .deliver(GET_REJECTED, br#"{"clientToken":"dev-0"}"#, QoS::AtMostOnce, 0);
    shadow.yield_for(100).unwrap();
    assert_eq!(acks.statuses(), vec![AckStatus::Accepted, AckStatus::Rejected]);
    assert_eq!(transport.link().unsubscribed.len(), 2);
}

#[test]
fn test_ack_pool_full() {
    let acks = Acks::default();
    let transport = MockTransport::new();
    let mut shadow = connected(&transport);

    for _ in 0..10 {
        shadow.get("lamp", Some(&acks), 30, false).unwrap();
    }
    assert_eq!(shadow.pending_requests(), 10);
    let sent = transport.link().published.len();

    assert_eq!(shadow.get("lamp", Some(&acks), 30, false), Err(Error::AckPoolFull));
    assert_eq!(transport.link().published.len(), sent);

    // Untracked requests still go out.
    shadow.get("lamp", None, 30, false).unwrap();
    assert_eq!(transport.link().published.len(), sent + 1);
}

#[test]
fn test_untracked_update_does_not_subscribe() {
    let acks = Acks::default();
    let transport = MockTransport::new();
    let mut shadow = connected(&transport);

    let document = r#"{"state":{"reported":{"on":true}}}"#;
    shadow.update("lamp", document, Some(&acks), 5, false).unwrap();

    assert!(transport.link().subscribed.is_empty());
    assert_eq!(
        published_payloads(&transport, "things/lamp/shadow/update"),
        vec![document.to_string()]
    );
    assert_eq!(shadow.pending_requests(), 0);
}

#[test]
fn test_update_document_round_trip() {
    let acks = Acks::default();
    let on = JsonField::new("on", FieldValue::Bool(true));
    let level = JsonField::new("level", FieldValue::U8(40));
    let transport = MockTransport::new();
    let mut shadow = connected(&transport);

    let mut doc = UpdateDocument::<256>::new().unwrap();
    doc.add_reported(&[&on, &level]).unwrap();
    shadow.finalize_document(&mut doc).unwrap();
    assert_eq!(
        doc.as_str(),
        r#"{"state":{"reported":{"on":true,"level":40}}, "clientToken":"dev-0"}"#
    );

    shadow.update("lamp", doc.as_str(), Some(&acks), 5, false).unwrap();
    assert_eq!(
        transport.link().subscribed,
        vec![
            ("things/lamp/shadow/update/accepted".to_string(), 0),
            ("things/lamp/shadow/update/rejected".to_string(), 0)
        ]
    );
    assert_eq!(
        published_payloads(&transport, "things/lamp/shadow/update"),
        vec![doc.as_str().to_string()]
    );

    transport.link().deliver(
        "things/lamp/shadow/update/accepted",
        br#"{"state":{"reported":{"on":true,"level":40}},"version":9,"clientToken":"dev-0"}"#,
        QoS::AtMostOnce,
        0,
    );
    shadow.yield_for(100).unwrap();

    assert_eq!(acks.statuses(), vec![AckStatus::Accepted]);
    assert_eq!(acks.seen.borrow()[0].1, ShadowAction::Update);
    // Only get/accepted and deltas move the version.
    assert_eq!(shadow.last_received_version(), 0);
}

#[test]
fn test_delete_and_client_tokens() {
    let transport = MockTransport::new();
    let mut shadow = connected(&transport);

    shadow.get("lamp", None, 5, false).unwrap();
    shadow.delete("lamp", None, 5, false).unwrap();
    let mut token: heapless::String<16> = heapless::String::new();
    shadow.fill_client_token(&mut token).unwrap();

    assert_eq!(
        published_payloads(&transport, "things/lamp/shadow/delete"),
        vec![r#"{"clientToken":"dev-1"}"#.to_string()]
    );
    assert_eq!(token.as_str(), "dev-2");
}

#[test]
fn test_delta_updates_fields() {
    let raw = RefCell::new(Vec::<String>::new());
    let on_k = |value: &str, _field: &JsonField<'_>| raw.borrow_mut().push(value.to_string());
    let k = JsonField::with_callback("k", FieldValue::U32(0), &on_k);
    let mode = JsonField::new("mode", FieldValue::Str("off".try_into().unwrap()));
    let transport = MockTransport::new();
    let mut shadow = connected(&transport);

    shadow.register_delta(&k).unwrap();
    shadow.register_delta(&mode).unwrap();
    assert_eq!(transport.link().subscribed, vec![(DELTA.to_string(), 0)]);

    transport
        .link()
        .deliver(DELTA, br#"{"state":{"k":1},"version":5}"#, QoS::AtMostOnce, 0);
    shadow.yield_for(100).unwrap();
    assert_eq!(k.value(), FieldValue::U32(1));
    assert_eq!(raw.borrow().as_slice(), &["1".to_string()]);
    assert_eq!(shadow.last_received_version(), 5);

    transport
        .link()
        .deliver(DELTA, br#"{"state":{"mode":"eco"},"version":6}"#, QoS::AtMostOnce, 0);
    shadow.yield_for(100).unwrap();
    assert_eq!(mode.value(), FieldValue::Str("eco".try_into().unwrap()));
    assert_eq!(k.value(), FieldValue::U32(1));
    assert_eq!(raw.borrow().len(), 1);
}

#[test]
fn test_old_deltas_are_discarded() {
    let hits = Cell::new(0);
    let on_k = |_: &str, _: &JsonField<'_>| hits.set(hits.get() + 1);
    let k = JsonField::with_callback("k", FieldValue::U32(0), &on_k);
    let transport = MockTransport::new();
    let mut shadow = connected(&transport);
    shadow.register_delta(&k).unwrap();

    {
        let mut link = transport.link();
        link.deliver(DELTA, br#"{"state":{"k":1},"version":5}"#, QoS::AtMostOnce, 0);
        link.deliver(DELTA, br#"{"state":{"k":2},"version":5}"#, QoS::AtMostOnce, 0);
        link.deliver(DELTA, br#"{"state":{"k":3},"version":4}"#, QoS::AtMostOnce, 0);
    }
    shadow.yield_for(100).unwrap();
    assert_eq!(k.value(), FieldValue::U32(1));
    assert_eq!(hits.get(), 1);

    shadow.disable_discard_old_delta();
    transport
        .link()
        .deliver(DELTA, br#"{"state":{"k":3},"version":4}"#, QoS::AtMostOnce, 0);
    shadow.yield_for(100).unwrap();
    assert_eq!(k.value(), FieldValue::U32(3));
    assert_eq!(hits.get(), 2);

    shadow.enable_discard_old_delta();
    shadow.reset_last_received_version();
    transport
        .link()
        .deliver(DELTA, br#"{"state":{"k":4},"version":1}"#, QoS::AtMostOnce, 0);
    shadow.yield_for(100).unwrap();
    assert_eq!(k.value(), FieldValue::U32(4));
    assert_eq!(shadow.last_received_version(), 1);
}

#[test]
fn test_delta_with_wrong_type_keeps_value() {
    let hits = Cell::new(0);
    let on_k = |_: &str, _: &JsonField<'_>| hits.set(hits.get() + 1);
    let k = JsonField::with_callback("k", FieldValue::U8(7), &on_k);
    let transport = MockTransport::new();
    let mut shadow = connected(&transport);
    shadow.register_delta(&k).unwrap();

    transport
        .link()
        .deliver(DELTA, br#"{"state":{"k":300},"version":2}"#, QoS::AtMostOnce, 0);
    shadow.yield_for(100).unwrap();
    assert_eq!(k.value(), FieldValue::U8(7));
    assert_eq!(hits.get(), 1);
}

#[test]
fn test_requires_connection() {
    let acks = Acks::default();
    let k = JsonField::new("k", FieldValue::Bool(false));
    let mut shadow: Shadow<'_, _, _> =
        Shadow::new(MockTransport::new(), MockClock::new(1), InitParams::default()).unwrap();

    assert_eq!(shadow.register_delta(&k), Err(Error::NotConnected));
    assert_eq!(shadow.get("lamp", Some(&acks), 5, false), Err(Error::NotConnected));
}

#[test]
fn test_connect_validates_names() {
    let long_thing = "t".repeat(31);
    let mut shadow: Shadow<'_, _, _> =
        Shadow::new(MockTransport::new(), MockClock::new(1), InitParams::default()).unwrap();

    assert_eq!(shadow.connect(ConnectParams::new("", "dev")), Err(Error::InvalidArgument));
    assert_eq!(shadow.connect(ConnectParams::new("lamp", "")), Err(Error::InvalidArgument));
    assert_eq!(
        shadow.connect(ConnectParams::new(&long_thing, "dev")),
        Err(Error::InvalidArgument)
    );
    assert!(!shadow.client().is_connected());
}

#[test]
fn test_subscription_slots_run_out() {
    let acks = Acks::default();
    let k = JsonField::new("k", FieldValue::Bool(false));
    let transport = MockTransport::new();
    let mut shadow = connected(&transport);

    shadow.register_delta(&k).unwrap();
    shadow.get("lamp", Some(&acks), 30, true).unwrap();
    shadow.update("lamp", r#"{"clientToken":"dev-x"}"#, Some(&acks), 30, true).unwrap();
    assert_eq!(shadow.client().subscription_count(), 5);
    let sent = transport.link().published.len();

    assert_eq!(
        shadow.delete("lamp", Some(&acks), 30, true),
        Err(Error::Mqtt(MqttError::MaxSubscriptionsReached))
    );
    assert_eq!(transport.link().published.len(), sent);
    assert_eq!(shadow.pending_requests(), 2);
}

#[test]
fn test_delete_handler_subscription() {
    let deleted = RefCell::new(Vec::<String>::new());
    let on_delete = |topic: &str, _: &Message<'_>| deleted.borrow_mut().push(topic.to_string());
    let transport = MockTransport::new();
    let mut shadow: Shadow<'_, _, _> =
        Shadow::new(transport.clone(), MockClock::new(1), InitParams::default()).unwrap();
    let params = ConnectParams {
        delete_handler: Some(&on_delete),
        ..ConnectParams::new("lamp", "dev")
    };
    shadow.connect(params).unwrap();

    assert_eq!(
        transport.link().subscribed,
        vec![("things/lamp/shadow/delete/accepted".to_string(), 1)]
    );
    transport.link().deliver(
        "things/lamp/shadow/delete/accepted",
        br#"{"version":3}"#,
        QoS::AtLeastOnce,
        21,
    );
    shadow.yield_for(100).unwrap();
    assert_eq!(deleted.borrow().as_slice(), &["things/lamp/shadow/delete/accepted".to_string()]);
    assert_eq!(transport.link().written.last().unwrap(), &vec![0x40, 0x02, 0x00, 21]);
}
