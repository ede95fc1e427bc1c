use libshadow::network::application::mqtt::packet::{
    self, decode_remaining_length, decode_remaining_length_with, encode_remaining_length, remaining_length_size,
};
use libshadow::network::application::mqtt::{topic, Error, QoS};
use rand::Rng;

#[test]
fn test_remaining_length_random_values() {
    let mut rng = rand::thread_rng();
    for _ in 0..1_000 {
        let len = rng.gen_range(0..=268_435_455usize);
        let mut out = [0u8; 4];
        let n = encode_remaining_length(len, &mut out).unwrap();
        assert_eq!(n, remaining_length_size(len));
        assert_eq!(decode_remaining_length(&out[..n]), Ok((len, n)));

        let mut bytes = out[..n].iter().copied();
        let streamed = decode_remaining_length_with(|| bytes.next().ok_or(Error::MalformedPacket));
        assert_eq!(streamed, Ok(len));
    }
}

#[test]
fn test_truncated_remaining_length() {
    assert_eq!(decode_remaining_length(&[0x80, 0x80]), Err(Error::MalformedPacket));
    assert_eq!(decode_remaining_length(&[]), Err(Error::MalformedPacket));
}

#[test]
fn test_publish_random_payloads() {
    let mut rng = rand::thread_rng();
    let mut buf = [0u8; 512];
    for _ in 0..100 {
        let mut payload = vec![0u8; rng.gen_range(0..400)];
        rng.fill(&mut payload[..]);
        let qos = if rng.gen_bool(0.5) {
            QoS::AtLeastOnce
        } else {
            QoS::AtMostOnce
        };
        let id = rng.gen_range(1..=u16::MAX);

        let len = packet::serialize_publish(&mut buf, "sensors/t", &payload, qos, false, false, id).unwrap();
        let publish = packet::deserialize_publish(&buf[..len]).unwrap();
        assert_eq!(publish.topic, "sensors/t");
        assert_eq!(publish.message.qos, qos);
        assert_eq!(publish.message.payload, &payload[..]);
        let expected_id = if qos == QoS::AtMostOnce { 0 } else { id };
        assert_eq!(publish.message.id, expected_id);
    }

    let mut small = [0u8; 16];
    assert_eq!(
        packet::serialize_publish(&mut small, "sensors/t", &[0u8; 32], QoS::AtMostOnce, false, false, 0),
        Err(Error::TxBufferTooShort)
    );
}

#[test]
fn test_topic_filters() {
    let cases = [
        ("sdk/Test", "sdk/Test", true),
        ("sdk/+", "sdk/Test", true),
        ("sdk/+", "sdk/Test/deep", false),
        ("sdk/#", "sdk/Test/deep", true),
        ("+/+/temp", "home/kitchen/temp", true),
        ("+/+/temp", "home/kitchen/humidity", false),
        ("#", "anything/at/all", true),
        ("things/+/shadow/update/delta", "things/lamp/shadow/update/delta", true),
        ("things/lamp/shadow/update/delta", "things/lamp/shadow/update", false),
    ];
    for (filter, topic_name, expected) in cases {
        assert_eq!(
            topic::matches(filter, topic_name),
            expected,
            "{} vs {}",
            filter,
            topic_name
        );
    }
}
