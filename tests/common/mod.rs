#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use libshadow::network::application::mqtt::QoS;
use libshadow::network::application::mqtt::packet::{self, PacketType};
use libshadow::network::{Transport, TransportError};
use libshadow::system::timer::Clock;

/// Broker side of the mock link.
///
/// Every packet the client writes is recorded and, unless switched off,
/// answered the way a broker would.
#[derive(Debug)]
pub struct Link {
    pub inbound: VecDeque<u8>,
    pub written: Vec<Vec<u8>>,
    pub open: bool,
    pub physical: bool,
    pub fail_connect: bool,
    pub fail_read: bool,
    pub fail_write: bool,
    pub connects: usize,
    pub destroys: usize,
    /// CONNACK return code, or `None` to stay silent.
    pub connack: Option<u8>,
    /// Overrides the granted QoS in SUBACKs.
    pub suback_code: Option<u8>,
    pub puback: bool,
    pub unsuback: bool,
    pub pingresp: bool,
    pub subscribed: Vec<(String, u8)>,
    pub unsubscribed: Vec<String>,
    pub published: Vec<(String, Vec<u8>, QoS)>,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            inbound: VecDeque::new(),
            written: Vec::new(),
            open: false,
            physical: true,
            fail_connect: false,
            fail_read: false,
            fail_write: false,
            connects: 0,
            destroys: 0,
            connack: Some(0),
            suback_code: None,
            puback: true,
            unsuback: true,
            pingresp: true,
            subscribed: Vec::new(),
            unsubscribed: Vec::new(),
            published: Vec::new(),
        }
    }
}

impl Link {
    pub fn push(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }

    /// Queue a PUBLISH from the broker.
    pub fn deliver(&mut self, topic: &str, payload: &[u8], qos: QoS, id: u16) {
        self.push(&publish_packet(topic, payload, qos, id));
    }

    pub fn written_types(&self) -> Vec<PacketType> {
        self.written
            .iter()
            .filter_map(|p| packet::FixedHeader::from_byte(p[0]).ok())
            .map(|h| h.packet_type)
            .collect()
    }

    fn respond(&mut self, bytes: &[u8]) {
        let Ok((header, mut r)) = packet::read_header(bytes) else {
            return;
        };
        match header.packet_type {
            PacketType::Connect => {
                if let Some(code) = self.connack {
                    self.push(&[0x20, 0x02, 0x00, code]);
                }
            }
            PacketType::Subscribe => {
                let id = r.get_u16().unwrap();
                let mut codes = Vec::new();
                while r.remaining() > 0 {
                    let filter = String::from_utf8(r.get_utf8().unwrap().to_vec()).unwrap();
                    let qos = r.get_u8().unwrap();
                    self.subscribed.push((filter, qos));
                    codes.push(self.suback_code.unwrap_or(qos));
                }
                let mut suback = vec![0x90, 2 + codes.len() as u8];
                suback.extend_from_slice(&id.to_be_bytes());
                suback.extend_from_slice(&codes);
                self.push(&suback);
            }
            PacketType::Unsubscribe => {
                let id = r.get_u16().unwrap();
                while r.remaining() > 0 {
                    let filter = String::from_utf8(r.get_utf8().unwrap().to_vec()).unwrap();
                    self.unsubscribed.push(filter);
                }
                if self.unsuback {
                    let [hi, lo] = id.to_be_bytes();
                    self.push(&[0xB0, 0x02, hi, lo]);
                }
            }
            PacketType::Publish => {
                let publish = packet::deserialize_publish(bytes).unwrap();
                self.published.push((
                    publish.topic.to_string(),
                    publish.message.payload.to_vec(),
                    publish.message.qos,
                ));
                if publish.message.qos == QoS::AtLeastOnce && self.puback {
                    let [hi, lo] = publish.message.id.to_be_bytes();
                    self.push(&[0x40, 0x02, hi, lo]);
                }
            }
            PacketType::Pingreq => {
                if self.pingresp {
                    self.push(&[0xD0, 0x00]);
                }
            }
            _ => {}
        }
    }
}

/// Client side of the mock link. Clones share the same [`Link`].
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    pub link: Rc<RefCell<Link>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(&self) -> std::cell::RefMut<'_, Link> {
        self.link.borrow_mut()
    }
}

impl Transport for MockTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        let mut link = self.link.borrow_mut();
        link.connects += 1;
        if link.fail_connect {
            return Err(TransportError::ConnectFailed);
        }
        link.open = true;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], _timeout_ms: u32) -> Result<usize, TransportError> {
        let mut link = self.link.borrow_mut();
        if link.fail_read {
            return Err(TransportError::ReadError);
        }
        if !link.open {
            return Err(TransportError::NotOpen);
        }
        let n = buf.len().min(link.inbound.len());
        for slot in buf.iter_mut().take(n) {
            *slot = link.inbound.pop_front().unwrap();
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8], _timeout_ms: u32) -> Result<usize, TransportError> {
        let mut link = self.link.borrow_mut();
        if link.fail_write {
            return Err(TransportError::WriteError);
        }
        if !link.open {
            return Err(TransportError::NotOpen);
        }
        link.written.push(buf.to_vec());
        link.respond(buf);
        Ok(buf.len())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.link.borrow_mut().open = false;
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        self.link.borrow().physical
    }

    fn destroy(&mut self) -> Result<(), TransportError> {
        let mut link = self.link.borrow_mut();
        link.destroys += 1;
        link.open = false;
        Ok(())
    }
}

/// A clock that moves forward by `step` milliseconds every time it is read,
/// so blocking loops always make progress.
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Rc<Cell<u64>>,
    step: u64,
    delays: Rc<RefCell<Vec<u32>>>,
}

impl MockClock {
    pub fn new(step: u64) -> Self {
        Self {
            now: Rc::new(Cell::new(1)),
            step,
            delays: Rc::default(),
        }
    }

    /// Every `delay_ms` requested so far.
    pub fn delays(&self) -> Vec<u32> {
        self.delays.borrow().clone()
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    pub fn elapsed(&self) -> u64 {
        self.now.get()
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        let now = self.now.get();
        self.now.set(now + self.step);
        now
    }

    fn delay_ms(&self, ms: u32) {
        self.delays.borrow_mut().push(ms);
        self.advance(u64::from(ms));
    }
}

pub fn publish_packet(topic: &str, payload: &[u8], qos: QoS, id: u16) -> Vec<u8> {
    let mut buf = vec![0u8; topic.len() + payload.len() + 16];
    let len = packet::serialize_publish(&mut buf, topic, payload, qos, false, false, id).unwrap();
    buf.truncate(len);
    buf
}
