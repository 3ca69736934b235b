//! Shared mock collaborators for integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use libshadow::ota::{OtaPlatform, UpgradeError};
use libshadow::queue::WorkQueue;
use libshadow::storage::KeyValueStorage;
use libshadow::transport::{InboundMessage, Transport};

/// Call record shared between a [`MockTransport`] and the test body, so the
/// test can inspect traffic after the agent has taken ownership of the
/// transport.
#[derive(Default)]
pub struct TransportLog {
    pub published: RefCell<Vec<(String, Vec<u8>)>>,
    pub subscribed: RefCell<Vec<String>>,
    pub unsubscribed: RefCell<Vec<String>>,
    pub connects: Cell<u32>,
    pub disconnects: Cell<u32>,
}

impl TransportLog {
    /// Payloads published to topics ending in `suffix`, as UTF-8.
    pub fn published_to(&self, suffix: &str) -> Vec<String> {
        self.published
            .borrow()
            .iter()
            .filter(|(topic, _)| topic.ends_with(suffix))
            .map(|(_, payload)| String::from_utf8(payload.clone()).unwrap())
            .collect()
    }
}

/// Scripted transport: `poll` replays the `inbound` queue in order. With
/// `auto_ack` set, every shadow update is acknowledged on the next poll.
/// When the script runs dry, `stop_when_idle` submits a stop request so
/// `Agent::run` returns.
///
/// `fail_publish` injects one transient publish failure: `(suffix, skip)`
/// lets `skip` publishes to matching topics through, fails the next one,
/// then clears itself. `fail_polls` fails that many polls up front. Failed
/// calls are not recorded and produce no ack.
pub struct MockTransport<'a> {
    pub log: &'a TransportLog,
    pub inbound: VecDeque<InboundMessage>,
    pub auto_ack: bool,
    pub stop_when_idle: Option<&'a WorkQueue<'a>>,
    pub fail_connect: bool,
    pub fail_publish: Option<(&'static str, usize)>,
    pub fail_polls: usize,
}

impl<'a> MockTransport<'a> {
    pub fn new(log: &'a TransportLog) -> Self {
        MockTransport {
            log,
            inbound: VecDeque::new(),
            auto_ack: true,
            stop_when_idle: None,
            fail_connect: false,
            fail_publish: None,
            fail_polls: 0,
        }
    }

    pub fn push_inbound(&mut self, topic: &str, payload: &[u8]) {
        self.inbound.push_back(inbound(topic, payload));
    }
}

pub fn inbound(topic: &str, payload: &[u8]) -> InboundMessage {
    InboundMessage {
        topic: heapless::String::try_from(topic).unwrap(),
        payload: heapless::Vec::from_slice(payload).unwrap(),
    }
}

impl Transport for MockTransport<'_> {
    type Error = ();

    fn connect(&mut self) -> Result<(), ()> {
        if self.fail_connect {
            return Err(());
        }
        self.log.connects.set(self.log.connects.get() + 1);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), ()> {
        self.log.disconnects.set(self.log.disconnects.get() + 1);
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), ()> {
        if let Some((suffix, skip)) = self.fail_publish {
            if topic.ends_with(suffix) {
                if skip > 0 {
                    self.fail_publish = Some((suffix, skip - 1));
                } else {
                    self.fail_publish = None;
                    return Err(());
                }
            }
        }
        self.log
            .published
            .borrow_mut()
            .push((topic.to_string(), payload.to_vec()));
        if self.auto_ack && topic.ends_with("/shadow/update") {
            let ack = format!("{topic}/accepted");
            self.inbound.push_front(inbound(&ack, b"{}"));
        }
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), ()> {
        self.log.subscribed.borrow_mut().push(topic.to_string());
        Ok(())
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), ()> {
        self.log.unsubscribed.borrow_mut().push(topic.to_string());
        Ok(())
    }

    fn poll(&mut self, _timeout_ms: u32) -> Result<Option<InboundMessage>, ()> {
        if self.fail_polls > 0 {
            self.fail_polls -= 1;
            return Err(());
        }
        match self.inbound.pop_front() {
            Some(msg) => Ok(Some(msg)),
            None => {
                if let Some(queue) = self.stop_when_idle {
                    let _ = queue.submit_stop();
                }
                Ok(None)
            }
        }
    }
}

/// Backing state shared between a [`MockStorage`] and the test body.
#[derive(Default)]
pub struct StorageState {
    pub device_id: RefCell<Option<String>>,
    pub ota_flag: Cell<Option<u8>>,
    pub flag_writes: RefCell<Vec<u8>>,
}

impl StorageState {
    pub fn with_device_id(id: &str) -> Self {
        let state = StorageState::default();
        *state.device_id.borrow_mut() = Some(id.to_string());
        state
    }
}

pub struct MockStorage<'a> {
    pub state: &'a StorageState,
}

impl KeyValueStorage for MockStorage<'_> {
    type Error = ();

    fn get(&mut self, key: &str, buf: &mut [u8]) -> Result<Option<usize>, ()> {
        if key != "device_id" {
            return Ok(None);
        }
        match &*self.state.device_id.borrow() {
            Some(id) => {
                let bytes = id.as_bytes();
                if bytes.len() > buf.len() {
                    return Err(());
                }
                buf[..bytes.len()].copy_from_slice(bytes);
                Ok(Some(bytes.len()))
            }
            None => Ok(None),
        }
    }

    fn set_u8(&mut self, key: &str, value: u8) -> Result<(), ()> {
        if key == "ota_flag" {
            self.state.ota_flag.set(Some(value));
            self.state.flag_writes.borrow_mut().push(value);
        }
        Ok(())
    }

    fn get_u8(&mut self, key: &str) -> Result<Option<u8>, ()> {
        if key == "ota_flag" {
            Ok(self.state.ota_flag.get())
        } else {
            Ok(None)
        }
    }
}

/// Call record shared between a [`MockPlatform`] and the test body.
#[derive(Default)]
pub struct PlatformLog {
    pub updates: RefCell<Vec<(String, u32)>>,
    pub reboots: Cell<u32>,
}

pub struct MockPlatform<'a> {
    pub log: &'a PlatformLog,
    pub fail: bool,
}

impl OtaPlatform for MockPlatform<'_> {
    fn apply_update(&mut self, url: &str, file_size: u32) -> Result<(), UpgradeError> {
        self.log
            .updates
            .borrow_mut()
            .push((url.to_string(), file_size));
        if self.fail {
            Err(UpgradeError::Download)
        } else {
            Ok(())
        }
    }

    fn reboot(&mut self) {
        self.log.reboots.set(self.log.reboots.get() + 1);
    }
}
