//! The pub/sub transport contract.
//!
//! The agent is transport-agnostic: anything that can publish, subscribe and
//! deliver inbound messages works: an MQTT client, a test double, a local
//! broker loop. Connection management, certificates and socket-level retry
//! all live behind this seam.

use core::fmt::Write as _;

use heapless::{String, Vec};

use crate::error::Error;

/// Maximum length of a topic name.
pub const TOPIC_MAX: usize = 128;
/// Maximum size of an inbound message payload.
pub const INBOUND_PAYLOAD_MAX: usize = 512;

/// An inbound pub/sub message.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct InboundMessage {
    /// The topic on which the message was published.
    pub topic: String<TOPIC_MAX>,
    /// The message payload data.
    pub payload: Vec<u8, INBOUND_PAYLOAD_MAX>,
}

/// The narrow transport interface the agent requires.
///
/// All methods are called from the agent task only. `poll` drives protocol
/// keepalive and reconnection and returns at most one queued inbound message
/// per call, so every message is dispatched synchronously in the loop
/// context.
pub trait Transport {
    /// Associated error type.
    type Error: core::fmt::Debug;

    /// Establish the connection. Called once at startup; failure is fatal to
    /// the agent task.
    fn connect(&mut self) -> Result<(), Self::Error>;

    /// Tear the connection down. Called once during cooperative stop.
    fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Publish a payload to a topic.
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Self::Error>;

    /// Subscribe to a topic.
    fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error>;

    /// Unsubscribe from a topic. Used to drop stale subscriptions before
    /// re-subscribing.
    fn unsubscribe(&mut self, topic: &str) -> Result<(), Self::Error>;

    /// Block for up to `timeout_ms`, driving keepalive, and return the next
    /// queued inbound message if one arrived.
    fn poll(&mut self, timeout_ms: u32) -> Result<Option<InboundMessage>, Self::Error>;
}

/// Topic suffixes appended to the device id. Cloud-side tooling depends on
/// these exact strings.
pub mod topics {
    /// One-time device identity report.
    pub const INFO: &str = "device/info";
    /// One-shot diagnostics payloads.
    pub const DIAGNOSTICS: &str = "device/diagnostics";
    /// Update notifications from the cloud.
    pub const OTA_URL: &str = "device/otaurl";
    /// Update-availability announcement from the device.
    pub const OTA_FETCH: &str = "device/otafetch";
    /// Upgrade status reports from the device.
    pub const OTA_STATUS: &str = "device/otastatus";
    /// Shadow update documents from the device.
    pub const SHADOW_UPDATE: &str = "shadow/update";
    /// Remote desired-value change notifications.
    pub const SHADOW_DELTA: &str = "shadow/update/delta";
    /// Shadow update acknowledgment.
    pub const SHADOW_ACCEPTED: &str = "shadow/update/accepted";
    /// Shadow update rejection.
    pub const SHADOW_REJECTED: &str = "shadow/update/rejected";
}

/// Build `{device_id}/{suffix}` into a bounded topic string.
pub fn device_topic(device_id: &str, suffix: &str) -> Result<String<TOPIC_MAX>, Error> {
    let mut topic = String::new();
    write!(topic, "{device_id}/{suffix}").map_err(|_| Error::DocTooLarge)?;
    Ok(topic)
}

/// True if `topic` is `{device_id}/{suffix}`.
pub fn topic_matches(topic: &str, device_id: &str, suffix: &str) -> bool {
    topic
        .strip_prefix(device_id)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|rest| rest == suffix)
}
