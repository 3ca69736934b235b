//! The agent task: configuration, lifecycle and the run loop.
//!
//! One `Agent` owns every piece of mutable state: the parameter table, the
//! shadow sync bookkeeping, the OTA session, the diagnostics scheduler. A
//! single long-running call to [`Agent::run`] drives all of it. Other
//! contexts interact only through the shared [`WorkQueue`]: submitted items
//! execute inside the loop against the [`CloudAgent`] facade, so no state is
//! ever touched from two contexts at once.
//!
//! Loop shape: drain the queue, poll the transport and dispatch at most one
//! inbound message, advance the diagnostics countdowns, then fold any dirty
//! parameters into a shadow update. A cooperative stop request is honored at
//! the top of the next iteration.

use core::fmt;

use heapless::String;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::diagnostics::{DiagPayload, DiagScheduler};
use crate::error::Error;
use crate::ota::{
    FirmwareVersion, OtaEngine, OtaFetch, OtaNotice, OtaPlatform, OtaState, OtaStatus,
    PersistedOtaFlag, StatusReport, VERSION_STR_MAX,
};
use crate::param::{ParamCallback, ParamTable, StaticParam};
use crate::queue::{Work, WorkItem, WorkQueue};
use crate::shadow::{self, SHADOW_DOC_MAX, SyncState};
use crate::storage::{KeyValueStorage, keys};
use crate::transport::{InboundMessage, Transport, device_topic, topic_matches, topics};
use crate::value::ParamValue;

/// Maximum length of the stored device identifier.
pub const DEVICE_ID_MAX: usize = 32;

/// Transport poll timeout of one steady-state loop iteration, in
/// milliseconds. Also the time base for diagnostics countdowns.
pub const LOOP_POLL_MS: u32 = 100;

/// Transport poll timeout while waiting for a shadow update acknowledgment.
pub const ACK_POLL_MS: u32 = 50;

/// How many acknowledgment polls a loop pass spends on an outstanding shadow
/// update before treating it as timed out.
pub const SHADOW_ACK_POLL_BUDGET: usize = 8;

/// Device identity handed to [`Agent::new`].
///
/// The four attributes are registered as static parameters and reported once
/// in the device-info document; `fw_version` additionally anchors OTA version
/// comparison. The counts size the parameter tables on top of the reserved
/// defaults.
#[derive(Debug, Clone, Copy)]
pub struct DeviceConfig<'a> {
    /// Human-readable device name.
    pub name: &'a str,
    /// Device category.
    pub device_type: &'a str,
    /// Hardware model.
    pub model: &'a str,
    /// Running firmware version, `major.minor.patch`.
    pub fw_version: &'a str,
    /// Static parameters the application intends to register.
    pub static_params_count: usize,
    /// Dynamic parameters the application intends to register.
    pub dynamic_params_count: usize,
}

/// Lifecycle notifications delivered from the loop context.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AgentEvent {
    /// Startup finished: connected, subscribed, identity and full state
    /// reported. Delivered exactly once per [`Agent::run`] call.
    InitDone,
    /// A firmware download is about to start.
    OtaStart,
    /// The firmware download attempt finished (either way).
    OtaEnd,
}

/// The narrow agent surface [`Work`] items run against.
///
/// Object-safe on purpose: queued work sees the agent only through this
/// trait, independent of the transport, storage and platform type parameters.
pub trait CloudAgent {
    /// The device identifier read from storage.
    fn device_id(&self) -> &str;

    /// Update a boolean parameter and mark it for the next shadow sync.
    fn update_bool_param(&mut self, name: &str, value: bool) -> Result<(), Error>;

    /// Update an integer parameter and mark it for the next shadow sync.
    fn update_int_param(&mut self, name: &str, value: i32) -> Result<(), Error>;

    /// Update a float parameter and mark it for the next shadow sync.
    fn update_float_param(&mut self, name: &str, value: f32) -> Result<(), Error>;

    /// Update a string parameter and mark it for the next shadow sync.
    fn update_string_param(&mut self, name: &str, value: &str) -> Result<(), Error>;

    /// Publish a one-shot diagnostics payload immediately.
    fn publish_diagnostics(&mut self, payload: &DiagPayload<'_>) -> Result<(), Error>;

    /// Stop the run loop at the next iteration.
    fn request_stop(&mut self);
}

/// The device-info document published once at startup.
struct InfoReport<'a> {
    device_id: &'a str,
    statics: &'a [StaticParam],
}

impl Serialize for InfoReport<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1 + self.statics.len()))?;
        map.serialize_entry("device_id", self.device_id)?;
        for param in self.statics {
            map.serialize_entry(param.name(), param.value())?;
        }
        map.end()
    }
}

enum Route {
    ShadowDelta,
    ShadowAck,
    OtaUrl,
    Unknown,
}

/// The cloud shadow agent.
///
/// Construct with [`Agent::new`], register parameters, optionally enable OTA
/// and diagnostics, then hand the calling task over to [`Agent::run`]. The
/// work queue is created by the caller and shared: any context holding the
/// reference can submit work or request a stop while the loop runs.
pub struct Agent<'cb, T: Transport, K: KeyValueStorage, P: OtaPlatform> {
    queue: &'cb WorkQueue<'cb>,
    transport: T,
    storage: K,
    device_id: String<DEVICE_ID_MAX>,
    fw_version: FirmwareVersion,
    fw_version_str: String<VERSION_STR_MAX>,
    params: ParamTable<'cb>,
    sync: SyncState,
    diag: DiagScheduler<'cb>,
    /// Poll time spent waiting for shadow acks since the last diagnostics
    /// tick, so countdowns track real loop time under shadow traffic.
    ack_elapsed_ms: u32,
    ota: Option<OtaEngine<P>>,
    stop: bool,
}

impl<'cb, T: Transport, K: KeyValueStorage, P: OtaPlatform> Agent<'cb, T, K, P> {
    /// Create an agent.
    ///
    /// Reads the device identifier from storage (key
    /// [`keys::DEVICE_ID`]; absent → [`Error::MissingIdentity`]) and seeds
    /// the static table with the identity attributes `name`, `type`, `model`
    /// and `fw_version`.
    pub fn new(
        config: DeviceConfig<'_>,
        transport: T,
        mut storage: K,
        queue: &'cb WorkQueue<'cb>,
    ) -> Result<Self, Error> {
        let mut buf = [0u8; DEVICE_ID_MAX];
        let len = storage
            .get(keys::DEVICE_ID, &mut buf)
            .map_err(|_| Error::Storage)?
            .ok_or(Error::MissingIdentity)?;
        let device_id = core::str::from_utf8(&buf[..len]).map_err(|_| Error::MissingIdentity)?;
        let device_id = String::try_from(device_id).map_err(|_| Error::MissingIdentity)?;

        let fw_version: FirmwareVersion = config.fw_version.parse()?;
        let fw_version_str =
            String::try_from(config.fw_version).map_err(|_| Error::ValueTooLarge)?;

        let mut params = ParamTable::new(config.static_params_count, config.dynamic_params_count);
        for (name, text) in [
            ("name", config.name),
            ("type", config.device_type),
            ("model", config.model),
            ("fw_version", config.fw_version),
        ] {
            let value = ParamValue::str(text).ok_or(Error::ValueTooLarge)?;
            params.add_static(name, value)?;
        }

        Ok(Agent {
            queue,
            transport,
            storage,
            device_id,
            fw_version,
            fw_version_str,
            params,
            sync: SyncState::new(),
            diag: DiagScheduler::new(),
            ack_elapsed_ms: 0,
            ota: None,
            stop: false,
        })
    }

    /// The device identifier read from storage.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The parameter store.
    pub fn params(&self) -> &ParamTable<'cb> {
        &self.params
    }

    /// The OTA session state, if OTA has been enabled.
    pub fn ota_state(&self) -> Option<OtaState> {
        self.ota.as_ref().map(|e| e.state())
    }

    /// Register a static boolean parameter.
    pub fn add_static_bool_param(&mut self, name: &str, value: bool) -> Result<(), Error> {
        self.params.add_static(name, value.into())
    }

    /// Register a static integer parameter.
    pub fn add_static_int_param(&mut self, name: &str, value: i32) -> Result<(), Error> {
        self.params.add_static(name, value.into())
    }

    /// Register a static float parameter.
    pub fn add_static_float_param(&mut self, name: &str, value: f32) -> Result<(), Error> {
        self.params.add_static(name, value.into())
    }

    /// Register a static string parameter.
    pub fn add_static_string_param(&mut self, name: &str, value: &str) -> Result<(), Error> {
        let value = ParamValue::str(value).ok_or(Error::ValueTooLarge)?;
        self.params.add_static(name, value)
    }

    /// Register a dynamic boolean parameter.
    pub fn add_dynamic_bool_param(
        &mut self,
        name: &str,
        initial: bool,
        callback: Option<&'cb dyn ParamCallback>,
    ) -> Result<(), Error> {
        self.params.add_dynamic(name, initial.into(), callback)
    }

    /// Register a dynamic integer parameter.
    pub fn add_dynamic_int_param(
        &mut self,
        name: &str,
        initial: i32,
        callback: Option<&'cb dyn ParamCallback>,
    ) -> Result<(), Error> {
        self.params.add_dynamic(name, initial.into(), callback)
    }

    /// Register a dynamic float parameter.
    pub fn add_dynamic_float_param(
        &mut self,
        name: &str,
        initial: f32,
        callback: Option<&'cb dyn ParamCallback>,
    ) -> Result<(), Error> {
        self.params.add_dynamic(name, initial.into(), callback)
    }

    /// Register a dynamic string parameter with an explicit bound for values
    /// received from the cloud.
    pub fn add_dynamic_string_param(
        &mut self,
        name: &str,
        initial: &str,
        max_len: usize,
        callback: Option<&'cb dyn ParamCallback>,
    ) -> Result<(), Error> {
        self.params.add_dynamic_str(name, initial, max_len, callback)
    }

    /// Enable OTA with the given platform. May be called once; the check
    /// itself (subscribe, boot-flag consumption, version announcement) runs
    /// inside the loop via a queued [`WorkItem::OtaCheck`].
    pub fn enable_ota(&mut self, platform: P) -> Result<(), Error> {
        if self.ota.is_some() {
            return Err(Error::OtaUnavailable);
        }
        self.ota = Some(OtaEngine::new(platform));
        self.queue.submit(WorkItem::OtaCheck)
    }

    /// Submit a forced (administrator-initiated) update. Drives the same
    /// upgrade path as a cloud notification, with the persisted flag marking
    /// the forced attempt across the reboot.
    pub fn force_update(&self, notice: OtaNotice) -> Result<(), Error> {
        if self.ota.is_none() {
            return Err(Error::OtaUnavailable);
        }
        self.queue.submit(WorkItem::ForceUpdate(notice))
    }

    /// Register periodic diagnostics work. The first firing is submitted
    /// immediately; later firings follow every `period_ms` of loop time,
    /// measured in [`LOOP_POLL_MS`] increments.
    pub fn register_periodic_diagnostics(
        &mut self,
        work: &'cb dyn Work,
        period_ms: u32,
    ) -> Result<(), Error> {
        self.diag.register_periodic(work, period_ms, self.queue)
    }

    /// Queue a one-shot diagnostics payload for publication from the loop.
    pub fn submit_diagnostics(&self, payload: DiagPayload<'cb>) -> Result<(), Error> {
        self.queue.submit(WorkItem::Diagnostics(payload))
    }

    /// Run the agent task. Blocks until a stop is requested.
    ///
    /// Startup: connect (failure is fatal), subscribe the shadow topics,
    /// publish the device-info document and a full-state report, then emit
    /// [`AgentEvent::InitDone`]. Steady state: drain the queue, poll the
    /// transport, tick diagnostics, sync dirty parameters. `on_event` is
    /// called from the loop context and must not block.
    ///
    /// Only the initial connect is fatal. Transport failures after it are
    /// absorbed: a failed publish loses that message (a lost shadow update
    /// stays lost until the next change re-dirties the parameter), a failed
    /// poll skips to the next iteration, and the loop keeps running until a
    /// stop is requested.
    ///
    /// A dirty set whose document exceeds [`SHADOW_DOC_MAX`] is dropped
    /// whole, flags included; nothing truncated is ever published.
    pub fn run(&mut self, on_event: &mut dyn FnMut(AgentEvent)) -> Result<(), Error> {
        self.transport.connect().map_err(|_| Error::Transport)?;
        for suffix in [
            topics::SHADOW_DELTA,
            topics::SHADOW_ACCEPTED,
            topics::SHADOW_REJECTED,
        ] {
            if let Ok(topic) = device_topic(&self.device_id, suffix) {
                let _ = self.transport.subscribe(&topic);
            }
        }

        let _ = self.report_device_info();
        let _ = self.publish_full_state(on_event);
        on_event(AgentEvent::InitDone);

        loop {
            self.drain(on_event);
            if let Ok(Some(msg)) = self.transport.poll(LOOP_POLL_MS) {
                self.dispatch(msg, on_event);
            }
            self.tick_diagnostics();
            self.sync_shadow(on_event);
            // Honored only here: a stop request lets the iteration finish,
            // so changes made by queued work still sync before shutdown.
            if self.stop {
                break;
            }
        }

        let _ = self.transport.disconnect();
        self.stop = false;
        Ok(())
    }

    fn drain(&mut self, on_event: &mut dyn FnMut(AgentEvent)) {
        let queue = self.queue;
        while let Some(item) = queue.take() {
            match item {
                WorkItem::User(work) => work.run(self),
                WorkItem::Diagnostics(payload) => {
                    // Best effort: a failed publish drops the payload.
                    let _ = self.publish_diagnostics(&payload);
                }
                WorkItem::OtaCheck => {
                    let _ = self.run_ota_check();
                }
                WorkItem::ForceUpdate(notice) => {
                    let _ = self.handle_notice(&notice, true, on_event);
                }
                WorkItem::Stop => self.stop = true,
            }
        }
    }

    fn route(&self, topic: &str) -> Route {
        if topic_matches(topic, &self.device_id, topics::SHADOW_DELTA) {
            Route::ShadowDelta
        } else if topic_matches(topic, &self.device_id, topics::SHADOW_ACCEPTED)
            || topic_matches(topic, &self.device_id, topics::SHADOW_REJECTED)
        {
            Route::ShadowAck
        } else if topic_matches(topic, &self.device_id, topics::OTA_URL) {
            Route::OtaUrl
        } else {
            Route::Unknown
        }
    }

    fn dispatch(&mut self, msg: InboundMessage, on_event: &mut dyn FnMut(AgentEvent)) {
        match self.route(&msg.topic) {
            Route::ShadowDelta => {
                // A malformed delta aborts that message only.
                let _ = shadow::apply_delta(&mut self.params, &msg.payload);
            }
            Route::ShadowAck => self.sync.acknowledge(),
            Route::OtaUrl => {
                if let Ok((notice, _)) = serde_json_core::from_slice::<OtaNotice>(&msg.payload) {
                    let _ = self.handle_notice(&notice, false, on_event);
                }
            }
            Route::Unknown => {}
        }
    }

    fn tick_diagnostics(&mut self) {
        let elapsed = LOOP_POLL_MS + self.ack_elapsed_ms;
        self.ack_elapsed_ms = 0;
        self.diag.tick(elapsed, self.queue);
    }

    fn report_device_info(&mut self) -> Result<(), Error> {
        let topic = device_topic(&self.device_id, topics::INFO)?;
        let report = InfoReport {
            device_id: &self.device_id,
            statics: self.params.statics(),
        };
        let mut buf = [0u8; SHADOW_DOC_MAX];
        let len = serde_json_core::to_slice(&report, &mut buf).map_err(|_| Error::DocTooLarge)?;
        self.transport
            .publish(&topic, &buf[..len])
            .map_err(|_| Error::Transport)
    }

    fn publish_full_state(&mut self, on_event: &mut dyn FnMut(AgentEvent)) -> Result<(), Error> {
        let mut buf = [0u8; SHADOW_DOC_MAX];
        let len = shadow::build_update(self.params.dynamics(), true, &mut buf)?;
        self.publish_shadow(&buf[..len])?;
        self.await_ack(on_event);
        Ok(())
    }

    fn publish_shadow(&mut self, doc: &[u8]) -> Result<(), Error> {
        let topic = device_topic(&self.device_id, topics::SHADOW_UPDATE)?;
        self.transport
            .publish(&topic, doc)
            .map_err(|_| Error::Transport)?;
        self.sync.mark_outstanding();
        Ok(())
    }

    fn sync_shadow(&mut self, on_event: &mut dyn FnMut(AgentEvent)) {
        if self.sync.outstanding() {
            self.await_ack(on_event);
            return;
        }
        if !self.params.any_dirty() {
            return;
        }
        let mut buf = [0u8; SHADOW_DOC_MAX];
        let len = match shadow::build_update(self.params.dynamics(), false, &mut buf) {
            Ok(len) => len,
            Err(_) => {
                // Oversized dirty set: drop it whole rather than truncate.
                self.params.clear_dirty();
                return;
            }
        };
        // Cleared on handoff, not on ack: a lost publish stays lost until
        // the next change re-dirties the parameter.
        self.params.clear_dirty();
        if self.publish_shadow(&buf[..len]).is_ok() {
            self.await_ack(on_event);
        }
    }

    fn await_ack(&mut self, on_event: &mut dyn FnMut(AgentEvent)) {
        for _ in 0..SHADOW_ACK_POLL_BUDGET {
            if !self.sync.outstanding() {
                return;
            }
            // Each poll blocks for up to the ack timeout; charge it to the
            // diagnostics time base.
            self.ack_elapsed_ms += ACK_POLL_MS;
            if let Ok(Some(msg)) = self.transport.poll(ACK_POLL_MS) {
                self.dispatch(msg, on_event);
            }
        }
        // Budget exhausted counts as a timeout; do not wedge the loop.
        self.sync.acknowledge();
    }

    fn persist_flag(&mut self, flag: PersistedOtaFlag) -> Result<(), Error> {
        self.storage
            .set_u8(keys::OTA_FLAG, flag.as_byte())
            .map_err(|_| Error::Storage)
    }

    /// The enable-time check: (re)subscribe to notifications, consume the
    /// boot flag into a status report, announce the running version.
    fn run_ota_check(&mut self) -> Result<(), Error> {
        if self.ota.is_none() {
            return Err(Error::OtaUnavailable);
        }
        let otaurl = device_topic(&self.device_id, topics::OTA_URL)?;
        // Stale-subscription guard: a previous session's subscription may
        // still be registered broker-side.
        let _ = self.transport.unsubscribe(&otaurl);
        self.transport
            .subscribe(&otaurl)
            .map_err(|_| Error::Transport)?;

        self.consume_boot_flag()?;

        let topic = device_topic(&self.device_id, topics::OTA_FETCH)?;
        let fetch = OtaFetch {
            device_id: &self.device_id,
            fw_version: &self.fw_version_str,
        };
        let mut buf = [0u8; SHADOW_DOC_MAX];
        let len = serde_json_core::to_slice(&fetch, &mut buf).map_err(|_| Error::DocTooLarge)?;
        self.transport
            .publish(&topic, &buf[..len])
            .map_err(|_| Error::Transport)?;

        if let Some(engine) = &mut self.ota {
            engine.set_state(OtaState::CheckSubscribed);
        }
        Ok(())
    }

    /// Exhaustive handling of the reboot-surviving outcome flag. Every
    /// variant with a pending outcome produces exactly one status report and
    /// resets the stored byte to `Init`.
    fn consume_boot_flag(&mut self) -> Result<(), Error> {
        let flag = self
            .storage
            .get_u8(keys::OTA_FLAG)
            .map_err(|_| Error::Storage)?
            .map(PersistedOtaFlag::from_byte)
            .unwrap_or(PersistedOtaFlag::Invalid);
        let version = self.fw_version_str.clone();
        match flag {
            PersistedOtaFlag::Init => Ok(()),
            PersistedOtaFlag::Invalid => self.persist_flag(PersistedOtaFlag::Init),
            PersistedOtaFlag::AppOtaOk => {
                self.report_ota_status(OtaStatus::Success, &version, "verified by application")?;
                self.persist_flag(PersistedOtaFlag::Init)
            }
            PersistedOtaFlag::AppOtaFail => {
                self.report_ota_status(OtaStatus::Failed, &version, "rejected by application")?;
                self.persist_flag(PersistedOtaFlag::Init)
            }
            PersistedOtaFlag::ForceOtaStart => {
                self.report_ota_status(OtaStatus::Failed, &version, "forced update incomplete")?;
                self.persist_flag(PersistedOtaFlag::Init)
            }
            PersistedOtaFlag::ForceOtaFinish => {
                self.report_ota_status(OtaStatus::Success, &version, "forced update applied")?;
                self.persist_flag(PersistedOtaFlag::Init)
            }
        }
    }

    fn report_ota_status(
        &mut self,
        status: OtaStatus,
        ota_version: &str,
        info: &str,
    ) -> Result<(), Error> {
        if let Some(engine) = &mut self.ota {
            if !engine.note_report(status) {
                return Ok(());
            }
        }
        let topic = device_topic(&self.device_id, topics::OTA_STATUS)?;
        let report = StatusReport {
            device_id: &self.device_id,
            ota_version,
            device_otastatus: status,
            additional_info: info,
        };
        let mut buf = [0u8; SHADOW_DOC_MAX];
        let len = serde_json_core::to_slice(&report, &mut buf).map_err(|_| Error::DocTooLarge)?;
        self.transport
            .publish(&topic, &buf[..len])
            .map_err(|_| Error::Transport)
    }

    fn handle_notice(
        &mut self,
        notice: &OtaNotice,
        force: bool,
        on_event: &mut dyn FnMut(AgentEvent),
    ) -> Result<(), Error> {
        let Some(engine) = self.ota.as_mut() else {
            return Err(Error::OtaUnavailable);
        };
        // Re-entrancy guard: one attempt at a time, later notices ignored.
        if engine.in_progress() {
            return Ok(());
        }
        engine.begin(&notice.ota_version, force);

        let mut result = if force {
            self.persist_flag(PersistedOtaFlag::ForceOtaStart)
        } else {
            Ok(())
        };
        let state = if result.is_ok() {
            let (state, attempt) = self.drive_attempt(notice, force, on_event);
            result = attempt;
            state
        } else {
            OtaState::Failed
        };
        self.finish_attempt(state);
        result
    }

    fn drive_attempt(
        &mut self,
        notice: &OtaNotice,
        force: bool,
        on_event: &mut dyn FnMut(AgentEvent),
    ) -> (OtaState, Result<(), Error>) {
        let offered = match notice.ota_version.parse::<FirmwareVersion>() {
            Ok(v) => v,
            Err(e) => {
                let r = self.report_ota_status(OtaStatus::Failed, &notice.ota_version, "malformed version");
                return (OtaState::Failed, r.and(Err(e)));
            }
        };

        if offered == self.fw_version {
            // The offered image is already running. Persist the outcome so
            // the post-reboot check reports it, skip the download.
            let flag = if force {
                PersistedOtaFlag::ForceOtaFinish
            } else {
                PersistedOtaFlag::AppOtaOk
            };
            let r = self.persist_flag(flag).and_then(|()| {
                self.report_ota_status(OtaStatus::Success, &notice.ota_version, "already applied")
            });
            return (OtaState::Success, r);
        }

        if offered < self.fw_version {
            let r = self.report_ota_status(OtaStatus::Failed, &notice.ota_version, "older than running");
            return (OtaState::Failed, r);
        }

        if let Some(engine) = &mut self.ota {
            engine.set_state(OtaState::UpdateAvailable);
        }
        if let Err(e) =
            self.report_ota_status(OtaStatus::InProgress, &notice.ota_version, "downloading")
        {
            return (OtaState::Failed, Err(e));
        }

        on_event(AgentEvent::OtaStart);
        let attempt = match &mut self.ota {
            Some(engine) => engine.apply_update(&notice.url, notice.file_size),
            None => Err(Error::OtaUnavailable),
        };
        on_event(AgentEvent::OtaEnd);

        match attempt {
            Ok(()) => {
                // App-initiated upgrades persist nothing here; the new image
                // marks itself good via the application. Forced upgrades
                // record completion so the next boot reports it.
                let r = if force {
                    self.persist_flag(PersistedOtaFlag::ForceOtaFinish)
                } else {
                    Ok(())
                };
                let r = r.and_then(|()| {
                    self.report_ota_status(OtaStatus::Success, &notice.ota_version, "upgrade staged")
                });
                (OtaState::Success, r)
            }
            Err(e) => {
                // Forced attempts leave ForceOtaStart in place so the next
                // boot reports the incomplete attempt.
                let r = if force {
                    Ok(())
                } else {
                    self.persist_flag(PersistedOtaFlag::AppOtaFail)
                };
                let _ =
                    self.report_ota_status(OtaStatus::Failed, &notice.ota_version, "upgrade failed");
                (OtaState::Failed, r.and(Err(e)))
            }
        }
    }

    /// Close the attempt and request the reboot. The device restarts after
    /// every attempt, successful or not, so the running image is always
    /// known.
    fn finish_attempt(&mut self, state: OtaState) {
        if let Some(engine) = &mut self.ota {
            engine.end(state);
            engine.reboot();
        }
    }
}

impl<'cb, T: Transport, K: KeyValueStorage, P: OtaPlatform> CloudAgent for Agent<'cb, T, K, P> {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn update_bool_param(&mut self, name: &str, value: bool) -> Result<(), Error> {
        self.params.update_local(name, value.into())
    }

    fn update_int_param(&mut self, name: &str, value: i32) -> Result<(), Error> {
        self.params.update_local(name, value.into())
    }

    fn update_float_param(&mut self, name: &str, value: f32) -> Result<(), Error> {
        self.params.update_local(name, value.into())
    }

    fn update_string_param(&mut self, name: &str, value: &str) -> Result<(), Error> {
        let value = ParamValue::str(value).ok_or(Error::ValueTooLarge)?;
        self.params.update_local(name, value)
    }

    fn publish_diagnostics(&mut self, payload: &DiagPayload<'_>) -> Result<(), Error> {
        let topic = device_topic(&self.device_id, topics::DIAGNOSTICS)?;
        self.transport
            .publish(&topic, payload.as_str().as_bytes())
            .map_err(|_| Error::Transport)
    }

    fn request_stop(&mut self) {
        self.stop = true;
    }
}

impl<T: Transport, K: KeyValueStorage, P: OtaPlatform> fmt::Debug for Agent<'_, T, K, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("device_id", &self.device_id)
            .field("fw_version", &self.fw_version)
            .field("ota", &self.ota.as_ref().map(|e| e.state()))
            .field("stop", &self.stop)
            .finish()
    }
}
