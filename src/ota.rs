//! Firmware update types and the upgrade session.
//!
//! The agent never downloads or flashes anything itself; the platform does
//! that behind [`OtaPlatform`]. What lives here is the surrounding protocol
//! state: version comparison, the upgrade status reported upward, the
//! single-byte outcome flag persisted across the post-upgrade reboot, and the
//! session bookkeeping that serializes attempts.
//!
//! The device reboots after every attempt, successful or not, so the running
//! firmware is always a known image. Outcome reporting is therefore split
//! across the reboot: the flag is written before restarting and consumed into
//! a status report when OTA is enabled on the next boot.

use core::fmt;
use core::str::FromStr;

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Maximum length of a firmware version string.
pub const VERSION_STR_MAX: usize = 16;
/// Maximum length of a firmware image URL.
pub const OTA_URL_MAX: usize = 256;

/// A `major.minor.patch` firmware version.
///
/// Ordering is componentwise; an offered update is applied only when strictly
/// greater than the running version.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub struct FirmwareVersion {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Patch component.
    pub patch: u32,
}

impl FromStr for FirmwareVersion {
    type Err = Error;

    /// Parses exactly `major.minor.patch`; anything else is rejected.
    fn from_str(s: &str) -> Result<Self, Error> {
        let mut parts = s.split('.');
        let mut next = || {
            parts
                .next()
                .and_then(|p| p.parse::<u32>().ok())
                .ok_or(Error::ParseError)
        };
        let version = FirmwareVersion {
            major: next()?,
            minor: next()?,
            patch: next()?,
        };
        if parts.next().is_some() {
            return Err(Error::ParseError);
        }
        Ok(version)
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Upgrade status reported on the status topic.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum OtaStatus {
    /// Download and flash under way.
    #[serde(rename = "in-progress")]
    InProgress,
    /// The offered image is running (or already was).
    #[serde(rename = "success")]
    Success,
    /// The attempt failed; the previous image is still running.
    #[serde(rename = "failed")]
    Failed,
    /// The device postponed the update.
    #[serde(rename = "delayed")]
    Delayed,
}

/// Single-byte outcome flag persisted under [`keys::OTA_FLAG`] and consumed
/// on the next boot.
///
/// [`keys::OTA_FLAG`]: crate::storage::keys::OTA_FLAG
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PersistedOtaFlag {
    /// Nothing meaningful stored. Unknown bytes decode here.
    Invalid,
    /// Steady state; no outcome pending.
    Init,
    /// The application marked the last upgrade good.
    AppOtaOk,
    /// The application marked the last upgrade bad.
    AppOtaFail,
    /// A forced upgrade was started but never completed.
    ForceOtaStart,
    /// A forced upgrade completed.
    ForceOtaFinish,
}

impl PersistedOtaFlag {
    /// Decode a stored byte. Anything unrecognized is [`Self::Invalid`].
    pub fn from_byte(b: u8) -> Self {
        match b {
            1 => PersistedOtaFlag::Init,
            2 => PersistedOtaFlag::AppOtaOk,
            3 => PersistedOtaFlag::AppOtaFail,
            4 => PersistedOtaFlag::ForceOtaStart,
            5 => PersistedOtaFlag::ForceOtaFinish,
            _ => PersistedOtaFlag::Invalid,
        }
    }

    /// The byte written to storage.
    pub fn as_byte(self) -> u8 {
        match self {
            PersistedOtaFlag::Invalid => 0,
            PersistedOtaFlag::Init => 1,
            PersistedOtaFlag::AppOtaOk => 2,
            PersistedOtaFlag::AppOtaFail => 3,
            PersistedOtaFlag::ForceOtaStart => 4,
            PersistedOtaFlag::ForceOtaFinish => 5,
        }
    }
}

/// An update notification, as published on the `otaurl` topic.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct OtaNotice {
    /// The offered firmware version, `major.minor.patch`.
    pub ota_version: String<VERSION_STR_MAX>,
    /// Where the image can be fetched.
    pub url: String<OTA_URL_MAX>,
    /// Image size in bytes.
    pub file_size: u32,
}

/// The announcement published on the `otafetch` topic when OTA is enabled.
#[derive(Debug, Serialize)]
pub(crate) struct OtaFetch<'a> {
    pub device_id: &'a str,
    pub fw_version: &'a str,
}

/// The report published on the `otastatus` topic.
#[derive(Debug, Serialize)]
pub(crate) struct StatusReport<'a> {
    pub device_id: &'a str,
    pub ota_version: &'a str,
    pub device_otastatus: OtaStatus,
    pub additional_info: &'a str,
}

/// Upgrade failure, as reported by the platform.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UpgradeError {
    /// The image could not be fetched.
    Download,
    /// The image could not be written or activated.
    Flash,
    /// The platform cannot upgrade at all.
    Unsupported,
}

/// The platform seam for firmware upgrades.
///
/// `apply_update` performs the whole download-and-flash sequence and returns
/// only once the new image is staged (or the attempt failed). `reboot`
/// requests a restart; on hardware it does not return, test doubles record
/// the call and do.
pub trait OtaPlatform {
    /// Fetch and stage the image at `url`.
    fn apply_update(&mut self, url: &str, file_size: u32) -> Result<(), UpgradeError>;

    /// Restart the device.
    fn reboot(&mut self);
}

/// A platform with no upgrade capability. Every attempt fails with
/// [`UpgradeError::Unsupported`]; reboot requests are ignored.
#[derive(Debug, Default)]
pub struct NoOta;

impl OtaPlatform for NoOta {
    fn apply_update(&mut self, _url: &str, _file_size: u32) -> Result<(), UpgradeError> {
        Err(UpgradeError::Unsupported)
    }

    fn reboot(&mut self) {}
}

/// Progress of the current boot's OTA activity.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum OtaState {
    /// OTA enabled, check not yet run.
    Idle,
    /// Subscribed to notifications, announcement published.
    CheckSubscribed,
    /// A strictly newer version has been offered.
    UpdateAvailable,
    /// The platform is fetching and staging the image.
    Downloading,
    /// The attempt succeeded; reboot pending or requested.
    Success,
    /// The attempt failed; reboot pending or requested.
    Failed,
}

/// One OTA session: the platform plus the bookkeeping that serializes
/// attempts and deduplicates status reports. Created by `Agent::enable_ota`;
/// at most one per agent.
pub struct OtaEngine<P: OtaPlatform> {
    platform: P,
    state: OtaState,
    remote_version: String<VERSION_STR_MAX>,
    in_progress: bool,
    last_reported: Option<OtaStatus>,
    force_pending: bool,
}

impl<P: OtaPlatform> OtaEngine<P> {
    pub(crate) fn new(platform: P) -> Self {
        OtaEngine {
            platform,
            state: OtaState::Idle,
            remote_version: String::new(),
            in_progress: false,
            last_reported: None,
            force_pending: false,
        }
    }

    /// The session's current state.
    pub fn state(&self) -> OtaState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: OtaState) {
        self.state = state;
    }

    /// True while an attempt is being driven; further notifications are
    /// ignored until it completes.
    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    /// The version string of the notification being handled.
    pub fn remote_version(&self) -> &str {
        &self.remote_version
    }

    pub(crate) fn begin(&mut self, remote_version: &str, force: bool) {
        self.in_progress = true;
        self.force_pending = force;
        self.last_reported = None;
        self.remote_version = String::try_from(remote_version).unwrap_or_default();
    }

    pub(crate) fn end(&mut self, state: OtaState) {
        self.state = state;
        self.in_progress = false;
        self.force_pending = false;
    }

    /// Record a status for reporting. Returns `false` when `status` was
    /// already reported for this attempt, so terminal outcomes go up exactly
    /// once.
    pub(crate) fn note_report(&mut self, status: OtaStatus) -> bool {
        if self.last_reported == Some(status) {
            return false;
        }
        self.last_reported = Some(status);
        true
    }

    pub(crate) fn apply_update(&mut self, url: &str, file_size: u32) -> Result<(), Error> {
        self.state = OtaState::Downloading;
        self.platform
            .apply_update(url, file_size)
            .map_err(|_| Error::UpgradeFailed)
    }

    pub(crate) fn reboot(&mut self) {
        self.platform.reboot();
    }
}

impl<P: OtaPlatform> fmt::Debug for OtaEngine<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtaEngine")
            .field("state", &self.state)
            .field("in_progress", &self.in_progress)
            .field("force_pending", &self.force_pending)
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for OtaStatus {
    fn format(&self, f: defmt::Formatter) {
        match self {
            OtaStatus::InProgress => defmt::write!(f, "in-progress"),
            OtaStatus::Success => defmt::write!(f, "success"),
            OtaStatus::Failed => defmt::write!(f, "failed"),
            OtaStatus::Delayed => defmt::write!(f, "delayed"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for OtaState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            OtaState::Idle => defmt::write!(f, "Idle"),
            OtaState::CheckSubscribed => defmt::write!(f, "CheckSubscribed"),
            OtaState::UpdateAvailable => defmt::write!(f, "UpdateAvailable"),
            OtaState::Downloading => defmt::write!(f, "Downloading"),
            OtaState::Success => defmt::write!(f, "Success"),
            OtaState::Failed => defmt::write!(f, "Failed"),
        }
    }
}
