//! Reboot-surviving key-value storage.
//!
//! The agent keeps nothing persistent itself; device identity and the OTA
//! outcome flag live in whatever non-volatile store the platform provides
//! (NVS, EEPROM, a file). Accessed only from the agent task.

/// Well-known storage keys.
pub mod keys {
    /// The unique device identifier, stored as UTF-8 bytes.
    pub const DEVICE_ID: &str = "device_id";
    /// Single-byte OTA outcome flag consumed at the next boot.
    pub const OTA_FLAG: &str = "ota_flag";
}

/// The key-value storage contract.
pub trait KeyValueStorage {
    /// Associated error type.
    type Error: core::fmt::Debug;

    /// Read the value for `key` into `buf`, returning the value length, or
    /// `None` if the key is absent. A value longer than `buf` is an error.
    fn get(&mut self, key: &str, buf: &mut [u8]) -> Result<Option<usize>, Self::Error>;

    /// Store a single byte under `key`, replacing any previous value.
    fn set_u8(&mut self, key: &str, value: u8) -> Result<(), Self::Error>;

    /// Read a single-byte value, or `None` if the key is absent.
    fn get_u8(&mut self, key: &str) -> Result<Option<u8>, Self::Error>;
}
