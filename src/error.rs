//! Common error type for agent operations

/// A common error type for cloud agent operations.
///
/// This enum defines the errors that can occur while registering parameters,
/// synchronizing shadow state, queuing work, and driving firmware updates. It
/// is designed to be simple and portable for `no_std` environments.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// A parameter with the same name is already registered.
    DuplicateParam,
    /// The parameter table has reached its configured capacity.
    TableFull,
    /// No parameter with the given name and type exists.
    ParamNotFound,
    /// A string value exceeds the size declared for its parameter.
    ValueTooLarge,
    /// The work queue is full; the request was dropped.
    QueueFull,
    /// The diagnostics scheduler has no free registration slots.
    SchedulerFull,
    /// The underlying transport reported a failure.
    Transport,
    /// A payload received from the cloud could not be parsed.
    ParseError,
    /// An outbound document did not fit in its bounded buffer.
    DocTooLarge,
    /// The key-value storage collaborator reported a failure.
    Storage,
    /// A required storage entry (such as the device id) is absent.
    MissingIdentity,
    /// The firmware download or flash step failed.
    UpgradeFailed,
    /// OTA was enabled twice, or an OTA operation was requested while OTA is
    /// not enabled.
    OtaUnavailable,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::DuplicateParam => defmt::write!(f, "DuplicateParam"),
            Error::TableFull => defmt::write!(f, "TableFull"),
            Error::ParamNotFound => defmt::write!(f, "ParamNotFound"),
            Error::ValueTooLarge => defmt::write!(f, "ValueTooLarge"),
            Error::QueueFull => defmt::write!(f, "QueueFull"),
            Error::SchedulerFull => defmt::write!(f, "SchedulerFull"),
            Error::Transport => defmt::write!(f, "Transport"),
            Error::ParseError => defmt::write!(f, "ParseError"),
            Error::DocTooLarge => defmt::write!(f, "DocTooLarge"),
            Error::Storage => defmt::write!(f, "Storage"),
            Error::MissingIdentity => defmt::write!(f, "MissingIdentity"),
            Error::UpgradeFailed => defmt::write!(f, "UpgradeFailed"),
            Error::OtaUnavailable => defmt::write!(f, "OtaUnavailable"),
        }
    }
}
