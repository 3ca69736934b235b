//! Version comparison, the persisted outcome flag and wire payloads.

use libshadow::error::Error;
use libshadow::ota::{
    FirmwareVersion, NoOta, OtaNotice, OtaPlatform, OtaStatus, PersistedOtaFlag, UpgradeError,
};

#[test]
fn version_parses_exactly_three_components() {
    let v: FirmwareVersion = "1.2.3".parse().unwrap();
    assert_eq!((v.major, v.minor, v.patch), (1, 2, 3));

    assert_eq!("1.2".parse::<FirmwareVersion>(), Err(Error::ParseError));
    assert_eq!("1.2.3.4".parse::<FirmwareVersion>(), Err(Error::ParseError));
    assert_eq!("1.2.x".parse::<FirmwareVersion>(), Err(Error::ParseError));
    assert_eq!("".parse::<FirmwareVersion>(), Err(Error::ParseError));
    assert_eq!("1..3".parse::<FirmwareVersion>(), Err(Error::ParseError));
}

#[test]
fn version_ordering_is_componentwise() {
    let versions: Vec<FirmwareVersion> = ["1.2.3", "1.2.4", "1.3.0", "2.0.0", "2.0.1"]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();
    for pair in versions.windows(2) {
        assert!(pair[0] < pair[1], "{} should sort below {}", pair[0], pair[1]);
    }
    // Strictly-greater drives upgrades; equality is not an upgrade.
    let a: FirmwareVersion = "1.0.0".parse().unwrap();
    let b: FirmwareVersion = "1.0.0".parse().unwrap();
    assert_eq!(a, b);
}

#[test]
fn version_displays_canonically() {
    let v: FirmwareVersion = "10.0.7".parse().unwrap();
    assert_eq!(format!("{v}"), "10.0.7");
}

#[test]
fn persisted_flag_round_trips_and_closes_over_unknown_bytes() {
    let flags = [
        PersistedOtaFlag::Init,
        PersistedOtaFlag::AppOtaOk,
        PersistedOtaFlag::AppOtaFail,
        PersistedOtaFlag::ForceOtaStart,
        PersistedOtaFlag::ForceOtaFinish,
    ];
    for flag in flags {
        assert_eq!(PersistedOtaFlag::from_byte(flag.as_byte()), flag);
    }
    assert_eq!(PersistedOtaFlag::from_byte(0), PersistedOtaFlag::Invalid);
    assert_eq!(PersistedOtaFlag::from_byte(99), PersistedOtaFlag::Invalid);
    assert_eq!(PersistedOtaFlag::from_byte(255), PersistedOtaFlag::Invalid);
}

#[test]
fn status_serializes_to_wire_strings() {
    let cases = [
        (OtaStatus::InProgress, r#""in-progress""#),
        (OtaStatus::Success, r#""success""#),
        (OtaStatus::Failed, r#""failed""#),
        (OtaStatus::Delayed, r#""delayed""#),
    ];
    for (status, expected) in cases {
        let mut buf = [0u8; 32];
        let len = serde_json_core::to_slice(&status, &mut buf).unwrap();
        assert_eq!(&buf[..len], expected.as_bytes());
    }
}

#[test]
fn notice_deserializes_from_notification_payload() {
    let payload = br#"{"ota_version":"2.1.0","url":"https://updates.example/fw.bin","file_size":745223}"#;
    let (notice, _) = serde_json_core::from_slice::<OtaNotice>(payload).unwrap();
    assert_eq!(notice.ota_version.as_str(), "2.1.0");
    assert_eq!(notice.url.as_str(), "https://updates.example/fw.bin");
    assert_eq!(notice.file_size, 745223);
}

#[test]
fn notice_rejects_malformed_payloads() {
    assert!(serde_json_core::from_slice::<OtaNotice>(b"not json").is_err());
    assert!(serde_json_core::from_slice::<OtaNotice>(br#"{"url":"x"}"#).is_err());
}

#[test]
fn no_ota_platform_cannot_upgrade() {
    let mut platform = NoOta;
    assert_eq!(
        platform.apply_update("https://anywhere", 1),
        Err(UpgradeError::Unsupported)
    );
    platform.reboot();
}
