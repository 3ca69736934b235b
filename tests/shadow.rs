//! Shadow document construction and delta application.

use libshadow::error::Error;
use libshadow::param::{DeltaOutcome, ParamCallback, ParamTable};
use libshadow::shadow::{SHADOW_DOC_MAX, apply_delta, build_update, parse_delta};
use libshadow::value::ParamValue;

struct Accepting;

impl ParamCallback for Accepting {
    fn on_remote_change(&self, _name: &str, _value: &ParamValue) -> DeltaOutcome {
        DeltaOutcome::Accept
    }
}

fn doc(table: &ParamTable<'_>, full: bool) -> String {
    let mut buf = [0u8; SHADOW_DOC_MAX];
    let len = build_update(table.dynamics(), full, &mut buf).unwrap();
    String::from_utf8(buf[..len].to_vec()).unwrap()
}

#[test]
fn full_report_carries_every_parameter_without_desired() {
    let mut table = ParamTable::new(0, 3);
    table.add_dynamic("power", true.into(), None).unwrap();
    table.add_dynamic("brightness", 25.into(), None).unwrap();

    assert_eq!(
        doc(&table, true),
        r#"{"state":{"reported":{"power":true,"brightness":25}}}"#
    );
}

#[test]
fn local_change_appears_in_reported_and_desired() {
    let mut table = ParamTable::new(0, 2);
    table.add_dynamic("power", true.into(), None).unwrap();
    table.add_dynamic("brightness", 25.into(), None).unwrap();

    table.update_local("brightness", 40.into()).unwrap();
    assert_eq!(
        doc(&table, false),
        r#"{"state":{"reported":{"brightness":40},"desired":{"brightness":40}}}"#
    );
}

#[test]
fn remote_change_appears_in_reported_only() {
    let accepting = Accepting;
    let mut table = ParamTable::new(0, 2);
    table
        .add_dynamic("power", true.into(), Some(&accepting))
        .unwrap();

    table.apply_remote("power", false.into()).unwrap();
    assert_eq!(doc(&table, false), r#"{"state":{"reported":{"power":false}}}"#);
}

#[test]
fn mixed_changes_split_between_sections() {
    let accepting = Accepting;
    let mut table = ParamTable::new(0, 2);
    table
        .add_dynamic("power", true.into(), Some(&accepting))
        .unwrap();
    table.add_dynamic("brightness", 25.into(), None).unwrap();

    table.apply_remote("power", false.into()).unwrap();
    table.update_local("brightness", 40.into()).unwrap();
    assert_eq!(
        doc(&table, false),
        r#"{"state":{"reported":{"power":false,"brightness":40},"desired":{"brightness":40}}}"#
    );
}

#[test]
fn oversized_document_fails_whole() {
    let mut table = ParamTable::new(0, 1);
    table.add_dynamic("power", true.into(), None).unwrap();
    table.update_local("power", false.into()).unwrap();

    let mut buf = [0u8; 16];
    assert_eq!(
        build_update(table.dynamics(), false, &mut buf),
        Err(Error::DocTooLarge)
    );
}

#[test]
fn delta_applies_known_parameters_and_skips_unknown() {
    let accepting = Accepting;
    let mut table = ParamTable::new(0, 2);
    table
        .add_dynamic("power", true.into(), Some(&accepting))
        .unwrap();
    table
        .add_dynamic("brightness", 25.into(), Some(&accepting))
        .unwrap();

    let payload = br#"{"state":{"power":false,"ghost":5,"brightness":60}}"#;
    assert_eq!(apply_delta(&mut table, payload), Ok(2));
    assert_eq!(
        table.find_dynamic("power").unwrap().value(),
        &ParamValue::Bool(false)
    );
    assert_eq!(
        table.find_dynamic("brightness").unwrap().value(),
        &ParamValue::Integer(60)
    );
}

#[test]
fn delta_tolerates_extra_document_fields() {
    let accepting = Accepting;
    let mut table = ParamTable::new(0, 1);
    table
        .add_dynamic("power", true.into(), Some(&accepting))
        .unwrap();

    let payload =
        br#"{"version":12,"state":{"power":false},"metadata":{"state":{"power":{"ts":1}}}}"#;
    assert_eq!(apply_delta(&mut table, payload), Ok(1));
    assert_eq!(
        table.find_dynamic("power").unwrap().value(),
        &ParamValue::Bool(false)
    );
}

#[test]
fn delta_with_wrong_value_kind_fails() {
    let accepting = Accepting;
    let mut table = ParamTable::new(0, 1);
    table
        .add_dynamic("power", true.into(), Some(&accepting))
        .unwrap();

    let payload = br#"{"state":{"power":7}}"#;
    assert_eq!(apply_delta(&mut table, payload), Err(Error::ParseError));
    assert_eq!(
        table.find_dynamic("power").unwrap().value(),
        &ParamValue::Bool(true)
    );
}

#[test]
fn malformed_delta_fails_without_side_effects() {
    let accepting = Accepting;
    let mut table = ParamTable::new(0, 1);
    table
        .add_dynamic("power", true.into(), Some(&accepting))
        .unwrap();

    assert_eq!(
        apply_delta(&mut table, br#"{"state":{"power":"#),
        Err(Error::ParseError)
    );
    assert_eq!(
        apply_delta(&mut table, br#"{"reported":{"power":false}}"#),
        Err(Error::ParseError)
    );
    assert!(!table.any_dirty());
}

#[test]
fn delta_string_respects_declared_bound() {
    let accepting = Accepting;
    let mut table = ParamTable::new(0, 1);
    table
        .add_dynamic_str("label", "on", 4, Some(&accepting))
        .unwrap();

    let payload = br#"{"state":{"label":"much too long"}}"#;
    assert_eq!(apply_delta(&mut table, payload), Err(Error::ValueTooLarge));

    let payload = br#"{"state":{"label":"off"}}"#;
    assert_eq!(apply_delta(&mut table, payload), Ok(1));
    assert_eq!(
        table.find_dynamic("label").unwrap().value(),
        &ParamValue::str("off").unwrap()
    );
}

#[test]
fn delta_without_callback_parses_but_does_not_apply() {
    let mut table = ParamTable::new(0, 1);
    table.add_dynamic("power", true.into(), None).unwrap();

    let entries = parse_delta(&table, br#"{"state":{"power":false}}"#).unwrap();
    assert_eq!(entries.len(), 1);

    assert_eq!(apply_delta(&mut table, br#"{"state":{"power":false}}"#), Ok(0));
    assert_eq!(
        table.find_dynamic("power").unwrap().value(),
        &ParamValue::Bool(true)
    );
}

#[test]
fn delta_parses_float_and_whitespace_variants() {
    let accepting = Accepting;
    let mut table = ParamTable::new(0, 1);
    table
        .add_dynamic("level", ParamValue::Float(0.5), Some(&accepting))
        .unwrap();

    let payload = b"{ \"state\" : { \"level\" : 0.75 } }";
    assert_eq!(apply_delta(&mut table, payload), Ok(1));
    assert_eq!(
        table.find_dynamic("level").unwrap().value(),
        &ParamValue::Float(0.75)
    );
}
