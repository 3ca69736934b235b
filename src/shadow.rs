//! Shadow update documents and remote deltas.
//!
//! Outbound: dirty dynamic parameters are folded into a single bounded JSON
//! document of the form `{"state":{"reported":{…},"desired":{…}}}`. Every
//! dirty parameter appears under `reported`; only locally-changed parameters
//! are echoed under `desired`. If the encoding does not fit the buffer the
//! whole update fails; documents are never truncated.
//!
//! Inbound: a delta payload `{"state":{name:value,…}}` carries runtime keys,
//! so a cursor walks the entry boundaries and each value is decoded with the
//! kind declared for its parameter in the table. Names the table does not
//! know are skipped; a value of the wrong kind fails the whole delta.
//!
//! Updates are not pipelined: while one document is outstanding the loop does
//! not build another, and the dirty bits consumed by a build are cleared when
//! the document is handed to the transport, not when it is acknowledged.
//! A publish lost in transit is therefore lost until the next change
//! re-dirties the parameter (at-most-once delivery).

use heapless::Vec;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::Error;
use crate::param::{DYNAMIC_PARAMS_CAP, DynamicParam, ParamName, ParamTable};
use crate::value::{ParamKind, ParamValue};

/// Size of the shadow update document buffer. Encoding overflow aborts the
/// update with [`Error::DocTooLarge`].
pub const SHADOW_DOC_MAX: usize = 256;

/// Tracks the single outstanding shadow update.
#[derive(Debug, Default)]
pub struct SyncState {
    outstanding: bool,
}

impl SyncState {
    /// No update outstanding.
    pub const fn new() -> Self {
        SyncState { outstanding: false }
    }

    /// True while a published document awaits acknowledgment.
    pub fn outstanding(&self) -> bool {
        self.outstanding
    }

    pub(crate) fn mark_outstanding(&mut self) {
        self.outstanding = true;
    }

    /// Clear the outstanding flag; called on the accepted/rejected topics and
    /// on ack timeout.
    pub(crate) fn acknowledge(&mut self) {
        self.outstanding = false;
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SetFilter {
    /// Every parameter, regardless of flags. Used by the startup full report.
    All,
    /// Parameters with any dirty bit.
    Dirty,
    /// Parameters with the local bit.
    LocalDirty,
}

impl SetFilter {
    fn matches(self, param: &DynamicParam<'_>) -> bool {
        match self {
            SetFilter::All => true,
            SetFilter::Dirty => param.flags().any(),
            SetFilter::LocalDirty => param.flags().local(),
        }
    }
}

struct ParamSet<'a, 'cb> {
    params: &'a [DynamicParam<'cb>],
    filter: SetFilter,
}

impl ParamSet<'_, '_> {
    fn len(&self) -> usize {
        self.params.iter().filter(|p| self.filter.matches(p)).count()
    }
}

impl Serialize for ParamSet<'_, '_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for param in self.params.iter().filter(|p| self.filter.matches(p)) {
            map.serialize_entry(param.name(), param.value())?;
        }
        map.end()
    }
}

struct StateBody<'a, 'cb> {
    reported: ParamSet<'a, 'cb>,
    desired: Option<ParamSet<'a, 'cb>>,
}

impl Serialize for StateBody<'_, '_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let entries = 1 + usize::from(self.desired.is_some());
        let mut map = serializer.serialize_map(Some(entries))?;
        map.serialize_entry("reported", &self.reported)?;
        if let Some(desired) = &self.desired {
            map.serialize_entry("desired", desired)?;
        }
        map.end()
    }
}

struct UpdateDoc<'a, 'cb> {
    state: StateBody<'a, 'cb>,
}

impl Serialize for UpdateDoc<'_, '_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("state", &self.state)?;
        map.end()
    }
}

/// Encode the dirty set into `buf` and return the document length.
///
/// With `full` set, every dynamic parameter goes under `reported` and the
/// `desired` section is omitted: the startup full-state report, independent
/// of the dirty bits.
pub fn build_update(
    params: &[DynamicParam<'_>],
    full: bool,
    buf: &mut [u8],
) -> Result<usize, Error> {
    let doc = if full {
        UpdateDoc {
            state: StateBody {
                reported: ParamSet {
                    params,
                    filter: SetFilter::All,
                },
                desired: None,
            },
        }
    } else {
        let desired = ParamSet {
            params,
            filter: SetFilter::LocalDirty,
        };
        UpdateDoc {
            state: StateBody {
                reported: ParamSet {
                    params,
                    filter: SetFilter::Dirty,
                },
                desired: (desired.len() > 0).then_some(desired),
            },
        }
    };
    serde_json_core::to_slice(&doc, buf).map_err(|_| Error::DocTooLarge)
}

/// Parsed delta entries, in document order.
pub type DeltaEntries = Vec<(ParamName, ParamValue), DYNAMIC_PARAMS_CAP>;

/// Walks object entries of a JSON byte slice without interpreting values.
/// Only delimits; scalar decoding goes back through the JSON parser with the
/// kind the table declares.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    seen_entry: bool,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Cursor {
            bytes,
            pos: 0,
            seen_entry: false,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Result<u8, Error> {
        let b = self.peek().ok_or(Error::ParseError)?;
        self.pos += 1;
        Ok(b)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, want: u8) -> Result<(), Error> {
        self.skip_ws();
        if self.bump()? == want {
            Ok(())
        } else {
            Err(Error::ParseError)
        }
    }

    fn enter_object(&mut self) -> Result<(), Error> {
        self.expect(b'{')
    }

    /// The next `key: value` entry, or `None` at the closing brace. The value
    /// comes back as the exact sub-slice spanning it.
    fn next_entry(&mut self) -> Result<Option<(&'a str, &'a [u8])>, Error> {
        self.skip_ws();
        match self.peek().ok_or(Error::ParseError)? {
            b'}' => {
                self.pos += 1;
                return Ok(None);
            }
            b',' if self.seen_entry => {
                self.pos += 1;
            }
            b'"' if !self.seen_entry => {}
            _ => return Err(Error::ParseError),
        }
        let key = self.string()?;
        self.expect(b':')?;
        let value = self.value_slice()?;
        self.seen_entry = true;
        Ok(Some((key, value)))
    }

    /// Consume a quoted string and return its raw contents (escapes are
    /// skipped over, not resolved; delta keys never carry them).
    fn string(&mut self) -> Result<&'a str, Error> {
        self.expect(b'"')?;
        let start = self.pos;
        loop {
            match self.bump()? {
                b'\\' => {
                    self.bump()?;
                }
                b'"' => break,
                _ => {}
            }
        }
        core::str::from_utf8(&self.bytes[start..self.pos - 1]).map_err(|_| Error::ParseError)
    }

    fn value_slice(&mut self) -> Result<&'a [u8], Error> {
        self.skip_ws();
        let start = self.pos;
        match self.peek().ok_or(Error::ParseError)? {
            b'"' => {
                self.string()?;
            }
            b'{' | b'[' => {
                let mut depth = 0usize;
                loop {
                    match self.bump()? {
                        b'{' | b'[' => depth += 1,
                        b'}' | b']' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        b'"' => {
                            self.pos -= 1;
                            self.string()?;
                        }
                        _ => {}
                    }
                }
            }
            _ => {
                while let Some(b) = self.peek() {
                    if matches!(b, b',' | b'}' | b']') || b.is_ascii_whitespace() {
                        break;
                    }
                    self.pos += 1;
                }
            }
        }
        Ok(&self.bytes[start..self.pos])
    }
}

fn decode_value(kind: ParamKind, max_len: usize, raw: &[u8]) -> Result<ParamValue, Error> {
    match kind {
        ParamKind::Bool => serde_json_core::from_slice::<bool>(raw)
            .map(|(v, _)| ParamValue::Bool(v))
            .map_err(|_| Error::ParseError),
        ParamKind::Integer => serde_json_core::from_slice::<i32>(raw)
            .map(|(v, _)| ParamValue::Integer(v))
            .map_err(|_| Error::ParseError),
        ParamKind::Float => serde_json_core::from_slice::<f32>(raw)
            .map(|(v, _)| ParamValue::Float(v))
            .map_err(|_| Error::ParseError),
        ParamKind::Str => {
            let (s, _) = serde_json_core::from_slice::<&str>(raw).map_err(|_| Error::ParseError)?;
            if s.len() > max_len {
                return Err(Error::ValueTooLarge);
            }
            ParamValue::str(s).ok_or(Error::ValueTooLarge)
        }
    }
}

/// Parse a delta payload against the table's declared parameter kinds.
///
/// Names the table does not know are skipped. A known name with a value of
/// the wrong kind, or a malformed document, fails with [`Error::ParseError`];
/// an oversized string value with [`Error::ValueTooLarge`].
pub fn parse_delta(table: &ParamTable<'_>, payload: &[u8]) -> Result<DeltaEntries, Error> {
    let mut outer = Cursor::new(payload);
    outer.enter_object()?;
    let mut state = None;
    while let Some((key, raw)) = outer.next_entry()? {
        if key == "state" {
            state = Some(raw);
        }
    }
    let state = state.ok_or(Error::ParseError)?;

    let mut entries = DeltaEntries::new();
    let mut inner = Cursor::new(state);
    inner.enter_object()?;
    while let Some((name, raw)) = inner.next_entry()? {
        let Some((kind, max_len)) = table.kind_of(name) else {
            continue;
        };
        let value = decode_value(kind, max_len, raw)?;
        let name = ParamName::try_from(name).map_err(|_| Error::ParseError)?;
        entries.push((name, value)).map_err(|_| Error::ParseError)?;
    }
    Ok(entries)
}

/// Parse and apply a delta payload. Returns how many parameters accepted
/// their new value; rejected and callback-less entries are counted out but do
/// not fail the delta.
pub fn apply_delta(table: &mut ParamTable<'_>, payload: &[u8]) -> Result<usize, Error> {
    let entries = parse_delta(table, payload)?;
    let mut applied = 0;
    for (name, value) in entries {
        if table.apply_remote(&name, value)? {
            applied += 1;
        }
    }
    Ok(applied)
}
