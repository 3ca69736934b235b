//! The parameter store.
//!
//! Two fixed-capacity tables hold the device's parameters: static identity
//! attributes reported once at boot, and dynamic parameters that change at
//! runtime, either locally or through a remote shadow delta. Dynamic
//! parameters accumulate dirty bits between sync cycles; the shadow module
//! folds them into update documents and clears them.
//!
//! All mutation happens inside the agent task. The tables themselves need no
//! locking because the work queue is the only cross-context entry point.

use core::fmt;

use heapless::{String, Vec};

use crate::error::Error;
use crate::value::{PARAM_NAME_MAX, ParamKind, ParamValue};

/// Compile-time capacity of the static parameter table.
pub const STATIC_PARAMS_CAP: usize = 16;
/// Compile-time capacity of the dynamic parameter table.
pub const DYNAMIC_PARAMS_CAP: usize = 16;

/// Reserved static slots beyond the application-declared count. The agent
/// itself registers the identity attributes (name, type, model, fw_version).
pub const DEFAULT_STATIC_PARAMS: usize = 4;
/// Reserved dynamic slots beyond the application-declared count.
pub const DEFAULT_DYNAMIC_PARAMS: usize = 3;

/// A parameter name.
pub type ParamName = String<PARAM_NAME_MAX>;

/// Dirty bits accumulated on a dynamic parameter between sync cycles.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct DirtyFlags(u8);

impl DirtyFlags {
    const LOCAL_CHANGE: u8 = 0x01;
    const REMOTE_CHANGE: u8 = 0x02;

    /// No change recorded.
    pub const fn clear() -> Self {
        DirtyFlags(0)
    }

    /// True if a local `update_*` call touched the parameter.
    pub fn local(self) -> bool {
        self.0 & Self::LOCAL_CHANGE != 0
    }

    /// True if an accepted remote delta touched the parameter.
    pub fn remote(self) -> bool {
        self.0 & Self::REMOTE_CHANGE != 0
    }

    /// True if either bit is set.
    pub fn any(self) -> bool {
        self.0 != 0
    }

    fn set_local(&mut self) {
        self.0 |= Self::LOCAL_CHANGE;
    }

    fn set_remote(&mut self) {
        self.0 |= Self::REMOTE_CHANGE;
    }
}

/// Outcome of a remote-change callback.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DeltaOutcome {
    /// Store the new value and report it back to the cloud.
    Accept,
    /// Leave the parameter unmodified; nothing is reported.
    Reject,
}

/// Application hook invoked when the cloud requests a parameter change.
///
/// Implementations capture their own state and take `&self`; use interior
/// mutability where the hook needs to record anything. The value reference is
/// a borrow valid only for the duration of the call.
pub trait ParamCallback {
    /// Decide whether to accept the requested value.
    fn on_remote_change(&self, name: &str, value: &ParamValue) -> DeltaOutcome;
}

/// A static identity attribute, immutable after registration.
#[derive(Debug, Clone)]
pub struct StaticParam {
    pub(crate) name: ParamName,
    pub(crate) value: ParamValue,
}

impl StaticParam {
    /// The parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parameter value.
    pub fn value(&self) -> &ParamValue {
        &self.value
    }
}

/// A dynamic parameter with dirty tracking and an optional remote-change hook.
pub struct DynamicParam<'cb> {
    pub(crate) name: ParamName,
    pub(crate) value: ParamValue,
    /// Declared upper bound for string values; 0 for non-string parameters.
    pub(crate) max_str_len: usize,
    pub(crate) callback: Option<&'cb dyn ParamCallback>,
    pub(crate) flags: DirtyFlags,
}

impl DynamicParam<'_> {
    /// The parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current value.
    pub fn value(&self) -> &ParamValue {
        &self.value
    }

    /// The dirty bits accumulated since the last sync cycle.
    pub fn flags(&self) -> DirtyFlags {
        self.flags
    }
}

impl fmt::Debug for DynamicParam<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicParam")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("flags", &self.flags)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// The parameter store.
///
/// Capacities are fixed at construction: the application-declared counts plus
/// a small reserved default, clamped to the compile-time table sizes.
/// Insertion fails closed on a duplicate name or a full table, with no
/// partial mutation.
#[derive(Debug)]
pub struct ParamTable<'cb> {
    statics: Vec<StaticParam, STATIC_PARAMS_CAP>,
    dynamics: Vec<DynamicParam<'cb>, DYNAMIC_PARAMS_CAP>,
    max_statics: usize,
    max_dynamics: usize,
}

impl<'cb> ParamTable<'cb> {
    /// Create a table sized for the declared application parameter counts.
    pub fn new(static_count: usize, dynamic_count: usize) -> Self {
        ParamTable {
            statics: Vec::new(),
            dynamics: Vec::new(),
            max_statics: (static_count + DEFAULT_STATIC_PARAMS).min(STATIC_PARAMS_CAP),
            max_dynamics: (dynamic_count + DEFAULT_DYNAMIC_PARAMS).min(DYNAMIC_PARAMS_CAP),
        }
    }

    fn make_name(name: &str) -> Result<ParamName, Error> {
        ParamName::try_from(name).map_err(|_| Error::ValueTooLarge)
    }

    /// Register a static parameter. Reported once at startup, immutable
    /// afterwards.
    pub fn add_static(&mut self, name: &str, value: ParamValue) -> Result<(), Error> {
        if self.statics.len() >= self.max_statics {
            return Err(Error::TableFull);
        }
        if self.statics.iter().any(|p| p.name.as_str() == name) {
            return Err(Error::DuplicateParam);
        }
        let name = Self::make_name(name)?;
        self.statics
            .push(StaticParam { name, value })
            .map_err(|_| Error::TableFull)
    }

    /// Register a dynamic parameter. For string parameters use
    /// [`ParamTable::add_dynamic_str`] so the receive bound is declared.
    pub fn add_dynamic(
        &mut self,
        name: &str,
        value: ParamValue,
        callback: Option<&'cb dyn ParamCallback>,
    ) -> Result<(), Error> {
        let max_str_len = match &value {
            ParamValue::Str(s) => s.len(),
            _ => 0,
        };
        self.insert_dynamic(name, value, max_str_len, callback)
    }

    /// Register a dynamic string parameter with an explicit upper bound for
    /// values received from the cloud.
    pub fn add_dynamic_str(
        &mut self,
        name: &str,
        value: &str,
        max_len: usize,
        callback: Option<&'cb dyn ParamCallback>,
    ) -> Result<(), Error> {
        if max_len > crate::value::PARAM_STR_MAX || value.len() > max_len {
            return Err(Error::ValueTooLarge);
        }
        let value = ParamValue::str(value).ok_or(Error::ValueTooLarge)?;
        self.insert_dynamic(name, value, max_len, callback)
    }

    fn insert_dynamic(
        &mut self,
        name: &str,
        value: ParamValue,
        max_str_len: usize,
        callback: Option<&'cb dyn ParamCallback>,
    ) -> Result<(), Error> {
        if self.dynamics.len() >= self.max_dynamics {
            return Err(Error::TableFull);
        }
        if self.dynamics.iter().any(|p| p.name.as_str() == name) {
            return Err(Error::DuplicateParam);
        }
        let name = Self::make_name(name)?;
        self.dynamics
            .push(DynamicParam {
                name,
                value,
                max_str_len,
                callback,
                flags: DirtyFlags::clear(),
            })
            .map_err(|_| Error::TableFull)
    }

    /// Look up a dynamic parameter by name.
    pub fn find_dynamic(&self, name: &str) -> Option<&DynamicParam<'cb>> {
        self.dynamics.iter().find(|p| p.name.as_str() == name)
    }

    /// The declared kind and string bound of a dynamic parameter, if present.
    pub(crate) fn kind_of(&self, name: &str) -> Option<(ParamKind, usize)> {
        self.find_dynamic(name)
            .map(|p| (p.value.kind(), p.max_str_len))
    }

    /// Apply a local change: store the value and mark LOCAL_CHANGE.
    ///
    /// The lookup matches name and type together; a value of the wrong kind
    /// behaves as if the parameter did not exist.
    pub fn update_local(&mut self, name: &str, value: ParamValue) -> Result<(), Error> {
        let kind = value.kind();
        let param = self
            .dynamics
            .iter_mut()
            .find(|p| p.name.as_str() == name && p.value.kind() == kind)
            .ok_or(Error::ParamNotFound)?;
        if let ParamValue::Str(s) = &value {
            if s.len() > param.max_str_len {
                return Err(Error::ValueTooLarge);
            }
        }
        param.value = value;
        param.flags.set_local();
        Ok(())
    }

    /// Apply a remote delta: run the registered callback and, if it accepts,
    /// store the value and mark REMOTE_CHANGE.
    ///
    /// Returns `Ok(true)` when the value was stored. A parameter without a
    /// callback ignores remote changes entirely.
    pub fn apply_remote(&mut self, name: &str, value: ParamValue) -> Result<bool, Error> {
        let param = self
            .dynamics
            .iter_mut()
            .find(|p| p.name.as_str() == name)
            .ok_or(Error::ParamNotFound)?;
        if param.value.kind() != value.kind() {
            return Err(Error::ParseError);
        }
        if let ParamValue::Str(s) = &value {
            if s.len() > param.max_str_len {
                return Err(Error::ValueTooLarge);
            }
        }
        let Some(cb) = param.callback else {
            return Ok(false);
        };
        match cb.on_remote_change(&param.name, &value) {
            DeltaOutcome::Accept => {
                param.value = value;
                param.flags.set_remote();
                Ok(true)
            }
            DeltaOutcome::Reject => Ok(false),
        }
    }

    /// The registered static parameters, in registration order.
    pub fn statics(&self) -> &[StaticParam] {
        &self.statics
    }

    /// The registered dynamic parameters, in registration order.
    pub fn dynamics(&self) -> &[DynamicParam<'cb>] {
        &self.dynamics
    }

    /// True if any dynamic parameter carries a dirty bit.
    pub fn any_dirty(&self) -> bool {
        self.dynamics.iter().any(|p| p.flags.any())
    }

    /// Clear every dirty bit. Called once the dirty set has been folded into
    /// an update document and handed to the transport.
    pub fn clear_dirty(&mut self) {
        for param in &mut self.dynamics {
            param.flags = DirtyFlags::clear();
        }
    }
}
