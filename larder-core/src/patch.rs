//! Three-state partial updates.
//!
//! A partial payload distinguishes a field that is *absent* (leave it alone),
//! *null* (clear it), and *present* (set it). `Option<T>` alone cannot carry
//! all three, so nullable columns are patched through [`Patch<T>`].
//!
//! On the wire an absent field is omitted entirely, a cleared field is sent as
//! `null`, and a set field is sent as its value. Structs that embed `Patch`
//! fields must mark them with
//! `#[serde(default, skip_serializing_if = "Patch::is_absent")]`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Patch operation for a single nullable field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Patch<T> {
    /// Key not present in the payload: the field is untouched.
    #[default]
    Absent,
    /// Key present with `null`: the field is cleared.
    Clear,
    /// Key present with a value: the field is overwritten.
    Set(T),
}

impl<T> Patch<T> {
    /// Returns true if this patch leaves the field untouched.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Returns true if this patch clears the field.
    pub fn is_clear(&self) -> bool {
        matches!(self, Self::Clear)
    }

    /// Borrow the value being set, if any.
    pub fn as_set(&self) -> Option<&T> {
        match self {
            Self::Set(value) => Some(value),
            _ => None,
        }
    }

    /// Map the carried value, preserving absent/clear.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Patch<U> {
        match self {
            Self::Absent => Patch::Absent,
            Self::Clear => Patch::Clear,
            Self::Set(value) => Patch::Set(f(value)),
        }
    }
}

impl<T: Clone> Patch<T> {
    /// Apply this patch to a nullable field.
    pub fn apply(&self, target: &mut Option<T>) {
        match self {
            Self::Absent => {}
            Self::Clear => *target = None,
            Self::Set(value) => *target = Some(value.clone()),
        }
    }

    /// Return the patched value of a nullable field without mutating it.
    pub fn applied_to(&self, current: Option<T>) -> Option<T> {
        let mut value = current;
        self.apply(&mut value);
        value
    }
}

impl Patch<String> {
    /// Normalize an optional text input from a form.
    ///
    /// `None` is absent, blank (after trimming) clears, anything else sets the
    /// trimmed text.
    pub fn from_form_text(input: Option<&str>) -> Self {
        match input.map(str::trim) {
            None => Self::Absent,
            Some("") => Self::Clear,
            Some(text) => Self::Set(text.to_string()),
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    /// `Some` sets, `None` clears. Absence must be spelled `Patch::Absent`.
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::Set(value),
            None => Self::Clear,
        }
    }
}

/// Apply an optional value to a required field (absent or set only).
pub fn apply_required<T: Clone>(patch: &Option<T>, target: &mut T) {
    if let Some(value) = patch {
        *target = value.clone();
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            // Absent fields are skipped by the containing struct; if one slips
            // through it degrades to null rather than inventing a value.
            Self::Absent | Self::Clear => serializer.serialize_none(),
            Self::Set(value) => serializer.serialize_some(value),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Patch::from)
    }
}
