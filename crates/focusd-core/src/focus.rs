//! Focus types, directions and identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Process identifier of a focus client.
pub type Pid = i32;

/// Client-chosen handle, unique per pid among holder nodes.
pub type HandleId = i32;

/// Longest stream type or option name, in bytes, that fits a notification record.
pub const MAX_NAME_LEN: usize = 63;

/// Bitmask over the playback and capture directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct FocusType(u8);

impl FocusType {
    /// No direction held.
    pub const DEACTIVATED: Self = Self(0);
    /// Playback direction.
    pub const PLAYBACK: Self = Self(1);
    /// Capture direction.
    pub const CAPTURE: Self = Self(2);
    /// Both directions.
    pub const BOTH: Self = Self(3);

    /// Build from raw bits, rejecting anything outside `BOTH`.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for bits above 3.
    pub fn from_bits(bits: u8) -> Result<Self> {
        if bits > Self::BOTH.0 {
            return Err(Error::InvalidArgument(format!("focus type out of range: {bits}")));
        }
        Ok(Self(bits))
    }

    /// Raw bit value.
    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every bit of `other` is set in `self`.
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if `self` and `other` share at least one bit.
    #[must_use]
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    #[must_use]
    pub fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Directions set in this mask, playback first.
    pub fn directions(self) -> impl Iterator<Item = FocusDirection> {
        FocusDirection::ALL.into_iter().filter(move |d| self.intersects(d.focus_type()))
    }
}

impl TryFrom<u8> for FocusType {
    type Error = Error;

    fn try_from(bits: u8) -> Result<Self> {
        Self::from_bits(bits)
    }
}

impl From<FocusType> for u8 {
    fn from(focus_type: FocusType) -> Self {
        focus_type.0
    }
}

impl From<FocusDirection> for FocusType {
    fn from(direction: FocusDirection) -> Self {
        direction.focus_type()
    }
}

impl fmt::Display for FocusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            0 => "deactivated",
            1 => "playback",
            2 => "capture",
            _ => "both",
        };
        f.write_str(name)
    }
}

/// A single io direction, used to index per-direction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusDirection {
    Playback,
    Capture,
}

impl FocusDirection {
    /// Both directions in slot order.
    pub const ALL: [Self; 2] = [Self::Playback, Self::Capture];

    /// Slot index in a node's `taken_by` array.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Playback => 0,
            Self::Capture => 1,
        }
    }

    #[must_use]
    pub fn focus_type(self) -> FocusType {
        match self {
            Self::Playback => FocusType::PLAYBACK,
            Self::Capture => FocusType::CAPTURE,
        }
    }
}

/// Transition reported to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusState {
    /// The peer lost (or a watcher observes a release of) focus.
    Released,
    /// The peer gained (or a watcher observes an acquisition of) focus.
    Acquired,
}

/// Check a client-supplied name against the notification record bound.
///
/// # Errors
/// Returns `InvalidArgument` if the name is too long or contains a NUL byte.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(Error::InvalidArgument(format!(
            "{kind} longer than {MAX_NAME_LEN} bytes: {name}"
        )));
    }
    if name.contains('\0') {
        return Err(Error::InvalidArgument(format!("{kind} contains NUL")));
    }
    Ok(())
}
