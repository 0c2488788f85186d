//! Typed preference payloads.
//!
//! The sync engine treats payloads as opaque JSON values. These types give
//! callers and the local store a checked view of each preference type.

use crate::error::{ProtocolError, ProtocolResult};
use crate::types::PreferenceType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Favorited content identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoritesPayload {
    /// Content identifiers, in the order the user favorited them.
    pub items: Vec<String>,
}

/// Learning goal identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalsPayload {
    /// Goal identifiers.
    pub items: Vec<String>,
}

/// Reading position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingPayload {
    /// Chapter identifier.
    pub chapter: String,
    /// Scroll position within the chapter, 0.0 to 1.0.
    pub position: f64,
    /// Font size in points.
    pub font_size: u16,
}

/// Theme selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemePayload {
    /// Color mode (`light`, `dark`, `system`).
    pub mode: String,
    /// Palette name.
    pub palette: String,
}

/// A decoded preference value of any type.
#[derive(Debug, Clone, PartialEq)]
pub enum Preference {
    /// Favorites.
    Favorites(FavoritesPayload),
    /// Goals.
    Goals(GoalsPayload),
    /// Reading position.
    Reading(ReadingPayload),
    /// Theme.
    Theme(ThemePayload),
}

impl Preference {
    /// Returns the preference type of this value.
    #[must_use]
    pub fn pref_type(&self) -> PreferenceType {
        match self {
            Preference::Favorites(_) => PreferenceType::Favorites,
            Preference::Goals(_) => PreferenceType::Goals,
            Preference::Reading(_) => PreferenceType::Reading,
            Preference::Theme(_) => PreferenceType::Theme,
        }
    }

    /// Converts to the opaque JSON payload carried on the wire.
    pub fn to_value(&self) -> ProtocolResult<Value> {
        let value = match self {
            Preference::Favorites(p) => serde_json::to_value(p)?,
            Preference::Goals(p) => serde_json::to_value(p)?,
            Preference::Reading(p) => serde_json::to_value(p)?,
            Preference::Theme(p) => serde_json::to_value(p)?,
        };
        Ok(value)
    }

    /// Decodes a JSON payload as the given type.
    pub fn try_decode(pref_type: PreferenceType, value: &Value) -> ProtocolResult<Self> {
        let invalid = |e: serde_json::Error| ProtocolError::InvalidPayload {
            pref_type: pref_type.to_string(),
            reason: e.to_string(),
        };
        let decoded = match pref_type {
            PreferenceType::Favorites => {
                Preference::Favorites(FavoritesPayload::deserialize(value).map_err(invalid)?)
            }
            PreferenceType::Goals => {
                Preference::Goals(GoalsPayload::deserialize(value).map_err(invalid)?)
            }
            PreferenceType::Reading => {
                let reading = ReadingPayload::deserialize(value).map_err(invalid)?;
                if !(0.0..=1.0).contains(&reading.position) {
                    return Err(ProtocolError::InvalidPayload {
                        pref_type: pref_type.to_string(),
                        reason: format!("position {} out of range", reading.position),
                    });
                }
                Preference::Reading(reading)
            }
            PreferenceType::Theme => {
                Preference::Theme(ThemePayload::deserialize(value).map_err(invalid)?)
            }
        };
        Ok(decoded)
    }

    /// Decodes a JSON payload, treating anything malformed as "no value".
    #[must_use]
    pub fn decode(pref_type: PreferenceType, value: &Value) -> Option<Self> {
        Self::try_decode(pref_type, value).ok()
    }
}
