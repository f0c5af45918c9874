//! The switch's extended attribute set.
//!
//! The firmware exposes its behaviour knobs as manufacturer-specific
//! attributes on the On/Off Configuration cluster. The set is closed: the
//! gateway's converter and this table must agree, so an unknown name is a
//! configuration error, not something to tolerate at runtime.

use std::str::FromStr;
use thiserror::Error;

/// Attributes of the On/Off Configuration cluster the harness can read and
/// write by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// How the physical input is interpreted (toggle, momentary, multifunction)
    SwitchMode,
    /// Standard SwitchActions attribute: which edge drives which command
    SwitchActions,
    /// Whether and how the relay is decoupled from the button
    RelayMode,
    /// Longest pause between presses still counted as a multi-press, in ms
    MaxPause,
    /// How long a press must last to count as a long press, in ms
    MinLongPress,
    /// What a long press does (nothing, or level-control up/down)
    LongPressMode,
    /// Whether the endpoint acts as a server or a client
    OperationMode,
}

impl Attribute {
    /// Every attribute in the table
    pub const ALL: [Attribute; 7] = [
        Attribute::SwitchMode,
        Attribute::SwitchActions,
        Attribute::RelayMode,
        Attribute::MaxPause,
        Attribute::MinLongPress,
        Attribute::LongPressMode,
        Attribute::OperationMode,
    ];

    /// The attribute's name as spelled in gateway payload keys
    pub fn name(self) -> &'static str {
        match self {
            Attribute::SwitchMode => "switch_mode",
            Attribute::SwitchActions => "switch_actions",
            Attribute::RelayMode => "relay_mode",
            Attribute::MaxPause => "max_pause",
            Attribute::MinLongPress => "min_long_press",
            Attribute::LongPressMode => "long_press_mode",
            Attribute::OperationMode => "operation_mode",
        }
    }

    /// The attribute's identifier as the firmware logs it
    pub fn wire_id(self) -> &'static str {
        match self {
            Attribute::SwitchMode => "ff00",
            Attribute::SwitchActions => "0010",
            Attribute::RelayMode => "ff01",
            Attribute::MaxPause => "ff02",
            Attribute::MinLongPress => "ff03",
            Attribute::LongPressMode => "ff04",
            Attribute::OperationMode => "ff05",
        }
    }
}

impl FromStr for Attribute {
    type Err = UnknownAttribute;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|attr| attr.name() == name)
            .ok_or_else(|| UnknownAttribute(name.to_string()))
    }
}

/// A name outside the attribute table was used
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown attribute name {0:?}")]
pub struct UnknownAttribute(pub String);

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Panics are forgivable while testing")]

    use super::*;

    #[test]
    fn wire_ids_match_the_firmware_table() {
        assert_eq!(Attribute::SwitchMode.wire_id(), "ff00");
        assert_eq!(Attribute::SwitchActions.wire_id(), "0010");
        assert_eq!(Attribute::RelayMode.wire_id(), "ff01");
        assert_eq!(Attribute::MaxPause.wire_id(), "ff02");
        assert_eq!(Attribute::MinLongPress.wire_id(), "ff03");
        assert_eq!(Attribute::LongPressMode.wire_id(), "ff04");
        assert_eq!(Attribute::OperationMode.wire_id(), "ff05");
    }

    #[test]
    fn names_round_trip() {
        for attr in Attribute::ALL {
            assert_eq!(attr.name().parse::<Attribute>().unwrap(), attr);
        }
    }

    #[test]
    fn unknown_name_is_a_typed_error() {
        let err = "brightness".parse::<Attribute>().unwrap_err();
        assert_eq!(err, UnknownAttribute("brightness".to_string()));
    }
}
