//! Closed choice sets for OSD type, OSD status and status-note status.
//!
//! Each variant carries its wire value, a display label and a color tag used
//! by the UI tables.

use std::fmt;
use std::str::FromStr;

use async_graphql::Enum;
use serde::{Deserialize, Serialize};

/// Error returned when a string is not one of a choice set's values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("\"{0}\" is not a valid choice.")]
pub struct InvalidChoice(pub String);

macro_rules! choice_set {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($variant:ident => ($value:literal, $label:literal, $color:literal)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Enum)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn value(self) -> &'static str {
                match self {
                    $($name::$variant => $value),+
                }
            }

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            pub fn color(self) -> &'static str {
                match self {
                    $($name::$variant => $color),+
                }
            }
        }

        impl FromStr for $name {
            type Err = InvalidChoice;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value => Ok($name::$variant),)+
                    other => Err(InvalidChoice(other.to_string())),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.value())
            }
        }
    };
}

choice_set! {
    /// Physical media behind an OSD.
    OsdType {
        Hdd => ("hdd", "HDD", "blue"),
        Ssd => ("ssd", "SSD", "cyan"),
        Nvme => ("nvme", "NVMe", "purple"),
    }
}

choice_set! {
    /// Operational state of an OSD as recorded by an operator.
    OsdStatus {
        Active => ("active", "Active", "green"),
        Down => ("down", "Down", "orange"),
        Out => ("out", "Out", "red"),
        Destroyed => ("destroyed", "Destroyed", "gray"),
    }
}

choice_set! {
    /// The state that triggered a status note.
    NoteStatus {
        Down => ("down", "Down", "orange"),
        Out => ("out", "Out", "red"),
        Maintenance => ("maintenance", "Maintenance", "blue"),
        Recovered => ("recovered", "Recovered", "green"),
        Other => ("other", "Other", "gray"),
    }
}

impl Default for OsdType {
    fn default() -> Self {
        Self::Hdd
    }
}

impl Default for OsdStatus {
    fn default() -> Self {
        Self::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_values() {
        assert_eq!("nvme".parse::<OsdType>().unwrap(), OsdType::Nvme);
        assert_eq!("destroyed".parse::<OsdStatus>().unwrap(), OsdStatus::Destroyed);
        assert_eq!(
            "maintenance".parse::<NoteStatus>().unwrap(),
            NoteStatus::Maintenance
        );
    }

    #[test]
    fn rejects_unknown_and_miscased_values() {
        let err = "NVMe".parse::<OsdType>().unwrap_err();
        assert_eq!(err.to_string(), "\"NVMe\" is not a valid choice.");
        assert!("active".parse::<NoteStatus>().is_err());
    }

    #[test]
    fn labels_and_colors() {
        assert_eq!(OsdType::Nvme.label(), "NVMe");
        assert_eq!(OsdStatus::Out.color(), "red");
        assert_eq!(NoteStatus::Recovered.color(), "green");
        assert_eq!(OsdStatus::ALL.len(), 4);
        assert_eq!(NoteStatus::ALL.len(), 5);
    }

    #[test]
    fn defaults() {
        assert_eq!(OsdType::default(), OsdType::Hdd);
        assert_eq!(OsdStatus::default(), OsdStatus::Active);
    }

    #[test]
    fn serde_uses_wire_value() {
        assert_eq!(serde_json::to_string(&OsdType::Ssd).unwrap(), "\"ssd\"");
        let s: OsdStatus = serde_json::from_str("\"down\"").unwrap();
        assert_eq!(s, OsdStatus::Down);
    }
}
