//! Network location scopes
//!
//! A ticket is pinned to the physical network by up to four scope fields.
//! The same four dimensions key repeat-fault detection.

use serde::{Deserialize, Serialize};

str_enum! {
    /// Kind of network location a fault is attributed to
    pub enum ScopeType {
        /// Single pole
        Pole => "pole",
        /// Passive optical network segment
        Pon => "pon",
        /// Build zone
        Zone => "zone",
        /// Drop (customer connection)
        Dr => "dr",
    }
}

/// A concrete location: scope kind plus its value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    /// Scope kind
    pub scope_type: ScopeType,
    /// Scope value (pole number, PON, zone id or DR number)
    pub scope_value: String,
}

impl Scope {
    /// Create a scope reference
    #[inline]
    pub fn new(scope_type: ScopeType, scope_value: impl Into<String>) -> Self {
        Self {
            scope_type,
            scope_value: scope_value.into(),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.scope_type, self.scope_value)
    }
}

/// The scope columns carried on a ticket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeFields {
    /// Pole number
    pub pole_number: Option<String>,
    /// PON identifier
    pub pon: Option<String>,
    /// Zone identifier
    pub zone_id: Option<String>,
    /// Drop number
    pub dr_number: Option<String>,
}

impl ScopeFields {
    /// Trim every value and drop blank ones, giving the stored form
    #[must_use]
    pub fn normalized(self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }
        Self {
            pole_number: clean(self.pole_number),
            pon: clean(self.pon),
            zone_id: clean(self.zone_id),
            dr_number: clean(self.dr_number),
        }
    }

    /// Value for one scope kind, ignoring blank strings
    #[must_use]
    pub fn get(&self, scope_type: ScopeType) -> Option<&str> {
        let value = match scope_type {
            ScopeType::Pole => self.pole_number.as_deref(),
            ScopeType::Pon => self.pon.as_deref(),
            ScopeType::Zone => self.zone_id.as_deref(),
            ScopeType::Dr => self.dr_number.as_deref(),
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    /// Every populated scope, in pole, pon, zone, dr order
    #[must_use]
    pub fn populated(&self) -> Vec<Scope> {
        ScopeType::ALL
            .iter()
            .filter_map(|&t| self.get(t).map(|v| Scope::new(t, v)))
            .collect()
    }

    /// True when no scope field carries a value
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.populated().is_empty()
    }

    /// True when all four scope fields are populated (as-built complete)
    #[must_use]
    pub fn is_complete(&self) -> bool {
        ScopeType::ALL.iter().all(|&t| self.get(t).is_some())
    }

    /// Scope kinds that are still blank
    #[must_use]
    pub fn missing(&self) -> Vec<ScopeType> {
        ScopeType::ALL
            .iter()
            .copied()
            .filter(|&t| self.get(t).is_none())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_do_not_count_as_populated() {
        let fields = ScopeFields {
            pole_number: Some("P100".into()),
            pon: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(fields.populated(), vec![Scope::new(ScopeType::Pole, "P100")]);
        assert_eq!(
            fields.missing(),
            vec![ScopeType::Pon, ScopeType::Zone, ScopeType::Dr]
        );
        assert!(!fields.is_complete());
    }

    #[test]
    fn normalizing_trims_and_drops_blanks() {
        let fields = ScopeFields {
            pole_number: Some(" P100 ".into()),
            pon: Some("\t".into()),
            zone_id: None,
            dr_number: Some("DR-9".into()),
        }
        .normalized();
        assert_eq!(fields.pole_number.as_deref(), Some("P100"));
        assert_eq!(fields.pon, None);
        assert_eq!(fields.dr_number.as_deref(), Some("DR-9"));
    }

    #[test]
    fn scope_type_parses_storage_names() {
        assert_eq!("pon".parse::<ScopeType>().unwrap(), ScopeType::Pon);
        assert!("street".parse::<ScopeType>().is_err());
    }
}
