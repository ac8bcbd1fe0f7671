//! Region descriptor resolved from free text

use serde::{Deserialize, Serialize};

/// Structured `{country, continent, state}` tuple for one analyzed input.
///
/// `state`, when present, is always stored as `"{country}-{state}"` (e.g. `US-CA`)
/// so subdivisions sharing a name across countries stay distinct.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDescriptor {
    pub country: Option<String>,
    pub continent: Option<String>,
    pub state: Option<String>,
}

impl RegionDescriptor {
    /// True when no field carries a value
    pub fn is_empty(&self) -> bool {
        [&self.country, &self.continent, &self.state]
            .iter()
            .all(|field| field.as_deref().map_or(true, |v| v.trim().is_empty()))
    }
}

impl std::fmt::Display for RegionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<&str> = [&self.state, &self.country, &self.continent]
            .into_iter()
            .filter_map(|field| field.as_deref())
            .filter(|v| !v.trim().is_empty())
            .collect();
        if parts.is_empty() {
            write!(f, "unresolved")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}
