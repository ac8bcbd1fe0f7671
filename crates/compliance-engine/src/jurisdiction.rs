//! Region resolution
//!
//! The assessment service infers `{country, continent, state}` from the
//! normalized feature text. Its labels are free-form, so the result is
//! canonicalized here:
//! - continent and country labels go through best-effort alias maps
//! - US subdivisions given by name or code become two-letter postal codes
//! - `state` is joined as `"{country}-{state}"` (e.g. `US-CA`)

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{json, Value};
use shared_types::RegionDescriptor;
use tracing::{debug, info};

use crate::assessment::AssessmentService;
use crate::error::{EngineError, Result};

/// US state and territory codes used to canonicalize subdivisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    AL,
    AK,
    AZ,
    AR,
    CA,
    CO,
    CT,
    DE,
    FL,
    GA,
    HI,
    ID,
    IL,
    IN,
    IA,
    KS,
    KY,
    LA,
    ME,
    MD,
    MA,
    MI,
    MN,
    MS,
    MO,
    MT,
    NE,
    NV,
    NH,
    NJ,
    NM,
    NY,
    NC,
    ND,
    OH,
    OK,
    OR,
    PA,
    RI,
    SC,
    SD,
    TN,
    TX,
    UT,
    VT,
    VA,
    WA,
    WV,
    WI,
    WY,
    DC,
    PR,
}

impl State {
    const ALL: [State; 52] = [
        State::AL,
        State::AK,
        State::AZ,
        State::AR,
        State::CA,
        State::CO,
        State::CT,
        State::DE,
        State::FL,
        State::GA,
        State::HI,
        State::ID,
        State::IL,
        State::IN,
        State::IA,
        State::KS,
        State::KY,
        State::LA,
        State::ME,
        State::MD,
        State::MA,
        State::MI,
        State::MN,
        State::MS,
        State::MO,
        State::MT,
        State::NE,
        State::NV,
        State::NH,
        State::NJ,
        State::NM,
        State::NY,
        State::NC,
        State::ND,
        State::OH,
        State::OK,
        State::OR,
        State::PA,
        State::RI,
        State::SC,
        State::SD,
        State::TN,
        State::TX,
        State::UT,
        State::VT,
        State::VA,
        State::WA,
        State::WV,
        State::WI,
        State::WY,
        State::DC,
        State::PR,
    ];

    /// Get the full state name
    pub fn name(&self) -> &'static str {
        match self {
            State::AL => "Alabama",
            State::AK => "Alaska",
            State::AZ => "Arizona",
            State::AR => "Arkansas",
            State::CA => "California",
            State::CO => "Colorado",
            State::CT => "Connecticut",
            State::DE => "Delaware",
            State::FL => "Florida",
            State::GA => "Georgia",
            State::HI => "Hawaii",
            State::ID => "Idaho",
            State::IL => "Illinois",
            State::IN => "Indiana",
            State::IA => "Iowa",
            State::KS => "Kansas",
            State::KY => "Kentucky",
            State::LA => "Louisiana",
            State::ME => "Maine",
            State::MD => "Maryland",
            State::MA => "Massachusetts",
            State::MI => "Michigan",
            State::MN => "Minnesota",
            State::MS => "Mississippi",
            State::MO => "Missouri",
            State::MT => "Montana",
            State::NE => "Nebraska",
            State::NV => "Nevada",
            State::NH => "New Hampshire",
            State::NJ => "New Jersey",
            State::NM => "New Mexico",
            State::NY => "New York",
            State::NC => "North Carolina",
            State::ND => "North Dakota",
            State::OH => "Ohio",
            State::OK => "Oklahoma",
            State::OR => "Oregon",
            State::PA => "Pennsylvania",
            State::RI => "Rhode Island",
            State::SC => "South Carolina",
            State::SD => "South Dakota",
            State::TN => "Tennessee",
            State::TX => "Texas",
            State::UT => "Utah",
            State::VT => "Vermont",
            State::VA => "Virginia",
            State::WA => "Washington",
            State::WV => "West Virginia",
            State::WI => "Wisconsin",
            State::WY => "Wyoming",
            State::DC => "District of Columbia",
            State::PR => "Puerto Rico",
        }
    }

    /// Parse from state code or name (case-insensitive)
    pub fn parse_code(s: &str) -> Option<Self> {
        let wanted = s.trim().to_uppercase();
        State::ALL
            .iter()
            .copied()
            .find(|state| state.to_string() == wanted || state.name().to_uppercase() == wanted)
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Best-effort label → canonical name map; unknown labels pass through verbatim
#[derive(Debug, Clone, Default)]
pub struct AliasMap {
    entries: BTreeMap<String, String>,
}

impl AliasMap {
    pub fn new<I, K, V>(aliases: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let entries = aliases
            .into_iter()
            .map(|(k, v)| (k.as_ref().trim().to_lowercase(), v.into()))
            .collect();
        Self { entries }
    }

    pub fn canonical(&self, label: &str) -> String {
        let label = label.trim();
        self.entries
            .get(&label.to_lowercase())
            .cloned()
            .unwrap_or_else(|| label.to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Continent and country alias maps applied to model output
#[derive(Debug, Clone, Default)]
pub struct RegionAliases {
    pub continents: AliasMap,
    pub countries: AliasMap,
}

/// Raw model payload before canonicalization
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRegion {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub continent: Option<String>,
    #[serde(default, alias = "states", alias = "subdivision")]
    pub state: Option<String>,
}

/// Schema sent with the structured-output request
pub fn region_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "country": { "type": "STRING", "nullable": true },
            "continent": { "type": "STRING", "nullable": true },
            "state": { "type": "STRING", "nullable": true }
        },
        "required": ["country", "continent", "state"]
    })
}

impl RegionAliases {
    /// Canonicalize a raw payload into a descriptor
    pub fn canonicalize(&self, raw: RawRegion) -> RegionDescriptor {
        let country = present(raw.country).map(|c| self.countries.canonical(&c));
        let continent = present(raw.continent).map(|c| self.continents.canonical(&c));
        let state = present(raw.state).map(|s| join_state(country.as_deref(), &s));

        RegionDescriptor {
            country,
            continent,
            state,
        }
    }
}

/// `"{country}-{state}"`, without doubling a prefix the model already added
fn join_state(country: Option<&str>, state: &str) -> String {
    let Some(country) = country else {
        return state.to_string();
    };

    let prefix = format!("{}-", country);
    let bare = match state.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(&prefix) => &state[prefix.len()..],
        _ => state,
    };

    let subdivision = if is_united_states(country) {
        State::parse_code(bare)
            .map(|s| s.to_string())
            .unwrap_or_else(|| bare.to_string())
    } else {
        bare.to_string()
    };

    format!("{}-{}", country, subdivision)
}

fn is_united_states(country: &str) -> bool {
    matches!(
        country.trim().to_uppercase().as_str(),
        "US" | "USA" | "UNITED STATES" | "UNITED STATES OF AMERICA"
    )
}

/// Drop empty and null-like labels
fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .filter(|v| {
            !matches!(
                v.to_lowercase().as_str(),
                "null" | "none" | "n/a" | "unknown" | "not specified"
            )
        })
}

/// Infers the region descriptor through the assessment service
pub struct RegionResolver<'a> {
    aliases: &'a RegionAliases,
    service: &'a dyn AssessmentService,
    system_prompt: &'a str,
}

impl<'a> RegionResolver<'a> {
    pub fn new(
        aliases: &'a RegionAliases,
        service: &'a dyn AssessmentService,
        system_prompt: &'a str,
    ) -> Self {
        Self {
            aliases,
            service,
            system_prompt,
        }
    }

    /// Resolve a region from normalized text and an optional jurisdiction hint.
    ///
    /// Fails with `EngineError::Resolution` when the call fails or the payload
    /// is not a `{country, continent, state}` object; the caller must not
    /// continue to rules lookup in that case.
    pub async fn resolve(&self, text: &str, hint: Option<&str>) -> Result<RegionDescriptor> {
        let input = match hint.map(str::trim).filter(|h| !h.is_empty()) {
            Some(hint) => format!("{}\n\nJurisdiction hint: {}", text, hint),
            None => text.to_string(),
        };

        let payload = self
            .service
            .complete_structured(self.system_prompt, &input, &region_schema())
            .await
            .map_err(|e| EngineError::Resolution(e.to_string()))?;
        debug!("Region payload: {}", payload);

        let raw = parse_region_payload(payload)?;
        let region = self.aliases.canonicalize(raw);
        info!("Resolved region: {}", region);
        Ok(region)
    }
}

/// Accepts the object itself or the object wrapped in a one-element array
fn parse_region_payload(payload: Value) -> Result<RawRegion> {
    let payload = match payload {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    };
    if !payload.is_object() {
        return Err(EngineError::Resolution(format!(
            "expected a region object, got {}",
            payload
        )));
    }
    serde_json::from_value(payload)
        .map_err(|e| EngineError::Resolution(format!("malformed region payload: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::AssessmentError;
    use async_trait::async_trait;

    struct FixedRegion(std::result::Result<Value, String>);

    #[async_trait]
    impl AssessmentService for FixedRegion {
        async fn complete(
            &self,
            _system: &str,
            _user: &str,
        ) -> std::result::Result<String, AssessmentError> {
            Err(AssessmentError::EmptyResponse)
        }

        async fn complete_structured(
            &self,
            _system: &str,
            user: &str,
            _schema: &Value,
        ) -> std::result::Result<Value, AssessmentError> {
            assert!(!user.is_empty());
            match &self.0 {
                Ok(v) => Ok(v.clone()),
                Err(e) => Err(AssessmentError::Decode(e.clone())),
            }
        }
    }

    fn aliases() -> RegionAliases {
        RegionAliases {
            continents: AliasMap::new([("NA", "North America"), ("EU", "Europe")]),
            countries: AliasMap::new([("United States", "US")]),
        }
    }

    fn raw(country: &str, continent: &str, state: &str) -> RawRegion {
        let opt = |s: &str| (!s.is_empty()).then(|| s.to_string());
        RawRegion {
            country: opt(country),
            continent: opt(continent),
            state: opt(state),
        }
    }

    #[test]
    fn test_state_parsing() {
        assert_eq!(State::parse_code("FL"), Some(State::FL));
        assert_eq!(State::parse_code("florida"), Some(State::FL));
        assert_eq!(State::parse_code("new york"), Some(State::NY));
        assert_eq!(State::parse_code("Atlantis"), None);
    }

    #[test]
    fn test_state_joined_with_country() {
        let region = aliases().canonicalize(raw("US", "North America", "CA"));
        assert_eq!(region.state.as_deref(), Some("US-CA"));
    }

    #[test]
    fn test_us_state_name_becomes_code() {
        let region = aliases().canonicalize(raw("United States", "NA", "California"));
        assert_eq!(region.country.as_deref(), Some("US"));
        assert_eq!(region.continent.as_deref(), Some("North America"));
        assert_eq!(region.state.as_deref(), Some("US-CA"));
    }

    #[test]
    fn test_existing_prefix_not_doubled() {
        let region = aliases().canonicalize(raw("US", "", "US-FL"));
        assert_eq!(region.state.as_deref(), Some("US-FL"));
    }

    #[test]
    fn test_non_us_state_passes_through() {
        let region = aliases().canonicalize(raw("DE", "EU", "Bavaria"));
        assert_eq!(region.state.as_deref(), Some("DE-Bavaria"));
        assert_eq!(region.continent.as_deref(), Some("Europe"));
    }

    #[test]
    fn test_unknown_continent_passes_through() {
        let region = aliases().canonicalize(raw("", "Antarctica", ""));
        assert_eq!(region.continent.as_deref(), Some("Antarctica"));
        assert_eq!(region.country, None);
    }

    #[test]
    fn test_null_like_labels_dropped() {
        let region = aliases().canonicalize(raw("null", "None", ""));
        assert!(region.is_empty());
    }

    #[test]
    fn test_state_without_country_kept_bare() {
        let region = aliases().canonicalize(raw("", "", "Ontario"));
        assert_eq!(region.state.as_deref(), Some("Ontario"));
    }

    #[tokio::test]
    async fn test_resolve_accepts_legacy_states_field() {
        let service = FixedRegion(Ok(serde_json::json!({
            "country": "US", "continent": "NA", "states": "CA"
        })));
        let aliases = aliases();
        let resolver = RegionResolver::new(&aliases, &service, "extract region");
        let region = resolver.resolve("ads in California", Some("US")).await.unwrap();
        assert_eq!(region.state.as_deref(), Some("US-CA"));
        assert_eq!(region.continent.as_deref(), Some("North America"));
    }

    #[tokio::test]
    async fn test_resolve_fails_on_service_error() {
        let service = FixedRegion(Err("boom".to_string()));
        let aliases = aliases();
        let resolver = RegionResolver::new(&aliases, &service, "extract region");
        let err = resolver.resolve("text", None).await.unwrap_err();
        assert!(matches!(err, EngineError::Resolution(_)));
    }

    #[tokio::test]
    async fn test_resolve_fails_on_malformed_payload() {
        let service = FixedRegion(Ok(serde_json::json!("North America")));
        let aliases = aliases();
        let resolver = RegionResolver::new(&aliases, &service, "extract region");
        assert!(matches!(
            resolver.resolve("text", None).await,
            Err(EngineError::Resolution(_))
        ));

        let service = FixedRegion(Ok(serde_json::json!({ "country": 42 })));
        let resolver = RegionResolver::new(&aliases, &service, "extract region");
        assert!(matches!(
            resolver.resolve("text", None).await,
            Err(EngineError::Resolution(_))
        ));
    }
}
