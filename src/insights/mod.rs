//! Generated insight sections: the fixed section set, prompt templates,
//! response extraction, the generator, client-side merge rules and the
//! server-side cached service.

pub mod extract;
pub mod generator;
pub mod merge;
pub mod prompts;
pub mod service;

pub use generator::SectionGenerator;
pub use merge::MergedInsights;
pub use service::InsightService;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MacroError;

/// An independently fetchable unit of generated insight content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    UsEconomy,
    GlobalDaily,
    GlobalRegional,
    GlobalIndustry,
    UsIndustry,
    UsYouth,
    Collectibles,
    IndustryTrends,
    IndustryFootwear,
    IndustryApparel,
    IndustryColor,
    IndustryConsumer,
}

impl Section {
    /// Every section, in request order.
    pub const ALL: [Section; 12] = [
        Section::UsEconomy,
        Section::GlobalDaily,
        Section::GlobalRegional,
        Section::GlobalIndustry,
        Section::UsIndustry,
        Section::UsYouth,
        Section::Collectibles,
        Section::IndustryTrends,
        Section::IndustryFootwear,
        Section::IndustryApparel,
        Section::IndustryColor,
        Section::IndustryConsumer,
    ];

    /// Wire key used in `?s=` and in cache keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Section::UsEconomy => "us_economy",
            Section::GlobalDaily => "global_daily",
            Section::GlobalRegional => "global_regional",
            Section::GlobalIndustry => "global_industry",
            Section::UsIndustry => "us_industry",
            Section::UsYouth => "us_youth",
            Section::Collectibles => "collectibles",
            Section::IndustryTrends => "industry_trends",
            Section::IndustryFootwear => "industry_footwear",
            Section::IndustryApparel => "industry_apparel",
            Section::IndustryColor => "industry_color",
            Section::IndustryConsumer => "industry_consumer",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = MacroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Section::ALL
            .into_iter()
            .find(|section| section.as_str() == s)
            .ok_or_else(|| MacroError::UnknownSection(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_keys_roundtrip() {
        for section in Section::ALL {
            assert_eq!(section.as_str().parse::<Section>().unwrap(), section);
        }
    }

    #[test]
    fn test_unknown_section_rejected() {
        let err = "weather".parse::<Section>().unwrap_err();
        assert_eq!(err, MacroError::UnknownSection("weather".into()));
    }

    #[test]
    fn test_section_serde_matches_wire_key() {
        let json = serde_json::to_string(&Section::IndustryColor).unwrap();
        assert_eq!(json, r#""industry_color""#);
    }

    #[test]
    fn test_all_sections_unique() {
        let mut keys: Vec<_> = Section::ALL.iter().map(|s| s.as_str()).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), Section::ALL.len());
    }
}
