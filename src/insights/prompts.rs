//! Prompt templates for each insight section and the daily podcast script.
//!
//! Each template pins the JSON shape the dashboard renders, keyed by the
//! section's top-level field.

use chrono::NaiveDate;

use super::Section;

/// Shared formatting rules appended to every section prompt.
const FORMATTING_RULES: &str = "
FORMATTING RULES (follow strictly):
- Use ▲/▼ only for period-over-period changes, e.g. \"CPI rose ▲ 0.2% month-over-month\" or \"yields fell ▼ 15 bps\".
- Never put ▲/▼ on levels, prices, market sizes, valuations or shares that are not compared to a prior period.
- Place the arrow before the number and follow the number with a unit: ▲ 2.4% YoY, ▼ 23,000 jobs.
- No **bold** or other markdown emphasis. Plain text only.";

/// Human-readable date used inside prompts, e.g. `Saturday, March 7, 2026`.
pub fn date_label(date: NaiveDate) -> String {
    date.format("%A, %B %-d, %Y").to_string()
}

/// Build the generation prompt for `section` on `date`.
pub fn section_prompt(section: Section, date: NaiveDate) -> String {
    let day = date_label(date);
    let body = match section {
        Section::UsEconomy => format!(
            r#"You are a senior macroeconomist writing the daily US economy briefing for {day}.
Use the latest data from FRED, BLS, BEA and financial news.
Return JSON with exactly this structure:
{{
  "us_daily": {{
    "economy": {{
      "macro": "2-3 paragraphs on GDP growth, trajectory and key risks",
      "inflation": "2-3 paragraphs on CPI, PCE, Fed policy and rate expectations",
      "jobs": "2 paragraphs on unemployment, claims, payrolls and wages",
      "markets": "paragraph on equities, treasury yields, VIX and sector rotation",
      "consumer": "paragraph on confidence, savings rate and spending",
      "housing": "paragraph on home sales, mortgage rates, prices and starts"
    }}
  }}
}}
Cite specific current figures."#
        ),
        Section::UsIndustry => format!(
            r#"You are a footwear and apparel industry analyst writing for {day}.
Use current data on Nike, Adidas, New Balance, On Running, Skechers, Lululemon and the wider market.
Return JSON:
{{
  "us_daily": {{
    "industry": {{
      "demand": "paragraph on consumer demand, sales trends and traffic",
      "pricing": "paragraph on promotions, ASP trends and tariff impact",
      "youth": "paragraph on Gen Z behavior, social media influence and sneaker culture",
      "digital": "paragraph on e-commerce penetration, social commerce and DTC",
      "seasonal": "paragraph on the season outlook, inventory and weather",
      "trends": "paragraph on silhouettes and colorways gaining or losing heat"
    }}
  }}
}}
Name real brands and numbers."#
        ),
        Section::GlobalDaily => format!(
            r#"You are a global macro strategist writing the daily briefing for {day}.
Cover every major region using current central bank, IMF and World Bank data.
Return JSON:
{{
  "global_daily": {{
    "europe": "paragraph on the ECB, eurozone GDP, inflation and PMIs",
    "china": "paragraph on the PBOC, GDP, PMI, property and stimulus",
    "asia": "paragraph on the BOJ, Japan, APAC trade and emerging Asia",
    "em": "paragraph on EM currencies, LatAm, MENA and Africa",
    "commodities": "paragraph on WTI, Brent, natural gas, copper and agriculture",
    "gold": "paragraph on gold prices, central bank buying and safe-haven flows",
    "risk": "paragraph on VIX, credit spreads, geopolitics and risk appetite"
  }}
}}"#
        ),
        Section::GlobalRegional => format!(
            r#"You are a regional economist writing for {day}.
Return JSON:
{{
  "global_regional": {{
    "europe": "2 paragraphs on the European economy, ECB policy and major countries",
    "asia": "2 paragraphs on Japan, South Korea, ASEAN and India",
    "china": "2 paragraphs on China's economy, trade, property and tech",
    "em": "2 paragraphs on emerging markets in Africa, Latin America and MENA"
  }}
}}"#
        ),
        Section::GlobalIndustry => format!(
            r#"You are a global footwear and apparel industry analyst writing for {day}.
Return JSON:
{{
  "global_industry": {{
    "euro_luxury": "paragraph on European luxury houses and fashion weeks",
    "china_consumer": "paragraph on Chinese sportswear brands and domestic consumption",
    "asia_manufacturing": "paragraph on Vietnam, Indonesia and Bangladesh supply chains and tariffs",
    "africa_latam": "paragraph on consumer growth and retail in Africa and LatAm",
    "digital": "paragraph on global e-commerce and social selling",
    "sustainability": "paragraph on EU textile regulation, ESG and circular fashion"
  }}
}}"#
        ),
        Section::UsYouth => format!(
            r##"You are a youth culture and consumer behavior analyst writing for {day}.
Focus on Gen Z and Gen Alpha in the US footwear and apparel market.
Return JSON:
{{
  "us_youth_insights": [
    {{"theme": "Sneaker Culture", "icon": "directions_run", "color": "var(--orange)", "title": "title with data", "body": "2-3 sentence analysis", "sourceKey": "SHOERETAIL"}},
    {{"theme": "Fast Fashion & Deflation", "icon": "checkroom", "color": "var(--cyan)", "title": "title with data", "body": "analysis", "sourceKey": "APPARELCPI"}},
    {{"theme": "Digital-First Shopping", "icon": "phone_iphone", "color": "var(--accent)", "title": "title with data", "body": "analysis", "sourceKey": "ECOMMPCT"}},
    {{"theme": "Gen Z Spending Power", "icon": "payments", "color": "var(--green)", "title": "title with data", "body": "analysis", "sourceKey": "YOUTH1624UE"}},
    {{"theme": "Credit & BNPL", "icon": "credit_card", "color": "var(--red)", "title": "title with data", "body": "analysis", "sourceKey": "REVOLVCREDIT"}},
    {{"theme": "Sustainability & Resale", "icon": "recycling", "color": "var(--purple)", "title": "title with data", "body": "analysis"}},
    {{"theme": "Athleisure Dominance", "icon": "fitness_center", "color": "var(--yellow)", "title": "title with data", "body": "analysis", "sourceKey": "CLOTHRETAIL"}},
    {{"theme": "Supply Chain & Tariffs", "icon": "local_shipping", "color": "#f472b6", "title": "title with data", "body": "analysis", "sourceKey": "FOOTWEARPPI"}},
    {{"theme": "Identity & Self-Expression", "icon": "palette", "color": "var(--cyan)", "title": "title with data", "body": "analysis", "sourceKey": "UMCSENT"}}
  ]
}}
Every insight should carry current data."##
        ),
        Section::Collectibles => format!(
            r#"You are an alternative assets analyst covering collectibles for {day}.
Return JSON:
{{
  "collectibles": {{
    "intro": "2-3 sentence overview of collectibles as alternative investments in today's macro climate",
    "segments": [
      {{"name": "Sneaker Resale", "icon": "directions_run", "color": "var(--orange)", "thesis": "2-3 sentence thesis", "risk": "Medium", "riskNote": "brief risk context"}},
      {{"name": "Trading Cards", "icon": "style", "color": "var(--cyan)", "thesis": "thesis", "risk": "High", "riskNote": "risk note"}},
      {{"name": "Luxury Watches", "icon": "watch", "color": "var(--green)", "thesis": "thesis", "risk": "Medium", "riskNote": "risk note"}},
      {{"name": "Vintage Fashion", "icon": "checkroom", "color": "var(--purple)", "thesis": "thesis", "risk": "Low", "riskNote": "risk note"}}
    ]
  }}
}}
Include current valuations where available."#
        ),
        Section::IndustryTrends => format!(
            r#"You are a senior footwear and apparel strategist writing for {day}.
Return JSON with exactly 12 trends: the first 6 are industry currents, the last 6 cultural currents.
{{
  "industry_trends": [
    {{"icon": "trending_up", "color": "var(--green-500)", "title": "Trend Title", "body": "2-3 paragraphs with brand examples and data", "tags": ["Tag1", "Tag2", "Tag3"]}}
  ]
}}
Icons must be valid Material Icons. Colors use CSS variables such as var(--blue-500), var(--purple-500), var(--amber-500) or var(--cyan).
Cover economic headwinds, supply chains, retail transformation, sustainability, labor, AI, athleisure, resale, social media, personalization, hybrid work and youth culture."#
        ),
        Section::IndustryFootwear => format!(
            r#"You are a footwear industry analyst writing for {day}.
Return JSON:
{{
  "industry_footwear": {{
    "silhouettes": [
      {{"icon": "arrow_upward", "color": "var(--green)", "title": "Silhouette", "body": "analysis with brand examples", "tags": ["Tag1", "Tag2"]}}
    ],
    "brands": [
      {{"name": "Brand", "direction": "up|flat|down", "body": "momentum analysis"}}
    ],
    "categories": [
      {{"label": "Lifestyle/Casual", "color": "var(--green)", "detail": "segment analysis"}}
    ]
  }}
}}
Give at least 4 silhouettes, 6 brands (Adidas, New Balance, On Running, Nike, Asics, Puma) and 6 categories (lifestyle, running, outdoor, luxury sneakers, sandals, boots).
Include revenue data, collaborations and specific models."#
        ),
        Section::IndustryApparel => format!(
            r#"You are an apparel industry analyst writing for {day}.
Return JSON:
{{
  "industry_apparel": {{
    "aesthetics": [
      {{"icon": "style", "color": "var(--green)", "title": "Aesthetic", "body": "trend analysis", "tags": ["Tag1", "Tag2"]}}
    ],
    "brands": [
      {{"name": "Brand", "direction": "up|flat|down", "body": "momentum analysis"}}
    ],
    "categories": [
      {{"label": "Category", "color": "var(--color)", "detail": "analysis"}}
    ]
  }}
}}
Give at least 4 aesthetics, 6 brands spanning luxury, athletic, fast fashion and streetwear, and 5 categories.
Cover athleisure, streetwear, quiet luxury, workwear and outerwear."#
        ),
        Section::IndustryColor => format!(
            r#"You are a color and materials forecaster writing for {day}.
Return JSON:
{{
  "industry_color": {{
    "colors": [
      {{"name": "Color Family", "gradient": "linear-gradient(135deg, #hex1, #hex2, #hex3)", "status": "hot|rising|stable|fading", "detail": "analysis"}}
    ],
    "materials": [
      {{"icon": "eco", "color": "var(--green)", "title": "Material", "body": "trend analysis", "tags": ["Tag1", "Tag2"]}}
    ],
    "design": [
      {{"label": "Design Detail", "color": "var(--color)", "detail": "analysis"}}
    ]
  }}
}}
Give at least 6 colors, 4 materials and 5 design details. Use real hex values. Status must be one of hot, rising, stable or fading."#
        ),
        Section::IndustryConsumer => format!(
            r#"You are a consumer behavior analyst covering footwear and apparel for {day}.
Return JSON:
{{
  "industry_consumer": {{
    "generations": [
      {{"icon": "person", "color": "var(--accent)", "title": "Generation & Profile", "body": "2-3 paragraphs on spending and preferences", "tags": ["Tag1", "Tag2", "Tag3"]}}
    ],
    "shopping": [
      {{"icon": "storefront", "color": "var(--green)", "title": "Behavior Shift", "body": "analysis", "tags": ["Tag1", "Tag2"]}}
    ],
    "culture": [
      {{"icon": "music_note", "color": "var(--purple)", "title": "Cultural Force", "body": "analysis", "tags": ["Tag1", "Tag2"]}}
    ]
  }}
}}
Give at least 4 entries in each list. Include market sizes, percentages and brand examples."#
        ),
    };
    format!("{body}\n{FORMATTING_RULES}")
}

/// Build the two-host podcast script prompt for `date`.
pub fn podcast_prompt(date: NaiveDate) -> String {
    let day = date_label(date);
    format!(
        r#"You are writing the script for "The Morning Macro" for {day}.
It is a two-person daily macro briefing. Alex is the lead host and Sam is the analyst.
They discuss the day's economic data, market moves and footwear and apparel industry news.
Use current figures for GDP, unemployment, inflation, Fed policy, equities, treasury yields and housing, plus brand news from Nike, Adidas, New Balance and On Running.
Return JSON:
{{
  "lines": [
    {{"speaker": "Alex", "text": "opening greeting and topic preview"}},
    {{"speaker": "Sam", "text": "first key story"}}
  ]
}}
Write 7-10 lines of natural dialogue, alternating speakers, 2-3 sentences each, with specific numbers."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 7).unwrap()
    }

    #[test]
    fn test_date_label() {
        assert_eq!(date_label(day()), "Saturday, March 7, 2026");
    }

    #[test]
    fn test_every_prompt_names_its_payload_key() {
        let expected = [
            (Section::UsEconomy, "\"us_daily\""),
            (Section::UsIndustry, "\"us_daily\""),
            (Section::UsYouth, "\"us_youth_insights\""),
            (Section::IndustryColor, "\"industry_color\""),
            (Section::Collectibles, "\"collectibles\""),
        ];
        for (section, key) in expected {
            assert!(section_prompt(section, day()).contains(key), "{section}");
        }
    }

    #[test]
    fn test_prompts_carry_date_and_rules() {
        for section in Section::ALL {
            let prompt = section_prompt(section, day());
            assert!(prompt.contains("March 7, 2026"), "{section}");
            assert!(prompt.contains("FORMATTING RULES"), "{section}");
        }
    }

    #[test]
    fn test_podcast_prompt_asks_for_lines() {
        let prompt = podcast_prompt(day());
        assert!(prompt.contains("\"lines\""));
        assert!(prompt.contains("The Morning Macro"));
    }
}
