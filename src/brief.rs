//! Natural-language brief handed to the text-generation service.

use chrono::{Datelike, Utc};

use crate::model::{Opportunity, OpportunityKind};

/// Format an integer with thousands separators ("12,345").
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Build the generation instruction block for one opportunity. Optional
/// operator instructions are appended before the kind-specific guidance.
/// Always returns a string; there are no failure modes.
pub fn build_brief(opportunity: &Opportunity, custom: Option<&str>) -> String {
    let target = opportunity
        .page
        .as_deref()
        .filter(|page| !page.is_empty())
        .unwrap_or("New page needed");

    let mut brief = format!(
        "Generate SEO-optimized content for this opportunity:\n\n\
         Keyword: {keyword}\n\
         Type: {kind}\n\
         Current Position: {position}\n\
         Impressions: {impressions}\n\
         Current CTR: {ctr:.2}%\n\
         Target URL: {target}\n\n",
        keyword = opportunity.keyword,
        kind = opportunity.kind.as_str(),
        position = opportunity.position,
        impressions = group_thousands(opportunity.impressions),
        ctr = opportunity.ctr * 100.0,
        target = target,
    );

    if let Some(custom) = custom.filter(|text| !text.trim().is_empty()) {
        brief.push_str(&format!("Additional Instructions: {}\n\n", custom.trim()));
    }

    match opportunity.kind {
        OpportunityKind::Refresh => {
            brief.push_str(&format!(
                "This is a REFRESH opportunity. Update existing content:\n\
                 - Maintain core topic and URL\n\
                 - Update outdated statistics and references to {}\n\
                 - Strengthen weak sections\n\
                 - Improve structure if needed\n",
                Utc::now().year()
            ));
        }
        OpportunityKind::New => {
            brief.push_str(
                "This is a NEW content opportunity. Create comprehensive content:\n\
                 - Be the best resource on this keyword\n\
                 - Include unique angles competitors miss\n",
            );
        }
    }

    brief
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opportunity(kind: OpportunityKind, page: Option<&str>) -> Opportunity {
        Opportunity {
            id: "query_best running shoes".into(),
            kind,
            keyword: "best running shoes".into(),
            page: page.map(str::to_owned),
            position: 8.2,
            impressions: 12_400,
            ctr: 0.0215,
            clicks: 266,
            score: 88,
        }
    }

    #[test]
    fn new_brief_mentions_new_page() {
        let brief = build_brief(&opportunity(OpportunityKind::New, None), None);
        assert!(brief.contains("Keyword: best running shoes"));
        assert!(brief.contains("Type: NEW"));
        assert!(brief.contains("Impressions: 12,400"));
        assert!(brief.contains("Current CTR: 2.15%"));
        assert!(brief.contains("Target URL: New page needed"));
        assert!(brief.contains("NEW content opportunity"));
        assert!(!brief.contains("Additional Instructions"));
    }

    #[test]
    fn refresh_brief_targets_existing_url() {
        let brief = build_brief(
            &opportunity(
                OpportunityKind::Refresh,
                Some("https://example.com/best-running-shoes"),
            ),
            None,
        );
        assert!(brief.contains("Target URL: https://example.com/best-running-shoes"));
        assert!(brief.contains("REFRESH opportunity"));
        assert!(brief.contains("Maintain core topic and URL"));
    }

    #[test]
    fn custom_instructions_are_included() {
        let brief = build_brief(
            &opportunity(OpportunityKind::New, None),
            Some("  focus on trail running  "),
        );
        assert!(brief.contains("Additional Instructions: focus on trail running"));
    }

    #[test]
    fn blank_custom_instructions_are_dropped() {
        let brief = build_brief(&opportunity(OpportunityKind::New, None), Some("   "));
        assert!(!brief.contains("Additional Instructions"));
    }

    #[test]
    fn group_thousands_formats() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1_000), "1,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }
}
