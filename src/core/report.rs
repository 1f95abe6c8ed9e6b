use std::collections::BTreeSet;
use std::fmt::Write as _;

use indexmap::IndexMap;

use crate::core::orchestrator::types::{
    FinalReport, SCORE_MAX, SCORE_MIN, SectionResult, SectionSpec, Suggestion, WebSuggestion,
};

/// Mean of the section scores, rounded half-up onto the section scale.
pub fn aggregate_score(sections: &[SectionResult]) -> u8 {
    if sections.is_empty() {
        return SCORE_MIN;
    }
    let total: u32 = sections.iter().map(|s| u32::from(s.score)).sum();
    let mean = f64::from(total) / sections.len() as f64;
    (mean.round() as u8).clamp(SCORE_MIN, SCORE_MAX)
}

/// Builds the report in plan order. `results` is keyed by section name in
/// completion order; a planned section without a result gets a degraded
/// placeholder so the report always has one entry per planned section.
pub fn compile(
    document_title: &str,
    plan: &[SectionSpec],
    results: &IndexMap<String, SectionResult>,
    web: Option<&WebSuggestion>,
) -> FinalReport {
    let mut ordered: Vec<&SectionSpec> = plan.iter().collect();
    ordered.sort_by_key(|s| s.order);

    let sections: Vec<SectionResult> = ordered
        .into_iter()
        .map(|spec| {
            results.get(&spec.name).cloned().unwrap_or_else(|| {
                SectionResult::degraded(&spec.name, "no result was produced", Vec::new())
            })
        })
        .collect();

    let aggregate = aggregate_score(&sections);
    let content = render_markdown(document_title, &sections, web, aggregate);
    FinalReport {
        document_title: document_title.to_string(),
        sections,
        web: web.cloned(),
        aggregate_score: aggregate,
        content,
    }
}

fn push_list(out: &mut String, heading: &str, items: &[String], empty: &str) {
    let _ = writeln!(out, "### {}", heading);
    if items.is_empty() {
        let _ = writeln!(out, "{}", empty);
    } else {
        for item in items {
            let _ = writeln!(out, "- {}", item);
        }
    }
    out.push('\n');
}

fn push_suggestions(out: &mut String, heading: &str, items: &[Suggestion]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "### {}", heading);
    for s in items {
        let _ = writeln!(out, "- {} ([source]({}))", s.text, s.source);
    }
    out.push('\n');
}

fn render_markdown(
    title: &str,
    sections: &[SectionResult],
    web: Option<&WebSuggestion>,
    aggregate: u8,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# PRD Analysis Report: {}\n", title);
    let _ = writeln!(out, "**Overall Score: {}/{}**\n", aggregate, SCORE_MAX);

    let mut research_sources = BTreeSet::new();
    for section in sections {
        let marker = if section.degraded { " [degraded]" } else { "" };
        let _ = writeln!(
            out,
            "## {} (Score: {}/{}){}\n",
            section.name, section.score, SCORE_MAX, marker
        );
        let _ = writeln!(out, "### Analysis\n{}\n", section.analysis);
        push_list(
            &mut out,
            "Recommendations",
            &section.recommendations,
            "No specific recommendations provided.",
        );
        push_list(
            &mut out,
            "Potential Pitfalls",
            &section.pitfalls,
            "No potential pitfalls identified.",
        );
        push_list(
            &mut out,
            "Supported Points",
            &section.supported_points,
            "No supported points identified.",
        );
        push_list(
            &mut out,
            "Sources Referenced",
            &section.sources,
            "No internal sources were found.",
        );
        research_sources.extend(section.sources.iter().cloned());
    }

    if let Some(web) = web {
        out.push_str("---\n\n## Feature & Design Ideas\n\n");
        push_suggestions(&mut out, "Hypotheses to Validate", &web.hypotheses);
        push_suggestions(
            &mut out,
            "Market & Design Considerations",
            &web.considerations,
        );
        research_sources.extend(web.sources.iter().map(|s| format!("{} ({})", s.title, s.url)));
    }

    if !research_sources.is_empty() {
        out.push_str("## Research Sources Used\n");
        for source in &research_sources {
            let _ = writeln!(out, "- {}", source);
        }
    }
    out
}
