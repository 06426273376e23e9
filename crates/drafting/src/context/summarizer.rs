//! Section summarizer: renders one evidence item as a compact text block.
//!
//! Structured field groups are listed under a label; empty groups are
//! omitted entirely. Free text is truncated to the per-item cap.

use crate::context::evidence::{PrecedentHit, ReferenceHit, SourceDocument};
use crate::context::token;
use std::fmt::Write;

/// Render a source document: title, non-empty field groups, then the raw
/// text cut to `raw_text_cap` tokens.
pub fn summarize_source(doc: &SourceDocument, raw_text_cap: usize) -> String {
    let mut out = format!("### {}\n", display_title(&doc.title));

    let groups: [(&str, &[String]); 4] = [
        ("Key dates", &doc.key_dates),
        ("Amounts", &doc.amounts),
        ("Reference numbers", &doc.reference_ids),
        ("Issues identified", &doc.issues),
    ];
    for (label, values) in groups {
        push_group(&mut out, label, values);
    }

    if !doc.raw_text.trim().is_empty() {
        out.push_str("\nExtracted text:\n");
        out.push_str(&token::truncate(doc.raw_text.trim(), raw_text_cap));
        out.push('\n');
    }

    out
}

/// Render a reference hit with its content cut to `content_cap` tokens.
pub fn summarize_reference(hit: &ReferenceHit, content_cap: usize) -> String {
    let mut out = format!("### {}\n", display_title(&hit.title));
    push_meta(&mut out, &hit.category, hit.relevance_score);
    out.push('\n');
    out.push_str(&token::truncate(hit.content.trim(), content_cap));
    out.push('\n');
    out
}

/// Render a precedent hit. Summary and outcome are capped independently
/// at `field_cap` tokens each.
pub fn summarize_precedent(hit: &PrecedentHit, field_cap: usize) -> String {
    let mut out = format!("### {}\n", display_title(&hit.title));
    push_meta(&mut out, &hit.category, hit.relevance_score);

    if !hit.content.trim().is_empty() {
        out.push_str("\nSummary:\n");
        out.push_str(&token::truncate(hit.content.trim(), field_cap));
        out.push('\n');
    }
    if let Some(outcome) = hit.outcome.as_deref().filter(|o| !o.trim().is_empty()) {
        out.push_str("\nOutcome:\n");
        out.push_str(&token::truncate(outcome.trim(), field_cap));
        out.push('\n');
    }

    out
}

fn display_title(title: &str) -> &str {
    let title = title.trim();
    if title.is_empty() { "(untitled)" } else { title }
}

fn push_group(out: &mut String, label: &str, values: &[String]) {
    let mut values = values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()).peekable();
    if values.peek().is_none() {
        return;
    }
    let _ = writeln!(out, "{label}:");
    for value in values {
        let _ = writeln!(out, "- {value}");
    }
}

fn push_meta(out: &mut String, category: &str, relevance: f32) {
    if !category.trim().is_empty() {
        let _ = writeln!(out, "Category: {}", category.trim());
    }
    let _ = writeln!(out, "Relevance: {relevance:.2}");
}
