//! Heading-delimited extraction of model replies.
//!
//! A line whose trimmed text starts with `## ` opens a section when its name
//! (up to the first `:`, with `*` removed) is one of the requested headings.
//! Text after the colon on the heading line belongs to that section. Lines
//! before the first recognised heading are dropped.

pub const EVIDENCE: &str = "Evidence";
pub const CHAIN_OF_THOUGHT: &str = "Chain of Thought";
pub const ANSWER: &str = "Answer";
pub const ANALYSIS: &str = "Analysis";
pub const CONCLUSION: &str = "Conclusion";
pub const FINAL_ANSWER: &str = "Final Answer";

pub const ANSWER_HEADINGS: [&str; 3] = [EVIDENCE, CHAIN_OF_THOUGHT, ANSWER];
pub const FUSION_HEADINGS: [&str; 3] = [ANALYSIS, CONCLUSION, FINAL_ANSWER];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sections {
    entries: Vec<(String, String)>,
}

impl Sections {
    /// Trimmed body of `heading`, or `""` when it never appeared.
    pub fn get(&self, heading: &str) -> &str {
        self.entries
            .iter()
            .find(|(h, _)| h == heading)
            .map_or("", |(_, body)| body.as_str())
    }
}

pub fn extract_sections(text: &str, headings: &[&str]) -> Sections {
    let mut bodies: Vec<(String, Vec<String>)> =
        headings.iter().map(|h| (h.to_string(), Vec::new())).collect();
    let mut active: Option<usize> = None;
    for line in text.lines() {
        if let Some((idx, rest)) = match_heading(line, headings) {
            active = Some(idx);
            if !rest.is_empty() {
                bodies[idx].1.push(rest.to_string());
            }
            continue;
        }
        if let Some(idx) = active {
            bodies[idx].1.push(line.to_string());
        }
    }
    let entries = bodies
        .into_iter()
        .map(|(h, lines)| (h, lines.join("\n").trim().to_string()))
        .collect();
    Sections { entries }
}

fn match_heading<'a>(line: &'a str, headings: &[&str]) -> Option<(usize, &'a str)> {
    let body = line.trim().strip_prefix("## ")?;
    let (name, rest) = match body.split_once(':') {
        Some((name, rest)) => (name, rest.trim()),
        None => (body, ""),
    };
    let name = name.replace('*', "");
    let idx = headings.iter().position(|h| *h == name.trim())?;
    Some((idx, rest))
}
