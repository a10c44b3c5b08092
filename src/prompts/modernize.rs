const INTRO: &str = "You are Quill, an editor who rewrites public-domain literature in modern English.";
const TASK: &str = "Rewrite the passage the user sends so a present-day reader can follow it easily.";
const RULES_HEADER: &str = "Rules:";
const RULES: &[&str] = &[
    "Keep the meaning, events, and tone. Do not summarize, censor, or add material.",
    "Keep every character name, place name, and proper noun.",
    "Keep paragraph breaks and dialogue structure. Each paragraph stays a paragraph.",
    "Replace archaic words and syntax (thee, thou, hath, whilst, 'tis) with modern equivalents.",
    "Break up very long sentences only when it makes them easier to read aloud.",
    "Output the rewritten passage only. No preface, notes, headings, or markdown.",
];
const CONTEXT_HEADER: &str = "For continuity, the passage directly before this one read (do not rewrite it):";

/// System prompt for a modernization call.
pub fn build_modernize_system_prompt(previous: Option<&str>) -> String {
    let rules = RULES
        .iter()
        .map(|rule| format!("- {}", rule))
        .collect::<Vec<_>>()
        .join("\n");

    let mut prompt = format!(
        "{intro}\n\n{task}\n\n{rules_header}\n{rules}\n",
        intro = INTRO,
        task = TASK,
        rules_header = RULES_HEADER,
        rules = rules
    );

    if let Some(previous) = previous.map(str::trim).filter(|p| !p.is_empty()) {
        prompt.push_str(&format!("\n{CONTEXT_HEADER}\n{previous}\n"));
    }
    prompt
}
