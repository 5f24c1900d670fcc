//! Text normalization and similarity used by duplicate and contradiction
//! detection. Learning texts follow a loose "prefix + core" convention
//! ("Uses pnpm — not npm"): the prefix carries polarity, the core names the
//! subject, and the em-dash tail is commentary.

use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefix {
    Uses,
    Avoids,
    Prefers,
    Other,
}

const LEADING_PREFIXES: &[(&str, Prefix)] = &[
    ("uses ", Prefix::Uses),
    ("use ", Prefix::Uses),
    ("avoids ", Prefix::Avoids),
    ("avoid ", Prefix::Avoids),
    ("never uses ", Prefix::Avoids),
    ("doesn't use ", Prefix::Avoids),
    ("prefers ", Prefix::Prefers),
    ("prefer ", Prefix::Prefers),
];

pub const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "to", "of", "in", "for", "with", "on", "at", "by", "from",
    "is", "it", "this", "that", "be", "as", "are", "was", "were", "not", "no", "do", "does",
    "should", "would", "will", "can", "has", "have", "when", "always", "usually",
];

/// Lowercase, drop punctuation, collapse whitespace.
pub fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_space = true;
    for c in s.chars() {
        if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' || c == '/' {
            for lc in c.to_lowercase() {
                out.push(lc);
            }
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim_end().to_string()
}

/// The polarity prefix of a learning text.
pub fn prefix_of(text: &str) -> Prefix {
    let lower = text.trim_start().to_lowercase();
    for (p, kind) in LEADING_PREFIXES {
        if lower.starts_with(p) {
            return *kind;
        }
    }
    Prefix::Other
}

/// Strip the conventional leading prefix and any em-dash tail, then normalize.
/// `core("Uses pnpm — not npm")` is `"pnpm"`.
pub fn core_of(text: &str) -> String {
    let mut t = text.trim();
    // Tail after an em-dash is commentary, not subject.
    if let Some(idx) = t.find('\u{2014}') {
        t = t[..idx].trim_end();
    }
    let lower = t.to_lowercase();
    for (p, _) in LEADING_PREFIXES {
        if lower.starts_with(p) {
            t = t[p.len()..].trim_start();
            break;
        }
    }
    normalize(t)
}

fn word_set(s: &str) -> HashSet<&str> {
    s.split_whitespace()
        .filter(|w| w.len() > 1 && !STOPWORDS.contains(w))
        .collect()
}

/// Jaccard word-set similarity over normalized text.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let sa = word_set(a);
    let sb = word_set(b);
    if sa.is_empty() && sb.is_empty() {
        return if a == b && !a.is_empty() { 1.0 } else { 0.0 };
    }
    let union = sa.union(&sb).count();
    if union == 0 {
        return 0.0;
    }
    sa.intersection(&sb).count() as f64 / union as f64
}

/// Uses↔avoids is the one contradicting prefix pairing; everything else is
/// compatible for merge purposes.
pub fn prefixes_contradict(a: Prefix, b: Prefix) -> bool {
    matches!(
        (a, b),
        (Prefix::Uses, Prefix::Avoids) | (Prefix::Avoids, Prefix::Uses)
    )
}

/// Duplicate rule: near-identical cores with compatible prefixes.
pub fn is_duplicate(a: &str, b: &str) -> bool {
    if prefixes_contradict(prefix_of(a), prefix_of(b)) {
        return false;
    }
    cores_similar(&core_of(a), &core_of(b), 0.7)
}

/// True when two already-extracted cores are identical or above the
/// similarity threshold.
pub fn cores_similar(core_a: &str, core_b: &str, threshold: f64) -> bool {
    if core_a.is_empty() || core_b.is_empty() {
        return false;
    }
    core_a == core_b || jaccard(core_a, core_b) > threshold
}

/// Word-bounded containment: does `needle` appear as whole words in `hay`?
pub fn contains_word(hay: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let hay_words: Vec<&str> = hay.split_whitespace().collect();
    let needle_words: Vec<&str> = needle.split_whitespace().collect();
    if needle_words.is_empty() || needle_words.len() > hay_words.len() {
        return false;
    }
    hay_words
        .windows(needle_words.len())
        .any(|w| w == needle_words.as_slice())
}

/// Stable fingerprint for the analyzed-pair dedup cache.
pub fn fingerprint(assistant: &str, developer: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut h = std::hash::DefaultHasher::new();
    assistant.hash(&mut h);
    developer.hash(&mut h);
    format!("{:016x}", h.finish())
}

// Tools that occupy the same slot in a stack: naming a different tool in the
// same category supersedes the old preference.
const TOOL_CATEGORIES: &[(&str, &str)] = &[
    ("npm", "package_manager"),
    ("pnpm", "package_manager"),
    ("yarn", "package_manager"),
    ("bun", "package_manager"),
    ("jest", "test_framework"),
    ("vitest", "test_framework"),
    ("mocha", "test_framework"),
    ("jasmine", "test_framework"),
    ("pytest", "test_framework"),
    ("playwright", "e2e_testing"),
    ("cypress", "e2e_testing"),
    ("selenium", "e2e_testing"),
    ("eslint", "linter"),
    ("biome", "linter"),
    ("ruff", "linter"),
    ("prettier", "formatter"),
    ("black", "formatter"),
    ("react", "ui_framework"),
    ("vue", "ui_framework"),
    ("svelte", "ui_framework"),
    ("angular", "ui_framework"),
    ("solid", "ui_framework"),
    ("next", "meta_framework"),
    ("nextjs", "meta_framework"),
    ("nuxt", "meta_framework"),
    ("remix", "meta_framework"),
    ("astro", "meta_framework"),
    ("express", "server_framework"),
    ("fastify", "server_framework"),
    ("koa", "server_framework"),
    ("hono", "server_framework"),
    ("nestjs", "server_framework"),
    ("firebase", "backend_service"),
    ("supabase", "backend_service"),
    ("postgres", "database"),
    ("postgresql", "database"),
    ("mysql", "database"),
    ("sqlite", "database"),
    ("mongodb", "database"),
    ("mongo", "database"),
    ("prisma", "orm"),
    ("drizzle", "orm"),
    ("typeorm", "orm"),
    ("sequelize", "orm"),
    ("sqlalchemy", "orm"),
    ("tailwind", "css_framework"),
    ("bootstrap", "css_framework"),
    ("bulma", "css_framework"),
];

/// The category of the first known tool named in a normalized text, along
/// with the tool itself.
pub fn tool_category(normalized: &str) -> Option<(&'static str, &'static str)> {
    for word in normalized.split_whitespace() {
        for (tool, cat) in TOOL_CATEGORIES {
            if word == *tool {
                return Some((tool, cat));
            }
        }
    }
    None
}

// Stylistic stances that cannot both hold. Checked in both directions.
pub const STYLE_OPPOSITES: &[(&str, &str)] = &[
    (r"\b(concise|brief|short(er)? responses?)\b", r"\b(verbose|detailed|more explanation)\b"),
    (r"\b(code[ -]first|skip (the )?explanations?)\b", r"\b(explain more|walk.{0,10}through)\b"),
    (r"\b(minimal|no|fewer) comments\b", r"\b(more|add) comments\b"),
    (r"\bfunctional (style|approach|code)\b", r"\b(class(es)?|object[ -]oriented|oop)\b"),
    (r"\bnamed exports?\b", r"\bdefault exports?\b"),
    (r"\bstrict typ(es|ing)\b", r"\b(no|loose) typ(es|ing)\b"),
    (r"\b(simple|simplicity|minimal)\b", r"\bfuture[ -]proof(ing)?\b"),
    (r"\bprototype[ -]first\b", r"\b(plan|design)[ -]first\b"),
];
