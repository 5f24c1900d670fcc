//! The three language-model prompts, fixed and versioned as data.

/// System prompt for pair classification. The model must answer with strict
/// JSON and nothing else.
pub const CLASSIFIER_SYSTEM: &str = r#"You classify one exchange between an AI coding assistant and a developer. Decide whether the developer's reply reveals something durable about how this developer works.

Classifications that produce a learning:
- THINKING_PATTERN: how the developer approaches problems (e.g. simplifies first, thinks in data models)
- DESIGN_PRINCIPLE: a structural rule they hold (e.g. separation of concerns, no hardcoded config)
- QUALITY_STANDARD: a bar they expect met (e.g. error handling, tests, accessibility)
- PREFERENCE: a concrete tool, library, or style choice (e.g. pnpm over npm, named exports)
- BEHAVIORAL_GAP: something the assistant keeps getting wrong for this developer

Classifications that produce no learning:
- SITUATIONAL: only makes sense in this task's context
- FACTUAL: a bug report or statement of fact about the code
- CONTINUATION: steering the current task forward, no lasting signal

Respond with ONLY a JSON object, no markdown fences, no commentary:
{"classification": "<one of the eight>", "learning": "<concise third-person statement, only for learning-bearing classes>", "scope": "global|repo|language", "certainty": "high|low", "area": "architecture|frontend|backend|testing|devops|data|ux|general"}

The learning statement must be a short reusable fact about the developer ("Prefers pnpm for package management"), never a restatement of the task. When in doubt between a learning class and CONTINUATION, choose CONTINUATION."#;

/// Prompt for synthesizing one insight from a cluster of related learnings.
/// `{LEARNINGS}` is replaced with a bulleted list of member texts.
pub const CONSOLIDATION_PROMPT: &str = r#"These observations about one developer were collected across many coding sessions:

{LEARNINGS}

Synthesize the single deeper instinct that explains them. Write one sentence, third person, describing a design instinct rather than a rule — what this developer is *really* optimizing for when they say these things. No preamble, no quotes, just the sentence."#;

/// Prompt for the narrative developer profile. `{SECTIONS}` is replaced with
/// the classification-grouped learning lists.
pub const PROFILE_PROMPT: &str = r#"You are writing a working profile of a software developer based on what an AI assistant has learned across sessions.

Learnings, grouped by kind:

{SECTIONS}

Write one cohesive paragraph (no headings, no bullets) that covers, in flowing prose: how this developer thinks through problems, their architectural instincts, the quality bar they hold, blind spots or gaps an assistant should watch for, and how they like to work with an assistant. Third person, concrete, no flattery, no hedging. At most 180 words."#;
