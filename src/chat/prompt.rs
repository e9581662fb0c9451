//! The system preamble sent ahead of every conversation window, rendered
//! with Handlebars. Strict mode and no helpers beyond what is registered
//! here keep the template surface small.
use std::fmt;

use anyhow::{Error, Result};
use chrono::{DateTime, Local, TimeZone};
use handlebars::Handlebars;
use serde_json::json;

pub const DEFAULT_PERSONA: &str = r#"
Your name is Fay. You are a voice assistant living on the user's desktop in FayDesk and you talk with the user out loud in real time.

# Your goals

- Hold a natural, relaxed conversation that sounds like a real person.
- Make the user feel heard, with warmth and quick feedback.

# How to speak

- Keep replies short and spoken, not written. One paragraph at most unless the user asks for detail.
- Never use Markdown, emoji, lists or any formatting.
- Use casual fillers where they fit, like "hmm", "sure" or "let me think".
- If the topic is complex, answer briefly first and then offer to go deeper.
- Don't add side notes in parentheses.

If you notice a reply getting long, formal or formatted, switch back to short and spoken.
"#;

#[derive(Debug)]
pub enum Prompt {
    SystemPreamble,
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

const SYSTEM_PREAMBLE: &str = "{{persona}}\n\nCurrent date and time: {{now}}";

pub fn templates<'a>() -> Result<Handlebars<'a>, Error> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    // Output goes to a model, not a browser
    registry.register_escape_fn(handlebars::no_escape);
    registry.register_template_string(&Prompt::SystemPreamble.to_string(), SYSTEM_PREAMBLE)?;
    Ok(registry)
}

/// Renders the persona followed by the current local date and time.
pub struct SystemPreamble {
    persona: String,
    registry: Handlebars<'static>,
}

impl SystemPreamble {
    pub fn new(persona: &str) -> Result<Self, Error> {
        Ok(Self {
            persona: persona.trim().to_string(),
            registry: templates()?,
        })
    }

    pub fn render(&self) -> Result<String, Error> {
        self.render_at(&Local::now())
    }

    pub fn render_at<Tz>(&self, now: &DateTime<Tz>) -> Result<String, Error>
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let now = now.format("%Y-%m-%d %H:%M:%S (UTC%:z)").to_string();
        let rendered = self.registry.render(
            &Prompt::SystemPreamble.to_string(),
            &json!({ "persona": self.persona, "now": now }),
        )?;
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn test_render_includes_persona_and_time() {
        let preamble = SystemPreamble::new("  You are <Fay> & friends.  ").unwrap();
        let offset = FixedOffset::east_opt(8 * 3600).unwrap();
        let now = offset.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            preamble.render_at(&now).unwrap(),
            "You are <Fay> & friends.\n\nCurrent date and time: 2025-01-02 03:04:05 (UTC+08:00)"
        );
    }

    #[test]
    fn test_default_persona_renders() {
        let preamble = SystemPreamble::new(DEFAULT_PERSONA).unwrap();
        let rendered = preamble.render().unwrap();
        assert!(rendered.starts_with("Your name is Fay."));
        assert!(rendered.contains("Current date and time: "));
    }
}
