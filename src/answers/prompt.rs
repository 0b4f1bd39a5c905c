//! Interactive prompting abstraction over `inquire`, kept as a synchronous
//! trait since the core does not run inside a tokio reactor.

use std::fmt;

/// Two-method interface so tests can supply canned input instead of reading
/// a real terminal.
pub(crate) trait Prompter: Send + Sync {
    fn ask(&mut self, text: &str) -> anyhow::Result<String>;
    fn ask_hidden(&mut self, text: &str) -> anyhow::Result<String>;
}

impl fmt::Debug for dyn Prompter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<dyn Prompter>")
    }
}

/// Default terminal-backed prompter.
pub(crate) struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn ask(&mut self, text: &str) -> anyhow::Result<String> {
        Ok(inquire::Text::new(text).prompt()?)
    }

    fn ask_hidden(&mut self, text: &str) -> anyhow::Result<String> {
        Ok(inquire::Password::new(text)
            .without_confirmation()
            .with_display_mode(inquire::PasswordDisplayMode::Masked)
            .prompt()?)
    }
}

/// A prompter that replays a fixed script of answers, for tests.
pub(crate) struct ScriptedPrompter {
    answers: std::collections::VecDeque<String>,
    pub(crate) expect_hidden: bool,
}

impl ScriptedPrompter {
    pub(crate) fn new(answers: Vec<String>) -> Self {
        Self {
            answers: answers.into(),
            expect_hidden: false,
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&mut self, _text: &str) -> anyhow::Result<String> {
        Ok(self.answers.pop_front().unwrap_or_default())
    }

    fn ask_hidden(&mut self, _text: &str) -> anyhow::Result<String> {
        Ok(self.answers.pop_front().unwrap_or_default())
    }
}
