//! Interactive annotation of pattern matches.
//!
//! The loop walks over the matches of a pattern, shows each one in the
//! context of its sentence, and reads single-character commands that
//! annotate the match, move between matches, or display more of the tree.

use crate::error::TredevError;
use crate::matcher::MatchId;
use crate::session::Session;
use std::io::{self, BufRead, Write};
use tracing::warn;

pub const HELP: &str = "
# t = true      n = next        a = pattern     e = evaluation
# f = false     p = previous    s = subtree     q = quit
# u = unknown                   r = full tree
# i = ignore                    d = draw tree
";

const RULE_WIDTH: usize = 78;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ShowPattern,
    DrawTree,
    Evaluate,
    SetFalse,
    SetIgnore,
    Next,
    Previous,
    Quit,
    SetTrue,
    FullTree,
    Subtree,
    SetUnknown,
    Unrecognized(char),
}

impl Command {
    pub fn from_char(c: char) -> Self {
        match c {
            'a' => Self::ShowPattern,
            'd' => Self::DrawTree,
            'e' => Self::Evaluate,
            'f' => Self::SetFalse,
            'i' => Self::SetIgnore,
            'n' => Self::Next,
            'p' => Self::Previous,
            'q' => Self::Quit,
            't' => Self::SetTrue,
            'r' => Self::FullTree,
            's' => Self::Subtree,
            'u' => Self::SetUnknown,
            other => Self::Unrecognized(other),
        }
    }
}

/// Where commands come from. `Ok(None)` means the input is exhausted.
pub trait CommandSource {
    fn read_command(&mut self) -> io::Result<Option<char>>;
}

/// Line-buffered commands: the first non-blank character of each line.
pub struct LineCommands<R> {
    reader: R,
}

impl<R: BufRead> LineCommands<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> CommandSource for LineCommands<R> {
    fn read_command(&mut self) -> io::Result<Option<char>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            if let Some(c) = line.trim().chars().next() {
                return Ok(Some(c));
            }
        }
    }
}

/// Effect of one command on the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Stay on the current match and prompt again
    Stay,
    /// A (possibly different) match becomes current
    Moved,
    Quit,
}

/// State of one annotation run
#[derive(Debug, Clone)]
pub struct AnnotationLoop {
    pattern: String,
    label: String,
    /// Matches visited by the loop (only unknown ones if so requested)
    matches: Vec<MatchId>,
    /// Every match of the pattern, used for evaluation
    all_matches: Vec<MatchId>,
    index: usize,
    annotated: usize,
}

impl AnnotationLoop {
    /// Run the matcher and set up the loop for `pattern` and `label`.
    pub fn start(
        session: &Session,
        pattern: &str,
        label: &str,
        unknown_only: bool,
    ) -> crate::Result<Self> {
        if !session.annotations().has_label(label) {
            return Err(TredevError::InvalidLabel(label.to_string()));
        }
        let all_matches = session.matches(pattern)?;
        Ok(Self::with_matches(session, pattern, label, all_matches, unknown_only))
    }

    /// Set up the loop over already computed matches.
    pub fn with_matches(
        session: &Session,
        pattern: &str,
        label: &str,
        all_matches: Vec<MatchId>,
        unknown_only: bool,
    ) -> Self {
        let annots = session.annotations();
        let mut matches: Vec<MatchId> = all_matches
            .iter()
            .copied()
            .filter(|m| session.nodes().contains(m.node_id()))
            .collect();
        if matches.len() < all_matches.len() {
            warn!(
                skipped = all_matches.len() - matches.len(),
                "matches outside the node table are not shown"
            );
        }
        if unknown_only {
            matches.retain(|m| annots.is_unknown(m.node_id(), label).unwrap_or(false));
        }

        Self {
            pattern: pattern.to_string(),
            label: label.to_string(),
            matches,
            all_matches,
            index: 0,
            annotated: 0,
        }
    }

    pub fn matches(&self) -> &[MatchId] {
        &self.matches
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of annotation commands applied so far
    pub fn annotated(&self) -> usize {
        self.annotated
    }

    pub fn current(&self) -> Option<MatchId> {
        self.matches.get(self.index).copied()
    }

    fn advance(&mut self) {
        self.index = (self.index + 1).min(self.matches.len().saturating_sub(1));
    }

    /// Print the current match: position, sentence context and gold value.
    pub fn show(&self, session: &Session, out: &mut dyn Write) -> crate::Result<()> {
        let Some(current) = self.current() else {
            return Ok(());
        };
        let node_id = current.node_id();
        let nodes = session.nodes();

        writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
        writeln!(
            out,
            "Match: {}/{}, Sentence: {}, Node: {}",
            self.index + 1,
            self.matches.len(),
            current.tree,
            current.node
        )?;
        writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;

        let sentence = nodes.sentence(node_id)?;
        let substring = nodes.substring(node_id)?;
        match split_context(&sentence, &substring) {
            Some((left, right)) => {
                writeln!(out, "{}", left.trim())?;
                writeln!(out, "==> {substring} <==")?;
                writeln!(out, "{}", right.trim())?;
            }
            None => {
                writeln!(
                    out,
                    "* Warning: substring \"{substring}\" not (unique) in sentence \"{sentence}\""
                )?;
            }
        }

        let value = session.annotations().get(node_id, &self.label)?;
        writeln!(out, "Label: {value}")?;
        Ok(())
    }

    /// Apply one command.
    pub fn step(
        &mut self,
        session: &mut Session,
        command: Command,
        out: &mut dyn Write,
    ) -> crate::Result<Transition> {
        let Some(current) = self.current() else {
            return Ok(Transition::Quit);
        };
        let node_id = current.node_id();
        let position = format!("{}/{}", self.index + 1, self.matches.len());

        let transition = match command {
            Command::ShowPattern => {
                writeln!(out, "{}", self.pattern)?;
                Transition::Stay
            }
            Command::DrawTree => {
                write!(out, "{}", session.nodes().draw(node_id)?)?;
                Transition::Stay
            }
            Command::Evaluate => {
                let scores = session.evaluate(&self.label, &self.all_matches)?;
                write!(out, "{scores}")?;
                Transition::Stay
            }
            Command::FullTree => {
                writeln!(out, "{}", session.nodes().full_tree(node_id, 2)?)?;
                Transition::Stay
            }
            Command::Subtree => {
                writeln!(out, "{}", session.nodes().subtree(node_id, 2)?)?;
                Transition::Stay
            }
            Command::SetTrue => {
                session.annotations_mut().set_positive(node_id, &self.label)?;
                writeln!(out, "# set match {position} to True")?;
                self.annotated += 1;
                self.advance();
                Transition::Moved
            }
            Command::SetFalse => {
                session.annotations_mut().set_negative(node_id, &self.label)?;
                writeln!(out, "# set match {position} to False")?;
                self.annotated += 1;
                self.advance();
                Transition::Moved
            }
            Command::SetUnknown => {
                session.annotations_mut().set_unknown(node_id, &self.label)?;
                writeln!(out, "# set match {position} to Unknown")?;
                self.annotated += 1;
                self.advance();
                Transition::Moved
            }
            Command::SetIgnore => {
                session.annotations_mut().set_ignore(node_id, &self.label)?;
                writeln!(out, "# set match {position} to Ignore")?;
                self.annotated += 1;
                self.advance();
                Transition::Moved
            }
            Command::Next => {
                self.advance();
                Transition::Moved
            }
            Command::Previous => {
                self.index = self.index.saturating_sub(1);
                Transition::Moved
            }
            Command::Quit => {
                writeln!(out, "# quit")?;
                Transition::Quit
            }
            Command::Unrecognized(_) => {
                writeln!(out, "* Unknown command")?;
                writeln!(out, "{HELP}")?;
                Transition::Stay
            }
        };
        Ok(transition)
    }

    /// Drive the loop until `q` or the end of input.
    pub fn run(
        &mut self,
        session: &mut Session,
        input: &mut dyn CommandSource,
        out: &mut dyn Write,
    ) -> crate::Result<()> {
        if self.matches.is_empty() {
            writeln!(out, "*** pattern has zero (unknown) matches ***")?;
            return Ok(());
        }

        self.show(session, out)?;
        loop {
            write!(out, "?")?;
            out.flush()?;
            let Some(c) = input.read_command()? else {
                writeln!(out)?;
                writeln!(out, "# quit")?;
                return Ok(());
            };

            match self.step(session, Command::from_char(c), out)? {
                Transition::Stay => {}
                Transition::Moved => self.show(session, out)?,
                Transition::Quit => return Ok(()),
            }
        }
    }
}

/// Split a sentence around its only occurrence of `substring`.
fn split_context<'a>(sentence: &'a str, substring: &str) -> Option<(&'a str, &'a str)> {
    if substring.is_empty() || sentence.matches(substring).count() != 1 {
        return None;
    }
    sentence.split_once(substring)
}

/// Annotate the matches of `pattern` for `label` interactively.
pub fn annotate(
    session: &mut Session,
    pattern: &str,
    label: &str,
    unknown_only: bool,
    input: &mut dyn CommandSource,
    out: &mut dyn Write,
) -> crate::Result<AnnotationLoop> {
    let mut state = AnnotationLoop::start(session, pattern, label, unknown_only)?;
    state.run(session, input, out)?;
    Ok(state)
}

/// Continue annotating the matches of a named pattern.
pub fn reannotate(
    session: &mut Session,
    name: &str,
    unknown_only: bool,
    input: &mut dyn CommandSource,
    out: &mut dyn Write,
) -> crate::Result<AnnotationLoop> {
    let entry = session.patterns().get(name)?.clone();
    annotate(session, &entry.pattern, &entry.label, unknown_only, input, out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_map_from_keys() {
        assert_eq!(Command::from_char('t'), Command::SetTrue);
        assert_eq!(Command::from_char('r'), Command::FullTree);
        assert_eq!(Command::from_char('x'), Command::Unrecognized('x'));
    }

    #[test]
    fn line_commands_skip_blank_lines() {
        let mut source = LineCommands::new("\n  \n t\nnext\n".as_bytes());
        assert_eq!(source.read_command().unwrap(), Some('t'));
        assert_eq!(source.read_command().unwrap(), Some('n'));
        assert_eq!(source.read_command().unwrap(), None);
    }

    #[test]
    fn context_requires_unique_substring() {
        assert_eq!(
            split_context("the rise in prices", "rise"),
            Some(("the ", " in prices"))
        );
        assert_eq!(split_context("a b a", "a"), None);
        assert_eq!(split_context("a b", "c"), None);
        assert_eq!(split_context("a b", ""), None);
    }
}
