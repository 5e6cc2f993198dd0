//! Pattern filtering over a line source.

use crate::error::Result;
use crate::scan::{Finish, LineSource};
use regex::Regex;

/// An owned line together with the spans a pattern captured from it.
#[derive(Debug, Clone)]
pub struct Captures {
    line: String,
    groups: Vec<Option<(usize, usize)>>,
}

impl Captures {
    /// Match `pattern` against `line`, keeping the line on success.
    pub fn from_line(pattern: &Regex, line: String) -> Option<Self> {
        let groups = pattern
            .captures(&line)?
            .iter()
            .map(|group| group.map(|m| (m.start(), m.end())))
            .collect();
        Some(Self { line, groups })
    }

    /// Text of group `i`: 0 is the whole match, 1.. are capture groups.
    ///
    /// Groups that did not participate, or that the pattern does not have,
    /// read as the empty string.
    pub fn get(&self, i: usize) -> &str {
        match self.groups.get(i) {
            Some(Some((start, end))) => &self.line[*start..*end],
            _ => "",
        }
    }

    /// The raw line the match was found in.
    pub fn line(&self) -> &str {
        &self.line
    }
}

/// Lines of a source that match a pattern.
pub struct Matches<'p, S> {
    source: S,
    pattern: &'p Regex,
}

impl<'p, S: LineSource> Matches<'p, S> {
    pub fn new(source: S, pattern: &'p Regex) -> Self {
        Self { source, pattern }
    }
}

impl<S: LineSource> Iterator for Matches<'_, S> {
    type Item = Result<Captures>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.source.next()? {
                Ok(line) => {
                    if let Some(captures) = Captures::from_line(self.pattern, line) {
                        return Some(Ok(captures));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl<S: LineSource> Finish for Matches<'_, S> {
    fn finish(self) -> Result<()> {
        self.source.finish()
    }
}

/// Adapter methods for building scan pipelines.
pub trait LineSourceExt: LineSource + Sized {
    /// Keep only lines matching `pattern`.
    fn matching(self, pattern: &Regex) -> Matches<'_, Self> {
        Matches::new(self, pattern)
    }
}

impl<S: LineSource> LineSourceExt for S {}
