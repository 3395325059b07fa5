//! Subset filtering
//!
//! Turns the user's filter tokens into the concrete set of subsets to
//! collect. Tokens are shell-style wildcards; a leading `!` marks an
//! exclusion. Once any include pattern is present, exclusions are ignored.

use std::collections::BTreeSet;

use regex::Regex;
use tracing::{debug, trace};

use crate::catalog::Subset;
use crate::error::InfoError;

/// Marker that turns a token into an exclusion
const NEGATION: char = '!';

/// A compiled shell-style wildcard (`*`, `?`, `[...]`, `[!...]`)
#[derive(Debug, Clone)]
pub struct WildcardPattern {
    source: String,
    /// `None` for a pattern that can never match
    regex: Option<Regex>,
}

impl WildcardPattern {
    pub fn new(pattern: &str) -> Result<Self, InfoError> {
        let translated = translate(pattern);
        trace!(pattern = ?pattern, regex = ?translated, "Compiled wildcard");

        let regex = translated
            .map(|translated| {
                Regex::new(&translated).map_err(|e| InfoError::Filter {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Case-sensitive match against the whole name
    pub fn matches(&self, name: &str) -> bool {
        self.regex.as_ref().is_some_and(|regex| regex.is_match(name))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// A single filter token, classified
#[derive(Debug, Clone)]
pub enum FilterPattern {
    Include(WildcardPattern),
    Exclude(WildcardPattern),
}

impl FilterPattern {
    pub fn parse(token: &str) -> Result<Self, InfoError> {
        if token.starts_with(NEGATION) {
            let stripped = token.trim_start_matches(NEGATION);
            Ok(FilterPattern::Exclude(WildcardPattern::new(stripped)?))
        } else {
            Ok(FilterPattern::Include(WildcardPattern::new(token)?))
        }
    }
}

/// Include/exclude patterns for one run
#[derive(Debug, Clone, Default)]
pub struct SubsetFilter {
    includes: Vec<WildcardPattern>,
    excludes: Vec<WildcardPattern>,
}

impl SubsetFilter {
    /// Build a filter from individual tokens. Blank tokens are skipped.
    pub fn parse<I, S>(tokens: I) -> Result<Self, InfoError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = SubsetFilter::default();

        for token in tokens {
            let token = token.as_ref().trim();
            if token.is_empty() {
                continue;
            }

            match FilterPattern::parse(token)? {
                FilterPattern::Include(p) => filter.includes.push(p),
                FilterPattern::Exclude(p) => filter.excludes.push(p),
            }
        }

        debug!(
            includes = ?filter.includes.iter().map(WildcardPattern::as_str).collect::<Vec<_>>(),
            excludes = ?filter.excludes.iter().map(WildcardPattern::as_str).collect::<Vec<_>>(),
            "Parsed subset filter"
        );

        Ok(filter)
    }

    /// Build a filter from a comma-separated expression such as `"!settings,ver*"`
    pub fn from_expression(expression: &str) -> Result<Self, InfoError> {
        Self::parse(expression.split(','))
    }

    /// No patterns at all, which selects the whole catalog
    pub fn is_empty(&self) -> bool {
        self.includes.is_empty() && self.excludes.is_empty()
    }

    /// Resolve against a catalog.
    ///
    /// Includes win outright: when any include pattern exists only subsets
    /// matching one of them are returned and every exclude pattern is
    /// discarded. With excludes alone, everything not matched is returned.
    pub fn resolve(&self, catalog: &[Subset]) -> BTreeSet<Subset> {
        if !self.includes.is_empty() {
            if !self.excludes.is_empty() {
                debug!(
                    excludes = ?self.excludes.len(),
                    "Include patterns present, ignoring exclude patterns"
                );
            }
            return catalog
                .iter()
                .copied()
                .filter(|s| self.includes.iter().any(|p| p.matches(s.name())))
                .collect();
        }

        catalog
            .iter()
            .copied()
            .filter(|s| !self.excludes.iter().any(|p| p.matches(s.name())))
            .collect()
    }
}

/// Parse `patterns` and resolve them against `catalog` in one step
pub fn resolve<S: AsRef<str>>(
    patterns: &[S],
    catalog: &[Subset],
) -> Result<BTreeSet<Subset>, InfoError> {
    Ok(SubsetFilter::parse(patterns)?.resolve(catalog))
}

/// Translate a shell wildcard into an anchored regular expression.
///
/// `None` means the pattern can never match (a class with only reversed
/// ranges, such as `[z-a]`).
fn translate(pattern: &str) -> Option<String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        i += 1;

        match c {
            '*' => {
                while i < chars.len() && chars[i] == '*' {
                    i += 1;
                }
                out.push_str(".*");
            }
            '?' => out.push('.'),
            '[' => {
                let mut j = i;
                if j < chars.len() && chars[j] == '!' {
                    j += 1;
                }
                if j < chars.len() && chars[j] == ']' {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }

                if j >= chars.len() {
                    // unterminated class is a literal bracket
                    out.push_str(r"\[");
                } else {
                    out.push_str(&translate_class(&chars[i..j])?);
                    i = j + 1;
                }
            }
            other => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(other.encode_utf8(&mut buf)));
            }
        }
    }

    out.push('$');
    Some(out)
}

/// Translate the body of a `[...]` class. Reversed ranges are dropped;
/// `None` when nothing is left to match.
fn translate_class(body: &[char]) -> Option<String> {
    let (negated, body) = match body.split_first() {
        Some(('!', rest)) => (true, rest),
        _ => (false, body),
    };

    let mut items = String::new();
    let mut k = 0;
    while k < body.len() {
        if k + 2 < body.len() && body[k + 1] == '-' {
            let (start, end) = (body[k], body[k + 2]);
            k += 3;
            if start > end {
                trace!(start = ?start, end = ?end, "Dropping reversed range");
                continue;
            }
            push_class_char(&mut items, start);
            items.push('-');
            push_class_char(&mut items, end);
        } else {
            push_class_char(&mut items, body[k]);
            k += 1;
        }
    }

    match (items.is_empty(), negated) {
        (true, true) => Some(".".to_string()),
        (true, false) => None,
        (false, true) => Some(format!("[^{}]", items)),
        (false, false) => Some(format!("[{}]", items)),
    }
}

fn push_class_char(out: &mut String, c: char) {
    // regex class syntax treats these specially, fnmatch does not
    if matches!(c, '\\' | '[' | ']' | '&' | '~' | '^' | '-') {
        out.push('\\');
    }
    out.push(c);
}
