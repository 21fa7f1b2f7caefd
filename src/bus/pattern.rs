//! Event-name patterns.
//!
//! Subscriptions and transient filters are written in the Lua pattern dialect
//! used by in-game scripts, and compiled to a [`regex::Regex`]:
//!
//! | Lua            | Meaning                        | Regex            |
//! |----------------|--------------------------------|------------------|
//! | `.`            | any character                  | `(?s:.)`         |
//! | `%a %d %l %u %s %w %x %p %c %g` | ASCII classes | `[[:alpha:]]` …  |
//! | `%A` …         | complemented class             | `[[:^alpha:]]` … |
//! | `%.` `%%` …    | escaped literal                | `\.` `%` …       |
//! | `[set]` `[^set]` | character set                | `[...]`          |
//! | `*` `+` `?`    | greedy repetition              | same             |
//! | `-`            | lazy zero-or-more              | `*?`             |
//! | `^` / `$`      | anchors (first / last only)    | same             |
//!
//! Unanchored patterns match anywhere in the name, so `storage` matches
//! `storage.changed`. Balanced (`%b`), frontier (`%f`) and back-reference
//! (`%1`) items have no regex equivalent and are rejected.

use std::fmt;

use regex::Regex;

use crate::core::error::BusError;

/// A compiled event-name pattern.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Pattern {
    /// Compile a Lua-style pattern.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidPattern`] for malformed or unsupported
    /// patterns.
    pub fn compile(source: &str) -> Result<Self, BusError> {
        let invalid = |reason: String| BusError::InvalidPattern {
            pattern: source.to_string(),
            reason,
        };
        let translated = translate(source).map_err(invalid)?;
        let regex = Regex::new(&translated).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    /// Whether `name` matches this pattern.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// The pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

fn class_name(c: char) -> Option<&'static str> {
    match c.to_ascii_lowercase() {
        'a' => Some("alpha"),
        'd' => Some("digit"),
        'l' => Some("lower"),
        'u' => Some("upper"),
        's' => Some("space"),
        'w' => Some("alnum"),
        'x' => Some("xdigit"),
        'p' => Some("punct"),
        'c' => Some("cntrl"),
        'g' => Some("graph"),
        _ => None,
    }
}

/// `%x` inside a bracket set: `[:alpha:]` or `[:^alpha:]`, else an escaped literal.
fn set_class(c: char) -> String {
    match class_name(c) {
        Some(name) if c.is_ascii_uppercase() => format!("[:^{name}:]"),
        Some(name) => format!("[:{name}:]"),
        None => regex::escape(&c.to_string()),
    }
}

fn translate(source: &str) -> Result<String, String> {
    let chars: Vec<char> = source.chars().collect();
    let n = chars.len();
    let mut out = String::with_capacity(source.len() * 2);
    let mut i = 0;

    if chars.first() == Some(&'^') {
        out.push('^');
        i = 1;
    }

    while i < n {
        match chars[i] {
            '(' | ')' => {
                out.push(chars[i]);
                i += 1;
                continue;
            }
            '$' if i == n - 1 => {
                out.push('$');
                i += 1;
                continue;
            }
            _ => {}
        }

        let (atom, next) = single_class(&chars, i)?;
        out.push_str(&atom);
        i = next;

        if let Some(&q) = chars.get(i) {
            let quantifier = match q {
                '*' => Some("*"),
                '+' => Some("+"),
                '?' => Some("?"),
                '-' => Some("*?"),
                _ => None,
            };
            if let Some(q) = quantifier {
                out.push_str(q);
                i += 1;
            }
        }
    }

    Ok(out)
}

/// Translate one single-character class starting at `i`; returns the regex
/// atom and the index just past it.
fn single_class(chars: &[char], i: usize) -> Result<(String, usize), String> {
    match chars[i] {
        '%' => {
            let Some(&c) = chars.get(i + 1) else {
                return Err("pattern ends with '%'".into());
            };
            match c {
                'b' => Err("balanced match %b is not supported".into()),
                'f' => Err("frontier pattern %f is not supported".into()),
                '0'..='9' => Err(format!("back-reference %{c} is not supported")),
                _ => {
                    let atom = match class_name(c) {
                        Some(_) => format!("[{}]", set_class(c)),
                        None => regex::escape(&c.to_string()),
                    };
                    Ok((atom, i + 2))
                }
            }
        }
        '.' => Ok(("(?s:.)".into(), i + 1)),
        '[' => bracket_set(chars, i),
        c => Ok((regex::escape(&c.to_string()), i + 1)),
    }
}

fn bracket_set(chars: &[char], start: usize) -> Result<(String, usize), String> {
    let mut out = String::from("[");
    let mut i = start + 1;
    if chars.get(i) == Some(&'^') {
        out.push('^');
        i += 1;
    }

    let mut first = true;
    loop {
        let Some(&c) = chars.get(i) else {
            return Err("missing ']' in character set".into());
        };
        // A ']' right after the opening bracket is a literal member.
        if c == ']' && !first {
            out.push(']');
            return Ok((out, i + 1));
        }
        first = false;

        if c == '%' {
            let Some(&esc) = chars.get(i + 1) else {
                return Err("pattern ends with '%'".into());
            };
            out.push_str(&set_class(esc));
            i += 2;
        } else if chars.get(i + 1) == Some(&'-') && chars.get(i + 2).is_some_and(|&e| e != ']') {
            let end = chars[i + 2];
            if end < c {
                return Err(format!("invalid range {c}-{end}"));
            }
            out.push_str(&regex::escape(&c.to_string()));
            out.push('-');
            out.push_str(&regex::escape(&end.to_string()));
            i += 3;
        } else {
            out.push_str(&regex::escape(&c.to_string()));
            i += 1;
        }
    }
}
