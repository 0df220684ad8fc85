//! Shell pattern matching.
//!
//! Implements the wildcard language used by `case`, `[[ == ]]`, pathname
//! expansion, and the `${v#pat}`-family parameter modifiers:
//! - `*` matches any run of characters (not `/` — the walker splits on it)
//! - `?` matches exactly one character
//! - `[abc]`, `[a-z]` character sets and ranges
//! - `[!abc]` or `[^abc]` negated sets
//! - `[[:digit:]]` POSIX classes
//! - `\x` escapes the next character
//!
//! Bracket edge rules: a `]` right after the opening `[` (or `[!`) is a
//! literal member; a `-` first or last in the set is literal; a bracket
//! that is never closed matches a literal `[`.

/// Maximum number of recursive calls for one match attempt. Protects
/// against adversarial patterns like `*a*a*a*...*a` that cause O(n^k)
/// backtracking. Counted as total work, not stack depth.
const MAX_MATCH_CALLS: usize = 100_000;

/// Check if a string contains unescaped glob metacharacters (`*`, `?`, `[`).
///
/// Builtins and the expansion engine use this to decide whether a field
/// needs pathname expansion at all.
///
/// ```
/// use marsh_glob::has_meta;
/// assert!(has_meta("*.rs"));
/// assert!(has_meta("src/[ab]?.txt"));
/// assert!(!has_meta("src/main.rs"));
/// assert!(!has_meta("not\\*meta"));
/// ```
pub fn has_meta(s: &str) -> bool {
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '*' | '?' | '[' => return true,
            _ => {}
        }
    }
    false
}

/// Backslash-escape every glob metacharacter in `s` so the result matches
/// `s` literally. Used when a quoted expansion lands in pattern position.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// One POSIX character class inside `[...]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PosixClass {
    Alnum,
    Alpha,
    Ascii,
    Blank,
    Cntrl,
    Digit,
    Graph,
    Lower,
    Print,
    Punct,
    Space,
    Upper,
    Word,
    Xdigit,
}

impl PosixClass {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "alnum" => Self::Alnum,
            "alpha" => Self::Alpha,
            "ascii" => Self::Ascii,
            "blank" => Self::Blank,
            "cntrl" => Self::Cntrl,
            "digit" => Self::Digit,
            "graph" => Self::Graph,
            "lower" => Self::Lower,
            "print" => Self::Print,
            "punct" => Self::Punct,
            "space" => Self::Space,
            "upper" => Self::Upper,
            "word" => Self::Word,
            "xdigit" => Self::Xdigit,
            _ => return None,
        })
    }

    fn contains(self, c: char) -> bool {
        match self {
            Self::Alnum => c.is_alphanumeric(),
            Self::Alpha => c.is_alphabetic(),
            Self::Ascii => c.is_ascii(),
            Self::Blank => c == ' ' || c == '\t',
            Self::Cntrl => c.is_control(),
            Self::Digit => c.is_ascii_digit(),
            Self::Graph => !c.is_whitespace() && !c.is_control(),
            Self::Lower => c.is_lowercase(),
            Self::Print => !c.is_control(),
            Self::Punct => c.is_ascii_punctuation(),
            Self::Space => c.is_whitespace(),
            Self::Upper => c.is_uppercase(),
            Self::Word => c.is_alphanumeric() || c == '_',
            Self::Xdigit => c.is_ascii_hexdigit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ClassItem {
    Ch(char),
    Range(char, char),
    Posix(PosixClass),
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Lit(char),
    AnyRun,
    AnyOne,
    Class { negated: bool, items: Vec<ClassItem> },
}

/// A compiled shell pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    toks: Vec<Tok>,
    casefold: bool,
}

impl Pattern {
    /// Compile a pattern with default (case-sensitive) matching.
    pub fn new(pattern: &str) -> Self {
        Self::compile(pattern, false)
    }

    /// Compile a pattern that matches case-insensitively
    /// (`nocaseglob` / `nocasematch`).
    pub fn case_insensitive(pattern: &str) -> Self {
        Self::compile(pattern, true)
    }

    fn compile(pattern: &str, casefold: bool) -> Self {
        let chars: Vec<char> = pattern.chars().collect();
        let mut toks = Vec::with_capacity(chars.len());
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '*' => {
                    // Collapse consecutive stars
                    if toks.last() != Some(&Tok::AnyRun) {
                        toks.push(Tok::AnyRun);
                    }
                    i += 1;
                }
                '?' => {
                    toks.push(Tok::AnyOne);
                    i += 1;
                }
                '\\' if i + 1 < chars.len() => {
                    toks.push(Tok::Lit(chars[i + 1]));
                    i += 2;
                }
                '[' => match parse_class(&chars, i) {
                    Some((tok, next)) => {
                        toks.push(tok);
                        i = next;
                    }
                    None => {
                        // Never closed: literal bracket
                        toks.push(Tok::Lit('['));
                        i += 1;
                    }
                },
                c => {
                    toks.push(Tok::Lit(c));
                    i += 1;
                }
            }
        }
        Self { toks, casefold }
    }

    /// True when the pattern contains no wildcards at all.
    pub fn is_literal(&self) -> bool {
        self.toks.iter().all(|t| matches!(t, Tok::Lit(_)))
    }

    /// The literal text, when [`is_literal`](Self::is_literal) holds.
    pub fn literal_text(&self) -> Option<String> {
        let mut out = String::new();
        for t in &self.toks {
            match t {
                Tok::Lit(c) => out.push(*c),
                _ => return None,
            }
        }
        Some(out)
    }

    /// Match the entire input string.
    pub fn matches(&self, input: &str) -> bool {
        let input: Vec<char> = input.chars().collect();
        self.match_range(&input, 0, input.len())
    }

    /// Length in chars of the shortest or longest matching prefix.
    ///
    /// Returns `None` when no prefix (not even the empty one, if the
    /// pattern cannot match empty) matches.
    pub fn prefix_len(&self, input: &str, longest: bool) -> Option<usize> {
        let chars: Vec<char> = input.chars().collect();
        let range: Vec<usize> = (0..=chars.len()).collect();
        let iter: Box<dyn Iterator<Item = &usize>> = if longest {
            Box::new(range.iter().rev())
        } else {
            Box::new(range.iter())
        };
        for &end in iter {
            if self.match_range(&chars, 0, end) {
                return Some(end);
            }
        }
        None
    }

    /// Char index where the shortest or longest matching suffix begins.
    pub fn suffix_start(&self, input: &str, longest: bool) -> Option<usize> {
        let chars: Vec<char> = input.chars().collect();
        let range: Vec<usize> = (0..=chars.len()).collect();
        // Shortest suffix = latest start; longest suffix = earliest start.
        let iter: Box<dyn Iterator<Item = &usize>> = if longest {
            Box::new(range.iter())
        } else {
            Box::new(range.iter().rev())
        };
        for &start in iter {
            if self.match_range(&chars, start, chars.len()) {
                return Some(start);
            }
        }
        None
    }

    /// Find the first match at or after char index `from`.
    ///
    /// Scans start positions left to right and takes the longest match at
    /// the first position that matches at all, which is how `${v/pat/rep}`
    /// selects its span. Returns `(start, end)` in chars.
    pub fn find(&self, input: &str, from: usize) -> Option<(usize, usize)> {
        let chars: Vec<char> = input.chars().collect();
        for start in from..=chars.len() {
            for end in (start..=chars.len()).rev() {
                if self.match_range(&chars, start, end) {
                    return Some((start, end));
                }
            }
        }
        None
    }

    fn match_range(&self, input: &[char], start: usize, end: usize) -> bool {
        let calls = std::cell::Cell::new(0usize);
        self.match_at(0, &input[start..end], 0, &calls)
    }

    fn match_at(
        &self,
        pi: usize,
        input: &[char],
        ii: usize,
        calls: &std::cell::Cell<usize>,
    ) -> bool {
        let count = calls.get() + 1;
        calls.set(count);
        if count > MAX_MATCH_CALLS {
            return false;
        }

        if pi >= self.toks.len() {
            return ii >= input.len();
        }

        match &self.toks[pi] {
            Tok::AnyRun => {
                // Star at the end matches everything remaining.
                if pi + 1 >= self.toks.len() {
                    return true;
                }
                for skip in 0..=(input.len() - ii) {
                    if self.match_at(pi + 1, input, ii + skip, calls) {
                        return true;
                    }
                }
                false
            }
            Tok::AnyOne => ii < input.len() && self.match_at(pi + 1, input, ii + 1, calls),
            Tok::Class { negated, items } => {
                if ii >= input.len() {
                    return false;
                }
                let hit = class_contains(items, input[ii], self.casefold);
                if hit != *negated {
                    self.match_at(pi + 1, input, ii + 1, calls)
                } else {
                    false
                }
            }
            Tok::Lit(c) => {
                if ii >= input.len() {
                    return false;
                }
                if chars_eq(*c, input[ii], self.casefold) {
                    self.match_at(pi + 1, input, ii + 1, calls)
                } else {
                    false
                }
            }
        }
    }
}

fn chars_eq(a: char, b: char, casefold: bool) -> bool {
    if a == b {
        return true;
    }
    casefold && a.to_lowercase().next() == b.to_lowercase().next()
}

fn class_contains(items: &[ClassItem], c: char, casefold: bool) -> bool {
    for item in items {
        let hit = match item {
            ClassItem::Ch(m) => chars_eq(*m, c, casefold),
            ClassItem::Range(lo, hi) => {
                if *lo <= c && c <= *hi {
                    true
                } else if casefold {
                    let folded = c.to_lowercase().next().unwrap_or(c);
                    let up = c.to_uppercase().next().unwrap_or(c);
                    (*lo <= folded && folded <= *hi) || (*lo <= up && up <= *hi)
                } else {
                    false
                }
            }
            ClassItem::Posix(class) => class.contains(c),
        };
        if hit {
            return true;
        }
    }
    false
}

/// Parse a bracket expression starting at `chars[open]` (which is `[`).
///
/// Returns the token and the index one past the closing `]`, or `None`
/// when the bracket is never closed.
fn parse_class(chars: &[char], open: usize) -> Option<(Tok, usize)> {
    let mut i = open + 1;
    let negated = matches!(chars.get(i), Some('!') | Some('^'));
    if negated {
        i += 1;
    }

    let mut items = Vec::new();
    let mut first = true;
    loop {
        let c = *chars.get(i)?;
        if c == ']' && !first {
            return Some((Tok::Class { negated, items }, i + 1));
        }
        first = false;

        // POSIX class: [:name:]
        if c == '[' && chars.get(i + 1) == Some(&':') {
            if let Some(close) = find_posix_close(chars, i + 2) {
                let name: String = chars[i + 2..close].iter().collect();
                if let Some(class) = PosixClass::from_name(&name) {
                    items.push(ClassItem::Posix(class));
                    i = close + 2; // skip ":]"
                    continue;
                }
            }
        }

        // Range a-z, unless the dash is the last member.
        if chars.get(i + 1) == Some(&'-') && chars.get(i + 2).is_some_and(|&n| n != ']') {
            let hi = *chars.get(i + 2)?;
            items.push(ClassItem::Range(c, hi));
            i += 3;
        } else {
            items.push(ClassItem::Ch(c));
            i += 1;
        }
    }
}

/// Find the index of `:` in the closing `:]` of a POSIX class.
fn find_posix_close(chars: &[char], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 1 < chars.len() {
        if chars[i] == ':' && chars[i + 1] == ']' {
            return Some(i);
        }
        if chars[i] == ']' {
            return None;
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(pat: &str, input: &str) -> bool {
        Pattern::new(pat).matches(input)
    }

    #[test]
    fn literal_match() {
        assert!(m("hello", "hello"));
        assert!(!m("hello", "hell"));
        assert!(!m("hello", "helloo"));
    }

    #[test]
    fn star_matches_runs() {
        assert!(m("*", ""));
        assert!(m("*", "anything"));
        assert!(m("*.rs", "main.rs"));
        assert!(m("a*b*c", "aXbYc"));
        assert!(!m("*.rs", "main.go"));
    }

    #[test]
    fn question_matches_one() {
        assert!(m("h?llo", "hello"));
        assert!(!m("h?llo", "hllo"));
        assert!(!m("?", ""));
    }

    #[test]
    fn class_basics() {
        assert!(m("[abc]", "b"));
        assert!(!m("[abc]", "d"));
        assert!(m("[a-z]", "q"));
        assert!(!m("[a-z]", "Q"));
        assert!(m("[!abc]", "d"));
        assert!(m("[^abc]", "d"));
        assert!(!m("[!abc]", "a"));
    }

    #[test]
    fn class_edge_rules() {
        // Leading ] is a literal member
        assert!(m("[]]", "]"));
        assert!(m("[]a]", "a"));
        // Leading or trailing - is literal
        assert!(m("[-a]", "-"));
        assert!(m("[a-]", "-"));
        // Unclosed bracket is a literal [
        assert!(m("a[b", "a[b"));
        assert!(!m("a[b", "ab"));
    }

    #[test]
    fn posix_classes() {
        assert!(m("[[:digit:]]", "7"));
        assert!(!m("[[:digit:]]", "x"));
        assert!(m("[[:alpha:]]*", "word"));
        assert!(m("[[:space:]]", "\t"));
        assert!(m("[![:digit:]]", "x"));
    }

    #[test]
    fn escapes_are_literal() {
        assert!(m("\\*", "*"));
        assert!(!m("\\*", "x"));
        assert!(m("a\\?c", "a?c"));
    }

    #[test]
    fn unicode_input() {
        assert!(m("?", "é"));
        assert!(m("[à-ö]", "é"));
        assert!(m("*ñ", "añ"));
    }

    #[test]
    fn case_insensitive_mode() {
        let p = Pattern::case_insensitive("*.RS");
        assert!(p.matches("main.rs"));
        let p = Pattern::case_insensitive("[a-z]");
        assert!(p.matches("Q"));
    }

    #[test]
    fn prefix_len_shortest_and_longest() {
        let p = Pattern::new("a*");
        assert_eq!(p.prefix_len("abcabc", false), Some(1));
        assert_eq!(p.prefix_len("abcabc", true), Some(6));
        let p = Pattern::new("x");
        assert_eq!(p.prefix_len("abc", false), None);
    }

    #[test]
    fn suffix_start_shortest_and_longest() {
        let p = Pattern::new("*c");
        assert_eq!(p.suffix_start("abcabc", false), Some(5));
        assert_eq!(p.suffix_start("abcabc", true), Some(0));
    }

    #[test]
    fn find_earliest_longest() {
        let p = Pattern::new("b*c");
        assert_eq!(p.find("abcabc", 0), Some((1, 6)));
        assert_eq!(p.find("abcabc", 2), Some((4, 6)));
        assert_eq!(p.find("xyz", 0), None);
    }

    #[test]
    fn find_empty_pattern_matches_everywhere() {
        let p = Pattern::new("");
        assert_eq!(p.find("ab", 0), Some((0, 0)));
    }

    #[test]
    fn literal_helpers() {
        assert!(Pattern::new("plain").is_literal());
        assert_eq!(Pattern::new("pl\\*ain").literal_text().as_deref(), Some("pl*ain"));
        assert!(!Pattern::new("a*").is_literal());
    }

    #[test]
    fn has_meta_respects_escapes() {
        assert!(has_meta("a*"));
        assert!(!has_meta("a\\*"));
        assert!(has_meta("[x]"));
    }

    #[test]
    fn escape_round_trip() {
        let raw = "we[i]rd*name?";
        assert!(Pattern::new(&escape(raw)).matches(raw));
        assert!(!has_meta(&escape(raw)));
    }

    #[test]
    fn pathological_pattern_is_bounded() {
        let pat = "*a".repeat(30) + "b";
        let input = "a".repeat(100);
        // Must terminate quickly and report no match.
        assert!(!Pattern::new(&pat).matches(&input));
    }
}
