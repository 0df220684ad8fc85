//! Brace expansion: `a{b,c}d`, `{1..5}`, `{a..f}`, `{0..10..2}`.
//!
//! Runs before every other expansion stage, on the unexpanded word.
//! Alternatives may contain further word parts (`{x,$v}`), so the scan
//! works over part sequences, not plain strings. Quoted parts never
//! participate.

use crate::ast::{Word, WordPart};

/// Expand all brace groups in a word. Words without any group come back
/// as a single-element vector, unchanged.
pub fn expand_braces(word: &Word) -> Vec<Word> {
    match find_group(word) {
        Some(group) => {
            let mut out = Vec::new();
            for alt in group.alternatives {
                let mut parts = group.prefix.clone();
                parts.extend(alt);
                parts.extend(group.suffix.clone());
                let rebuilt = Word { parts: merge_lits(parts) };
                // Alternatives may themselves contain groups.
                out.extend(expand_braces(&rebuilt));
            }
            out
        }
        None => vec![word.clone()],
    }
}

struct Group {
    prefix: Vec<WordPart>,
    alternatives: Vec<Vec<WordPart>>,
    suffix: Vec<WordPart>,
}

/// Position within a word's parts: part index plus char index for `Lit`s.
#[derive(Clone, Copy, PartialEq, Eq)]
struct Pos {
    part: usize,
    ch: usize,
}

/// Locate the first expandable top-level `{...}` group.
fn find_group(word: &Word) -> Option<Group> {
    let parts = &word.parts;
    let mut open: Option<Pos> = None;
    let mut depth = 0i32;
    let mut commas: Vec<Pos> = Vec::new();

    for (pi, part) in parts.iter().enumerate() {
        let text = match part {
            WordPart::Lit(s) => s,
            _ => continue,
        };
        let chars: Vec<char> = text.chars().collect();
        let mut ci = 0;
        while ci < chars.len() {
            match chars[ci] {
                '\\' => ci += 1,
                '{' => {
                    if depth == 0 {
                        open = Some(Pos { part: pi, ch: ci });
                        commas.clear();
                    }
                    depth += 1;
                }
                ',' if depth == 1 => {
                    commas.push(Pos { part: pi, ch: ci });
                }
                '}' if depth > 0 => {
                    depth -= 1;
                    if depth == 0 {
                        let start = open.take().expect("matched open brace");
                        let close = Pos { part: pi, ch: ci };
                        if let Some(group) = build_group(parts, start, &commas, close) {
                            return Some(group);
                        }
                        // `{}` or `{single}` with no comma and no range:
                        // keep scanning for a later group.
                        commas.clear();
                    }
                }
                _ => {}
            }
            ci += 1;
        }
    }
    None
}

fn build_group(parts: &[WordPart], open: Pos, commas: &[Pos], close: Pos) -> Option<Group> {
    if commas.is_empty() {
        return build_range_group(parts, open, close);
    }

    let prefix = slice_parts(parts, Pos { part: 0, ch: 0 }, open);
    let suffix = slice_parts(
        parts,
        advance(parts, close),
        Pos { part: parts.len(), ch: 0 },
    );

    let mut alternatives = Vec::new();
    let mut from = advance(parts, open);
    for comma in commas {
        alternatives.push(slice_parts(parts, from, *comma));
        from = advance(parts, *comma);
    }
    alternatives.push(slice_parts(parts, from, close));

    Some(Group { prefix, alternatives, suffix })
}

/// `{1..5}`, `{a..f}`, `{1..10..2}` with optional zero padding.
fn build_range_group(parts: &[WordPart], open: Pos, close: Pos) -> Option<Group> {
    // Ranges live entirely inside one literal part.
    if open.part != close.part {
        return None;
    }
    let text = match &parts[open.part] {
        WordPart::Lit(s) => s,
        _ => return None,
    };
    let chars: Vec<char> = text.chars().collect();
    let body: String = chars[open.ch + 1..close.ch].iter().collect();

    let pieces: Vec<&str> = body.split("..").collect();
    if pieces.len() != 2 && pieces.len() != 3 {
        return None;
    }
    let step: i64 = match pieces.get(2) {
        Some(s) => s.parse().ok()?,
        None => 1,
    };
    let step = if step == 0 { 1 } else { step.abs() };

    let items: Vec<String> = if let (Ok(lo), Ok(hi)) =
        (pieces[0].parse::<i64>(), pieces[1].parse::<i64>())
    {
        let width = [pieces[0], pieces[1]]
            .iter()
            .filter(|p| p.trim_start_matches('-').len() > 1 && {
                let t = p.trim_start_matches('-');
                t.starts_with('0')
            })
            .map(|p| p.trim_start_matches('-').len())
            .max()
            .unwrap_or(0);
        let mut items = Vec::new();
        let mut n = lo;
        let ascending = lo <= hi;
        loop {
            if ascending && n > hi || !ascending && n < hi {
                break;
            }
            if width > 0 {
                let sign = if n < 0 { "-" } else { "" };
                items.push(format!("{}{:0>width$}", sign, n.abs(), width = width));
            } else {
                items.push(n.to_string());
            }
            n = if ascending { n + step } else { n - step };
        }
        items
    } else {
        // Character range: single chars on both sides.
        let lo = single_char(pieces[0])?;
        let hi = single_char(pieces[1])?;
        let (a, b) = (lo as u32, hi as u32);
        let mut items = Vec::new();
        let mut n = a;
        let ascending = a <= b;
        loop {
            if ascending && n > b || !ascending && n < b {
                break;
            }
            if let Some(c) = char::from_u32(n) {
                items.push(c.to_string());
            }
            let s = step as u32;
            n = if ascending { n.wrapping_add(s) } else { n.wrapping_sub(s) };
            if !ascending && n > a {
                break; // wrapped past zero
            }
        }
        items
    };

    let prefix = slice_parts(parts, Pos { part: 0, ch: 0 }, open);
    let suffix = slice_parts(
        parts,
        advance(parts, close),
        Pos { part: parts.len(), ch: 0 },
    );
    let alternatives = items
        .into_iter()
        .map(|s| vec![WordPart::Lit(s)])
        .collect();
    Some(Group { prefix, alternatives, suffix })
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    let c = chars.next()?;
    chars.next().is_none().then_some(c)
}

/// Position one char past `pos` (which indexes into a Lit part).
fn advance(parts: &[WordPart], pos: Pos) -> Pos {
    if let WordPart::Lit(s) = &parts[pos.part] {
        let len = s.chars().count();
        if pos.ch + 1 < len {
            return Pos { part: pos.part, ch: pos.ch + 1 };
        }
    }
    Pos { part: pos.part + 1, ch: 0 }
}

/// Copy the parts between two positions, slicing literals at char level.
fn slice_parts(parts: &[WordPart], from: Pos, to: Pos) -> Vec<WordPart> {
    let mut out = Vec::new();
    for (pi, part) in parts.iter().enumerate() {
        if pi < from.part || pi > to.part {
            continue;
        }
        if pi >= to.part && to.ch == 0 && pi == to.part {
            // `to` points at the start of this part: nothing to take.
            if !(pi == from.part && from.ch > 0) {
                break;
            }
        }
        match part {
            WordPart::Lit(s) => {
                let chars: Vec<char> = s.chars().collect();
                let start = if pi == from.part { from.ch } else { 0 };
                let end = if pi == to.part { to.ch } else { chars.len() };
                if start < end {
                    out.push(WordPart::Lit(chars[start..end].iter().collect()));
                }
            }
            other => {
                if pi == to.part {
                    break;
                }
                out.push(other.clone());
            }
        }
        if pi == to.part {
            break;
        }
    }
    out
}

/// Join adjacent literal parts left over from slicing.
fn merge_lits(parts: Vec<WordPart>) -> Vec<WordPart> {
    let mut out: Vec<WordPart> = Vec::with_capacity(parts.len());
    for part in parts {
        match (out.last_mut(), part) {
            (Some(WordPart::Lit(prev)), WordPart::Lit(s)) => prev.push_str(&s),
            (_, part) => out.push(part),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ParamExp;

    fn lits(words: &[Word]) -> Vec<String> {
        words
            .iter()
            .map(|w| {
                w.parts
                    .iter()
                    .map(|p| match p {
                        WordPart::Lit(s) => s.clone(),
                        WordPart::Param(p) => format!("${}", p.name),
                        _ => "<part>".into(),
                    })
                    .collect::<String>()
            })
            .collect()
    }

    fn expand_str(s: &str) -> Vec<String> {
        lits(&expand_braces(&Word::lit(s)))
    }

    #[test]
    fn no_braces_passes_through() {
        assert_eq!(expand_str("plain"), vec!["plain"]);
    }

    #[test]
    fn simple_alternatives() {
        assert_eq!(expand_str("a{b,c}d"), vec!["abd", "acd"]);
        assert_eq!(expand_str("{x,y}"), vec!["x", "y"]);
    }

    #[test]
    fn empty_alternative() {
        assert_eq!(expand_str("a{,b}"), vec!["a", "ab"]);
    }

    #[test]
    fn nested_groups() {
        assert_eq!(expand_str("{a,b{c,d}}"), vec!["a", "bc", "bd"]);
    }

    #[test]
    fn multiple_groups_multiply() {
        assert_eq!(expand_str("{a,b}{1,2}"), vec!["a1", "a2", "b1", "b2"]);
    }

    #[test]
    fn numeric_range() {
        assert_eq!(expand_str("a{1..5}"), vec!["a1", "a2", "a3", "a4", "a5"]);
        assert_eq!(expand_str("{5..1}"), vec!["5", "4", "3", "2", "1"]);
    }

    #[test]
    fn numeric_range_with_step() {
        assert_eq!(expand_str("a{1..10..2}"), vec!["a1", "a3", "a5", "a7", "a9"]);
        assert_eq!(expand_str("{10..1..3}"), vec!["10", "7", "4", "1"]);
    }

    #[test]
    fn zero_padded_range() {
        assert_eq!(expand_str("{01..3}"), vec!["01", "02", "03"]);
    }

    #[test]
    fn char_range() {
        assert_eq!(expand_str("a{c..f}"), vec!["ac", "ad", "ae", "af"]);
        assert_eq!(expand_str("{d..a}"), vec!["d", "c", "b", "a"]);
    }

    #[test]
    fn unmatched_or_plain_braces_are_literal() {
        assert_eq!(expand_str("a{b"), vec!["a{b"]);
        assert_eq!(expand_str("a}b"), vec!["a}b"]);
        assert_eq!(expand_str("{single}"), vec!["{single}"]);
        assert_eq!(expand_str("{}"), vec!["{}"]);
    }

    #[test]
    fn escaped_braces_are_literal() {
        assert_eq!(expand_str("a\\{b,c}d"), vec!["a\\{b,c}d"]);
    }

    #[test]
    fn group_spanning_parts() {
        // "{x,$v}": the alternative containing a parameter survives.
        let word = Word {
            parts: vec![
                WordPart::Lit("{x,".into()),
                WordPart::Param(Box::new(ParamExp::plain("v"))),
                WordPart::Lit("}".into()),
            ],
        };
        let got = lits(&expand_braces(&word));
        assert_eq!(got, vec!["x", "$v"]);
    }

    #[test]
    fn quoted_parts_do_not_expand() {
        let word = Word { parts: vec![WordPart::SglQuoted("{a,b}".into())] };
        assert_eq!(expand_braces(&word).len(), 1);
    }
}
