//! Parameter expansion: `$name`, `${name}`, and every `${name<op>}`
//! modifier, over scalars, arrays, positional and special parameters.

use marsh_glob::Pattern;

use crate::ast::{ParamExp, ParamIndex, ParamOp, Word};
use crate::vars::{SetMode, Value};

use super::{ansi_decode, expand_pattern, expand_single, shell_quote, ExpandError};
use crate::interp::Interp;

/// What a parameter expansion contributes to the word.
#[derive(Debug, Clone)]
pub(crate) enum ParamValue {
    Single(String),
    /// `$@`-style: elements stay separate fields in double quotes.
    Elems(Vec<String>),
}

/// The parameter's value before the modifier is applied.
#[derive(Debug, Clone)]
enum Base {
    Unset,
    Str(String),
    List { items: Vec<String>, star: bool },
}

impl Base {
    fn is_unset(&self) -> bool {
        matches!(self, Base::Unset)
    }

    fn is_null(&self) -> bool {
        match self {
            Base::Unset => true,
            Base::Str(s) => s.is_empty(),
            Base::List { items, .. } => items.iter().all(|i| i.is_empty()),
        }
    }
}

pub(crate) async fn eval_param(
    interp: &mut Interp,
    pe: &ParamExp,
    quoted: bool,
) -> Result<ParamValue, ExpandError> {
    // `${!name}` and `${!prefix*}` replace the whole lookup.
    match &pe.op {
        ParamOp::Indirect => return indirect(interp, pe, quoted).await,
        ParamOp::NamesWithPrefix { star } => {
            let names = interp.env.names_with_prefix(&pe.name);
            return Ok(finish_list(interp, names, *star, quoted));
        }
        _ => {}
    }

    let base = resolve_base(interp, &pe.name, pe.index.as_ref()).await?;

    match &pe.op {
        ParamOp::Plain => {
            nounset_check(interp, &pe.name, &base)?;
            Ok(base_value(interp, base, quoted))
        }
        ParamOp::Length => {
            nounset_check(interp, &pe.name, &base)?;
            let n = match base {
                Base::Unset => 0,
                Base::Str(s) => s.chars().count(),
                Base::List { items, .. } => items.len(),
            };
            Ok(ParamValue::Single(n.to_string()))
        }
        ParamOp::Default { word, colon } => {
            if base.is_unset() || (*colon && base.is_null()) {
                let text = expand_word(interp, word).await?;
                Ok(ParamValue::Single(text))
            } else {
                Ok(base_value(interp, base, quoted))
            }
        }
        ParamOp::AssignDefault { word, colon } => {
            if base.is_unset() || (*colon && base.is_null()) {
                if !is_assignable(&pe.name) {
                    return Err(ExpandError::msg(format!(
                        "{}: cannot assign in this way",
                        pe.name
                    )));
                }
                let text = expand_word(interp, word).await?;
                interp
                    .env
                    .set_scalar(&pe.name, text.clone(), SetMode::Auto)
                    .map_err(|e| ExpandError::msg(e.to_string()))?;
                Ok(ParamValue::Single(text))
            } else {
                Ok(base_value(interp, base, quoted))
            }
        }
        ParamOp::Alternate { word, colon } => {
            if base.is_unset() || (*colon && base.is_null()) {
                Ok(ParamValue::Single(String::new()))
            } else {
                let text = expand_word(interp, word).await?;
                Ok(ParamValue::Single(text))
            }
        }
        ParamOp::ErrorIfUnset { word, colon } => {
            if base.is_unset() || (*colon && base.is_null()) {
                let msg = if word.parts.is_empty() {
                    "parameter null or not set".to_string()
                } else {
                    expand_word(interp, word).await?
                };
                Err(ExpandError::fatal(format!("{}: {}", pe.name, msg)))
            } else {
                Ok(base_value(interp, base, quoted))
            }
        }
        ParamOp::Substring { offset, length } => {
            let off = interp.eval_arith_text(offset)?;
            let len = match length {
                Some(l) => Some(interp.eval_arith_text(l)?),
                None => None,
            };
            substring(interp, &pe.name, base, off, len, quoted)
        }
        ParamOp::Strip { pat, suffix, longest } => {
            let pat_text = expand_pat(interp, pat).await?;
            let pattern = Pattern::new(&pat_text);
            Ok(map_base(interp, base, quoted, |s| strip(&pattern, s, *suffix, *longest)))
        }
        ParamOp::Replace { pat, with, all } => {
            let pat_text = expand_pat(interp, pat).await?;
            let rep = expand_word(interp, with).await?;
            let pattern = Pattern::new(&pat_text);
            Ok(map_base(interp, base, quoted, |s| replace(&pattern, s, &rep, *all)))
        }
        ParamOp::ChangeCase { upper, all, pat } => {
            let pattern = match pat {
                Some(w) => {
                    let text = expand_pat(interp, w).await?;
                    if text.is_empty() {
                        Pattern::new("?")
                    } else {
                        Pattern::new(&text)
                    }
                }
                None => Pattern::new("?"),
            };
            Ok(map_base(interp, base, quoted, |s| change_case(&pattern, s, *upper, *all)))
        }
        ParamOp::Quote => Ok(map_base(interp, base, quoted, |s| shell_quote(s))),
        ParamOp::Unescape => Ok(map_base(interp, base, quoted, |s| ansi_decode(s))),
        ParamOp::Indirect | ParamOp::NamesWithPrefix { .. } => unreachable!("handled above"),
    }
}

/// Expand a modifier's inner word (defaults, replacements, messages).
async fn expand_word(interp: &mut Interp, word: &Word) -> Result<String, ExpandError> {
    Box::pin(expand_single(interp, word)).await
}

async fn expand_pat(interp: &mut Interp, word: &Word) -> Result<String, ExpandError> {
    Box::pin(expand_pattern(interp, word)).await
}

fn is_assignable(name: &str) -> bool {
    !name.is_empty()
        && !name.chars().next().is_some_and(|c| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn nounset_check(interp: &Interp, name: &str, base: &Base) -> Result<(), ExpandError> {
    if !interp.opts.nounset || !base.is_unset() {
        return Ok(());
    }
    // `$@` and `$*` are exempt; everything else aborts the script.
    if name == "@" || name == "*" {
        return Ok(());
    }
    Err(ExpandError::fatal(format!("{}: unbound variable", name)))
}

/// Resolve name plus optional subscript to its raw value.
async fn resolve_base(
    interp: &mut Interp,
    name: &str,
    index: Option<&ParamIndex>,
) -> Result<Base, ExpandError> {
    // Special parameters first.
    match name {
        "@" => {
            return Ok(Base::List { items: interp.env.positional().to_vec(), star: false });
        }
        "*" => {
            return Ok(Base::List { items: interp.env.positional().to_vec(), star: true });
        }
        "#" => return Ok(Base::Str(interp.env.positional().len().to_string())),
        "?" => return Ok(Base::Str(interp.last_status.to_string())),
        "$" => return Ok(Base::Str(interp.pid().to_string())),
        "!" => {
            return Ok(match interp.last_bg_job() {
                Some(id) => Base::Str(id.to_string()),
                None => Base::Unset,
            });
        }
        "0" => return Ok(Base::Str(interp.script_name().to_string())),
        "LINENO" => return Ok(Base::Str(interp.line.to_string())),
        "RANDOM" => return Ok(Base::Str(interp.random_next().to_string())),
        _ => {}
    }
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_digit()) {
        let n: usize = name.parse().map_err(|_| ExpandError::msg("bad substitution"))?;
        return Ok(match position(interp, n) {
            Some(s) => Base::Str(s),
            None => Base::Unset,
        });
    }

    let var = match interp.env.get(name) {
        Some(v) => v.value.clone(),
        None => return Ok(Base::Unset),
    };

    match index {
        None => Ok(scalar_view(&var)),
        Some(ParamIndex::All) => Ok(Base::List { items: var.elements(), star: false }),
        Some(ParamIndex::Star) => Ok(Base::List { items: var.elements(), star: true }),
        Some(ParamIndex::Word(word)) => {
            let sub = Box::pin(expand_single(interp, word)).await?;
            element_at(interp, name, &var, &sub)
        }
    }
}

fn position(interp: &Interp, n: usize) -> Option<String> {
    if n == 0 {
        return Some(interp.script_name().to_string());
    }
    interp.env.positional().get(n - 1).cloned()
}

/// The unsubscripted view of a variable: a scalar's text, element 0 of
/// an array (which may be missing).
fn scalar_view(value: &Value) -> Base {
    match value {
        Value::Scalar(s) => Base::Str(s.clone()),
        Value::Indexed(map) => match map.get(&0) {
            Some(s) => Base::Str(s.clone()),
            None => Base::Unset,
        },
        Value::Assoc(map) => match map.get("0") {
            Some(s) => Base::Str(s.clone()),
            None => Base::Unset,
        },
        Value::NameRef(target) => Base::Str(target.clone()),
    }
}

fn element_at(
    interp: &mut Interp,
    name: &str,
    value: &Value,
    subscript: &str,
) -> Result<Base, ExpandError> {
    match value {
        Value::Assoc(map) => Ok(match map.get(subscript) {
            Some(s) => Base::Str(s.clone()),
            None => Base::Unset,
        }),
        Value::Indexed(map) => {
            let idx = interp.eval_arith_text(subscript)?;
            if idx < 0 {
                return Err(ExpandError::msg(format!("{}: bad array subscript", name)));
            }
            Ok(match map.get(&idx) {
                Some(s) => Base::Str(s.clone()),
                None => Base::Unset,
            })
        }
        Value::Scalar(s) => {
            let idx = interp.eval_arith_text(subscript)?;
            if idx < 0 {
                return Err(ExpandError::msg(format!("{}: bad array subscript", name)));
            }
            Ok(if idx == 0 { Base::Str(s.clone()) } else { Base::Unset })
        }
        Value::NameRef(_) => Ok(Base::Unset),
    }
}

fn first_ifs_char(interp: &Interp) -> String {
    match interp.env.get_str("IFS") {
        Some(ifs) => ifs.chars().next().map(|c| c.to_string()).unwrap_or_default(),
        None => " ".to_string(),
    }
}

fn base_value(interp: &Interp, base: Base, quoted: bool) -> ParamValue {
    match base {
        Base::Unset => ParamValue::Single(String::new()),
        Base::Str(s) => ParamValue::Single(s),
        Base::List { items, star } => finish_list(interp, items, star, quoted),
    }
}

fn finish_list(interp: &Interp, items: Vec<String>, star: bool, quoted: bool) -> ParamValue {
    if star && quoted && !items.is_empty() {
        ParamValue::Single(items.join(&first_ifs_char(interp)))
    } else {
        // Zero positional parameters expand to zero fields even inside
        // double quotes, for `*` as well as `@`.
        ParamValue::Elems(items)
    }
}

/// Apply a per-string transform across the base value.
fn map_base(
    interp: &Interp,
    base: Base,
    quoted: bool,
    f: impl Fn(&str) -> String,
) -> ParamValue {
    match base {
        Base::Unset => ParamValue::Single(f("")),
        Base::Str(s) => ParamValue::Single(f(&s)),
        Base::List { items, star } => {
            let mapped = items.iter().map(|s| f(s)).collect();
            finish_list(interp, mapped, star, quoted)
        }
    }
}

fn substring(
    interp: &Interp,
    name: &str,
    base: Base,
    off: i64,
    len: Option<i64>,
    quoted: bool,
) -> Result<ParamValue, ExpandError> {
    match base {
        Base::Unset => Ok(ParamValue::Single(String::new())),
        Base::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let total = chars.len() as i64;
            let start = if off < 0 { (total + off).max(0) } else { off.min(total) };
            let end = match len {
                None => total,
                Some(l) if l < 0 => {
                    let e = total + l;
                    if e < start {
                        return Err(ExpandError::msg(format!(
                            "{}: substring expression < 0",
                            name
                        )));
                    }
                    e
                }
                Some(l) => (start + l).min(total),
            };
            let out: String = chars[start as usize..end.max(start) as usize].iter().collect();
            Ok(ParamValue::Single(out))
        }
        Base::List { items, star } => {
            // `${@:0}` includes `$0` at offset zero.
            let full: Vec<String> = if name == "@" || name == "*" {
                std::iter::once(interp.script_name().to_string())
                    .chain(items.iter().cloned())
                    .collect()
            } else {
                items
            };
            let total = full.len() as i64;
            let mut start = if off < 0 { (total + off).max(0) } else { off };
            // For positionals, slicing starts at the virtual $0 entry.
            if start > total {
                start = total;
            }
            let end = match len {
                None => total,
                Some(l) if l < 0 => {
                    let e = total + l;
                    if e < start {
                        return Err(ExpandError::msg(format!(
                            "{}: substring expression < 0",
                            name
                        )));
                    }
                    e
                }
                Some(l) => (start + l).min(total),
            };
            let slice = full[start as usize..end.max(start) as usize].to_vec();
            Ok(finish_list(interp, slice, star, quoted))
        }
    }
}

fn strip(pattern: &Pattern, s: &str, suffix: bool, longest: bool) -> String {
    let chars: Vec<char> = s.chars().collect();
    if suffix {
        match pattern.suffix_start(s, longest) {
            Some(start) => chars[..start].iter().collect(),
            None => s.to_string(),
        }
    } else {
        match pattern.prefix_len(s, longest) {
            Some(len) => chars[len..].iter().collect(),
            None => s.to_string(),
        }
    }
}

fn replace(pattern: &Pattern, s: &str, rep: &str, all: bool) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::new();
    let mut pos = 0usize;
    loop {
        match pattern.find(s, pos) {
            Some((start, end)) => {
                out.extend(&chars[pos..start]);
                out.push_str(rep);
                if end == start {
                    // Empty match: copy one char so we make progress.
                    if start < chars.len() {
                        out.push(chars[start]);
                    }
                    pos = start + 1;
                } else {
                    pos = end;
                }
                if !all || pos >= chars.len() {
                    out.extend(&chars[pos.min(chars.len())..]);
                    return out;
                }
            }
            None => {
                out.extend(&chars[pos.min(chars.len())..]);
                return out;
            }
        }
    }
}

fn change_case(pattern: &Pattern, s: &str, upper: bool, all: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, c) in s.chars().enumerate() {
        let hit = (all || i == 0) && pattern.matches(&c.to_string());
        if hit {
            if upper {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// `${!v}` and `${!name[@]}`.
async fn indirect(
    interp: &mut Interp,
    pe: &ParamExp,
    quoted: bool,
) -> Result<ParamValue, ExpandError> {
    // `${!name[@]}`: the array's keys.
    if matches!(pe.index, Some(ParamIndex::All) | Some(ParamIndex::Star)) {
        let star = matches!(pe.index, Some(ParamIndex::Star));
        let keys = match interp.env.get(&pe.name) {
            Some(var) => match &var.value {
                Value::Indexed(_) | Value::Assoc(_) => var.value.keys(),
                _ => vec!["0".to_string()],
            },
            None => Vec::new(),
        };
        return Ok(finish_list(interp, keys, star, quoted));
    }

    let target = match interp.env.get_str(&pe.name) {
        Some(t) if !t.is_empty() => t,
        _ => return Err(ExpandError::msg(format!("{}: bad substitution", pe.name))),
    };
    let inner = ParamExp::plain(target);
    Box::pin(eval_param(interp, &inner, quoted)).await
}
