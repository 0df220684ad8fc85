//! Quote helpers: ANSI-C escape decoding (`$'...'`, `echo -e`) and
//! shell quoting (`${v@Q}`, `printf %q`).

/// Decode ANSI-C escapes the way `$'...'` does.
pub fn ansi_decode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('e') | Some('E') => out.push('\x1b'),
            Some('f') => out.push('\x0c'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('v') => out.push('\x0b'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('?') => out.push('?'),
            Some(d @ '0'..='7') => {
                // Up to three octal digits.
                let mut val = d.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(d) => {
                            val = val * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                if let Some(c) = char::from_u32(val) {
                    out.push(c);
                }
            }
            Some('x') => {
                let mut val = 0u32;
                let mut any = false;
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(16)) {
                        Some(d) => {
                            val = val * 16 + d;
                            chars.next();
                            any = true;
                        }
                        None => break,
                    }
                }
                if any {
                    if let Some(c) = char::from_u32(val) {
                        out.push(c);
                    }
                } else {
                    out.push_str("\\x");
                }
            }
            Some('u') => push_unicode(&mut chars, &mut out, 4),
            Some('U') => push_unicode(&mut chars, &mut out, 8),
            Some('c') => {
                // Control char: \cX
                match chars.next() {
                    Some(c) => {
                        let upper = c.to_ascii_uppercase() as u32;
                        if let Some(ctrl) = char::from_u32(upper ^ 0x40) {
                            out.push(ctrl);
                        }
                    }
                    None => out.push_str("\\c"),
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn push_unicode(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, out: &mut String, max: usize) {
    let mut val = 0u32;
    let mut any = false;
    for _ in 0..max {
        match chars.peek().and_then(|c| c.to_digit(16)) {
            Some(d) => {
                val = val * 16 + d;
                chars.next();
                any = true;
            }
            None => break,
        }
    }
    if any {
        if let Some(c) = char::from_u32(val) {
            out.push(c);
        }
    } else {
        out.push('\\');
        out.push(if max == 4 { 'u' } else { 'U' });
    }
}

/// Quote a string so the shell reads it back verbatim.
///
/// Safe strings come back untouched; strings with control characters use
/// the `$'...'` form; everything else gets single quotes with the usual
/// `'\''` splice for embedded quotes.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars().all(is_safe_char) {
        return s.to_string();
    }
    if s.chars().any(|c| c.is_control()) {
        let mut out = String::from("$'");
        for c in s.chars() {
            match c {
                '\x07' => out.push_str("\\a"),
                '\x08' => out.push_str("\\b"),
                '\x1b' => out.push_str("\\E"),
                '\x0c' => out.push_str("\\f"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                '\x0b' => out.push_str("\\v"),
                '\\' => out.push_str("\\\\"),
                '\'' => out.push_str("\\'"),
                c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
                c => out.push(c),
            }
        }
        out.push('\'');
        return out;
    }
    let mut out = String::from("'");
    for c in s.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/' | ':' | '=' | '+' | '-' | '%' | '@' | ',' | '^')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_escapes() {
        assert_eq!(ansi_decode("a\\nb"), "a\nb");
        assert_eq!(ansi_decode("tab\\there"), "tab\there");
        assert_eq!(ansi_decode("\\e[0m"), "\x1b[0m");
        assert_eq!(ansi_decode("q\\'q"), "q'q");
    }

    #[test]
    fn octal_escapes() {
        assert_eq!(ansi_decode("\\101"), "A");
        assert_eq!(ansi_decode("\\0"), "\0");
        assert_eq!(ansi_decode("\\12x"), "\nx");
    }

    #[test]
    fn hex_escapes() {
        assert_eq!(ansi_decode("\\x41"), "A");
        assert_eq!(ansi_decode("\\x4"), "\x04");
        assert_eq!(ansi_decode("\\xzz"), "\\xzz");
    }

    #[test]
    fn unicode_escapes() {
        assert_eq!(ansi_decode("\\u00e9"), "é");
        assert_eq!(ansi_decode("\\U0001F600"), "😀");
    }

    #[test]
    fn control_escapes() {
        assert_eq!(ansi_decode("\\cA"), "\x01");
        assert_eq!(ansi_decode("\\cz"), "\x1a");
    }

    #[test]
    fn unknown_escape_is_kept() {
        assert_eq!(ansi_decode("\\q"), "\\q");
        assert_eq!(ansi_decode("end\\"), "end\\");
    }

    #[test]
    fn quote_safe_passthrough() {
        assert_eq!(shell_quote("hello"), "hello");
        assert_eq!(shell_quote("a/b.c"), "a/b.c");
    }

    #[test]
    fn quote_spaces() {
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn quote_embedded_single_quote() {
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn quote_control_chars_use_ansi() {
        assert_eq!(shell_quote("a\nb"), "$'a\\nb'");
        assert_eq!(shell_quote("\t"), "$'\\t'");
    }

    #[test]
    fn quote_round_trip_through_decode() {
        for s in ["plain", "a b", "it's", "line\nbreak", "mix 'q' \t end"] {
            let quoted = shell_quote(s);
            let decoded = if let Some(body) = quoted.strip_prefix("$'").and_then(|q| q.strip_suffix('\'')) {
                ansi_decode(body)
            } else if let Some(body) = quoted.strip_prefix('\'').and_then(|q| q.strip_suffix('\'')) {
                body.replace("'\\''", "'")
            } else {
                quoted.clone()
            };
            assert_eq!(decoded, s, "round trip of {:?} via {:?}", s, quoted);
        }
    }
}
