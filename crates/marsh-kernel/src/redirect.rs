//! Redirection application.
//!
//! The evaluator snapshots the fd table before a command and restores it
//! afterwards on every exit path; this module only has to apply each
//! operator to the live table. Failures surface as expansion-style
//! diagnostics: status 1 for open failures, status 2 for malformed
//! duplications.

use crate::ast::{Redirect, RedirOp, Word, WordPart};
use crate::exec::OpenFlags;
use crate::expand::{expand_fields, expand_single, ExpandError};
use crate::interp::Interp;
use crate::io::FdFile;

impl Interp {
    pub(crate) async fn apply_redirects(&mut self, redirs: &[Redirect]) -> Result<(), ExpandError> {
        for redir in redirs {
            self.apply_redirect(redir).await?;
        }
        Ok(())
    }

    async fn apply_redirect(&mut self, redir: &Redirect) -> Result<(), ExpandError> {
        let fd = redir.fd.unwrap_or_else(|| redir.op.default_fd());
        match &redir.op {
            RedirOp::Out => {
                let file = self.open_target(&redir.target, OpenFlags::write_only(false)).await?;
                self.fds.set(fd, file);
            }
            RedirOp::Append => {
                let file = self.open_target(&redir.target, OpenFlags::write_only(true)).await?;
                self.fds.set(fd, file);
            }
            RedirOp::In => {
                let file = self.open_target(&redir.target, OpenFlags::read_only()).await?;
                self.fds.set(fd, file);
            }
            RedirOp::ReadWrite => {
                let file = self.open_target(&redir.target, OpenFlags::read_write()).await?;
                self.fds.set(fd, file);
            }
            RedirOp::OutBoth | RedirOp::AppendBoth => {
                let append = matches!(redir.op, RedirOp::AppendBoth);
                let file = self.open_target(&redir.target, OpenFlags::write_only(append)).await?;
                self.fds.set(1, file.clone());
                self.fds.set(2, file);
            }
            RedirOp::DupOut | RedirOp::DupIn => {
                let target = expand_single(self, &redir.target).await?;
                self.apply_dup(fd, &target)?;
            }
            RedirOp::Heredoc { strip_tabs, quoted } => {
                let body = if *quoted {
                    literal_text(&redir.heredoc.clone().unwrap_or_default())
                } else {
                    match &redir.heredoc {
                        Some(word) => expand_single(self, word).await?,
                        None => String::new(),
                    }
                };
                let body = if *strip_tabs { strip_leading_tabs(&body) } else { body };
                self.fds.set(fd, FdFile::from_bytes(body.into_bytes()));
            }
            RedirOp::HereString => {
                let mut body = expand_single(self, &redir.target).await?;
                body.push('\n');
                self.fds.set(fd, FdFile::from_bytes(body.into_bytes()));
            }
        }
        Ok(())
    }

    /// Expand a redirect target. A target is ambiguous when it expands
    /// to anything but exactly one field; a quoted name with spaces in
    /// it is one field and is fine.
    async fn open_target(&mut self, word: &Word, flags: OpenFlags) -> Result<FdFile, ExpandError> {
        let mut fields = expand_fields(self, std::slice::from_ref(word)).await?;
        if fields.len() != 1 {
            return Err(ExpandError::Message {
                status: 2,
                fatal: false,
                text: format!("{}: ambiguous redirect", fields.join(" ")),
            });
        }
        let path = fields.remove(0);
        self.open_file(&path, flags)
            .await
            .map_err(|e| ExpandError::msg(format!("{}: {}", path, e)))
    }

    fn apply_dup(&mut self, fd: u32, target: &str) -> Result<(), ExpandError> {
        if target == "-" {
            self.fds.close(fd);
            return Ok(());
        }
        // `N>&M-` moves M to N.
        let (src_text, close_src) = match target.strip_suffix('-') {
            Some(rest) => (rest, true),
            None => (target, false),
        };
        let src: u32 = src_text.parse().map_err(|_| ExpandError::Message {
            status: 2,
            fatal: false,
            text: format!("{}: ambiguous redirect", target),
        })?;
        if !self.fds.dup(fd, src) {
            return Err(ExpandError::msg(format!("{}: bad file descriptor", src)));
        }
        if close_src {
            self.fds.close(src);
        }
        Ok(())
    }
}

/// The raw text of a quoted heredoc body.
fn literal_text(word: &Word) -> String {
    let mut out = String::new();
    for part in &word.parts {
        match part {
            WordPart::Lit(s) | WordPart::SglQuoted(s) | WordPart::AnsiQuoted(s) => out.push_str(s),
            WordPart::DblQuoted(parts) => {
                out.push_str(&literal_text(&Word { parts: parts.clone() }))
            }
            _ => {}
        }
    }
    out
}

/// `<<-`: drop leading tabs from every line.
fn strip_leading_tabs(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    for (i, line) in body.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(line.trim_start_matches('\t'));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_stripping() {
        assert_eq!(strip_leading_tabs("\tone\n\t\ttwo\nthree"), "one\ntwo\nthree");
        assert_eq!(strip_leading_tabs("plain"), "plain");
        // Inner tabs survive.
        assert_eq!(strip_leading_tabs("\ta\tb"), "a\tb");
    }

    #[test]
    fn literal_heredoc_text() {
        let word = Word {
            parts: vec![
                WordPart::Lit("a $x ".into()),
                WordPart::SglQuoted("b".into()),
            ],
        };
        assert_eq!(literal_text(&word), "a $x b");
    }
}
