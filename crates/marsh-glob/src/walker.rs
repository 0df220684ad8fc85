//! Pathname expansion: match glob patterns against the filesystem.
//!
//! The pattern is split on `/` and walked component by component from
//! either the filesystem root (anchored patterns) or a caller-supplied
//! working directory. `**` descends recursively when `globstar` is on.
//!
//! Rules honored here:
//! - Hidden entries (leading `.`) match only when the component pattern
//!   itself starts with a literal `.`, or `dotglob` is set.
//! - A trailing `/` restricts matches to directories and is kept in the
//!   produced paths.
//! - `**` never follows directory symlinks while descending.
//! - Results come back sorted.

use std::fs;
use std::path::{Path, PathBuf};

use crate::pattern::Pattern;

/// Behavior switches for pathname expansion, mirroring the shell options
/// that affect globbing.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkOptions {
    /// `shopt -s globstar`: `**` matches across directory levels.
    pub globstar: bool,
    /// `shopt -s dotglob`: wildcards match hidden entries.
    pub dotglob: bool,
    /// `shopt -s nocaseglob`: case-insensitive component matching.
    pub casefold: bool,
}

#[derive(Debug, Clone)]
enum Comp {
    /// Component with no wildcards: plain directory descent.
    Lit(String),
    /// Wildcard component.
    Pat(Pattern, String),
    /// `**` under globstar.
    Recurse,
}

/// Expand `pattern` against the filesystem.
///
/// `cwd` anchors relative patterns and must be absolute. Produced paths
/// keep the shape of the pattern: relative patterns yield relative paths,
/// absolute patterns absolute ones. Returns an empty vector when nothing
/// matches; the caller decides between `nullglob` removal and keeping the
/// original word.
pub fn expand_pathname(cwd: &Path, pattern: &str, opts: WalkOptions) -> Vec<String> {
    let anchored = pattern.starts_with('/');
    let dirs_only = pattern.ends_with('/') && pattern.len() > 1;

    let comps: Vec<Comp> = pattern
        .split('/')
        .filter(|c| !c.is_empty())
        .map(|c| compile_component(c, opts))
        .collect();
    if comps.is_empty() {
        // Pattern was "/" or all slashes.
        return if anchored && fs::metadata("/").is_ok() {
            vec!["/".to_string()]
        } else {
            Vec::new()
        };
    }

    let (start_dir, prefix) = if anchored {
        (PathBuf::from("/"), String::from("/"))
    } else {
        (cwd.to_path_buf(), String::new())
    };

    let mut out = Vec::new();
    walk(&start_dir, &prefix, &comps, dirs_only, opts, &mut out);
    out.sort();
    out
}

fn compile_component(comp: &str, opts: WalkOptions) -> Comp {
    if comp == "**" {
        return Comp::Recurse;
    }
    let pat = if opts.casefold {
        Pattern::case_insensitive(comp)
    } else {
        Pattern::new(comp)
    };
    match pat.literal_text() {
        Some(text) => Comp::Lit(text),
        None => Comp::Pat(pat, comp.to_string()),
    }
}

fn join_rel(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else if prefix.ends_with('/') {
        format!("{}{}", prefix, name)
    } else {
        format!("{}/{}", prefix, name)
    }
}

fn is_dir(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

fn emit(path: &Path, rel: &str, dirs_only: bool, out: &mut Vec<String>) {
    if dirs_only {
        if is_dir(path) {
            out.push(format!("{}/", rel));
        }
    } else {
        out.push(rel.to_string());
    }
}

fn walk(
    dir: &Path,
    prefix: &str,
    comps: &[Comp],
    dirs_only: bool,
    opts: WalkOptions,
    out: &mut Vec<String>,
) {
    let (comp, rest) = match comps.split_first() {
        Some(pair) => pair,
        None => return,
    };
    let last = rest.is_empty();

    match comp {
        Comp::Lit(name) => {
            // Literal components must exist but are matched without
            // reading the directory, so hidden names work unconditionally.
            let path = dir.join(name);
            let rel = join_rel(prefix, name);
            if last {
                if fs::symlink_metadata(&path).is_ok() {
                    emit(&path, &rel, dirs_only, out);
                }
            } else if is_dir(&path) {
                walk(&path, &rel, rest, dirs_only, opts, out);
            }
        }
        Comp::Pat(pat, raw) => {
            let allow_hidden = opts.dotglob || raw.starts_with('.');
            for name in read_names(dir) {
                if name.starts_with('.') && !allow_hidden {
                    continue;
                }
                if !pat.matches(&name) {
                    continue;
                }
                let path = dir.join(&name);
                let rel = join_rel(prefix, &name);
                if last {
                    emit(&path, &rel, dirs_only, out);
                } else if is_dir(&path) {
                    walk(&path, &rel, rest, dirs_only, opts, out);
                }
            }
        }
        Comp::Recurse => {
            if last {
                // `**` as the final component matches everything below,
                // including the directory itself (as its prefix).
                if !prefix.is_empty() {
                    emit(dir, prefix.trim_end_matches('/'), dirs_only, out);
                }
                recurse_emit(dir, prefix, dirs_only, opts, out);
            } else {
                // Zero directories consumed:
                walk(dir, prefix, rest, dirs_only, opts, out);
                // Or descend through each subdirectory (symlinks excluded).
                for name in read_names(dir) {
                    if name.starts_with('.') && !opts.dotglob {
                        continue;
                    }
                    let path = dir.join(&name);
                    if dir_no_symlink(&path) {
                        let rel = join_rel(prefix, &name);
                        walk(&path, &rel, comps, dirs_only, opts, out);
                    }
                }
            }
        }
    }
}

/// Emit every entry below `dir`, recursing into non-symlink directories.
fn recurse_emit(dir: &Path, prefix: &str, dirs_only: bool, opts: WalkOptions, out: &mut Vec<String>) {
    for name in read_names(dir) {
        if name.starts_with('.') && !opts.dotglob {
            continue;
        }
        let path = dir.join(&name);
        let rel = join_rel(prefix, &name);
        emit(&path, &rel, dirs_only, out);
        if dir_no_symlink(&path) {
            recurse_emit(&path, &rel, dirs_only, opts, out);
        }
    }
}

/// Directory check that refuses to traverse symlinks.
fn dir_no_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

fn read_names(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
    }
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};

    fn fixture() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path();
        fs::create_dir_all(root.join("src/nested")).unwrap();
        fs::create_dir_all(root.join("docs")).unwrap();
        File::create(root.join("a.rs")).unwrap();
        File::create(root.join("b.rs")).unwrap();
        File::create(root.join("c.txt")).unwrap();
        File::create(root.join(".hidden")).unwrap();
        File::create(root.join("src/main.rs")).unwrap();
        File::create(root.join("src/nested/deep.rs")).unwrap();
        File::create(root.join("docs/guide.md")).unwrap();
        tmp
    }

    fn glob(tmp: &tempfile::TempDir, pat: &str, opts: WalkOptions) -> Vec<String> {
        expand_pathname(tmp.path(), pat, opts)
    }

    #[test]
    fn simple_star() {
        let tmp = fixture();
        let got = glob(&tmp, "*.rs", WalkOptions::default());
        assert_eq!(got, vec!["a.rs", "b.rs"]);
    }

    #[test]
    fn no_match_returns_empty() {
        let tmp = fixture();
        assert!(glob(&tmp, "*.zig", WalkOptions::default()).is_empty());
    }

    #[test]
    fn hidden_needs_literal_dot() {
        let tmp = fixture();
        assert!(glob(&tmp, "*hidden", WalkOptions::default()).is_empty());
        assert_eq!(glob(&tmp, ".h*", WalkOptions::default()), vec![".hidden"]);
        let dot = WalkOptions { dotglob: true, ..Default::default() };
        assert!(glob(&tmp, "*hidden", dot).contains(&".hidden".to_string()));
    }

    #[test]
    fn multi_component() {
        let tmp = fixture();
        let got = glob(&tmp, "src/*.rs", WalkOptions::default());
        assert_eq!(got, vec!["src/main.rs"]);
        let got = glob(&tmp, "*/*.rs", WalkOptions::default());
        assert_eq!(got, vec!["src/main.rs"]);
    }

    #[test]
    fn literal_components_descend() {
        let tmp = fixture();
        let got = glob(&tmp, "src/nested/*.rs", WalkOptions::default());
        assert_eq!(got, vec!["src/nested/deep.rs"]);
    }

    #[test]
    fn trailing_slash_selects_dirs() {
        let tmp = fixture();
        let got = glob(&tmp, "*/", WalkOptions::default());
        assert_eq!(got, vec!["docs/", "src/"]);
    }

    #[test]
    fn globstar_descends() {
        let tmp = fixture();
        let opts = WalkOptions { globstar: true, ..Default::default() };
        let got = glob(&tmp, "**/*.rs", opts);
        assert_eq!(got, vec!["a.rs", "b.rs", "src/main.rs", "src/nested/deep.rs"]);
    }

    #[test]
    fn globstar_trailing_lists_everything() {
        let tmp = fixture();
        let opts = WalkOptions { globstar: true, ..Default::default() };
        let got = glob(&tmp, "src/**", opts);
        assert!(got.contains(&"src".to_string()));
        assert!(got.contains(&"src/main.rs".to_string()));
        assert!(got.contains(&"src/nested/deep.rs".to_string()));
    }

    #[test]
    fn absolute_pattern_yields_absolute_paths() {
        let tmp = fixture();
        let pat = format!("{}/*.rs", tmp.path().display());
        let got = expand_pathname(Path::new("/"), &pat, WalkOptions::default());
        assert_eq!(got.len(), 2);
        assert!(got[0].starts_with('/'));
    }

    #[cfg(unix)]
    #[test]
    fn globstar_does_not_follow_symlinks() {
        let tmp = fixture();
        std::os::unix::fs::symlink(tmp.path().join("src"), tmp.path().join("link")).unwrap();
        let opts = WalkOptions { globstar: true, ..Default::default() };
        let got = glob(&tmp, "**/*.rs", opts);
        assert!(!got.iter().any(|p| p.starts_with("link/")));
    }

    #[test]
    fn class_component() {
        let tmp = fixture();
        let got = glob(&tmp, "[ab].rs", WalkOptions::default());
        assert_eq!(got, vec!["a.rs", "b.rs"]);
    }
}
