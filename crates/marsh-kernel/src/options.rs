//! Shell option flags (`set -e`, `shopt -s globstar`, ...).

/// Option switches honored by the evaluator.
///
/// The `set` names come with single-letter spellings; the `shopt` group
/// only has long names. Frames snapshot the whole struct so function
/// returns can restore the caller's options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    pub errexit: bool,
    pub nounset: bool,
    pub noglob: bool,
    pub pipefail: bool,
    pub xtrace: bool,
    pub allexport: bool,
    pub expand_aliases: bool,
    pub globstar: bool,
    pub nullglob: bool,
    pub dotglob: bool,
    pub nocaseglob: bool,
    pub nocasematch: bool,
}

/// `set -o` option names, in display order.
pub const SET_OPTION_NAMES: &[&str] = &[
    "allexport",
    "errexit",
    "noglob",
    "nounset",
    "pipefail",
    "xtrace",
];

/// `shopt` option names, in display order.
pub const SHOPT_OPTION_NAMES: &[&str] = &[
    "dotglob",
    "expand_aliases",
    "globstar",
    "nocaseglob",
    "nocasematch",
    "nullglob",
];

impl Options {
    /// Map a `set` single-letter flag to its field.
    pub fn by_letter(&mut self, letter: char) -> Option<&mut bool> {
        Some(match letter {
            'e' => &mut self.errexit,
            'u' => &mut self.nounset,
            'f' => &mut self.noglob,
            'x' => &mut self.xtrace,
            'a' => &mut self.allexport,
            _ => return None,
        })
    }

    /// Map a long option name (`set -o name` or `shopt name`) to its field.
    pub fn by_name(&mut self, name: &str) -> Option<&mut bool> {
        Some(match name {
            "errexit" => &mut self.errexit,
            "nounset" => &mut self.nounset,
            "noglob" => &mut self.noglob,
            "pipefail" => &mut self.pipefail,
            "xtrace" => &mut self.xtrace,
            "allexport" => &mut self.allexport,
            "expand_aliases" => &mut self.expand_aliases,
            "globstar" => &mut self.globstar,
            "nullglob" => &mut self.nullglob,
            "dotglob" => &mut self.dotglob,
            "nocaseglob" => &mut self.nocaseglob,
            "nocasematch" => &mut self.nocasematch,
            _ => return None,
        })
    }

    /// Read a long option by name.
    pub fn get(&self, name: &str) -> Option<bool> {
        let mut copy = *self;
        copy.by_name(name).map(|b| *b)
    }
}
