//! Variable storage and the scope stack.
//!
//! Variables are tagged cells: scalar, indexed sequence (sparse, iterated
//! by ascending index), associative map, or name reference. Lookups walk
//! the frame stack innermost-out; assignment writes to the innermost
//! existing binding (dynamic scoping) or the global table. Name
//! references resolve transitively with a seen-set so cycles read as
//! empty instead of looping.

use std::collections::{BTreeMap, HashMap, HashSet};

use thiserror::Error;

use crate::options::Options;

/// Errors surfaced by store mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VarError {
    #[error("{0}: readonly variable")]
    Readonly(String),
    #[error("{0}: bad array subscript")]
    BadSubscript(String),
}

/// The value held by a variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(String),
    /// Sparse integer-keyed sequence; iteration is by ascending key.
    Indexed(BTreeMap<i64, String>),
    /// String-keyed mapping. Iteration order is not significant; a
    /// sorted map keeps output deterministic.
    Assoc(BTreeMap<String, String>),
    /// Name of the variable this one aliases.
    NameRef(String),
}

impl Value {
    pub fn indexed_from(items: Vec<String>) -> Self {
        Value::Indexed(items.into_iter().enumerate().map(|(i, v)| (i as i64, v)).collect())
    }

    /// The scalar view: a scalar's text, or element 0 of an array.
    pub fn to_field(&self) -> String {
        match self {
            Value::Scalar(s) => s.clone(),
            Value::Indexed(map) => map.get(&0).cloned().unwrap_or_default(),
            Value::Assoc(map) => map.get("0").cloned().unwrap_or_default(),
            Value::NameRef(target) => target.clone(),
        }
    }

    /// All element values in iteration order (a scalar is one element).
    pub fn elements(&self) -> Vec<String> {
        match self {
            Value::Scalar(s) => vec![s.clone()],
            Value::Indexed(map) => map.values().cloned().collect(),
            Value::Assoc(map) => map.values().cloned().collect(),
            Value::NameRef(target) => vec![target.clone()],
        }
    }

    /// All element keys in iteration order.
    pub fn keys(&self) -> Vec<String> {
        match self {
            Value::Scalar(_) | Value::NameRef(_) => vec!["0".to_string()],
            Value::Indexed(map) => map.keys().map(|k| k.to_string()).collect(),
            Value::Assoc(map) => map.keys().cloned().collect(),
        }
    }

    pub fn element_count(&self) -> usize {
        match self {
            Value::Scalar(_) | Value::NameRef(_) => 1,
            Value::Indexed(map) => map.len(),
            Value::Assoc(map) => map.len(),
        }
    }
}

/// Attribute flags, set by `declare`/`export`/`readonly`/`local`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub exported: bool,
    pub readonly: bool,
    /// Declared `local` (lives in a frame rather than the global table).
    pub local: bool,
    /// `declare -l`: lowercase on write.
    pub lower: bool,
    /// `declare -u`: uppercase on write.
    pub upper: bool,
}

/// A named cell: value plus attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub value: Value,
    pub flags: Flags,
}

impl Variable {
    pub fn scalar(s: impl Into<String>) -> Self {
        Self { value: Value::Scalar(s.into()), flags: Flags::default() }
    }

    pub fn exported(s: impl Into<String>) -> Self {
        let mut v = Self::scalar(s);
        v.flags.exported = true;
        v
    }
}

/// What a frame was pushed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Function call: owns positional parameters, shadows `$@`/`$#`.
    Function,
    /// `source`: transparent for positionals unless args were given.
    Source,
}

/// One scope frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: FrameKind,
    vars: HashMap<String, Variable>,
    /// Positional parameters owned by this frame, when it owns any.
    positional: Option<Vec<String>>,
    /// Options at entry, restored by the caller on pop.
    pub saved_opts: Options,
}

/// Array element addressing.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayKey {
    Index(i64),
    Key(String),
}

/// Where an assignment should land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Innermost existing binding, else global.
    Auto,
    /// Current (innermost) frame.
    Local,
    /// Global table, regardless of frames.
    Global,
}

/// Result of chasing a name-reference chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// Final variable name after following namerefs.
    pub name: String,
    /// True when the chain looped; reads yield empty.
    pub cycle: bool,
}

/// The variable store: global table plus a stack of frames.
#[derive(Debug, Clone)]
pub struct Env {
    globals: HashMap<String, Variable>,
    frames: Vec<Frame>,
    /// Top-level positional parameters.
    top_positional: Vec<String>,
    /// `$0`.
    pub script_name: String,
}

impl Env {
    pub fn new() -> Self {
        Self {
            globals: HashMap::new(),
            frames: Vec::new(),
            top_positional: Vec::new(),
            script_name: String::new(),
        }
    }

    // --- Lookup ---

    /// Raw lookup of the innermost binding, no nameref chasing.
    pub fn lookup(&self, name: &str) -> Option<&Variable> {
        for frame in self.frames.iter().rev() {
            if let Some(v) = frame.vars.get(name) {
                return Some(v);
            }
        }
        self.globals.get(name)
    }

    /// Follow nameref links from `name` to the final target.
    pub fn resolve_name(&self, name: &str) -> Resolved {
        let mut seen = HashSet::new();
        let mut current = name.to_string();
        loop {
            if !seen.insert(current.clone()) {
                return Resolved { name: current, cycle: true };
            }
            match self.lookup(&current) {
                Some(Variable { value: Value::NameRef(target), .. }) => {
                    current = target.clone();
                }
                _ => return Resolved { name: current, cycle: false },
            }
        }
    }

    /// Nameref-resolved variable access.
    pub fn get(&self, name: &str) -> Option<&Variable> {
        let resolved = self.resolve_name(name);
        if resolved.cycle {
            return None;
        }
        self.lookup(&resolved.name)
    }

    /// Scalar rendering of a variable, if set.
    pub fn get_str(&self, name: &str) -> Option<String> {
        self.get(name).map(|v| v.value.to_field())
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    // --- Mutation ---

    fn transform(flags: Flags, s: String) -> String {
        if flags.lower {
            s.to_lowercase()
        } else if flags.upper {
            s.to_uppercase()
        } else {
            s
        }
    }

    fn slot_for(&mut self, name: &str, mode: SetMode) -> &mut HashMap<String, Variable> {
        match mode {
            SetMode::Global => &mut self.globals,
            SetMode::Local => match self.frames.last_mut() {
                Some(frame) => &mut frame.vars,
                None => &mut self.globals,
            },
            SetMode::Auto => {
                let idx = self
                    .frames
                    .iter()
                    .rposition(|f| f.vars.contains_key(name));
                match idx {
                    Some(i) => &mut self.frames[i].vars,
                    None => &mut self.globals,
                }
            }
        }
    }

    fn check_readonly(&self, name: &str) -> Result<(), VarError> {
        if self.lookup(name).map(|v| v.flags.readonly).unwrap_or(false) {
            return Err(VarError::Readonly(name.to_string()));
        }
        Ok(())
    }

    /// Write a scalar, following namerefs and attribute transforms.
    pub fn set_scalar(
        &mut self,
        name: &str,
        value: impl Into<String>,
        mode: SetMode,
    ) -> Result<(), VarError> {
        let resolved = self.resolve_name(name);
        let target = resolved.name;
        self.check_readonly(&target)?;
        let flags = self.lookup(&target).map(|v| v.flags).unwrap_or_default();
        let text = Self::transform(flags, value.into());
        let table = self.slot_for(&target, mode);
        match table.get_mut(&target) {
            Some(var) => match &mut var.value {
                // Assigning to an array without a subscript writes [0].
                Value::Indexed(map) => {
                    map.insert(0, text);
                }
                Value::Assoc(map) => {
                    map.insert("0".to_string(), text);
                }
                _ => var.value = Value::Scalar(text),
            },
            None => {
                table.insert(target, Variable { value: Value::Scalar(text), flags });
            }
        }
        Ok(())
    }

    /// Replace a variable's whole value (array literals, `declare -n`).
    pub fn set_value(&mut self, name: &str, value: Value, mode: SetMode) -> Result<(), VarError> {
        self.check_readonly(name)?;
        let flags = self.lookup(name).map(|v| v.flags).unwrap_or_default();
        let table = self.slot_for(name, mode);
        table.insert(name.to_string(), Variable { value, flags });
        Ok(())
    }

    /// Write one array element, creating the array if needed.
    pub fn set_element(
        &mut self,
        name: &str,
        key: ArrayKey,
        value: impl Into<String>,
        mode: SetMode,
    ) -> Result<(), VarError> {
        let resolved = self.resolve_name(name);
        let target = resolved.name;
        self.check_readonly(&target)?;
        let flags = self.lookup(&target).map(|v| v.flags).unwrap_or_default();
        let text = Self::transform(flags, value.into());
        let table = self.slot_for(&target, mode);
        let var = table
            .entry(target.clone())
            .or_insert_with(|| Variable { value: Value::Indexed(BTreeMap::new()), flags });
        match (&mut var.value, key) {
            (Value::Indexed(map), ArrayKey::Index(i)) => {
                let idx = if i < 0 {
                    // Negative write index counts back from the end.
                    let max = map.keys().next_back().copied().unwrap_or(-1);
                    let idx = max + 1 + i;
                    if idx < 0 {
                        return Err(VarError::BadSubscript(format!("{}[{}]", target, i)));
                    }
                    idx
                } else {
                    i
                };
                map.insert(idx, text);
            }
            (Value::Assoc(map), ArrayKey::Key(k)) => {
                map.insert(k, text);
            }
            (Value::Assoc(map), ArrayKey::Index(i)) => {
                map.insert(i.to_string(), text);
            }
            (Value::Scalar(prev), key) => {
                // Subscript assignment to a scalar promotes it to indexed.
                let mut map = BTreeMap::new();
                if !prev.is_empty() {
                    map.insert(0, prev.clone());
                }
                let idx = match key {
                    ArrayKey::Index(i) if i >= 0 => i,
                    ArrayKey::Index(i) => {
                        return Err(VarError::BadSubscript(format!("{}[{}]", target, i)))
                    }
                    ArrayKey::Key(k) => {
                        return Err(VarError::BadSubscript(format!("{}[{}]", target, k)))
                    }
                };
                map.insert(idx, text);
                var.value = Value::Indexed(map);
            }
            (Value::Indexed(_), ArrayKey::Key(k)) => {
                return Err(VarError::BadSubscript(format!("{}[{}]", target, k)));
            }
            (Value::NameRef(_), _) => {
                return Err(VarError::BadSubscript(target));
            }
        }
        Ok(())
    }

    /// `name+=value` on a scalar (or element 0 of an array).
    pub fn append_scalar(
        &mut self,
        name: &str,
        value: &str,
        mode: SetMode,
    ) -> Result<(), VarError> {
        let current = self.get_str(name).unwrap_or_default();
        self.set_scalar(name, format!("{current}{value}"), mode)
    }

    /// `name+=(items...)`: element append; an unset name becomes an
    /// indexed sequence starting at 0.
    pub fn append_elements(
        &mut self,
        name: &str,
        items: Vec<String>,
        mode: SetMode,
    ) -> Result<(), VarError> {
        let resolved = self.resolve_name(name);
        let target = resolved.name;
        self.check_readonly(&target)?;
        let flags = self.lookup(&target).map(|v| v.flags).unwrap_or_default();
        let table = self.slot_for(&target, mode);
        let var = table
            .entry(target.clone())
            .or_insert_with(|| Variable { value: Value::Indexed(BTreeMap::new()), flags });
        if let Value::Scalar(s) = &var.value {
            let mut map = BTreeMap::new();
            if !s.is_empty() {
                map.insert(0, s.clone());
            }
            var.value = Value::Indexed(map);
        }
        match &mut var.value {
            Value::Indexed(map) => {
                let mut next = map.keys().next_back().map(|k| k + 1).unwrap_or(0);
                for item in items {
                    map.insert(next, Self::transform(flags, item));
                    next += 1;
                }
                Ok(())
            }
            _ => Err(VarError::BadSubscript(target)),
        }
    }

    /// Remove the innermost binding for `name`.
    pub fn unset(&mut self, name: &str) -> Result<(), VarError> {
        self.check_readonly(name)?;
        for frame in self.frames.iter_mut().rev() {
            if frame.vars.remove(name).is_some() {
                return Ok(());
            }
        }
        self.globals.remove(name);
        Ok(())
    }

    /// Remove one element of an array.
    pub fn unset_element(&mut self, name: &str, key: &ArrayKey) -> Result<(), VarError> {
        self.check_readonly(name)?;
        let resolved = self.resolve_name(name);
        for frame in self.frames.iter_mut().rev() {
            if let Some(var) = frame.vars.get_mut(&resolved.name) {
                Self::remove_key(var, key);
                return Ok(());
            }
        }
        if let Some(var) = self.globals.get_mut(&resolved.name) {
            Self::remove_key(var, key);
        }
        Ok(())
    }

    fn remove_key(var: &mut Variable, key: &ArrayKey) {
        match (&mut var.value, key) {
            (Value::Indexed(map), ArrayKey::Index(i)) => {
                map.remove(i);
            }
            (Value::Assoc(map), ArrayKey::Key(k)) => {
                map.remove(k);
            }
            (Value::Assoc(map), ArrayKey::Index(i)) => {
                map.remove(&i.to_string());
            }
            _ => {}
        }
    }

    /// Adjust a variable's flags in place, creating it unset-empty if
    /// missing (so `export NAME` before assignment works).
    pub fn with_flags(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Flags),
    ) -> Result<(), VarError> {
        for frame in self.frames.iter_mut().rev() {
            if let Some(var) = frame.vars.get_mut(name) {
                f(&mut var.flags);
                return Ok(());
            }
        }
        let var = self
            .globals
            .entry(name.to_string())
            .or_insert_with(|| Variable::scalar(""));
        f(&mut var.flags);
        Ok(())
    }

    // --- Frames ---

    pub fn push_frame(&mut self, kind: FrameKind, positional: Option<Vec<String>>, saved_opts: Options) {
        self.frames.push(Frame { kind, vars: HashMap::new(), positional, saved_opts });
    }

    pub fn pop_frame(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// True when any function frame is on the stack.
    pub fn in_function(&self) -> bool {
        self.frames.iter().any(|f| f.kind == FrameKind::Function)
    }

    /// True when inside a function or a sourced script.
    pub fn in_frame(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Declare a variable local to the innermost frame.
    pub fn declare_local(&mut self, name: &str, value: Option<String>) -> Result<(), VarError> {
        self.check_readonly(name)?;
        let frame = match self.frames.last_mut() {
            Some(f) => f,
            None => return Ok(()),
        };
        let mut var = Variable::scalar(value.unwrap_or_default());
        var.flags.local = true;
        frame.vars.insert(name.to_string(), var);
        Ok(())
    }

    // --- Positional parameters ---

    /// The active positional parameters: innermost frame that owns any,
    /// else the top level.
    pub fn positional(&self) -> &[String] {
        for frame in self.frames.iter().rev() {
            if let Some(p) = &frame.positional {
                return p;
            }
        }
        &self.top_positional
    }

    /// Replace the active positional parameters (`set --`, `shift`).
    pub fn set_positional(&mut self, args: Vec<String>) {
        for frame in self.frames.iter_mut().rev() {
            if let Some(p) = &mut frame.positional {
                *p = args;
                return;
            }
        }
        self.top_positional = args;
    }

    /// `shift n`; false when `n` exceeds `$#`.
    pub fn shift(&mut self, n: usize) -> bool {
        let current = self.positional().to_vec();
        if n > current.len() {
            return false;
        }
        self.set_positional(current[n..].to_vec());
        true
    }

    // --- Enumeration ---

    /// `NAME=value` pairs for exported scalars, sorted by name.
    pub fn iter_exported(&self) -> Vec<(String, String)> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let frames = self.frames.iter().rev().map(|f| &f.vars);
        for table in frames.chain(std::iter::once(&self.globals)) {
            for (name, var) in table {
                if !seen.insert(name.clone()) {
                    continue;
                }
                if var.flags.exported {
                    out.push((name.clone(), var.value.to_field()));
                }
            }
        }
        out.sort();
        out
    }

    /// Variable names starting with `prefix`, sorted.
    pub fn names_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut names: HashSet<String> = HashSet::new();
        for frame in &self.frames {
            names.extend(frame.vars.keys().cloned());
        }
        names.extend(self.globals.keys().cloned());
        let mut out: Vec<String> = names.into_iter().filter(|n| n.starts_with(prefix)).collect();
        out.sort();
        out
    }

    /// Every visible variable, innermost binding winning, sorted by name.
    pub fn visible(&self) -> Vec<(String, Variable)> {
        let mut out: HashMap<String, Variable> = HashMap::new();
        for (name, var) in &self.globals {
            out.insert(name.clone(), var.clone());
        }
        for frame in &self.frames {
            for (name, var) in &frame.vars {
                out.insert(name.clone(), var.clone());
            }
        }
        let mut pairs: Vec<_> = out.into_iter().collect();
        pairs.sort_by(|(a, _), (b, _)| a.cmp(b));
        pairs
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Env {
        Env::new()
    }

    #[test]
    fn set_and_get_scalar() {
        let mut e = env();
        e.set_scalar("X", "42", SetMode::Auto).unwrap();
        assert_eq!(e.get_str("X").as_deref(), Some("42"));
    }

    #[test]
    fn unset_returns_none() {
        let e = env();
        assert_eq!(e.get_str("MISSING"), None);
        assert!(!e.is_set("MISSING"));
    }

    #[test]
    fn local_shadows_global() {
        let mut e = env();
        e.set_scalar("X", "outer", SetMode::Auto).unwrap();
        e.push_frame(FrameKind::Function, Some(vec![]), Options::default());
        e.declare_local("X", Some("inner".into())).unwrap();
        assert_eq!(e.get_str("X").as_deref(), Some("inner"));
        e.pop_frame();
        assert_eq!(e.get_str("X").as_deref(), Some("outer"));
    }

    #[test]
    fn auto_mode_writes_existing_local() {
        let mut e = env();
        e.push_frame(FrameKind::Function, Some(vec![]), Options::default());
        e.declare_local("X", Some("a".into())).unwrap();
        e.set_scalar("X", "b", SetMode::Auto).unwrap();
        assert_eq!(e.get_str("X").as_deref(), Some("b"));
        e.pop_frame();
        // The write stayed in the frame.
        assert_eq!(e.get_str("X"), None);
    }

    #[test]
    fn auto_mode_defaults_to_global() {
        let mut e = env();
        e.push_frame(FrameKind::Function, Some(vec![]), Options::default());
        e.set_scalar("X", "v", SetMode::Auto).unwrap();
        e.pop_frame();
        assert_eq!(e.get_str("X").as_deref(), Some("v"));
    }

    #[test]
    fn readonly_rejects_writes() {
        let mut e = env();
        e.set_scalar("X", "1", SetMode::Auto).unwrap();
        e.with_flags("X", |f| f.readonly = true).unwrap();
        assert_eq!(
            e.set_scalar("X", "2", SetMode::Auto),
            Err(VarError::Readonly("X".into()))
        );
        assert_eq!(e.unset("X"), Err(VarError::Readonly("X".into())));
        assert_eq!(e.get_str("X").as_deref(), Some("1"));
    }

    #[test]
    fn upper_lower_transforms_on_write() {
        let mut e = env();
        e.with_flags("U", |f| f.upper = true).unwrap();
        e.set_scalar("U", "héllo", SetMode::Auto).unwrap();
        assert_eq!(e.get_str("U").as_deref(), Some("HÉLLO"));
        e.with_flags("L", |f| f.lower = true).unwrap();
        e.set_scalar("L", "WORLD", SetMode::Auto).unwrap();
        assert_eq!(e.get_str("L").as_deref(), Some("world"));
    }

    #[test]
    fn nameref_reads_and_writes_through() {
        let mut e = env();
        e.set_scalar("target", "v1", SetMode::Auto).unwrap();
        e.set_value("link", Value::NameRef("target".into()), SetMode::Auto).unwrap();
        assert_eq!(e.get_str("link").as_deref(), Some("v1"));
        e.set_scalar("link", "v2", SetMode::Auto).unwrap();
        assert_eq!(e.get_str("target").as_deref(), Some("v2"));
    }

    #[test]
    fn nameref_cycle_reads_empty() {
        let mut e = env();
        e.set_value("a", Value::NameRef("b".into()), SetMode::Auto).unwrap();
        e.set_value("b", Value::NameRef("a".into()), SetMode::Auto).unwrap();
        assert_eq!(e.get_str("a"), None);
        assert!(e.resolve_name("a").cycle);
    }

    #[test]
    fn indexed_assignment_and_append() {
        let mut e = env();
        e.set_value("arr", Value::indexed_from(vec!["x".into(), "y".into()]), SetMode::Auto)
            .unwrap();
        e.set_element("arr", ArrayKey::Index(5), "z", SetMode::Auto).unwrap();
        assert_eq!(e.get("arr").unwrap().value.elements(), vec!["x", "y", "z"]);
        e.append_elements("arr", vec!["w".into()], SetMode::Auto).unwrap();
        // Appends after the highest index.
        assert_eq!(e.get("arr").unwrap().value.keys(), vec!["0", "1", "5", "6"]);
    }

    #[test]
    fn append_to_unset_starts_at_zero() {
        let mut e = env();
        e.append_elements("a", vec!["one".into(), "two".into()], SetMode::Auto).unwrap();
        assert_eq!(e.get("a").unwrap().value.keys(), vec!["0", "1"]);
    }

    #[test]
    fn scalar_promotes_on_subscript_write() {
        let mut e = env();
        e.set_scalar("v", "first", SetMode::Auto).unwrap();
        e.set_element("v", ArrayKey::Index(1), "second", SetMode::Auto).unwrap();
        assert_eq!(e.get("v").unwrap().value.elements(), vec!["first", "second"]);
    }

    #[test]
    fn negative_write_index_counts_back() {
        let mut e = env();
        e.set_value("a", Value::indexed_from(vec!["x".into(), "y".into(), "z".into()]), SetMode::Auto)
            .unwrap();
        e.set_element("a", ArrayKey::Index(-1), "Z", SetMode::Auto).unwrap();
        assert_eq!(e.get("a").unwrap().value.elements(), vec!["x", "y", "Z"]);
    }

    #[test]
    fn assoc_elements() {
        let mut e = env();
        e.set_value("m", Value::Assoc(BTreeMap::new()), SetMode::Auto).unwrap();
        e.set_element("m", ArrayKey::Key("k".into()), "v", SetMode::Auto).unwrap();
        assert_eq!(e.get("m").unwrap().value.element_count(), 1);
        e.unset_element("m", &ArrayKey::Key("k".into())).unwrap();
        assert_eq!(e.get("m").unwrap().value.element_count(), 0);
    }

    #[test]
    fn positional_ownership() {
        let mut e = env();
        e.set_positional(vec!["a".into(), "b".into()]);
        e.push_frame(FrameKind::Function, Some(vec!["x".into()]), Options::default());
        assert_eq!(e.positional(), ["x"]);
        e.push_frame(FrameKind::Source, None, Options::default());
        // Transparent source frame sees the function's params.
        assert_eq!(e.positional(), ["x"]);
        e.pop_frame();
        e.pop_frame();
        assert_eq!(e.positional(), ["a", "b"]);
    }

    #[test]
    fn shift_respects_bounds() {
        let mut e = env();
        e.set_positional(vec!["a".into(), "b".into(), "c".into()]);
        assert!(e.shift(2));
        assert_eq!(e.positional(), ["c"]);
        assert!(!e.shift(5));
        assert_eq!(e.positional(), ["c"]);
    }

    #[test]
    fn exported_pairs_are_sorted_and_deduped() {
        let mut e = env();
        e.set_scalar("B", "2", SetMode::Auto).unwrap();
        e.with_flags("B", |f| f.exported = true).unwrap();
        e.set_scalar("A", "1", SetMode::Auto).unwrap();
        e.with_flags("A", |f| f.exported = true).unwrap();
        e.set_scalar("C", "3", SetMode::Auto).unwrap();
        let pairs = e.iter_exported();
        assert_eq!(pairs, vec![("A".into(), "1".into()), ("B".into(), "2".into())]);
    }

    #[test]
    fn names_with_prefix_sorted() {
        let mut e = env();
        for n in ["user", "usage", "other"] {
            e.set_scalar(n, "x", SetMode::Auto).unwrap();
        }
        assert_eq!(e.names_with_prefix("us"), vec!["usage", "user"]);
    }

    #[test]
    fn array_without_subscript_writes_element_zero() {
        let mut e = env();
        e.set_value("a", Value::indexed_from(vec!["x".into(), "y".into()]), SetMode::Auto)
            .unwrap();
        e.set_scalar("a", "new", SetMode::Auto).unwrap();
        assert_eq!(e.get("a").unwrap().value.elements(), vec!["new", "y"]);
    }
}
