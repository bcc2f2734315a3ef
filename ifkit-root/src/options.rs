//! Configuration: loosely typed option dictionaries, option tables, and the typed
//! [`Options`] of the rootfinder core.
//!
//! Plugins receive a [`Dict`] and validate it against their own [`OptionInfo`]
//! table with [`check_options`]; the same table is rendered by `doc_*` queries.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use ifkit::Oracle;

use crate::error::{Error, Result};

/// A dictionary of named option values.
pub type Dict = BTreeMap<String, OptionValue>;

/// A single option value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(untagged)
)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    IntVec(Vec<i64>),
    Dict(Dict),
}

/// The type an option table declares for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Bool,
    Int,
    Float,
    Str,
    IntVec,
    Dict,
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OptionKind::Bool => "bool",
            OptionKind::Int => "int",
            OptionKind::Float => "float",
            OptionKind::Str => "string",
            OptionKind::IntVec => "int vector",
            OptionKind::Dict => "dict",
        };
        f.write_str(s)
    }
}

impl OptionValue {
    pub fn kind(&self) -> OptionKind {
        match self {
            OptionValue::Bool(_) => OptionKind::Bool,
            OptionValue::Int(_) => OptionKind::Int,
            OptionValue::Float(_) => OptionKind::Float,
            OptionValue::Str(_) => OptionKind::Str,
            OptionValue::IntVec(_) => OptionKind::IntVec,
            OptionValue::Dict(_) => OptionKind::Dict,
        }
    }

    /// Whether this value is acceptable for an option of kind `kind`.
    ///
    /// Integers are accepted where floats are expected.
    pub fn fits(&self, kind: OptionKind) -> bool {
        self.kind() == kind || (kind == OptionKind::Float && self.kind() == OptionKind::Int)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            OptionValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            OptionValue::Float(x) => Some(*x),
            OptionValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int_vec(&self) -> Option<&[i64]> {
        match self {
            OptionValue::IntVec(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            OptionValue::Dict(d) => Some(d),
            _ => None,
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        OptionValue::Int(v as i64)
    }
}

impl From<usize> for OptionValue {
    fn from(v: usize) -> Self {
        OptionValue::Int(v as i64)
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Float(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Str(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Str(v)
    }
}

impl From<Vec<i64>> for OptionValue {
    fn from(v: Vec<i64>) -> Self {
        OptionValue::IntVec(v)
    }
}

impl From<Dict> for OptionValue {
    fn from(v: Dict) -> Self {
        OptionValue::Dict(v)
    }
}

/// One row of an option table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionInfo {
    pub name: &'static str,
    pub kind: OptionKind,
    pub description: &'static str,
}

/// Reject keys missing from `table` and values of the wrong kind.
pub fn check_options(table: &[OptionInfo], opts: &Dict) -> Result<()> {
    for (name, value) in opts {
        let info = table
            .iter()
            .find(|info| info.name == name)
            .ok_or_else(|| Error::UnknownOption { name: name.clone() })?;
        if !value.fits(info.kind) {
            return Err(Error::InvalidOption {
                name: name.clone(),
                reason: format!("expected {}, got {}", info.kind, value.kind()),
            });
        }
    }
    Ok(())
}

/// Render an option table for documentation queries.
pub fn format_table(table: &[OptionInfo]) -> String {
    let width = table.iter().map(|i| i.name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for info in table {
        out.push_str(&format!(
            "  {:<width$}  {:<10}  {}\n",
            info.name,
            info.kind.to_string(),
            info.description,
            width = width
        ));
    }
    out
}

fn wrong_kind(name: &str, kind: OptionKind, value: &OptionValue) -> Error {
    Error::InvalidOption {
        name: name.to_string(),
        reason: format!("expected {}, got {}", kind, value.kind()),
    }
}

pub fn get_bool(opts: &Dict, name: &str, default: bool) -> Result<bool> {
    match opts.get(name) {
        None => Ok(default),
        Some(v) => v.as_bool().ok_or_else(|| wrong_kind(name, OptionKind::Bool, v)),
    }
}

pub fn get_int(opts: &Dict, name: &str, default: i64) -> Result<i64> {
    match opts.get(name) {
        None => Ok(default),
        Some(v) => v.as_int().ok_or_else(|| wrong_kind(name, OptionKind::Int, v)),
    }
}

pub fn get_float(opts: &Dict, name: &str, default: f64) -> Result<f64> {
    match opts.get(name) {
        None => Ok(default),
        Some(v) => v.as_float().ok_or_else(|| wrong_kind(name, OptionKind::Float, v)),
    }
}

pub fn get_str(opts: &Dict, name: &str, default: &str) -> Result<String> {
    match opts.get(name) {
        None => Ok(default.to_string()),
        Some(v) => v
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| wrong_kind(name, OptionKind::Str, v)),
    }
}

pub fn get_int_vec(opts: &Dict, name: &str) -> Result<Vec<i64>> {
    match opts.get(name) {
        None => Ok(Vec::new()),
        Some(v) => v
            .as_int_vec()
            .map(<[i64]>::to_vec)
            .ok_or_else(|| wrong_kind(name, OptionKind::IntVec, v)),
    }
}

pub fn get_dict(opts: &Dict, name: &str) -> Result<Dict> {
    match opts.get(name) {
        None => Ok(Dict::new()),
        Some(v) => v
            .as_dict()
            .cloned()
            .ok_or_else(|| wrong_kind(name, OptionKind::Dict, v)),
    }
}

/// A non-negative integer option, used for indices and counts.
pub fn get_usize(opts: &Dict, name: &str, default: usize) -> Result<usize> {
    let v = get_int(opts, name, default as i64)?;
    usize::try_from(v).map_err(|_| Error::InvalidOption {
        name: name.to_string(),
        reason: format!("must be non-negative, got {}", v),
    })
}

/// Sign constraint on one component of the unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// No constraint (`0`).
    Free,
    /// `z >= 0` (`1`).
    NonNegative,
    /// `z <= 0` (`-1`).
    NonPositive,
    /// `z > 0` (`2`).
    Positive,
    /// `z < 0` (`-2`).
    Negative,
}

impl Constraint {
    /// Whether `v` satisfies the constraint.
    pub fn is_satisfied(self, v: f64) -> bool {
        match self {
            Constraint::Free => true,
            Constraint::NonNegative => v >= 0.0,
            Constraint::NonPositive => v <= 0.0,
            Constraint::Positive => v > 0.0,
            Constraint::Negative => v < 0.0,
        }
    }

    /// Strict constraints exclude zero.
    pub fn is_strict(self) -> bool {
        matches!(self, Constraint::Positive | Constraint::Negative)
    }

    /// Sign of the admissible half-line, or 0 if unconstrained.
    pub fn sign(self) -> f64 {
        match self {
            Constraint::Free => 0.0,
            Constraint::NonNegative | Constraint::Positive => 1.0,
            Constraint::NonPositive | Constraint::Negative => -1.0,
        }
    }
}

impl TryFrom<i64> for Constraint {
    type Error = Error;

    fn try_from(v: i64) -> Result<Self> {
        match v {
            0 => Ok(Constraint::Free),
            1 => Ok(Constraint::NonNegative),
            -1 => Ok(Constraint::NonPositive),
            2 => Ok(Constraint::Positive),
            -2 => Ok(Constraint::Negative),
            _ => Err(Error::InvalidOption {
                name: "constraints".to_string(),
                reason: format!("entry {} not in {{-2, -1, 0, 1, 2}}", v),
            }),
        }
    }
}

/// Options recognized by the rootfinder core itself.
pub const CORE_OPTIONS: &[OptionInfo] = &[
    OptionInfo {
        name: "linear_solver",
        kind: OptionKind::Str,
        description: "User-defined linear solver class. Needed for sensitivities.",
    },
    OptionInfo {
        name: "linear_solver_options",
        kind: OptionKind::Dict,
        description: "Options to be passed to the linear solver.",
    },
    OptionInfo {
        name: "constraints",
        kind: OptionKind::IntVec,
        description: "Constrain the unknowns. 0 (default): no constraint on ui, \
                      1: ui >= 0.0, -1: ui <= 0.0, 2: ui > 0.0, -2: ui < 0.0.",
    },
    OptionInfo {
        name: "implicit_input",
        kind: OptionKind::Int,
        description: "Index of the input that corresponds to the actual root-finding.",
    },
    OptionInfo {
        name: "implicit_output",
        kind: OptionKind::Int,
        description: "Index of the output that corresponds to the actual root-finding.",
    },
];

/// Typed configuration of a rootfinder.
#[derive(Debug, Clone)]
pub struct Options {
    /// Name of the linear solver plugin (default: `"lu"`).
    pub linear_solver: String,
    /// Options forwarded to the linear solver plugin.
    pub linear_solver_options: Dict,
    /// Sign constraints on the unknown, empty or one per component.
    pub constraints: Vec<i64>,
    /// Oracle input holding the unknown (default: 0).
    pub implicit_input: usize,
    /// Oracle output holding the residual (default: 0).
    pub implicit_output: usize,
    /// Pre-built Jacobian of the residual with respect to the unknown.
    pub jacobian_function: Option<Arc<dyn Oracle>>,
    /// Options forwarded to the solver plugin.
    pub solver_options: Dict,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            linear_solver: "lu".to_string(),
            linear_solver_options: Dict::new(),
            constraints: Vec::new(),
            implicit_input: 0,
            implicit_output: 0,
            jacobian_function: None,
            solver_options: Dict::new(),
        }
    }
}

impl Options {
    /// Split a flat dictionary into core options and plugin options.
    ///
    /// Keys listed in [`CORE_OPTIONS`] are parsed here; every other key is
    /// forwarded to the solver plugin, which rejects what it does not know.
    pub fn from_dict(dict: &Dict) -> Result<Self> {
        let mut core = Dict::new();
        let mut solver_options = Dict::new();
        for (k, v) in dict {
            if CORE_OPTIONS.iter().any(|info| info.name == k) {
                core.insert(k.clone(), v.clone());
            } else {
                solver_options.insert(k.clone(), v.clone());
            }
        }
        check_options(CORE_OPTIONS, &core)?;

        Ok(Options {
            linear_solver: get_str(&core, "linear_solver", "lu")?,
            linear_solver_options: get_dict(&core, "linear_solver_options")?,
            constraints: get_int_vec(&core, "constraints")?,
            implicit_input: get_usize(&core, "implicit_input", 0)?,
            implicit_output: get_usize(&core, "implicit_output", 0)?,
            jacobian_function: None,
            solver_options,
        })
    }

    pub fn with_linear_solver(mut self, name: &str) -> Self {
        self.linear_solver = name.to_string();
        self
    }

    pub fn with_linear_solver_option(mut self, name: &str, value: impl Into<OptionValue>) -> Self {
        self.linear_solver_options.insert(name.to_string(), value.into());
        self
    }

    pub fn with_constraints(mut self, constraints: Vec<i64>) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_implicit_input(mut self, index: usize) -> Self {
        self.implicit_input = index;
        self
    }

    pub fn with_implicit_output(mut self, index: usize) -> Self {
        self.implicit_output = index;
        self
    }

    pub fn with_jacobian_function(mut self, jac: Arc<dyn Oracle>) -> Self {
        self.jacobian_function = Some(jac);
        self
    }

    pub fn with_solver_option(mut self, name: &str, value: impl Into<OptionValue>) -> Self {
        self.solver_options.insert(name.to_string(), value.into());
        self
    }
}
