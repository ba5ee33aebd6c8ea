//! Field predicates used to select array elements and to guard field
//! updates.
//!
//! Syntax: `path=value`, `path==value`, `path!=value`, clauses joined with
//! `&&`; alternatives joined with `||` (`&&` binds tighter). Values may be
//! double quoted. `null` matches absent and null fields.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use super::path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq)]
struct Clause {
    path: String,
    op: Op,
    literal: String,
    quoted: bool,
}

impl Clause {
    fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        let (lhs, op, rhs) = if let Some((lhs, rhs)) = raw.split_once("!=") {
            (lhs, Op::Ne, rhs)
        } else if let Some((lhs, rhs)) = raw.split_once("==") {
            (lhs, Op::Eq, rhs)
        } else if let Some((lhs, rhs)) = raw.split_once('=') {
            (lhs, Op::Eq, rhs)
        } else {
            return Err(format!("clause {raw:?} has no comparison operator"));
        };

        let path = lhs.trim();
        if path.is_empty() {
            return Err(format!("clause {raw:?} has an empty field path"));
        }

        let rhs = rhs.trim();
        let quoted = rhs.len() >= 2 && rhs.starts_with('"') && rhs.ends_with('"');
        let literal = if quoted { &rhs[1..rhs.len() - 1] } else { rhs };
        if literal.is_empty() && !quoted {
            return Err(format!("clause {raw:?} has an empty value"));
        }

        Ok(Self {
            path: path.to_string(),
            op,
            literal: literal.to_string(),
            quoted,
        })
    }

    fn equals(
        &self,
        value: Option<&Value>,
    ) -> bool {
        match value {
            None | Some(Value::Null) => !self.quoted && self.literal == "null",
            Some(Value::String(s)) => *s == self.literal,
            Some(Value::Bool(b)) => !self.quoted && self.literal == b.to_string(),
            Some(Value::Number(n)) => {
                if self.quoted {
                    return false;
                }
                match (n.as_f64(), self.literal.parse::<f64>()) {
                    (Some(actual), Ok(expected)) => actual == expected,
                    _ => false,
                }
            }
            Some(other) => serde_json::to_string(other).is_ok_and(|s| s == self.literal),
        }
    }

    fn matches(
        &self,
        doc: &Value,
    ) -> bool {
        let equal = self.equals(path::get(doc, &self.path));
        match self.op {
            Op::Eq => equal,
            Op::Ne => !equal,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    source: String,
    /// Disjunction of conjunctions
    alternatives: Vec<Vec<Clause>>,
}

impl Predicate {
    pub fn parse(raw: &str) -> Result<Self, String> {
        if raw.trim().is_empty() {
            return Err("empty predicate".to_string());
        }

        let alternatives = raw
            .split("||")
            .map(|alt| alt.split("&&").map(Clause::parse).collect::<Result<Vec<_>, _>>())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            source: raw.trim().to_string(),
            alternatives,
        })
    }

    pub fn matches(
        &self,
        doc: &Value,
    ) -> bool {
        self.alternatives
            .iter()
            .any(|clauses| clauses.iter().all(|c| c.matches(doc)))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for Predicate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Predicate {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.source)
    }
}
