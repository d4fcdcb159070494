// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use anyhow::{anyhow, bail};

/// The literal result carried by a recorded operation.
///
/// The set of traced numeric types is small and fixed, so this is a closed variant
/// rather than an open trait.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Scalar(f64),
    Vector([f64; 3]),
    /// Angle as a fraction of a full turn
    Angle(f64),
    Bool(bool),
    Rgb(u8, u8, u8),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric components, used for value-range reporting.
    /// Booleans have no meaningful range and yield nothing.
    pub fn components(&self) -> Vec<f64> {
        match self {
            Value::Scalar(v) | Value::Angle(v) => vec![*v],
            Value::Vector(v) => v.to_vec(),
            Value::Rgb(r, g, b) => vec![*r as f64, *g as f64, *b as f64],
            Value::Bool(_) => vec![],
        }
    }

    /// Bitwise equality of the payload: NaN is identical to itself, `0` and `-0` differ.
    pub fn identical(&self, other: &Value) -> bool {
        let bits = |v: &Value| v.components().into_iter().map(f64::to_bits).collect::<Vec<_>>();
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            _ => self.same_shape(other) && bits(self) == bits(other),
        }
    }

    /// Same variant, ignoring the payload.
    pub fn same_shape(&self, other: &Value) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Scalar(v) => write!(f, "{}", v),
            Value::Vector([a, b, c]) => write!(f, "({} {} {})", a, b, c),
            Value::Angle(turns) => write!(f, "{}tau", turns),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Rgb(r, g, b) => write!(f, "#{:02x}{:02x}{:02x}", r, g, b),
        }
    }
}

impl FromStr for Value {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "true" => return Ok(Value::Bool(true)),
            "false" => return Ok(Value::Bool(false)),
            _ => {}
        }
        if let Some(hex) = s.strip_prefix('#') {
            if hex.len() != 6 {
                bail!("color literal `{}` must have six hex digits", s);
            }
            let channel = |i: usize| {
                u8::from_str_radix(&hex[i..i + 2], 16)
                    .map_err(|e| anyhow!("bad color literal `{}`: {}", s, e))
            };
            return Ok(Value::Rgb(channel(0)?, channel(2)?, channel(4)?));
        }
        if let Some(inner) = s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
            let parts = inner
                .split_whitespace()
                .map(|p| p.parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| anyhow!("bad vector literal `{}`: {}", s, e))?;
            let [a, b, c] = parts[..] else {
                bail!("vector literal `{}` must have three components", s);
            };
            return Ok(Value::Vector([a, b, c]));
        }
        if let Some(turns) = s.strip_suffix("tau") {
            let turns = turns
                .parse::<f64>()
                .map_err(|e| anyhow!("bad angle literal `{}`: {}", s, e))?;
            return Ok(Value::Angle(turns));
        }
        s.parse::<f64>()
            .map(Value::Scalar)
            .map_err(|e| anyhow!("bad scalar literal `{}`: {}", s, e))
    }
}
