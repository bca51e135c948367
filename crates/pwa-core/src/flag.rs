//! Objective call flags and per-event data kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, PwaError};

/// Flag passed with every objective call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FcnFlag {
    /// Value only.
    Value,
    /// First call of a minimization.
    Setup,
    /// Value and gradient.
    Gradient,
    /// Reset between iterations.
    Reset,
}

impl FcnFlag {
    /// Returns `true` when the caller expects a gradient back.
    pub fn wants_gradient(self) -> bool {
        matches!(self, FcnFlag::Gradient)
    }

    /// Wire value of the flag.
    pub fn code(self) -> i32 {
        match self {
            FcnFlag::Value => 0,
            FcnFlag::Setup => 1,
            FcnFlag::Gradient => 2,
            FcnFlag::Reset => 666,
        }
    }
}

impl TryFrom<i32> for FcnFlag {
    type Error = PwaError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(FcnFlag::Value),
            1 => Ok(FcnFlag::Setup),
            2 => Ok(FcnFlag::Gradient),
            666 => Ok(FcnFlag::Reset),
            other => Err(PwaError::Protocol(
                ErrorInfo::new("fcn-flag", "unknown objective flag")
                    .with_context("flag", other.to_string()),
            )),
        }
    }
}

/// Which per-event sample a dataset loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataKind {
    /// Measured events.
    Data,
    /// Accepted Monte Carlo.
    Acc,
    /// Generated Monte Carlo.
    Raw,
}

impl DataKind {
    /// Directory name used for this kind under a bin directory.
    pub fn as_str(self) -> &'static str {
        match self {
            DataKind::Data => "data",
            DataKind::Acc => "acc",
            DataKind::Raw => "raw",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKind {
    type Err = PwaError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "data" => Ok(DataKind::Data),
            "acc" => Ok(DataKind::Acc),
            "raw" => Ok(DataKind::Raw),
            other => Err(PwaError::Config(
                ErrorInfo::new("data-kind", "expected data, acc or raw")
                    .with_context("kind", other),
            )),
        }
    }
}
