// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parameter schemas and their validation.

use area_core::{AreaError, ParamType, Params};
use regex::Regex;
use serde::Serialize;

/// One declared parameter of an action or reaction.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub ty: ParamType,
    pub required: bool,
    pub description: &'static str,
    /// Lower bound for integer parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    /// Upper bound for integer parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    /// Anchored pattern for string parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<&'static str>,
}

impl ParamSpec {
    pub const fn required(name: &'static str, ty: ParamType, description: &'static str) -> Self {
        Self {
            name,
            ty,
            required: true,
            description,
            min: None,
            max: None,
            pattern: None,
        }
    }

    pub const fn optional(name: &'static str, ty: ParamType, description: &'static str) -> Self {
        Self {
            required: false,
            ..Self::required(name, ty, description)
        }
    }

    pub const fn at_least(self, min: i64) -> Self {
        Self {
            min: Some(min),
            ..self
        }
    }

    pub const fn at_most(self, max: i64) -> Self {
        Self {
            max: Some(max),
            ..self
        }
    }

    pub const fn matching(self, pattern: &'static str) -> Self {
        Self {
            pattern: Some(pattern),
            ..self
        }
    }

    fn check(&self, value: &serde_json::Value) -> Result<(), String> {
        if !self.ty.accepts(value) {
            return Err(format!("`{}` must be of type {}", self.name, self.ty));
        }
        if let (Some(min), Some(n)) = (self.min, value.as_i64())
            && n < min
        {
            return Err(format!("`{}` must be at least {min}", self.name));
        }
        // u64 values beyond i64 range are over any bound.
        if let Some(max) = self.max
            && value.is_number()
            && value.as_i64().is_none_or(|n| n > max)
        {
            return Err(format!("`{}` must be at most {max}", self.name));
        }
        if let (Some(pattern), Some(s)) = (self.pattern, value.as_str()) {
            let re = Regex::new(pattern)
                .map_err(|e| format!("`{}` has an invalid pattern: {e}", self.name))?;
            if !re.is_match(s) {
                return Err(format!("`{}` has an invalid format", self.name));
            }
        }
        Ok(())
    }
}

/// How keys that are not declared in the schema are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraKeys {
    /// Kept as-is. Action parameters use extra keys as event filters.
    Allow,
    Reject,
}

/// Validate `params` against `specs`, reporting every problem at once.
///
/// `null` is accepted for optional parameters and treated as absent.
pub fn validate_params(specs: &[ParamSpec], params: &Params, extra: ExtraKeys) -> Result<(), AreaError> {
    let mut problems = Vec::new();
    for spec in specs {
        match params.get(spec.name) {
            None | Some(serde_json::Value::Null) if spec.required => {
                problems.push(format!("missing required parameter `{}`", spec.name));
            }
            None | Some(serde_json::Value::Null) => {}
            Some(value) => {
                if let Err(problem) = spec.check(value) {
                    problems.push(problem);
                }
            }
        }
    }
    if extra == ExtraKeys::Reject {
        for key in params.keys() {
            if !specs.iter().any(|s| s.name == key) {
                problems.push(format!("unknown parameter `{key}`"));
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(AreaError::InvalidParameters(problems.join("; ")))
    }
}
