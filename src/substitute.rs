//! Placeholder substitution against one variable row.
//!
//! Templates address row columns as `{{row.column}}`. Substitution is
//! literal text replacement; values are never quoted, escaped, or coerced.
//! The lenient policy (the default) leaves an unmatched placeholder in the
//! request verbatim so one bad CSV column cannot halt a whole run; the
//! strict policy fails the single attempt instead.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use reqwest::Method;
use std::str::FromStr;
use thiserror::Error;

use crate::data_source::VariableRow;
use crate::template::RequestTemplate;

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}").unwrap();
}

/// Placeholders are namespaced; only this namespace maps to row columns.
const ROW_PREFIX: &str = "row.";

/// Per-attempt substitution failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubstituteError {
    #[error("no value for placeholder '{placeholder}'")]
    MissingVariable { placeholder: String },

    #[error("URL is empty after substitution")]
    EmptyUrl,
}

/// What to do when a placeholder has no matching row column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubstitutionPolicy {
    /// Leave the placeholder text in place and keep going.
    #[default]
    Lenient,

    /// Fail the attempt without sending anything.
    Strict,
}

impl FromStr for SubstitutionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(SubstitutionPolicy::Lenient),
            "strict" => Ok(SubstitutionPolicy::Strict),
            other => Err(format!(
                "Unknown substitution policy: '{}'. Use 'lenient' or 'strict'.",
                other
            )),
        }
    }
}

/// A template with every placeholder resolved (or intentionally left
/// literal under the lenient policy). Built once, consumed by exactly one
/// request attempt.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    /// Placeholder names left literal under the lenient policy.
    pub unresolved: Vec<String>,
}

/// Resolves templates against rows under a fixed policy.
#[derive(Debug, Clone, Copy)]
pub struct VariableSubstitutor {
    policy: SubstitutionPolicy,
}

impl VariableSubstitutor {
    pub fn new(policy: SubstitutionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> SubstitutionPolicy {
        self.policy
    }

    /// Resolve one template against one row.
    ///
    /// Substitutes the URL, every header value, and the body. The URL must
    /// be non-empty once substituted; header names are not substituted.
    ///
    /// # Arguments
    /// * `template` - The parsed template, placeholders intact
    /// * `row` - The current iteration's variable row
    ///
    /// # Returns
    /// The resolved request, or the failure that aborts this attempt
    pub fn resolve(
        &self,
        template: &RequestTemplate,
        row: &VariableRow,
    ) -> Result<ResolvedRequest, SubstituteError> {
        let mut unresolved = Vec::new();

        let url = self.substitute_text(&template.url, row, &mut unresolved)?;
        if url.trim().is_empty() {
            return Err(SubstituteError::EmptyUrl);
        }

        let mut headers = Vec::with_capacity(template.headers.len());
        for (name, value) in &template.headers {
            let value = self.substitute_text(value, row, &mut unresolved)?;
            headers.push((name.clone(), value));
        }

        let body = match &template.body {
            Some(text) => Some(self.substitute_text(text, row, &mut unresolved)?),
            None => None,
        };

        Ok(ResolvedRequest {
            method: template.method.clone(),
            url,
            headers,
            body,
            unresolved,
        })
    }

    fn substitute_text(
        &self,
        text: &str,
        row: &VariableRow,
        unresolved: &mut Vec<String>,
    ) -> Result<String, SubstituteError> {
        // The replace_all closure cannot return early, so a strict-policy
        // miss is carried out through this slot.
        let mut missing: Option<String> = None;

        let replaced = PLACEHOLDER.replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            match lookup(row, name) {
                Some(value) => value.to_string(),
                None => {
                    match self.policy {
                        SubstitutionPolicy::Strict => {
                            if missing.is_none() {
                                missing = Some(name.to_string());
                            }
                        }
                        SubstitutionPolicy::Lenient => unresolved.push(name.to_string()),
                    }
                    caps[0].to_string()
                }
            }
        });

        match missing {
            Some(placeholder) => Err(SubstituteError::MissingVariable { placeholder }),
            None => Ok(replaced.into_owned()),
        }
    }
}

fn lookup<'a>(row: &'a VariableRow, name: &str) -> Option<&'a str> {
    name.strip_prefix(ROW_PREFIX).and_then(|column| row.get(column))
}
