// crates/witness-policy/src/rules.rs
// ============================================================================
// Module: Rule Evaluation
// Description: Embedded rule modules evaluated over attestation payloads.
// Purpose: Collect deny reasons from Rego modules attached to a required
//          attestation.
// Dependencies: regorus, serde_json
// ============================================================================

//! ## Overview
//! The verifier consumes rules only through [`RuleEvaluator`]:
//! `evaluate(modules, document) -> deny reasons`. [`RegoRuleEvaluator`] loads
//! every module into one engine, sets the attestation payload as `input`, and
//! queries `data.<package>.deny` once per distinct package. A `deny` rule
//! must yield a set or array of strings; an undefined `deny` yields nothing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use regorus::Engine;
use serde_json::Value;

use crate::error::PolicyError;
use crate::model::RegoModule;

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Rule runtime seam.
pub trait RuleEvaluator: Send + Sync {
    /// Parses and loads modules without evaluating them.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Rules`] naming the first module that fails.
    fn compile(&self, modules: &[RegoModule]) -> Result<(), PolicyError>;

    /// Evaluates modules against a document and returns deny reasons.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Rules`] when a module fails to load or a `deny`
    /// result has the wrong shape.
    fn evaluate(
        &self,
        modules: &[RegoModule],
        document: &Value,
    ) -> Result<Vec<String>, PolicyError>;
}

// ============================================================================
// SECTION: Rego Evaluator
// ============================================================================

/// [`RuleEvaluator`] backed by the regorus interpreter.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegoRuleEvaluator;

impl RegoRuleEvaluator {
    /// Loads modules into a fresh engine and returns their packages in first
    /// occurrence order.
    fn load(modules: &[RegoModule]) -> Result<(Engine, Vec<String>), PolicyError> {
        let mut engine = Engine::new();
        let mut packages = Vec::new();
        let mut seen = BTreeSet::new();
        for module in modules {
            let source = String::from_utf8(module.module.clone())
                .map_err(|err| PolicyError::Rules(format!("module {}: {err}", module.name)))?;
            let package = package_path(&source).ok_or_else(|| {
                PolicyError::Rules(format!("module {}: missing package", module.name))
            })?;
            engine
                .add_policy(module.name.clone(), source)
                .map_err(|err| PolicyError::Rules(format!("module {}: {err}", module.name)))?;
            if seen.insert(package.clone()) {
                packages.push(package);
            }
        }
        Ok((engine, packages))
    }
}

impl RuleEvaluator for RegoRuleEvaluator {
    fn compile(&self, modules: &[RegoModule]) -> Result<(), PolicyError> {
        Self::load(modules).map(|_| ())
    }

    fn evaluate(
        &self,
        modules: &[RegoModule],
        document: &Value,
    ) -> Result<Vec<String>, PolicyError> {
        if modules.is_empty() {
            return Ok(Vec::new());
        }
        let (mut engine, packages) = Self::load(modules)?;
        let input = regorus::Value::from_json_str(&document.to_string())
            .map_err(|err| PolicyError::Rules(format!("input: {err}")))?;
        engine.set_input(input);

        let mut reasons = Vec::new();
        for package in packages {
            let results = engine
                .eval_query(format!("data.{package}.deny"), false)
                .map_err(|err| PolicyError::Rules(format!("package {package}: {err}")))?;
            for result in &results.result {
                for expression in &result.expressions {
                    collect_reasons(&package, &expression.value, &mut reasons)?;
                }
            }
        }
        Ok(reasons)
    }
}

/// Appends the strings of a `deny` value.
fn collect_reasons(
    package: &str,
    value: &regorus::Value,
    reasons: &mut Vec<String>,
) -> Result<(), PolicyError> {
    let items: Vec<&regorus::Value> = match value {
        regorus::Value::Undefined | regorus::Value::Null => return Ok(()),
        regorus::Value::Array(items) => items.iter().collect(),
        regorus::Value::Set(items) => items.iter().collect(),
        _ => {
            return Err(PolicyError::Rules(format!(
                "package {package}: deny must be a set or array of strings"
            )));
        }
    };
    for item in items {
        let regorus::Value::String(reason) = item else {
            return Err(PolicyError::Rules(format!(
                "package {package}: deny reasons must be strings"
            )));
        };
        reasons.push(reason.to_string());
    }
    Ok(())
}

/// Returns the dotted package path declared by a module.
#[must_use]
pub fn package_path(source: &str) -> Option<String> {
    source
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .find_map(|line| line.strip_prefix("package "))
        .map(|rest| rest.trim().trim_end_matches(';').to_string())
        .filter(|package| !package.is_empty())
}
