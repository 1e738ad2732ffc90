//! Introspection & Versioning
//!
//! A catalog of registered host functions and builtin methods, a
//! documentation-coverage summary for host functions, and the version
//! record the runtime reports to hosts on demand.

use serde::Serialize;

use super::context::RuntimeContext;
use super::methods;

#[derive(Debug, Clone, Serialize)]
pub struct ParamInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub has_default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionInfo {
    pub name: String,
    pub params: Vec<ParamInfo>,
    pub description: String,
    #[serde(rename = "returnType")]
    pub return_type: String,
}

/// Registered host functions, sorted by name.
pub fn function_catalog(ctx: &RuntimeContext) -> Vec<FunctionInfo> {
    let mut catalog: Vec<FunctionInfo> = ctx
        .functions()
        .values()
        .map(|f| FunctionInfo {
            name: f.name.clone(),
            params: f
                .params
                .iter()
                .map(|p| ParamInfo {
                    name: p.name.clone(),
                    type_name: p.type_name.clone(),
                    has_default: p.default.is_some(),
                    doc: p.doc.clone(),
                })
                .collect(),
            description: f.description.clone(),
            return_type: f.return_type.clone(),
        })
        .collect();
    catalog.sort_by(|a, b| a.name.cmp(&b.name));
    catalog
}

/// Builtin methods, grouped as `receiver.name` entries.
pub fn builtin_catalog() -> Vec<FunctionInfo> {
    methods::catalog()
        .iter()
        .map(|m| FunctionInfo {
            name: format!("{}.{}", m.receiver, m.name),
            params: m
                .params
                .iter()
                .map(|(name, type_name)| ParamInfo {
                    name: name.to_string(),
                    type_name: type_name.to_string(),
                    has_default: false,
                    doc: None,
                })
                .collect(),
            description: m.description.to_string(),
            return_type: m.return_type.to_string(),
        })
        .collect()
}

/// How much of the registered host surface is documented.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DocsCoverage {
    #[serde(rename = "totalFunctions")]
    pub total_functions: usize,
    #[serde(rename = "documentedFunctions")]
    pub documented_functions: usize,
    #[serde(rename = "totalParams")]
    pub total_params: usize,
    #[serde(rename = "documentedParams")]
    pub documented_params: usize,
}

pub fn docs_coverage(ctx: &RuntimeContext) -> DocsCoverage {
    let mut coverage = DocsCoverage {
        total_functions: 0,
        documented_functions: 0,
        total_params: 0,
        documented_params: 0,
    };
    for f in ctx.functions().values() {
        coverage.total_functions += 1;
        if !f.description.trim().is_empty() {
            coverage.documented_functions += 1;
        }
        for p in &f.params {
            coverage.total_params += 1;
            if p.doc.as_deref().map_or(false, |d| !d.trim().is_empty()) {
                coverage.documented_params += 1;
            }
        }
    }
    coverage
}

/// Build metadata reported to the host.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct VersionInfo {
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<&'static str>,
    #[serde(rename = "builtAt", skip_serializing_if = "Option::is_none")]
    pub built_at: Option<&'static str>,
}

pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("RILL_BUILD_COMMIT"),
        built_at: option_env!("RILL_BUILD_TIME"),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::callable::{host_body, HostFunction, ParamSpec};
    use crate::runtime::context::ContextOptions;
    use crate::runtime::value::Value;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn ctx_with_functions() -> RuntimeContext {
        let body = host_body(|_args| async move { Ok(Value::Null) });
        let mut functions = HashMap::new();
        functions.insert(
            "search".to_string(),
            Arc::new(HostFunction::new(
                "search",
                vec![
                    ParamSpec::new("query", "string").with_doc("the query text"),
                    ParamSpec::new("limit", "number"),
                ],
                "Search the store",
                "list",
                body.clone(),
            )),
        );
        functions.insert(
            "mystery".to_string(),
            Arc::new(HostFunction::new("mystery", vec![], "", "null", body)),
        );
        RuntimeContext::new(ContextOptions { functions, ..Default::default() }).unwrap()
    }

    #[test]
    fn test_catalog_sorted_by_name() {
        let ctx = ctx_with_functions();
        let catalog = function_catalog(&ctx);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[0].name, "mystery");
        assert_eq!(catalog[1].name, "search");
        assert_eq!(catalog[1].params.len(), 2);
        assert_eq!(catalog[1].params[0].doc.as_deref(), Some("the query text"));
    }

    #[test]
    fn test_docs_coverage() {
        let ctx = ctx_with_functions();
        let coverage = docs_coverage(&ctx);
        assert_eq!(coverage.total_functions, 2);
        assert_eq!(coverage.documented_functions, 1);
        assert_eq!(coverage.total_params, 2);
        assert_eq!(coverage.documented_params, 1);
    }

    #[test]
    fn test_version_info_has_semver() {
        let info = version_info();
        assert!(!info.version.is_empty());
        assert_eq!(info.version.split('.').count(), 3);
    }

    #[test]
    fn test_builtin_catalog_includes_core_methods() {
        let catalog = builtin_catalog();
        assert!(catalog.iter().any(|f| f.name == "string.upper"));
        assert!(catalog.iter().any(|f| f.name == "dict.keys"));
    }
}
