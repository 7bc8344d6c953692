//! Route file validation with detailed error reporting.
//!
//! The [`validate`] function checks a parsed [`RoutesFile`] for structural
//! errors such as invalid prefixes, duplicate prefixes and malformed
//! backend addresses. Returns a list of [`ValidationError`] values with
//! per-field suggestions.

use super::model::RoutesFile;
use crate::balancer::Backend;
use crate::error::ValidationError;

/// Validate a single route prefix. Returns `Ok(())` or a human-readable error.
pub fn validate_prefix(prefix: &str) -> Result<(), String> {
    if prefix.is_empty() {
        return Err("prefix cannot be empty".into());
    }
    if !prefix.starts_with('/') {
        return Err(format!(
            "prefix must start with '/' (did you mean '/{prefix}'?)"
        ));
    }
    Ok(())
}

/// Validate a single backend address. Returns `Ok(())` or a human-readable error.
pub fn validate_backend_address(address: &str) -> Result<(), String> {
    Backend::parse(address).map(|_| ())
}

pub fn validate(routes: &RoutesFile) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if routes.routes.is_empty() {
        errors.push(ValidationError {
            route: "(root)".into(),
            field: "routes".into(),
            message: "at least one route must be defined".into(),
            suggestion: None,
        });
        return Err(errors);
    }

    let mut seen_prefixes = std::collections::HashSet::new();

    for (i, route) in routes.routes.iter().enumerate() {
        let route_id = if route.prefix.is_empty() {
            format!("routes[{i}]")
        } else {
            route.prefix.clone()
        };

        if let Err(msg) = validate_prefix(&route.prefix) {
            errors.push(ValidationError {
                route: route_id.clone(),
                field: "path".into(),
                message: msg,
                suggestion: if !route.prefix.is_empty() && !route.prefix.starts_with('/') {
                    Some(format!("did you mean '/{}'?", route.prefix))
                } else {
                    None
                },
            });
        }

        if !seen_prefixes.insert(&route.prefix) {
            errors.push(ValidationError {
                route: route_id.clone(),
                field: "path".into(),
                message: "duplicate route prefix".into(),
                suggestion: Some("later entries replace earlier ones; merge the backend lists".into()),
            });
        }

        if route.backends.is_empty() {
            errors.push(ValidationError {
                route: route_id.clone(),
                field: "backends".into(),
                message: "at least one backend must be defined".into(),
                suggestion: None,
            });
        }

        for backend in &route.backends {
            if let Err(msg) = validate_backend_address(backend) {
                errors.push(ValidationError {
                    route: route_id.clone(),
                    field: "backends".into(),
                    message: msg,
                    suggestion: None,
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[must_use]
pub fn format_validation_report(path: &str, routes: &RoutesFile) -> String {
    let mut lines = vec![format!(
        "  {} routes, {} backends\n",
        routes.routes.len(),
        routes.total_backends()
    )];

    for route in &routes.routes {
        lines.push(format!(
            "  {}  -> {} backends",
            route.prefix,
            route.backends.len()
        ));
        for backend in &route.backends {
            lines.push(format!("    {backend}"));
        }
    }

    format!("{} is valid\n{}", path, lines.join("\n"))
}
