//! Validation of service definitions before they are added to an app.
//!
//! Everything the orchestrator later relies on is enforced here: DNS-safe
//! unique names, supported sources, and an acyclic dependency graph.

use std::collections::{HashMap, HashSet};

use keel_store::{DatabaseSpec, ServiceConfig, ServiceSource};

use crate::error::{ControlError, Result};

/// Maximum length of a DNS label.
pub const MAX_SERVICE_NAME_LEN: usize = 63;

/// Supported database engines, their versions, and the default version.
const DATABASE_ENGINES: &[(&str, &[&str], &str)] = &[
    ("postgres", &["14", "15", "16"], "16"),
    ("mysql", &["8.0", "8.4"], "8.4"),
    ("mariadb", &["10.11", "11.4"], "11.4"),
    ("mongodb", &["6.0", "7.0"], "7.0"),
    ("redis", &["7.0", "7.2"], "7.2"),
    ("sqlite", &["3"], "3"),
];

/// Validate a new service against the services already declared by its app.
///
/// # Errors
///
/// Returns `ControlError::ServiceExists` for a duplicate name and
/// `ControlError::Validation` for any other problem.
pub fn validate_new_service(existing: &[ServiceConfig], service: &ServiceConfig) -> Result<()> {
    validate_service_name(&service.name)?;

    if existing.iter().any(|s| s.name == service.name) {
        return Err(ControlError::ServiceExists(service.name.clone()));
    }

    validate_source(&service.source)?;

    if service.replicas == 0 {
        return Err(ControlError::validation("replicas", "replicas must be at least 1"));
    }

    validate_dependencies(existing, &service.name, &service.depends_on)
}

/// Check that a service name is a valid DNS label.
///
/// # Errors
///
/// Returns `ControlError::Validation` describing the first violated rule.
pub fn validate_service_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ControlError::validation("name", "service name is required"));
    }
    if name.len() > MAX_SERVICE_NAME_LEN {
        return Err(ControlError::validation(
            "name",
            format!("service name must be {MAX_SERVICE_NAME_LEN} characters or less"),
        ));
    }
    if name.starts_with('-') {
        return Err(ControlError::validation("name", "service name cannot start with a hyphen"));
    }
    if name.ends_with('-') {
        return Err(ControlError::validation("name", "service name cannot end with a hyphen"));
    }

    let starts_with_letter = name.bytes().next().is_some_and(|b| b.is_ascii_lowercase());
    let valid_chars = name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    if !starts_with_letter || !valid_chars {
        return Err(ControlError::validation(
            "name",
            "service name must be a valid DNS label (lowercase letters, numbers, and hyphens, starting with a letter)",
        ));
    }

    Ok(())
}

fn validate_source(source: &ServiceSource) -> Result<()> {
    match source {
        ServiceSource::Git { git_repo, .. } if git_repo.trim().is_empty() => Err(
            ControlError::validation("git_repo", "git_repo is required for git services"),
        ),
        ServiceSource::Flake { flake_uri } if flake_uri.trim().is_empty() => Err(
            ControlError::validation("flake_uri", "flake_uri is required for flake services"),
        ),
        ServiceSource::Git { .. } | ServiceSource::Flake { .. } => Ok(()),
        ServiceSource::Database { database, .. } => validate_database(database),
        ServiceSource::Image { .. } => Err(ControlError::validation(
            "source_type",
            "image sources are no longer supported for new services; use git, flake or database",
        )),
        ServiceSource::Unknown => Err(ControlError::validation(
            "source_type",
            "source_type must be one of git, flake or database",
        )),
    }
}

/// Check a database descriptor against the supported engines.
///
/// An empty version is accepted and resolves to the engine default.
///
/// # Errors
///
/// Returns `ControlError::Validation` for an unknown engine or version.
pub fn validate_database(database: &DatabaseSpec) -> Result<()> {
    if database.engine.is_empty() {
        return Err(ControlError::validation("database.type", "database type is required"));
    }

    let Some(versions) = supported_versions(&database.engine) else {
        let engines: Vec<&str> = DATABASE_ENGINES.iter().map(|(engine, _, _)| *engine).collect();
        return Err(ControlError::validation(
            "database.type",
            format!(
                "unsupported database type '{}'; supported types are: {}",
                database.engine,
                engines.join(", ")
            ),
        ));
    };

    if database.version.is_empty() || versions.contains(&database.version.as_str()) {
        return Ok(());
    }

    Err(ControlError::validation(
        "database.version",
        format!(
            "unsupported version '{}' for database type '{}'; supported versions are: {}",
            database.version,
            database.engine,
            versions.join(", ")
        ),
    ))
}

/// Versions supported for an engine, or `None` if the engine is unknown.
#[must_use]
pub fn supported_versions(engine: &str) -> Option<&'static [&'static str]> {
    DATABASE_ENGINES
        .iter()
        .find(|(name, _, _)| *name == engine)
        .map(|(_, versions, _)| *versions)
}

/// Default version for an engine, or `None` if the engine is unknown.
#[must_use]
pub fn default_database_version(engine: &str) -> Option<&'static str> {
    DATABASE_ENGINES
        .iter()
        .find(|(name, _, _)| *name == engine)
        .map(|(_, _, default)| *default)
}

/// Reject self-dependencies and dependency cycles.
///
/// The graph is the app's current services with `target`'s dependencies
/// replaced by `new_deps`. Dependencies on names outside the app are ignored.
///
/// # Errors
///
/// Returns `ControlError::Validation` on field `depends_on`, naming the cycle
/// path (e.g. `a -> b -> a`) when one exists.
pub fn validate_dependencies(
    services: &[ServiceConfig],
    target: &str,
    new_deps: &[String],
) -> Result<()> {
    if new_deps.iter().any(|dep| dep == target) {
        return Err(ControlError::validation(
            "depends_on",
            format!("service '{target}' cannot depend on itself"),
        ));
    }

    let mut nodes: Vec<&str> = Vec::with_capacity(services.len() + 1);
    let mut graph: HashMap<&str, &[String]> = HashMap::with_capacity(services.len() + 1);
    for service in services {
        let deps = if service.name == target {
            new_deps
        } else {
            service.depends_on.as_slice()
        };
        if graph.insert(service.name.as_str(), deps).is_none() {
            nodes.push(service.name.as_str());
        }
    }
    if !graph.contains_key(target) {
        graph.insert(target, new_deps);
        nodes.push(target);
    }

    match find_cycle(&nodes, &graph) {
        Some(cycle) => Err(ControlError::validation(
            "depends_on",
            format!("circular dependency detected: {}", cycle.join(" -> ")),
        )),
        None => Ok(()),
    }
}

/// Depth-first search for a cycle, visiting nodes in declaration order.
fn find_cycle<'a>(nodes: &[&'a str], graph: &HashMap<&'a str, &'a [String]>) -> Option<Vec<&'a str>> {
    fn visit<'a>(
        node: &'a str,
        graph: &HashMap<&'a str, &'a [String]>,
        visited: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<&'a str>> {
        visited.insert(node);
        path.push(node);

        for dep in graph.get(node).copied().unwrap_or_default() {
            let Some((&neighbor, _)) = graph.get_key_value(dep.as_str()) else {
                continue;
            };

            if let Some(start) = path.iter().position(|&n| n == neighbor) {
                let mut cycle = path[start..].to_vec();
                cycle.push(neighbor);
                return Some(cycle);
            }
            if !visited.contains(neighbor) {
                if let Some(cycle) = visit(neighbor, graph, visited, path) {
                    return Some(cycle);
                }
            }
        }

        path.pop();
        None
    }

    let mut visited = HashSet::new();
    for &node in nodes {
        if !visited.contains(node) {
            let mut path = Vec::new();
            if let Some(cycle) = visit(node, graph, &mut visited, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git(name: &str, deps: &[&str]) -> ServiceConfig {
        let mut service = ServiceConfig::new(
            name,
            ServiceSource::Git {
                git_repo: format!("https://github.com/acme/{name}"),
                git_ref: None,
                flake_output: None,
            },
        );
        service.depends_on = deps.iter().map(ToString::to_string).collect();
        service
    }

    fn database(engine: &str, version: &str) -> DatabaseSpec {
        DatabaseSpec {
            engine: engine.to_string(),
            version: version.to_string(),
        }
    }

    fn message(result: Result<()>) -> String {
        match result {
            Err(ControlError::Validation { message, .. }) => message,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn accepts_dns_labels() {
        let longest = "a".repeat(63);
        for name in ["a", "api", "api-v2", "db1", longest.as_str()] {
            assert!(validate_service_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_invalid_names() {
        assert_eq!(message(validate_service_name("")), "service name is required");
        assert!(message(validate_service_name(&"a".repeat(64))).contains("63 characters"));
        assert!(message(validate_service_name("-api")).contains("start with a hyphen"));
        assert!(message(validate_service_name("api-")).contains("end with a hyphen"));
        for name in ["Api", "1api", "api_v2", "api.v2"] {
            assert!(message(validate_service_name(name)).contains("DNS label"), "{name}");
        }
    }

    #[test]
    fn rejects_duplicate_names() {
        let existing = vec![git("api", &[])];
        let result = validate_new_service(&existing, &git("api", &[]));
        assert!(matches!(result, Err(ControlError::ServiceExists(name)) if name == "api"));
    }

    #[test]
    fn rejects_image_and_unknown_sources() {
        let image = ServiceConfig::new(
            "web",
            ServiceSource::Image {
                image: "nginx:latest".to_string(),
            },
        );
        assert!(message(validate_new_service(&[], &image)).contains("image sources"));

        let unknown = ServiceConfig::new("web", ServiceSource::Unknown);
        assert!(validate_new_service(&[], &unknown).is_err());
    }

    #[test]
    fn database_engines_and_versions() {
        assert!(validate_database(&database("postgres", "16")).is_ok());
        assert!(validate_database(&database("redis", "")).is_ok());
        assert!(message(validate_database(&database("oracle", "19"))).contains("unsupported database type 'oracle'"));
        assert!(message(validate_database(&database("postgres", "9.6"))).contains("14, 15, 16"));
        assert_eq!(default_database_version("mysql"), Some("8.4"));
        assert_eq!(default_database_version("oracle"), None);
    }

    #[test]
    fn rejects_self_dependency() {
        let result = validate_dependencies(&[], "api", &["api".to_string()]);
        assert_eq!(message(result), "service 'api' cannot depend on itself");
    }

    #[test]
    fn reports_cycle_path() {
        let existing = vec![git("a", &["b"]), git("b", &[])];
        let result = validate_dependencies(&existing, "b", &["a".to_string()]);
        assert_eq!(message(result), "circular dependency detected: a -> b -> a");
    }

    #[test]
    fn new_service_can_close_a_cycle() {
        let existing = vec![git("a", &["c"]), git("b", &["a"])];
        let result = validate_new_service(&existing, &git("c", &["b"]));
        assert_eq!(message(result), "circular dependency detected: a -> c -> b -> a");
    }

    #[test]
    fn acyclic_graphs_and_unknown_dependencies_pass() {
        let existing = vec![git("db", &[]), git("api", &["db"])];
        assert!(validate_new_service(&existing, &git("web", &["api", "db"])).is_ok());
        assert!(validate_new_service(&existing, &git("cron", &["external"])).is_ok());
    }
}
