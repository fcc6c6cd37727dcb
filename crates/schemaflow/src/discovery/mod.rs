//! Discovery and ordering of change set definitions.
//!
//! An external collaborator supplies change set definitions as a tree of
//! nested namespaces (however they were authored). Discovery walks that
//! tree and produces one deterministic, total order of [`ChangeSet`]s with
//! no duplicate identities.
//!
//! # Ordering policy
//!
//! The traversal is depth-first with a fixed, documented policy:
//!
//! 1. within a namespace, definitions are visited first, ordered
//!    lexicographically (byte order) by declared name;
//! 2. child namespaces are visited after all sibling definitions,
//!    themselves ordered lexicographically by namespace name.
//!
//! Re-running discovery against unchanged sources always yields the same
//! order. The policy is part of the engine's compatibility contract and
//! must stay stable across versions: ledger ordinals assigned under it
//! remain meaningful for every later run.

use tracing::debug;

use crate::change::{ChangeSet, ChangeUnit};
use crate::error::{MigrateError, Result};

/// One authored change set definition: a declared name plus its ordered
/// change units. The surface syntax that produced it is out of scope.
#[derive(Debug, Clone)]
pub struct ChangeSetDef {
    /// Declared name, unique within its namespace.
    pub name: String,

    /// Ordered change units.
    pub units: Vec<ChangeUnit>,
}

impl ChangeSetDef {
    /// Create a definition.
    pub fn new(name: impl Into<String>, units: Vec<ChangeUnit>) -> Self {
        Self {
            name: name.into(),
            units,
        }
    }
}

/// A node in the definition hierarchy.
///
/// The root's name may be empty, in which case it contributes no identity
/// segment.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    /// Namespace name (one identity path segment).
    pub name: String,

    /// Definitions declared directly in this namespace.
    pub change_sets: Vec<ChangeSetDef>,

    /// Nested child namespaces.
    pub children: Vec<Namespace>,
}

impl Namespace {
    /// Create an empty namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            change_sets: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Add a definition, builder style.
    pub fn with_change_set(mut self, def: ChangeSetDef) -> Self {
        self.change_sets.push(def);
        self
    }

    /// Add a child namespace, builder style.
    pub fn with_child(mut self, child: Namespace) -> Self {
        self.children.push(child);
        self
    }
}

/// Walk the hierarchy and produce the ordered change set sequence.
///
/// Fails with [`MigrateError::DuplicateIdentity`] if two definitions
/// resolve to the same identity, and with
/// [`MigrateError::MalformedDefinition`] if a definition has an empty name
/// or any of its units fails validation.
pub fn discover(root: &Namespace) -> Result<Vec<ChangeSet>> {
    let mut out = Vec::new();
    let mut seen = std::collections::HashSet::new();
    walk(root, &mut Vec::new(), &mut out, &mut seen)?;
    debug!(count = out.len(), "discovery complete");
    Ok(out)
}

fn walk(
    ns: &Namespace,
    path: &mut Vec<String>,
    out: &mut Vec<ChangeSet>,
    seen: &mut std::collections::HashSet<String>,
) -> Result<()> {
    if !ns.name.is_empty() {
        path.push(ns.name.clone());
    }

    // Definitions before child namespaces, both lexicographic.
    let mut defs: Vec<&ChangeSetDef> = ns.change_sets.iter().collect();
    defs.sort_by(|a, b| a.name.cmp(&b.name));

    for def in defs {
        let identity = identity_for(path, &def.name);
        if def.name.is_empty() {
            return Err(MigrateError::MalformedDefinition {
                identity,
                reason: "definition has an empty name".into(),
            });
        }
        for unit in &def.units {
            if let Err(reason) = unit.validate() {
                return Err(MigrateError::MalformedDefinition { identity, reason });
            }
        }
        if !seen.insert(identity.clone()) {
            return Err(MigrateError::DuplicateIdentity { identity });
        }
        out.push(ChangeSet::new(identity, def.units.clone()));
    }

    let mut children: Vec<&Namespace> = ns.children.iter().collect();
    children.sort_by(|a, b| a.name.cmp(&b.name));

    for child in children {
        walk(child, path, out, seen)?;
    }

    if !ns.name.is_empty() {
        path.pop();
    }
    Ok(())
}

fn identity_for(path: &[String], name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", path.join("/"), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, Table, TypeToken};

    fn def(name: &str) -> ChangeSetDef {
        ChangeSetDef::new(
            name,
            vec![ChangeUnit::CreateTable {
                table: Table::new(
                    format!("t_{}", name),
                    vec![Column::new("id", TypeToken::BigInt)],
                ),
            }],
        )
    }

    fn sample_tree() -> Namespace {
        Namespace::new("app")
            .with_change_set(def("Zeta"))
            .with_change_set(def("Alpha"))
            .with_child(
                Namespace::new("billing")
                    .with_change_set(def("Invoices"))
                    .with_child(Namespace::new("archive").with_change_set(def("Old"))),
            )
            .with_child(Namespace::new("auth").with_change_set(def("Users")))
    }

    fn identities(sets: &[ChangeSet]) -> Vec<String> {
        sets.iter().map(|s| s.identity().to_string()).collect()
    }

    #[test]
    fn test_order_entries_then_children_lexicographic() {
        let sets = discover(&sample_tree()).unwrap();
        assert_eq!(
            identities(&sets),
            vec![
                "app/Alpha",
                "app/Zeta",
                "app/auth/Users",
                "app/billing/Invoices",
                "app/billing/archive/Old",
            ]
        );
    }

    #[test]
    fn test_discovery_is_deterministic() {
        let tree = sample_tree();
        let first = identities(&discover(&tree).unwrap());
        let second = identities(&discover(&tree).unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn test_root_with_empty_name_contributes_no_segment() {
        let root = Namespace::default().with_change_set(def("Solo"));
        let sets = discover(&root).unwrap();
        assert_eq!(sets[0].identity(), "Solo");
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let root = Namespace::new("app")
            .with_change_set(def("Same"))
            .with_change_set(def("Same"));
        let err = discover(&root).unwrap_err();
        match err {
            MigrateError::DuplicateIdentity { identity } => {
                assert_eq!(identity, "app/Same");
            }
            other => panic!("expected DuplicateIdentity, got {other}"),
        }
    }

    #[test]
    fn test_malformed_definition_rejected_before_any_output() {
        let mut table = Table::new("t", vec![Column::new("a", TypeToken::Integer)]);
        table
            .constraints
            .push(crate::model::Constraint::unique(vec!["missing".into()]));
        let root = Namespace::new("app").with_change_set(ChangeSetDef::new(
            "Broken",
            vec![ChangeUnit::CreateTable { table }],
        ));
        let err = discover(&root).unwrap_err();
        match err {
            MigrateError::MalformedDefinition { identity, reason } => {
                assert_eq!(identity, "app/Broken");
                assert!(reason.contains("undeclared column"));
            }
            other => panic!("expected MalformedDefinition, got {other}"),
        }
    }

    #[test]
    fn test_empty_definition_name_rejected() {
        let root = Namespace::new("app").with_change_set(ChangeSetDef::new("", vec![]));
        assert!(matches!(
            discover(&root),
            Err(MigrateError::MalformedDefinition { .. })
        ));
    }

    #[test]
    fn test_same_name_in_different_namespaces_allowed() {
        let root = Namespace::new("app")
            .with_child(Namespace::new("a").with_change_set(def("Init")))
            .with_child(Namespace::new("b").with_change_set(def("Init")));
        let sets = discover(&root).unwrap();
        assert_eq!(identities(&sets), vec!["app/a/Init", "app/b/Init"]);
    }
}
