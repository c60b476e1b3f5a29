//! Dependency Graph
//!
//! Links artifacts into a directed graph keyed by artifact ID
//! (`"{path}:{type}:{name}:{start_line}"`).
//!
//! Edges: class → containing file, class → same-file base class, function → containing file,
//! method → enclosing class. Targets that cannot be resolved in the same file are dropped
//! silently. Cycles are allowed.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use super::artifact::{ArtifactKind, ArtifactType, CodeArtifact};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, source: impl Into<String>, target: impl Into<String>) {
        self.edges
            .entry(source.into())
            .or_default()
            .insert(target.into());
    }

    /// Artifacts the given artifact depends on (empty when it has no edges)
    pub fn dependencies(&self, artifact_id: &str) -> impl Iterator<Item = &str> {
        self.edges
            .get(artifact_id)
            .into_iter()
            .flat_map(|targets| targets.iter().map(String::as_str))
    }

    /// Source → targets, sorted by source with deduplicated, sorted targets
    pub fn edges(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.edges
    }

    /// Flattened `(source, target)` pairs in `(source, target)` order
    pub fn edge_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.edges.iter().flat_map(|(source, targets)| {
            targets
                .iter()
                .map(move |target| (source.as_str(), target.as_str()))
        })
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Build the graph over the flat artifact list of a repository.
    pub fn build(artifacts: &[CodeArtifact]) -> Self {
        let mut file_ids: HashMap<&str, String> = HashMap::new();
        // (path, class name) → id of the first definition in the file
        let mut class_ids: HashMap<(&str, &str), (u32, String)> = HashMap::new();

        for artifact in artifacts {
            match artifact.artifact_type {
                ArtifactType::File => {
                    file_ids.entry(&artifact.path).or_insert_with(|| artifact.id());
                }
                ArtifactType::Class => {
                    let key = (artifact.path.as_str(), artifact.name.as_str());
                    let candidate = (artifact.start_line, artifact.id());
                    class_ids
                        .entry(key)
                        .and_modify(|current| {
                            if candidate < *current {
                                *current = candidate.clone();
                            }
                        })
                        .or_insert(candidate);
                }
                ArtifactType::Function => {}
            }
        }

        let resolve_class = |path: &str, name: &str| -> Option<String> {
            class_ids.get(&(path, name)).map(|(_, id)| id.clone())
        };

        let mut graph = Self::new();
        for artifact in artifacts {
            let source = artifact.id();
            match &artifact.kind {
                ArtifactKind::File(_) => {}
                ArtifactKind::Class(details) => {
                    if let Some(file_id) = file_ids.get(artifact.path.as_str()) {
                        graph.add_edge(source.clone(), file_id.clone());
                    }
                    for base in &details.base_classes {
                        if let Some(base_id) = resolve_class(&artifact.path, base) {
                            graph.add_edge(source.clone(), base_id);
                        }
                    }
                }
                ArtifactKind::Function(_) => {
                    if let Some(file_id) = file_ids.get(artifact.path.as_str()) {
                        graph.add_edge(source.clone(), file_id.clone());
                    }
                    if let Some(class_name) = artifact.enclosing_class()
                        && let Some(class_id) = resolve_class(&artifact.path, class_name)
                    {
                        graph.add_edge(source.clone(), class_id);
                    }
                }
            }
        }

        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::artifact::{
        CLASS_METADATA_KEY, ClassDetails, FileDetails, FunctionDetails,
    };

    fn file(path: &str) -> CodeArtifact {
        CodeArtifact::file(
            path,
            1,
            40,
            FileDetails {
                language: "python".to_string(),
                line_count: 40,
                byte_size: 800,
            },
        )
        .unwrap()
    }

    fn class(path: &str, name: &str, line: u32, bases: &[&str]) -> CodeArtifact {
        CodeArtifact::class(
            path,
            name,
            line,
            line + 5,
            ClassDetails {
                methods: BTreeSet::new(),
                base_classes: bases.iter().map(|s| s.to_string()).collect(),
            },
        )
        .unwrap()
    }

    fn method(path: &str, name: &str, line: u32, class_name: &str) -> CodeArtifact {
        CodeArtifact::function(path, name, line, line + 1, FunctionDetails::default())
            .unwrap()
            .with_metadata(CLASS_METADATA_KEY, class_name)
    }

    #[test]
    fn test_class_and_method_edges() {
        let artifacts = vec![
            file("a.py"),
            class("a.py", "Base", 1, &[]),
            class("a.py", "Child", 10, &["Base", "object"]),
            method("a.py", "run", 11, "Child"),
        ];
        let graph = DependencyGraph::build(&artifacts);

        let child: Vec<&str> = graph.dependencies("a.py:class:Child:10").collect();
        assert_eq!(child, vec!["a.py:class:Base:1", "a.py:file:a.py:1"]);

        let run: Vec<&str> = graph.dependencies("a.py:function:run:11").collect();
        assert_eq!(run, vec!["a.py:class:Child:10", "a.py:file:a.py:1"]);

        assert!(graph.dependencies("a.py:file:a.py:1").next().is_none());
        assert_eq!(graph.edge_count(), 5);
    }

    #[test]
    fn test_no_cross_file_base_class_edge() {
        let artifacts = vec![
            file("a.py"),
            file("b.py"),
            class("a.py", "Base", 1, &[]),
            class("b.py", "Child", 1, &["Base"]),
        ];
        let graph = DependencyGraph::build(&artifacts);

        let child: Vec<&str> = graph.dependencies("b.py:class:Child:1").collect();
        assert_eq!(child, vec!["b.py:file:b.py:1"]);
    }

    #[test]
    fn test_unresolved_targets_are_dropped() {
        // Function whose file artifact is absent and whose class is unknown
        let artifacts = vec![method("orphan.py", "f", 3, "Missing")];
        let graph = DependencyGraph::build(&artifacts);
        assert!(graph.is_empty());
    }

    #[test]
    fn test_duplicate_class_names_resolve_to_first_definition() {
        let artifacts = vec![
            file("a.py"),
            class("a.py", "Widget", 30, &[]),
            class("a.py", "Widget", 5, &[]),
            class("a.py", "Fancy", 50, &["Widget"]),
        ];
        let graph = DependencyGraph::build(&artifacts);
        let fancy: Vec<&str> = graph.dependencies("a.py:class:Fancy:50").collect();
        assert!(fancy.contains(&"a.py:class:Widget:5"));
        assert!(!fancy.contains(&"a.py:class:Widget:30"));
    }

    #[test]
    fn test_edge_pairs_sorted() {
        let artifacts = vec![
            file("b.py"),
            file("a.py"),
            class("b.py", "B", 1, &[]),
            class("a.py", "A", 1, &[]),
        ];
        let graph = DependencyGraph::build(&artifacts);
        let pairs: Vec<(&str, &str)> = graph.edge_pairs().collect();
        assert_eq!(
            pairs,
            vec![
                ("a.py:class:A:1", "a.py:file:a.py:1"),
                ("b.py:class:B:1", "b.py:file:b.py:1"),
            ]
        );
    }

    #[test]
    fn test_self_inheritance_cycle_is_tolerated() {
        let artifacts = vec![file("a.py"), class("a.py", "Node", 1, &["Node"])];
        let graph = DependencyGraph::build(&artifacts);
        let deps: Vec<&str> = graph.dependencies("a.py:class:Node:1").collect();
        assert!(deps.contains(&"a.py:class:Node:1"));
    }
}
