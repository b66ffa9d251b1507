//! Import-dependency expansion

use std::collections::{BTreeSet, HashSet, VecDeque};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{clamp_depth, Graph, DEFAULT_MAX_DEPTH, DEFAULT_MAX_FILES};
use crate::types::RelationshipKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyDirection {
    Seed,
    /// Reached by following an import
    Imports,
    /// Reached because it imports a file already in the set
    ImportedBy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyConfig {
    pub max_depth: u32,
    pub max_files: usize,
    pub include_importers: bool,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_files: DEFAULT_MAX_FILES,
            include_importers: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandedFile {
    pub path: String,
    pub depth: u32,
    /// The file this one was reached from; `None` for seeds
    pub via: Option<String>,
    pub direction: DependencyDirection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyExpansion {
    /// Seeds first, then breadth-first order
    pub files: Vec<ExpandedFile>,
    pub truncated: bool,
}

impl<'a> Graph<'a> {
    /// Breadth-first walk over resolved imports from `seeds`
    pub fn expand_with_dependencies(
        &self,
        seeds: &[String],
        config: &DependencyConfig,
    ) -> Result<DependencyExpansion> {
        let max_depth = clamp_depth(config.max_depth);
        let max_files = config.max_files.max(1);

        let mut expansion = DependencyExpansion::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(String, u32)> = VecDeque::new();

        for seed in seeds {
            if !visited.insert(seed.clone()) {
                continue;
            }
            if expansion.files.len() >= max_files {
                expansion.truncated = true;
                break;
            }
            expansion.files.push(ExpandedFile {
                path: seed.clone(),
                depth: 0,
                via: None,
                direction: DependencyDirection::Seed,
            });
            queue.push_back((seed.clone(), 0));
        }

        'walk: while let Some((path, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for (next, direction) in self.import_neighbors(&path, config.include_importers)? {
                if visited.contains(&next) {
                    continue;
                }
                if expansion.files.len() >= max_files {
                    expansion.truncated = true;
                    break 'walk;
                }
                visited.insert(next.clone());
                expansion.files.push(ExpandedFile {
                    path: next.clone(),
                    depth: depth + 1,
                    via: Some(path.clone()),
                    direction,
                });
                queue.push_back((next, depth + 1));
            }
        }

        if expansion.truncated {
            debug!(max_files, "dependency expansion truncated at file cap");
        }
        Ok(expansion)
    }

    /// Files `path` imports, then (optionally) files importing it, each sorted
    fn import_neighbors(
        &self,
        path: &str,
        include_importers: bool,
    ) -> Result<Vec<(String, DependencyDirection)>> {
        let imports: BTreeSet<String> = self
            .db
            .relationships_from(path, RelationshipKind::Import)?
            .into_iter()
            .filter_map(|r| r.target_file)
            .filter(|target| target != path)
            .collect();
        let mut neighbors: Vec<(String, DependencyDirection)> = imports
            .into_iter()
            .map(|p| (p, DependencyDirection::Imports))
            .collect();

        if include_importers {
            let importers: BTreeSet<String> = self
                .db
                .relationships_into(path, RelationshipKind::Import)?
                .into_iter()
                .map(|r| r.source_file)
                .filter(|source| source != path)
                .collect();
            neighbors.extend(importers.into_iter().map(|p| (p, DependencyDirection::ImportedBy)));
        }
        Ok(neighbors)
    }
}
