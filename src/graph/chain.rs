//! Recursive call chains
//!
//! A chain walks callers (up) or callees (down) from one symbol. The walk is
//! an explicit worklist over an arena; each work item carries the symbols on
//! its own root path, which is what breaks cycles. Every completed
//! root-to-leaf path bumps a counter, and once the counter reaches the cap
//! the remaining work is dropped and the result is marked truncated.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{clamp_depth, Graph, DEFAULT_MAX_DEPTH, DEFAULT_MAX_PATHS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainDirection {
    /// Callers of callers
    Up,
    /// Callees of callees
    Down,
    Both,
}

impl ChainDirection {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "up" | "callers" => Some(ChainDirection::Up),
            "down" | "callees" => Some(ChainDirection::Down),
            "both" => Some(ChainDirection::Both),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainDirection::Up => "up",
            ChainDirection::Down => "down",
            ChainDirection::Both => "both",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallChainConfig {
    /// Clamped into `[1, 10]` when the chain runs
    pub max_depth: u32,
    /// Completed root-to-leaf paths before the walk stops
    pub max_paths: usize,
}

impl Default for CallChainConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_paths: DEFAULT_MAX_PATHS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallChainNode {
    pub symbol: String,
    /// File and line of the call edge that reached this node; `None` for the root
    pub file: Option<String>,
    pub line: Option<u32>,
    pub depth: u32,
    pub children: Vec<CallChainNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallChainTree {
    pub direction: ChainDirection,
    pub root: CallChainNode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallChainResult {
    pub symbol: String,
    pub direction: ChainDirection,
    pub max_depth: u32,
    /// One tree per direction; `Both` yields the up tree then the down tree
    pub trees: Vec<CallChainTree>,
    pub paths: usize,
    pub truncated: bool,
}

/// One step of a flattened chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStep {
    pub symbol: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl CallChainResult {
    /// Every root-to-leaf path across all trees
    pub fn flatten(&self) -> Vec<Vec<ChainStep>> {
        self.trees.iter().flat_map(|t| flatten(&t.root)).collect()
    }
}

/// Root-to-leaf paths of a chain tree, in tree order
pub fn flatten(root: &CallChainNode) -> Vec<Vec<ChainStep>> {
    let mut paths = Vec::new();
    let mut stack: Vec<(&CallChainNode, Vec<ChainStep>)> = vec![(root, Vec::new())];

    while let Some((node, mut prefix)) = stack.pop() {
        prefix.push(ChainStep {
            symbol: node.symbol.clone(),
            file: node.file.clone(),
            line: node.line,
        });
        if node.children.is_empty() {
            paths.push(prefix);
            continue;
        }
        for child in node.children.iter().rev() {
            stack.push((child, prefix.clone()));
        }
    }
    paths
}

/// A neighbour found while expanding one node
#[derive(Debug, Clone)]
struct Neighbor {
    symbol: String,
    file: String,
    line: u32,
    /// Top-level callers have no symbol to walk further from
    expandable: bool,
}

struct ArenaNode {
    symbol: String,
    file: Option<String>,
    line: Option<u32>,
    depth: u32,
    children: Vec<usize>,
}

struct Work {
    parent: Option<usize>,
    neighbor: Neighbor,
    depth: u32,
    /// Symbols from the root down to this item's parent
    path: Vec<String>,
}

/// Per-walk state
struct Traversal {
    arena: Vec<ArenaNode>,
    stack: Vec<Work>,
    max_depth: u32,
    max_paths: usize,
    paths: usize,
    truncated: bool,
}

impl Traversal {
    fn new(max_depth: u32, max_paths: usize) -> Self {
        Self {
            arena: Vec::new(),
            stack: Vec::new(),
            max_depth,
            max_paths: max_paths.max(1),
            paths: 0,
            truncated: false,
        }
    }

    fn attach(&mut self, work: &Work) -> usize {
        let index = self.arena.len();
        self.arena.push(ArenaNode {
            symbol: work.neighbor.symbol.clone(),
            file: work.parent.map(|_| work.neighbor.file.clone()),
            line: work.parent.map(|_| work.neighbor.line),
            depth: work.depth,
            children: Vec::new(),
        });
        if let Some(parent) = work.parent {
            self.arena[parent].children.push(index);
        }
        index
    }

    /// Rebuild the nested tree from the arena. Children always sit after
    /// their parent, so a reverse sweep sees every child first.
    fn into_tree(self) -> Option<CallChainNode> {
        let mut built: Vec<Option<CallChainNode>> = self.arena.iter().map(|_| None).collect();
        for (index, node) in self.arena.into_iter().enumerate().rev() {
            let children = node
                .children
                .iter()
                .filter_map(|child| built[*child].take())
                .collect();
            built[index] = Some(CallChainNode {
                symbol: node.symbol,
                file: node.file,
                line: node.line,
                depth: node.depth,
                children,
            });
        }
        built.into_iter().next().flatten()
    }
}

impl<'a> Graph<'a> {
    pub fn call_chain(
        &self,
        symbol: &str,
        direction: ChainDirection,
        config: &CallChainConfig,
    ) -> Result<CallChainResult> {
        let max_depth = clamp_depth(config.max_depth);
        let directions: &[ChainDirection] = match direction {
            ChainDirection::Both => &[ChainDirection::Up, ChainDirection::Down],
            ChainDirection::Up => &[ChainDirection::Up],
            ChainDirection::Down => &[ChainDirection::Down],
        };

        let mut result = CallChainResult {
            symbol: symbol.to_string(),
            direction,
            max_depth,
            trees: Vec::new(),
            paths: 0,
            truncated: false,
        };
        for dir in directions {
            let (root, paths, truncated) = self.walk(symbol, *dir, max_depth, config.max_paths)?;
            result.paths += paths;
            result.truncated |= truncated;
            if let Some(root) = root {
                result.trees.push(CallChainTree {
                    direction: *dir,
                    root,
                });
            }
        }
        Ok(result)
    }

    fn walk(
        &self,
        symbol: &str,
        direction: ChainDirection,
        max_depth: u32,
        max_paths: usize,
    ) -> Result<(Option<CallChainNode>, usize, bool)> {
        let mut t = Traversal::new(max_depth, max_paths);
        t.stack.push(Work {
            parent: None,
            neighbor: Neighbor {
                symbol: symbol.to_string(),
                file: String::new(),
                line: 0,
                expandable: true,
            },
            depth: 0,
            path: Vec::new(),
        });

        while let Some(work) = t.stack.pop() {
            if t.paths >= t.max_paths {
                t.truncated = true;
                break;
            }
            let index = t.attach(&work);

            if work.depth >= t.max_depth || !work.neighbor.expandable {
                t.paths += 1;
                continue;
            }

            let mut path = work.path;
            path.push(work.neighbor.symbol);
            let neighbors: Vec<Neighbor> = self
                .neighbors(&path[path.len() - 1], direction)?
                .into_iter()
                .filter(|n| !path.contains(&n.symbol))
                .collect();

            if neighbors.is_empty() {
                t.paths += 1;
                continue;
            }
            // reversed so the stack pops them in name order
            for neighbor in neighbors.into_iter().rev() {
                t.stack.push(Work {
                    parent: Some(index),
                    neighbor,
                    depth: work.depth + 1,
                    path: path.clone(),
                });
            }
        }

        if t.truncated {
            debug!(
                symbol,
                direction = direction.as_str(),
                paths = t.paths,
                "call chain truncated at path cap"
            );
        }
        let (paths, truncated) = (t.paths, t.truncated);
        Ok((t.into_tree(), paths, truncated))
    }

    /// Distinct callers or callees of `symbol`, earliest call kept, sorted by name
    fn neighbors(&self, symbol: &str, direction: ChainDirection) -> Result<Vec<Neighbor>> {
        let found: Vec<Neighbor> = match direction {
            ChainDirection::Up => self
                .incoming_calls(symbol)?
                .into_iter()
                .map(|site| match site.caller_symbol {
                    Some(caller) => Neighbor {
                        symbol: caller,
                        file: site.file,
                        line: site.line,
                        expandable: true,
                    },
                    None => Neighbor {
                        symbol: site.file.clone(),
                        file: site.file,
                        line: site.line,
                        expandable: false,
                    },
                })
                .collect(),
            ChainDirection::Down => self
                .outgoing_calls(symbol)?
                .into_iter()
                .filter_map(|site| {
                    let callee = self.matcher.base_name(&site.callee).to_string();
                    if callee.is_empty() {
                        return None;
                    }
                    Some(Neighbor {
                        symbol: callee,
                        file: site.file,
                        line: site.line,
                        expandable: true,
                    })
                })
                .collect(),
            ChainDirection::Both => Vec::new(),
        };

        let mut distinct: BTreeMap<String, Neighbor> = BTreeMap::new();
        for neighbor in found {
            match distinct.get(&neighbor.symbol) {
                Some(kept) if (kept.line, &kept.file) <= (neighbor.line, &neighbor.file) => {}
                _ => {
                    distinct.insert(neighbor.symbol.clone(), neighbor);
                }
            }
        }
        Ok(distinct.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{call, fixture_db};
    use super::*;

    fn names(node: &CallChainNode) -> Vec<&str> {
        node.children.iter().map(|c| c.symbol.as_str()).collect()
    }

    fn depth_of(node: &CallChainNode) -> u32 {
        let mut deepest = node.depth;
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            deepest = deepest.max(n.depth);
            stack.extend(n.children.iter());
        }
        deepest
    }

    #[test]
    fn test_chain_up() {
        let db = fixture_db();
        let graph = Graph::new(&db);
        let result = graph
            .call_chain("helper", ChainDirection::Up, &CallChainConfig::default())
            .unwrap();

        assert_eq!(result.trees.len(), 1);
        let root = &result.trees[0].root;
        assert_eq!(root.symbol, "helper");
        assert_eq!(names(root), vec!["main", "run"]);
        assert_eq!(names(&root.children[1]), vec!["main"]);
        assert_eq!(root.children[1].file.as_deref(), Some("src/worker.rs"));
        assert_eq!(root.children[1].line, Some(12));
        assert_eq!(result.paths, 2);
        assert!(!result.truncated);
    }

    #[test]
    fn test_chain_down() {
        let db = fixture_db();
        let graph = Graph::new(&db);
        let result = graph
            .call_chain("main", ChainDirection::Down, &CallChainConfig::default())
            .unwrap();

        let root = &result.trees[0].root;
        assert_eq!(names(root), vec!["helper", "run"]);
        assert_eq!(names(&root.children[1]), vec!["flush", "helper"]);
        assert_eq!(result.paths, 3);

        let flat: Vec<Vec<String>> = result
            .flatten()
            .into_iter()
            .map(|p| p.into_iter().map(|s| s.symbol).collect())
            .collect();
        assert_eq!(
            flat,
            vec![
                vec!["main", "helper"],
                vec!["main", "run", "flush"],
                vec!["main", "run", "helper"],
            ]
        );
    }

    #[test]
    fn test_depth_is_clamped() {
        let db = fixture_db();
        let graph = Graph::new(&db);

        let shallow = graph
            .call_chain("main", ChainDirection::Down, &CallChainConfig { max_depth: 0, max_paths: 100 })
            .unwrap();
        assert_eq!(shallow.max_depth, 1);
        assert_eq!(depth_of(&shallow.trees[0].root), 1);
        assert!(shallow.trees[0].root.children.iter().all(|c| c.children.is_empty()));

        let deep = graph
            .call_chain("main", ChainDirection::Down, &CallChainConfig { max_depth: 50, max_paths: 100 })
            .unwrap();
        assert_eq!(deep.max_depth, 10);
    }

    #[test]
    fn test_cycles_terminate() {
        let mut db = fixture_db();
        // flush calls main, closing main -> run -> flush -> main
        db.write(|w| w.insert_relationships("src/worker.rs", &[call(Some("flush"), "main", 31)]))
            .unwrap();

        let graph = Graph::new(&db);
        let result = graph
            .call_chain("main", ChainDirection::Down, &CallChainConfig { max_depth: 10, max_paths: 100 })
            .unwrap();

        for path in result.flatten() {
            let symbols: Vec<&str> = path.iter().map(|s| s.symbol.as_str()).collect();
            let mut unique = symbols.clone();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), symbols.len(), "cycle in {:?}", symbols);
        }
        assert!(!result.truncated);
    }

    #[test]
    fn test_path_cap_truncates() {
        let db = fixture_db();
        let graph = Graph::new(&db);

        let capped = graph
            .call_chain("main", ChainDirection::Down, &CallChainConfig { max_depth: 3, max_paths: 1 })
            .unwrap();
        assert!(capped.truncated);
        assert_eq!(capped.paths, 1);

        let exact = graph
            .call_chain("main", ChainDirection::Down, &CallChainConfig { max_depth: 3, max_paths: 3 })
            .unwrap();
        assert!(!exact.truncated);
        assert_eq!(exact.paths, 3);
    }

    #[test]
    fn test_both_concatenates() {
        let db = fixture_db();
        let graph = Graph::new(&db);
        let result = graph
            .call_chain("run", ChainDirection::Both, &CallChainConfig::default())
            .unwrap();

        assert_eq!(result.trees.len(), 2);
        assert_eq!(result.trees[0].direction, ChainDirection::Up);
        assert_eq!(result.trees[1].direction, ChainDirection::Down);
        assert_eq!(names(&result.trees[0].root), vec!["main"]);
        assert_eq!(names(&result.trees[1].root), vec!["flush", "helper"]);
        assert_eq!(result.paths, 3);
    }

    #[test]
    fn test_unknown_symbol_is_a_single_leaf() {
        let db = fixture_db();
        let graph = Graph::new(&db);
        let result = graph
            .call_chain("nobody", ChainDirection::Up, &CallChainConfig::default())
            .unwrap();
        assert!(result.trees[0].root.children.is_empty());
        assert_eq!(result.paths, 1);
        assert!(!result.truncated);
    }

    #[test]
    fn test_direction_names() {
        assert_eq!(ChainDirection::from_name("UP"), Some(ChainDirection::Up));
        assert_eq!(ChainDirection::from_name("callees"), Some(ChainDirection::Down));
        assert_eq!(ChainDirection::from_name("sideways"), None);
    }
}
