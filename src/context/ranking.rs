//! Context ranking: blends relevance, usage, recency and dependency depth

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::{DependencyConfig, Graph, DEFAULT_MAX_FILES};
use crate::types::unix_now;
use crate::usage::{score_files, UsageWeights};

/// Relevance given to files that only arrive through dependency expansion
const EXPANDED_RELEVANCE: f64 = 0.5;
const DEPTH_PENALTY: f64 = 0.3;
const MIN_DEPENDENCY_SCORE: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct SmartContextConfig {
    pub relevance_weight: f64,
    pub usage_weight: f64,
    pub recency_weight: f64,
    pub dependency_weight: f64,
    pub expand_dependencies: bool,
    pub include_importers: bool,
    pub expansion_depth: u32,
    pub use_usage: bool,
    pub use_recency: bool,
    pub max_files: usize,
    /// Seconds after an edit at which recency reaches zero
    pub recency_window_secs: i64,
    /// Reference time for recency; `None` means now
    pub now: Option<i64>,
    pub usage_weights: UsageWeights,
}

impl Default for SmartContextConfig {
    fn default() -> Self {
        Self {
            relevance_weight: 0.4,
            usage_weight: 0.3,
            recency_weight: 0.2,
            dependency_weight: 0.1,
            expand_dependencies: true,
            include_importers: false,
            expansion_depth: 2,
            use_usage: true,
            use_recency: true,
            max_files: 20,
            recency_window_secs: 7 * 24 * 60 * 60,
            now: None,
            usage_weights: UsageWeights::default(),
        }
    }
}

/// A seed file with its relevance to the task, in `[0, 1]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedFile {
    pub path: String,
    pub relevance: f64,
}

impl SeedFile {
    pub fn new(path: impl Into<String>, relevance: f64) -> Self {
        Self {
            path: path.into(),
            relevance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextScore {
    pub path: String,
    pub relevance: f64,
    pub usage: f64,
    pub recency: f64,
    pub dependency: f64,
    pub score: f64,
    /// Expansion depth; 0 for seeds
    pub depth: u32,
    pub is_seed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankingStats {
    pub seeds: usize,
    pub expanded: usize,
    /// Candidates before the `max_files` cut
    pub total: usize,
    /// Over the returned files
    pub average_score: f64,
    pub max_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankedContext {
    pub files: Vec<ContextScore>,
    pub stats: RankingStats,
}

/// Linear decay from 1.0 at `now` to 0.0 at `now - window`
pub fn recency_score(edited_at: i64, now: i64, window_secs: i64) -> f64 {
    if window_secs <= 0 {
        return 0.0;
    }
    let age = (now - edited_at).max(0) as f64;
    (1.0 - age / window_secs as f64).max(0.0)
}

/// `max(1 - 0.3·depth, 0.1)`
pub fn dependency_score(depth: u32) -> f64 {
    (1.0 - DEPTH_PENALTY * depth as f64).max(MIN_DEPENDENCY_SCORE)
}

/// Rank seeds plus (optionally) their dependencies
pub fn rank_context(
    graph: &Graph<'_>,
    seeds: &[SeedFile],
    history: &HashMap<String, i64>,
    config: &SmartContextConfig,
) -> Result<RankedContext> {
    let mut candidates: BTreeMap<String, ContextScore> = BTreeMap::new();
    for seed in seeds {
        let relevance = seed.relevance.clamp(0.0, 1.0);
        candidates
            .entry(seed.path.clone())
            .and_modify(|c| c.relevance = c.relevance.max(relevance))
            .or_insert_with(|| blank_score(&seed.path, relevance, 1.0, 0, true));
    }
    let seed_count = candidates.len();

    if config.expand_dependencies && !candidates.is_empty() {
        let seed_paths: Vec<String> = candidates.keys().cloned().collect();
        let expansion = graph.expand_with_dependencies(
            &seed_paths,
            &DependencyConfig {
                max_depth: config.expansion_depth,
                max_files: DEFAULT_MAX_FILES.max(seed_paths.len()),
                include_importers: config.include_importers,
            },
        )?;
        for file in expansion.files.into_iter().filter(|f| f.depth > 0) {
            candidates.entry(file.path.clone()).or_insert_with(|| {
                blank_score(&file.path, EXPANDED_RELEVANCE, dependency_score(file.depth), file.depth, false)
            });
        }
    }
    let expanded_count = candidates.len() - seed_count;

    let mut files: Vec<ContextScore> = candidates.into_values().collect();
    if config.use_usage {
        attach_usage(graph, &mut files, &config.usage_weights)?;
    }
    if config.use_recency && !history.is_empty() {
        let now = config.now.unwrap_or_else(unix_now);
        attach_recency(&mut files, history, now, config.recency_window_secs);
    }

    for f in files.iter_mut() {
        f.score = config.relevance_weight * f.relevance
            + config.usage_weight * f.usage
            + config.recency_weight * f.recency
            + config.dependency_weight * f.dependency;
    }
    sort_by_score(&mut files);

    let total = files.len();
    files.truncate(config.max_files);
    let stats = stats(&files, seed_count, expanded_count, total);
    debug!(
        seeds = stats.seeds,
        expanded = stats.expanded,
        returned = files.len(),
        "ranked context"
    );
    Ok(RankedContext { files, stats })
}

/// Score an explicit file list without expansion, weighting relevance 0.3,
/// usage 0.4 and recency 0.3
pub fn rank_files(
    graph: &Graph<'_>,
    files: &[SeedFile],
    history: &HashMap<String, i64>,
    now: i64,
    recency_window_secs: i64,
) -> Result<Vec<ContextScore>> {
    let mut scored: Vec<ContextScore> = files
        .iter()
        .map(|f| blank_score(&f.path, f.relevance.clamp(0.0, 1.0), 0.0, 0, true))
        .collect();
    attach_usage(graph, &mut scored, &UsageWeights::default())?;
    attach_recency(&mut scored, history, now, recency_window_secs);

    for f in scored.iter_mut() {
        f.score = 0.3 * f.relevance + 0.4 * f.usage + 0.3 * f.recency;
    }
    sort_by_score(&mut scored);
    Ok(scored)
}

fn blank_score(path: &str, relevance: f64, dependency: f64, depth: u32, is_seed: bool) -> ContextScore {
    ContextScore {
        path: path.to_string(),
        relevance,
        usage: 0.0,
        recency: 0.0,
        dependency,
        score: 0.0,
        depth,
        is_seed,
    }
}

fn attach_usage(graph: &Graph<'_>, files: &mut [ContextScore], weights: &UsageWeights) -> Result<()> {
    let paths: Vec<String> = files.iter().map(|f| f.path.clone()).collect();
    let usage = score_files(graph, &paths, weights)?;
    for (file, usage) in files.iter_mut().zip(usage) {
        file.usage = usage.score;
    }
    Ok(())
}

fn attach_recency(files: &mut [ContextScore], history: &HashMap<String, i64>, now: i64, window: i64) {
    for file in files.iter_mut() {
        file.recency = history
            .get(&file.path)
            .map(|edited| recency_score(*edited, now, window))
            .unwrap_or(0.0);
    }
}

fn sort_by_score(files: &mut [ContextScore]) {
    files.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.path.cmp(&b.path)));
}

fn stats(files: &[ContextScore], seeds: usize, expanded: usize, total: usize) -> RankingStats {
    let max_score = files.iter().map(|f| f.score).fold(0.0_f64, f64::max);
    let average_score = if files.is_empty() {
        0.0
    } else {
        files.iter().map(|f| f.score).sum::<f64>() / files.len() as f64
    };
    RankingStats {
        seeds,
        expanded,
        total,
        average_score,
        max_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::graph::tests::{file, fixture_db, import};

    const DAY: i64 = 24 * 60 * 60;

    fn import_db() -> Database {
        let mut db = Database::in_memory().unwrap();
        db.write(|w| {
            for path in ["a.ts", "b.ts", "c.ts", "d.ts"] {
                w.insert_file(&file(path))?;
            }
            w.insert_relationships("a.ts", &[import("./b", Some("b.ts"))])?;
            w.insert_relationships("b.ts", &[import("./c", Some("c.ts"))])?;
            w.insert_relationships("c.ts", &[import("./d", Some("d.ts"))])?;
            Ok(())
        })
        .unwrap();
        db
    }

    #[test]
    fn test_recency_decay() {
        let now = 1_000 * DAY;
        assert_eq!(recency_score(now, now, 7 * DAY), 1.0);
        assert!((recency_score(now - 7 * DAY / 2, now, 7 * DAY) - 0.5).abs() < 1e-9);
        assert_eq!(recency_score(now - 30 * DAY, now, 7 * DAY), 0.0);
        assert_eq!(recency_score(now + DAY, now, 7 * DAY), 1.0);
    }

    #[test]
    fn test_dependency_score() {
        assert_eq!(dependency_score(0), 1.0);
        assert!((dependency_score(1) - 0.7).abs() < 1e-9);
        assert!((dependency_score(2) - 0.4).abs() < 1e-9);
        assert!((dependency_score(3) - 0.1).abs() < 1e-9);
        assert_eq!(dependency_score(9), 0.1);
    }

    #[test]
    fn test_expansion_adds_dependencies() {
        let db = import_db();
        let graph = Graph::new(&db);
        let config = SmartContextConfig {
            use_usage: false,
            ..Default::default()
        };

        let ranked = rank_context(&graph, &[SeedFile::new("a.ts", 1.0)], &HashMap::new(), &config).unwrap();
        let got: Vec<(&str, u32)> = ranked.files.iter().map(|f| (f.path.as_str(), f.depth)).collect();
        assert_eq!(got, vec![("a.ts", 0), ("b.ts", 1), ("c.ts", 2)]);

        let b = &ranked.files[1];
        assert_eq!(b.relevance, 0.5);
        assert!((b.dependency - 0.7).abs() < 1e-9);
        assert!((b.score - (0.4 * 0.5 + 0.1 * 0.7)).abs() < 1e-9);
        assert!(!b.is_seed);

        assert_eq!(ranked.stats.seeds, 1);
        assert_eq!(ranked.stats.expanded, 2);
        assert_eq!(ranked.stats.total, 3);
        assert!((ranked.stats.max_score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_recency_reorders() {
        let db = import_db();
        let graph = Graph::new(&db);
        let now = 100 * DAY;
        let config = SmartContextConfig {
            use_usage: false,
            expand_dependencies: false,
            now: Some(now),
            ..Default::default()
        };
        let history = HashMap::from([("c.ts".to_string(), now)]);

        let ranked = rank_context(
            &graph,
            &[SeedFile::new("b.ts", 0.6), SeedFile::new("c.ts", 0.5)],
            &history,
            &config,
        )
        .unwrap();
        assert_eq!(ranked.files[0].path, "c.ts");
        assert_eq!(ranked.files[0].recency, 1.0);
        assert_eq!(ranked.files[1].recency, 0.0);
    }

    #[test]
    fn test_max_files_truncates() {
        let db = import_db();
        let graph = Graph::new(&db);
        let config = SmartContextConfig {
            max_files: 2,
            expansion_depth: 3,
            ..Default::default()
        };

        let ranked = rank_context(&graph, &[SeedFile::new("a.ts", 0.9)], &HashMap::new(), &config).unwrap();
        assert_eq!(ranked.files.len(), 2);
        assert_eq!(ranked.stats.total, 4);
        assert!(ranked.files[0].score >= ranked.files[1].score);
        assert!(ranked.files.iter().all(|f| (0.0..=1.0).contains(&f.score)));
    }

    #[test]
    fn test_duplicate_seeds_keep_best_relevance() {
        let db = import_db();
        let graph = Graph::new(&db);
        let config = SmartContextConfig {
            expand_dependencies: false,
            ..Default::default()
        };
        let ranked = rank_context(
            &graph,
            &[SeedFile::new("a.ts", 0.2), SeedFile::new("a.ts", 0.9)],
            &HashMap::new(),
            &config,
        )
        .unwrap();
        assert_eq!(ranked.files.len(), 1);
        assert_eq!(ranked.files[0].relevance, 0.9);
    }

    #[test]
    fn test_light_ranking_uses_usage() {
        let db = fixture_db();
        let graph = Graph::new(&db);
        let files = vec![SeedFile::new("src/main.rs", 0.5), SeedFile::new("src/util.rs", 0.5)];

        let ranked = rank_files(&graph, &files, &HashMap::new(), 0, 7 * DAY).unwrap();
        assert_eq!(ranked[0].path, "src/util.rs");
        assert!((ranked[0].score - (0.3 * 0.5 + 0.4 * 1.0)).abs() < 1e-9);
        assert_eq!(ranked[0].dependency, 0.0);
    }
}
