//! Usage and centrality scoring
//!
//! File scores blend five relationship counts with [`UsageWeights`] and are
//! normalized against the busiest file in the batch. Symbol centrality is a
//! log-damped weighted call count.

use std::collections::BTreeSet;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::graph::Graph;

/// Weighted call count at which centrality saturates
const CENTRALITY_SATURATION: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageWeights {
    pub incoming_calls: f64,
    pub outgoing_calls: f64,
    pub importers: f64,
    pub imports: f64,
    pub symbols: f64,
}

impl Default for UsageWeights {
    fn default() -> Self {
        Self {
            incoming_calls: 2.0,
            outgoing_calls: 0.5,
            importers: 1.5,
            imports: 0.3,
            symbols: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileUsageScore {
    pub path: String,
    /// Calls from other files into this file's symbols
    pub incoming_calls: u64,
    pub outgoing_calls: u64,
    pub importers: u64,
    pub imports: u64,
    pub symbols: u64,
    pub raw_score: f64,
    /// `raw_score` divided by the batch maximum, in `[0, 1]`
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolCentrality {
    pub name: String,
    pub incoming_calls: u64,
    pub outgoing_calls: u64,
    pub centrality: f64,
}

/// Score a batch of files; the output follows the input order
pub fn score_files(graph: &Graph<'_>, paths: &[String], weights: &UsageWeights) -> Result<Vec<FileUsageScore>> {
    let db = graph.database();
    let mut scores = Vec::with_capacity(paths.len());

    for path in paths {
        let names: BTreeSet<String> = db.symbols_for_file(path)?.into_iter().map(|s| s.name).collect();
        let mut incoming_calls = 0u64;
        for name in &names {
            incoming_calls += graph
                .incoming_calls(name)?
                .iter()
                .filter(|site| site.file != *path)
                .count() as u64;
        }

        let mut score = FileUsageScore {
            path: path.clone(),
            incoming_calls,
            outgoing_calls: db.outgoing_call_count(path)?,
            importers: db.importer_count(path)?,
            imports: db.import_count(path)?,
            symbols: names.len() as u64,
            raw_score: 0.0,
            score: 0.0,
        };
        score.raw_score = raw_score(&score, weights);
        scores.push(score);
    }

    normalize(&mut scores);
    Ok(scores)
}

fn raw_score(s: &FileUsageScore, w: &UsageWeights) -> f64 {
    s.incoming_calls as f64 * w.incoming_calls
        + s.outgoing_calls as f64 * w.outgoing_calls
        + s.importers as f64 * w.importers
        + s.imports as f64 * w.imports
        + s.symbols as f64 * w.symbols
}

fn normalize(scores: &mut [FileUsageScore]) {
    let max = scores.iter().map(|s| s.raw_score).fold(0.0_f64, f64::max);
    for s in scores.iter_mut() {
        s.score = if max > 0.0 {
            (s.raw_score / max).clamp(0.0, 1.0)
        } else {
            0.0
        };
    }
}

/// `log2(1 + 2·incoming + outgoing)`, scaled so a weighted count of 100 reaches 1.0
pub fn centrality(incoming_calls: u64, outgoing_calls: u64) -> f64 {
    let weighted = 2.0 * incoming_calls as f64 + outgoing_calls as f64;
    ((1.0 + weighted).log2() / (1.0 + CENTRALITY_SATURATION).log2()).clamp(0.0, 1.0)
}

pub fn symbol_centrality(graph: &Graph<'_>, name: &str) -> Result<SymbolCentrality> {
    let incoming_calls = graph.incoming_calls(name)?.len() as u64;
    let outgoing_calls = graph.outgoing_calls(name)?.len() as u64;
    Ok(SymbolCentrality {
        name: name.to_string(),
        incoming_calls,
        outgoing_calls,
        centrality: centrality(incoming_calls, outgoing_calls),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::graph::tests::fixture_db;

    fn paths() -> Vec<String> {
        vec!["src/util.rs".into(), "src/main.rs".into(), "src/worker.rs".into()]
    }

    #[test]
    fn test_raw_counts() {
        let db = fixture_db();
        let graph = Graph::new(&db);
        let scores = score_files(&graph, &paths(), &UsageWeights::default()).unwrap();

        let util = &scores[0];
        assert_eq!((util.incoming_calls, util.outgoing_calls, util.symbols), (2, 0, 1));
        let worker = &scores[2];
        // `self.flush` comes from the same file and is not counted
        assert_eq!((worker.incoming_calls, worker.outgoing_calls, worker.symbols), (1, 2, 3));
    }

    #[test]
    fn test_normalized_to_batch_max() {
        let db = fixture_db();
        let graph = Graph::new(&db);
        let scores = score_files(&graph, &paths(), &UsageWeights::default()).unwrap();

        assert!((scores[0].raw_score - 4.2).abs() < 1e-9);
        assert_eq!(scores[0].score, 1.0);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(&s.score)));
        assert!(scores[1].score < scores[2].score);
    }

    #[test]
    fn test_no_signal_scores_zero() {
        let db = Database::in_memory().unwrap();
        let graph = Graph::new(&db);
        let scores = score_files(&graph, &["ghost.rs".to_string()], &UsageWeights::default()).unwrap();
        assert_eq!(scores[0].score, 0.0);
        assert_eq!(scores[0].raw_score, 0.0);
    }

    #[test]
    fn test_centrality_bounds() {
        assert_eq!(centrality(0, 0), 0.0);
        assert!((centrality(50, 0) - 1.0).abs() < 1e-9);
        assert_eq!(centrality(10_000, 10_000), 1.0);
        assert!(centrality(1, 0) < centrality(2, 0));
        assert!(centrality(0, 2) < centrality(2, 0));
    }

    #[test]
    fn test_symbol_centrality() {
        let db = fixture_db();
        let graph = Graph::new(&db);
        let helper = symbol_centrality(&graph, "helper").unwrap();
        assert_eq!((helper.incoming_calls, helper.outgoing_calls), (2, 0));
        assert!(helper.centrality > 0.0 && helper.centrality < 1.0);
    }
}
