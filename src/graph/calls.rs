//! Direct call edges: who calls a symbol, and what a symbol calls

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::Graph;
use crate::types::Relationship;

/// One recorded call edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    /// File containing the call
    pub file: String,
    pub line: u32,
    pub column: u32,
    /// Function or method containing the call; `None` at top level
    pub caller_symbol: Option<String>,
    /// Callee text as recorded (`self.helper`, `utils::helper`, ...)
    pub callee: String,
}

impl<'a> Graph<'a> {
    /// Calls whose target matches `name` exactly or by qualified suffix
    pub fn incoming_calls(&self, name: &str) -> Result<Vec<CallSite>> {
        let base = self.matcher.base_name(name);
        let mut sites = Vec::new();
        for rel in self.db.calls_mentioning(base)? {
            let Some(target) = rel.target_symbol.as_deref() else {
                continue;
            };
            if !self.matcher.matches(target, name) {
                continue;
            }
            let caller_symbol = match &rel.source_symbol {
                Some(symbol) => Some(symbol.clone()),
                None => self
                    .db
                    .enclosing_symbol(&rel.source_file, rel.line)?
                    .map(|s| s.name),
            };
            sites.push(call_site(&rel, caller_symbol));
        }
        Ok(sites)
    }

    /// Calls made from inside the line range of every callable named `name`
    pub fn outgoing_calls(&self, name: &str) -> Result<Vec<CallSite>> {
        let base = self.matcher.base_name(name);
        let mut sites = Vec::new();
        for symbol in self.db.symbols_named(base, true)? {
            for rel in self
                .db
                .calls_in_range(&symbol.file_path, symbol.start_line, symbol.end_line)?
            {
                sites.push(call_site(&rel, Some(symbol.name.clone())));
            }
        }
        Ok(sites)
    }
}

fn call_site(rel: &Relationship, caller_symbol: Option<String>) -> CallSite {
    CallSite {
        file: rel.source_file.clone(),
        line: rel.line,
        column: rel.column,
        caller_symbol,
        callee: rel.target_symbol.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{call, fixture_db};
    use super::*;

    #[test]
    fn test_incoming_calls_by_suffix() {
        let db = fixture_db();
        let graph = Graph::new(&db);

        let sites = graph.incoming_calls("helper").unwrap();
        let callers: Vec<(&str, Option<&str>, u32)> = sites
            .iter()
            .map(|s| (s.file.as_str(), s.caller_symbol.as_deref(), s.line))
            .collect();
        assert_eq!(
            callers,
            vec![
                ("src/main.rs", Some("main"), 5),
                ("src/worker.rs", Some("run"), 12),
            ]
        );
        assert_eq!(sites[1].callee, "util::helper");
    }

    #[test]
    fn test_incoming_rejects_partial_names() {
        let db = fixture_db();
        let graph = Graph::new(&db);
        assert!(graph.incoming_calls("elper").unwrap().is_empty());
        assert!(graph.incoming_calls("missing").unwrap().is_empty());
    }

    #[test]
    fn test_caller_falls_back_to_enclosing_symbol() {
        let mut db = fixture_db();
        db.write(|w| {
            let mut fact = call(None, "helper", 22);
            fact.column = 9;
            w.insert_relationships("src/worker.rs", &[fact])
        })
        .unwrap();

        let graph = Graph::new(&db);
        let late = graph
            .incoming_calls("helper")
            .unwrap()
            .into_iter()
            .find(|s| s.line == 22)
            .unwrap();
        assert_eq!(late.caller_symbol.as_deref(), Some("finish"));
    }

    #[test]
    fn test_outgoing_calls_within_range() {
        let db = fixture_db();
        let graph = Graph::new(&db);

        let callees: Vec<String> = graph
            .outgoing_calls("run")
            .unwrap()
            .into_iter()
            .map(|s| s.callee)
            .collect();
        assert_eq!(callees, vec!["util::helper", "self.flush"]);
        assert!(graph.outgoing_calls("nothing").unwrap().is_empty());
    }
}
