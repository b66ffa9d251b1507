//! Token budget allocation

use serde::{Deserialize, Serialize};

use crate::types::SymbolKind;

/// Ranking weight of a symbol kind when symbols compete for budget
pub fn symbol_priority(kind: SymbolKind) -> f64 {
    match kind {
        SymbolKind::Function | SymbolKind::Method => 1.0,
        SymbolKind::Class
        | SymbolKind::Struct
        | SymbolKind::Interface
        | SymbolKind::Trait
        | SymbolKind::Enum
        | SymbolKind::TypeAlias => 0.8,
        SymbolKind::Constant | SymbolKind::Variable => 0.5,
        SymbolKind::Module | SymbolKind::Field => 0.3,
    }
}

/// An item competing for budget
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetItem<T> {
    pub item: T,
    pub tokens: usize,
    pub priority: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetOutcome<T> {
    /// Accepted items, highest priority first
    pub kept: Vec<T>,
    pub used_tokens: usize,
    pub dropped: usize,
}

/// Accept items greedily by descending priority (ties keep input order).
/// An item that does not fit is dropped whole and smaller ones after it may
/// still be accepted, so `used_tokens <= budget` always holds.
pub fn truncate_to_token_budget<T>(mut items: Vec<BudgetItem<T>>, budget: usize) -> BudgetOutcome<T> {
    items.sort_by(|a, b| b.priority.total_cmp(&a.priority));

    let mut outcome = BudgetOutcome {
        kept: Vec::new(),
        used_tokens: 0,
        dropped: 0,
    };
    for item in items {
        if outcome.used_tokens + item.tokens <= budget {
            outcome.used_tokens += item.tokens;
            outcome.kept.push(item.item);
        } else {
            outcome.dropped += 1;
        }
    }
    outcome
}
