//! Code analysis module
//!
//! Turns file content into structural facts:
//! - Symbols (functions, classes, methods, etc.) as a nested tree
//! - Relationships (calls and imports)
//!
//! The scanner only sees the [`Analyzer`] and [`AnalyzerFactory`] traits; the
//! bundled implementation is tree-sitter based.

mod languages;

use anyhow::{anyhow, Result};
use tree_sitter::{Node, Parser};

use crate::types::{FileAnalysis, Language, RelationshipFact, RelationshipKind, SymbolKind, SymbolNode};

use languages::LanguageConfig;

/// Switches passed to an [`AnalyzerFactory`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyzerOptions {
    /// Allow cross-process language servers; the scan pool turns this off
    pub language_servers: bool,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            language_servers: true,
        }
    }
}

/// Produces symbols and relationships for one file at a time.
/// Instances are not shared between threads.
pub trait Analyzer {
    /// `Ok(None)` when the language is not supported
    fn analyze(&mut self, path: &str, language: Language, content: &str) -> Result<Option<FileAnalysis>>;
}

/// Builds one analyzer per scan worker
pub trait AnalyzerFactory: Sync {
    fn create(&self, options: &AnalyzerOptions) -> Box<dyn Analyzer>;
}

/// Factory for [`TreeSitterAnalyzer`]. The analyzer runs in-process, so the
/// language-server switch has no effect on it.
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeSitterFactory;

impl AnalyzerFactory for TreeSitterFactory {
    fn create(&self, _options: &AnalyzerOptions) -> Box<dyn Analyzer> {
        Box::new(TreeSitterAnalyzer::new())
    }
}

/// Extracts code symbols from source files using tree-sitter
pub struct TreeSitterAnalyzer {
    parser: Parser,
}

impl TreeSitterAnalyzer {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }
}

impl Default for TreeSitterAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for TreeSitterAnalyzer {
    fn analyze(&mut self, path: &str, language: Language, content: &str) -> Result<Option<FileAnalysis>> {
        let Some(ts_lang) = languages::get_language(language) else {
            return Ok(None);
        };

        self.parser
            .set_language(&ts_lang)
            .map_err(|e| anyhow!("failed to set parser language for {}: {}", path, e))?;

        let tree = self
            .parser
            .parse(content, None)
            .ok_or_else(|| anyhow!("failed to parse {}", path))?;

        let mut ctx = ExtractionContext {
            content,
            language,
            config: languages::get_config(language),
            scope: Vec::new(),
            container: Vec::new(),
            relationships: Vec::new(),
        };
        let symbols = ctx.traverse_children(tree.root_node());

        Ok(Some(FileAnalysis {
            symbols,
            relationships: ctx.relationships,
        }))
    }
}

struct ExtractionContext<'a> {
    content: &'a str,
    language: Language,
    config: &'static LanguageConfig,
    /// Names of enclosing symbols, innermost last
    scope: Vec<String>,
    /// Whether functions directly inside the innermost scope are methods
    container: Vec<bool>,
    relationships: Vec<RelationshipFact>,
}

impl<'a> ExtractionContext<'a> {
    fn traverse_children(&mut self, node: Node) -> Vec<SymbolNode> {
        let mut symbols = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            symbols.extend(self.traverse_node(child));
        }
        symbols
    }

    fn traverse_node(&mut self, node: Node) -> Vec<SymbolNode> {
        let node_type = node.kind();

        if self.config.is_import_node(node_type) {
            self.extract_imports(&node);
            return Vec::new();
        }

        if self.config.is_call_node(node_type) {
            self.record_call(&node);
        }

        if let Some(kind) = self.symbol_kind(&node) {
            let name = self.extract_name(&node);
            if !name.is_empty() {
                return vec![self.extract_symbol(node, kind, name)];
            }
        }

        if self.config.is_method_container(node_type) {
            self.container.push(true);
            let symbols = self.traverse_children(node);
            self.container.pop();
            return symbols;
        }

        self.traverse_children(node)
    }

    fn symbol_kind(&self, node: &Node) -> Option<SymbolKind> {
        let node_type = node.kind();

        if self.config.is_function_binding(node_type) {
            let value = node.child_by_field_name("value")?;
            return matches!(
                value.kind(),
                "arrow_function" | "function_expression" | "function" | "generator_function"
            )
            .then_some(SymbolKind::Function);
        }

        let kind = self.config.node_type_to_kind(node_type)?;
        match kind {
            SymbolKind::Function if self.container.last().copied().unwrap_or(false) => {
                Some(SymbolKind::Method)
            }
            SymbolKind::Struct if node_type == "type_spec" => {
                match node.child_by_field_name("type").map(|t| t.kind()) {
                    Some("struct_type") => Some(SymbolKind::Struct),
                    Some("interface_type") => Some(SymbolKind::Interface),
                    _ => Some(SymbolKind::TypeAlias),
                }
            }
            // `struct foo x;` is a use, not a definition
            SymbolKind::Struct | SymbolKind::Enum | SymbolKind::Class
                if matches!(self.language, Language::C | Language::Cpp)
                    && node.child_by_field_name("body").is_none() =>
            {
                None
            }
            other => Some(other),
        }
    }

    fn extract_symbol(&mut self, node: Node, kind: SymbolKind, name: String) -> SymbolNode {
        let start = node.start_position();
        let end = node.end_position();
        let signature = self.extract_signature(&node, kind);
        let doc_comment = self.extract_docstring(&node);
        let exported = self.check_exported(&node, &name);

        self.scope.push(name.clone());
        self.container.push(kind.is_container());
        let children = self.traverse_children(node);
        self.container.pop();
        self.scope.pop();

        SymbolNode {
            name,
            kind,
            start_line: start.row as u32 + 1,
            end_line: end.row as u32 + 1,
            signature,
            doc_comment,
            exported,
            children,
        }
    }

    fn extract_name(&self, node: &Node) -> String {
        for field_name in ["name", "declarator"] {
            if let Some(mut name_node) = node.child_by_field_name(field_name) {
                // C/C++ wrap the identifier in pointer/function declarators
                while let Some(inner) = name_node.child_by_field_name("declarator") {
                    name_node = inner;
                }
                let name = self.get_node_text(&name_node);
                if !name.is_empty() {
                    return name;
                }
            }
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "identifier" || child.kind() == "type_identifier" {
                return self.get_node_text(&child);
            }
        }

        String::new()
    }

    fn extract_signature(&self, node: &Node, kind: SymbolKind) -> Option<String> {
        match kind {
            SymbolKind::Function
            | SymbolKind::Method
            | SymbolKind::Class
            | SymbolKind::Struct
            | SymbolKind::Interface
            | SymbolKind::Trait
            | SymbolKind::Enum
            | SymbolKind::TypeAlias => {
                let text = self.get_node_text(node);
                let sig = text.lines().next().unwrap_or("");
                let sig = sig.split('{').next().unwrap_or(sig).trim();
                if sig.is_empty() {
                    None
                } else if sig.chars().count() > 200 {
                    Some(format!("{}...", sig.chars().take(200).collect::<String>()))
                } else {
                    Some(sig.to_string())
                }
            }
            _ => None,
        }
    }

    fn extract_docstring(&self, node: &Node) -> Option<String> {
        if self.language == Language::Python {
            return self.python_docstring(node);
        }

        // Consecutive comments directly above the definition
        let mut comments = Vec::new();
        let mut prev = node.prev_sibling();
        while let Some(sibling) = prev {
            if !sibling.kind().contains("comment") {
                break;
            }
            comments.push(self.get_node_text(&sibling));
            prev = sibling.prev_sibling();
        }
        if comments.is_empty() {
            return None;
        }
        comments.reverse();
        let doc = self.clean_docstring(&comments.join("\n"));
        (!doc.is_empty()).then_some(doc)
    }

    fn python_docstring(&self, node: &Node) -> Option<String> {
        let body = node.child_by_field_name("body")?;
        let first = body.named_child(0)?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let string = first.named_child(0)?;
        if string.kind() != "string" {
            return None;
        }
        let text = self.get_node_text(&string);
        let doc = text
            .trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .trim_matches('"')
            .trim_matches('\'')
            .trim();
        (!doc.is_empty()).then(|| doc.to_string())
    }

    fn clean_docstring(&self, text: &str) -> String {
        text.lines()
            .map(|line| {
                line.trim()
                    .trim_start_matches("///")
                    .trim_start_matches("//!")
                    .trim_start_matches("//")
                    .trim_start_matches("/**")
                    .trim_start_matches("/*")
                    .trim_start_matches('*')
                    .trim_end_matches("*/")
                    .trim_start_matches('#')
                    .trim()
            })
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn check_exported(&self, node: &Node, name: &str) -> bool {
        match self.language {
            Language::Rust => self.get_node_text(node).starts_with("pub"),
            Language::TypeScript | Language::Tsx | Language::JavaScript | Language::Jsx => {
                // variable_declarator -> lexical_declaration -> export_statement
                let mut current = node.parent();
                for _ in 0..2 {
                    match current {
                        Some(parent) if parent.kind() == "export_statement" => return true,
                        Some(parent) => current = parent.parent(),
                        None => break,
                    }
                }
                false
            }
            Language::Python => !name.starts_with('_'),
            Language::Go => name.chars().next().is_some_and(|c| c.is_uppercase()),
            Language::Java => {
                let mut cursor = node.walk();
                let public = node
                    .children(&mut cursor)
                    .any(|c| c.kind() == "modifiers" && self.get_node_text(&c).contains("public"));
                public
            }
            Language::C | Language::Cpp => !self.get_node_text(node).starts_with("static"),
            _ => false,
        }
    }

    // =========================================================================
    // Relationships
    // =========================================================================

    fn push_relationship(&mut self, kind: RelationshipKind, node: &Node, target: String) {
        let start = node.start_position();
        self.relationships.push(RelationshipFact {
            kind,
            source_symbol: self.scope.last().cloned(),
            target_file: None,
            target_symbol: Some(target),
            line: start.row as u32 + 1,
            column: start.column as u32,
        });
    }

    fn record_call(&mut self, node: &Node) {
        if let Some(callee) = self.extract_call_name(node) {
            self.push_relationship(RelationshipKind::Call, node, callee);
        }
    }

    fn extract_call_name(&self, node: &Node) -> Option<String> {
        let raw = match node.kind() {
            "method_invocation" => {
                let name = self.get_node_text(&node.child_by_field_name("name")?);
                match node.child_by_field_name("object") {
                    Some(object) => format!("{}.{}", self.get_node_text(&object), name),
                    None => name,
                }
            }
            "object_creation_expression" => self.get_node_text(&node.child_by_field_name("type")?),
            "new_expression" => self.get_node_text(&node.child_by_field_name("constructor")?),
            _ => self.get_node_text(&node.child_by_field_name("function")?),
        };
        let name = clean_callee(&raw);
        (!name.is_empty()).then_some(name)
    }

    fn extract_imports(&mut self, node: &Node) {
        for module in self.import_modules(node) {
            if !module.is_empty() {
                self.push_relationship(RelationshipKind::Import, node, module);
            }
        }
    }

    fn import_modules(&self, node: &Node) -> Vec<String> {
        match self.language {
            Language::Rust => node
                .child_by_field_name("argument")
                .map(|arg| vec![rust_use_path(&self.get_node_text(&arg))])
                .unwrap_or_default(),
            Language::TypeScript | Language::Tsx | Language::JavaScript | Language::Jsx => node
                .child_by_field_name("source")
                .map(|src| vec![strip_quotes(&self.get_node_text(&src))])
                .unwrap_or_default(),
            Language::Go => node
                .child_by_field_name("path")
                .map(|p| vec![strip_quotes(&self.get_node_text(&p))])
                .unwrap_or_default(),
            Language::Python => self.python_imports(node),
            Language::Java => {
                let mut cursor = node.walk();
                let path = node
                    .named_children(&mut cursor)
                    .find(|c| matches!(c.kind(), "scoped_identifier" | "identifier"))
                    .map(|c| self.get_node_text(&c));
                path.into_iter().collect()
            }
            Language::C | Language::Cpp => node
                .child_by_field_name("path")
                .map(|p| {
                    let text = self.get_node_text(&p);
                    if p.kind() == "system_lib_string" {
                        vec![text.trim_matches(|c: char| c == '<' || c == '>').to_string()]
                    } else {
                        vec![relative_include(&strip_quotes(&text))]
                    }
                })
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    fn python_imports(&self, node: &Node) -> Vec<String> {
        if node.kind() == "import_from_statement" {
            return node
                .child_by_field_name("module_name")
                .and_then(|m| python_module(&self.get_node_text(&m)))
                .into_iter()
                .collect();
        }

        let mut cursor = node.walk();
        let modules = node
            .children_by_field_name("name", &mut cursor)
            .filter_map(|name| {
                let target = if name.kind() == "aliased_import" {
                    name.child_by_field_name("name")?
                } else {
                    name
                };
                Some(self.get_node_text(&target))
            })
            .collect();
        modules
    }

    fn get_node_text(&self, node: &Node) -> String {
        self.content
            .get(node.start_byte()..node.end_byte())
            .unwrap_or("")
            .to_string()
    }
}

/// Normalize callee text: drop whitespace, generic arguments and any receiver
/// expression that is itself a call (`a().b` -> `b`)
fn clean_callee(raw: &str) -> String {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

    let mut without_generics = String::with_capacity(compact.len());
    let mut depth = 0usize;
    for c in compact.chars() {
        match c {
            '<' => depth += 1,
            '>' if depth > 0 => depth -= 1,
            _ if depth == 0 => without_generics.push(c),
            _ => {}
        }
    }

    let tail = match without_generics.rfind(')') {
        Some(pos) => &without_generics[pos + 1..],
        None => without_generics.as_str(),
    };
    tail.trim_start_matches('.')
        .trim_start_matches("?.")
        .trim_end_matches("::")
        .replace("::::", "::")
}

fn strip_quotes(text: &str) -> String {
    text.trim_matches(|c: char| c == '"' || c == '\'' || c == '`').to_string()
}

/// `crate::a::{b, c}` -> `crate::a`, `x as y` -> `x`, `a::*` -> `a`
fn rust_use_path(text: &str) -> String {
    let text = text.split(" as ").next().unwrap_or(text);
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let path = compact.split("::{").next().unwrap_or(&compact);
    let path = path.trim_end_matches("::*");
    if path.starts_with('{') {
        String::new()
    } else {
        path.to_string()
    }
}

/// `.models` -> `./models`, `..pkg.util` -> `../pkg/util`, `pkg.util` stays dotted
fn python_module(text: &str) -> Option<String> {
    let dots = text.chars().take_while(|c| *c == '.').count();
    if dots == 0 {
        return Some(text.to_string());
    }
    let rest = text[dots..].replace('.', "/");
    if rest.is_empty() {
        return None;
    }
    let prefix = if dots == 1 {
        "./".to_string()
    } else {
        "../".repeat(dots - 1)
    };
    Some(format!("{}{}", prefix, rest))
}

fn relative_include(path: &str) -> String {
    if path.starts_with("./") || path.starts_with("../") || path.starts_with('/') {
        path.to_string()
    } else {
        format!("./{}", path)
    }
}
