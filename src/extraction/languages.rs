//! Language-specific configurations for tree-sitter analysis

use tree_sitter::Language as TsLanguage;

use crate::types::{Language, SymbolKind};

/// Node-type tables for one grammar
pub struct LanguageConfig {
    /// Node types that map to functions (methods when nested in a container)
    pub function_types: &'static [&'static str],
    /// Node types that are always methods
    pub method_types: &'static [&'static str],
    pub class_types: &'static [&'static str],
    pub struct_types: &'static [&'static str],
    pub interface_types: &'static [&'static str],
    pub trait_types: &'static [&'static str],
    pub enum_types: &'static [&'static str],
    pub type_alias_types: &'static [&'static str],
    pub constant_types: &'static [&'static str],
    pub module_types: &'static [&'static str],
    /// Non-symbol nodes whose functions are methods (e.g. Rust `impl` blocks)
    pub method_container_types: &'static [&'static str],
    /// Declarators that name a function value (`const f = () => {}`)
    pub function_binding_types: &'static [&'static str],
    pub import_types: &'static [&'static str],
    pub call_types: &'static [&'static str],
}

impl LanguageConfig {
    /// Convert a tree-sitter node type to a symbol kind
    pub fn node_type_to_kind(&self, node_type: &str) -> Option<SymbolKind> {
        let tables: [(&[&str], SymbolKind); 10] = [
            (self.function_types, SymbolKind::Function),
            (self.method_types, SymbolKind::Method),
            (self.class_types, SymbolKind::Class),
            (self.struct_types, SymbolKind::Struct),
            (self.interface_types, SymbolKind::Interface),
            (self.trait_types, SymbolKind::Trait),
            (self.enum_types, SymbolKind::Enum),
            (self.type_alias_types, SymbolKind::TypeAlias),
            (self.constant_types, SymbolKind::Constant),
            (self.module_types, SymbolKind::Module),
        ];
        tables
            .iter()
            .find(|(types, _)| types.contains(&node_type))
            .map(|(_, kind)| *kind)
    }

    pub fn is_method_container(&self, node_type: &str) -> bool {
        self.method_container_types.contains(&node_type)
    }

    pub fn is_function_binding(&self, node_type: &str) -> bool {
        self.function_binding_types.contains(&node_type)
    }

    pub fn is_import_node(&self, node_type: &str) -> bool {
        self.import_types.contains(&node_type)
    }

    pub fn is_call_node(&self, node_type: &str) -> bool {
        self.call_types.contains(&node_type)
    }
}

/// Get the tree-sitter grammar for a language, if one is bundled
pub fn get_language(lang: Language) -> Option<TsLanguage> {
    match lang {
        Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
        Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        Language::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
        Language::JavaScript | Language::Jsx => Some(tree_sitter_javascript::LANGUAGE.into()),
        Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
        Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
        Language::Java => Some(tree_sitter_java::LANGUAGE.into()),
        Language::C => Some(tree_sitter_c::LANGUAGE.into()),
        Language::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
        _ => None,
    }
}

/// Get the node-type tables for a language
pub fn get_config(lang: Language) -> &'static LanguageConfig {
    match lang {
        Language::Rust => &RUST_CONFIG,
        Language::TypeScript | Language::Tsx => &TYPESCRIPT_CONFIG,
        Language::JavaScript | Language::Jsx => &JAVASCRIPT_CONFIG,
        Language::Python => &PYTHON_CONFIG,
        Language::Go => &GO_CONFIG,
        Language::Java => &JAVA_CONFIG,
        Language::C => &C_CONFIG,
        Language::Cpp => &CPP_CONFIG,
        _ => &DEFAULT_CONFIG,
    }
}

static DEFAULT_CONFIG: LanguageConfig = LanguageConfig {
    function_types: &[],
    method_types: &[],
    class_types: &[],
    struct_types: &[],
    interface_types: &[],
    trait_types: &[],
    enum_types: &[],
    type_alias_types: &[],
    constant_types: &[],
    module_types: &[],
    method_container_types: &[],
    function_binding_types: &[],
    import_types: &[],
    call_types: &[],
};

static RUST_CONFIG: LanguageConfig = LanguageConfig {
    function_types: &["function_item", "function_signature_item"],
    method_types: &[],
    class_types: &[],
    struct_types: &["struct_item", "union_item"],
    interface_types: &[],
    trait_types: &["trait_item"],
    enum_types: &["enum_item"],
    type_alias_types: &["type_item"],
    constant_types: &["const_item", "static_item"],
    module_types: &["mod_item"],
    method_container_types: &["impl_item"],
    function_binding_types: &[],
    import_types: &["use_declaration"],
    call_types: &["call_expression"],
};

static TYPESCRIPT_CONFIG: LanguageConfig = LanguageConfig {
    function_types: &["function_declaration", "generator_function_declaration"],
    method_types: &["method_definition", "method_signature", "abstract_method_signature"],
    class_types: &["class_declaration", "abstract_class_declaration"],
    struct_types: &[],
    interface_types: &["interface_declaration"],
    trait_types: &[],
    enum_types: &["enum_declaration"],
    type_alias_types: &["type_alias_declaration"],
    constant_types: &[],
    module_types: &["internal_module", "module"],
    method_container_types: &[],
    function_binding_types: &["variable_declarator"],
    import_types: &["import_statement"],
    call_types: &["call_expression", "new_expression"],
};

static JAVASCRIPT_CONFIG: LanguageConfig = LanguageConfig {
    function_types: &["function_declaration", "generator_function_declaration"],
    method_types: &["method_definition"],
    class_types: &["class_declaration"],
    struct_types: &[],
    interface_types: &[],
    trait_types: &[],
    enum_types: &[],
    type_alias_types: &[],
    constant_types: &[],
    module_types: &[],
    method_container_types: &[],
    function_binding_types: &["variable_declarator"],
    import_types: &["import_statement"],
    call_types: &["call_expression", "new_expression"],
};

static PYTHON_CONFIG: LanguageConfig = LanguageConfig {
    // Python methods are function_definition inside class
    function_types: &["function_definition"],
    method_types: &[],
    class_types: &["class_definition"],
    struct_types: &[],
    interface_types: &[],
    trait_types: &[],
    enum_types: &[],
    type_alias_types: &[],
    constant_types: &[],
    module_types: &[],
    method_container_types: &[],
    function_binding_types: &[],
    import_types: &["import_statement", "import_from_statement"],
    call_types: &["call"],
};

static GO_CONFIG: LanguageConfig = LanguageConfig {
    function_types: &["function_declaration"],
    method_types: &["method_declaration"],
    class_types: &[],
    // refined to Interface when the type_spec declares an interface_type
    struct_types: &["type_spec"],
    interface_types: &[],
    trait_types: &[],
    enum_types: &[],
    type_alias_types: &["type_alias"],
    constant_types: &["const_spec"],
    module_types: &[],
    method_container_types: &[],
    function_binding_types: &[],
    import_types: &["import_spec"],
    call_types: &["call_expression"],
};

static JAVA_CONFIG: LanguageConfig = LanguageConfig {
    function_types: &[],
    method_types: &["method_declaration", "constructor_declaration"],
    class_types: &["class_declaration", "record_declaration"],
    struct_types: &[],
    interface_types: &["interface_declaration"],
    trait_types: &[],
    enum_types: &["enum_declaration"],
    type_alias_types: &[],
    constant_types: &[],
    module_types: &[],
    method_container_types: &[],
    function_binding_types: &[],
    import_types: &["import_declaration"],
    call_types: &["method_invocation", "object_creation_expression"],
};

static C_CONFIG: LanguageConfig = LanguageConfig {
    function_types: &["function_definition"],
    method_types: &[],
    class_types: &[],
    struct_types: &["struct_specifier", "union_specifier"],
    interface_types: &[],
    trait_types: &[],
    enum_types: &["enum_specifier"],
    type_alias_types: &["type_definition"],
    constant_types: &["preproc_def"],
    module_types: &[],
    method_container_types: &[],
    function_binding_types: &[],
    import_types: &["preproc_include"],
    call_types: &["call_expression"],
};

static CPP_CONFIG: LanguageConfig = LanguageConfig {
    // Methods are function_definition inside class
    function_types: &["function_definition"],
    method_types: &[],
    class_types: &["class_specifier"],
    struct_types: &["struct_specifier", "union_specifier"],
    interface_types: &[],
    trait_types: &[],
    enum_types: &["enum_specifier"],
    type_alias_types: &["type_definition", "alias_declaration"],
    constant_types: &["preproc_def"],
    module_types: &["namespace_definition"],
    method_container_types: &[],
    function_binding_types: &[],
    import_types: &["preproc_include"],
    call_types: &["call_expression"],
};
