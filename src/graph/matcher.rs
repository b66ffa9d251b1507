//! Name matching between recorded call targets and symbol names

/// Decides whether a recorded call target refers to a symbol name
pub trait SymbolMatcher {
    fn matches(&self, target: &str, name: &str) -> bool;

    /// The unqualified tail of `name`, used for symbol-table lookups
    fn base_name<'n>(&self, name: &'n str) -> &'n str;
}

/// Exact match, or `target` ends with one of the separators followed by `name`
/// (`obj.name`, `path::name`, `new name`, `file/name`, `Class#name`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuffixMatcher {
    separators: Vec<String>,
}

pub const DEFAULT_SEPARATORS: &[&str] = &[".", "::", " ", "/", "#"];

impl SuffixMatcher {
    pub fn new<I, S>(separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            separators: separators
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
        }
    }

    pub fn separators(&self) -> &[String] {
        &self.separators
    }
}

impl Default for SuffixMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SEPARATORS.iter().copied())
    }
}

impl SymbolMatcher for SuffixMatcher {
    fn matches(&self, target: &str, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        if target == name {
            return true;
        }
        let Some(prefix) = target.strip_suffix(name) else {
            return false;
        };
        self.separators.iter().any(|sep| prefix.ends_with(sep.as_str()))
    }

    fn base_name<'n>(&self, name: &'n str) -> &'n str {
        let mut start = 0;
        for sep in &self.separators {
            if let Some(pos) = name.rfind(sep.as_str()) {
                start = start.max(pos + sep.len());
            }
        }
        &name[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches() {
        let m = SuffixMatcher::default();
        assert!(m.matches("helper", "helper"));
        assert!(m.matches("self.helper", "helper"));
        assert!(m.matches("utils::helper", "helper"));
        assert!(m.matches("new Helper", "Helper"));
        assert!(m.matches("src/lib/helper", "helper"));
        assert!(m.matches("Widget#helper", "helper"));
        assert!(m.matches("crate::util::helper", "util::helper"));
    }

    #[test]
    fn test_default_rejects() {
        let m = SuffixMatcher::default();
        assert!(!m.matches("myhelper", "helper"));
        assert!(!m.matches("helper_two", "helper"));
        assert!(!m.matches("helper.run", "helper"));
        assert!(!m.matches("anything", ""));
    }

    #[test]
    fn test_custom_separators() {
        let m = SuffixMatcher::new(["->"]);
        assert!(m.matches("obj->run", "run"));
        assert!(!m.matches("obj.run", "run"));
        assert_eq!(m.separators(), ["->".to_string()]);
    }

    #[test]
    fn test_base_name() {
        let m = SuffixMatcher::default();
        assert_eq!(m.base_name("helper"), "helper");
        assert_eq!(m.base_name("a::b::helper"), "helper");
        assert_eq!(m.base_name("obj.method"), "method");
        assert_eq!(m.base_name("Widget#render"), "render");
    }
}
