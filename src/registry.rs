//! Symbol / Field Registry
//!
//! Resolves grammar symbol ids and field ids once at startup and exposes
//! typed predicates over `tree_sitter::Node` so the rest of the engine never
//! has to compare against string kind names on the hot path.

use tree_sitter::{Language, Node};

/// Field ids consumed by the evaluator, cached once per `Registry`.
pub struct FieldIds {
    pub body: Option<u16>,
    pub condition: Option<u16>,
    pub name: Option<u16>,
    pub left: Option<u16>,
    pub right: Option<u16>,
    pub operator: Option<u16>,
    pub value: Option<u16>,
    pub redirect: Option<u16>,
    pub destination: Option<u16>,
    pub variable: Option<u16>,
}

/// Node kinds listed in spec §6.2, by name. We keep the registry
/// kind-string based (rather than caching raw symbol ids) because
/// tree-sitter-bash does not guarantee stable numeric ids across grammar
/// versions, but does guarantee stable kind names.
pub struct Registry {
    pub fields: FieldIds,
}

impl Registry {
    pub fn new(language: &Language) -> Self {
        let field = |name: &str| language.field_id_for_name(name).map(|id| id.get());
        Registry {
            fields: FieldIds {
                body: field("body"),
                condition: field("condition"),
                name: field("name"),
                left: field("left"),
                right: field("right"),
                operator: field("operator"),
                value: field("value"),
                redirect: field("redirect"),
                destination: field("destination"),
                variable: field("variable"),
            },
        }
    }

    /// True for nodes that may contribute a value to argv: word,
    /// raw_string, string, simple_expansion, expansion, command_substitution.
    pub fn argumenty(&self, n: &Node) -> bool {
        matches!(
            n.kind(),
            "word"
                | "raw_string"
                | "string"
                | "simple_expansion"
                | "expansion"
                | "command_substitution"
        )
    }

    /// True for nodes that are top-level children of a `command` but do not
    /// contribute to argv: redirections and leading assignments.
    pub fn skippable_for_argv(&self, n: &Node) -> bool {
        matches!(n.kind(), "file_redirect" | "variable_assignment")
    }

    pub fn is_command(&self, n: &Node) -> bool {
        n.kind() == "command"
    }

    pub fn is_expansion(&self, n: &Node) -> bool {
        matches!(
            n.kind(),
            "simple_expansion" | "expansion" | "command_substitution"
        )
    }

    pub fn is_comment(&self, n: &Node) -> bool {
        n.kind() == "comment"
    }
}
