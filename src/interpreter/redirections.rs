//! Redirection Planner (C3)
//!
//! Scans the named children of a `command` or `redirected_statement` node
//! for `file_redirect` children and builds an ordered fd-action plan. The
//! destination path is taken as a bare literal slice — it is not expanded
//! in this spec (§4.3, §9).

use std::path::PathBuf;
use tree_sitter::Node;

use crate::interpreter::types::EvalContext;

/// One entry of a redirection plan, applied in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FdAction {
    /// Open `path` read-only, duplicate onto fd 0.
    Input(PathBuf),
    /// Open `path` write-only (create, mode 0666), duplicate onto fd 1.
    /// `truncate` selects `>` (true) vs `>>` (false).
    Output { path: PathBuf, truncate: bool },
}

/// Build the ordered redirection plan for `node` (a `command` or
/// `redirected_statement`). Later entries targeting the same fd override
/// earlier ones — the final dup order is preserved by simply keeping plan
/// entries in source order and applying them in order.
pub fn build_plan(ctx: &EvalContext, node: &Node) -> Vec<FdAction> {
    let mut plan = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() != "file_redirect" {
            continue;
        }
        if let Some(action) = plan_entry(ctx, &child) {
            plan.push(action);
        }
    }
    plan
}

fn plan_entry(ctx: &EvalContext, redirect: &Node) -> Option<FdAction> {
    let text = ctx.text(redirect);
    let destination = ctx
        .registry
        .fields
        .destination
        .and_then(|id| redirect.child_by_field_id(id))
        .map(|d| ctx.text(&d).to_string())?;

    // Determine the operator by inspecting the first non-whitespace bytes
    // of the node's textual slice (§4.3): `<` input, `>>` append, `>`
    // truncate. `&>`, `<<`, `<<-`, numeric-fd forms are out of scope.
    let trimmed = text.trim_start();
    if let Some(rest) = trimmed.strip_prefix(">>") {
        let _ = rest;
        Some(FdAction::Output {
            path: PathBuf::from(destination),
            truncate: false,
        })
    } else if let Some(rest) = trimmed.strip_prefix('>') {
        let _ = rest;
        Some(FdAction::Output {
            path: PathBuf::from(destination),
            truncate: true,
        })
    } else if trimmed.starts_with('<') {
        Some(FdAction::Input(PathBuf::from(destination)))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::signals::SignalCoordinator;
    use crate::interpreter::types::ShellState;
    use crate::registry::Registry;

    fn ctx_for<'a>(
        src: &'a str,
        state: &'a mut ShellState,
        registry: &'a Registry,
        signals: &'a SignalCoordinator,
    ) -> EvalContext<'a> {
        EvalContext {
            source: src.as_bytes(),
            registry,
            state,
            signals,
        }
    }

    fn parse(src: &str) -> (tree_sitter::Tree, Registry) {
        let mut parser = tree_sitter::Parser::new();
        let language: tree_sitter::Language = tree_sitter_bash::LANGUAGE.into();
        parser.set_language(&language).unwrap();
        let tree = parser.parse(src, None).unwrap();
        (tree, Registry::new(&language))
    }

    #[test]
    fn truncate_and_append_and_input() {
        for (src, expect_truncate) in [("echo hi > out.txt", true), ("echo hi >> out.txt", false)]
        {
            let (tree, registry) = parse(src);
            let mut state = ShellState::new();
            let signals = SignalCoordinator::new();
            let ctx = ctx_for(src, &mut state, &registry, &signals);
            let root = tree.root_node();
            let stmt_or_cmd = root.named_child(0).unwrap();
            let plan = build_plan(&ctx, &stmt_or_cmd);
            assert_eq!(plan.len(), 1);
            match &plan[0] {
                FdAction::Output { path, truncate } => {
                    assert_eq!(path, &PathBuf::from("out.txt"));
                    assert_eq!(*truncate, expect_truncate);
                }
                _ => panic!("expected Output"),
            }
        }
    }

    #[test]
    fn input_redirect() {
        let src = "cat < in.txt";
        let (tree, registry) = parse(src);
        let mut state = ShellState::new();
        let signals = SignalCoordinator::new();
        let ctx = ctx_for(src, &mut state, &registry, &signals);
        let root = tree.root_node();
        let stmt_or_cmd = root.named_child(0).unwrap();
        let plan = build_plan(&ctx, &stmt_or_cmd);
        assert_eq!(plan, vec![FdAction::Input(PathBuf::from("in.txt"))]);
    }
}
