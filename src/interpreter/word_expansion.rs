//! Word Expander (C2)
//!
//! Converts an argument-like AST node to a byte string, and assembles an
//! argv for a `command` node. Every expansion result is owned: callers
//! never borrow from a transient buffer, only from `ctx.source` (the script
//! buffer) or freshly allocated `Vec<u8>`s.

use tree_sitter::Node;

use crate::interpreter::errors::EngineResult;
use crate::interpreter::evaluator;
use crate::interpreter::types::EvalContext;

/// Expand a single argument-like node to its byte-string value. The only
/// way this can fail is a command substitution whose child hit the fatal
/// `waitpid` invariant of §7; every other case is recovered locally.
pub fn expand_node(ctx: &mut EvalContext, node: &Node) -> EngineResult<Vec<u8>> {
    Ok(match node.kind() {
        "word" => ctx.text(node).as_bytes().to_vec(),

        "raw_string" => strip_quotes(ctx.text(node), '\''),

        "string" => expand_double_quoted(ctx, node)?,

        "simple_expansion" => expand_simple(ctx, node),

        "expansion" => expand_braced(ctx, node),

        "command_substitution" => expand_command_substitution(ctx, node)?,

        // Forward-compatible fallback: unknown argument-like kinds are
        // rendered as their literal source slice.
        _ => ctx.text(node).as_bytes().to_vec(),
    })
}

/// Strip a single surrounding `quote` character pair. If the slice isn't
/// enclosed by a matching pair, return it verbatim (per §4.2.1).
fn strip_quotes(text: &str, quote: char) -> Vec<u8> {
    let bytes = text.as_bytes();
    let q = quote as u8;
    if bytes.len() >= 2 && bytes[0] == q && bytes[bytes.len() - 1] == q {
        bytes[1..bytes.len() - 1].to_vec()
    } else {
        bytes.to_vec()
    }
}

/// Render a double-quoted string (§4.2.2). With no named children, it is a
/// literal slice with the surrounding `"` pair removed. Otherwise each named
/// child is expanded and concatenated in order.
fn expand_double_quoted(ctx: &mut EvalContext, node: &Node) -> EngineResult<Vec<u8>> {
    if node.named_child_count() == 0 {
        return Ok(strip_quotes(ctx.text(node), '"'));
    }

    let mut out = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "string_content" => out.extend_from_slice(ctx.text(&child).as_bytes()),
            "expansion" => out.extend_from_slice(&expand_braced(ctx, &child)),
            "simple_expansion" => out.extend_from_slice(&expand_simple(ctx, &child)),
            "command_substitution" => {
                out.extend_from_slice(&expand_command_substitution(ctx, &child)?)
            }
            // Forward-compatible fallback.
            _ => out.extend_from_slice(ctx.text(&child).as_bytes()),
        }
    }
    Ok(out)
}

/// `$NAME` / `$?` / `$$` (§4.2.1).
fn expand_simple(ctx: &mut EvalContext, node: &Node) -> Vec<u8> {
    let slice = ctx.text(node);
    if slice == "$?" {
        return ctx.state.last_status.to_string().into_bytes();
    }
    if slice == "$$" {
        return ctx.state.pid.to_string().into_bytes();
    }
    // First named child is the variable_name (or the expansion has no named
    // child for bare `$?`/`$$`, handled above).
    if let Some(name_node) = node.named_child(0) {
        let name = ctx.text(&name_node);
        return lookup_var(name);
    }
    Vec::new()
}

/// `${NAME}` (§4.2.1). No modifiers are honored; unknown forms fall back to
/// the literal slice.
fn expand_braced(ctx: &mut EvalContext, node: &Node) -> Vec<u8> {
    if let Some(name_node) = node
        .named_child(0)
        .filter(|c| c.kind() == "variable_name")
    {
        let name = ctx.text(&name_node);
        return lookup_var(name);
    }
    ctx.text(node).as_bytes().to_vec()
}

fn lookup_var(name: &str) -> Vec<u8> {
    std::env::var(name).unwrap_or_default().into_bytes()
}

/// `$(CMD)` (§4.2.3). Strips the outer `$(` `)`, re-enters the evaluator on
/// a forked child with its stdout captured through a pipe, and strips
/// trailing newlines from the captured bytes. The child inherits the
/// *current* shell's pid and `last_status` (as a real `fork()` would),
/// rather than computing a fresh pid for `$$` inside the substitution.
fn expand_command_substitution(ctx: &mut EvalContext, node: &Node) -> EngineResult<Vec<u8>> {
    let slice = ctx.text(node);
    let inner = slice
        .strip_prefix("$(")
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(slice);

    match evaluator::run_captured(inner, ctx.signals, ctx.state.pid, ctx.state.last_status)? {
        Some(mut captured) => {
            while matches!(captured.last(), Some(b'\n')) {
                captured.pop();
            }
            Ok(captured)
        }
        None => {
            ctx.state.set_status(1);
            Ok(Vec::new())
        }
    }
}

/// Build an argv for a `command` node (§4.2.4). Returns the expanded
/// arguments in order; element 0 is the program name. Empty strings are
/// preserved positionally.
pub fn expand_argv(ctx: &mut EvalContext, command: &Node) -> EngineResult<Vec<Vec<u8>>> {
    let mut argv = Vec::new();

    // Locate the program-name node: prefer a `command_name` child's first
    // argument-like descendant; otherwise the first top-level argument-like
    // child that isn't `command_name` or skippable.
    let mut cursor = command.walk();
    for child in command.named_children(&mut cursor) {
        if child.kind() == "command_name" {
            if let Some(inner) = first_argumenty_descendant(ctx, &child) {
                argv.push(expand_node(ctx, &inner)?);
            }
            continue;
        }
        if ctx.registry.skippable_for_argv(&child) {
            continue;
        }
        if ctx.registry.argumenty(&child) {
            argv.push(expand_node(ctx, &child)?);
        }
    }

    Ok(argv)
}

fn first_argumenty_descendant<'t>(ctx: &EvalContext, node: &Node<'t>) -> Option<Node<'t>> {
    // `command_name` wraps exactly one argument-like node in tree-sitter-bash;
    // fall back to a shallow search in case the grammar nests it.
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if ctx.registry.argumenty(&child) {
            return Some(child);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::signals::SignalCoordinator;
    use crate::interpreter::types::ShellState;
    use crate::registry::Registry;

    fn parse(src: &str) -> (tree_sitter::Tree, Registry) {
        let mut parser = tree_sitter::Parser::new();
        let language: tree_sitter::Language = tree_sitter_bash::LANGUAGE.into();
        parser.set_language(&language).unwrap();
        let tree = parser.parse(src, None).unwrap();
        (tree, Registry::new(&language))
    }

    #[test]
    fn raw_string_strips_quotes() {
        let (tree, registry) = parse("echo 'hi'");
        let mut state = ShellState::new();
        let signals = SignalCoordinator::new();
        let mut ctx = EvalContext {
            source: b"echo 'hi'",
            registry: &registry,
            state: &mut state,
            signals: &signals,
        };
        let root = tree.root_node();
        let command = root.named_child(0).unwrap();
        let argv = expand_argv(&mut ctx, &command).unwrap();
        assert_eq!(argv, vec![b"echo".to_vec(), b"hi".to_vec()]);
    }

    #[test]
    fn dollar_question_expands_to_last_status() {
        let src = "echo $?";
        let (tree, registry) = parse(src);
        let mut state = ShellState::new();
        state.last_status = 7;
        let signals = SignalCoordinator::new();
        let mut ctx = EvalContext {
            source: src.as_bytes(),
            registry: &registry,
            state: &mut state,
            signals: &signals,
        };
        let root = tree.root_node();
        let command = root.named_child(0).unwrap();
        let argv = expand_argv(&mut ctx, &command).unwrap();
        assert_eq!(argv, vec![b"echo".to_vec(), b"7".to_vec()]);
    }

    #[test]
    fn empty_string_argument_is_preserved() {
        let src = "echo \"\" x";
        let (tree, registry) = parse(src);
        let mut state = ShellState::new();
        let signals = SignalCoordinator::new();
        let mut ctx = EvalContext {
            source: src.as_bytes(),
            registry: &registry,
            state: &mut state,
            signals: &signals,
        };
        let root = tree.root_node();
        let command = root.named_child(0).unwrap();
        let argv = expand_argv(&mut ctx, &command).unwrap();
        assert_eq!(
            argv,
            vec![b"echo".to_vec(), b"".to_vec(), b"x".to_vec()]
        );
    }
}
