use crate::ast::{Arena, Literal, Name, Node, NodeId};
use crate::pattern::Pattern;
use crate::pattern::build::*;
use crate::{Context, InvariantViolation, Transform};
use rustc_hash::FxHashMap;
use std::sync::LazyLock;
use tracing::{debug, trace};

// switch (s.hashCode()) { ... }
static HASH_SWITCH: LazyLock<Pattern> = LazyLock::new(|| {
    switch(
        call(named("input", any_ident()), "hashCode", vec![]),
        vec![repeat(capture("section"))],
    )
});

// if (s.equals("a")) index = k; [else ...]
static DISPATCH: LazyLock<Pattern> = LazyLock::new(|| {
    if_(
        call(named("target", any_ident()), "equals", vec![named("value", string_literal())]),
        embedded(expr_stmt(assign(named("index", any_ident()), named("case", int_literal())))),
        optional(capture("else")),
    )
});

/// `String.hashCode` as the JVM computes it, over UTF-16 code units.
fn java_hash(value: &str) -> i32 {
    value
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// The local reset to `-1` before the hash switch, by `int index = -1;` or `index = -1;`.
fn index_reset(arena: &Arena, statement: NodeId) -> Option<Name> {
    let is_minus_one = |id: NodeId| matches!(arena[id].as_literal(), Some(Literal::Int(-1)));
    match &arena[statement] {
        Node::VariableDeclaration { variables, .. } => match variables.as_slice() {
            [variable] => match &arena[*variable] {
                Node::VariableInitializer {
                    name,
                    initializer: Some(initializer),
                } if is_minus_one(*initializer) => Some(name.clone()),
                _ => None,
            },
            _ => None,
        },
        Node::ExpressionStatement { expression } => match &arena[*expression] {
            Node::Assignment { target, value, .. } if is_minus_one(*value) => {
                arena[*target].as_identifier().cloned()
            }
            _ => None,
        },
        _ => None,
    }
}

/// Maps every index the hash switch can store to its string. Fails unless each section is one
/// hash label followed by an `equals` chain whose strings all hash to that label.
fn collect_cases(
    arena: &Arena,
    sections: &[NodeId],
    input: &Name,
    index: &Name,
) -> Option<FxHashMap<i32, Name>> {
    let mut cases = FxHashMap::default();
    for (i, section) in sections.iter().enumerate() {
        let Node::SwitchSection { labels, statements } = &arena[*section] else {
            return None;
        };
        let [label] = labels.as_slice() else {
            return None;
        };
        let Node::CaseLabel { value: Some(hash) } = arena[*label] else {
            return None;
        };
        let hash = arena[hash].as_literal().and_then(Literal::as_int)?;
        let chain = match statements.as_slice() {
            [chain, exit] if matches!(arena[*exit], Node::Break { label: None }) => *chain,
            [chain] if i + 1 == sections.len() => *chain,
            _ => return None,
        };

        let mut current = Some(chain);
        while let Some(statement) = current {
            let m = DISPATCH.match_node(arena, statement)?;
            if arena[m["target"]].as_identifier() != Some(input)
                || arena[m["index"]].as_identifier() != Some(index)
            {
                return None;
            }
            let value = arena[m["value"]].as_literal().and_then(Literal::as_str)?;
            if java_hash(value) != hash {
                debug!(%value, hash, "string case under a foreign hash label");
                return None;
            }
            let case = arena[m["case"]].as_literal().and_then(Literal::as_int)?;
            if cases.insert(case, value.clone()).is_some() {
                return None;
            }
            current = m.get("else");
        }
    }
    Some(cases)
}

/// The case labels of the index switch paired with the strings they stand for.
fn relabel(arena: &Arena, dispatch: NodeId, cases: &FxHashMap<i32, Name>) -> Option<Vec<(NodeId, Name)>> {
    let Node::Switch { sections, .. } = &arena[dispatch] else {
        return None;
    };
    let mut labels = Vec::new();
    for section in sections {
        let Node::SwitchSection {
            labels: section_labels,
            ..
        } = &arena[*section]
        else {
            return None;
        };
        for label in section_labels {
            let Node::CaseLabel { value: Some(value) } = arena[*label] else {
                continue;
            };
            let case = arena[value].as_literal().and_then(Literal::as_int)?;
            labels.push((value, cases.get(&case)?.clone()));
        }
    }
    Some(labels)
}

/// Rewrites javac's two-switch lowering of `switch (string)`:
///
/// ```text
/// String tmp = s;
/// int index = -1;
/// switch (tmp.hashCode()) { case 97: if (tmp.equals("a")) index = 0; break; }
/// switch (index) { case 0: ... }
/// ```
pub struct StringSwitchRewriter;

impl Transform for StringSwitchRewriter {
    fn name(&self) -> &'static str {
        "StringSwitchRewriter"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        _context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        for id in arena.descendants(root) {
            if arena.contains(root, id)
                && matches!(arena[id], Node::Switch { .. })
                && arena.is_in_statement_list(id)
            {
                handle_hash_switch(arena, id);
            }
        }
        Ok(())
    }
}

fn handle_hash_switch(arena: &mut Arena, hash_switch: NodeId) -> bool {
    let Some(m) = HASH_SWITCH.match_node(arena, hash_switch) else {
        return false;
    };
    let Some(input) = arena[m["input"]].as_identifier().cloned() else {
        return false;
    };
    let Some(reset) = arena.prev_sibling(hash_switch) else {
        return false;
    };
    let Some(index) = index_reset(arena, reset) else {
        return false;
    };
    let Some(dispatch) = arena.next_sibling(hash_switch) else {
        return false;
    };
    let Node::Switch { selector, .. } = arena[dispatch] else {
        return false;
    };
    if arena[selector].as_identifier() != Some(&index) {
        return false;
    }
    let Some(cases) = collect_cases(arena, m.all("section"), &input, &index) else {
        return false;
    };
    let Some(labels) = relabel(arena, dispatch, &cases) else {
        debug!(%index, "index switch case without a string");
        return false;
    };

    let siblings = arena.siblings(hash_switch).unwrap_or_default().to_vec();
    let index_sections = match &arena[dispatch] {
        Node::Switch { sections, .. } => sections.clone(),
        _ => Vec::new(),
    };
    // The index switch's selector goes away with the rest.
    let index_used = index_sections
        .iter()
        .chain(
            siblings
                .iter()
                .filter(|sibling| ![reset, hash_switch, dispatch].contains(sibling)),
        )
        .any(|id| arena.uses_variable(*id, &index));
    if index_used {
        debug!(%index, "switch index read elsewhere");
        return false;
    }

    // `String tmp = s;` collapses into the selector when nothing else reads `tmp`.
    let copy = arena.prev_sibling(reset).and_then(|statement| {
        let Node::VariableDeclaration { variables, .. } = &arena[statement] else {
            return None;
        };
        let [variable] = variables.as_slice() else {
            return None;
        };
        let Node::VariableInitializer {
            name,
            initializer: Some(initializer),
        } = &arena[*variable]
        else {
            return None;
        };
        let unused = siblings
            .iter()
            .filter(|sibling| ![statement, hash_switch].contains(sibling))
            .all(|sibling| !arena.uses_variable(*sibling, &input));
        (*name == input && unused).then_some((statement, *initializer))
    });

    for (value, string) in labels {
        let literal = arena.literal(Literal::String(string));
        arena.replace(value, literal);
    }
    let new_selector = match copy {
        Some((_, initializer)) => initializer,
        None => arena.deep_clone(m["input"]),
    };
    arena.replace(selector, new_selector);
    if let Some((statement, _)) = copy {
        arena.detach(statement);
    }
    arena.detach(reset);
    arena.detach(hash_switch);
    trace!(switch = %arena.debug(&dispatch), "rewrote string switch");
    true
}
