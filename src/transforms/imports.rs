use crate::ast::{Arena, Name, Node, NodeId, Role};
use crate::{Context, InvariantViolation, Transform};
use rustc_hash::FxHashSet;
use tracing::trace;

/// Sorts and dedupes the imports of each compilation unit, dropping the implicit ones.
pub struct CollapseImports;

impl Transform for CollapseImports {
    fn name(&self) -> &'static str {
        "CollapseImports"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        for id in arena.descendants(root) {
            if let Node::CompilationUnit {
                package, imports, ..
            } = &arena[id]
            {
                let (package, imports) = (package.clone(), imports.clone());
                handle_unit(arena, id, &package, imports, context);
            }
        }
        Ok(())
    }
}

/// Whether a single-type import names something visible without it.
fn is_implicit(name: &Name, package: &str) -> bool {
    let owner = name.package();
    owner == "java.lang" || owner == package
}

fn handle_unit(arena: &mut Arena, unit: NodeId, package: &str, imports: Vec<NodeId>, context: &Context<'_>) {
    let settings = context.settings;
    let mut seen = FxHashSet::default();
    let mut kept = Vec::new();
    for import in imports {
        let Node::Import { name, is_static } = &arena[import] else {
            continue;
        };
        let (name, is_static) = (name.clone(), *is_static);
        arena.detach(import);
        if settings.force_fully_qualified_references {
            continue;
        }
        if !is_static && !settings.force_explicit_imports && is_implicit(&name, package) {
            trace!(%name, "dropped implicit import");
            continue;
        }
        if seen.insert((is_static, name.clone())) {
            kept.push((is_static, name, import));
        }
    }
    // Type imports first, then static ones, each alphabetical.
    kept.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
    for (_, _, import) in kept {
        arena.push(unit, Role::Import, import);
    }
}
