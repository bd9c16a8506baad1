use super::{
    members, mentions_name, remove_empty_initializers, static_initializers, statements,
    type_declarations,
};
use crate::ast::{Arena, Modifiers, Name, Node, NodeId, TypeRef};
use crate::pattern::Pattern;
use crate::pattern::build::*;
use crate::{Context, InvariantViolation, Transform};
use rustc_hash::FxHashMap;
use std::sync::LazyLock;
use tracing::{debug, trace};

// try { map[E.X.ordinal()] = k; } catch (NoSuchFieldError e) {}
static MAPPING: LazyLock<Pattern> = LazyLock::new(|| {
    let store = assign(
        indexer(
            capture("map"),
            call(named("constant", any_member(type_ref(None))), "ordinal", vec![]),
        ),
        named("value", int_literal()),
    );
    try_(
        vec![],
        block_of(vec![expr_stmt(store)]),
        vec![catch(
            Some(vec![TypeRef::class("java.lang.NoSuchFieldError")]),
            None,
            block_of(vec![]),
        )],
        absent(),
    )
});

// switch (Outer$1.$SwitchMap$E[e.ordinal()])
static JAVAC_SELECTOR: LazyLock<Pattern> = LazyLock::new(|| {
    indexer(
        named("map", choice(vec![any_ident(), any_member(type_ref(None))])),
        call(capture("value"), "ordinal", vec![]),
    )
});

// switch ($SWITCH_TABLE$E()[e.ordinal()])
static ECLIPSE_SELECTOR: LazyLock<Pattern> = LazyLock::new(|| {
    indexer(
        invocation(
            named("table", choice(vec![any_ident(), any_member(type_ref(None))])),
            vec![],
        ),
        call(capture("value"), "ordinal", vec![]),
    )
});

/// A synthetic ordinal-to-case table, identified by the type holding it and its name.
struct SwitchMap {
    holder: NodeId,
    name: Name,
    /// Case number to enum constant name.
    cases: FxHashMap<i32, Name>,
    /// The `try { ... } catch (NoSuchFieldError) {}` statements filling the table.
    statements: Vec<NodeId>,
}

impl SwitchMap {
    fn new(holder: NodeId, name: Name) -> Self {
        Self {
            holder,
            name,
            cases: FxHashMap::default(),
            statements: Vec::new(),
        }
    }

    /// Records the statement if it is one mapping of the table. The table itself must be named
    /// `map_name`, or anything if `map_name` is `None` (Eclipse fills a local copy).
    fn collect(&mut self, arena: &Arena, statement: NodeId, map_name: Option<&str>) {
        let Some(m) = MAPPING.match_node(arena, statement) else {
            return;
        };
        if let Some(map_name) = map_name
            && !matches!(&arena[m["map"]], Node::Identifier { name } | Node::MemberReference { member: name, .. } if name == map_name)
        {
            return;
        }
        let Node::MemberReference { member, .. } = &arena[m["constant"]] else {
            return;
        };
        let Some(value) = arena[m["value"]].as_literal().and_then(|literal| literal.as_int()) else {
            return;
        };
        self.cases.insert(value, member.clone());
        self.statements.push(statement);
    }
}

/// The binary name of the type a switch-map reference points into. Unqualified names refer to the
/// type around the switch.
fn holder_name<'a>(arena: &'a Arena, reference: NodeId) -> Option<(&'a Name, &'a Name)> {
    match &arena[reference] {
        Node::Identifier { name } => Some((arena.enclosing_type_name(reference)?, name)),
        Node::MemberReference { target, member } => match &arena[*target] {
            Node::TypeReference {
                ty: TypeRef::Class(holder),
            } => Some((holder, member)),
            _ => None,
        },
        _ => None,
    }
}

/// Rewrites `switch (table[value.ordinal()])` into `switch (value)` if every case label is a known
/// mapping. Returns whether the switch was rewritten.
fn rewrite_switch(arena: &mut Arena, switch: NodeId, value: NodeId, map: &SwitchMap) -> bool {
    let Node::Switch { selector, sections } = arena[switch].clone() else {
        return false;
    };
    let mut labels = Vec::new();
    for section in sections {
        let Node::SwitchSection {
            labels: section_labels,
            ..
        } = &arena[section]
        else {
            return false;
        };
        for label in section_labels {
            let Node::CaseLabel { value: Some(case) } = arena[*label] else {
                continue;
            };
            let constant = arena[case]
                .as_literal()
                .and_then(|literal| literal.as_int())
                .and_then(|index| map.cases.get(&index));
            match constant {
                Some(constant) => labels.push((case, constant.clone())),
                None => {
                    debug!(map = %map.name, "switch case without an enum mapping");
                    return false;
                }
            }
        }
    }

    for (case, constant) in labels {
        let replacement = arena.ident(&constant);
        arena.replace(case, replacement);
    }
    arena.replace(selector, value);
    trace!(map = %map.name, "rewrote enum switch");
    true
}

/// Removes a synthetic holder class once the tables have been taken out of it.
fn remove_empty_holder(arena: &mut Arena, holder: NodeId) {
    remove_empty_initializers(arena, holder);
    let synthetic = arena[holder]
        .modifiers()
        .is_some_and(Modifiers::is_synthetic);
    if synthetic && members(arena, holder).is_empty() {
        trace!("removed switch-map holder class");
        arena.detach(holder);
    }
}

/// Rewrites switches on enums compiled by javac, which go through a `$SwitchMap$...` table in a
/// synthetic class.
pub struct EnumSwitchRewriter;

impl Transform for EnumSwitchRewriter {
    fn name(&self) -> &'static str {
        "EnumSwitchRewriter"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        _context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        let mut maps: FxHashMap<(Name, Name), SwitchMap> = FxHashMap::default();
        for ty in type_declarations(arena, root) {
            let Node::TypeDeclaration { name: holder, .. } = &arena[ty] else {
                continue;
            };
            let holder = holder.clone();
            for member in members(arena, ty) {
                let Node::Field { name, .. } = &arena[member] else {
                    continue;
                };
                if !name.starts_with("$SwitchMap$") {
                    continue;
                }
                let mut map = SwitchMap::new(ty, name.clone());
                for body in static_initializers(arena, ty) {
                    for statement in statements(arena, body) {
                        map.collect(arena, statement, Some(name));
                    }
                }
                maps.insert((holder.clone(), name.clone()), map);
            }
        }
        if maps.is_empty() {
            return Ok(());
        }

        for switch in arena.descendants(root) {
            let Node::Switch { selector, .. } = arena[switch] else {
                continue;
            };
            let Some(m) = JAVAC_SELECTOR.match_node(arena, selector) else {
                continue;
            };
            let Some((holder, name)) = holder_name(arena, m["map"]) else {
                continue;
            };
            if let Some(map) = maps.get(&(holder.clone(), name.clone())) {
                rewrite_switch(arena, switch, m["value"], map);
            }
        }

        for map in maps.into_values() {
            let Node::TypeDeclaration { members: fields, .. } = arena[map.holder].clone() else {
                continue;
            };
            // `$SwitchMap$E = new int[E.values().length];` may sit in the static initializer.
            let mut plumbing = map.statements.clone();
            for body in static_initializers(arena, map.holder) {
                for statement in statements(arena, body) {
                    if let Node::ExpressionStatement { expression } = arena[statement]
                        && let Node::Assignment { target, .. } = arena[expression]
                        && holder_name(arena, target).is_some_and(|(_, name)| *name == map.name)
                    {
                        plumbing.push(statement);
                    }
                }
            }
            let field = fields
                .into_iter()
                .find(|field| arena[*field].declared_name() == Some(&map.name));
            plumbing.extend(field);
            if mentions_name(arena, root, &map.name, &plumbing) {
                continue;
            }
            for statement in plumbing {
                arena.detach(statement);
            }
            trace!(map = %map.name, "removed switch map");
            remove_empty_holder(arena, map.holder);
        }
        Ok(())
    }
}

/// Rewrites switches on enums compiled by Eclipse, which call a lazily filling
/// `$SWITCH_TABLE$...()` method cached in a field of the same name.
pub struct EclipseEnumSwitchRewriter;

impl Transform for EclipseEnumSwitchRewriter {
    fn name(&self) -> &'static str {
        "EclipseEnumSwitchRewriter"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        _context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        let mut tables: FxHashMap<(Name, Name), (SwitchMap, NodeId)> = FxHashMap::default();
        for ty in type_declarations(arena, root) {
            let Node::TypeDeclaration { name: holder, .. } = &arena[ty] else {
                continue;
            };
            let holder = holder.clone();
            for member in members(arena, ty) {
                let Node::Method {
                    name,
                    parameters,
                    body: Some(body),
                    ..
                } = &arena[member]
                else {
                    continue;
                };
                if !name.starts_with("$SWITCH_TABLE$") || !parameters.is_empty() {
                    continue;
                }
                let mut map = SwitchMap::new(ty, name.clone());
                for statement in statements(arena, *body) {
                    map.collect(arena, statement, None);
                }
                if !map.cases.is_empty() {
                    tables.insert((holder.clone(), name.clone()), (map, member));
                }
            }
        }
        if tables.is_empty() {
            return Ok(());
        }

        for switch in arena.descendants(root) {
            let Node::Switch { selector, .. } = arena[switch] else {
                continue;
            };
            let Some(m) = ECLIPSE_SELECTOR.match_node(arena, selector) else {
                continue;
            };
            let Some((holder, name)) = holder_name(arena, m["table"]) else {
                continue;
            };
            if let Some((map, _)) = tables.get(&(holder.clone(), name.clone())) {
                rewrite_switch(arena, switch, m["value"], map);
            }
        }

        for (map, method) in tables.into_values() {
            let cache = members(arena, map.holder).into_iter().find(|member| {
                matches!(&arena[*member], Node::Field { name, .. } if *name == map.name)
            });
            let mut plumbing = vec![method];
            plumbing.extend(cache);
            if mentions_name(arena, root, &map.name, &plumbing) {
                continue;
            }
            for member in plumbing {
                arena.detach(member);
            }
            trace!(table = %map.name, "removed switch table");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Role, TypeKind};
    use crate::transforms::run_pass;
    use pretty_assertions::assert_eq;

    fn color() -> TypeRef {
        TypeRef::class("pkg.Color")
    }

    /// `try { map[Color.NAME.ordinal()] = value; } catch (NoSuchFieldError e) {}`
    fn mapping(arena: &mut Arena, map: NodeId, constant: &str, value: i32) -> NodeId {
        let ty = arena.type_ref(color());
        let constant = arena.member(ty, constant);
        let ordinal = arena.invoke(constant, "ordinal", vec![]);
        let slot = arena.index(map, ordinal);
        let value = arena.int(value);
        let store = arena.assign(slot, value);
        let store = arena.expr_stmt(store);
        let body = arena.block(vec![store]);
        let handler = arena.block(vec![]);
        let catch = arena.alloc(Node::Catch {
            types: vec![TypeRef::class("java.lang.NoSuchFieldError")],
            name: Name::from("e"),
            body: handler,
        });
        arena.alloc(Node::Try {
            resources: vec![],
            body,
            catches: vec![catch],
            finally: None,
        })
    }

    fn call_statement(arena: &mut Arena, method: &str) -> NodeId {
        let callee = arena.ident(method);
        let call = arena.alloc(Node::Invocation {
            target: callee,
            arguments: vec![],
        });
        arena.expr_stmt(call)
    }

    /// `case label: method(); break;`, or `default:` without a label.
    fn section(arena: &mut Arena, label: Option<i32>, method: &str) -> NodeId {
        let value = label.map(|label| arena.int(label));
        let label = arena.alloc(Node::CaseLabel { value });
        let call = call_statement(arena, method);
        let exit = arena.break_(None);
        arena.alloc(Node::SwitchSection {
            labels: vec![label],
            statements: vec![call, exit],
        })
    }

    fn switch_over(arena: &mut Arena, selector: NodeId, cases: &[(Option<i32>, &str)]) -> NodeId {
        let sections = cases
            .iter()
            .map(|(label, method)| section(arena, *label, method))
            .collect();
        arena.alloc(Node::Switch { selector, sections })
    }

    fn method_with(arena: &mut Arena, statement: NodeId) -> NodeId {
        let body = arena.block(vec![statement]);
        let parameter = arena.parameter(color(), "c");
        arena.method("m", TypeRef::void(), Modifiers::NONE, vec![parameter], Some(body))
    }

    fn javac_unit(arena: &mut Arena, cases: &[(Option<i32>, &str)]) -> NodeId {
        let holder_ty = arena.type_ref(TypeRef::class("pkg.Outer$1"));
        let map = arena.member(holder_ty, "$SwitchMap$pkg$Color");
        let value = arena.local("c", color());
        let ordinal = arena.invoke(value, "ordinal", vec![]);
        let selector = arena.index(map, ordinal);
        let switch = switch_over(arena, selector, cases);
        let method = method_with(arena, switch);
        let outer = arena.type_declaration("pkg.Outer", TypeKind::Class, Modifiers::PUBLIC, vec![method]);

        let values = arena.type_ref(color());
        let values = arena.invoke(values, "values", vec![]);
        let length = arena.member(values, "length");
        let array = arena.alloc(Node::ArrayCreation {
            ty: TypeRef::array_of(TypeRef::int()),
            dimensions: vec![length],
            initializer: None,
        });
        let field = arena.field(
            "$SwitchMap$pkg$Color",
            TypeRef::array_of(TypeRef::int()),
            Modifiers::STATIC | Modifiers::FINAL | Modifiers::SYNTHETIC,
            Some(array),
        );
        let map = arena.ident("$SwitchMap$pkg$Color");
        let red = mapping(arena, map, "RED", 1);
        let map = arena.ident("$SwitchMap$pkg$Color");
        let green = mapping(arena, map, "GREEN", 2);
        let body = arena.block(vec![red, green]);
        let initializer = arena.static_initializer(body);
        let holder = arena.type_declaration(
            "pkg.Outer$1",
            TypeKind::Class,
            Modifiers::STATIC | Modifiers::SYNTHETIC,
            vec![field, initializer],
        );
        arena.compilation_unit("pkg", vec![], vec![outer, holder])
    }

    #[test]
    fn javac_switch_map() {
        let mut arena = Arena::new();
        let unit = javac_unit(&mut arena, &[(Some(1), "red"), (Some(2), "green"), (None, "other")]);
        run_pass(&mut EnumSwitchRewriter, &mut arena, unit);
        assert_eq!(
            arena.debug(&unit).to_string(),
            "package pkg;

public class Outer {
    void m(Color c) {
        switch (c) {
            case RED:
                red();
                break;
            case GREEN:
                green();
                break;
            default:
                other();
                break;
        }
    }
}",
        );
    }

    #[test]
    fn unknown_case_keeps_map() {
        let mut arena = Arena::new();
        let unit = javac_unit(&mut arena, &[(Some(1), "red"), (Some(3), "blue")]);
        let before = arena.debug(&unit).to_string();
        run_pass(&mut EnumSwitchRewriter, &mut arena, unit);
        assert_eq!(arena.debug(&unit).to_string(), before);
    }

    #[test]
    fn map_shared_by_two_switches_goes_once_both_are_rewritten() {
        let mut arena = Arena::new();
        let unit = javac_unit(&mut arena, &[(Some(1), "red")]);
        let Node::CompilationUnit { types, .. } = arena[unit].clone() else {
            unreachable!()
        };
        // A second switch that cannot be rewritten still needs the map.
        let holder_ty = arena.type_ref(TypeRef::class("pkg.Outer$1"));
        let map = arena.member(holder_ty, "$SwitchMap$pkg$Color");
        let value = arena.local("c", color());
        let ordinal = arena.invoke(value, "ordinal", vec![]);
        let selector = arena.index(map, ordinal);
        let switch = switch_over(&mut arena, selector, &[(Some(7), "x")]);
        let method = method_with(&mut arena, switch);
        arena.push(types[0], Role::Member, method);

        run_pass(&mut EnumSwitchRewriter, &mut arena, unit);
        let output = arena.debug(&unit).to_string();
        assert!(output.contains("case RED:"));
        assert!(output.contains("switch (Outer$1.$SwitchMap$pkg$Color[c.ordinal()])"));
        assert!(output.contains("static final int[] $SwitchMap$pkg$Color"));
    }

    #[test]
    fn eclipse_switch_table() {
        let mut arena = Arena::new();
        let table = arena.ident("$SWITCH_TABLE$pkg$Color");
        let table = arena.alloc(Node::Invocation {
            target: table,
            arguments: vec![],
        });
        let value = arena.local("c", color());
        let ordinal = arena.invoke(value, "ordinal", vec![]);
        let selector = arena.index(table, ordinal);
        let switch = switch_over(&mut arena, selector, &[(Some(1), "red"), (Some(2), "green")]);
        let method = method_with(&mut arena, switch);

        let local = arena.ident("var1");
        let red = mapping(&mut arena, local, "RED", 1);
        let local = arena.ident("var1");
        let green = mapping(&mut arena, local, "GREEN", 2);
        let cached = arena.ident("var1");
        let ret = arena.ret(Some(cached));
        let body = arena.block(vec![red, green, ret]);
        let int_array = TypeRef::array_of(TypeRef::int());
        let table_method = arena.method(
            "$SWITCH_TABLE$pkg$Color",
            int_array.clone(),
            Modifiers::STATIC | Modifiers::SYNTHETIC,
            vec![],
            Some(body),
        );
        let cache = arena.field(
            "$SWITCH_TABLE$pkg$Color",
            int_array,
            Modifiers::PRIVATE | Modifiers::STATIC | Modifiers::SYNTHETIC,
            None,
        );
        let outer = arena.type_declaration(
            "pkg.Outer",
            TypeKind::Class,
            Modifiers::PUBLIC,
            vec![cache, method, table_method],
        );

        run_pass(&mut EclipseEnumSwitchRewriter, &mut arena, outer);
        assert_eq!(
            arena.debug(&outer).to_string(),
            "public class Outer {
    void m(Color c) {
        switch (c) {
            case RED:
                red();
                break;
            case GREEN:
                green();
                break;
        }
    }
}",
        );
    }
}
