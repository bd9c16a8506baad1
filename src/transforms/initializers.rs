use super::{members, remove_empty_initializers, statements, static_initializers, type_declarations};
use crate::ast::{Arena, AssignOp, MethodKind, Name, Node, NodeId, Role, TypeRef};
use crate::{Context, InvariantViolation, Transform};
use tracing::trace;

/// Moves field assignments that open a static initializer, or the only constructor, into the
/// declarations of the fields they initialize.
pub struct IntroduceInitializers;

impl Transform for IntroduceInitializers {
    fn name(&self) -> &'static str {
        "IntroduceInitializers"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        _context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        for ty in type_declarations(arena, root) {
            handle_static_initializer(arena, ty);
            handle_constructor(arena, ty);
            remove_empty_initializers(arena, ty);
        }
        Ok(())
    }
}

struct Target {
    field: NodeId,
    value: NodeId,
}

/// The field of `ty` that `statement` assigns, if it is a plain `f = value;`, `this.f = value;` or
/// `T.f = value;` to a field without an initializer of the given staticness.
fn assigned_field(arena: &Arena, ty: NodeId, statement: NodeId, is_static: bool) -> Option<Target> {
    let Node::ExpressionStatement { expression } = arena[statement] else {
        return None;
    };
    let Node::Assignment {
        op: AssignOp::Assign,
        target,
        value,
    } = arena[expression]
    else {
        return None;
    };
    let Node::TypeDeclaration { name: owner, .. } = &arena[ty] else {
        return None;
    };
    let name = match &arena[target] {
        Node::Identifier { name } => name,
        Node::MemberReference { target, member } => {
            let qualified = match &arena[*target] {
                Node::This { qualifier: None } => !is_static,
                Node::TypeReference {
                    ty: TypeRef::Class(class),
                } => is_static && class == owner,
                _ => false,
            };
            if !qualified {
                return None;
            }
            member
        }
        _ => return None,
    };
    let field = field_named(arena, ty, name)?;
    match &arena[field] {
        Node::Field {
            modifiers,
            initializer: None,
            ..
        } if modifiers.is_static() == is_static => Some(Target { field, value }),
        _ => None,
    }
}

fn field_named(arena: &Arena, ty: NodeId, name: &str) -> Option<NodeId> {
    members(arena, ty)
        .into_iter()
        .find(|member| matches!(&arena[*member], Node::Field { name: declared, .. } if declared == name))
}

fn position(arena: &Arena, ty: NodeId, member: NodeId) -> Option<usize> {
    members(arena, ty).iter().position(|candidate| *candidate == member)
}

/// Whether `value` can be evaluated at the declaration of `field` with the same result: it only
/// builds new objects from literals and fields initialized earlier in declaration order.
fn is_constant_safe(arena: &Arena, ty: NodeId, field: NodeId, value: NodeId) -> bool {
    let Some(limit) = position(arena, ty, field) else {
        return false;
    };
    let is_static = arena[field].modifiers().is_some_and(|modifiers| modifiers.is_static());
    arena.descendants(value).into_iter().all(|id| match &arena[id] {
        Node::Literal { .. }
        | Node::ClassLiteral { .. }
        | Node::TypeReference { .. }
        | Node::ArrayInitializer { .. }
        | Node::ArrayCreation { .. }
        | Node::Cast { .. }
        | Node::Binary { .. }
        | Node::Conditional { .. }
        | Node::InstanceOf { .. } => true,
        Node::Unary { op, .. } => !op.is_update(),
        Node::ObjectCreation { body, .. } => body.is_none(),
        Node::This { qualifier: None } => !is_static,
        Node::Identifier { name } => {
            is_initialized_field(arena, ty, name, limit, is_static)
                // A method name is not a value, but invocations are rejected anyway.
                && !is_invoked(arena, id)
        }
        Node::MemberReference { target, member } => match &arena[*target] {
            Node::This { qualifier: None } => is_initialized_field(arena, ty, member, limit, is_static),
            Node::TypeReference { ty: TypeRef::Class(class) } => match &arena[ty] {
                Node::TypeDeclaration { name, .. } if name == class => {
                    is_initialized_field(arena, ty, member, limit, is_static)
                }
                // Constants of other types.
                _ => true,
            },
            _ => false,
        },
        _ => false,
    })
}

fn is_invoked(arena: &Arena, id: NodeId) -> bool {
    arena
        .parent(id)
        .is_some_and(|parent| matches!(arena[parent], Node::Invocation { target, .. } if target == id))
}

/// Whether `name` is a field of `ty` whose value is settled before the member at `limit` runs.
fn is_initialized_field(arena: &Arena, ty: NodeId, name: &Name, limit: usize, is_static: bool) -> bool {
    let Some(field) = field_named(arena, ty, name) else {
        return false;
    };
    let Node::Field {
        modifiers,
        initializer,
        ..
    } = &arena[field]
    else {
        return false;
    };
    // Class initialization completes before any instance exists.
    if modifiers.is_static() && !is_static {
        return true;
    }
    modifiers.is_static() == is_static
        && initializer.is_some()
        && position(arena, ty, field).is_some_and(|index| index < limit)
}

/// Whether a member of `ty` strictly between `from` and `to` in declaration order, or any field
/// initializer when `to` is absent, reads the field `name`.
fn read_in_between(arena: &Arena, ty: NodeId, name: &str, from: usize, to: Option<usize>) -> bool {
    members(arena, ty)
        .into_iter()
        .enumerate()
        .filter(|(index, _)| *index > from && to.is_none_or(|to| *index < to))
        .filter_map(|(_, member)| match &arena[member] {
            Node::Field {
                initializer: Some(initializer),
                ..
            } => Some(*initializer),
            Node::Initializer { body, .. } if to.is_some() => Some(*body),
            _ => None,
        })
        .any(|code| {
            arena
                .descendants(code)
                .into_iter()
                .any(|id| super::accessed_name(arena, id).is_some_and(|accessed| accessed == name))
        })
}

fn move_into_declaration(arena: &mut Arena, statement: NodeId, target: Target) {
    arena.set(target.field, Role::Initializer, Some(target.value));
    arena.detach(statement);
    trace!(field = ?arena[target.field].declared_name(), "introduced field initializer");
}

fn handle_static_initializer(arena: &mut Arena, ty: NodeId) {
    let Some(body) = static_initializers(arena, ty).into_iter().next() else {
        return;
    };
    let Some(block_position) = arena.parent(body).and_then(|initializer| position(arena, ty, initializer)) else {
        return;
    };
    for statement in statements(arena, body) {
        let Some(target) = assigned_field(arena, ty, statement, true) else {
            break;
        };
        let Some(field_position) = position(arena, ty, target.field) else {
            break;
        };
        let Some(name) = arena[target.field].declared_name().cloned() else {
            break;
        };
        // Moving the value up must not change what code in between observes.
        if field_position > block_position
            || !is_constant_safe(arena, ty, target.field, target.value)
            || read_in_between(arena, ty, &name, field_position, Some(block_position))
        {
            break;
        }
        move_into_declaration(arena, statement, target);
    }
}

fn handle_constructor(arena: &mut Arena, ty: NodeId) {
    let mut constructors = members(arena, ty).into_iter().filter(|member| {
        matches!(
            arena[*member],
            Node::Method {
                kind: MethodKind::Constructor,
                ..
            }
        )
    });
    let (Some(constructor), None) = (constructors.next(), constructors.next()) else {
        return;
    };
    let has_instance_blocks = members(arena, ty).into_iter().any(|member| {
        matches!(&arena[member], Node::Initializer { modifiers, .. } if !modifiers.is_static())
    });
    if has_instance_blocks {
        return;
    }
    let Node::Method {
        body: Some(body),
        parameters,
        ..
    } = &arena[constructor]
    else {
        return;
    };
    let body = *body;
    let parameters: Vec<Name> = parameters
        .iter()
        .filter_map(|parameter| arena[*parameter].declared_name().cloned())
        .collect();

    let mut statements = statements(arena, body).into_iter().peekable();
    // Field initializers run right after the superclass constructor; `this(...)` runs none.
    if let Some(first) = statements.peek()
        && let Node::ExpressionStatement { expression } = arena[*first]
        && let Node::Invocation { target, .. } = arena[expression]
    {
        match arena[target] {
            Node::Super => {
                statements.next();
            }
            Node::This { qualifier: None } => return,
            _ => {}
        }
    }
    for statement in statements {
        let Some(target) = assigned_field(arena, ty, statement, false) else {
            break;
        };
        let Some(field_position) = position(arena, ty, target.field) else {
            break;
        };
        let Some(name) = arena[target.field].declared_name().cloned() else {
            break;
        };
        let reads_parameter = parameters
            .iter()
            .any(|parameter| arena.uses_variable(target.value, parameter));
        if reads_parameter
            || !is_constant_safe(arena, ty, target.field, target.value)
            || read_in_between(arena, ty, &name, field_position, None)
        {
            break;
        }
        move_into_declaration(arena, statement, target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Modifiers, TypeKind};
    use crate::transforms::run_pass;
    use pretty_assertions::assert_eq;

    fn store(arena: &mut Arena, target: NodeId, value: NodeId) -> NodeId {
        let assignment = arena.assign(target, value);
        arena.expr_stmt(assignment)
    }

    fn super_call(arena: &mut Arena) -> NodeId {
        let callee = arena.alloc(Node::Super);
        let call = arena.alloc(Node::Invocation {
            target: callee,
            arguments: vec![],
        });
        arena.expr_stmt(call)
    }

    #[test]
    fn static_assignments_become_initializers() {
        let mut arena = Arena::new();
        let statics = Modifiers::STATIC | Modifiers::FINAL;
        let limit = arena.field("LIMIT", TypeRef::int(), statics, None);
        let names = arena.field("NAMES", TypeRef::class("java.util.List"), statics, None);
        let cache = arena.field("cache", TypeRef::int(), Modifiers::STATIC, None);

        let target = arena.ident("LIMIT");
        let ten = arena.int(10);
        let first = store(&mut arena, target, ten);
        let owner = arena.type_ref(TypeRef::class("pkg.Config"));
        let target = arena.member(owner, "NAMES");
        let list = arena.new_object(TypeRef::class("java.util.ArrayList"), vec![]);
        let second = store(&mut arena, target, list);
        // Stops at the first statement that is not a safe store.
        let compute = arena.ident("compute");
        let call = arena.alloc(Node::Invocation {
            target: compute,
            arguments: vec![],
        });
        let target = arena.ident("cache");
        let third = store(&mut arena, target, call);
        let target = arena.ident("LIMIT");
        let one = arena.int(1);
        let fourth_value = arena.binary(crate::ast::BinaryOp::Add, target, one);
        let target = arena.ident("cache");
        let fourth = store(&mut arena, target, fourth_value);

        let body = arena.block(vec![first, second, third, fourth]);
        let initializer = arena.static_initializer(body);
        let ty = arena.type_declaration(
            "pkg.Config",
            TypeKind::Class,
            Modifiers::NONE,
            vec![limit, names, cache, initializer],
        );

        run_pass(&mut IntroduceInitializers, &mut arena, ty);
        assert_eq!(
            arena.debug(&ty).to_string(),
            "class Config {
    static final int LIMIT = 10;
    static final List NAMES = new ArrayList();
    static int cache;
    static {
        cache = compute();
        cache = LIMIT + 1;
    }
}",
        );
    }

    #[test]
    fn constructor_stores_become_initializers() {
        let mut arena = Arena::new();
        let size = arena.field("size", TypeRef::int(), Modifiers::PRIVATE, None);
        let name = arena.field("name", TypeRef::string(), Modifiers::PRIVATE, None);
        let parameter = arena.parameter(TypeRef::string(), "name");

        let super_call = super_call(&mut arena);
        let this = arena.this();
        let target = arena.member(this, "size");
        let sixteen = arena.int(16);
        let first = store(&mut arena, target, sixteen);
        let this = arena.this();
        let target = arena.member(this, "name");
        let value = arena.local("name", TypeRef::string());
        let second = store(&mut arena, target, value);
        let body = arena.block(vec![super_call, first, second]);
        let constructor = arena.constructor(Modifiers::PUBLIC, vec![parameter], body);
        let ty = arena.type_declaration(
            "pkg.Buffer",
            TypeKind::Class,
            Modifiers::NONE,
            vec![size, name, constructor],
        );

        run_pass(&mut IntroduceInitializers, &mut arena, ty);
        assert_eq!(
            arena.debug(&ty).to_string(),
            "class Buffer {
    private int size = 16;
    private String name;
    public Buffer(String name) {
        super();
        this.name = name;
    }
}",
        );
    }

    #[test]
    fn several_constructors_keep_their_stores() {
        let mut arena = Arena::new();
        let size = arena.field("size", TypeRef::int(), Modifiers::NONE, None);
        let mut constructors = Vec::new();
        for parameters in [0, 1] {
            let this = arena.this();
            let target = arena.member(this, "size");
            let sixteen = arena.int(16);
            let statement = store(&mut arena, target, sixteen);
            let body = arena.block(vec![statement]);
            let parameters = (0..parameters)
                .map(|_| arena.parameter(TypeRef::int(), "hint"))
                .collect();
            constructors.push(arena.constructor(Modifiers::NONE, parameters, body));
        }
        let mut all = vec![size];
        all.extend(constructors);
        let ty = arena.type_declaration("pkg.Buffer", TypeKind::Class, Modifiers::NONE, all);
        let before = arena.debug(&ty).to_string();

        run_pass(&mut IntroduceInitializers, &mut arena, ty);
        assert_eq!(arena.debug(&ty).to_string(), before);
    }
}
