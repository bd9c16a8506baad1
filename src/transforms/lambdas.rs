use super::{is_member_referenced, members};
use crate::ast::{Arena, Name, Node, NodeId, TypeRef};
use crate::{Context, InvariantViolation, Transform};
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

/// Turns method references to the synthetic `lambda$...` methods javac compiles lambda bodies into
/// back into lambda expressions, and removes the methods once nothing refers to them.
pub struct LambdaTransform;

impl Transform for LambdaTransform {
    fn name(&self) -> &'static str {
        "LambdaTransform"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        _context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        let mut inlined = FxHashSet::default();
        // Outer lambdas first, so nested ones see the scope they end up in.
        for id in arena.descendants(root) {
            if !arena.contains(root, id) {
                continue;
            }
            if let Some(method) = lambda_method(arena, root, id)
                && handle_reference(arena, id, method)
            {
                inlined.insert(method);
            }
        }
        for method in inlined {
            if !is_member_referenced(arena, root, method) {
                trace!(method = ?arena[method].declared_name(), "removed lambda method");
                arena.detach(method);
            }
        }
        Ok(())
    }
}

/// The `lambda$...` method declaration a method reference points at.
fn lambda_method(arena: &Arena, root: NodeId, reference: NodeId) -> Option<NodeId> {
    let Node::MethodReference {
        target,
        member,
        captured,
    } = &arena[reference]
    else {
        return None;
    };
    if !member.starts_with("lambda$") {
        return None;
    }
    let owner = match &arena[*target] {
        Node::TypeReference {
            ty: TypeRef::Class(owner),
        } => arena.find_type(root, owner)?,
        Node::This { qualifier: None } => arena.enclosing_type(reference)?,
        _ => return None,
    };
    members(arena, owner).into_iter().find(|candidate| {
        matches!(
            &arena[*candidate],
            Node::Method { name, parameters, body: Some(_), .. }
                if name == member && parameters.len() >= captured.len()
        )
    })
}

/// Whether `name` is a local variable or parameter visible at `site`.
fn is_local_in_scope(arena: &Arena, site: NodeId, name: &str) -> bool {
    if arena.find_variable_declaration(site, name).is_some() {
        return true;
    }
    arena
        .ancestors(site)
        .take_while(|ancestor| !arena[*ancestor].is_type_declaration())
        .any(|ancestor| match &arena[ancestor] {
            Node::Method { parameters, .. } | Node::Lambda { parameters, .. } => parameters
                .iter()
                .any(|parameter| arena[*parameter].declared_name().is_some_and(|n| n == name)),
            Node::ForEach { variable, .. } => arena.declares_variable(*variable, name),
            Node::For { initializers, .. } => initializers
                .iter()
                .any(|initializer| arena.declares_variable(*initializer, name)),
            Node::Catch { name: caught, .. } => caught == name,
            _ => false,
        })
}

/// Names the lambda method introduces: its own parameters and every local it declares.
fn introduced_names(arena: &Arena, method: NodeId, parameters: &[NodeId]) -> Vec<Name> {
    let Node::Method { body: Some(body), .. } = &arena[method] else {
        return Vec::new();
    };
    let mut names: Vec<Name> = parameters
        .iter()
        .filter_map(|parameter| arena[*parameter].declared_name().cloned())
        .collect();
    for id in arena.descendants(*body) {
        match &arena[id] {
            Node::VariableInitializer { name, .. } | Node::Catch { name, .. } => names.push(name.clone()),
            _ => {}
        }
    }
    names
}

fn handle_reference(arena: &mut Arena, reference: NodeId, method: NodeId) -> bool {
    let Node::MethodReference { captured, .. } = arena[reference].clone() else {
        return false;
    };
    let Node::Method {
        parameters,
        body: Some(body),
        ..
    } = arena[method].clone()
    else {
        return false;
    };

    // Captured values become the names they were captured from.
    let mut renames = Vec::new();
    for (parameter, value) in parameters.iter().zip(&captured) {
        let (Some(parameter), Some(value)) =
            (arena[*parameter].declared_name(), arena[*value].as_identifier())
        else {
            debug!("lambda captures something other than a variable");
            return false;
        };
        renames.push((parameter.clone(), value.clone()));
    }
    let own = &parameters[captured.len()..];
    let clash = introduced_names(arena, method, own)
        .iter()
        .find(|name| is_local_in_scope(arena, reference, name))
        .cloned();
    if let Some(name) = clash {
        debug!(%name, "lambda local would shadow a variable in scope");
        return false;
    }

    let body = arena.deep_clone(body);
    for id in arena.descendants(body) {
        let Some(name) = arena[id].as_identifier() else {
            continue;
        };
        if let Some((_, value)) = renames.iter().find(|(parameter, _)| parameter == name) {
            let value = value.clone();
            if let Node::Identifier { name } = arena.node_mut(id) {
                *name = value;
            }
        }
    }
    let body = match &arena[body] {
        Node::Block { statements } => match statements.as_slice() {
            [statement] => match arena[*statement] {
                Node::Return { value: Some(value) } => value,
                Node::ExpressionStatement { expression } => expression,
                _ => body,
            },
            _ => body,
        },
        _ => body,
    };
    let parameters = own.iter().map(|parameter| arena.deep_clone(*parameter)).collect();
    let ty = arena.meta(reference).ty.clone();
    let lambda = arena.alloc(Node::Lambda { parameters, body });
    arena.meta_mut(lambda).ty = ty;
    arena.replace(reference, lambda);
    trace!(lambda = %arena.debug(&lambda), "introduced lambda");
    true
}

/// Rewrites `n -> new T[n]` as `T[]::new`.
pub struct RewriteNewArrayLambdas;

impl Transform for RewriteNewArrayLambdas {
    fn name(&self) -> &'static str {
        "RewriteNewArrayLambdas"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        _context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        for id in arena.post_order(root) {
            if arena.contains(root, id) && matches!(arena[id], Node::Lambda { .. }) {
                handle_lambda(arena, id);
            }
        }
        Ok(())
    }
}

fn handle_lambda(arena: &mut Arena, lambda: NodeId) {
    let Node::Lambda { parameters, body } = &arena[lambda] else {
        return;
    };
    let [parameter] = parameters.as_slice() else {
        return;
    };
    let Some(length) = arena[*parameter].declared_name() else {
        return;
    };
    let creation = match &arena[*body] {
        Node::Block { statements } => match statements.as_slice() {
            [statement] => match arena[*statement] {
                Node::Return { value: Some(value) } => value,
                _ => return,
            },
            _ => return,
        },
        _ => *body,
    };
    let Node::ArrayCreation {
        ty: ty @ TypeRef::Array(_),
        dimensions,
        initializer: None,
    } = &arena[creation]
    else {
        return;
    };
    // `new T[n][]` is `T[][]::new` too, `new T[n][n]` is not.
    let [dimension] = dimensions.as_slice() else {
        return;
    };
    if arena[*dimension].as_identifier() != Some(length) {
        return;
    }
    let ty = ty.clone();
    let target = arena.type_ref(ty);
    let reference = arena.alloc(Node::MethodReference {
        target,
        member: Name::from("new"),
        captured: Vec::new(),
    });
    let meta = arena.meta(lambda).ty.clone();
    arena.meta_mut(reference).ty = meta;
    arena.replace(lambda, reference);
    trace!(reference = %arena.debug(&reference), "introduced array constructor reference");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Modifiers, TypeKind};
    use crate::transforms::run_pass;
    use pretty_assertions::assert_eq;

    const LAMBDA: Modifiers = Modifiers::PRIVATE
        .union(Modifiers::STATIC)
        .union(Modifiers::SYNTHETIC);

    fn host() -> TypeRef {
        TypeRef::class("pkg.Host")
    }

    fn reference(arena: &mut Arena, method: &str, captured: Vec<NodeId>) -> NodeId {
        let target = arena.type_ref(host());
        arena.alloc(Node::MethodReference {
            target,
            member: Name::from(method),
            captured,
        })
    }

    fn call_statement(arena: &mut Arena, method: &str, arguments: Vec<NodeId>) -> NodeId {
        let callee = arena.ident(method);
        let call = arena.alloc(Node::Invocation {
            target: callee,
            arguments,
        });
        arena.expr_stmt(call)
    }

    fn host_with(arena: &mut Arena, statements: Vec<NodeId>, lambdas: Vec<NodeId>) -> NodeId {
        let base = arena.parameter(TypeRef::int(), "base");
        let body = arena.block(statements);
        let run = arena.method("run", TypeRef::void(), Modifiers::NONE, vec![base], Some(body));
        let mut members = vec![run];
        members.extend(lambdas);
        arena.type_declaration("pkg.Host", TypeKind::Class, Modifiers::NONE, members)
    }

    /// `private static int lambda$run$0(int captured, int x) { return x + captured; }`
    fn adder(arena: &mut Arena) -> NodeId {
        let captured = arena.parameter(TypeRef::int(), "captured");
        let x = arena.parameter(TypeRef::int(), "x");
        let left = arena.local("x", TypeRef::int());
        let right = arena.local("captured", TypeRef::int());
        let sum = arena.binary(BinaryOp::Add, left, right);
        let ret = arena.ret(Some(sum));
        let body = arena.block(vec![ret]);
        arena.method("lambda$run$0", TypeRef::int(), LAMBDA, vec![captured, x], Some(body))
    }

    #[test]
    fn expression_and_block_lambdas() {
        let mut arena = Arena::new();
        let lambda = adder(&mut arena);
        let base = arena.local("base", TypeRef::int());
        let first = reference(&mut arena, "lambda$run$0", vec![base]);
        let first = arena.declare(TypeRef::class("java.util.function.IntUnaryOperator"), "f", Some(first));

        // private static void lambda$run$1(String s) { print(s); print(s); }
        let s = arena.parameter(TypeRef::string(), "s");
        let argument = arena.local("s", TypeRef::string());
        let once = call_statement(&mut arena, "print", vec![argument]);
        let argument = arena.local("s", TypeRef::string());
        let twice = call_statement(&mut arena, "print", vec![argument]);
        let body = arena.block(vec![once, twice]);
        let printer = arena.method("lambda$run$1", TypeRef::void(), LAMBDA, vec![s], Some(body));
        let second = reference(&mut arena, "lambda$run$1", vec![]);
        let second = arena.declare(TypeRef::class("java.util.function.Consumer"), "c", Some(second));

        let ty = host_with(&mut arena, vec![first, second], vec![lambda, printer]);
        run_pass(&mut LambdaTransform, &mut arena, ty);
        assert_eq!(
            arena.debug(&ty).to_string(),
            "class Host {
    void run(int base) {
        IntUnaryOperator f = x -> x + base;
        Consumer c = s -> {
            print(s);
            print(s);
        };
    }
}",
        );
    }

    #[test]
    fn shadowing_lambda_parameter_is_kept_as_reference() {
        let mut arena = Arena::new();
        // private static int lambda$run$0(int base) { return base; }
        let parameter = arena.parameter(TypeRef::int(), "base");
        let read = arena.local("base", TypeRef::int());
        let ret = arena.ret(Some(read));
        let body = arena.block(vec![ret]);
        let lambda = arena.method("lambda$run$0", TypeRef::int(), LAMBDA, vec![parameter], Some(body));
        let first = reference(&mut arena, "lambda$run$0", vec![]);
        let first = arena.declare(TypeRef::class("java.util.function.IntUnaryOperator"), "f", Some(first));

        let ty = host_with(&mut arena, vec![first], vec![lambda]);
        run_pass(&mut LambdaTransform, &mut arena, ty);
        let output = arena.debug(&ty).to_string();
        assert!(output.contains("IntUnaryOperator f = Host::lambda$run$0;"));
        assert!(output.contains("private static int lambda$run$0(int base)"));
    }

    #[test]
    fn array_constructor_references() {
        let mut arena = Arena::new();
        let n = arena.parameter(TypeRef::int(), "n");
        let length = arena.local("n", TypeRef::int());
        let creation = arena.alloc(Node::ArrayCreation {
            ty: TypeRef::array_of(TypeRef::string()),
            dimensions: vec![length],
            initializer: None,
        });
        let lambda = arena.alloc(Node::Lambda {
            parameters: vec![n],
            body: creation,
        });
        let first = arena.declare(TypeRef::class("java.util.function.IntFunction"), "f", Some(lambda));

        // n -> new int[n + 1] stays.
        let n = arena.parameter(TypeRef::int(), "n");
        let length = arena.local("n", TypeRef::int());
        let one = arena.int(1);
        let length = arena.binary(BinaryOp::Add, length, one);
        let creation = arena.alloc(Node::ArrayCreation {
            ty: TypeRef::array_of(TypeRef::int()),
            dimensions: vec![length],
            initializer: None,
        });
        let lambda = arena.alloc(Node::Lambda {
            parameters: vec![n],
            body: creation,
        });
        let second = arena.declare(TypeRef::class("java.util.function.IntFunction"), "g", Some(lambda));

        let body = arena.block(vec![first, second]);
        run_pass(&mut RewriteNewArrayLambdas, &mut arena, body);
        assert_eq!(
            arena.debug(&body).to_string(),
            "{
    IntFunction f = String[]::new;
    IntFunction g = n -> new int[n + 1];
}",
        );
    }
}
