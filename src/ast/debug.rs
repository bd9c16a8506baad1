//! A Java-like rendering of trees, used for debugging and for comparing trees in tests.

use super::{Arena, MethodKind, Node, NodeId, TypeKind, TypeRef, UnaryOp};
use core::fmt::{self, Write};

pub trait DebugIr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>, arena: &Arena) -> fmt::Result;
}

impl<T: DebugIr + ?Sized> DebugIr for &T {
    fn fmt(&self, f: &mut fmt::Formatter<'_>, arena: &Arena) -> fmt::Result {
        T::fmt(self, f, arena)
    }
}

impl DebugIr for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>, arena: &Arena) -> fmt::Result {
        let mut printer = Printer {
            arena,
            out: String::new(),
            indent: 0,
        };
        printer.node(*self)?;
        f.write_str(&printer.out)
    }
}

impl DebugIr for [NodeId] {
    fn fmt(&self, f: &mut fmt::Formatter<'_>, arena: &Arena) -> fmt::Result {
        for id in self {
            writeln!(f, "{}", arena.debug(id))?;
        }
        Ok(())
    }
}

const ASSIGNMENT: u8 = 1;
const CONDITIONAL: u8 = 2;
const INSTANCEOF: u8 = 9;
const PREFIX: u8 = 13;
const POSTFIX: u8 = 14;
const PRIMARY: u8 = 15;

struct Printer<'a> {
    arena: &'a Arena,
    out: String,
    indent: usize,
}

impl Printer<'_> {
    fn line(&mut self) -> fmt::Result {
        self.out.push('\n');
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        Ok(())
    }

    fn node(&mut self, id: NodeId) -> fmt::Result {
        let node = &self.arena[id];
        if node.is_expression() {
            self.expr(id, 0)
        } else {
            self.statement(id)
        }
    }

    fn list(&mut self, ids: &[NodeId], separator: &str) -> fmt::Result {
        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                self.out.push_str(separator);
            }
            self.expr(*id, 0)?;
        }
        Ok(())
    }

    /// Prints `{ ... }` with one statement per line.
    fn block_body(&mut self, statements: &[NodeId]) -> fmt::Result {
        if statements.is_empty() {
            self.out.push_str("{}");
            return Ok(());
        }
        self.out.push('{');
        self.indent += 1;
        for statement in statements {
            self.line()?;
            self.statement(*statement)?;
        }
        self.indent -= 1;
        self.line()?;
        self.out.push('}');
        Ok(())
    }

    fn members(&mut self, kind: TypeKind, members: &[NodeId]) -> fmt::Result {
        if members.is_empty() {
            self.out.push_str("{}");
            return Ok(());
        }
        self.out.push('{');
        self.indent += 1;
        let arena = self.arena;
        let (values, others): (Vec<NodeId>, Vec<NodeId>) = members
            .iter()
            .partition(|member| matches!(arena[**member], Node::EnumValue { .. }));
        for (i, value) in values.iter().enumerate() {
            self.line()?;
            self.statement(*value)?;
            self.out
                .push_str(if i + 1 == values.len() { ";" } else { "," });
        }
        if kind == TypeKind::Enum && values.is_empty() {
            self.line()?;
            self.out.push(';');
        }
        for member in others {
            self.line()?;
            self.statement(member)?;
        }
        self.indent -= 1;
        self.line()?;
        self.out.push('}');
        Ok(())
    }

    /// A statement in a nested position: blocks stay on the same line, anything else too.
    fn embedded(&mut self, id: NodeId) -> fmt::Result {
        self.out.push(' ');
        self.statement(id)
    }

    // For headers print statements without the trailing semicolon.
    fn header_statement(&mut self, id: NodeId) -> fmt::Result {
        match &self.arena[id] {
            Node::ExpressionStatement { expression } => self.expr(*expression, 0),
            Node::VariableDeclaration {
                ty,
                modifiers,
                variables,
            } => {
                write!(self.out, "{modifiers}{ty} ")?;
                for (i, variable) in variables.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.statement(*variable)?;
                }
                Ok(())
            }
            _ => self.statement(id),
        }
    }

    fn statement(&mut self, id: NodeId) -> fmt::Result {
        let arena = self.arena;
        match &arena[id] {
            Node::CompilationUnit {
                package,
                imports,
                types,
            } => {
                if !package.is_empty() {
                    write!(self.out, "package {package};")?;
                    self.line()?;
                    self.line()?;
                }
                for import in imports {
                    self.statement(*import)?;
                    self.line()?;
                }
                if !imports.is_empty() {
                    self.line()?;
                }
                for (i, ty) in types.iter().enumerate() {
                    if i > 0 {
                        self.line()?;
                    }
                    self.statement(*ty)?;
                }
                Ok(())
            }
            Node::Import { name, is_static } => {
                let keyword = if *is_static { "import static" } else { "import" };
                write!(self.out, "{keyword} {name};")
            }
            Node::TypeDeclaration {
                name,
                kind,
                modifiers,
                members,
            } => {
                write!(self.out, "{modifiers}{kind} {} ", name.simple())?;
                self.members(*kind, members)
            }
            Node::Field {
                name,
                ty,
                modifiers,
                initializer,
            } => {
                write!(self.out, "{modifiers}{ty} {name}")?;
                if let Some(initializer) = initializer {
                    self.out.push_str(" = ");
                    self.expr(*initializer, 0)?;
                }
                self.out.push(';');
                Ok(())
            }
            Node::Method {
                name,
                kind,
                return_type,
                modifiers,
                parameters,
                body,
            } => {
                write!(self.out, "{modifiers}")?;
                match kind {
                    MethodKind::Method => write!(self.out, "{return_type} {name}(")?,
                    MethodKind::Constructor => {
                        let owner = arena.enclosing_type_name(id).map_or("<init>", |owner| owner.simple());
                        write!(self.out, "{owner}(")?;
                    }
                }
                for (i, parameter) in parameters.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.statement(*parameter)?;
                }
                self.out.push(')');
                match body {
                    Some(body) => self.embedded(*body),
                    None => {
                        self.out.push(';');
                        Ok(())
                    }
                }
            }
            Node::Initializer { modifiers, body } => {
                if modifiers.is_static() {
                    self.out.push_str("static ");
                }
                self.statement(*body)
            }
            Node::EnumValue {
                name,
                arguments,
                body,
            } => {
                write!(self.out, "{name}")?;
                if !arguments.is_empty() {
                    self.out.push('(');
                    self.list(arguments, ", ")?;
                    self.out.push(')');
                }
                if let Some(body) = body
                    && let Node::TypeDeclaration { kind, members, .. } = &arena[*body]
                {
                    self.out.push(' ');
                    self.members(*kind, members)?;
                }
                Ok(())
            }
            Node::Parameter {
                name,
                ty,
                modifiers,
            } => write!(self.out, "{modifiers}{ty} {name}"),

            Node::Block { statements } => self.block_body(statements),
            Node::ExpressionStatement { expression } => {
                self.expr(*expression, 0)?;
                self.out.push(';');
                Ok(())
            }
            Node::VariableDeclaration { .. } => {
                self.header_statement(id)?;
                self.out.push(';');
                Ok(())
            }
            Node::VariableInitializer { name, initializer } => {
                write!(self.out, "{name}")?;
                if let Some(initializer) = initializer {
                    self.out.push_str(" = ");
                    self.expr(*initializer, ASSIGNMENT)?;
                }
                Ok(())
            }
            Node::LocalTypeDeclaration { declaration } => self.statement(*declaration),
            Node::If {
                condition,
                then,
                otherwise,
            } => {
                self.out.push_str("if (");
                self.expr(*condition, 0)?;
                self.out.push(')');
                self.embedded(*then)?;
                if let Some(otherwise) = otherwise {
                    self.out.push_str(" else");
                    self.embedded(*otherwise)?;
                }
                Ok(())
            }
            Node::While { condition, body } => {
                self.out.push_str("while (");
                self.expr(*condition, 0)?;
                self.out.push(')');
                self.embedded(*body)
            }
            Node::DoWhile { body, condition } => {
                self.out.push_str("do");
                self.embedded(*body)?;
                self.out.push_str(" while (");
                self.expr(*condition, 0)?;
                self.out.push_str(");");
                Ok(())
            }
            Node::For {
                initializers,
                condition,
                iterators,
                body,
            } => {
                self.out.push_str("for (");
                for (i, initializer) in initializers.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.header_statement(*initializer)?;
                }
                self.out.push(';');
                if let Some(condition) = condition {
                    self.out.push(' ');
                    self.expr(*condition, 0)?;
                }
                self.out.push(';');
                for (i, iterator) in iterators.iter().enumerate() {
                    self.out.push_str(if i > 0 { ", " } else { " " });
                    self.header_statement(*iterator)?;
                }
                self.out.push(')');
                self.embedded(*body)
            }
            Node::ForEach {
                variable,
                iterable,
                body,
            } => {
                self.out.push_str("for (");
                self.header_statement(*variable)?;
                self.out.push_str(" : ");
                self.expr(*iterable, 0)?;
                self.out.push(')');
                self.embedded(*body)
            }
            Node::Switch { selector, sections } => {
                self.out.push_str("switch (");
                self.expr(*selector, 0)?;
                self.out.push_str(") {");
                self.indent += 1;
                for section in sections {
                    self.line()?;
                    self.statement(*section)?;
                }
                self.indent -= 1;
                self.line()?;
                self.out.push('}');
                Ok(())
            }
            Node::SwitchSection { labels, statements } => {
                for (i, label) in labels.iter().enumerate() {
                    if i > 0 {
                        self.line()?;
                    }
                    self.statement(*label)?;
                }
                self.indent += 1;
                for statement in statements {
                    self.line()?;
                    self.statement(*statement)?;
                }
                self.indent -= 1;
                Ok(())
            }
            Node::CaseLabel { value } => match value {
                Some(value) => {
                    self.out.push_str("case ");
                    self.expr(*value, 0)?;
                    self.out.push(':');
                    Ok(())
                }
                None => {
                    self.out.push_str("default:");
                    Ok(())
                }
            },
            Node::Try {
                resources,
                body,
                catches,
                finally,
            } => {
                self.out.push_str("try");
                if !resources.is_empty() {
                    self.out.push_str(" (");
                    for (i, resource) in resources.iter().enumerate() {
                        if i > 0 {
                            self.out.push_str("; ");
                        }
                        self.header_statement(*resource)?;
                    }
                    self.out.push(')');
                }
                self.embedded(*body)?;
                for catch in catches {
                    self.embedded(*catch)?;
                }
                if let Some(finally) = finally {
                    self.out.push_str(" finally");
                    self.embedded(*finally)?;
                }
                Ok(())
            }
            Node::Catch { types, name, body } => {
                self.out.push_str("catch (");
                for (i, ty) in types.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(" | ");
                    }
                    write!(self.out, "{ty}")?;
                }
                write!(self.out, " {name})")?;
                self.embedded(*body)
            }
            Node::Labeled { label, statement } => {
                write!(self.out, "{label}:")?;
                self.embedded(*statement)
            }
            Node::Label { label } => write!(self.out, "{label}:"),
            Node::Goto { label } => write!(self.out, "goto {label};"),
            Node::Break { label } => match label {
                Some(label) => write!(self.out, "break {label};"),
                None => write!(self.out, "break;"),
            },
            Node::Continue { label } => match label {
                Some(label) => write!(self.out, "continue {label};"),
                None => write!(self.out, "continue;"),
            },
            Node::Return { value } => {
                self.out.push_str("return");
                if let Some(value) = value {
                    self.out.push(' ');
                    self.expr(*value, 0)?;
                }
                self.out.push(';');
                Ok(())
            }
            Node::Throw { exception } => {
                self.out.push_str("throw ");
                self.expr(*exception, 0)?;
                self.out.push(';');
                Ok(())
            }
            Node::Assert { condition, message } => {
                self.out.push_str("assert ");
                self.expr(*condition, 0)?;
                if let Some(message) = message {
                    self.out.push_str(" : ");
                    self.expr(*message, 0)?;
                }
                self.out.push(';');
                Ok(())
            }
            Node::Synchronized { lock, body } => {
                self.out.push_str("synchronized (");
                self.expr(*lock, 0)?;
                self.out.push(')');
                self.embedded(*body)
            }
            Node::Empty => {
                self.out.push(';');
                Ok(())
            }
            Node::Hole => {
                self.out.push_str("<hole>");
                Ok(())
            }
            _ => self.expr(id, 0),
        }
    }

    fn precedence(&self, id: NodeId) -> u8 {
        match &self.arena[id] {
            Node::Lambda { .. } | Node::Assignment { .. } => ASSIGNMENT,
            Node::Conditional { .. } => CONDITIONAL,
            Node::Binary { op, .. } => op.precedence(),
            Node::InstanceOf { .. } => INSTANCEOF,
            Node::Cast { .. } => PREFIX,
            Node::Unary { op, .. } if op.is_postfix() => POSTFIX,
            Node::Unary { .. } => PREFIX,
            _ => PRIMARY,
        }
    }

    fn ty(&mut self, ty: &TypeRef) -> fmt::Result {
        write!(self.out, "{ty}")
    }

    fn expr(&mut self, id: NodeId, min_precedence: u8) -> fmt::Result {
        let precedence = self.precedence(id);
        if precedence < min_precedence {
            self.out.push('(');
            self.expr(id, 0)?;
            self.out.push(')');
            return Ok(());
        }

        let arena = self.arena;
        match &arena[id] {
            Node::Identifier { name } => write!(self.out, "{name}"),
            Node::MemberReference { target, member } => {
                self.expr(*target, PRIMARY)?;
                write!(self.out, ".{member}")
            }
            Node::Invocation { target, arguments } => {
                self.expr(*target, PRIMARY)?;
                self.out.push('(');
                self.list(arguments, ", ")?;
                self.out.push(')');
                Ok(())
            }
            Node::MethodReference { target, member, .. } => {
                self.expr(*target, PRIMARY)?;
                write!(self.out, "::{member}")
            }
            Node::Assignment { op, target, value } => {
                self.expr(*target, ASSIGNMENT + 1)?;
                write!(self.out, " {op} ")?;
                self.expr(*value, ASSIGNMENT)
            }
            Node::Binary { op, left, right } => {
                self.expr(*left, op.precedence())?;
                write!(self.out, " {op} ")?;
                self.expr(*right, op.precedence() + 1)
            }
            Node::Unary { op, operand } => {
                if op.is_postfix() {
                    self.expr(*operand, POSTFIX)?;
                    self.out.push_str(op.symbol());
                    return Ok(());
                }
                self.out.push_str(op.symbol());
                // Keep `- -x` and `-(-1)` from gluing into `--x`.
                let glues = match (&arena[*operand], op) {
                    (Node::Unary { op: inner, .. }, UnaryOp::Neg | UnaryOp::PreDecrement) => {
                        matches!(inner, UnaryOp::Neg | UnaryOp::PreDecrement)
                    }
                    (Node::Unary { op: inner, .. }, UnaryOp::Plus | UnaryOp::PreIncrement) => {
                        matches!(inner, UnaryOp::Plus | UnaryOp::PreIncrement)
                    }
                    (Node::Literal { value }, UnaryOp::Neg) => value.is_negative(),
                    _ => false,
                };
                if glues {
                    self.out.push('(');
                    self.expr(*operand, 0)?;
                    self.out.push(')');
                    Ok(())
                } else {
                    self.expr(*operand, PREFIX)
                }
            }
            Node::Conditional {
                condition,
                then,
                otherwise,
            } => {
                self.expr(*condition, CONDITIONAL + 1)?;
                self.out.push_str(" ? ");
                self.expr(*then, CONDITIONAL)?;
                self.out.push_str(" : ");
                self.expr(*otherwise, CONDITIONAL)
            }
            Node::Cast { ty, operand } => {
                self.out.push('(');
                self.ty(ty)?;
                self.out.push_str(") ");
                self.expr(*operand, PREFIX)
            }
            Node::InstanceOf { operand, ty } => {
                self.expr(*operand, INSTANCEOF)?;
                self.out.push_str(" instanceof ");
                self.ty(ty)
            }
            Node::ObjectCreation {
                ty,
                arguments,
                body,
            } => {
                self.out.push_str("new ");
                self.ty(ty)?;
                self.out.push('(');
                self.list(arguments, ", ")?;
                self.out.push(')');
                if let Some(body) = body
                    && let Node::TypeDeclaration { kind, members, .. } = &arena[*body]
                {
                    self.out.push(' ');
                    self.members(*kind, members)?;
                }
                Ok(())
            }
            Node::ArrayCreation {
                ty,
                dimensions,
                initializer,
            } => {
                let mut element = ty;
                let mut rank = 0;
                while let TypeRef::Array(inner) = element {
                    element = inner;
                    rank += 1;
                }
                self.out.push_str("new ");
                self.ty(element)?;
                for dimension in dimensions {
                    self.out.push('[');
                    self.expr(*dimension, 0)?;
                    self.out.push(']');
                }
                for _ in dimensions.len()..rank {
                    self.out.push_str("[]");
                }
                if let Some(initializer) = initializer {
                    self.out.push(' ');
                    self.expr(*initializer, 0)?;
                }
                Ok(())
            }
            Node::ArrayInitializer { elements } => {
                self.out.push('{');
                self.list(elements, ", ")?;
                self.out.push('}');
                Ok(())
            }
            Node::Indexer { target, index } => {
                self.expr(*target, PRIMARY)?;
                self.out.push('[');
                self.expr(*index, 0)?;
                self.out.push(']');
                Ok(())
            }
            Node::Lambda { parameters, body } => {
                let names: Vec<String> = parameters
                    .iter()
                    .filter_map(|parameter| arena[*parameter].declared_name())
                    .map(ToString::to_string)
                    .collect();
                if names.len() == 1 {
                    write!(self.out, "{} -> ", names[0])?;
                } else {
                    write!(self.out, "({}) -> ", names.join(", "))?;
                }
                if arena[*body].is_expression() {
                    self.expr(*body, 0)
                } else {
                    self.statement(*body)
                }
            }
            Node::Literal { value } => write!(self.out, "{value}"),
            Node::This { qualifier } => match qualifier {
                Some(qualifier) => write!(self.out, "{}.this", qualifier.simple()),
                None => write!(self.out, "this"),
            },
            Node::Super => write!(self.out, "super"),
            Node::TypeReference { ty } => self.ty(ty),
            Node::ClassLiteral { ty } => write!(self.out, "{ty}.class"),
            Node::Hole => write!(self.out, "<hole>"),
            _ => self.statement(id),
        }
    }
}
