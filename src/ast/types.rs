use super::Name;
use core::fmt;
use displaydoc::Display;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    /// boolean
    Boolean,
    /// byte
    Byte,
    /// char
    Char,
    /// short
    Short,
    /// int
    Int,
    /// long
    Long,
    /// float
    Float,
    /// double
    Double,
    /// void
    Void,
}

impl PrimitiveType {
    /// The wrapper class that boxes this type, e.g. `java.lang.Integer` for `int`.
    pub fn box_class(self) -> Option<&'static str> {
        use PrimitiveType::*;
        Some(match self {
            Boolean => "java.lang.Boolean",
            Byte => "java.lang.Byte",
            Char => "java.lang.Character",
            Short => "java.lang.Short",
            Int => "java.lang.Integer",
            Long => "java.lang.Long",
            Float => "java.lang.Float",
            Double => "java.lang.Double",
            Void => return None,
        })
    }

    pub fn from_box_class(class: &str) -> Option<Self> {
        use PrimitiveType::*;
        Some(match class {
            "java.lang.Boolean" => Boolean,
            "java.lang.Byte" => Byte,
            "java.lang.Character" => Char,
            "java.lang.Short" => Short,
            "java.lang.Integer" => Int,
            "java.lang.Long" => Long,
            "java.lang.Float" => Float,
            "java.lang.Double" => Double,
            _ => return None,
        })
    }

    /// The primitive produced by an unboxing accessor such as `intValue`.
    pub fn from_unbox_method(name: &str) -> Option<Self> {
        use PrimitiveType::*;
        Some(match name {
            "booleanValue" => Boolean,
            "byteValue" => Byte,
            "charValue" => Char,
            "shortValue" => Short,
            "intValue" => Int,
            "longValue" => Long,
            "floatValue" => Float,
            "doubleValue" => Double,
            _ => return None,
        })
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, Self::Boolean | Self::Void)
    }

    pub fn is_floating(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }

    /// Whether a widening primitive conversion (JLS 5.1.2) exists from `self` to `target`.
    pub fn widens_to(self, target: Self) -> bool {
        use PrimitiveType::*;
        match self {
            Byte => matches!(target, Short | Int | Long | Float | Double),
            Short | Char => matches!(target, Int | Long | Float | Double),
            Int => matches!(target, Long | Float | Double),
            Long => matches!(target, Float | Double),
            Float => target == Double,
            Boolean | Double | Void => false,
        }
    }

    /// The literal a field or local of this type holds before its first assignment.
    pub fn default_value(self) -> Literal {
        use PrimitiveType::*;
        match self {
            Boolean => Literal::Bool(false),
            Char => Literal::Char(0),
            Byte | Short | Int | Void => Literal::Int(0),
            Long => Literal::Long(0),
            Float => Literal::Float(0.0),
            Double => Literal::Double(0.0),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Primitive(PrimitiveType),
    /// A class or interface by binary name, e.g. `java.util.Map$Entry`.
    Class(Name),
    Array(Box<TypeRef>),
    /// The type of the `null` literal.
    Null,
}

impl TypeRef {
    pub fn class(name: &str) -> Self {
        Self::Class(Name::from(name))
    }

    pub fn array_of(element: TypeRef) -> Self {
        Self::Array(Box::new(element))
    }

    pub fn int() -> Self {
        Self::Primitive(PrimitiveType::Int)
    }

    pub fn boolean() -> Self {
        Self::Primitive(PrimitiveType::Boolean)
    }

    pub fn void() -> Self {
        Self::Primitive(PrimitiveType::Void)
    }

    pub fn string() -> Self {
        Self::class("java.lang.String")
    }

    pub fn object() -> Self {
        Self::class("java.lang.Object")
    }

    pub fn primitive(&self) -> Option<PrimitiveType> {
        match self {
            Self::Primitive(primitive) => Some(*primitive),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Self::Primitive(_))
    }

    pub fn is_reference(&self) -> bool {
        !self.is_primitive()
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Self::Class(name) if name == "java.lang.String")
    }

    pub fn class_name(&self) -> Option<&Name> {
        match self {
            Self::Class(name) => Some(name),
            _ => None,
        }
    }

    /// The primitive wrapped by a box class, if this is one.
    pub fn unboxed(&self) -> Option<PrimitiveType> {
        PrimitiveType::from_box_class(self.class_name()?)
    }

    pub fn boxed(&self) -> Option<TypeRef> {
        Some(Self::class(self.primitive()?.box_class()?))
    }

    pub fn default_value(&self) -> Literal {
        match self {
            Self::Primitive(primitive) => primitive.default_value(),
            _ => Literal::Null,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(primitive) => write!(f, "{primitive}"),
            Self::Class(name) => write!(f, "{}", name.simple()),
            Self::Array(element) => write!(f, "{element}[]"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// Access flags and modifiers of declarations, stored as a bit set.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers(u16);

impl Modifiers {
    pub const NONE: Self = Self(0);
    pub const PUBLIC: Self = Self(1 << 0);
    pub const PRIVATE: Self = Self(1 << 1);
    pub const PROTECTED: Self = Self(1 << 2);
    pub const STATIC: Self = Self(1 << 3);
    pub const FINAL: Self = Self(1 << 4);
    pub const SYNCHRONIZED: Self = Self(1 << 5);
    pub const ABSTRACT: Self = Self(1 << 6);
    pub const DEFAULT: Self = Self(1 << 7);
    // The flags below are never printed.
    pub const SYNTHETIC: Self = Self(1 << 8);
    pub const BRIDGE: Self = Self(1 << 9);
    pub const ENUM: Self = Self(1 << 10);
    pub const VARARGS: Self = Self(1 << 11);

    const KEYWORDS: [(Self, &'static str); 8] = [
        (Self::PUBLIC, "public"),
        (Self::PROTECTED, "protected"),
        (Self::PRIVATE, "private"),
        (Self::ABSTRACT, "abstract"),
        (Self::DEFAULT, "default"),
        (Self::STATIC, "static"),
        (Self::FINAL, "final"),
        (Self::SYNCHRONIZED, "synchronized"),
    ];

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub fn is_synthetic(self) -> bool {
        self.contains(Self::SYNTHETIC)
    }

    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }
}

impl core::ops::BitOr for Modifiers {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Debug for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Modifiers({self}")?;
        for (flag, name) in [
            (Self::SYNTHETIC, "synthetic"),
            (Self::BRIDGE, "bridge"),
            (Self::ENUM, "enum"),
            (Self::VARARGS, "varargs"),
        ] {
            if self.contains(flag) {
                write!(f, "{name} ")?;
            }
        }
        write!(f, ")")
    }
}

/// Prints the source keywords, each followed by a space.
impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, keyword) in Self::KEYWORDS {
            if self.contains(flag) {
                write!(f, "{keyword} ")?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(u16),
    String(Name),
}

impl Literal {
    pub fn ty(&self) -> TypeRef {
        match self {
            Self::Null => TypeRef::Null,
            Self::Bool(_) => TypeRef::boolean(),
            Self::Int(_) => TypeRef::int(),
            Self::Long(_) => TypeRef::Primitive(PrimitiveType::Long),
            Self::Float(_) => TypeRef::Primitive(PrimitiveType::Float),
            Self::Double(_) => TypeRef::Primitive(PrimitiveType::Double),
            Self::Char(_) => TypeRef::Primitive(PrimitiveType::Char),
            Self::String(_) => TypeRef::string(),
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&Name> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Whether this is a numeric literal with a negative sign bit.
    pub fn is_negative(&self) -> bool {
        match self {
            Self::Int(value) => *value < 0,
            Self::Long(value) => *value < 0,
            Self::Float(value) => value.is_sign_negative() && !value.is_nan(),
            Self::Double(value) => value.is_sign_negative() && !value.is_nan(),
            _ => false,
        }
    }

    /// The negated literal, unless negation overflows or changes meaning.
    pub fn negated(&self) -> Option<Self> {
        match self {
            Self::Int(value) => value.checked_neg().map(Self::Int),
            Self::Long(value) => value.checked_neg().map(Self::Long),
            Self::Float(value) if !value.is_nan() => Some(Self::Float(-value)),
            Self::Double(value) if !value.is_nan() => Some(Self::Double(-value)),
            _ => None,
        }
    }
}

// Floating-point literals compare by bits, so that `NaN` equals itself and `0.0` differs from `-0.0`.
impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            _ => false,
        }
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, c: char, quote: char) -> fmt::Result {
    match c {
        '\n' => write!(f, "\\n"),
        '\r' => write!(f, "\\r"),
        '\t' => write!(f, "\\t"),
        '\\' => write!(f, "\\\\"),
        c if c == quote => write!(f, "\\{c}"),
        c if c.is_control() => write!(f, "\\u{:04x}", c as u32),
        c => write!(f, "{c}"),
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Long(value) => write!(f, "{value}L"),
            Self::Float(value) => write!(f, "{value:?}f"),
            Self::Double(value) => write!(f, "{value:?}"),
            Self::Char(value) => {
                write!(f, "'")?;
                match char::from_u32(u32::from(*value)) {
                    Some(c) => write_escaped(f, c, '\'')?,
                    None => write!(f, "\\u{value:04x}")?,
                }
                write!(f, "'")
            }
            Self::String(value) => {
                write!(f, "\"")?;
                for c in value.chars() {
                    write_escaped(f, c, '"')?;
                }
                write!(f, "\"")
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Field,
    Method,
    Constructor,
}

/// A resolved reference to a field, method or constructor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub declaring_type: Name,
    pub name: Name,
    pub kind: MemberKind,
    /// Field type or method return type.
    pub ty: TypeRef,
    pub parameters: Vec<TypeRef>,
    pub modifiers: Modifiers,
}

impl MemberRef {
    pub fn field(declaring_type: &str, name: &str, ty: TypeRef, modifiers: Modifiers) -> Self {
        Self {
            declaring_type: Name::from(declaring_type),
            name: Name::from(name),
            kind: MemberKind::Field,
            ty,
            parameters: Vec::new(),
            modifiers,
        }
    }

    pub fn method(
        declaring_type: &str,
        name: &str,
        ty: TypeRef,
        parameters: Vec<TypeRef>,
        modifiers: Modifiers,
    ) -> Self {
        Self {
            declaring_type: Name::from(declaring_type),
            name: Name::from(name),
            kind: MemberKind::Method,
            ty,
            parameters,
            modifiers,
        }
    }

    /// Whether `self` and `other` denote the same declaration, ignoring modifiers.
    pub fn same_member(&self, other: &MemberRef) -> bool {
        self.declaring_type == other.declaring_type
            && self.name == other.name
            && self.kind == other.kind
            && self.parameters == other.parameters
    }
}

/// Links an identifier or declaration to the variable it denotes in the method being rebuilt.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Variable {
    pub name: Name,
    pub ty: TypeRef,
    pub is_parameter: bool,
    /// Introduced by the compiler rather than present in the source.
    pub is_generated: bool,
}

/// Per-node metadata attached by the upstream decompiler. Structural comparison ignores it.
#[derive(Clone, Debug, Default)]
pub struct Meta {
    pub ty: Option<TypeRef>,
    pub member: Option<MemberRef>,
    pub variable: Option<Variable>,
    pub constant: Option<Literal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widening() {
        use PrimitiveType::*;
        assert!(Int.widens_to(Long));
        assert!(Char.widens_to(Int));
        assert!(!Char.widens_to(Short));
        assert!(!Long.widens_to(Int));
        assert!(!Boolean.widens_to(Int));
    }

    #[test]
    fn literal_display() {
        assert_eq!(Literal::Long(5).to_string(), "5L");
        assert_eq!(Literal::Float(1.5).to_string(), "1.5f");
        assert_eq!(Literal::Double(2.0).to_string(), "2.0");
        assert_eq!(Literal::Char(u16::from(b'\'')).to_string(), "'\\''");
        assert_eq!(
            Literal::String(Name::from("a\"b\n")).to_string(),
            "\"a\\\"b\\n\""
        );
    }

    #[test]
    fn literal_nan_equality() {
        assert_eq!(Literal::Double(f64::NAN), Literal::Double(f64::NAN));
        assert_ne!(Literal::Double(0.0), Literal::Double(-0.0));
    }

    #[test]
    fn modifiers_display() {
        let modifiers = Modifiers::PRIVATE | Modifiers::STATIC | Modifiers::FINAL | Modifiers::SYNTHETIC;
        assert_eq!(modifiers.to_string(), "private static final ");
        assert!(modifiers.is_synthetic());
    }
}
