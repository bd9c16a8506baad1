use alloc::sync::Arc;
use core::borrow::Borrow;
use core::fmt;
use core::ops::Deref;

/// An identifier, qualified name or string constant. Cloning is a reference count bump, so names can
/// be copied freely between nodes, metadata and pattern captures.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(Arc<str>);

impl Name {
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The last component of a qualified or binary name: `java.util.Map$Entry` → `Entry`.
    pub fn simple(&self) -> &str {
        let s = self.as_str();
        let start = s.rfind(['.', '$']).map_or(0, |i| i + 1);
        let tail = &s[start..];
        let declared = tail.trim_start_matches(|c: char| c.is_ascii_digit());
        // Anonymous classes are named `Outer$1`; keep the outer part in that case. Local classes
        // are named `Outer$1Local`.
        if declared.is_empty() && !tail.is_empty() {
            return &s[s.rfind('.').map_or(0, |i| i + 1)..];
        }
        declared
    }

    /// Everything before the last `.`, or `""` for names in the default package.
    pub fn package(&self) -> &str {
        let s = self.as_str();
        s.rfind('.').map_or("", |i| &s[..i])
    }
}

impl Deref for Name {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        *self.0 == *other
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        *self.0 == **other
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_names() {
        assert_eq!(Name::from("java.util.Map$Entry").simple(), "Entry");
        assert_eq!(Name::from("java.lang.String").simple(), "String");
        assert_eq!(Name::from("Main").simple(), "Main");
        assert_eq!(Name::from("pkg.Outer$1").simple(), "Outer$1");
        assert_eq!(Name::from("pkg.Outer$1Local").simple(), "Local");
        assert_eq!(Name::from("pkg.Outer$1").package(), "pkg");
        assert_eq!(Name::from("Main").package(), "");
    }
}
