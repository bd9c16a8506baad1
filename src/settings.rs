use serde::Deserialize;

/// User-facing switches. Every toggle defaults to off, which produces the most idiomatic output.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Keep compiler-generated members (accessors, bridge methods, hidden fields) in the output.
    pub show_synthetic_members: bool,
    /// Shorten `this.f` and `Outer.f` to `f` where the simple name binds to the same member.
    pub simplify_member_references: bool,
    /// Keep every type reference fully qualified; also disables member reference shortening.
    pub force_fully_qualified_references: bool,
    /// Keep `java.lang` and same-package imports.
    pub force_explicit_imports: bool,
    /// Leave indexed and iterator loops alone instead of turning them into for-each loops.
    pub disable_for_each_transforms: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize() {
        let settings: Settings =
            serde_json::from_str(r#"{"show_synthetic_members": true}"#).unwrap();
        assert_eq!(
            settings,
            Settings {
                show_synthetic_members: true,
                ..Settings::default()
            }
        );
        assert_eq!(serde_json::from_str::<Settings>("{}").unwrap(), Settings::default());
        assert!(serde_json::from_str::<Settings>(r#"{"show_everything": true}"#).is_err());
    }
}
