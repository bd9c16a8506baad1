use crate::ast::{Arena, NodeId};
use crate::error::{InvariantViolation, TransformError};
use crate::metadata::Resolver;
use crate::settings::Settings;
use crate::transforms::*;
use tracing::{debug, debug_span};

/// What every pass may consult besides the tree.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub settings: &'a Settings,
    pub resolver: &'a dyn Resolver,
}

/// One rewrite pass.
///
/// A pass either rewrites a candidate completely or leaves it untouched: failed matches, unsafe
/// rewrites and missing metadata all mean "skip". Only broken tree invariants are reported as
/// errors.
pub trait Transform {
    fn name(&self) -> &'static str;

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        context: &Context<'_>,
    ) -> Result<(), InvariantViolation>;
}

/// An ordered list of passes.
pub struct Pipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl Default for Pipeline {
    /// The standard order. Some passes appear twice because later passes recreate the shapes they
    /// clean up.
    fn default() -> Self {
        Self::new(vec![
            Box::new(EnumRewriter),
            Box::new(EnumSwitchRewriter),
            Box::new(EclipseEnumSwitchRewriter),
            Box::new(AssertStatements),
            Box::new(RemoveImplicitBoxing),
            Box::new(RemoveRedundantCasts),
            Box::new(ConvertLoops),
            Box::new(BreakTargetRelocation),
            Box::new(LabelCleanup),
            Box::new(TryWithResources),
            Box::new(DeclareVariables),
            Box::new(StringSwitchRewriter),
            Box::new(SimplifyAssignments),
            Box::new(EliminateSyntheticAccessors),
            Box::new(RewriteLegacyClassConstants),
            Box::new(LambdaTransform),
            Box::new(RewriteNewArrayLambdas),
            Box::new(RewriteLocalClasses),
            Box::new(IntroduceOuterClassReferences),
            Box::new(DeclareLocalClasses),
            Box::new(IntroduceInitializers),
            Box::new(MergeResourceTryStatements),
            Box::new(IntroduceStringConcatenation),
            Box::new(SimplifyArithmetic),
            Box::new(SimplifyAssignments),
            Box::new(FlattenElseIf),
            Box::new(FlattenSwitchBlocks),
            Box::new(RemoveHiddenMembers),
            Box::new(RemoveRedundantCasts),
            Box::new(SimplifyMemberReferences),
            Box::new(CollapseImports),
        ])
    }
}

impl Pipeline {
    pub fn new(transforms: Vec<Box<dyn Transform>>) -> Self {
        Self { transforms }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.transforms.iter().map(|transform| transform.name())
    }

    pub fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        context: &Context<'_>,
    ) -> Result<(), TransformError> {
        self.run_until(arena, root, context, |_| false)
    }

    /// Runs the passes in order, stopping before the first pass for which `abort` returns `true`.
    /// The tree is left as the passes run so far produced it.
    pub fn run_until(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        context: &Context<'_>,
        mut abort: impl FnMut(&str) -> bool,
    ) -> Result<(), TransformError> {
        for transform in &mut self.transforms {
            let pass = transform.name();
            if abort(pass) {
                debug!(pass, "pipeline aborted");
                return Ok(());
            }

            let _span = debug_span!("transform", pass).entered();
            transform
                .run(arena, root, context)
                .map_err(|source| TransformError::Invariant { pass, source })?;

            if cfg!(debug_assertions) {
                arena
                    .check(root)
                    .map_err(|source| TransformError::Invariant { pass, source })?;
            }
        }
        Ok(())
    }
}
