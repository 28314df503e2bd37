//! Kestrel semantic analysis: type inference, trait checking and
//! recursive-type detection.
//!
//! [`check`] takes a parsed [`Program`] and produces a fully typed tree, the
//! set of generic specializations code generation must emit, and the
//! templates they come from. Checking stops at the first error.
//!
//! # Architecture
//!
//! - [`ty`]: inference-phase types and type variables
//! - [`union_find`], [`unify`], [`subst`]: unification and substitutions
//! - [`constraint`], [`solver`]: prioritized constraint solving
//! - [`scope`], [`context`]: symbols, nominal definitions
//! - [`traits`], [`locality`]: trait declarations and where `given`s may live
//! - [`instantiation`], [`registry`]: specialization requests and templates
//! - [`recursive`]: infinite-size value type detection
//! - [`exhaustiveness`]: coverage and redundancy of `match` arms
//! - [`error`], [`diagnostics`]: error taxonomy and ariadne rendering

pub mod config;
pub mod constraint;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod exhaustiveness;
mod infer;
pub mod instantiation;
pub mod locality;
pub mod output;
pub mod recursive;
pub mod registry;
pub mod resolve;
pub mod resolved;
pub mod scope;
pub mod solver;
pub mod subst;
pub mod traits;
pub mod ty;
pub mod typed;
pub mod unify;
pub mod union_find;

use std::sync::Once;

use kestrel_ast::Program;

pub use config::{GenericCopyPolicy, SemaConfig};
pub use error::{SemanticError, SemanticErrorKind};
pub use output::TypeCheckerOutput;
pub use recursive::RecursionCycle;
pub use resolved::ResolvedTy;

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber filtered by `RUST_LOG`. Does nothing when
/// the variable is unset or a subscriber is already installed.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(EnvFilter::from_default_env())
                .try_init();
        }
    });
}

/// Type-check a whole program.
pub fn check(program: &Program, config: &SemaConfig) -> Result<TypeCheckerOutput, SemanticError> {
    infer::Checker::new(program, config).run()
}

/// Every infinite-size value type in `program`, without checking any
/// bodies. Only type declarations need to be valid.
pub fn find_recursive_types(program: &Program, config: &SemaConfig) -> Result<Vec<RecursionCycle>, SemanticError> {
    infer::Checker::new(program, config).find_cycles()
}
