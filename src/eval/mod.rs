//! Dana evaluation.
//!
//! The [`evaluator::Evaluator`] drives a [`crate::ast::Program`] through the
//! [`statement::StatementEvaluator`], which delegates expressions to the
//! [`expression::ExpressionEvaluator`]. Statements run in source order on the
//! calling logical thread; Dana calls inside expressions return promises that
//! are forced at the points a value is actually needed.
//!
//! Values ([`value`]) are either inline or reference-counted heap handles, and all
//! scope state lives in a [`context::SandboxContext`].

pub mod builtins;
pub mod context;
pub mod evaluator;
pub mod expression;
pub mod operators;
pub mod statement;
pub mod value;
