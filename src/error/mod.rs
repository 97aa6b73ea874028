//! A set of errors that can occur when configuring or stepping gates and channels

use std::fmt::{Display, Debug, Formatter, Result};


macro_rules! impl_debug_default {
    ($name:ident) => {
        impl Debug for $name {
            fn fmt(&self, f: &mut Formatter) -> Result {
                write!(f, "{}", self)
            }
        }
    };
}

/// Error set for rate expression compilation and evaluation
#[derive(Clone, PartialEq, Eq)]
pub enum ExpressionError {
    /// Expression could not be compiled, carries the offending expression,
    /// a byte position when one could be determined, and the parser diagnostic
    Malformed {
        /// Expression source text
        expression: String,
        /// Byte offset of the failure where locatable
        position: Option<usize>,
        /// Parser diagnostic
        detail: String,
    },
    /// Expression compiled but failed during evaluation
    Eval {
        /// Expression source text
        expression: String,
        /// Evaluator diagnostic
        detail: String,
    },
    /// Empty expression string where one was required
    EmptyExpression,
}

impl Display for ExpressionError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        let err_msg = match self {
            ExpressionError::Malformed { expression, position, detail } => match position {
                Some(pos) => format!(
                    "Cannot compile expression '{}' at position {}: {}", expression, pos, detail
                ),
                None => format!("Cannot compile expression '{}': {}", expression, detail),
            },
            ExpressionError::Eval { expression, detail } => format!(
                "Cannot evaluate expression '{}': {}", expression, detail
            ),
            ExpressionError::EmptyExpression => String::from("Expression string is empty"),
        };

        write!(f, "{}", err_msg)
    }
}

impl_debug_default!(ExpressionError);

/// Error set for gate configuration and lookup
#[derive(Clone, PartialEq, Eq)]
pub enum GateError {
    /// Mutating operation attempted through a channel that does not own the gate
    NotOriginal(String),
    /// `table_a` and `table_b` lengths disagree
    ShapeMismatch {
        /// Length of the A table
        table_a: usize,
        /// Length of the offered B table
        table_b: usize,
    },
    /// Configuration value outside the accepted range (`divs < 1`, `min >= max`)
    OutOfConfigRange(String),
    /// Gate queried before its tables were filled from the current expressions
    TablesNotFilled,
    /// Rate expression could not be compiled or evaluated
    ExpressionFailure(ExpressionError),
}

impl Display for GateError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        let err_msg = match self {
            GateError::NotOriginal(operation) => format!(
                "'{}' is only allowed through the original channel, ignoring", operation
            ),
            GateError::ShapeMismatch { table_a, table_b } => format!(
                "Table sizes must match, table A has {} entries but table B has {}",
                table_a, table_b,
            ),
            GateError::OutOfConfigRange(string) => format!(
                "Configuration value out of range: {}", string
            ),
            GateError::TablesNotFilled => String::from(
                "Gate tables have not been filled from the current expressions"
            ),
            GateError::ExpressionFailure(err) => format!("{}", err),
        };

        write!(f, "{}", err_msg)
    }
}

impl_debug_default!(GateError);

impl From<ExpressionError> for GateError {
    fn from(err: ExpressionError) -> GateError {
        GateError::ExpressionFailure(err)
    }
}

/// Error set for channel stepping and gate management
#[derive(Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// A gate has power > 0 but no gate is attached
    MissingGate(String),
    /// Gate activation denominator is effectively zero at reinit
    SingularActivation(String),
    /// Gate management attempted through a copied channel
    NotOriginal(String),
    /// Input index string outside the recognised set
    UnknownInputIndex(String),
    /// Negative or otherwise unusable gate power
    InvalidPower(String),
    /// Underlying gate failure during a step
    GateFailure(GateError),
}

impl Display for ChannelError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        let err_msg = match self {
            ChannelError::MissingGate(name) => format!(
                "Gate {} has power > 0 but no gate is attached", name
            ),
            ChannelError::SingularActivation(name) => format!(
                "B value for gate {} is ~0, check the gate tables", name
            ),
            ChannelError::NotOriginal(operation) => format!(
                "'{}' is only allowed through the original channel, ignoring", operation
            ),
            ChannelError::UnknownInputIndex(string) => format!(
                "Unknown input index '{}'", string
            ),
            ChannelError::InvalidPower(string) => format!(
                "Invalid gate power: {}", string
            ),
            ChannelError::GateFailure(err) => format!("{}", err),
        };

        write!(f, "{}", err_msg)
    }
}

impl_debug_default!(ChannelError);

impl From<GateError> for ChannelError {
    fn from(err: GateError) -> ChannelError {
        ChannelError::GateFailure(err)
    }
}

/// A set of errors that may occur when using the library
#[derive(Clone, PartialEq, Eq)]
pub enum ChannelGatingError {
    /// Errors related to rate expressions
    ExpressionRelatedError(ExpressionError),
    /// Errors related to gates
    GateRelatedError(GateError),
    /// Errors related to channels
    ChannelRelatedError(ChannelError),
}

impl Display for ChannelGatingError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            ChannelGatingError::ExpressionRelatedError(err) => write!(f, "{}", err),
            ChannelGatingError::GateRelatedError(err) => write!(f, "{}", err),
            ChannelGatingError::ChannelRelatedError(err) => write!(f, "{}", err),
        }
    }
}

impl_debug_default!(ChannelGatingError);

macro_rules! impl_from_error_default {
    ($error_name:ident, $variant_name:ident) => {
        impl From<$error_name> for ChannelGatingError {
            fn from(err: $error_name) -> ChannelGatingError {
                ChannelGatingError::$variant_name(err)
            }
        }
    };
}

impl_from_error_default!(ExpressionError, ExpressionRelatedError);
impl_from_error_default!(GateError, GateRelatedError);
impl_from_error_default!(ChannelError, ChannelRelatedError);
