//! Gates that evaluate their rate expressions on every query instead of
//! tabulating them. Slower than a table lookup but exact, which matters when
//! an input such as a calcium concentration spans several orders of
//! magnitude and a fixed grid would lose the low end.

use log::warn;
use crate::error::{ExpressionError, GateError};
use crate::expression::RateExpression;
use super::{ChannelId, GateForm, GateId, GateKinetics};


macro_rules! impl_formula_gate_accessors {
    ($name:ident) => {
        impl $name {
            fn check_original(
                &self,
                caller: ChannelId,
                operation: &str,
            ) -> Result<(), GateError> {
                if caller == self.owner {
                    Ok(())
                } else {
                    warn!(
                        "{}: '{}' not allowed from a copied channel, ignoring",
                        stringify!($name), operation,
                    );
                    Err(GateError::NotOriginal(operation.to_string()))
                }
            }

            /// The channel that owns this gate
            pub fn owner(&self) -> ChannelId {
                self.owner
            }

            /// This gate's own id
            pub fn gate_id(&self) -> GateId {
                self.self_id
            }

            /// Parameter supply currently in effect, never the table form
            pub fn form(&self) -> GateForm {
                if self.tau_inf {
                    GateForm::TauInf
                } else {
                    GateForm::AlphaBeta
                }
            }

            /// Sets the alpha rate expression, switching to alpha/beta form.
            /// Compile failures keep the previous expression.
            pub fn set_alpha_expr(
                &mut self,
                caller: ChannelId,
                expr: &str,
            ) -> Result<(), GateError> {
                self.check_original(caller, "alphaExpr")?;
                let compiled = RateExpression::compile(expr)?;
                self.expr_a = Some(compiled);
                self.tau_inf = false;
                Ok(())
            }

            /// Sets the beta rate expression, switching to alpha/beta form
            pub fn set_beta_expr(
                &mut self,
                caller: ChannelId,
                expr: &str,
            ) -> Result<(), GateError> {
                self.check_original(caller, "betaExpr")?;
                let compiled = RateExpression::compile(expr)?;
                self.expr_b = Some(compiled);
                self.tau_inf = false;
                Ok(())
            }

            /// Sets the tau expression, switching to tau/inf form
            pub fn set_tau_expr(
                &mut self,
                caller: ChannelId,
                expr: &str,
            ) -> Result<(), GateError> {
                self.check_original(caller, "tauExpr")?;
                let compiled = RateExpression::compile(expr)?;
                self.expr_a = Some(compiled);
                self.tau_inf = true;
                Ok(())
            }

            /// Sets the steady state expression, switching to tau/inf form
            pub fn set_inf_expr(
                &mut self,
                caller: ChannelId,
                expr: &str,
            ) -> Result<(), GateError> {
                self.check_original(caller, "infExpr")?;
                let compiled = RateExpression::compile(expr)?;
                self.expr_b = Some(compiled);
                self.tau_inf = true;
                Ok(())
            }

            /// The alpha expression source, present only in alpha/beta form
            pub fn alpha_expr(&self) -> Option<&str> {
                if self.tau_inf {
                    None
                } else {
                    self.expr_a.as_ref().map(|e| e.source())
                }
            }

            /// The beta expression source, present only in alpha/beta form
            pub fn beta_expr(&self) -> Option<&str> {
                if self.tau_inf {
                    None
                } else {
                    self.expr_b.as_ref().map(|e| e.source())
                }
            }

            /// The tau expression source, present only in tau/inf form
            pub fn tau_expr(&self) -> Option<&str> {
                if self.tau_inf {
                    self.expr_a.as_ref().map(|e| e.source())
                } else {
                    None
                }
            }

            /// The steady state expression source, present only in tau/inf form
            pub fn inf_expr(&self) -> Option<&str> {
                if self.tau_inf {
                    self.expr_b.as_ref().map(|e| e.source())
                } else {
                    None
                }
            }

            fn expressions(&self) -> Result<(&RateExpression, &RateExpression), GateError> {
                match (self.expr_a.as_ref(), self.expr_b.as_ref()) {
                    (Some(a), Some(b)) => Ok((a, b)),
                    _ => Err(GateError::ExpressionFailure(
                        ExpressionError::EmptyExpression,
                    )),
                }
            }
        }
    };
}

/// A gate over one input variable that evaluates its expressions per query
#[derive(Clone, Debug)]
pub struct FormulaGate {
    owner: ChannelId,
    self_id: GateId,
    // alpha or tau expression depending on form
    expr_a: Option<RateExpression>,
    // beta or inf expression depending on form
    expr_b: Option<RateExpression>,
    tau_inf: bool,
}

impl FormulaGate {
    /// Creates an unconfigured gate owned by the given channel
    pub fn new(owner: ChannelId, self_id: GateId) -> Self {
        FormulaGate {
            owner,
            self_id,
            expr_a: None,
            expr_b: None,
            tau_inf: false,
        }
    }
}

impl_formula_gate_accessors!(FormulaGate);

impl GateKinetics for FormulaGate {
    fn attach(owner: ChannelId, self_id: GateId) -> Self {
        FormulaGate::new(owner, self_id)
    }

    fn lookup_both(&self, v: f64) -> Result<(f64, f64), GateError> {
        let (expr_a, expr_b) = self.expressions()?;
        let a = expr_a.evaluate(v)?;
        let b = expr_b.evaluate(v)?;

        if self.tau_inf {
            // a is tau, b is the steady state
            Ok((b / a, 1.0 / a))
        } else {
            Ok((a, a + b))
        }
    }

    fn is_original(&self, channel: ChannelId) -> bool {
        channel == self.owner
    }
}

/// A gate over voltage and concentration that evaluates its expressions per
/// query. Expressions use `v` for the first input and `c` for the second,
/// the channel decides which external inputs bind to them.
#[derive(Clone, Debug)]
pub struct FormulaGate2D {
    owner: ChannelId,
    self_id: GateId,
    // alpha or tau expression depending on form
    expr_a: Option<RateExpression>,
    // beta or inf expression depending on form
    expr_b: Option<RateExpression>,
    tau_inf: bool,
}

impl FormulaGate2D {
    /// Creates an unconfigured gate owned by the given channel
    pub fn new(owner: ChannelId, self_id: GateId) -> Self {
        FormulaGate2D {
            owner,
            self_id,
            expr_a: None,
            expr_b: None,
            tau_inf: false,
        }
    }

    /// Returns the `(A, B)` pair at the given input pair
    pub fn lookup_both(&self, v: f64, c: f64) -> Result<(f64, f64), GateError> {
        let (expr_a, expr_b) = self.expressions()?;
        let a = expr_a.evaluate_with_conc(v, c)?;
        let b = expr_b.evaluate_with_conc(v, c)?;

        if self.tau_inf {
            // a is tau, b is the steady state
            Ok((b / a, 1.0 / a))
        } else {
            Ok((a, a + b))
        }
    }

    /// Whether the given channel is the gate's original owner
    pub fn is_original(&self, channel: ChannelId) -> bool {
        channel == self.owner
    }

    /// Creates a gate owned by the given channel
    pub fn attach(owner: ChannelId, self_id: GateId) -> Self {
        FormulaGate2D::new(owner, self_id)
    }
}

impl_formula_gate_accessors!(FormulaGate2D);
