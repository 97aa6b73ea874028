//! Voltage dependent gates for Hodgkin-Huxley type channels.
//!
//! A gate owns a pair of tables `A` and `B` where by convention `A` holds the
//! forward rate alpha and `B` holds `alpha + beta` (or the equivalent
//! transform of a tau and steady state pair). The channel queries both values
//! on every step and advances its state variable with them. Tables can be
//! assigned directly, derived from the canonical sigmoid form
//! `y(x) = (P0 + P1*x) / (P2 + exp((x + P3) / P4))`, or filled by evaluating
//! rate expressions over the input grid.
//!
//! A gate belongs to exactly one owning channel. Copied channels observe the
//! owner's tables through a shared handle, and every mutating operation takes
//! the calling channel's id so edits routed through a copy are refused.

use std::sync::atomic::{AtomicU64, Ordering};
use log::warn;
use crate::error::{ExpressionError, GateError};
use crate::expression::RateExpression;

pub mod formula;

/// Table entries with a magnitude under this threshold are treated as
/// numerical singularities and healed
pub const SINGULARITY: f64 = 1e-6;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a channel, used to tell the owning channel of a gate
/// apart from channels that alias it through a copy
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Returns a process wide unique channel id
    pub fn generate() -> Self {
        ChannelId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identifier of a gate instance
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct GateId(u64);

impl GateId {
    /// Returns a process wide unique gate id
    pub fn generate() -> Self {
        GateId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Parameter supply of a gate
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GateForm {
    /// Tables assigned directly or derived from the canonical parametric form
    Table,
    /// Tables filled from alpha and beta rate expressions
    AlphaBeta,
    /// Tables filled from tau and steady state expressions
    TauInf,
}

impl GateForm {
    /// Converts form to string
    pub fn to_str(&self) -> &str {
        match self {
            GateForm::Table => "table",
            GateForm::AlphaBeta => "alpha/beta",
            GateForm::TauInf => "tau/inf",
        }
    }

    /// Numeric code of the form, 0 for tables, 1 for alpha/beta, 2 for tau/inf
    pub fn code(&self) -> u8 {
        match self {
            GateForm::Table => 0,
            GateForm::AlphaBeta => 1,
            GateForm::TauInf => 2,
        }
    }
}

/// Rate source a channel can query on every step
pub trait GateKinetics: Send + Sync {
    /// Creates a gate owned by the given channel
    fn attach(owner: ChannelId, self_id: GateId) -> Self where Self: Sized;

    /// Returns the `(A, B)` pair at the given input
    fn lookup_both(&self, v: f64) -> Result<(f64, f64), GateError>;

    /// Whether the given channel is the gate's original owner
    fn is_original(&self, channel: ChannelId) -> bool;

    /// Brings derived state up to date before a run, filling stale tables
    fn prepare(&mut self) -> Result<(), GateError> {
        Ok(())
    }
}

/// Samples the canonical form `(P0 + P1*x) / (P2 + exp((x + P3) / P4))`,
/// averaging two flanking samples at `x +/- dx/10` when the denominator
/// lands on a removable singularity
fn canonical_sample(coeffs: &[f64; 5], x: f64, dx: f64) -> f64 {
    if coeffs[4].abs() < SINGULARITY {
        return 0.0;
    }

    let denominator = coeffs[2] + ((x + coeffs[3]) / coeffs[4]).exp();
    if denominator.abs() >= SINGULARITY {
        return (coeffs[0] + coeffs[1] * x) / denominator;
    }

    let mut healed = 0.0;
    for flank in [x + dx / 10.0, x - dx / 10.0] {
        let denominator = coeffs[2] + ((flank + coeffs[3]) / coeffs[4]).exp();
        healed += (coeffs[0] + coeffs[1] * flank) / denominator;
    }

    healed / 2.0
}

/// Sweeps a filled table for NaN, infinite, or near zero entries and patches
/// each run of them by linear interpolation between the nearest valid
/// neighbours, extrapolating at the table ends
pub fn fix_singularities(table: &mut [f64]) {
    let bad = |x: f64| !x.is_finite() || x.abs() < SINGULARITY;
    let size = table.len();

    let mut ii = 0;
    while ii < size {
        if !bad(table[ii]) {
            ii += 1;
            continue;
        }

        let run_start = ii;
        let mut run_end = ii;
        while run_end < size && bad(table[run_end]) {
            run_end += 1;
        }

        let prev = run_start.checked_sub(1);
        let next = if run_end < size { Some(run_end) } else { None };

        match (prev, next) {
            (Some(prev), Some(next)) => {
                let dy = (table[next] - table[prev]) / (next - prev) as f64;
                for jj in run_start..run_end {
                    table[jj] = table[jj - 1] + dy;
                }
            }
            (Some(prev), None) => {
                let dy = if prev >= 1 { table[prev] - table[prev - 1] } else { 0.0 };
                for jj in run_start..size {
                    table[jj] = table[jj - 1] + dy;
                }
            }
            (None, Some(next)) => {
                let dy = if next + 1 < size && !bad(table[next + 1]) {
                    table[next + 1] - table[next]
                } else {
                    0.0
                };
                for jj in (0..run_end).rev() {
                    table[jj] = table[jj + 1] - dy;
                }
            }
            (None, None) => {
                warn!("fix_singularities: no valid entries in table, zeroing");
                for entry in table.iter_mut() {
                    *entry = 0.0;
                }
            }
        }

        ii = run_end;
    }
}

/// A single Hodgkin-Huxley gate over one input variable, equivalent to the
/// m and h terms on the squid Na channel and the n term on K.
///
/// Lookups run against precomputed tables with direct indexing or linear
/// interpolation over a fixed input grid given by `min`, `max` and `divs`.
/// Inputs outside the grid clamp to the end entries.
pub struct TabulatedGate {
    owner: ChannelId,
    self_id: GateId,
    min: f64,
    max: f64,
    inv_dx: f64,
    table_a: Vec<f64>,
    table_b: Vec<f64>,
    use_interpolation: bool,
    form: GateForm,
    // tables were assigned directly rather than derived
    direct_table: bool,
    alpha_coeffs: Option<[f64; 5]>,
    beta_coeffs: Option<[f64; 5]>,
    parametric_tau_inf: bool,
    // alpha or tau expression depending on form
    expr_a: Option<RateExpression>,
    // beta or inf expression depending on form
    expr_b: Option<RateExpression>,
    tables_filled: bool,
}

impl Clone for TabulatedGate {
    fn clone(&self) -> Self {
        TabulatedGate {
            owner: self.owner,
            self_id: self.self_id,
            min: self.min,
            max: self.max,
            inv_dx: self.inv_dx,
            table_a: self.table_a.clone(),
            table_b: self.table_b.clone(),
            use_interpolation: self.use_interpolation,
            form: self.form,
            direct_table: self.direct_table,
            alpha_coeffs: self.alpha_coeffs,
            beta_coeffs: self.beta_coeffs,
            parametric_tau_inf: self.parametric_tau_inf,
            expr_a: self.expr_a.clone(),
            expr_b: self.expr_b.clone(),
            tables_filled: self.tables_filled,
        }
    }
}

impl TabulatedGate {
    /// Creates an unconfigured gate owned by the given channel
    pub fn new(owner: ChannelId, self_id: GateId) -> Self {
        TabulatedGate {
            owner,
            self_id,
            min: 0.0,
            max: 1.0,
            inv_dx: 1.0,
            table_a: vec![0.0],
            table_b: vec![0.0],
            use_interpolation: false,
            form: GateForm::Table,
            direct_table: false,
            alpha_coeffs: None,
            beta_coeffs: None,
            parametric_tau_inf: false,
            expr_a: None,
            expr_b: None,
            tables_filled: false,
        }
    }

    fn check_original(&self, caller: ChannelId, operation: &str) -> Result<(), GateError> {
        if caller == self.owner {
            Ok(())
        } else {
            warn!(
                "TabulatedGate: '{}' not allowed from a copied channel, ignoring",
                operation,
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

    /// Lower bound of the input grid
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Upper bound of the input grid
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Number of grid subdivisions, one less than the table size
    pub fn divs(&self) -> usize {
        self.table_a.len().saturating_sub(1)
    }

    /// Parameter supply currently in effect
    pub fn form(&self) -> GateForm {
        self.form
    }

    /// Table of A entries
    pub fn table_a(&self) -> &[f64] {
        &self.table_a
    }

    /// Table of `alpha + beta` entries
    pub fn table_b(&self) -> &[f64] {
        &self.table_b
    }

    /// Whether lookups interpolate linearly between adjacent entries
    pub fn use_interpolation(&self) -> bool {
        self.use_interpolation
    }

    /// Selects linear interpolation or direct indexing for lookups
    pub fn set_use_interpolation(
        &mut self,
        caller: ChannelId,
        value: bool,
    ) -> Result<(), GateError> {
        self.check_original(caller, "useInterpolation")?;
        self.use_interpolation = value;
        Ok(())
    }

    fn lookup_ready(&self) -> Result<(), GateError> {
        if self.form != GateForm::Table && !self.tables_filled {
            return Err(GateError::TablesNotFilled);
        }
        if self.divs() < 1 {
            return Err(GateError::OutOfConfigRange(String::from(
                "gate queried with divs < 1",
            )));
        }
        if self.table_a.len() != self.table_b.len() {
            return Err(GateError::ShapeMismatch {
                table_a: self.table_a.len(),
                table_b: self.table_b.len(),
            });
        }

        Ok(())
    }

    fn lookup_table(&self, table: &[f64], v: f64) -> f64 {
        if v <= self.min {
            return table[0];
        }
        if v >= self.max {
            return *table.last().unwrap_or(&0.0);
        }

        let divs = table.len() - 1;
        if self.use_interpolation {
            let index = (((v - self.min) * self.inv_dx) as usize).min(divs - 1);
            let frac = (v - self.min - index as f64 / self.inv_dx) * self.inv_dx;
            table[index] * (1.0 - frac) + table[index + 1] * frac
        } else {
            let index = (((v - self.min) * self.inv_dx) as usize).min(divs);
            table[index]
        }
    }

    /// Looks up the A entry at the given input
    pub fn lookup_a(&self, v: f64) -> Result<f64, GateError> {
        self.lookup_ready()?;
        Ok(self.lookup_table(&self.table_a, v))
    }

    /// Looks up the B entry at the given input
    pub fn lookup_b(&self, v: f64) -> Result<f64, GateError> {
        self.lookup_ready()?;
        Ok(self.lookup_table(&self.table_b, v))
    }

    /// Assigns the A table directly, switching the gate to table form
    pub fn set_table_a(&mut self, caller: ChannelId, table: Vec<f64>) -> Result<(), GateError> {
        self.check_original(caller, "tableA")?;
        if table.len() < 2 {
            return Err(GateError::OutOfConfigRange(String::from(
                "tableA needs at least 2 entries",
            )));
        }

        self.direct_table = true;
        self.table_a = table;
        self.inv_dx = self.divs() as f64 / (self.max - self.min);
        self.form = GateForm::Table;
        self.tables_filled = true;
        Ok(())
    }

    /// Assigns the B table directly, its size must match the A table
    pub fn set_table_b(&mut self, caller: ChannelId, table: Vec<f64>) -> Result<(), GateError> {
        self.check_original(caller, "tableB")?;
        if self.table_a.len() != table.len() {
            return Err(GateError::ShapeMismatch {
                table_a: self.table_a.len(),
                table_b: table.len(),
            });
        }

        self.direct_table = true;
        self.table_b = table;
        self.form = GateForm::Table;
        self.tables_filled = true;
        Ok(())
    }

    /// Changes the lower bound of the input grid. Direct tables are
    /// re-sampled into the new grid, derived tables are recomputed.
    pub fn set_min(&mut self, caller: ChannelId, value: f64) -> Result<(), GateError> {
        self.check_original(caller, "min")?;
        if value >= self.max {
            return Err(GateError::OutOfConfigRange(format!(
                "min {} must be below max {}", value, self.max,
            )));
        }

        let old_min = self.min;
        let old_max = self.max;
        self.min = value;
        self.regrid(self.divs(), old_min, old_max)
    }

    /// Changes the upper bound of the input grid. Direct tables are
    /// re-sampled into the new grid, derived tables are recomputed.
    pub fn set_max(&mut self, caller: ChannelId, value: f64) -> Result<(), GateError> {
        self.check_original(caller, "max")?;
        if value <= self.min {
            return Err(GateError::OutOfConfigRange(format!(
                "max {} must be above min {}", value, self.min,
            )));
        }

        let old_min = self.min;
        let old_max = self.max;
        self.max = value;
        self.regrid(self.divs(), old_min, old_max)
    }

    /// Changes the number of grid subdivisions. Direct tables are re-sampled
    /// into the new grid, derived tables are recomputed.
    pub fn set_divs(&mut self, caller: ChannelId, value: usize) -> Result<(), GateError> {
        self.check_original(caller, "divs")?;
        if value < 1 {
            return Err(GateError::OutOfConfigRange(String::from("divs must be >= 1")));
        }

        self.regrid(value, self.min, self.max)
    }

    // rebuild the tables after a grid change
    fn regrid(
        &mut self,
        new_divs: usize,
        old_min: f64,
        old_max: f64,
    ) -> Result<(), GateError> {
        if self.direct_table {
            if self.divs() >= 1 && new_divs >= 1 {
                self.resample_tables(new_divs, old_min, old_max);
            }
            self.inv_dx = new_divs.max(1) as f64 / (self.max - self.min);
            return Ok(());
        }

        self.inv_dx = new_divs as f64 / (self.max - self.min);
        if self.expr_a.is_some() && self.expr_b.is_some() && new_divs >= 1 {
            self.table_a = vec![0.0; new_divs + 1];
            self.table_b = vec![0.0; new_divs + 1];
            return self.fill_tables();
        }
        if let (Some(alpha), Some(beta)) = (self.alpha_coeffs, self.beta_coeffs) {
            if new_divs >= 1 {
                self.setup_tables(&alpha, &beta, new_divs, self.parametric_tau_inf);
                return Ok(());
            }
        }

        self.table_a.resize(new_divs + 1, 0.0);
        self.table_b.resize(new_divs + 1, 0.0);
        Ok(())
    }

    // linear re-sampling of both tables from the old grid onto the current
    // min/max with the given number of subdivisions
    fn resample_tables(&mut self, new_divs: usize, old_min: f64, old_max: f64) {
        let new_dx = (self.max - self.min) / new_divs as f64;
        let min = self.min;

        let resample = |table: &[f64]| -> Vec<f64> {
            let old_divs = table.len() - 1;
            if old_divs == 0 {
                return vec![table[0]; new_divs + 1];
            }
            let old_inv_dx = old_divs as f64 / (old_max - old_min);

            (0..=new_divs)
                .map(|i| {
                    let x = min + i as f64 * new_dx;
                    if x <= old_min {
                        table[0]
                    } else if x >= old_max {
                        table[old_divs]
                    } else {
                        let index = (((x - old_min) * old_inv_dx) as usize).min(old_divs - 1);
                        let frac = (x - old_min - index as f64 / old_inv_dx) * old_inv_dx;
                        table[index] * (1.0 - frac) + table[index + 1] * frac
                    }
                })
                .collect()
        };

        self.table_a = resample(&self.table_a);
        self.table_b = resample(&self.table_b);
    }

    /// Sets up both tables from 13 scalars
    /// `[A0..A4, B0..B4, divs, min, max]` where the first five describe the
    /// alpha curve and the next five the beta curve in the canonical form
    /// `y(x) = (P0 + P1*x) / (P2 + exp((x + P3) / P4))`. After sampling, the
    /// B table is rewritten to `alpha + beta`.
    pub fn setup_alpha(&mut self, caller: ChannelId, parms: &[f64]) -> Result<(), GateError> {
        self.check_original(caller, "setupAlpha")?;
        self.setup_parametric(parms, false)
    }

    /// As [`TabulatedGate::setup_alpha`] but the two curves are tau and the
    /// steady state, transformed into `A = inf/tau`, `B = 1/tau` after
    /// sampling. Entries where tau is within the singularity threshold of
    /// zero carry the previous entry forward.
    pub fn setup_tau(&mut self, caller: ChannelId, parms: &[f64]) -> Result<(), GateError> {
        self.check_original(caller, "setupTau")?;
        self.setup_parametric(parms, true)
    }

    fn setup_parametric(&mut self, parms: &[f64], tau_inf: bool) -> Result<(), GateError> {
        if parms.len() != 13 {
            return Err(GateError::OutOfConfigRange(format!(
                "parametric setup needs 13 values, got {}", parms.len(),
            )));
        }

        let divs = parms[10];
        let min = parms[11];
        let max = parms[12];
        if divs < 1.0 {
            return Err(GateError::OutOfConfigRange(String::from("divs must be >= 1")));
        }
        if min >= max {
            return Err(GateError::OutOfConfigRange(format!(
                "min {} must be below max {}", min, max,
            )));
        }

        let mut alpha = [0.0; 5];
        let mut beta = [0.0; 5];
        alpha.copy_from_slice(&parms[0..5]);
        beta.copy_from_slice(&parms[5..10]);

        self.min = min;
        self.max = max;
        self.alpha_coeffs = Some(alpha);
        self.beta_coeffs = Some(beta);
        self.parametric_tau_inf = tau_inf;
        self.setup_tables(&alpha, &beta, divs as usize, tau_inf);
        self.form = GateForm::Table;
        self.direct_table = false;
        self.tables_filled = true;
        Ok(())
    }

    // sample both canonical curves over the grid and apply the
    // (A, B) convention transform
    fn setup_tables(&mut self, alpha: &[f64; 5], beta: &[f64; 5], divs: usize, tau_inf: bool) {
        self.inv_dx = divs as f64 / (self.max - self.min);
        let dx = (self.max - self.min) / divs as f64;

        self.table_a = vec![0.0; divs + 1];
        self.table_b = vec![0.0; divs + 1];
        for i in 0..=divs {
            let x = self.min + i as f64 * dx;
            self.table_a[i] = canonical_sample(alpha, x, dx);
            self.table_b[i] = canonical_sample(beta, x, dx);
        }

        if tau_inf {
            // tables hold tau and inf, transform to A = inf/tau, B = 1/tau
            let mut prev_a = 0.0;
            let mut prev_b = 0.0;
            for i in 0..=divs {
                let tau = self.table_a[i];
                let inf = self.table_b[i];
                if tau.abs() < SINGULARITY {
                    self.table_a[i] = prev_a;
                    self.table_b[i] = prev_b;
                } else {
                    self.table_a[i] = inf / tau;
                    self.table_b[i] = 1.0 / tau;
                }
                prev_a = self.table_a[i];
                prev_b = self.table_b[i];
            }
        } else {
            for i in 0..=divs {
                self.table_b[i] += self.table_a[i];
            }
        }
    }

    /// Returns the 13 scalars of the last parametric setup,
    /// `[A0..A4, B0..B4, divs, min, max]`
    pub fn alpha_parms(&self) -> Option<Vec<f64>> {
        let alpha = self.alpha_coeffs?;
        let beta = self.beta_coeffs?;

        let mut parms = Vec::with_capacity(13);
        parms.extend_from_slice(&alpha);
        parms.extend_from_slice(&beta);
        parms.push(self.divs() as f64);
        parms.push(self.min);
        parms.push(self.max);
        Some(parms)
    }

    /// Stores the alpha curve's five canonical coefficients, rebuilding the
    /// tables once the beta coefficients are present as well
    pub fn set_alpha_coefficients(
        &mut self,
        caller: ChannelId,
        coeffs: [f64; 5],
    ) -> Result<(), GateError> {
        self.check_original(caller, "alpha")?;
        self.alpha_coeffs = Some(coeffs);
        self.rebuild_from_coefficients();
        Ok(())
    }

    /// Stores the beta curve's five canonical coefficients, rebuilding the
    /// tables once the alpha coefficients are present as well
    pub fn set_beta_coefficients(
        &mut self,
        caller: ChannelId,
        coeffs: [f64; 5],
    ) -> Result<(), GateError> {
        self.check_original(caller, "beta")?;
        self.beta_coeffs = Some(coeffs);
        self.rebuild_from_coefficients();
        Ok(())
    }

    fn rebuild_from_coefficients(&mut self) {
        if let (Some(alpha), Some(beta)) = (self.alpha_coeffs, self.beta_coeffs) {
            let divs = self.divs();
            if divs >= 1 {
                self.parametric_tau_inf = false;
                self.setup_tables(&alpha, &beta, divs, false);
                self.form = GateForm::Table;
                self.direct_table = false;
                self.tables_filled = true;
            }
        }
    }

    /// Sets the alpha rate expression, switching the gate to alpha/beta form.
    /// Compile failures keep the previous expression.
    pub fn set_alpha_expr(&mut self, caller: ChannelId, expr: &str) -> Result<(), GateError> {
        self.check_original(caller, "alphaExpr")?;
        let compiled = RateExpression::compile(expr)?;
        self.expr_a = Some(compiled);
        self.form = GateForm::AlphaBeta;
        self.direct_table = false;
        self.tables_filled = false;
        Ok(())
    }

    /// Sets the beta rate expression, switching the gate to alpha/beta form
    pub fn set_beta_expr(&mut self, caller: ChannelId, expr: &str) -> Result<(), GateError> {
        self.check_original(caller, "betaExpr")?;
        let compiled = RateExpression::compile(expr)?;
        self.expr_b = Some(compiled);
        self.form = GateForm::AlphaBeta;
        self.direct_table = false;
        self.tables_filled = false;
        Ok(())
    }

    /// Sets the tau expression, switching the gate to tau/inf form
    pub fn set_tau_expr(&mut self, caller: ChannelId, expr: &str) -> Result<(), GateError> {
        self.check_original(caller, "tauExpr")?;
        let compiled = RateExpression::compile(expr)?;
        self.expr_a = Some(compiled);
        self.form = GateForm::TauInf;
        self.direct_table = false;
        self.tables_filled = false;
        Ok(())
    }

    /// Sets the steady state expression, switching the gate to tau/inf form
    pub fn set_inf_expr(&mut self, caller: ChannelId, expr: &str) -> Result<(), GateError> {
        self.check_original(caller, "infExpr")?;
        let compiled = RateExpression::compile(expr)?;
        self.expr_b = Some(compiled);
        self.form = GateForm::TauInf;
        self.direct_table = false;
        self.tables_filled = false;
        Ok(())
    }

    /// The alpha expression source, present only in alpha/beta form
    pub fn alpha_expr(&self) -> Option<&str> {
        match self.form {
            GateForm::AlphaBeta => self.expr_a.as_ref().map(|e| e.source()),
            _ => None,
        }
    }

    /// The beta expression source, present only in alpha/beta form
    pub fn beta_expr(&self) -> Option<&str> {
        match self.form {
            GateForm::AlphaBeta => self.expr_b.as_ref().map(|e| e.source()),
            _ => None,
        }
    }

    /// The tau expression source, present only in tau/inf form
    pub fn tau_expr(&self) -> Option<&str> {
        match self.form {
            GateForm::TauInf => self.expr_a.as_ref().map(|e| e.source()),
            _ => None,
        }
    }

    /// The steady state expression source, present only in tau/inf form
    pub fn inf_expr(&self) -> Option<&str> {
        match self.form {
            GateForm::TauInf => self.expr_b.as_ref().map(|e| e.source()),
            _ => None,
        }
    }

    /// Fills the tables by evaluating the rate expressions over the input
    /// grid, applying the `(A, B)` convention transform for the current form
    /// and sweeping out residual singular entries. The previous tables are
    /// kept if any evaluation fails.
    pub fn fill_tables(&mut self) -> Result<(), GateError> {
        if self.form == GateForm::Table {
            return Ok(());
        }

        let expr_a = self
            .expr_a
            .as_ref()
            .ok_or(GateError::ExpressionFailure(ExpressionError::EmptyExpression))?;
        let expr_b = self
            .expr_b
            .as_ref()
            .ok_or(GateError::ExpressionFailure(ExpressionError::EmptyExpression))?;

        let divs = self.divs();
        if divs < 1 {
            return Err(GateError::OutOfConfigRange(String::from(
                "table fill requires divs >= 1",
            )));
        }
        if self.min == 0.0 && self.max == 1.0 {
            warn!(
                "TabulatedGate::fill_tables: min and max have default values, \
                 did you forget to set them?",
            );
        }

        self.inv_dx = divs as f64 / (self.max - self.min);
        let dv = (self.max - self.min) / divs as f64;

        let mut table_a = vec![0.0; divs + 1];
        let mut table_b = vec![0.0; divs + 1];
        for i in 0..=divs {
            let v = self.min + i as f64 * dv;
            let a = expr_a.evaluate(v)?;
            let b = expr_b.evaluate(v)?;
            match self.form {
                GateForm::AlphaBeta => {
                    table_a[i] = a;
                    table_b[i] = a + b;
                }
                GateForm::TauInf => {
                    // a is tau, b is the steady state
                    table_a[i] = b / a;
                    table_b[i] = 1.0 / a;
                }
                GateForm::Table => unreachable!(),
            }
        }

        fix_singularities(&mut table_a);
        fix_singularities(&mut table_b);

        self.table_a = table_a;
        self.table_b = table_b;
        self.tables_filled = true;
        Ok(())
    }

    /// Compatibility stub. Older table conventions stored raw alpha and beta
    /// and converted in place, the tables already use the `alpha + beta`
    /// convention here.
    pub fn tweak_alpha(&mut self) {}

    /// Compatibility stub, see [`TabulatedGate::tweak_alpha`]
    pub fn tweak_tau(&mut self) {}
}

impl GateKinetics for TabulatedGate {
    fn attach(owner: ChannelId, self_id: GateId) -> Self {
        TabulatedGate::new(owner, self_id)
    }

    fn lookup_both(&self, v: f64) -> Result<(f64, f64), GateError> {
        self.lookup_ready()?;
        Ok((
            self.lookup_table(&self.table_a, v),
            self.lookup_table(&self.table_b, v),
        ))
    }

    fn is_original(&self, channel: ChannelId) -> bool {
        channel == self.owner
    }

    fn prepare(&mut self) -> Result<(), GateError> {
        if self.form != GateForm::Table && !self.tables_filled {
            self.fill_tables()?;
        }
        Ok(())
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fix_singularities_interior_run() {
        let mut table = vec![1.0, f64::NAN, f64::INFINITY, 4.0];
        fix_singularities(&mut table);

        assert_eq!(table, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_fix_singularities_at_ends() {
        let mut table = vec![f64::NAN, 2.0, 3.0, f64::NAN];
        fix_singularities(&mut table);

        assert_eq!(table, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_fix_singularities_near_zero_entry() {
        let mut table = vec![2.0, 1e-9, 6.0];
        fix_singularities(&mut table);

        assert_eq!(table, vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_canonical_sample_flanking_average() {
        // alpha_m style curve with a removable singularity at x = 25
        let coeffs = [2.5, -0.1, -1.0, -25.0, -10.0];
        let dx = 1.0;

        let healed = canonical_sample(&coeffs, 25.0, dx);
        let left = {
            let x = 25.0 - dx / 10.0;
            (coeffs[0] + coeffs[1] * x) / (coeffs[2] + ((x + coeffs[3]) / coeffs[4]).exp())
        };
        let right = {
            let x = 25.0 + dx / 10.0;
            (coeffs[0] + coeffs[1] * x) / (coeffs[2] + ((x + coeffs[3]) / coeffs[4]).exp())
        };

        assert!((healed - (left + right) / 2.0).abs() < 1e-12);
        // the limit of alpha_m at the pole is 1.0
        assert!((healed - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_canonical_sample_zero_scale() {
        // |P4| below the singularity threshold zeroes the curve
        let coeffs = [1.0, 1.0, 1.0, 0.0, 1e-9];
        assert_eq!(canonical_sample(&coeffs, 0.5, 0.1), 0.0);
    }
}
