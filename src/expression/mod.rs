//! Compiled rate law expressions for formula backed gates.
//!
//! An expression is compiled once and evaluated against a fresh copy of its
//! symbol bindings on every call, so a gate shared between channels can be
//! queried through `&self`. The input variable is `v` (membrane voltage) with
//! an optional second input `c` (concentration), and the helpers `alpha`,
//! `beta`, `tau` and `inf` are writable inside the expression so conditional
//! rate laws can stage intermediate values:
//!
//! ```rust
//! use channel_gating::expression::RateExpression;
//!
//! let clipped = RateExpression::compile(
//!     "alpha = 0.3 * exp(-80.0 * (v - -46e-3)) + 3.5; alpha < 3.8 ? 3.8 : alpha"
//! ).unwrap();
//! assert!(clipped.evaluate(-0.046).unwrap() >= 3.8);
//! ```

use std::sync::Arc;
use evalexpr::{
    build_operator_tree, ContextWithMutableFunctions, ContextWithMutableVariables,
    Function, HashMapContext, Node, Value,
};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng, rngs::StdRng};
use crate::error::ExpressionError;


/// Rewrites C style ternaries `cond ? a : b` into the evaluator's
/// `if(cond, a, b)` builtin, `:=` assignments into `=`, and scientific
/// notation literals into plain decimals, so rate laws written in the
/// conditional style of GENESIS era channel definitions keep working
pub fn reformat(expression: &str) -> String {
    let normalized = normalize_scientific(&expression.replace(":=", "="));
    let statements: Vec<String> = split_statements(&normalized)
        .iter()
        .map(|statement| rewrite_statement(statement.trim()))
        .collect();

    statements.join("; ")
}

// the evaluator tokenises `1.5e-4` as a literal, an identifier and an
// operator, so exponent literals are expanded to plain decimals up front
fn normalize_scientific(expression: &str) -> String {
    let chars: Vec<char> = expression.chars().collect();
    let mut out = String::with_capacity(expression.len());
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];

        // skip identifiers whole so `v2` never reads as a literal
        if ch.is_ascii_alphabetic() || ch == '_' {
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                out.push(chars[i]);
                i += 1;
            }
            continue;
        }

        let starts_number = ch.is_ascii_digit()
            || (ch == '.' && i + 1 < chars.len() && chars[i + 1].is_ascii_digit());
        if !starts_number {
            out.push(ch);
            i += 1;
            continue;
        }

        let start = i;
        while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
            i += 1;
        }

        let mut end = i;
        if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
            let mut j = i + 1;
            if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                j += 1;
            }
            let exponent_digits = j;
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
            if j > exponent_digits {
                end = j;
            }
        }

        let literal: String = chars[start..end].iter().collect();
        if end > i {
            match literal.parse::<f64>() {
                // `{:?}` on f64 is exponent free, keeps the decimal point,
                // and round trips exactly
                Ok(value) => out.push_str(&format!("{:?}", value)),
                Err(_) => out.push_str(&literal),
            }
        } else {
            out.push_str(&literal);
        }
        i = end;
    }

    out
}

// splits on `;` outside any parentheses
fn split_statements(expression: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();

    for ch in expression.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ';' if depth == 0 => {
                statements.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    statements.push(current);

    statements
}

// a single assignment target binds looser than the ternary, so
// `alpha = v > 0.0 ? 1.0 : 2.0` rewrites only the right hand side
fn rewrite_statement(statement: &str) -> String {
    let chars: Vec<char> = statement.chars().collect();
    let mut depth = 0usize;

    for (i, ch) in chars.iter().enumerate() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '=' if depth == 0 => {
                let prev = if i > 0 { chars[i - 1] } else { ' ' };
                let next = if i + 1 < chars.len() { chars[i + 1] } else { ' ' };
                if !"=<>!".contains(prev) && next != '=' {
                    let lhs: String = chars[..i].iter().collect();
                    let rhs: String = chars[i + 1..].iter().collect();
                    return format!("{}= {}", lhs, rewrite_ternaries(rhs.trim()));
                }
            }
            _ => {}
        }
    }

    rewrite_ternaries(statement)
}

fn rewrite_ternaries(expression: &str) -> String {
    let chars: Vec<char> = expression.chars().collect();

    // find the first `?` outside any parentheses
    let mut depth = 0usize;
    let mut question = None;
    for (i, ch) in chars.iter().enumerate() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '?' if depth == 0 => {
                question = Some(i);
                break;
            }
            _ => {}
        }
    }

    let question = match question {
        Some(index) => index,
        None => return rewrite_groups(&chars),
    };

    // find the matching `:`, skipping over nested ternaries
    let mut depth = 0usize;
    let mut nested = 0usize;
    let mut colon = None;
    for (i, ch) in chars.iter().enumerate().skip(question + 1) {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '?' if depth == 0 => nested += 1,
            ':' if depth == 0 => {
                if nested == 0 {
                    colon = Some(i);
                    break;
                }
                nested -= 1;
            }
            _ => {}
        }
    }

    match colon {
        Some(colon) => {
            let condition: String = chars[..question].iter().collect();
            let if_true: String = chars[question + 1..colon].iter().collect();
            let if_false: String = chars[colon + 1..].iter().collect();

            format!(
                "if({}, {}, {})",
                rewrite_ternaries(condition.trim()),
                rewrite_ternaries(if_true.trim()),
                rewrite_ternaries(if_false.trim()),
            )
        }
        // unmatched `?`, leave for the parser to report
        None => expression.to_string(),
    }
}

// no top level ternary, recurse into balanced parenthesised groups
fn rewrite_groups(chars: &[char]) -> String {
    let mut out = String::with_capacity(chars.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '(' {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        let mut depth = 1usize;
        let mut j = i + 1;
        let mut closed = false;
        while j < chars.len() {
            match chars[j] {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        closed = true;
                        j += 1;
                        break;
                    }
                }
                _ => {}
            }
            j += 1;
        }

        if closed {
            let inner: String = chars[i + 1..j - 1].iter().collect();
            out.push('(');
            out.push_str(&rewrite_ternaries(&inner));
            out.push(')');
            i = j;
        } else {
            // unbalanced, copy verbatim and let the parser report it
            out.extend(&chars[i..]);
            i = chars.len();
        }
    }

    out
}

// cheap prescan so compile failures can carry a byte position
fn scan_for_position(expression: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (i, ch) in expression.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Some(i);
                }
            }
            c if c.is_ascii_alphanumeric() => {}
            c if "+-*/%^<>=!&|,;:?. \t\r\n".contains(c) => {}
            _ => return Some(i),
        }
    }

    if depth != 0 {
        Some(expression.len())
    } else {
        None
    }
}

fn unary_function(function: fn(f64) -> f64) -> Function {
    Function::new(move |argument| {
        let x = argument.as_number()?;
        Ok(Value::Float(function(x)))
    })
}

/// Arithmetic expression over a fixed symbol table, compiled once and
/// evaluated without reparsing
pub struct RateExpression {
    source: String,
    compiled: Node,
    prototype: HashMapContext,
}

impl Clone for RateExpression {
    fn clone(&self) -> Self {
        RateExpression {
            source: self.source.clone(),
            compiled: self.compiled.clone(),
            prototype: self.prototype.clone(),
        }
    }
}

impl PartialEq for RateExpression {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for RateExpression {}

impl std::fmt::Debug for RateExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "RateExpression({})", self.source)
    }
}

impl RateExpression {
    /// Compiles an expression string, recognising the input variables `v` and `c`,
    /// the writable helpers `alpha`, `beta`, `tau` and `inf`, the constants `pi`
    /// and `e`, and the builtins `exp`, `ln`, `log10`, `sqrt`, `abs`, `fmod`,
    /// `rand`/`rnd`, `srand`, `rand2` and `srand2`
    pub fn compile(expression: &str) -> Result<Self, ExpressionError> {
        if expression.trim().is_empty() {
            return Err(ExpressionError::EmptyExpression);
        }

        let reformatted = reformat(expression);
        let compiled = build_operator_tree(&reformatted).map_err(|err| {
            ExpressionError::Malformed {
                expression: expression.to_string(),
                position: scan_for_position(&reformatted),
                detail: err.to_string(),
            }
        })?;

        let prototype = Self::build_context().map_err(|err| ExpressionError::Malformed {
            expression: expression.to_string(),
            position: None,
            detail: err,
        })?;

        Ok(RateExpression {
            source: expression.to_string(),
            compiled,
            prototype,
        })
    }

    fn build_context() -> Result<HashMapContext, String> {
        let mut context = HashMapContext::new();

        for name in ["v", "c", "alpha", "beta", "tau", "inf"] {
            context
                .set_value(name.to_string(), Value::Float(0.0))
                .map_err(|err| err.to_string())?;
        }
        context
            .set_value("pi".to_string(), Value::Float(std::f64::consts::PI))
            .map_err(|err| err.to_string())?;
        context
            .set_value("e".to_string(), Value::Float(std::f64::consts::E))
            .map_err(|err| err.to_string())?;

        let unary: [(&str, fn(f64) -> f64); 5] = [
            ("exp", f64::exp),
            ("ln", f64::ln),
            ("log10", f64::log10),
            ("sqrt", f64::sqrt),
            ("abs", f64::abs),
        ];
        for (name, function) in unary {
            context
                .set_function(name.to_string(), unary_function(function))
                .map_err(|err| err.to_string())?;
        }

        context
            .set_function(
                "fmod".to_string(),
                Function::new(|argument| {
                    let arguments = argument.as_fixed_len_tuple(2)?;
                    Ok(Value::Float(
                        arguments[0].as_number()? % arguments[1].as_number()?,
                    ))
                }),
            )
            .map_err(|err| err.to_string())?;

        let rng = Arc::new(Mutex::new(StdRng::from_entropy()));

        let rand_rng = rng.clone();
        let rand_function = Function::new(move |_| {
            Ok(Value::Float(rand_rng.lock().gen::<f64>()))
        });
        context
            .set_function("rand".to_string(), rand_function.clone())
            .map_err(|err| err.to_string())?;
        context
            .set_function("rnd".to_string(), rand_function)
            .map_err(|err| err.to_string())?;

        let srand_rng = rng.clone();
        context
            .set_function(
                "srand".to_string(),
                Function::new(move |argument| {
                    let seed = argument.as_number()?;
                    let mut rng = srand_rng.lock();
                    if seed >= 0.0 {
                        *rng = StdRng::seed_from_u64(seed as u64);
                    }
                    Ok(Value::Float(rng.gen::<f64>()))
                }),
            )
            .map_err(|err| err.to_string())?;

        let rand2_rng = rng.clone();
        context
            .set_function(
                "rand2".to_string(),
                Function::new(move |argument| {
                    let arguments = argument.as_fixed_len_tuple(2)?;
                    let low = arguments[0].as_number()?;
                    let high = arguments[1].as_number()?;
                    let value = if low < high {
                        rand2_rng.lock().gen_range(low..high)
                    } else {
                        low
                    };
                    Ok(Value::Float(value))
                }),
            )
            .map_err(|err| err.to_string())?;

        let srand2_rng = rng;
        context
            .set_function(
                "srand2".to_string(),
                Function::new(move |argument| {
                    let arguments = argument.as_fixed_len_tuple(3)?;
                    let low = arguments[0].as_number()?;
                    let high = arguments[1].as_number()?;
                    let seed = arguments[2].as_number()?;
                    let mut rng = srand2_rng.lock();
                    if seed >= 0.0 {
                        *rng = StdRng::seed_from_u64(seed as u64);
                    }
                    let value = if low < high {
                        rng.gen_range(low..high)
                    } else {
                        low
                    };
                    Ok(Value::Float(value))
                }),
            )
            .map_err(|err| err.to_string())?;

        Ok(context)
    }

    /// Returns the expression source as written by the caller
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the expression with the given voltage bound to `v`
    pub fn evaluate(&self, v: f64) -> Result<f64, ExpressionError> {
        self.evaluate_with_conc(v, 0.0)
    }

    /// Evaluates the expression with voltage bound to `v` and concentration to `c`
    pub fn evaluate_with_conc(&self, v: f64, c: f64) -> Result<f64, ExpressionError> {
        let mut context = self.prototype.clone();
        context
            .set_value("v".to_string(), Value::Float(v))
            .map_err(|err| self.eval_error(err))?;
        context
            .set_value("c".to_string(), Value::Float(c))
            .map_err(|err| self.eval_error(err))?;

        let value = self
            .compiled
            .eval_with_context_mut(&mut context)
            .map_err(|err| self.eval_error(err))?;

        value.as_number().map_err(|err| self.eval_error(err))
    }

    fn eval_error(&self, err: evalexpr::EvalexprError) -> ExpressionError {
        ExpressionError::Eval {
            expression: self.source.clone(),
            detail: err.to_string(),
        }
    }
}
