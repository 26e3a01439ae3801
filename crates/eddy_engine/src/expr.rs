//! Scalar expressions used by filters, binds, choose outputs and actions.
//!
//! Evaluation never fails loudly: a type mismatch, a division by zero or an
//! unbound variable yields `None` and the caller drops the environment.

use std::collections::BTreeSet;
use std::fmt;

use eddy_foundation::{EntityId, Value};
use eddy_store::Bindings;

// =============================================================================
// Operators and Functions
// =============================================================================

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `==` (numbers compare across int and float)
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl BinaryOp {
    /// Returns the operator symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Built-in functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Function {
    /// `uppercase(text)`
    Uppercase,
    /// `lowercase(text)`
    Lowercase,
    /// `char_at(text, index)`: the character at a 0-based index, as a string.
    CharAt,
    /// `concat(a, b, ...)`: display forms joined together.
    Concat,
    /// `length(text)`: number of characters.
    Length,
}

impl Function {
    /// Returns the function name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Uppercase => "uppercase",
            Self::Lowercase => "lowercase",
            Self::CharAt => "char_at",
            Self::Concat => "concat",
            Self::Length => "length",
        }
    }

    /// Returns the fixed arity, or `None` for variadic functions.
    #[must_use]
    pub const fn arity(self) -> Option<usize> {
        match self {
            Self::Uppercase | Self::Lowercase | Self::Length => Some(1),
            Self::CharAt => Some(2),
            Self::Concat => None,
        }
    }

    fn apply(self, args: &[Value]) -> Option<Value> {
        match (self, args) {
            (Self::Uppercase, [v]) => Some(Value::from(v.as_str()?.to_uppercase())),
            (Self::Lowercase, [v]) => Some(Value::from(v.as_str()?.to_lowercase())),
            (Self::Length, [v]) => {
                let count = v.as_str()?.chars().count();
                Some(Value::Int(i64::try_from(count).ok()?))
            }
            (Self::CharAt, [text, index]) => {
                let index = usize::try_from(index.as_int()?).ok()?;
                let c = text.as_str()?.chars().nth(index)?;
                Some(Value::from(c.to_string()))
            }
            (Self::Concat, args) => Some(Value::from(
                args.iter().map(ToString::to_string).collect::<String>(),
            )),
            _ => None,
        }
    }
}

// =============================================================================
// Expressions
// =============================================================================

/// A scalar expression over a binding environment.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// A literal value.
    Const(Value),
    /// A variable reference (stored without `?`).
    Var(String),
    /// A binary operation.
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// A built-in function call.
    Call(Function, Vec<Expr>),
}

impl Expr {
    /// Creates a variable reference; a leading `?` is stripped.
    #[must_use]
    pub fn var(name: &str) -> Self {
        Self::Var(name.strip_prefix('?').unwrap_or(name).to_string())
    }

    /// Creates a literal.
    #[must_use]
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Const(value.into())
    }

    /// Creates a function call.
    #[must_use]
    pub fn call(function: Function, args: Vec<Expr>) -> Self {
        Self::Call(function, args)
    }

    fn binary(self, op: BinaryOp, rhs: impl Into<Expr>) -> Self {
        Self::Binary(op, Box::new(self), Box::new(rhs.into()))
    }

    /// `self + rhs`
    #[must_use]
    pub fn plus(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Add, rhs)
    }

    /// `self - rhs`
    #[must_use]
    pub fn minus(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Sub, rhs)
    }

    /// `self * rhs`
    #[must_use]
    pub fn times(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Mul, rhs)
    }

    /// `self / rhs`
    #[must_use]
    pub fn divided_by(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Div, rhs)
    }

    /// `self == rhs`
    #[must_use]
    pub fn equals(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, rhs)
    }

    /// `self != rhs`
    #[must_use]
    pub fn not_equals(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, rhs)
    }

    /// `self < rhs`
    #[must_use]
    pub fn less_than(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, rhs)
    }

    /// `self <= rhs`
    #[must_use]
    pub fn at_most(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Le, rhs)
    }

    /// `self > rhs`
    #[must_use]
    pub fn greater_than(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, rhs)
    }

    /// `self >= rhs`
    #[must_use]
    pub fn at_least(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ge, rhs)
    }

    /// Evaluates the expression. `None` means the environment should be dropped.
    #[must_use]
    pub fn eval(&self, bindings: &Bindings) -> Option<Value> {
        match self {
            Self::Const(value) => Some(value.clone()),
            Self::Var(name) => bindings.get(name).cloned(),
            Self::Binary(op, lhs, rhs) => {
                let lhs = lhs.eval(bindings)?;
                let rhs = rhs.eval(bindings)?;
                eval_binary(*op, &lhs, &rhs)
            }
            Self::Call(function, args) => {
                let args = args
                    .iter()
                    .map(|arg| arg.eval(bindings))
                    .collect::<Option<Vec<_>>>()?;
                function.apply(&args)
            }
        }
    }

    /// Collects every variable the expression reads.
    pub fn collect_variables<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Self::Const(_) => {}
            Self::Var(name) => {
                out.insert(name);
            }
            Self::Binary(_, lhs, rhs) => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
            Self::Call(_, args) => {
                for arg in args {
                    arg.collect_variables(out);
                }
            }
        }
    }

    /// Returns every variable the expression reads.
    #[must_use]
    pub fn variables(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_variables(&mut out);
        out
    }

    /// Finds the first call whose argument count does not fit its function.
    #[must_use]
    pub fn arity_error(&self) -> Option<String> {
        match self {
            Self::Const(_) | Self::Var(_) => None,
            Self::Binary(_, lhs, rhs) => lhs.arity_error().or_else(|| rhs.arity_error()),
            Self::Call(function, args) => match function.arity() {
                Some(n) if n != args.len() => Some(format!(
                    "{} expects {n} argument(s), got {}",
                    function.name(),
                    args.len()
                )),
                _ => args.iter().find_map(Expr::arity_error),
            },
        }
    }
}

fn eval_binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Option<Value> {
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            arithmetic(op, lhs, rhs)
        }
        BinaryOp::Eq => Some(Value::Bool(lhs.loosely_equals(rhs))),
        BinaryOp::Ne => Some(Value::Bool(!lhs.loosely_equals(rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            // Ordering across unrelated types is a type mismatch
            let comparable = (lhs.is_number() && rhs.is_number())
                || std::mem::discriminant(lhs) == std::mem::discriminant(rhs);
            if !comparable {
                return None;
            }
            let ord = lhs.cmp(rhs);
            Some(Value::Bool(match op {
                BinaryOp::Lt => ord.is_lt(),
                BinaryOp::Le => ord.is_le(),
                BinaryOp::Gt => ord.is_gt(),
                _ => ord.is_ge(),
            }))
        }
    }
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> Option<Value> {
    if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
        return match op {
            BinaryOp::Add => a.checked_add(*b).map(Value::Int),
            BinaryOp::Sub => a.checked_sub(*b).map(Value::Int),
            BinaryOp::Mul => a.checked_mul(*b).map(Value::Int),
            BinaryOp::Div if *b == 0 => None,
            BinaryOp::Div if a.checked_rem(*b) == Some(0) => a.checked_div(*b).map(Value::Int),
            #[allow(clippy::cast_precision_loss)]
            BinaryOp::Div => Some(Value::Float(*a as f64 / *b as f64)),
            _ => None,
        };
    }
    let a = lhs.as_number()?;
    let b = rhs.as_number()?;
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div if b == 0.0 => return None,
        BinaryOp::Div => a / b,
        _ => return None,
    };
    Some(Value::Float(result))
}

// =============================================================================
// Conversions and Display
// =============================================================================

/// `"?x"` is a variable, anything else a string literal.
impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        if s.starts_with('?') {
            Self::var(s)
        } else {
            Self::Const(Value::from(s))
        }
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Self::Const(value)
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Self::Const(Value::Int(i64::from(n)))
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Self::Const(Value::Int(n))
    }
}

impl From<f64> for Expr {
    fn from(n: f64) -> Self {
        Self::Const(Value::Float(n))
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Self::Const(Value::Bool(b))
    }
}

impl From<EntityId> for Expr {
    fn from(id: EntityId) -> Self {
        Self::Const(Value::Entity(id))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(value) => write!(f, "{value:?}"),
            Self::Var(name) => write!(f, "?{name}"),
            Self::Binary(op, lhs, rhs) => write!(f, "({lhs} {} {rhs})", op.symbol()),
            Self::Call(function, args) => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}
