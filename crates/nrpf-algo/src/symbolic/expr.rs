//! Expression trees over named symbols.
//!
//! The algebra is deliberately small: constants, symbols, n-ary sums and
//! products, and integer powers. Subtraction and division are expressed
//! with `-1` coefficients and `-1` exponents. That covers every device
//! Lagrangian the solver needs (bilinear current terms, rational power
//! injections, quadratic voltage constraints).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// A named scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(pub &'static str);

impl Symbol {
    pub fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(f64),
    Sym(Symbol),
    Add(Vec<Expr>),
    Mul(Vec<Expr>),
    Pow(Box<Expr>, i32),
}

impl Expr {
    pub fn sym(name: &'static str) -> Self {
        Expr::Sym(Symbol(name))
    }

    pub fn zero() -> Self {
        Expr::Const(0.0)
    }

    pub fn powi(self, n: i32) -> Self {
        Expr::Pow(Box::new(self), n)
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Const(c) if *c == 0.0)
    }

    /// Sum of many terms
    pub fn sum(terms: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Add(terms.into_iter().collect())
    }

    pub fn free_symbols(&self) -> BTreeSet<Symbol> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut BTreeSet<Symbol>) {
        match self {
            Expr::Const(_) => {}
            Expr::Sym(s) => {
                out.insert(*s);
            }
            Expr::Add(items) | Expr::Mul(items) => {
                for item in items {
                    item.collect_symbols(out);
                }
            }
            Expr::Pow(base, _) => base.collect_symbols(out),
        }
    }

    /// Evaluate with symbol values looked up in `env`; `None` if one is missing.
    pub fn eval(&self, env: &HashMap<Symbol, f64>) -> Option<f64> {
        Some(match self {
            Expr::Const(c) => *c,
            Expr::Sym(s) => *env.get(s)?,
            Expr::Add(items) => {
                let mut acc = 0.0;
                for item in items {
                    acc += item.eval(env)?;
                }
                acc
            }
            Expr::Mul(items) => {
                let mut acc = 1.0;
                for item in items {
                    acc *= item.eval(env)?;
                }
                acc
            }
            Expr::Pow(base, n) => base.eval(env)?.powi(*n),
        })
    }

    /// Partial derivative with respect to `x`, simplified.
    pub fn diff(&self, x: Symbol) -> Expr {
        self.diff_raw(x).simplify()
    }

    fn diff_raw(&self, x: Symbol) -> Expr {
        match self {
            Expr::Const(_) => Expr::zero(),
            Expr::Sym(s) => Expr::Const(if *s == x { 1.0 } else { 0.0 }),
            Expr::Add(items) => Expr::Add(items.iter().map(|t| t.diff_raw(x)).collect()),
            Expr::Mul(factors) => {
                // product rule
                let mut terms = Vec::with_capacity(factors.len());
                for (i, factor) in factors.iter().enumerate() {
                    if !factor.free_symbols().contains(&x) {
                        continue;
                    }
                    let mut product = Vec::with_capacity(factors.len());
                    product.push(factor.diff_raw(x));
                    product.extend(
                        factors
                            .iter()
                            .enumerate()
                            .filter(|(j, _)| *j != i)
                            .map(|(_, f)| f.clone()),
                    );
                    terms.push(Expr::Mul(product));
                }
                Expr::Add(terms)
            }
            Expr::Pow(base, n) => {
                if !base.free_symbols().contains(&x) {
                    return Expr::zero();
                }
                Expr::Mul(vec![
                    Expr::Const(*n as f64),
                    Expr::Pow(base.clone(), n - 1),
                    base.diff_raw(x),
                ])
            }
        }
    }

    /// Canonical form: flattened, constants folded, like terms and like
    /// factors merged, zero terms dropped, operands sorted.
    pub fn simplify(&self) -> Expr {
        match self {
            Expr::Const(_) | Expr::Sym(_) => self.clone(),
            Expr::Pow(base, n) => simplify_pow(base.simplify(), *n),
            Expr::Mul(factors) => simplify_mul(factors.iter().map(Expr::simplify).collect()),
            Expr::Add(terms) => simplify_add(terms.iter().map(Expr::simplify).collect()),
        }
    }

    /// Expand into a list of additive terms, distributing products over
    /// sums and positive powers of sums. Negative powers stay atomic.
    pub fn expand(&self) -> Vec<Expr> {
        let terms = expand_terms(self);
        match simplify_add(terms) {
            Expr::Add(items) => items,
            e if e.is_zero() => Vec::new(),
            e => vec![e],
        }
    }
}

fn expand_terms(expr: &Expr) -> Vec<Expr> {
    match expr {
        Expr::Const(_) | Expr::Sym(_) => vec![expr.clone()],
        Expr::Add(items) => items.iter().flat_map(expand_terms).collect(),
        Expr::Mul(factors) => {
            let mut acc = vec![Expr::Const(1.0)];
            for factor in factors {
                let expanded = expand_terms(factor);
                let mut next = Vec::with_capacity(acc.len() * expanded.len());
                for left in &acc {
                    for right in &expanded {
                        next.push(simplify_mul(vec![left.clone(), right.clone()]));
                    }
                }
                acc = next;
            }
            acc
        }
        Expr::Pow(base, n) if *n > 0 => {
            let inner = expand_terms(base);
            if inner.len() == 1 {
                vec![simplify_pow(inner[0].clone(), *n)]
            } else {
                let repeated = Expr::Mul(vec![Expr::Add(inner); *n as usize]);
                expand_terms(&repeated)
            }
        }
        Expr::Pow(base, n) => vec![simplify_pow(base.simplify(), *n)],
    }
}

fn key(expr: &Expr) -> String {
    expr.to_string()
}

fn simplify_pow(base: Expr, n: i32) -> Expr {
    match (base, n) {
        (_, 0) => Expr::Const(1.0),
        (b, 1) => b,
        (Expr::Const(c), n) => Expr::Const(c.powi(n)),
        (Expr::Pow(inner, m), n) => simplify_pow(*inner, m * n),
        (Expr::Mul(factors), n) => simplify_mul(
            factors
                .into_iter()
                .map(|f| simplify_pow(f, n))
                .collect(),
        ),
        (b, n) => Expr::Pow(Box::new(b), n),
    }
}

fn simplify_mul(factors: Vec<Expr>) -> Expr {
    let mut coeff = 1.0;
    // base key -> (base, exponent)
    let mut powers: BTreeMap<String, (Expr, i32)> = BTreeMap::new();
    let mut stack = factors;

    while let Some(factor) = stack.pop() {
        match factor {
            Expr::Const(c) => coeff *= c,
            Expr::Mul(inner) => stack.extend(inner),
            Expr::Pow(base, n) => {
                let entry = powers.entry(key(&base)).or_insert((*base, 0));
                entry.1 += n;
            }
            other => {
                let entry = powers.entry(key(&other)).or_insert((other, 0));
                entry.1 += 1;
            }
        }
    }

    if coeff == 0.0 {
        return Expr::zero();
    }

    let mut out: Vec<Expr> = Vec::with_capacity(powers.len() + 1);
    for (_, (base, n)) in powers {
        match n {
            0 => {}
            1 => out.push(base),
            n => out.push(Expr::Pow(Box::new(base), n)),
        }
    }

    match (coeff, out.len()) {
        (c, 0) => Expr::Const(c),
        (c, 1) if c == 1.0 => out.pop().unwrap_or(Expr::Const(1.0)),
        (c, _) if c == 1.0 => Expr::Mul(out),
        (c, _) => {
            out.insert(0, Expr::Const(c));
            Expr::Mul(out)
        }
    }
}

/// Split a simplified product into its numeric coefficient and the rest.
fn split_coefficient(term: Expr) -> (f64, Expr) {
    match term {
        Expr::Const(c) => (c, Expr::Const(1.0)),
        Expr::Mul(mut factors) => match factors.first() {
            Some(Expr::Const(c)) => {
                let c = *c;
                factors.remove(0);
                let rest = if factors.len() == 1 {
                    factors.pop().unwrap_or(Expr::Const(1.0))
                } else {
                    Expr::Mul(factors)
                };
                (c, rest)
            }
            _ => (1.0, Expr::Mul(factors)),
        },
        other => (1.0, other),
    }
}

fn simplify_add(terms: Vec<Expr>) -> Expr {
    let mut constant = 0.0;
    let mut monomials: BTreeMap<String, (f64, Expr)> = BTreeMap::new();
    let mut stack = terms;

    while let Some(term) = stack.pop() {
        match term {
            Expr::Const(c) => constant += c,
            Expr::Add(inner) => stack.extend(inner),
            other => {
                let (c, mono) = split_coefficient(other);
                let entry = monomials.entry(key(&mono)).or_insert((0.0, mono));
                entry.0 += c;
            }
        }
    }

    let mut out: Vec<Expr> = monomials
        .into_values()
        .filter(|(c, _)| *c != 0.0)
        .map(|(c, mono)| simplify_mul(vec![Expr::Const(c), mono]))
        .collect();
    if constant != 0.0 {
        out.push(Expr::Const(constant));
    }

    match out.len() {
        0 => Expr::zero(),
        1 => out.pop().unwrap_or_else(Expr::zero),
        _ => Expr::Add(out),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(c) => write!(f, "{:?}", c),
            Expr::Sym(s) => write!(f, "{}", s),
            Expr::Add(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " + ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Expr::Mul(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, "*")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Expr::Pow(base, n) => write!(f, "[{}]^{}", base, n),
        }
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Const(value)
    }
}

impl From<Symbol> for Expr {
    fn from(value: Symbol) -> Self {
        Expr::Sym(value)
    }
}

impl<T: Into<Expr>> Add<T> for Expr {
    type Output = Expr;
    fn add(self, rhs: T) -> Expr {
        Expr::Add(vec![self, rhs.into()])
    }
}

impl<T: Into<Expr>> Sub<T> for Expr {
    type Output = Expr;
    fn sub(self, rhs: T) -> Expr {
        Expr::Add(vec![self, -rhs.into()])
    }
}

impl<T: Into<Expr>> Mul<T> for Expr {
    type Output = Expr;
    fn mul(self, rhs: T) -> Expr {
        Expr::Mul(vec![self, rhs.into()])
    }
}

impl<T: Into<Expr>> Div<T> for Expr {
    type Output = Expr;
    fn div(self, rhs: T) -> Expr {
        Expr::Mul(vec![self, rhs.into().powi(-1)])
    }
}

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Mul(vec![Expr::Const(-1.0), self])
    }
}

impl Mul<Expr> for f64 {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::Mul(vec![Expr::Const(self), rhs])
    }
}
