use indexmap::IndexMap;
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use super::{SqlArgs, SqlError, SqlValue};

/// Matches `%s`/`%d` positional markers and `%(name)s`/`%(name)d` named ones.
fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"%(?:\(([^)]+)\))?([sd])").expect("placeholder regex"))
}

/// Monotonic id source for generated placeholder names.
///
/// Uniqueness across the whole process lifetime is the collision-avoidance
/// mechanism for nested or repeated literals, so the increment is atomic.
#[derive(Debug)]
pub struct LiteralSequence {
    next: AtomicU64,
}

impl LiteralSequence {
    pub const fn new() -> Self {
        Self::starting_at(1)
    }

    pub const fn starting_at(n: u64) -> Self {
        Self {
            next: AtomicU64::new(n),
        }
    }

    fn tick(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for LiteralSequence {
    fn default() -> Self {
        Self::new()
    }
}

/// Arguments supplied alongside a literal template.
#[derive(Debug, Clone)]
pub enum LiteralArgs {
    Positional(Vec<SqlValue>),
    Named(IndexMap<String, SqlValue>),
}

impl LiteralArgs {
    pub fn none() -> Self {
        LiteralArgs::Positional(Vec::new())
    }

    pub fn positional<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<SqlValue>,
    {
        LiteralArgs::Positional(values.into_iter().map(Into::into).collect())
    }

    pub fn named<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SqlValue>,
    {
        LiteralArgs::Named(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    fn len(&self) -> usize {
        match self {
            LiteralArgs::Positional(v) => v.len(),
            LiteralArgs::Named(m) => m.len(),
        }
    }

    fn by_index(&self, index: usize) -> Option<&SqlValue> {
        match self {
            LiteralArgs::Positional(v) => v.get(index),
            LiteralArgs::Named(_) => None,
        }
    }

    fn by_key(&self, key: &str) -> Option<&SqlValue> {
        match self {
            LiteralArgs::Positional(_) => None,
            LiteralArgs::Named(m) => m.get(key),
        }
    }
}

/// A raw SQL fragment whose placeholders have been rewritten to
/// process-unique names, with the matching argument map.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    text: String,
    args: SqlArgs,
}

impl SqlFragment {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn args(&self) -> &SqlArgs {
        &self.args
    }
}

/// A value in a condition or data map: either a plain scalar bound as one
/// parameter, a fragment standing where a value is expected, or a fragment
/// forming a whole boolean clause.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    Value(SqlValue),
    Literal(SqlFragment),
    Condition(SqlFragment),
}

impl SqlExpr {
    /// Builds a value-position fragment using the process-global factory.
    pub fn literal(template: &str, args: LiteralArgs) -> Result<Self, SqlError> {
        default_factory().literal(template, args)
    }

    /// Builds a whole-clause fragment using the process-global factory.
    pub fn condition(template: &str, args: LiteralArgs) -> Result<Self, SqlError> {
        default_factory().condition(template, args)
    }
}

impl From<SqlValue> for SqlExpr {
    fn from(v: SqlValue) -> Self {
        SqlExpr::Value(v)
    }
}

impl From<i64> for SqlExpr {
    fn from(n: i64) -> Self {
        SqlExpr::Value(n.into())
    }
}

impl From<i32> for SqlExpr {
    fn from(n: i32) -> Self {
        SqlExpr::Value(n.into())
    }
}

impl From<&str> for SqlExpr {
    fn from(s: &str) -> Self {
        SqlExpr::Value(s.into())
    }
}

impl From<String> for SqlExpr {
    fn from(s: String) -> Self {
        SqlExpr::Value(s.into())
    }
}

impl From<f64> for SqlExpr {
    fn from(n: f64) -> Self {
        SqlExpr::Value(n.into())
    }
}

impl From<bool> for SqlExpr {
    fn from(b: bool) -> Self {
        SqlExpr::Value(b.into())
    }
}

/// Mints literals, owning the sequence their placeholder names draw from.
#[derive(Debug, Default)]
pub struct LiteralFactory {
    seq: LiteralSequence,
}

impl LiteralFactory {
    pub const fn new() -> Self {
        Self {
            seq: LiteralSequence::new(),
        }
    }

    /// Factory with a pinned starting id, for deterministic tests.
    pub const fn starting_at(n: u64) -> Self {
        Self {
            seq: LiteralSequence::starting_at(n),
        }
    }

    pub fn literal(&self, template: &str, args: LiteralArgs) -> Result<SqlExpr, SqlError> {
        Ok(SqlExpr::Literal(self.fragment(template, args)?))
    }

    pub fn condition(&self, template: &str, args: LiteralArgs) -> Result<SqlExpr, SqlError> {
        Ok(SqlExpr::Condition(self.fragment(template, args)?))
    }

    pub fn fragment(&self, template: &str, args: LiteralArgs) -> Result<SqlFragment, SqlError> {
        rewrite(template, &args, self.seq.tick())
    }
}

static DEFAULT_FACTORY: LiteralFactory = LiteralFactory::new();

/// The process-global factory backing [`SqlExpr::literal`] and
/// [`SqlExpr::condition`].
pub fn default_factory() -> &'static LiteralFactory {
    &DEFAULT_FACTORY
}

fn rewrite(template: &str, args: &LiteralArgs, seq: u64) -> Result<SqlFragment, SqlError> {
    let prefix = format!("lsqid_{}_", seq);
    let mut text = String::with_capacity(template.len());
    let mut collected = SqlArgs::new();
    let mut last = 0;
    let mut index = 0;

    for caps in placeholder_re().captures_iter(template) {
        let marker = caps.get(0).expect("whole match");
        text.push_str(&template[last..marker.start()]);
        let flavor = caps.get(2).expect("flavor group").as_str();

        let arg_name = match caps.get(1) {
            Some(key) => {
                let key = key.as_str();
                let value = args
                    .by_key(key)
                    .ok_or_else(|| SqlError::MissingArgument(key.to_string()))?;
                let name = format!("{}_key_{}", prefix, key);
                collected.insert(name.clone(), value.clone());
                name
            }
            None => {
                let value = args
                    .by_index(index)
                    .ok_or_else(|| SqlError::MissingArgument(index.to_string()))?;
                let name = format!("{}_index_{}", prefix, index);
                collected.insert(name.clone(), value.clone());
                index += 1;
                name
            }
        };

        text.push_str("%(");
        text.push_str(&arg_name);
        text.push(')');
        text.push_str(flavor);
        last = marker.end();
    }
    text.push_str(&template[last..]);

    if args.len() != collected.len() {
        return Err(SqlError::MalformedLiteral {
            supplied: args.len(),
            found: collected.len(),
        });
    }

    Ok(SqlFragment {
        text,
        args: collected,
    })
}
