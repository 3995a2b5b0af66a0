//! Registry of dialect-specific translations of formula operations.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::{Arc, OnceLock};

use serde::Serialize;

use super::dialect::DialectSet;
use super::translators::TranslateOp;
use crate::{Error, ErrorSource, Reason, Result, WithErrorInfo};

/// Number of arguments an operation variant accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Arity {
    Exact(usize),
    /// Inclusive bounds.
    Range(usize, usize),
    AtLeast(usize),
    /// An odd number, at least the given one. IF-like operations.
    Odd(usize),
    /// An even number, at least the given one. CASE-like operations.
    Even(usize),
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exact(n) => count == n,
            Arity::Range(min, max) => (min..=max).contains(&count),
            Arity::AtLeast(min) => count >= min,
            Arity::Odd(min) => count >= min && count % 2 == 1,
            Arity::Even(min) => count >= min && count % 2 == 0,
        }
    }

    pub fn min(&self) -> usize {
        match *self {
            Arity::Exact(n) | Arity::AtLeast(n) | Arity::Odd(n) | Arity::Even(n) => n,
            Arity::Range(min, _) => min,
        }
    }
}

impl Display for Arity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::Range(min, max) => write!(f, "{min} to {max}"),
            Arity::AtLeast(min) => write!(f, "at least {min}"),
            Arity::Odd(min) => write!(f, "an odd number (at least {min}) of"),
            Arity::Even(min) => write!(f, "an even number (at least {min}) of"),
        }
    }
}

/// One variant of an operation: how to render it on a set of dialects.
#[derive(Clone, Serialize)]
pub struct Translator {
    pub name: String,
    pub dialects: DialectSet,
    pub arity: Arity,
    #[serde(rename = "translation", serialize_with = "serialize_op")]
    pub op: Arc<dyn TranslateOp>,
}

fn serialize_op<S: serde::Serializer>(
    op: &Arc<dyn TranslateOp>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&op.describe())
}

impl Debug for Translator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Translator")
            .field("name", &self.name)
            .field("dialects", &self.dialects)
            .field("arity", &self.arity)
            .field("op", &self.op.describe())
            .finish()
    }
}

impl Translator {
    pub fn new<O: TranslateOp + 'static>(
        name: &str,
        dialects: DialectSet,
        arity: Arity,
        op: O,
    ) -> Self {
        Translator {
            name: name.to_lowercase(),
            dialects,
            arity,
            op: Arc::new(op),
        }
    }
}

/// Operation variants by name.
///
/// Built once with a [RegistryBuilder], read-only afterwards.
#[derive(Debug, Default)]
pub struct Registry {
    ops: BTreeMap<String, Vec<Translator>>,
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    translators: Vec<Translator>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, translator: Translator) -> Self {
        self.translators.push(translator);
        self
    }

    pub fn register_all<I: IntoIterator<Item = Translator>>(mut self, translators: I) -> Self {
        self.translators.extend(translators);
        self
    }

    /// Fails when two variants of an operation share both dialects and arity,
    /// since resolving between them would depend on registration order.
    pub fn build(self) -> Result<Registry> {
        let mut seen = HashSet::new();
        let mut ops: BTreeMap<String, Vec<Translator>> = BTreeMap::new();
        for t in self.translators {
            if t.dialects.is_empty() {
                return Err(Error::new_assert(format!(
                    "translation of `{}` registered for no dialect",
                    t.name
                )));
            }
            if !seen.insert((t.name.clone(), t.dialects, t.arity)) {
                return Err(Error::new_assert(format!(
                    "translation of `{}` registered twice for {} with arity {}",
                    t.name, t.dialects, t.arity
                )));
            }
            ops.entry(t.name.clone()).or_default().push(t);
        }
        Ok(Registry { ops })
    }
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Names of all registered operations, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.ops.keys().map(String::as_str)
    }

    pub fn variants(&self, name: &str) -> &[Translator] {
        self.ops.get(name).map_or(&[], Vec::as_slice)
    }

    /// Most specific variant of `name` applicable to `dialects`, ignoring arity.
    pub fn resolve(&self, name: &str, dialects: DialectSet) -> Option<&Translator> {
        select(self.variants(name).iter(), dialects)
    }

    /// Most specific variant of `name` that accepts `arg_count` arguments on
    /// `dialects`.
    pub fn resolve_call(
        &self,
        name: &str,
        arg_count: usize,
        dialects: DialectSet,
    ) -> Result<&Translator> {
        let variants = self.variants(name);
        let by_arity = variants.iter().filter(|t| t.arity.accepts(arg_count));
        if let Some(t) = select(by_arity, dialects) {
            return Ok(t);
        }

        if let Some(t) = select(variants.iter(), dialects) {
            return Err(Error::new(Reason::Arity {
                function: name.to_uppercase(),
                expected: t.arity.to_string(),
                found: arg_count,
            })
            .with_code("E0202")
            .with_source(ErrorSource::Translator));
        }

        let mut err = Error::new(Reason::NotFound {
            name: name.to_uppercase(),
            namespace: "operation".to_string(),
        })
        .with_code("E0201")
        .with_source(ErrorSource::Translator);
        if !variants.is_empty() {
            err = err.push_hint(format!("it is not available on {dialects}"));
        }
        Err(err)
    }
}

/// Picks among variants intersecting `dialects`: fewest dialects first, then
/// the largest overlap with the request. Variants for all dialects are only
/// used when nothing narrower applies. Remaining ties go to the lowest
/// dialect bits and the smallest arity, so the pick never depends on
/// registration order.
fn select<'a, I>(candidates: I, dialects: DialectSet) -> Option<&'a Translator>
where
    I: Iterator<Item = &'a Translator>,
{
    let mut fallback: Option<&Translator> = None;
    let mut best = None;
    for t in candidates {
        if t.dialects == DialectSet::ANY {
            if fallback.map_or(true, |f| t.arity.min() < f.arity.min()) {
                fallback = Some(t);
            }
            continue;
        }

        let overlap = t.dialects & dialects;
        if overlap.is_empty() {
            continue;
        }
        let key = (
            t.dialects.specificity(),
            Reverse(overlap.specificity()),
            t.dialects.bits(),
            t.arity.min(),
        );
        if best.as_ref().map_or(true, |(best_key, _)| key < *best_key) {
            best = Some((key, t));
        }
    }
    best.map(|(_, t)| t).or(fallback)
}

/// The registry of built-in translations.
pub fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        super::builtin::builtin_registry()
            .unwrap_or_else(|e| panic!("invalid built-in translations: {}", e.reason))
    })
}
