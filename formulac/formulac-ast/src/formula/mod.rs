mod display;
mod fork;
mod literal;

use std::hash::{Hash, Hasher};

use enum_as_inner::EnumAsInner;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use self::fork::{JoinCondition, LodSpec, QueryFork};
pub use self::literal::Literal;
use crate::span::Span;

/// A node of the formula tree.
///
/// Trees are immutable values: rewrites produce new trees. Equality and
/// hashing are structural and ignore `span`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FormulaItem {
    #[serde(flatten)]
    pub kind: ItemKind,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub span: Option<Span>,
}

#[derive(
    Debug, EnumAsInner, PartialEq, Eq, Hash, Clone, Serialize, Deserialize, strum::AsRefStr, JsonSchema,
)]
pub enum ItemKind {
    Literal(Literal),
    /// Reference to a column or an aliased upstream expression.
    Field(String),
    Unary(UnaryExpr),
    Binary(BinaryExpr),
    FuncCall(FuncCall),
    Fork(Box<QueryFork>),
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UnaryExpr {
    pub op: String,
    pub expr: Box<FormulaItem>,
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BinaryExpr {
    pub left: Box<FormulaItem>,
    pub op: String,
    pub right: Box<FormulaItem>,
}

/// Function call. The name is stored in its lower case canonical form.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FuncCall {
    pub name: String,
    pub args: Vec<FormulaItem>,
}

impl FormulaItem {
    pub fn new<K: Into<ItemKind>>(kind: K) -> Self {
        FormulaItem {
            kind: kind.into(),
            span: None,
        }
    }

    pub fn with_span(mut self, span: Option<Span>) -> Self {
        self.span = span;
        self
    }

    pub fn literal<L: Into<Literal>>(value: L) -> Self {
        FormulaItem::new(ItemKind::Literal(value.into()))
    }

    pub fn null() -> Self {
        FormulaItem::new(ItemKind::Literal(Literal::Null))
    }

    pub fn field<S: Into<String>>(name: S) -> Self {
        FormulaItem::new(ItemKind::Field(name.into()))
    }

    pub fn unary(op: &str, expr: FormulaItem) -> Self {
        FormulaItem::new(ItemKind::Unary(UnaryExpr {
            op: op.to_lowercase(),
            expr: Box::new(expr),
        }))
    }

    pub fn binary(op: &str, left: FormulaItem, right: FormulaItem) -> Self {
        FormulaItem::new(ItemKind::Binary(BinaryExpr {
            left: Box::new(left),
            op: op.to_lowercase(),
            right: Box::new(right),
        }))
    }

    pub fn func(name: &str, args: Vec<FormulaItem>) -> Self {
        FormulaItem::new(ItemKind::FuncCall(FuncCall {
            name: name.to_lowercase(),
            args,
        }))
    }

    pub fn fork(fork: QueryFork) -> Self {
        FormulaItem::new(ItemKind::Fork(Box::new(fork)))
    }

    /// Direct sub-expressions, left to right.
    pub fn children(&self) -> Vec<&FormulaItem> {
        match &self.kind {
            ItemKind::Literal(_) | ItemKind::Field(_) => Vec::new(),
            ItemKind::Unary(u) => vec![&u.expr],
            ItemKind::Binary(b) => vec![&b.left, &b.right],
            ItemKind::FuncCall(c) => c.args.iter().collect(),
            ItemKind::Fork(f) => f.children(),
        }
    }

    /// Returns a copy of this node with its direct sub-expressions replaced.
    ///
    /// `children` must be in the order returned by [FormulaItem::children].
    /// Missing trailing children keep their old value.
    pub fn with_children(&self, children: Vec<FormulaItem>) -> FormulaItem {
        let mut iter = children.into_iter();
        let kind = match &self.kind {
            ItemKind::Literal(_) | ItemKind::Field(_) => self.kind.clone(),
            ItemKind::Unary(u) => ItemKind::Unary(UnaryExpr {
                op: u.op.clone(),
                expr: Box::new(iter.next().unwrap_or_else(|| (*u.expr).clone())),
            }),
            ItemKind::Binary(b) => {
                let left = iter.next().unwrap_or_else(|| (*b.left).clone());
                let right = iter.next().unwrap_or_else(|| (*b.right).clone());
                ItemKind::Binary(BinaryExpr {
                    left: Box::new(left),
                    op: b.op.clone(),
                    right: Box::new(right),
                })
            }
            ItemKind::FuncCall(c) => ItemKind::FuncCall(FuncCall {
                name: c.name.clone(),
                args: c
                    .args
                    .iter()
                    .map(|old| iter.next().unwrap_or_else(|| old.clone()))
                    .collect(),
            }),
            ItemKind::Fork(f) => ItemKind::Fork(Box::new(f.with_children(iter.collect()))),
        };
        FormulaItem {
            kind,
            span: self.span,
        }
    }

    /// Names of all fields referenced anywhere in the tree, in order of first
    /// appearance.
    pub fn used_fields(&self) -> Vec<&str> {
        let mut res = Vec::new();
        self.walk(&mut |node| {
            if let ItemKind::Field(name) = &node.kind {
                if !res.contains(&name.as_str()) {
                    res.push(name.as_str());
                }
            }
        });
        res
    }

    pub fn contains_fork(&self) -> bool {
        let mut found = false;
        self.walk(&mut |node| found |= node.kind.is_fork());
        found
    }

    /// Number of nodes in the tree.
    pub fn complexity(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }

    /// Pre-order traversal.
    pub fn walk<'a, F: FnMut(&'a FormulaItem)>(&'a self, f: &mut F) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    pub fn is_literal(&self) -> bool {
        self.kind.is_literal()
    }

    /// The function name, if this is a call.
    pub fn func_name(&self) -> Option<&str> {
        self.kind.as_func_call().map(|c| c.name.as_str())
    }
}

impl PartialEq for FormulaItem {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for FormulaItem {}

impl Hash for FormulaItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
    }
}

impl From<ItemKind> for FormulaItem {
    fn from(kind: ItemKind) -> Self {
        FormulaItem::new(kind)
    }
}

impl From<Literal> for ItemKind {
    fn from(value: Literal) -> Self {
        ItemKind::Literal(value)
    }
}

impl From<FuncCall> for ItemKind {
    fn from(value: FuncCall) -> Self {
        ItemKind::FuncCall(value)
    }
}
