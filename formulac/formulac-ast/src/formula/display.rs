use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use super::{FormulaItem, ItemKind, JoinCondition, LodSpec, QueryFork};

impl Display for FormulaItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ItemKind::Literal(lit) => write!(f, "{lit}"),
            ItemKind::Field(name) => write!(f, "[{name}]"),
            ItemKind::Unary(u) => match u.op.as_str() {
                "neg" => write!(f, "-{}", u.expr),
                op => write!(f, "{} {}", op.to_uppercase(), u.expr),
            },
            ItemKind::Binary(b) => {
                write!(f, "({} {} {})", b.left, display_binary_op(&b.op), b.right)
            }
            ItemKind::FuncCall(c) => {
                write!(f, "{}({})", c.name.to_uppercase(), c.args.iter().join(", "))
            }
            ItemKind::Fork(fork) => write!(f, "{fork}"),
        }
    }
}

fn display_binary_op(op: &str) -> String {
    match op {
        "notin" => "NOT IN".to_string(),
        "and" | "or" | "in" | "like" | "notlike" => op.to_uppercase(),
        _ => op.to_string(),
    }
}

impl Display for QueryFork {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "FORK({}", self.result_expr)?;
        if !self.joining.is_empty() {
            write!(f, " JOINING {}", self.joining.iter().join(", "))?;
        }
        write!(f, " {})", self.lod)
    }
}

impl Display for JoinCondition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            JoinCondition::SelfEq(expr) => write!(f, "SELF({expr})"),
            JoinCondition::Bin { expr, fork_expr } => write!(f, "BIN({expr}, {fork_expr})"),
        }
    }
}

impl Display for LodSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let (keyword, dims) = match self {
            LodSpec::Fixed(dims) => ("FIXED", dims),
            LodSpec::Include(dims) => ("INCLUDE", dims),
            LodSpec::Exclude(dims) => ("EXCLUDE", dims),
            LodSpec::Inherited => return write!(f, "INHERITED"),
        };
        if dims.is_empty() {
            write!(f, "{keyword}")
        } else {
            write!(f, "{keyword} {}", dims.iter().join(", "))
        }
    }
}
