//! Target SQL dialects.
//!
//! A [Dialect] names one concrete engine version. Translators declare the
//! dialects they apply to as a [DialectSet], so one variant can cover a whole
//! family of engines.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::{Error, Reason, WithErrorInfo};

/// SQL dialect, down to the engine version.
#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    JsonSchema,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
    strum::VariantNames,
)]
pub enum Dialect {
    #[strum(serialize = "SQLITE")]
    Sqlite,
    #[strum(serialize = "POSTGRESQL_9_3")]
    Postgresql9_3,
    #[strum(serialize = "POSTGRESQL_9_4")]
    Postgresql9_4,
    #[strum(serialize = "COMPENG")]
    Compeng,
    #[strum(serialize = "MYSQL_5_6")]
    Mysql5_6,
    #[strum(serialize = "MYSQL_5_7")]
    Mysql5_7,
    #[strum(serialize = "MYSQL_8_0_12")]
    Mysql8_0_12,
    #[strum(serialize = "CLICKHOUSE_21_8")]
    Clickhouse21_8,
    #[strum(serialize = "CLICKHOUSE_22_10")]
    Clickhouse22_10,
    #[strum(serialize = "MSSQLSRV")]
    MsSqlSrv,
    #[strum(serialize = "ORACLE")]
    Oracle,
}

bitflags::bitflags! {
    /// A set of dialects, one bit per [Dialect], plus named engine families.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct DialectSet: u64 {
        const SQLITE = 1 << 0;
        const POSTGRESQL_9_3 = 1 << 1;
        const POSTGRESQL_9_4 = 1 << 2;
        /// The internal computation engine; it speaks PostgreSQL.
        const COMPENG = 1 << 3;
        const MYSQL_5_6 = 1 << 4;
        const MYSQL_5_7 = 1 << 5;
        const MYSQL_8_0_12 = 1 << 6;
        const CLICKHOUSE_21_8 = 1 << 7;
        const CLICKHOUSE_22_10 = 1 << 8;
        const MSSQLSRV = 1 << 9;
        const ORACLE = 1 << 10;

        const POSTGRESQL = Self::POSTGRESQL_9_3.bits() | Self::POSTGRESQL_9_4.bits();
        const MYSQL = Self::MYSQL_5_6.bits() | Self::MYSQL_5_7.bits() | Self::MYSQL_8_0_12.bits();
        const CLICKHOUSE = Self::CLICKHOUSE_21_8.bits() | Self::CLICKHOUSE_22_10.bits();
        const ANY = Self::SQLITE.bits()
            | Self::POSTGRESQL.bits()
            | Self::COMPENG.bits()
            | Self::MYSQL.bits()
            | Self::CLICKHOUSE.bits()
            | Self::MSSQLSRV.bits()
            | Self::ORACLE.bits();
    }
}

impl Dialect {
    pub fn flag(self) -> DialectSet {
        match self {
            Dialect::Sqlite => DialectSet::SQLITE,
            Dialect::Postgresql9_3 => DialectSet::POSTGRESQL_9_3,
            Dialect::Postgresql9_4 => DialectSet::POSTGRESQL_9_4,
            Dialect::Compeng => DialectSet::COMPENG,
            Dialect::Mysql5_6 => DialectSet::MYSQL_5_6,
            Dialect::Mysql5_7 => DialectSet::MYSQL_5_7,
            Dialect::Mysql8_0_12 => DialectSet::MYSQL_8_0_12,
            Dialect::Clickhouse21_8 => DialectSet::CLICKHOUSE_21_8,
            Dialect::Clickhouse22_10 => DialectSet::CLICKHOUSE_22_10,
            Dialect::MsSqlSrv => DialectSet::MSSQLSRV,
            Dialect::Oracle => DialectSet::ORACLE,
        }
    }
}

impl From<Dialect> for DialectSet {
    fn from(dialect: Dialect) -> Self {
        dialect.flag()
    }
}

impl DialectSet {
    /// Concrete dialects contained in the set.
    pub fn dialects(&self) -> Vec<Dialect> {
        Dialect::iter().filter(|d| self.contains(d.flag())).collect()
    }

    /// Number of concrete dialects in the set. Lower is more specific.
    pub fn specificity(&self) -> u32 {
        self.bits().count_ones()
    }

    /// Character used to quote identifiers.
    pub fn ident_quote(&self) -> char {
        if !self.is_empty() && (DialectSet::MYSQL | DialectSet::CLICKHOUSE).contains(*self) {
            '`'
        } else {
            '"'
        }
    }
}

impl Default for DialectSet {
    fn default() -> Self {
        DialectSet::ANY
    }
}

impl Display for DialectSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if *self == DialectSet::ANY {
            return write!(f, "ANY");
        }
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
        write!(f, "{}", names.join(" | "))
    }
}

/// Parses `"POSTGRESQL_9_4 | SQLITE"`-like text. Names are case-insensitive.
impl FromStr for DialectSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut res = DialectSet::empty();
        for part in s.split('|').map(str::trim) {
            let flag = DialectSet::from_name(&part.to_uppercase()).ok_or_else(|| {
                Error::new(Reason::NotFound {
                    name: format!("{part:?}"),
                    namespace: "dialect".to_string(),
                })
                .push_hint(format!(
                    "available dialects: {}",
                    DialectSet::all()
                        .iter_names()
                        .map(|(name, _)| name)
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })?;
            res |= flag;
        }
        Ok(res)
    }
}

impl Serialize for DialectSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DialectSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        DialectSet::from_str(&text).map_err(|e| serde::de::Error::custom(e.reason))
    }
}
