//! Compiled query plan: levels of queries whose formulas reference base
//! sources and lower-level queries.

use std::collections::{BTreeSet, HashMap, HashSet};

use enum_as_inner::EnumAsInner;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::utils::is_fork_id;
use crate::{Error, FormulaItem, Result};

pub type Id = String;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    JsonSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionLevel {
    /// Evaluated by the source database.
    #[default]
    SourceDb,
    /// Evaluated by the internal computation engine.
    Compeng,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    JsonSchema,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "UPPERCASE")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    JsonSchema,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "UPPERCASE")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

/// A formula together with the dependency information of the plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct CompiledFormulaInfo {
    pub alias: String,
    pub formula: FormulaItem,

    /// Base avatars or lower-level query ids whose columns the formula reads.
    #[serde(default)]
    pub avatar_ids: BTreeSet<Id>,

    /// Set only for formulas that correspond 1:1 to a user-visible field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_field_id: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct CompiledOrderByFormulaInfo {
    #[serde(flatten)]
    pub info: CompiledFormulaInfo,
    #[serde(default)]
    pub direction: OrderDirection,
}

/// A join predicate between two members of the query's `joined_from`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct CompiledJoinOnFormulaInfo {
    #[serde(flatten)]
    pub info: CompiledFormulaInfo,
    pub left_id: Id,
    pub right_id: Id,
    #[serde(default)]
    pub join_type: JoinType,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct FromColumn {
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct AvatarFromObject {
    pub id: Id,
    pub alias: String,
    pub avatar_id: Id,
    pub source_id: Id,
    #[serde(default)]
    pub columns: Vec<FromColumn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct SubqueryFromObject {
    pub id: Id,
    pub alias: String,
    pub query_id: Id,
    #[serde(default)]
    pub columns: Vec<FromColumn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumAsInner, Serialize, Deserialize, JsonSchema)]
pub enum FromObject {
    Avatar(AvatarFromObject),
    Subquery(SubqueryFromObject),
}

/// The join graph of a query: a root source and the sources joined to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct JoinedFromObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_from_id: Option<Id>,
    #[serde(default)]
    pub froms: Vec<FromObject>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct CompiledQuery {
    pub id: Id,
    #[serde(default)]
    pub level_type: ExecutionLevel,
    #[serde(default)]
    pub select: Vec<CompiledFormulaInfo>,
    #[serde(default)]
    pub group_by: Vec<CompiledFormulaInfo>,
    #[serde(default)]
    pub filters: Vec<CompiledFormulaInfo>,
    #[serde(default)]
    pub order_by: Vec<CompiledOrderByFormulaInfo>,
    #[serde(default)]
    pub join_on: Vec<CompiledJoinOnFormulaInfo>,
    #[serde(default)]
    pub joined_from: JoinedFromObject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct CompiledLevel {
    #[serde(default)]
    pub level_type: ExecutionLevel,
    #[serde(default)]
    pub queries: Vec<CompiledQuery>,
}

/// Levels of queries, lowest (closest to the sources) first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct CompiledMultiLevelQuery {
    pub levels: Vec<CompiledLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum QueryPart {
    Select,
    GroupBy,
    Filters,
    OrderBy,
    JoinOn,
}

impl CompiledFormulaInfo {
    pub fn new<S: Into<String>>(alias: S, formula: FormulaItem) -> Self {
        CompiledFormulaInfo {
            alias: alias.into(),
            formula,
            avatar_ids: BTreeSet::new(),
            original_field_id: None,
        }
    }

    pub fn with_avatar_ids<I, S>(mut self, avatar_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.avatar_ids = avatar_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_original_field_id<S: Into<String>>(mut self, field_id: S) -> Self {
        self.original_field_id = Some(field_id.into());
        self
    }
}

impl FromObject {
    pub fn id(&self) -> &str {
        match self {
            FromObject::Avatar(a) => &a.id,
            FromObject::Subquery(s) => &s.id,
        }
    }

    pub fn alias(&self) -> &str {
        match self {
            FromObject::Avatar(a) => &a.alias,
            FromObject::Subquery(s) => &s.alias,
        }
    }

    pub fn columns(&self) -> &[FromColumn] {
        match self {
            FromObject::Avatar(a) => &a.columns,
            FromObject::Subquery(s) => &s.columns,
        }
    }

    /// The id that formulas record in their `avatar_ids` when reading this source.
    pub fn avatar_ref(&self) -> &str {
        match self {
            FromObject::Avatar(a) => &a.avatar_id,
            FromObject::Subquery(s) => &s.query_id,
        }
    }

    /// Whether `name` refers to one of the columns of this source.
    pub fn provides(&self, name: &str) -> bool {
        self.columns().iter().any(|c| c.id == name || c.name == name)
    }
}

impl JoinedFromObject {
    /// Finds the source providing the column `name`.
    pub fn resolve(&self, name: &str) -> Option<&FromObject> {
        self.froms.iter().find(|f| f.provides(name))
    }

    /// Id of the root source, falling back to the first joined one.
    pub fn root_id(&self) -> Option<&str> {
        self.root_from_id
            .as_deref()
            .or_else(|| self.froms.first().map(FromObject::id))
    }
}

impl CompiledQuery {
    pub fn new<S: Into<String>>(id: S, level_type: ExecutionLevel) -> Self {
        CompiledQuery {
            id: id.into(),
            level_type,
            ..Default::default()
        }
    }

    pub fn formula_list(&self, part: QueryPart) -> Vec<&CompiledFormulaInfo> {
        match part {
            QueryPart::Select => self.select.iter().collect(),
            QueryPart::GroupBy => self.group_by.iter().collect(),
            QueryPart::Filters => self.filters.iter().collect(),
            QueryPart::OrderBy => self.order_by.iter().map(|o| &o.info).collect(),
            QueryPart::JoinOn => self.join_on.iter().map(|j| &j.info).collect(),
        }
    }

    /// All formulas of the query, in part order.
    pub fn all_formulas(&self) -> Vec<(QueryPart, &CompiledFormulaInfo)> {
        use strum::IntoEnumIterator;

        QueryPart::iter()
            .flat_map(|part| self.formula_list(part).into_iter().map(move |f| (part, f)))
            .collect()
    }

    pub fn select_aliases(&self) -> Vec<&str> {
        self.select.iter().map(|s| s.alias.as_str()).collect()
    }
}

impl CompiledMultiLevelQuery {
    pub fn new(levels: Vec<CompiledLevel>) -> Self {
        CompiledMultiLevelQuery { levels }
    }

    pub fn iter_queries(&self) -> impl Iterator<Item = &CompiledQuery> {
        self.levels.iter().flat_map(|l| l.queries.iter())
    }

    pub fn query_by_id(&self, id: &str) -> Option<&CompiledQuery> {
        self.iter_queries().find(|q| q.id == id)
    }

    /// Queries of the final level. Their output is the output of the plan.
    pub fn top_queries(&self) -> &[CompiledQuery] {
        self.levels.last().map_or(&[], |l| l.queries.as_slice())
    }

    pub fn query_ids(&self) -> Vec<&str> {
        self.iter_queries().map(|q| q.id.as_str()).collect()
    }

    pub fn level_of(&self, id: &str) -> Option<usize> {
        self.levels
            .iter()
            .position(|l| l.queries.iter().any(|q| q.id == id))
    }

    /// Checks alias uniqueness within queries, id uniqueness within the plan
    /// and that formulas only read from lower levels.
    ///
    /// A fork sibling (`<id>_f<n>`) may be read by a query of its own level,
    /// as long as it precedes its consumer.
    pub fn validate(&self) -> Result<()> {
        let mut positions: HashMap<&str, (usize, usize)> = HashMap::new();
        for (level_index, level) in self.levels.iter().enumerate() {
            for (query_index, query) in level.queries.iter().enumerate() {
                if positions
                    .insert(&query.id, (level_index, query_index))
                    .is_some()
                {
                    return Err(Error::new_simple(format!(
                        "duplicate query id `{}`",
                        query.id
                    )));
                }
            }
        }

        for (level_index, level) in self.levels.iter().enumerate() {
            for (query_index, query) in level.queries.iter().enumerate() {
                let mut aliases = HashSet::new();
                for select in &query.select {
                    if !aliases.insert(select.alias.as_str()) {
                        return Err(Error::new_simple(format!(
                            "duplicate alias `{}` in query `{}`",
                            select.alias, query.id
                        )));
                    }
                }

                for (part, info) in query.all_formulas() {
                    for avatar_id in &info.avatar_ids {
                        let Some(&(dep_level, dep_index)) = positions.get(avatar_id.as_str())
                        else {
                            // a base source avatar
                            continue;
                        };
                        let is_lower = dep_level < level_index;
                        let is_sibling = dep_level == level_index
                            && dep_index < query_index
                            && is_fork_id(avatar_id);
                        if !is_lower && !is_sibling {
                            return Err(Error::new_simple(format!(
                                "{part} formula `{}` of query `{}` reads query `{avatar_id}`, which is not on a lower level",
                                info.alias, query.id
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
