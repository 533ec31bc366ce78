use std::cmp::Ordering;
use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type TaskId = i64;
pub type StatusId = i64;

/// A task card on the board.
///
/// Only `id`, `statusId` and `rank` carry meaning for ordering and
/// reconciliation. Everything else the API returns (title, assignee,
/// sprint, ...) is kept verbatim in `fields` and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(deserialize_with = "flexible_id")]
    pub id: TaskId,
    /// Zero when the payload omitted it. The board cache stamps the owning
    /// column's id on every insertion.
    #[serde(default, deserialize_with = "flexible_id")]
    pub status_id: StatusId,
    #[serde(default)]
    pub rank: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Task {
    pub fn new(id: TaskId, status_id: StatusId) -> Self {
        Self {
            id,
            status_id,
            rank: None,
            fields: Map::new(),
        }
    }

    pub fn with_rank(mut self, rank: impl Into<String>) -> Self {
        self.rank = Some(rank.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn title(&self) -> Option<&str> {
        self.fields.get("title").and_then(Value::as_str)
    }

    /// Apply a partial update as sent to `PUT /tasks/{id}`.
    ///
    /// `id` is identity and never overwritten; `statusId` and `rank` land in
    /// their typed slots; every other key replaces the freeform field.
    pub fn apply_patch(&mut self, patch: &Map<String, Value>) {
        for (key, value) in patch {
            match key.as_str() {
                "id" => {}
                "statusId" => {
                    if let Some(status_id) = parse_id(value) {
                        self.status_id = status_id;
                    }
                }
                "rank" => self.rank = value.as_str().map(str::to_string),
                _ => {
                    self.fields.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Adopt the server's copy of this task on top of the local one.
    ///
    /// Fields the server omitted keep their local value: a missing rank or a
    /// zero status id in the response never erases what the cache knows.
    pub fn absorb(&mut self, server: Task) {
        if server.status_id != 0 {
            self.status_id = server.status_id;
        }
        if server.rank.is_some() {
            self.rank = server.rank;
        }
        self.fields.extend(server.fields);
    }
}

/// Board ordering within one column: rank ascending, unranked tasks after
/// ranked ones, ties broken by ascending id.
pub fn rank_order(a: &Task, b: &Task) -> Ordering {
    match (&a.rank, &b.rank) {
        (Some(ra), Some(rb)) => ra.cmp(rb).then(a.id.cmp(&b.id)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.id.cmp(&b.id),
    }
}

/// One status column of a board snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    #[serde(deserialize_with = "flexible_id")]
    pub status_id: StatusId,
    #[serde(default)]
    pub status_title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tasks: Vec<Task>,
}

impl Column {
    pub fn new(status_id: StatusId, status_title: impl Into<String>) -> Self {
        Self {
            status_id,
            status_title: status_title.into(),
            tasks: Vec::new(),
        }
    }

    pub fn with_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn position_of(&self, task_id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == task_id)
    }

    pub fn is_rank_ordered(&self) -> bool {
        self.tasks
            .windows(2)
            .all(|pair| rank_order(&pair[0], &pair[1]) != Ordering::Greater)
    }
}

/// Read-only status projection used for pickers and labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: StatusId,
    pub title: String,
}

impl From<&Column> for Status {
    fn from(column: &Column) -> Self {
        Self {
            id: column.status_id,
            title: column.status_title.clone(),
        }
    }
}

/// A `{label, value}` pair for dropdown pickers. `value` is `None` for the
/// "no selection" sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: Option<i64>,
}

impl SelectOption {
    pub fn new(label: impl Into<String>, value: i64) -> Self {
        Self {
            label: label.into(),
            value: Some(value),
        }
    }

    pub fn none(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: None,
        }
    }
}

/// Read an integer identifier from a JSON value that may be a number or a
/// numeric string.
pub fn parse_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Deserialize an integer id sent either as a JSON number or a numeric string.
pub fn flexible_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(IdVisitor)
}

struct IdVisitor;

impl Visitor<'_> for IdVisitor {
    type Value = i64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an integer id or a numeric string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
        Ok(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
        i64::try_from(v).map_err(|_| E::custom(format!("id {} out of range", v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
        if v.is_finite() && v.fract() == 0.0 {
            Ok(v as i64)
        } else {
            Err(E::invalid_value(de::Unexpected::Float(v), &self))
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
        v.trim()
            .parse()
            .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
