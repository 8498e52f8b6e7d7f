//! TaskName - タスク名のパースと検証
//!
//! タスク名はそれ自体が ID であり、ブローカー上では
//! `"<nature>/<process>/<product>"` という UTF-8 文字列として流れます。
//!
//! # 学習ポイント
//! - `FromStr` / `Display` による wire format との相互変換
//! - 不正な入力をエラー型で表現（panic しない）

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const SEPARATOR: char = '/';

/// The three fields of a task name, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Nature,
    Process,
    Product,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Field::Nature => "nature",
            Field::Process => "process",
            Field::Product => "product",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskNameError {
    #[error("expected 3 slash-separated fields, found {found}")]
    FieldCount { found: usize },

    #[error("the {field} field is empty")]
    EmptyField { field: Field },
}

/// A parsed task name.
///
/// A valid name has exactly three non-empty fields. Anything else is rejected
/// before a handler ever sees it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskName {
    nature: String,
    process: String,
    product: String,
}

impl TaskName {
    pub fn parse(name: &str) -> Result<Self, TaskNameError> {
        let fields: Vec<&str> = name.split(SEPARATOR).collect();
        let [nature, process, product] = fields.as_slice() else {
            return Err(TaskNameError::FieldCount {
                found: fields.len(),
            });
        };

        for (value, field) in [
            (nature, Field::Nature),
            (process, Field::Process),
            (product, Field::Product),
        ] {
            if value.is_empty() {
                return Err(TaskNameError::EmptyField { field });
            }
        }

        Ok(Self {
            nature: (*nature).to_owned(),
            process: (*process).to_owned(),
            product: (*product).to_owned(),
        })
    }

    pub fn nature(&self) -> &str {
        &self.nature
    }

    pub fn process(&self) -> &str {
        &self.process
    }

    pub fn product(&self) -> &str {
        &self.product
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.nature, self.process, self.product
        )
    }
}

impl FromStr for TaskName {
    type Err = TaskNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TaskName {
    type Error = TaskNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TaskName> for String {
    fn from(name: TaskName) -> Self {
        name.to_string()
    }
}
