//! NDJSON wire format: one JSON object per line, correlated by `id`.
//!
//! ```text
//! → {"id":"…","method":"query.execute","params":{"driver":…,"sql":…}}
//! ← {"id":"…","success":true,"result":{"columns":[…],"rows":[…]}}
//! ← {"id":"…","success":false,"error":{"code":"…","message":"…"}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{WorkerError, WorkerResult};

pub const EXECUTE: &str = "query.execute";

#[derive(Debug, Serialize)]
pub struct Request<'a, P> {
    pub id: &'a str,
    pub method: &'static str,
    pub params: P,
}

#[derive(Debug, Deserialize)]
pub struct Response {
    pub id: String,
    pub success: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Failure>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Failure {
    pub code: String,
    pub message: String,
}

impl Response {
    pub fn into_result(self) -> WorkerResult<Value> {
        if self.success {
            return Ok(self.result.unwrap_or(Value::Null));
        }
        Err(WorkerError::from_failure(self.error.unwrap_or_else(|| {
            Failure {
                code: "UNKNOWN".into(),
                message: "worker reported failure without details".into(),
            }
        })))
    }
}

/// Parameters of `query.execute`.
#[derive(Debug, Serialize)]
pub struct ExecuteParams<'a> {
    pub driver: &'a str,
    pub connection_string: &'a str,
    pub sql: &'a str,
    /// Values for `$1..$n`.
    #[serde(skip_serializing_if = "no_args")]
    pub args: &'a [Value],
    /// The worker stops reading after this many rows.
    pub max_rows: usize,
}

fn no_args(args: &&[Value]) -> bool {
    args.is_empty()
}

#[derive(Debug, Deserialize)]
pub struct ExecuteResult {
    pub columns: Vec<ResultColumn>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
pub struct ResultColumn {
    pub name: String,
    /// Backend type name, as the driver reports it.
    #[serde(default)]
    pub data_type: String,
}
