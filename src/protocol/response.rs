use serde_json::Value;

use crate::constant::ResponseType;
use crate::error::{DbError, ErrorCode};
use crate::protocol::backtrace::Backtrace;

/// A classified server response for one token.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Terminal single datum (SUCCESS_ATOM, or the `true` synthesized for
    /// WAIT_COMPLETE).
    Single(Value),
    /// A batch of datums; `partial` means more batches follow once a
    /// CONTINUE is issued.
    Batch { partial: bool, datums: Vec<Value> },
    /// Terminal server-reported failure scoped to this token.
    Error(DbError),
}

impl Response {
    /// Everything except an intermediate batch ends the token's stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Batch { partial: true, .. })
    }
}

/// Map a decoded response payload to a typed [`Response`].
///
/// `term` is the originating query term, attached to errors so their
/// rendered form can point at the failing subterm.
pub fn classify(payload: Value, term: Option<&Value>) -> Response {
    let Some(object) = payload.as_object() else {
        return unexpected("response is not an object", term);
    };
    let Some(code) = object.get("t").and_then(Value::as_i64) else {
        return unexpected("response has no type", term);
    };
    let results = match object.get("r") {
        None => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(_) => return unexpected("response results are not an array", term),
    };
    // `p` (profile) is ignored.
    let bt = object.get("b");

    match ResponseType::from_code(code) {
        Some(ResponseType::SuccessAtom) => {
            let mut results = results.into_iter();
            match (results.next(), results.next()) {
                (Some(datum), None) => Response::Single(datum),
                _ => unexpected("atom response without exactly one datum", term),
            }
        }
        Some(ResponseType::SuccessSequence) => Response::Batch {
            partial: false,
            datums: results,
        },
        Some(ResponseType::SuccessPartial) => Response::Batch {
            partial: true,
            datums: results,
        },
        Some(ResponseType::WaitComplete) => Response::Single(Value::Bool(true)),
        Some(ResponseType::ClientError) => server_error(ErrorCode::BrokenClient, results, bt, term),
        Some(ResponseType::CompileError) => server_error(ErrorCode::BadQuery, results, bt, term),
        Some(ResponseType::RuntimeError) => server_error(ErrorCode::Runtime, results, bt, term),
        None => unexpected(format!("unknown response type {code}"), term),
    }
}

fn unexpected(message: impl Into<String>, term: Option<&Value>) -> Response {
    Response::Error(DbError {
        code: ErrorCode::UnexpectedResponse,
        message: message.into(),
        term: term.cloned(),
        backtrace: Backtrace::default(),
    })
}

fn server_error(code: ErrorCode, results: Vec<Value>, bt: Option<&Value>, term: Option<&Value>) -> Response {
    let Some(Value::String(message)) = results.into_iter().next() else {
        return unexpected("error response without a message", term);
    };
    Response::Error(DbError {
        code,
        message,
        term: term.cloned(),
        backtrace: Backtrace::parse(bt),
    })
}
