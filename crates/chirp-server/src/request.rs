//! Request and response records
//!
//! Wire shape (JSON):
//!
//! ```text
//! request   {"command":"ADD","id":1,"body":"hi","timestamp":100}
//! status    {"Success":true,"Id":1}
//! feed      {"Id":3,"Feed":[{"body":"hi","timestamp":100}]}
//! ```
//!
//! Request field names are accepted lowercase or capitalised. Only
//! `command` is required; the rest default to zero / empty.

use crate::feed::Post;
use serde::{Deserialize, Serialize};

/// The operation a request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Command {
    Add,
    Remove,
    Contains,
    Feed,
    /// End of input; produces no response
    Done,
}

/// A decoded request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(alias = "Command")]
    pub command: Command,

    /// Correlation value echoed back in the response
    #[serde(default, alias = "ID", alias = "Id")]
    pub id: i64,

    /// Post text (ADD only)
    #[serde(default, alias = "Body")]
    pub body: String,

    /// Post key (ADD / REMOVE / CONTAINS)
    #[serde(default, alias = "Timestamp")]
    pub timestamp: f64,
}

impl Request {
    fn new(command: Command, id: i64, body: String, timestamp: f64) -> Self {
        Self { command, id, body, timestamp }
    }

    pub fn add(id: i64, body: impl Into<String>, timestamp: f64) -> Self {
        Self::new(Command::Add, id, body.into(), timestamp)
    }

    pub fn remove(id: i64, timestamp: f64) -> Self {
        Self::new(Command::Remove, id, String::new(), timestamp)
    }

    pub fn contains(id: i64, timestamp: f64) -> Self {
        Self::new(Command::Contains, id, String::new(), timestamp)
    }

    pub fn feed(id: i64) -> Self {
        Self::new(Command::Feed, id, String::new(), 0.0)
    }

    pub fn done() -> Self {
        Self::new(Command::Done, 0, String::new(), 0.0)
    }

    /// Check whether this is the end-of-input sentinel
    #[inline]
    pub fn is_done(&self) -> bool {
        self.command == Command::Done
    }
}

/// The reply to one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    /// ADD (always successful), REMOVE and CONTAINS
    Status {
        #[serde(rename = "Success")]
        success: bool,
        #[serde(rename = "Id")]
        id: i64,
    },
    /// FEED: every post at the instant of the read
    Feed {
        #[serde(rename = "Id")]
        id: i64,
        #[serde(rename = "Feed")]
        feed: Vec<Post>,
    },
}

impl Response {
    /// Correlation id of the request this answers
    pub fn id(&self) -> i64 {
        match self {
            Response::Status { id, .. } | Response::Feed { id, .. } => *id,
        }
    }
}
