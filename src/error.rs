// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Error types for the broadcast join engine

use std::error;
use std::fmt::{Display, Formatter};
use std::result;
use std::sync::Arc;

use arrow::error::ArrowError;

use crate::joins::JoinType;

/// Result type for operations that could result in an [Error]
pub type Result<T, E = Error> = result::Result<T, E>;

/// Error type for operations that could result in an [Error] that is shared
/// across threads, e.g. the output of a shared build-side future
pub type SharedResult<T> = result::Result<T, Arc<Error>>;

/// A generic boxed error
pub type GenericError = Box<dyn error::Error + Send + Sync>;

/// Error type for this crate
#[derive(Debug)]
pub enum Error {
    /// Error returned by arrow.
    ArrowError(ArrowError),
    /// Error when a join type outside the inner-like family reaches the
    /// cross join processor. The planner is responsible for routing other
    /// join types to a different strategy; this is the defensive guard.
    UnsupportedJoinType(JoinType),
    /// The broadcast build input could not be materialized into a table,
    /// e.g. because a build batch did not match the build schema.
    BuildMaterialization(String),
    /// An execution entry point this engine does not support was invoked,
    /// such as executing a partition the plan does not have. Signals an
    /// integration bug in the caller, not a data error.
    InvalidExecutionPath(String),
    /// Error returned as a consequence of an error originally caught within
    /// this crate. Should always be accompanied by a backtrace or a
    /// reference to the original error in the message.
    Internal(String),
    /// This error happens whenever a plan is not valid.
    Plan(String),
    /// Error returned during execution of the query.
    Execution(String),
    /// This error is thrown when a consumer cannot acquire memory from the
    /// memory pool it is registered with.
    ResourcesExhausted(String),
    /// Errors originating from outside this crate's core codebase.
    External(GenericError),
}

impl From<ArrowError> for Error {
    fn from(e: ArrowError) -> Self {
        Error::ArrowError(e)
    }
}

impl From<GenericError> for Error {
    fn from(err: GenericError) -> Self {
        Error::External(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Error::ArrowError(desc) => write!(f, "Arrow error: {desc}"),
            Error::UnsupportedJoinType(join_type) => {
                write!(
                    f,
                    "Unsupported join type: broadcast nested loop join cannot execute {join_type} joins"
                )
            }
            Error::BuildMaterialization(desc) => {
                write!(f, "Build side materialization error: {desc}")
            }
            Error::InvalidExecutionPath(desc) => {
                write!(f, "Invalid execution path: {desc}")
            }
            Error::Internal(desc) => {
                write!(
                    f,
                    "Internal error: {desc}. This was likely caused by a bug in \
                     broadcast-join's code and we would welcome that you file an bug report \
                     in our issue tracker"
                )
            }
            Error::Plan(desc) => write!(f, "Error during planning: {desc}"),
            Error::Execution(desc) => write!(f, "Execution error: {desc}"),
            Error::ResourcesExhausted(desc) => {
                write!(f, "Resources exhausted: {desc}")
            }
            Error::External(desc) => write!(f, "External error: {desc}"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::ArrowError(e) => Some(e),
            Error::External(e) => Some(e.as_ref()),
            Error::UnsupportedJoinType(_)
            | Error::BuildMaterialization(_)
            | Error::InvalidExecutionPath(_)
            | Error::Internal(_)
            | Error::Plan(_)
            | Error::Execution(_)
            | Error::ResourcesExhausted(_) => None,
        }
    }
}

#[macro_export]
macro_rules! internal_err {
    ($($arg:tt)*) => {
        Err($crate::error::Error::Internal(format!($($arg)*)))
    };
}

#[macro_export]
macro_rules! plan_err {
    ($($arg:tt)*) => {
        Err($crate::error::Error::Plan(format!($($arg)*)))
    };
}

#[macro_export]
macro_rules! exec_err {
    ($($arg:tt)*) => {
        Err($crate::error::Error::Execution(format!($($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrow_error_to_error() {
        let res = return_error().unwrap_err();
        assert_eq!(
            res.to_string(),
            "Arrow error: Schema error: bar".to_string()
        );
    }

    #[test]
    fn error_to_arrow_error() {
        // Model what happens when implementing SendableRecordBatchStream:
        // engine code sometimes needs to surface an ArrowError
        let res: Error = ArrowError::SchemaError("foo".to_string()).into();
        assert!(matches!(res, Error::ArrowError(_)));
    }

    #[test]
    fn unsupported_join_type_display() {
        let err = Error::UnsupportedJoinType(JoinType::Full);
        assert_eq!(
            err.to_string(),
            "Unsupported join type: broadcast nested loop join cannot execute Full joins"
        );
    }

    #[test]
    fn internal_err_macro() {
        let err: Result<()> = internal_err!("{} metrics lost", 3);
        let msg = err.unwrap_err().to_string();
        assert!(msg.starts_with("Internal error: 3 metrics lost"));
        assert!(msg.contains("issue tracker"));
    }

    #[allow(clippy::try_err)]
    fn return_error() -> Result<()> {
        // Expect the '?' to work
        Err(ArrowError::SchemaError("bar".to_string()))?;
        Ok(())
    }
}
