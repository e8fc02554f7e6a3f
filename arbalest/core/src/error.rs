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

//! Arbalest error types

use std::{
    error::Error,
    fmt::{Display, Formatter},
    result,
};

/// Result type alias for Arbalest operations.
pub type Result<T> = result::Result<T, ArbalestError>;

/// Arbalest error types for the task runtime.
#[derive(Debug)]
pub enum ArbalestError {
    /// General error with a descriptive message.
    General(String),
    /// A caller passed an argument that violates the API contract.
    /// These indicate caller bugs and must not be retried.
    InvalidArgument(String),
    /// A request is not legal in the current lifecycle state. The
    /// component's state is left untouched.
    InvalidState(String),
    /// Internal error indicating a bug or unexpected state.
    Internal(String),
}

#[allow(clippy::from_over_into)]
impl<T> Into<Result<T>> for ArbalestError {
    fn into(self) -> Result<T> {
        Err(self)
    }
}

impl From<String> for ArbalestError {
    fn from(e: String) -> Self {
        ArbalestError::General(e)
    }
}

impl Display for ArbalestError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            ArbalestError::General(desc) => write!(f, "General error: {desc}"),
            ArbalestError::InvalidArgument(desc) => {
                write!(f, "Invalid argument: {desc}")
            }
            ArbalestError::InvalidState(desc) => write!(f, "Invalid state: {desc}"),
            ArbalestError::Internal(desc) => {
                write!(f, "Internal Arbalest error: {desc}")
            }
        }
    }
}

impl Error for ArbalestError {}
