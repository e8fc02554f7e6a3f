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

//! Lifecycle states of the task output buffer.

use std::fmt;

/// Lifecycle state of a [`TaskOutputBuffer`](super::TaskOutputBuffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Additional output buffers and pages can be added.
    /// Any next state is allowed.
    Open,
    /// No more output buffers can be added.
    /// Next state is [`BufferState::Flushing`].
    NoMoreBuffers,
    /// No more pages can be added.
    /// Next state is [`BufferState::Flushing`].
    NoMorePages,
    /// No more pages or output buffers can be added, and the buffer is
    /// waiting for the final pages to be consumed.
    /// Next state is [`BufferState::Finished`].
    Flushing,
    /// No more output buffers can be added and all pages have been
    /// consumed. This is the terminal state.
    Finished,
}

impl BufferState {
    /// Whether new pages may be admitted in this state.
    pub fn can_add_pages(&self) -> bool {
        matches!(self, BufferState::Open | BufferState::NoMoreBuffers)
    }

    /// Whether new output buffers may be registered in this state.
    pub fn can_add_buffers(&self) -> bool {
        matches!(self, BufferState::Open | BufferState::NoMorePages)
    }
}

impl fmt::Display for BufferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BufferState::Open => "OPEN",
            BufferState::NoMoreBuffers => "NO_MORE_BUFFERS",
            BufferState::NoMorePages => "NO_MORE_PAGES",
            BufferState::Flushing => "FLUSHING",
            BufferState::Finished => "FINISHED",
        };
        write!(f, "{name}")
    }
}
