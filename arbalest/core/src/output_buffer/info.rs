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

//! Observability snapshots of the output buffer.
//!
//! These are built from published atomics without taking the buffer lock,
//! so status reporting can never stall the data path. Values may be
//! mutually slightly stale.

use crate::output_buffer::BufferState;

/// Snapshot of one named output buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferInfo {
    buffer_id: String,
    finished: bool,
    buffered_pages: usize,
    acknowledged_sequence_id: u64,
}

impl BufferInfo {
    pub fn new(
        buffer_id: String,
        finished: bool,
        buffered_pages: usize,
        acknowledged_sequence_id: u64,
    ) -> Self {
        Self {
            buffer_id,
            finished,
            buffered_pages,
            acknowledged_sequence_id,
        }
    }

    pub fn buffer_id(&self) -> &str {
        &self.buffer_id
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Pages produced but not yet acknowledged by this consumer,
    /// including pages still waiting in the overflow queue.
    pub fn buffered_pages(&self) -> usize {
        self.buffered_pages
    }

    /// The next sequence id this consumer has not acknowledged.
    pub fn acknowledged_sequence_id(&self) -> u64 {
        self.acknowledged_sequence_id
    }
}

/// Snapshot of the whole output buffer.
#[derive(Debug, Clone)]
pub struct OutputBufferInfo {
    state: BufferState,
    master_sequence_id: u64,
    pages_added: u64,
    buffers: Vec<BufferInfo>,
}

impl OutputBufferInfo {
    pub fn new(
        state: BufferState,
        master_sequence_id: u64,
        pages_added: u64,
        buffers: Vec<BufferInfo>,
    ) -> Self {
        Self {
            state,
            master_sequence_id,
            pages_added,
            buffers,
        }
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    /// Sequence id of the current head of the master queue.
    pub fn master_sequence_id(&self) -> u64 {
        self.master_sequence_id
    }

    /// Total pages ever admitted to the master queue.
    pub fn pages_added(&self) -> u64 {
        self.pages_added
    }

    pub fn buffers(&self) -> &[BufferInfo] {
        &self.buffers
    }
}
