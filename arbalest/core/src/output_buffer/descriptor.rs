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

//! Versioned snapshots of a task's consumer set.

use std::collections::HashMap;

use datafusion::physical_plan::Partitioning;

/// A versioned snapshot of the output buffers a task must serve.
///
/// The coordinator publishes these as it discovers downstream consumers.
/// Snapshots are cumulative: the id set in version `v + 1` is a superset of
/// that in version `v`, and once `no_more_buffer_ids` is set it stays set.
/// Each id maps to a partitioning hint that the buffer stores and returns
/// verbatim with every result batch.
#[derive(Debug, Clone)]
pub struct OutputBuffers {
    version: u64,
    buffers: HashMap<String, Partitioning>,
    no_more_buffer_ids: bool,
}

impl OutputBuffers {
    /// The empty descriptor every buffer starts from. Real descriptors
    /// must carry a strictly greater version to be accepted.
    pub fn initial() -> Self {
        Self::new(0)
    }

    /// Creates an empty descriptor at the given version.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            buffers: HashMap::new(),
            no_more_buffer_ids: false,
        }
    }

    /// Adds an output buffer id with its partitioning hint.
    pub fn with_buffer(
        mut self,
        buffer_id: impl Into<String>,
        partitioning: Partitioning,
    ) -> Self {
        self.buffers.insert(buffer_id.into(), partitioning);
        self
    }

    /// Marks the consumer set complete.
    pub fn with_no_more_buffer_ids(mut self) -> Self {
        self.no_more_buffer_ids = true;
        self
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn buffers(&self) -> &HashMap<String, Partitioning> {
        &self.buffers
    }

    pub fn contains(&self, buffer_id: &str) -> bool {
        self.buffers.contains_key(buffer_id)
    }

    pub fn is_no_more_buffer_ids(&self) -> bool {
        self.no_more_buffer_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_descriptor_is_empty() {
        let initial = OutputBuffers::initial();
        assert_eq!(initial.version(), 0);
        assert!(initial.buffers().is_empty());
        assert!(!initial.is_no_more_buffer_ids());
    }

    #[test]
    fn test_builder() {
        let buffers = OutputBuffers::new(3)
            .with_buffer("a", Partitioning::UnknownPartitioning(1))
            .with_buffer("b", Partitioning::RoundRobinBatch(4))
            .with_no_more_buffer_ids();
        assert_eq!(buffers.version(), 3);
        assert!(buffers.contains("a"));
        assert!(buffers.contains("b"));
        assert!(!buffers.contains("c"));
        assert!(buffers.is_no_more_buffer_ids());
    }
}
