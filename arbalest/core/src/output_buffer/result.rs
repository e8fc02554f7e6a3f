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

//! Results returned to output buffer consumers.

use datafusion::physical_plan::Partitioning;
use futures::future::BoxFuture;

use crate::error::Result;
use crate::output_buffer::Page;

/// Future returned by `enqueue`; resolves when the page has been admitted
/// to the buffer or discarded during teardown.
pub type EnqueueFuture = BoxFuture<'static, ()>;

/// Future returned by `get`; resolves once the read can be answered.
pub type BufferResultFuture = BoxFuture<'static, Result<BufferResult>>;

/// One batch of pages served to a consumer.
///
/// The sequence range `[starting_sequence_id, ending_sequence_id)` covers
/// the returned pages. `buffer_closed` tells the consumer that no further
/// pages will ever be returned for this output buffer.
#[derive(Debug, Clone)]
pub struct BufferResult {
    starting_sequence_id: u64,
    ending_sequence_id: u64,
    buffer_closed: bool,
    pages: Vec<Page>,
    partitioning: Option<Partitioning>,
}

impl BufferResult {
    /// Creates a result carrying pages starting at the given sequence id.
    pub fn new(
        starting_sequence_id: u64,
        pages: Vec<Page>,
        partitioning: Partitioning,
    ) -> Self {
        let ending_sequence_id = starting_sequence_id + pages.len() as u64;
        Self {
            starting_sequence_id,
            ending_sequence_id,
            buffer_closed: false,
            pages,
            partitioning: Some(partitioning),
        }
    }

    /// Creates an empty result at the given sequence id.
    pub fn empty(starting_sequence_id: u64, buffer_closed: bool) -> Self {
        Self {
            starting_sequence_id,
            ending_sequence_id: starting_sequence_id,
            buffer_closed,
            pages: Vec::new(),
            partitioning: None,
        }
    }

    pub fn starting_sequence_id(&self) -> u64 {
        self.starting_sequence_id
    }

    pub fn ending_sequence_id(&self) -> u64 {
        self.ending_sequence_id
    }

    pub fn is_buffer_closed(&self) -> bool {
        self.buffer_closed
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// The partitioning hint of the output buffer this result came from.
    /// `None` for empty results produced before the buffer was registered.
    pub fn partitioning(&self) -> Option<&Partitioning> {
        self.partitioning.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::array::Int32Array;
    use datafusion::arrow::datatypes::{DataType, Field, Schema};
    use datafusion::arrow::record_batch::RecordBatch;
    use std::sync::Arc;

    fn test_page() -> Page {
        let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Int32, false)]));
        Page::new(
            RecordBatch::try_new(schema, vec![Arc::new(Int32Array::from(vec![7]))])
                .unwrap(),
        )
    }

    #[test]
    fn test_sequence_range() {
        let result = BufferResult::new(
            5,
            vec![test_page(), test_page()],
            Partitioning::UnknownPartitioning(1),
        );
        assert_eq!(result.starting_sequence_id(), 5);
        assert_eq!(result.ending_sequence_id(), 7);
        assert!(!result.is_buffer_closed());
        assert!(!result.is_empty());
        assert!(result.partitioning().is_some());
    }

    #[test]
    fn test_empty_result() {
        let result = BufferResult::empty(9, true);
        assert_eq!(result.starting_sequence_id(), 9);
        assert_eq!(result.ending_sequence_id(), 9);
        assert!(result.is_buffer_closed());
        assert!(result.is_empty());
        assert!(result.partitioning().is_none());
    }
}
