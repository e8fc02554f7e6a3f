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

//! Pages exchanged between task stages.

use datafusion::arrow::record_batch::RecordBatch;

/// An immutable unit of transfer between task stages: one record batch
/// plus its in-memory byte size.
///
/// The output buffer accounts for pages by this size but never looks at
/// the batch contents. Cloning is cheap; the underlying arrays are
/// reference counted.
#[derive(Debug, Clone)]
pub struct Page {
    batch: RecordBatch,
    size: usize,
}

impl Page {
    /// Wraps a record batch, capturing its array memory size.
    pub fn new(batch: RecordBatch) -> Self {
        let size = batch.get_array_memory_size();
        Self { batch, size }
    }

    /// The byte size this page is accounted at.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The number of rows in this page.
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// The wrapped record batch.
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Consumes the page, returning the record batch.
    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::array::Int32Array;
    use datafusion::arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    #[test]
    fn test_page_size_matches_batch() {
        let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Int32, false)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Int32Array::from(vec![1, 2, 3]))],
        )
        .unwrap();
        let expected = batch.get_array_memory_size();

        let page = Page::new(batch);
        assert_eq!(page.size(), expected);
        assert_eq!(page.num_rows(), 3);
    }
}
