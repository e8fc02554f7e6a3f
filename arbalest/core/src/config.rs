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

//! Configuration for the task output buffer.

use crate::error::{ArbalestError, Result};

/// Configuration for a task's shuffle output buffer.
///
/// Controls how many bytes of produced pages may be held in memory before
/// the producer is backpressured.
#[derive(Debug, Clone)]
pub struct OutputBufferConfig {
    /// Byte budget for pages held in the buffer (default: 32MB)
    pub max_buffered_bytes: usize,
}

impl Default for OutputBufferConfig {
    fn default() -> Self {
        Self {
            max_buffered_bytes: 32 * 1024 * 1024, // 32 MB
        }
    }
}

impl OutputBufferConfig {
    /// Creates a new configuration with the specified byte budget.
    pub fn try_new(max_buffered_bytes: usize) -> Result<Self> {
        if max_buffered_bytes == 0 {
            return Err(ArbalestError::InvalidArgument(
                "max_buffered_bytes must be at least 1".to_string(),
            ));
        }
        Ok(Self { max_buffered_bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OutputBufferConfig::default();
        assert_eq!(config.max_buffered_bytes, 32 * 1024 * 1024);
    }

    #[test]
    fn test_zero_budget_rejected() {
        assert!(OutputBufferConfig::try_new(0).is_err());
        assert_eq!(OutputBufferConfig::try_new(1).unwrap().max_buffered_bytes, 1);
    }
}
