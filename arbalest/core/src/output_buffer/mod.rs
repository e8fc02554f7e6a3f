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

//! The task shuffle output buffer.
//!
//! A task produces pages into a single [`TaskOutputBuffer`]; remote
//! consumers pull from it through named output buffers, each with its own
//! acknowledgement cursor. The buffer holds pages in memory under a byte
//! budget, backpressures the producer with completion futures once the
//! budget is exhausted, and walks a five-state lifecycle that lets the task
//! be declared finished only after every consumer has acknowledged every
//! page.

mod buffer;
mod descriptor;
mod info;
mod page;
mod result;
mod state;

pub use buffer::TaskOutputBuffer;
pub use descriptor::OutputBuffers;
pub use info::{BufferInfo, OutputBufferInfo};
pub use page::Page;
pub use result::{BufferResult, BufferResultFuture, EnqueueFuture};
pub use state::BufferState;
