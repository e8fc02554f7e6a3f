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

//! The buffer behind a task's output: a bounded master queue of pages
//! served to named consumers that acknowledge by sequence id.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use datafusion::physical_plan::Partitioning;
use futures::future;
use futures::FutureExt;
use log::debug;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::config::OutputBufferConfig;
use crate::error::{ArbalestError, Result};
use crate::output_buffer::{
    BufferInfo, BufferResult, BufferResultFuture, BufferState, EnqueueFuture,
    OutputBufferInfo, OutputBuffers, Page,
};
use crate::state_machine::StateMachine;

/// The shuffle output buffer owned by one task.
///
/// A single producer enqueues pages; each named output buffer is an
/// independent consumer cursor over the same ordered page stream. Pages
/// are retained from sequence 0 until the consumer set is frozen, after
/// which the head of the queue advances past the minimum acknowledged
/// sequence id across all consumers. Once the byte budget is full,
/// further pages wait in an overflow queue and the producer is handed a
/// future that resolves when its page is admitted.
///
/// All coupled state is guarded by one lock. Acknowledgement cursors and
/// page counters are additionally published as atomics so [`Self::info`]
/// can report without touching the lock.
pub struct TaskOutputBuffer {
    task_id: String,
    max_buffered_bytes: usize,
    state: StateMachine<BufferState>,
    inner: Mutex<BufferInner>,
    named_buffers: DashMap<String, Arc<NamedBuffer>>,
    master_sequence_id: AtomicU64,
    pages_added: AtomicU64,
    queued_page_count: AtomicUsize,
}

struct BufferInner {
    output_buffers: OutputBuffers,
    master_buffer: VecDeque<Page>,
    buffered_bytes: usize,
    queued_pages: VecDeque<QueuedPage>,
    aborted_buffers: HashSet<String>,
    pending_reads: Vec<PendingRead>,
}

impl TaskOutputBuffer {
    /// Creates an open buffer for the given task with the given byte
    /// budget. Listeners registered through
    /// [`Self::add_state_change_listener`] run on `executor`.
    pub fn try_new(
        task_id: impl Into<String>,
        executor: Handle,
        max_buffered_bytes: usize,
    ) -> Result<Self> {
        if max_buffered_bytes == 0 {
            return Err(ArbalestError::InvalidArgument(
                "max_buffered_bytes must be at least 1".to_string(),
            ));
        }
        let task_id = task_id.into();
        let state = StateMachine::new(
            format!("{task_id}-output-buffer"),
            executor,
            BufferState::Open,
        );
        Ok(Self {
            task_id,
            max_buffered_bytes,
            state,
            inner: Mutex::new(BufferInner {
                output_buffers: OutputBuffers::initial(),
                master_buffer: VecDeque::new(),
                buffered_bytes: 0,
                queued_pages: VecDeque::new(),
                aborted_buffers: HashSet::new(),
                pending_reads: Vec::new(),
            }),
            named_buffers: DashMap::new(),
            master_sequence_id: AtomicU64::new(0),
            pages_added: AtomicU64::new(0),
            queued_page_count: AtomicUsize::new(0),
        })
    }

    /// Creates a buffer from an [`OutputBufferConfig`].
    pub fn try_with_config(
        task_id: impl Into<String>,
        executor: Handle,
        config: &OutputBufferConfig,
    ) -> Result<Self> {
        Self::try_new(task_id, executor, config.max_buffered_bytes)
    }

    /// The id of the task this buffer belongs to.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BufferState {
        self.state.get()
    }

    pub fn is_finished(&self) -> bool {
        self.state.get() == BufferState::Finished
    }

    /// Registers a listener invoked with the new state on every future
    /// transition, on the buffer's executor.
    pub fn add_state_change_listener(
        &self,
        listener: impl Fn(BufferState) + Send + Sync + 'static,
    ) {
        self.state.add_state_change_listener(listener);
    }

    /// Snapshot for status reporting, built from published atomics so
    /// polling never contends with the data path.
    pub fn info(&self) -> OutputBufferInfo {
        let pages_added = self.pages_added.load(Ordering::SeqCst);
        let queued_pages = self.queued_page_count.load(Ordering::SeqCst);
        let buffers: Vec<BufferInfo> = self
            .named_buffers
            .iter()
            .map(|entry| entry.value().info(pages_added, queued_pages))
            .collect();
        OutputBufferInfo::new(
            self.state.get(),
            self.master_sequence_id.load(Ordering::SeqCst),
            pages_added,
            buffers,
        )
    }

    /// Applies a new consumer-set snapshot, registering any output buffer
    /// ids not seen before.
    ///
    /// Stale or replayed descriptors (version not above the current one)
    /// and descriptors arriving after the buffer finished are ignored.
    /// A descriptor that drops an existing id or un-sets a sticky
    /// `no_more_buffer_ids` is rejected without mutating anything.
    pub fn set_output_buffers(&self, new_output_buffers: OutputBuffers) -> Result<()> {
        let mut inner = self.inner.lock();

        let state = self.state.get();
        if state == BufferState::Finished
            || inner.output_buffers.version() >= new_output_buffers.version()
        {
            debug!(
                "task {}: ignoring output buffers version {}",
                self.task_id,
                new_output_buffers.version()
            );
            return Ok(());
        }

        for buffer_id in inner.output_buffers.buffers().keys() {
            if !new_output_buffers.contains(buffer_id) {
                return Err(ArbalestError::InvalidState(format!(
                    "output buffers version {} does not have existing buffer {buffer_id}",
                    new_output_buffers.version()
                )));
            }
        }
        if inner.output_buffers.is_no_more_buffer_ids()
            && !new_output_buffers.is_no_more_buffer_ids()
        {
            return Err(ArbalestError::InvalidState(
                "expected no_more_buffer_ids to remain set".to_string(),
            ));
        }
        let new_ids: Vec<(String, Partitioning)> = new_output_buffers
            .buffers()
            .iter()
            .filter(|(buffer_id, _)| !self.named_buffers.contains_key(*buffer_id))
            .map(|(buffer_id, partitioning)| (buffer_id.clone(), partitioning.clone()))
            .collect();
        if !new_ids.is_empty() && !state.can_add_buffers() {
            return Err(ArbalestError::InvalidState(format!(
                "cannot register new output buffers in state {state}"
            )));
        }

        inner.output_buffers = new_output_buffers;
        for (buffer_id, partitioning) in new_ids {
            let named_buffer = Arc::new(NamedBuffer::new(buffer_id.clone(), partitioning));
            // the abort may have arrived before the buffer was declared
            if inner.aborted_buffers.contains(&buffer_id) {
                named_buffer.abort();
            }
            self.named_buffers.insert(buffer_id, named_buffer);
        }

        if inner.output_buffers.is_no_more_buffer_ids() {
            self.state
                .compare_and_set(BufferState::Open, BufferState::NoMoreBuffers);
            self.state
                .compare_and_set(BufferState::NoMorePages, BufferState::Flushing);
        }

        self.update_state(&mut inner);
        Ok(())
    }

    /// Offers a page to the buffer.
    ///
    /// The returned future is already complete if the page was admitted
    /// or discarded; it resolves later if the page had to wait in the
    /// overflow queue. Pages arriving after page admission has ended are
    /// discarded quietly, which is legitimate under a limit or cancel
    /// upstream.
    pub fn enqueue(&self, page: Page) -> EnqueueFuture {
        let mut inner = self.inner.lock();

        if !self.state.get().can_add_pages() {
            return future::ready(()).boxed();
        }

        if inner.buffered_bytes < self.max_buffered_bytes {
            self.add_page(&mut inner, page);
            return future::ready(()).boxed();
        }

        let (admitted, admission) = oneshot::channel();
        inner.queued_pages.push_back(QueuedPage { page, admitted });
        self.queued_page_count
            .store(inner.queued_pages.len(), Ordering::SeqCst);
        self.update_state(&mut inner);
        admission.map(|_| ()).boxed()
    }

    /// Reads a bounded batch of pages for one output buffer, starting at
    /// `starting_sequence_id`.
    ///
    /// A `starting_sequence_id` above the consumer's cursor acknowledges
    /// every page below it; one below the cursor gets an empty, non-closed
    /// reply. The future resolves once pages are available or the output
    /// buffer is known to be closed.
    pub fn get(
        &self,
        output_id: &str,
        starting_sequence_id: u64,
        max_bytes: usize,
    ) -> Result<BufferResultFuture> {
        if max_bytes == 0 {
            return Err(ArbalestError::InvalidArgument(
                "max_bytes must be at least 1 byte".to_string(),
            ));
        }

        let mut inner = self.inner.lock();

        // once the consumer set is frozen, a request for an unknown buffer
        // gets a closed empty result; this can happen with limit queries
        if !self.state.get().can_add_buffers()
            && !self.named_buffers.contains_key(output_id)
        {
            return Ok(future::ready(Ok(BufferResult::empty(0, true))).boxed());
        }

        let (sender, receiver) = oneshot::channel();
        inner.pending_reads.push(PendingRead {
            output_id: output_id.to_string(),
            starting_sequence_id,
            max_bytes,
            sender,
        });
        self.update_state(&mut inner);

        Ok(receiver
            .map(|result| {
                result.map_err(|_| {
                    ArbalestError::Internal(
                        "output buffer dropped before read completed".to_string(),
                    )
                })
            })
            .boxed())
    }

    /// Closes one output buffer. Safe to call before the buffer has been
    /// declared; the id is remembered and applied at registration.
    pub fn abort(&self, output_id: &str) {
        let mut inner = self.inner.lock();

        inner.aborted_buffers.insert(output_id.to_string());
        if let Some(entry) = self.named_buffers.get(output_id) {
            entry.value().abort();
        }

        self.update_state(&mut inner);
    }

    /// Declares the end of the page stream.
    pub fn set_no_more_pages(&self) {
        let mut inner = self.inner.lock();
        if self
            .state
            .compare_and_set(BufferState::Open, BufferState::NoMorePages)
            || self
                .state
                .compare_and_set(BufferState::NoMoreBuffers, BufferState::Flushing)
        {
            self.update_state(&mut inner);
        }
    }

    /// Destroys the buffer, discarding all pages. Every waiting producer
    /// and reader is released. Idempotent.
    pub fn destroy(&self) {
        let mut inner = self.inner.lock();
        self.destroy_locked(&mut inner);
    }

    fn add_page(&self, inner: &mut BufferInner, page: Page) {
        inner.buffered_bytes += page.size();
        inner.master_buffer.push_back(page);
        self.pages_added.fetch_add(1, Ordering::SeqCst);

        self.process_pending_reads(inner);
    }

    /// Re-derives everything that can change after a mutation: releases
    /// parked readers, drops acknowledged pages, refills from the
    /// overflow queue, and finally checks for flush completion. Runs
    /// under the buffer lock.
    fn update_state(&self, inner: &mut BufferInner) {
        self.process_pending_reads(inner);

        let state = self.state.get();
        if state != BufferState::Finished {
            if !state.can_add_pages() {
                // overflow pages never became part of the stream; release
                // their producers
                for queued in inner.queued_pages.drain(..) {
                    let _ = queued.admitted.send(());
                }
                self.queued_page_count.store(0, Ordering::SeqCst);
            }

            // until the consumer set is frozen a not-yet-registered
            // consumer may still need the stream from sequence 0, so the
            // head must not move
            if !state.can_add_buffers() && !self.named_buffers.is_empty() {
                let old_master_sequence_id =
                    self.master_sequence_id.load(Ordering::SeqCst);
                let new_master_sequence_id = self
                    .named_buffers
                    .iter()
                    .map(|entry| entry.value().acknowledged_sequence_id())
                    .min()
                    .unwrap_or(old_master_sequence_id);
                assert!(
                    new_master_sequence_id >= old_master_sequence_id,
                    "master sequence id moved backwards: old {old_master_sequence_id}, new {new_master_sequence_id}"
                );
                self.master_sequence_id
                    .store(new_master_sequence_id, Ordering::SeqCst);

                for _ in old_master_sequence_id..new_master_sequence_id {
                    let page = inner
                        .master_buffer
                        .pop_front()
                        .expect("master buffer shorter than acknowledged range");
                    inner.buffered_bytes -= page.size();
                }

                while inner.buffered_bytes < self.max_buffered_bytes {
                    let Some(QueuedPage { page, admitted }) =
                        inner.queued_pages.pop_front()
                    else {
                        break;
                    };
                    self.add_page(inner, page);
                    let _ = admitted.send(());
                }
                self.queued_page_count
                    .store(inner.queued_pages.len(), Ordering::SeqCst);
            }

            if !state.can_add_pages() {
                let pages_added = self.pages_added.load(Ordering::SeqCst);
                for entry in self.named_buffers.iter() {
                    entry.value().check_completion(state, pages_added);
                }
            }
        }

        self.check_flush_complete(inner);
    }

    /// Re-evaluates parked reads in insertion order; a read leaves the
    /// registry exactly when its signal has been completed.
    fn process_pending_reads(&self, inner: &mut BufferInner) {
        let pending = std::mem::take(&mut inner.pending_reads);
        for read in pending {
            if let Some(read) = self.try_complete_read(read, inner) {
                inner.pending_reads.push(read);
            }
        }
    }

    fn try_complete_read(
        &self,
        read: PendingRead,
        inner: &BufferInner,
    ) -> Option<PendingRead> {
        let named_buffer = self
            .named_buffers
            .get(&read.output_id)
            .map(|entry| Arc::clone(entry.value()));

        // a read racing destroy resolves closed even if the output buffer
        // was never registered
        if self.state.get() == BufferState::Finished {
            let sequence_id = named_buffer
                .map(|buffer| buffer.acknowledged_sequence_id())
                .unwrap_or(0);
            read.complete(BufferResult::empty(sequence_id, true));
            return None;
        }

        // not registered yet; wait for a descriptor that names it
        let Some(named_buffer) = named_buffer else {
            return Some(read);
        };

        // acknowledgements are monotone; replayed reads get an empty answer
        if read.starting_sequence_id < named_buffer.acknowledged_sequence_id() {
            let starting_sequence_id = read.starting_sequence_id;
            read.complete(BufferResult::empty(starting_sequence_id, false));
            return None;
        }

        named_buffer.acknowledge(read.starting_sequence_id);

        let pages_added = self.pages_added.load(Ordering::SeqCst);
        if named_buffer.check_completion(self.state.get(), pages_added) {
            let starting_sequence_id = read.starting_sequence_id;
            read.complete(BufferResult::empty(starting_sequence_id, true));
            return None;
        }

        let pages =
            self.collect_pages(inner, read.starting_sequence_id, read.max_bytes);
        if pages.is_empty() {
            return Some(read);
        }
        let starting_sequence_id = read.starting_sequence_id;
        read.complete(BufferResult::new(
            starting_sequence_id,
            pages,
            named_buffer.partitioning().clone(),
        ));
        None
    }

    /// Copies a contiguous run of pages starting at `sequence_id` whose
    /// cumulative size stays within `max_bytes`. The first page is always
    /// served, even when it alone exceeds the bound.
    fn collect_pages(
        &self,
        inner: &BufferInner,
        sequence_id: u64,
        max_bytes: usize,
    ) -> Vec<Page> {
        let master_sequence_id = self.master_sequence_id.load(Ordering::SeqCst);
        assert!(
            sequence_id >= master_sequence_id,
            "read at sequence {sequence_id} below master sequence {master_sequence_id}"
        );

        let mut offset = (sequence_id - master_sequence_id) as usize;
        let mut pages = Vec::new();
        let mut bytes = 0usize;
        while let Some(page) = inner.master_buffer.get(offset) {
            bytes += page.size();
            if !pages.is_empty() && bytes > max_bytes {
                break;
            }
            pages.push(page.clone());
            offset += 1;
        }
        pages
    }

    /// Invoked at the tail of each critical section. Never called from
    /// within consumer completion checks, so it cannot re-enter itself.
    fn check_flush_complete(&self, inner: &mut BufferInner) {
        if self.state.get() != BufferState::Flushing {
            return;
        }
        let pages_added = self.pages_added.load(Ordering::SeqCst);
        let all_finished = self.named_buffers.iter().all(|entry| {
            entry
                .value()
                .check_completion(BufferState::Flushing, pages_added)
        });
        if all_finished {
            self.destroy_locked(inner);
        }
    }

    fn destroy_locked(&self, inner: &mut BufferInner) {
        if self.state.set(BufferState::Finished) != BufferState::Finished {
            debug!("task {}: output buffer destroyed", self.task_id);
        }

        inner.master_buffer.clear();
        inner.buffered_bytes = 0;

        for queued in inner.queued_pages.drain(..) {
            let _ = queued.admitted.send(());
        }
        self.queued_page_count.store(0, Ordering::SeqCst);

        for entry in self.named_buffers.iter() {
            entry.value().abort();
        }

        self.process_pending_reads(inner);
    }
}

impl std::fmt::Debug for TaskOutputBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskOutputBuffer")
            .field("task_id", &self.task_id)
            .field("state", &self.state.get())
            .field("max_buffered_bytes", &self.max_buffered_bytes)
            .finish()
    }
}

/// One consumer's cursor over the master stream.
///
/// Mutated only under the buffer lock; the scalars are atomics so
/// `info()` can read them without it. Holds no reference back to the
/// buffer: parent state is passed in where needed.
struct NamedBuffer {
    buffer_id: String,
    partitioning: Partitioning,
    sequence_id: AtomicU64,
    finished: AtomicBool,
}

impl NamedBuffer {
    fn new(buffer_id: String, partitioning: Partitioning) -> Self {
        Self {
            buffer_id,
            partitioning,
            sequence_id: AtomicU64::new(0),
            finished: AtomicBool::new(false),
        }
    }

    fn partitioning(&self) -> &Partitioning {
        &self.partitioning
    }

    /// The next sequence id this consumer has not acknowledged.
    fn acknowledged_sequence_id(&self) -> u64 {
        self.sequence_id.load(Ordering::SeqCst)
    }

    fn acknowledge(&self, starting_sequence_id: u64) {
        if starting_sequence_id > self.sequence_id.load(Ordering::SeqCst) {
            self.sequence_id.store(starting_sequence_id, Ordering::SeqCst);
        }
    }

    fn abort(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }

    /// Flips the sticky finished flag once the stream has ended and this
    /// consumer has acknowledged everything. Returns the flag.
    fn check_completion(&self, state: BufferState, pages_added: u64) -> bool {
        if self.finished.load(Ordering::SeqCst) {
            return true;
        }
        if !state.can_add_pages()
            && self.sequence_id.load(Ordering::SeqCst) >= pages_added
        {
            self.finished.store(true, Ordering::SeqCst);
        }
        self.finished.load(Ordering::SeqCst)
    }

    fn info(&self, pages_added: u64, queued_pages: usize) -> BufferInfo {
        let sequence_id = self.sequence_id.load(Ordering::SeqCst);
        if self.finished.load(Ordering::SeqCst) {
            return BufferInfo::new(self.buffer_id.clone(), true, 0, sequence_id);
        }
        let buffered =
            (pages_added + queued_pages as u64).saturating_sub(sequence_id) as usize;
        BufferInfo::new(self.buffer_id.clone(), false, buffered, sequence_id)
    }
}

/// A page waiting for room in the master queue, paired with the signal
/// that releases its producer.
struct QueuedPage {
    page: Page,
    admitted: oneshot::Sender<()>,
}

/// A consumer read that could not be answered yet.
struct PendingRead {
    output_id: String,
    starting_sequence_id: u64,
    max_bytes: usize,
    sender: oneshot::Sender<BufferResult>,
}

impl PendingRead {
    fn complete(self, result: BufferResult) {
        // the reader may have gone away; completions for dropped readers
        // are discarded
        let _ = self.sender.send(result);
    }
}
