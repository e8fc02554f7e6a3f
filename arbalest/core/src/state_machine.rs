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

//! A simple state machine with asynchronous change notification.
//!
//! Listeners are dispatched on a caller-supplied runtime handle, one task
//! per listener, so a state transition never runs listener code under the
//! lock of the component driving the transition.

use std::fmt::Debug;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;
use tokio::runtime::Handle;

/// Tracks the current value of a state enum and notifies listeners on
/// every transition.
pub struct StateMachine<S> {
    /// Name of the owning component, for logging.
    name: String,
    executor: Handle,
    state: Mutex<S>,
    listeners: Mutex<Vec<Arc<dyn Fn(S) + Send + Sync>>>,
}

impl<S> StateMachine<S>
where
    S: Copy + PartialEq + Debug + Send + 'static,
{
    /// Creates a state machine in the given initial state. Listeners fire
    /// on the supplied executor.
    pub fn new(name: impl Into<String>, executor: Handle, initial_state: S) -> Self {
        Self {
            name: name.into(),
            executor,
            state: Mutex::new(initial_state),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Returns the current state.
    pub fn get(&self) -> S {
        *self.state.lock()
    }

    /// Sets the state and returns the previous value. Listeners are
    /// notified only if the state actually changed.
    pub fn set(&self, new_state: S) -> S {
        let old_state = {
            let mut state = self.state.lock();
            std::mem::replace(&mut *state, new_state)
        };
        if old_state != new_state {
            debug!("{} transitioned from {old_state:?} to {new_state:?}", self.name);
            self.fire_state_changed(new_state);
        }
        old_state
    }

    /// Transitions to `new_state` only if the current state equals
    /// `expected_state`. Returns whether the transition happened.
    pub fn compare_and_set(&self, expected_state: S, new_state: S) -> bool {
        {
            let mut state = self.state.lock();
            if *state != expected_state || *state == new_state {
                return false;
            }
            *state = new_state;
        }
        debug!(
            "{} transitioned from {expected_state:?} to {new_state:?}",
            self.name
        );
        self.fire_state_changed(new_state);
        true
    }

    /// Registers a listener invoked with the new state on every future
    /// transition. A listener may observe the same state more than once if
    /// transitions race with its dispatch.
    pub fn add_state_change_listener(
        &self,
        listener: impl Fn(S) + Send + Sync + 'static,
    ) {
        self.listeners.lock().push(Arc::new(listener));
    }

    fn fire_state_changed(&self, new_state: S) {
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            self.executor.spawn(async move { listener(new_state) });
        }
    }
}

impl<S: Debug> Debug for StateMachine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("name", &self.name)
            .field("state", &*self.state.lock())
            .finish()
    }
}
