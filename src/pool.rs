/*
 *  Copyright (C) 2025 Michael Bachmann
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU Affero General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU Affero General Public License for more details.
 *
 *  You should have received a copy of the GNU Affero General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Fixed-capacity, thread-safe frame pool with a non-blocking acquire.
//!
//! Generalizes the teacher's fixed-size `Box<[f32]>`/`Box<[u8]>` buffers
//! (`aes67-rs::buffer`) into a reusable pool of arbitrary pooled values.
//! Never grows past its construction-time capacity, matching `spec` §5's
//! "never grown after construction" requirement.

use crate::error::PoolError;
use std::sync::{Arc, Mutex};

/// A fixed-capacity pool. `acquire` never blocks: it returns `Err` on
/// exhaustion rather than growing or waiting.
pub struct FramePool<T> {
    capacity: usize,
    free: Mutex<Vec<T>>,
}

impl<T> FramePool<T> {
    /// Builds a pool pre-populated with `capacity` slots produced by `make`.
    pub fn new(capacity: usize, mut make: impl FnMut() -> T) -> Arc<Self> {
        let mut free = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            free.push(make());
        }
        Arc::new(FramePool {
            capacity,
            free: Mutex::new(free),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Non-blocking acquire. Returns `PoolError::Exhausted` if no slot is
    /// free.
    pub fn try_acquire(&self) -> Result<T, PoolError> {
        let mut free = self.free.lock().expect("pool mutex poisoned");
        free.pop().ok_or(PoolError::Exhausted {
            capacity: self.capacity,
        })
    }

    /// Returns a slot to the pool. Never grows the pool past `capacity`:
    /// excess returns (a caller bug) are dropped rather than retained.
    pub fn release(&self, value: T) {
        let mut free = self.free.lock().expect("pool mutex poisoned");
        if free.len() < self.capacity {
            free.push(value);
        }
    }

    pub fn available(&self) -> usize {
        self.free.lock().expect("pool mutex poisoned").len()
    }
}
