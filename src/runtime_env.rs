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

//! Execution [`RuntimeEnv`] environment that holds the state shared
//! during execution: the memory pool

use std::sync::Arc;

use crate::error::Result;
use crate::memory_pool::{GreedyMemoryPool, MemoryPool, UnboundedMemoryPool};

/// Execution runtime environment
#[derive(Debug)]
pub struct RuntimeEnv {
    /// Runtime memory management
    pub memory_pool: Arc<dyn MemoryPool>,
}

impl RuntimeEnv {
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let RuntimeConfig { memory_pool } = config;

        let memory_pool =
            memory_pool.unwrap_or_else(|| Arc::new(UnboundedMemoryPool::default()));

        Ok(Self { memory_pool })
    }
}

impl Default for RuntimeEnv {
    fn default() -> Self {
        Self {
            memory_pool: Arc::new(UnboundedMemoryPool::default()),
        }
    }
}

/// Execution runtime configuration
#[derive(Clone, Debug, Default)]
pub struct RuntimeConfig {
    /// Pool for memory allocation tracking, defaults to unbounded
    pub memory_pool: Option<Arc<dyn MemoryPool>>,
}

impl RuntimeConfig {
    /// New with default values
    pub fn new() -> Self {
        Default::default()
    }

    /// Customize the memory pool
    pub fn with_memory_pool(mut self, memory_pool: Arc<dyn MemoryPool>) -> Self {
        self.memory_pool = Some(memory_pool);
        self
    }

    /// Specify the total memory to use while running the query with a
    /// `memory_fraction` of the total usable, e.g. `0.9` keeps 10% in reserve
    pub fn with_memory_limit(self, max_memory: usize, memory_fraction: f64) -> Self {
        let pool_size = (max_memory as f64 * memory_fraction) as usize;
        self.with_memory_pool(Arc::new(GreedyMemoryPool::new(pool_size)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_runtime_is_unbounded() {
        let runtime = RuntimeEnv::default();
        assert_eq!(runtime.memory_pool.reserved(), 0);
    }

    #[test]
    fn memory_limit_builds_greedy_pool() {
        let config = RuntimeConfig::new().with_memory_limit(100, 0.5);
        let runtime = RuntimeEnv::new(config).unwrap();
        let mut reservation = crate::memory_pool::MemoryConsumer::new("test")
            .register(&runtime.memory_pool);
        assert!(reservation.try_grow(50).is_ok());
        assert!(reservation.try_grow(1).is_err());
    }
}
