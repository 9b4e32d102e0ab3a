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

//! Broadcast nested loop join execution over Arrow record batches.
//!
//! The central operator is [`BroadcastNestedLoopJoinExec`]: one input (the
//! build side) is materialized exactly once per worker into an in-memory
//! table shared by all partition streams, the other input is streamed
//! batch by batch. Each streamed batch is cross joined against the build
//! table and optionally filtered by a residual predicate.
//!
//! Operators implement [`ExecutionPlan`], are partition aware, and produce
//! their output incrementally through [`SendableRecordBatchStream`]s.
//!
//! [`BroadcastNestedLoopJoinExec`]: joins::BroadcastNestedLoopJoinExec

use std::any::Any;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use arrow::datatypes::SchemaRef;

// reexport arrow so the assert macros can reference it
pub use arrow;

pub mod common;
pub mod error;
pub mod expressions;
pub mod joins;
pub mod memory;
pub mod memory_pool;
pub mod metrics;
pub mod runtime_env;
pub mod scalar;
pub mod stream;
pub mod task;

pub use crate::error::{Error, Result};
pub use crate::stream::{RecordBatchStream, SendableRecordBatchStream};
pub use crate::task::TaskContext;

use crate::expressions::PhysicalExpr;
use crate::metrics::MetricsSet;

/// `ExecutionPlan` represents a node in an executable physical plan.
///
/// Each `ExecutionPlan` is partition aware and is responsible for creating
/// the actual [`SendableRecordBatchStream`]s of [`RecordBatch`] that
/// incrementally compute the operator's output from its input partition.
///
/// [`RecordBatch`]: arrow::record_batch::RecordBatch
pub trait ExecutionPlan: Debug + DisplayAs + Send + Sync {
    /// Returns the execution plan as [`Any`] so that it can be
    /// downcast to a specific implementation.
    fn as_any(&self) -> &dyn Any;

    /// Get the schema for this execution plan
    fn schema(&self) -> SchemaRef;

    /// Specifies the output partitioning scheme of this plan
    fn output_partitioning(&self) -> Partitioning;

    /// Specifies the data distribution requirements for all the
    /// children for this operator, By default it's [[Distribution::UnspecifiedDistribution]] for each child,
    fn required_input_distribution(&self) -> Vec<Distribution> {
        vec![Distribution::UnspecifiedDistribution; self.children().len()]
    }

    /// Get a list of child execution plans that provide the input for this
    /// plan. The returned list will be empty for leaf nodes, will contain a
    /// single value for unary nodes, or two values for binary nodes (such
    /// as joins).
    fn children(&self) -> Vec<Arc<dyn ExecutionPlan>>;

    /// Returns a new plan where all children were replaced by new plans.
    fn with_new_children(
        self: Arc<Self>,
        children: Vec<Arc<dyn ExecutionPlan>>,
    ) -> Result<Arc<dyn ExecutionPlan>>;

    /// Begin execution of `partition`, returning a stream of
    /// [`RecordBatch`]es.
    ///
    /// [`RecordBatch`]: arrow::record_batch::RecordBatch
    fn execute(
        &self,
        partition: usize,
        context: Arc<TaskContext>,
    ) -> Result<SendableRecordBatchStream>;

    /// Return a snapshot of the set of [`Metric`]s for this
    /// [`ExecutionPlan`]. If no `Metric`s are available, return None.
    ///
    /// While the values of the metrics in the returned [`MetricsSet`]s may
    /// change as execution progresses, the specific metrics will not.
    ///
    /// [`Metric`]: crate::metrics::Metric
    fn metrics(&self) -> Option<MetricsSet> {
        None
    }
}

/// Partitioning schemes supported by operators.
#[derive(Debug, Clone)]
pub enum Partitioning {
    /// Allocate batches using a round-robin algorithm and the specified number of partitions
    RoundRobinBatch(usize),
    /// Allocate rows based on a hash of one of more expressions and the specified number
    /// of partitions
    Hash(Vec<Arc<dyn PhysicalExpr>>, usize),
    /// Unknown partitioning scheme with a known number of partitions
    UnknownPartitioning(usize),
}

impl Partitioning {
    /// Returns the number of partitions in this partitioning scheme
    pub fn partition_count(&self) -> usize {
        use Partitioning::*;
        match self {
            RoundRobinBatch(n) | Hash(_, n) | UnknownPartitioning(n) => *n,
        }
    }
}

/// How data is distributed amongst partitions. See [`Partitioning`] for more
/// details.
#[derive(Debug, Clone)]
pub enum Distribution {
    /// Unspecified distribution
    UnspecifiedDistribution,
    /// A single partition is required
    SinglePartition,
}

/// Options for controlling how each [`ExecutionPlan`] should format itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayFormatType {
    /// Default, compact format. Example: `FilterExec: c12 < 10.0`
    Default,
    /// Verbose, showing all available details
    Verbose,
}

/// Trait for types which could have additional details when formatted in
/// `Verbose` mode
pub trait DisplayAs {
    /// Format according to `DisplayFormatType`, used when verbose
    /// representation looks different from the default one
    fn fmt_as(&self, t: DisplayFormatType, f: &mut Formatter) -> fmt::Result;
}

/// Return a [`DisplayableExecutionPlan`] wrapper around an
/// [`ExecutionPlan`] which can be displayed in various easier to
/// understand ways.
pub fn displayable(plan: &dyn ExecutionPlan) -> DisplayableExecutionPlan<'_> {
    DisplayableExecutionPlan { inner: plan }
}

/// Wraps an `ExecutionPlan` with various methods for formatting
pub struct DisplayableExecutionPlan<'a> {
    inner: &'a dyn ExecutionPlan,
}

impl<'a> DisplayableExecutionPlan<'a> {
    /// Return a `format`able structure that produces a single line
    /// per node.
    ///
    /// ```text
    /// BroadcastNestedLoopJoinExec: join_type=Inner, build_side=left
    ///   MemoryExec: partitions=1, partition_sizes=[1]
    ///   MemoryExec: partitions=1, partition_sizes=[1]
    /// ```
    pub fn indent(&self) -> impl fmt::Display + 'a {
        struct Wrapper<'a> {
            plan: &'a dyn ExecutionPlan,
        }
        impl fmt::Display for Wrapper<'_> {
            fn fmt(&self, f: &mut Formatter) -> fmt::Result {
                fmt_plan(self.plan, 0, f)
            }
        }
        Wrapper { plan: self.inner }
    }

    /// Return a single line `format`able structure for the root of the plan
    pub fn one_line(&self) -> impl fmt::Display + 'a {
        struct Wrapper<'a> {
            plan: &'a dyn ExecutionPlan,
        }
        impl fmt::Display for Wrapper<'_> {
            fn fmt(&self, f: &mut Formatter) -> fmt::Result {
                self.plan.fmt_as(DisplayFormatType::Default, f)
            }
        }
        Wrapper { plan: self.inner }
    }
}

fn fmt_plan(plan: &dyn ExecutionPlan, indent: usize, f: &mut Formatter) -> fmt::Result {
    write!(f, "{:indent$}", "")?;
    plan.fmt_as(DisplayFormatType::Default, f)?;
    writeln!(f)?;
    for child in plan.children() {
        fmt_plan(child.as_ref(), indent + 2, f)?;
    }
    Ok(())
}
