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

//! Join related functionality shared between the join implementations

use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};

use arrow::array::UInt32Array;
use arrow::compute::take;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use futures::future::{BoxFuture, Shared};
use futures::{ready, FutureExt};
use parking_lot::Mutex;

use crate::error::{Error, Result, SharedResult};
use crate::exec_err;
use crate::joins::JoinType;
use crate::metrics::{self, ExecutionPlanMetricsSet, MetricBuilder};

/// Returns the output field given the input field. Outer joins may
/// insert nulls even if the input was not null
///
fn output_join_field(old_field: &Field, join_type: &JoinType, is_left: bool) -> Field {
    let force_nullable = match join_type {
        JoinType::Inner => false,
        JoinType::Cross => false,
        JoinType::Left => !is_left, // right input is padded with nulls
        JoinType::Right => is_left, // left input is padded with nulls
        JoinType::Full => true,     // both inputs can be padded with nulls
        JoinType::LeftSemi => false, // doesn't introduce nulls
        JoinType::LeftAnti => false, // doesn't introduce nulls
        JoinType::Existence => false, // doesn't introduce nulls
    };

    if force_nullable {
        old_field.clone().with_nullable(true)
    } else {
        old_field.clone()
    }
}

/// Creates a schema for a join operation.
/// The fields from the left side are first
pub fn build_join_schema(left: &Schema, right: &Schema, join_type: &JoinType) -> Schema {
    let fields: Vec<Field> = match join_type {
        JoinType::Inner
        | JoinType::Cross
        | JoinType::Left
        | JoinType::Right
        | JoinType::Full => {
            let left_fields = left
                .fields()
                .iter()
                .map(|f| output_join_field(f, join_type, true));
            let right_fields = right
                .fields()
                .iter()
                .map(|f| output_join_field(f, join_type, false));

            // left then right
            left_fields.chain(right_fields).collect()
        }
        JoinType::LeftSemi | JoinType::LeftAnti => left
            .fields()
            .iter()
            .map(|f| f.as_ref().clone())
            .collect(),
        JoinType::Existence => {
            // existence joins keep the left side and append a marker column
            let exists_field = Field::new("exists", DataType::Boolean, false);
            left.fields()
                .iter()
                .map(|f| f.as_ref().clone())
                .chain(std::iter::once(exists_field))
                .collect()
        }
    };

    Schema::new(fields)
}

/// Computes the cartesian product of `outer` and `inner` as a single batch
/// with the outer columns first.
///
/// Every outer row is paired with every inner row. The outer side drives
/// the iteration, so all pairs for outer row `i` precede those for outer
/// row `i + 1` in the output.
pub fn cross_join_batch(
    outer: &RecordBatch,
    inner: &RecordBatch,
    schema: &SchemaRef,
) -> Result<RecordBatch> {
    let outer_rows = outer.num_rows();
    let inner_rows = inner.num_rows();

    let num_rows = match outer_rows.checked_mul(inner_rows) {
        Some(num_rows) => num_rows,
        None => {
            return exec_err!(
                "Cross join of {outer_rows} x {inner_rows} rows overflows the row count"
            )
        }
    };
    if outer_rows > u32::MAX as usize || inner_rows > u32::MAX as usize {
        return exec_err!(
            "Cross join input of {} rows exceeds the supported row index range",
            outer_rows.max(inner_rows)
        );
    }

    if num_rows == 0 {
        return Ok(RecordBatch::new_empty(Arc::clone(schema)));
    }
    if schema.fields().is_empty() {
        let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
        let batch = RecordBatch::try_new_with_options(Arc::clone(schema), vec![], &options)?;
        return Ok(batch);
    }

    // Repeat each outer row once per inner row and tile the inner rows
    let outer_indices = UInt32Array::from_iter_values(
        (0..outer_rows as u32).flat_map(|o| std::iter::repeat(o).take(inner_rows)),
    );
    let inner_indices =
        UInt32Array::from_iter_values((0..outer_rows).flat_map(|_| 0..inner_rows as u32));

    let columns = outer
        .columns()
        .iter()
        .map(|column| take(column, &outer_indices, None))
        .chain(
            inner
                .columns()
                .iter()
                .map(|column| take(column, &inner_indices, None)),
        )
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(RecordBatch::try_new(Arc::clone(schema), columns)?)
}

/// Metrics for the broadcast nested loop join
#[derive(Clone, Debug)]
pub(crate) struct BroadcastJoinMetrics {
    /// Total time for collecting the build-side of the join
    pub(crate) build_time: metrics::Time,
    /// Number of batches consumed by the build-side
    pub(crate) build_input_batches: metrics::Count,
    /// Number of rows consumed by the build-side
    pub(crate) build_input_rows: metrics::Count,
    /// Memory retained by the build-side in bytes
    pub(crate) build_data_size: metrics::Gauge,
    /// Total time for joining streamed batches to the build-side
    pub(crate) join_time: metrics::Time,
    /// Total time for evaluating the residual filter
    pub(crate) filter_time: metrics::Time,
    /// Number of batches consumed by the streamed side of this operator
    pub(crate) input_batches: metrics::Count,
    /// Number of rows consumed by the streamed side of this operator
    pub(crate) input_rows: metrics::Count,
    /// Number of rows produced by the cross product, before filtering
    pub(crate) join_output_rows: metrics::Count,
    /// Number of batches produced by this operator
    pub(crate) output_batches: metrics::Count,
    /// Number of rows produced by this operator
    pub(crate) output_rows: metrics::Count,
}

impl BroadcastJoinMetrics {
    pub fn new(partition: usize, metrics: &ExecutionPlanMetricsSet) -> Self {
        let join_time = MetricBuilder::new(metrics).subset_time("join_time", partition);

        let build_time = MetricBuilder::new(metrics).subset_time("build_time", partition);

        let filter_time =
            MetricBuilder::new(metrics).subset_time("filter_time", partition);

        let build_input_batches =
            MetricBuilder::new(metrics).counter("build_input_batches", partition);

        let build_input_rows =
            MetricBuilder::new(metrics).counter("build_input_rows", partition);

        let build_data_size =
            MetricBuilder::new(metrics).gauge("build_data_size", partition);

        let input_batches =
            MetricBuilder::new(metrics).counter("input_batches", partition);

        let input_rows = MetricBuilder::new(metrics).counter("input_rows", partition);

        let join_output_rows =
            MetricBuilder::new(metrics).counter("join_output_rows", partition);

        let output_batches =
            MetricBuilder::new(metrics).counter("output_batches", partition);

        let output_rows = MetricBuilder::new(metrics).output_rows(partition);

        Self {
            build_time,
            build_input_batches,
            build_input_rows,
            build_data_size,
            join_time,
            filter_time,
            input_batches,
            input_rows,
            join_output_rows,
            output_batches,
            output_rows,
        }
    }
}

/// A [`OnceAsync`] can be used to run an async closure once, with subsequent calls
/// to [`OnceAsync::once`] returning a [`OnceFut`] to the same asynchronous computation
///
/// This is useful for joins where the results of one child are buffered in memory
/// and shared across potentially multiple output partitions
pub(crate) struct OnceAsync<T> {
    fut: Mutex<Option<OnceFut<T>>>,
}

impl<T> Default for OnceAsync<T> {
    fn default() -> Self {
        Self {
            fut: Mutex::new(None),
        }
    }
}

impl<T> std::fmt::Debug for OnceAsync<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OnceAsync")
    }
}

impl<T: 'static> OnceAsync<T> {
    /// If this is the first call to this function on this object, will invoke
    /// `f` to obtain a future and return a [`OnceFut`] referring to this
    ///
    /// If this is not the first call, will return a [`OnceFut`] referring
    /// to the same future as was returned by the first call
    pub(crate) fn once<F, Fut>(&self, f: F) -> OnceFut<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.fut
            .lock()
            .get_or_insert_with(|| OnceFut::new(f()))
            .clone()
    }
}

/// The shared future type used internally within [`OnceAsync`]
type OnceFutPending<T> = Shared<BoxFuture<'static, SharedResult<Arc<T>>>>;

/// A [`OnceFut`] represents a shared asynchronous computation, that will be evaluated
/// once for all [`Clone`]'s, with [`OnceFut::get`] providing a non-consuming interface
/// to drive the underlying [`Future`] to completion
pub(crate) struct OnceFut<T> {
    state: OnceFutState<T>,
}

impl<T> Clone for OnceFut<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

enum OnceFutState<T> {
    Pending(OnceFutPending<T>),
    Ready(SharedResult<Arc<T>>),
}

impl<T> Clone for OnceFutState<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Pending(p) => Self::Pending(p.clone()),
            Self::Ready(r) => Self::Ready(r.clone()),
        }
    }
}

impl<T: 'static> OnceFut<T> {
    /// Create a new [`OnceFut`] from a [`Future`]
    pub(crate) fn new<Fut>(fut: Fut) -> Self
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            state: OnceFutState::Pending(
                fut.map(|res| res.map(Arc::new).map_err(Arc::new))
                    .boxed()
                    .shared(),
            ),
        }
    }

    /// Get the result of the computation if it is ready, without consuming it
    pub(crate) fn get(&mut self, cx: &mut Context<'_>) -> Poll<Result<&T>> {
        if let OnceFutState::Pending(fut) = &mut self.state {
            let r = ready!(fut.poll_unpin(cx));
            self.state = OnceFutState::Ready(r);
        }

        // Cannot use loop as this would trip up the borrow checker
        match &self.state {
            OnceFutState::Pending(_) => unreachable!(),
            OnceFutState::Ready(r) => Poll::Ready(
                r.as_ref()
                    .map(|r| r.as_ref())
                    .map_err(|e| Error::External(Box::new(e.clone()))),
            ),
        }
    }
}
