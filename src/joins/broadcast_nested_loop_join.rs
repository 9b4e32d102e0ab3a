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

//! Defines the broadcast nested loop join plan, which materializes one side
//! of the join once per worker and cross joins it against every batch of the
//! other side, optionally applying a residual filter to the result

use std::any::Any;
use std::sync::Arc;
use std::task::Poll;
use std::time::Instant;

use arrow::compute::{concat_batches, filter_record_batch};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use futures::{ready, Stream, StreamExt};
use log::debug;

use super::utils::{
    build_join_schema, cross_join_batch, BroadcastJoinMetrics, OnceAsync, OnceFut,
};
use crate::common::as_boolean_array;
use crate::error::{Error, Result};
use crate::expressions::PhysicalExpr;
use crate::joins::{JoinSide, JoinType};
use crate::memory_pool::{MemoryConsumer, MemoryReservation};
use crate::metrics::{ExecutionPlanMetricsSet, MetricsSet};
use crate::plan_err;
use crate::stream::{RecordBatchStream, SendableRecordBatchStream};
use crate::task::TaskContext;
use crate::{
    DisplayAs, DisplayFormatType, Distribution, ExecutionPlan, Partitioning,
};

/// Data of the materialized build side
struct BuildTable {
    /// The single merged batch shared read-only by every partition stream
    batch: RecordBatch,
    /// Reservation for the memory retained by `batch`, held until the last
    /// stream referencing this table is dropped
    _reservation: MemoryReservation,
}

/// Executes the streamed side in parallel partitions, pairing each of its
/// batches with the build side, which gets materialized in memory at most
/// once per worker and shared by all partitions.
///
/// The output column order is always the left side followed by the right
/// side; `build_side` only selects which child is materialized and which is
/// streamed. Only [`JoinType::Inner`] and [`JoinType::Cross`] can be
/// executed; the remaining join types can be planned (their output schema
/// resolves) but fail at execution time.
#[derive(Debug)]
pub struct BroadcastNestedLoopJoinExec {
    /// left side
    pub left: Arc<dyn ExecutionPlan>,
    /// right side
    pub right: Arc<dyn ExecutionPlan>,
    /// Residual filter applied to the cross joined batches
    filter: Option<Arc<dyn PhysicalExpr>>,
    /// How the join is performed
    join_type: JoinType,
    /// Side that is materialized and broadcast to every partition task
    build_side: JoinSide,
    /// Soft bound on produced batch sizes in bytes. Carried in the plan but
    /// not yet used to split output batches.
    target_batch_size: usize,
    /// The schema once the join is applied
    schema: SchemaRef,
    /// Build-side data
    build_fut: OnceAsync<BuildTable>,
    /// Execution plan metrics
    metrics: ExecutionPlanMetricsSet,
}

impl BroadcastNestedLoopJoinExec {
    /// Try to create a new [`BroadcastNestedLoopJoinExec`]
    pub fn try_new(
        left: Arc<dyn ExecutionPlan>,
        right: Arc<dyn ExecutionPlan>,
        filter: Option<Arc<dyn PhysicalExpr>>,
        join_type: JoinType,
        build_side: JoinSide,
        target_batch_size: usize,
    ) -> Result<Self> {
        if target_batch_size == 0 {
            return plan_err!("target_batch_size must be greater than 0");
        }

        let left_schema = left.schema();
        let right_schema = right.schema();
        let schema = Arc::new(build_join_schema(&left_schema, &right_schema, &join_type));

        Ok(BroadcastNestedLoopJoinExec {
            left,
            right,
            filter,
            join_type,
            build_side,
            target_batch_size,
            schema,
            build_fut: Default::default(),
            metrics: ExecutionPlanMetricsSet::new(),
        })
    }

    /// left side
    pub fn left(&self) -> &Arc<dyn ExecutionPlan> {
        &self.left
    }

    /// right side
    pub fn right(&self) -> &Arc<dyn ExecutionPlan> {
        &self.right
    }

    /// Residual filter applied after the cross product
    pub fn filter(&self) -> Option<&Arc<dyn PhysicalExpr>> {
        self.filter.as_ref()
    }

    /// How the join is performed
    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    /// Side that is materialized and shared by all partitions
    pub fn build_side(&self) -> JoinSide {
        self.build_side
    }

    /// Soft bound on produced batch sizes in bytes
    pub fn target_batch_size(&self) -> usize {
        self.target_batch_size
    }

    /// The child that is materialized in memory
    fn build_plan(&self) -> &Arc<dyn ExecutionPlan> {
        match self.build_side {
            JoinSide::Left => &self.left,
            JoinSide::Right => &self.right,
        }
    }

    /// The child that is consumed batch by batch
    fn streamed_plan(&self) -> &Arc<dyn ExecutionPlan> {
        match self.build_side {
            JoinSide::Left => &self.right,
            JoinSide::Right => &self.left,
        }
    }
}

/// Asynchronously collect the build side child into a single shared table
async fn load_build_input(
    build: Arc<dyn ExecutionPlan>,
    context: Arc<TaskContext>,
    metrics: BroadcastJoinMetrics,
    mut reservation: MemoryReservation,
) -> Result<BuildTable> {
    let build_timer = metrics.build_time.timer();
    let start = Instant::now();

    let schema = build.schema();
    let mut batches = Vec::new();
    // every partition of the build side belongs to the broadcast table
    for partition in 0..build.output_partitioning().partition_count() {
        let mut stream = build.execute(partition, context.clone())?;
        while let Some(batch) = stream.next().await {
            let batch = batch?;
            if batch.schema().fields() != schema.fields() {
                return Err(Error::BuildMaterialization(format!(
                    "broadcast batch schema {:?} does not match the build side schema {:?}",
                    batch.schema().fields(),
                    schema.fields()
                )));
            }
            // Reserve memory for incoming batch
            reservation.try_grow(batch.get_array_memory_size())?;
            metrics.build_input_batches.add(1);
            metrics.build_input_rows.add(batch.num_rows());
            batches.push(batch);
        }
    }

    let num_batches = batches.len();
    let merged_batch = concat_batches(&schema, &batches).map_err(|e| {
        Error::BuildMaterialization(format!(
            "could not merge broadcast batches into a single table: {e}"
        ))
    })?;
    drop(batches);

    // The merged batch is the copy that outlives this call; size the
    // reservation to its footprint and record it exactly once
    let merged_size = merged_batch.get_array_memory_size();
    reservation.try_resize(merged_size)?;
    metrics.build_data_size.add(merged_size);
    build_timer.done();

    debug!(
        "Built build-side of broadcast nested loop join containing {} rows in {} batches, took {} ms",
        merged_batch.num_rows(),
        num_batches,
        start.elapsed().as_millis()
    );

    Ok(BuildTable {
        batch: merged_batch,
        _reservation: reservation,
    })
}

impl DisplayAs for BroadcastNestedLoopJoinExec {
    fn fmt_as(
        &self,
        t: DisplayFormatType,
        f: &mut std::fmt::Formatter,
    ) -> std::fmt::Result {
        match t {
            DisplayFormatType::Default | DisplayFormatType::Verbose => {
                let display_filter = self
                    .filter
                    .as_ref()
                    .map_or_else(String::new, |f| format!(", filter={f}"));
                write!(
                    f,
                    "BroadcastNestedLoopJoinExec: join_type={:?}, build_side={}{}",
                    self.join_type, self.build_side, display_filter
                )
            }
        }
    }
}

impl ExecutionPlan for BroadcastNestedLoopJoinExec {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn output_partitioning(&self) -> Partitioning {
        Partitioning::UnknownPartitioning(
            self.streamed_plan().output_partitioning().partition_count(),
        )
    }

    fn required_input_distribution(&self) -> Vec<Distribution> {
        match self.build_side {
            JoinSide::Left => vec![
                Distribution::SinglePartition,
                Distribution::UnspecifiedDistribution,
            ],
            JoinSide::Right => vec![
                Distribution::UnspecifiedDistribution,
                Distribution::SinglePartition,
            ],
        }
    }

    fn children(&self) -> Vec<Arc<dyn ExecutionPlan>> {
        vec![self.left.clone(), self.right.clone()]
    }

    fn with_new_children(
        self: Arc<Self>,
        children: Vec<Arc<dyn ExecutionPlan>>,
    ) -> Result<Arc<dyn ExecutionPlan>> {
        Ok(Arc::new(BroadcastNestedLoopJoinExec::try_new(
            children[0].clone(),
            children[1].clone(),
            self.filter.clone(),
            self.join_type,
            self.build_side,
            self.target_batch_size,
        )?))
    }

    fn metrics(&self) -> Option<MetricsSet> {
        Some(self.metrics.clone_inner())
    }

    fn execute(
        &self,
        partition: usize,
        context: Arc<TaskContext>,
    ) -> Result<SendableRecordBatchStream> {
        // planning is expected to reject these upstream, re-assert anyway
        if !self.join_type.is_inner_like() {
            return Err(Error::UnsupportedJoinType(self.join_type));
        }

        let streamed = self.streamed_plan();
        let partition_count = streamed.output_partitioning().partition_count();
        if partition >= partition_count {
            return Err(Error::InvalidExecutionPath(format!(
                "BroadcastNestedLoopJoinExec was asked for partition {partition} \
                 but the streamed side only has {partition_count} partitions"
            )));
        }

        let stream = streamed.execute(partition, context.clone())?;

        let join_metrics = BroadcastJoinMetrics::new(partition, &self.metrics);

        // Initialization of operator-level reservation
        let reservation = MemoryConsumer::new("BroadcastNestedLoopJoinExec")
            .register(context.memory_pool());

        let build_fut = self.build_fut.once(|| {
            load_build_input(
                self.build_plan().clone(),
                context,
                join_metrics.clone(),
                reservation,
            )
        });

        Ok(Box::pin(BroadcastNestedLoopJoinStream {
            schema: self.schema.clone(),
            build_fut,
            streamed: stream,
            build_side: self.build_side,
            filter: self.filter.clone(),
            join_metrics,
        }))
    }
}

/// Cross joins a single streamed batch against the build table and applies
/// the residual filter, recording the per stage metrics
fn join_batch(
    batch: &RecordBatch,
    build_batch: &RecordBatch,
    build_side: JoinSide,
    filter: Option<&Arc<dyn PhysicalExpr>>,
    schema: &SchemaRef,
    join_metrics: &BroadcastJoinMetrics,
) -> Result<RecordBatch> {
    let join_timer = join_metrics.join_time.timer();
    // the build table drives the outer loop when it is the left side, so
    // the output columns always come out left then right
    let joined = match build_side {
        JoinSide::Left => cross_join_batch(build_batch, batch, schema)?,
        JoinSide::Right => cross_join_batch(batch, build_batch, schema)?,
    };
    join_timer.done();
    join_metrics.join_output_rows.add(joined.num_rows());

    match filter {
        Some(filter) => {
            let filter_timer = join_metrics.filter_time.timer();
            let mask = filter.evaluate(&joined)?.into_array(joined.num_rows());
            let filtered = filter_record_batch(&joined, as_boolean_array(&mask)?)?;
            filter_timer.done();
            join_metrics.output_batches.add(1);
            join_metrics.output_rows.add(filtered.num_rows());
            Ok(filtered)
        }
        None => {
            join_metrics.output_batches.add(1);
            join_metrics.output_rows.add(joined.num_rows());
            Ok(joined)
        }
    }
}

/// A stream that issues [RecordBatch]es as they arrive from the streamed
/// side of the join
struct BroadcastNestedLoopJoinStream {
    /// Input schema
    schema: SchemaRef,
    /// future for data from the build side
    build_fut: OnceFut<BuildTable>,
    /// the streamed side
    streamed: SendableRecordBatchStream,
    /// Side the build table sits on in the output
    build_side: JoinSide,
    /// Optional residual filter applied after the cross product
    filter: Option<Arc<dyn PhysicalExpr>>,
    /// join execution metrics
    join_metrics: BroadcastJoinMetrics,
}

impl RecordBatchStream for BroadcastNestedLoopJoinStream {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }
}

impl Stream for BroadcastNestedLoopJoinStream {
    type Item = Result<RecordBatch>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.poll_next_impl(cx)
    }
}

impl BroadcastNestedLoopJoinStream {
    /// Separate implementation function that unpins the
    /// [`BroadcastNestedLoopJoinStream`] so that partial borrows work correctly
    fn poll_next_impl(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Result<RecordBatch>>> {
        let build_table = match ready!(self.build_fut.get(cx)) {
            Ok(build_table) => build_table,
            Err(e) => return Poll::Ready(Some(Err(e))),
        };

        self.streamed
            .poll_next_unpin(cx)
            .map(|maybe_batch| match maybe_batch {
                Some(Ok(batch)) => {
                    self.join_metrics.input_batches.add(1);
                    self.join_metrics.input_rows.add(batch.num_rows());
                    let result = join_batch(
                        &batch,
                        &build_table.batch,
                        self.build_side,
                        self.filter.as_ref(),
                        &self.schema,
                        &self.join_metrics,
                    );
                    Some(result)
                }
                other => other,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common;
    use crate::expressions::{binary, col, lit, Operator};
    use crate::memory::MemoryExec;
    use crate::runtime_env::{RuntimeConfig, RuntimeEnv};
    use crate::test::{build_table_i32, build_table_scan_i32};
    use crate::{assert_batches_eq, assert_contains, displayable};

    use arrow::datatypes::{DataType, Field, Schema};

    async fn join_collect(
        left: Arc<dyn ExecutionPlan>,
        right: Arc<dyn ExecutionPlan>,
        filter: Option<Arc<dyn PhysicalExpr>>,
        build_side: JoinSide,
        context: Arc<TaskContext>,
    ) -> Result<(Vec<String>, Vec<RecordBatch>)> {
        let join = BroadcastNestedLoopJoinExec::try_new(
            left,
            right,
            filter,
            JoinType::Inner,
            build_side,
            8192,
        )?;
        let columns_header = columns(&join.schema());

        let stream = join.execute(0, context)?;
        let batches = common::collect(stream).await?;

        Ok((columns_header, batches))
    }

    #[tokio::test]
    async fn test_join_build_left() -> Result<()> {
        let task_ctx = Arc::new(TaskContext::default());

        let left = build_table_scan_i32(
            ("a1", &vec![1, 2, 3]),
            ("b1", &vec![4, 5, 6]),
            ("c1", &vec![7, 8, 9]),
        );
        let right = build_table_scan_i32(
            ("a2", &vec![10, 11]),
            ("b2", &vec![12, 13]),
            ("c2", &vec![14, 15]),
        );

        let (columns, batches) =
            join_collect(left, right, None, JoinSide::Left, task_ctx).await?;

        assert_eq!(columns, vec!["a1", "b1", "c1", "a2", "b2", "c2"]);
        // one output batch per streamed batch, build rows drive the outer loop
        assert_eq!(batches.len(), 1);
        let expected = [
            "+----+----+----+----+----+----+",
            "| a1 | b1 | c1 | a2 | b2 | c2 |",
            "+----+----+----+----+----+----+",
            "| 1  | 4  | 7  | 10 | 12 | 14 |",
            "| 1  | 4  | 7  | 11 | 13 | 15 |",
            "| 2  | 5  | 8  | 10 | 12 | 14 |",
            "| 2  | 5  | 8  | 11 | 13 | 15 |",
            "| 3  | 6  | 9  | 10 | 12 | 14 |",
            "| 3  | 6  | 9  | 11 | 13 | 15 |",
            "+----+----+----+----+----+----+",
        ];

        assert_batches_eq!(expected, &batches);

        Ok(())
    }

    #[tokio::test]
    async fn test_join_build_right() -> Result<()> {
        let task_ctx = Arc::new(TaskContext::default());

        let left = build_table_scan_i32(
            ("a1", &vec![1, 2]),
            ("b1", &vec![4, 5]),
            ("c1", &vec![7, 8]),
        );
        let right = build_table_scan_i32(
            ("a2", &vec![10, 11]),
            ("b2", &vec![12, 13]),
            ("c2", &vec![14, 15]),
        );

        let (columns, batches) =
            join_collect(left, right, None, JoinSide::Right, task_ctx).await?;

        // columns stay in left then right order, the streamed left side
        // drives the outer loop
        assert_eq!(columns, vec!["a1", "b1", "c1", "a2", "b2", "c2"]);
        let expected = [
            "+----+----+----+----+----+----+",
            "| a1 | b1 | c1 | a2 | b2 | c2 |",
            "+----+----+----+----+----+----+",
            "| 1  | 4  | 7  | 10 | 12 | 14 |",
            "| 1  | 4  | 7  | 11 | 13 | 15 |",
            "| 2  | 5  | 8  | 10 | 12 | 14 |",
            "| 2  | 5  | 8  | 11 | 13 | 15 |",
            "+----+----+----+----+----+----+",
        ];

        assert_batches_eq!(expected, &batches);

        Ok(())
    }

    #[tokio::test]
    async fn test_join_with_filter() -> Result<()> {
        let task_ctx = Arc::new(TaskContext::default());

        let left = build_table_scan_i32(
            ("a1", &vec![1, 2, 3]),
            ("b1", &vec![10, 20, 30]),
            ("c1", &vec![100, 200, 300]),
        );
        let right = build_table_scan_i32(
            ("a2", &vec![7]),
            ("b2", &vec![8]),
            ("c2", &vec![9]),
        );

        let join_schema =
            build_join_schema(&left.schema(), &right.schema(), &JoinType::Inner);
        let filter = binary(
            col("a1", &join_schema)?,
            Operator::Gt,
            lit(1),
        );

        let join = BroadcastNestedLoopJoinExec::try_new(
            left,
            right,
            Some(filter),
            JoinType::Inner,
            JoinSide::Left,
            8192,
        )?;

        let stream = join.execute(0, task_ctx)?;
        let batches = common::collect(stream).await?;

        let expected = [
            "+----+----+-----+----+----+----+",
            "| a1 | b1 | c1  | a2 | b2 | c2 |",
            "+----+----+-----+----+----+----+",
            "| 2  | 20 | 200 | 7  | 8  | 9  |",
            "| 3  | 30 | 300 | 7  | 8  | 9  |",
            "+----+----+-----+----+----+----+",
        ];
        assert_batches_eq!(expected, &batches);

        // the filter stage owns the output counters, the join counter is
        // recorded before filtering
        let metrics = join.metrics().unwrap();
        assert_eq!(metrics.output_rows().unwrap(), 2);
        assert_eq!(
            metrics.sum_by_name("output_batches").unwrap().as_usize(),
            1
        );
        assert_eq!(
            metrics.sum_by_name("join_output_rows").unwrap().as_usize(),
            3
        );
        assert!(metrics.sum_by_name("filter_time").unwrap().as_usize() > 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_unsupported_join_types() -> Result<()> {
        let task_ctx = Arc::new(TaskContext::default());

        for join_type in [
            JoinType::Left,
            JoinType::Right,
            JoinType::Full,
            JoinType::LeftSemi,
            JoinType::LeftAnti,
            JoinType::Existence,
        ] {
            let left = build_table_scan_i32(
                ("a1", &vec![1, 2]),
                ("b1", &vec![4, 5]),
                ("c1", &vec![7, 8]),
            );
            let right = build_table_scan_i32(
                ("a2", &vec![10]),
                ("b2", &vec![12]),
                ("c2", &vec![14]),
            );

            // planning succeeds, the output schema resolves for every type
            let join = BroadcastNestedLoopJoinExec::try_new(
                left,
                right,
                None,
                join_type,
                JoinSide::Left,
                8192,
            )?;

            let err = join.execute(0, task_ctx.clone()).unwrap_err();
            assert!(
                matches!(err, Error::UnsupportedJoinType(t) if t == join_type),
                "unexpected error for {join_type}: {err}"
            );
            assert_contains!(err.to_string(), "Unsupported join type");
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_empty_streamed_batch() -> Result<()> {
        let task_ctx = Arc::new(TaskContext::default());

        let left = build_table_scan_i32(
            ("a1", &vec![1, 2]),
            ("b1", &vec![4, 5]),
            ("c1", &vec![7, 8]),
        );
        let right_schema = Arc::new(Schema::new(vec![
            Field::new("a2", DataType::Int32, false),
            Field::new("b2", DataType::Int32, false),
            Field::new("c2", DataType::Int32, false),
        ]));
        let right_batch = RecordBatch::new_empty(right_schema.clone());
        let right: Arc<dyn ExecutionPlan> = Arc::new(MemoryExec::try_new(
            &[vec![right_batch]],
            right_schema,
            None,
        )?);

        let join = BroadcastNestedLoopJoinExec::try_new(
            left,
            right,
            None,
            JoinType::Inner,
            JoinSide::Left,
            8192,
        )?;
        let stream = join.execute(0, task_ctx)?;
        let batches = common::collect(stream).await?;

        // batch cardinality is one to one even when no rows are produced
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].num_rows(), 0);
        assert_eq!(batches[0].num_columns(), 6);

        let metrics = join.metrics().unwrap();
        assert_eq!(metrics.output_rows().unwrap(), 0);
        assert_eq!(
            metrics.sum_by_name("output_batches").unwrap().as_usize(),
            1
        );
        assert_eq!(
            metrics.sum_by_name("join_output_rows").unwrap().as_usize(),
            0
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_empty_build_side() -> Result<()> {
        let task_ctx = Arc::new(TaskContext::default());

        let left = build_table_scan_i32(
            ("a1", &vec![]),
            ("b1", &vec![]),
            ("c1", &vec![]),
        );
        let right_batch = build_table_i32(
            ("a2", &vec![10, 11]),
            ("b2", &vec![12, 13]),
            ("c2", &vec![14, 15]),
        );
        let right_schema = right_batch.schema();
        let right: Arc<dyn ExecutionPlan> = Arc::new(MemoryExec::try_new(
            &[vec![right_batch.clone(), right_batch]],
            right_schema,
            None,
        )?);

        let (_, batches) =
            join_collect(left, right, None, JoinSide::Left, task_ctx).await?;

        // an empty build table still produces one output batch per input batch
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].num_rows(), 0);
        assert_eq!(batches[1].num_rows(), 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_multi_batch_build_side() -> Result<()> {
        let task_ctx = Arc::new(TaskContext::default());

        let batch1 = build_table_i32(
            ("a1", &vec![1, 2]),
            ("b1", &vec![4, 5]),
            ("c1", &vec![7, 8]),
        );
        let batch2 = build_table_i32(
            ("a1", &vec![3]),
            ("b1", &vec![6]),
            ("c1", &vec![9]),
        );
        let left_schema = batch1.schema();
        // two partitions, both merged into the build table
        let left: Arc<dyn ExecutionPlan> = Arc::new(MemoryExec::try_new(
            &[vec![batch1], vec![batch2]],
            left_schema,
            None,
        )?);
        let right = build_table_scan_i32(
            ("a2", &vec![10, 11]),
            ("b2", &vec![12, 13]),
            ("c2", &vec![14, 15]),
        );

        let join = BroadcastNestedLoopJoinExec::try_new(
            left,
            right,
            None,
            JoinType::Inner,
            JoinSide::Left,
            8192,
        )?;
        let stream = join.execute(0, task_ctx)?;
        let batches = common::collect(stream).await?;

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].num_rows(), 6);

        let metrics = join.metrics().unwrap();
        assert_eq!(
            metrics
                .sum_by_name("build_input_batches")
                .unwrap()
                .as_usize(),
            2
        );
        assert_eq!(
            metrics.sum_by_name("build_input_rows").unwrap().as_usize(),
            3
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_multi_partition_streamed_side() -> Result<()> {
        let task_ctx = Arc::new(TaskContext::default());

        let left = build_table_scan_i32(
            ("a1", &vec![1, 2]),
            ("b1", &vec![4, 5]),
            ("c1", &vec![7, 8]),
        );
        let part1 = build_table_i32(
            ("a2", &vec![10]),
            ("b2", &vec![12]),
            ("c2", &vec![14]),
        );
        let part2 = build_table_i32(
            ("a2", &vec![11]),
            ("b2", &vec![13]),
            ("c2", &vec![15]),
        );
        let right_schema = part1.schema();
        let right: Arc<dyn ExecutionPlan> = Arc::new(MemoryExec::try_new(
            &[vec![part1], vec![part2]],
            right_schema,
            None,
        )?);

        let join = BroadcastNestedLoopJoinExec::try_new(
            left,
            right,
            None,
            JoinType::Inner,
            JoinSide::Left,
            8192,
        )?;
        assert_eq!(join.output_partitioning().partition_count(), 2);

        let mut all_rows = 0;
        for partition in 0..2 {
            let stream = join.execute(partition, task_ctx.clone())?;
            let batches = common::collect(stream).await?;
            assert_eq!(batches.len(), 1);
            all_rows += batches[0].num_rows();
        }
        // each partition pairs its single streamed row with both build rows
        assert_eq!(all_rows, 4);

        Ok(())
    }

    #[tokio::test]
    async fn test_build_data_size_recorded_once() -> Result<()> {
        let task_ctx = Arc::new(TaskContext::default());

        let batch = build_table_i32(
            ("a1", &vec![1, 2, 3]),
            ("b1", &vec![4, 5, 6]),
            ("c1", &vec![7, 8, 9]),
        );
        let expected_size = concat_batches(&batch.schema(), &[batch.clone()])?
            .get_array_memory_size();
        let left_schema = batch.schema();
        let left: Arc<dyn ExecutionPlan> =
            Arc::new(MemoryExec::try_new(&[vec![batch]], left_schema, None)?);
        let right = build_table_scan_i32(
            ("a2", &vec![10, 11]),
            ("b2", &vec![12, 13]),
            ("c2", &vec![14, 15]),
        );

        let join = BroadcastNestedLoopJoinExec::try_new(
            left,
            right,
            None,
            JoinType::Inner,
            JoinSide::Left,
            8192,
        )?;
        let stream = join.execute(0, task_ctx)?;
        common::collect(stream).await?;

        let metrics = join.metrics().unwrap();
        assert_eq!(
            metrics.sum_by_name("build_data_size").unwrap().as_usize(),
            expected_size
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_build_side_schema_mismatch() -> Result<()> {
        let task_ctx = Arc::new(TaskContext::default());

        let batch = build_table_i32(
            ("a1", &vec![1, 2]),
            ("b1", &vec![4, 5]),
            ("c1", &vec![7, 8]),
        );
        // declared schema disagrees with the batches the scan produces
        let declared = Arc::new(Schema::new(vec![
            Field::new("a1", DataType::Int64, false),
            Field::new("b1", DataType::Int64, false),
            Field::new("c1", DataType::Int64, false),
        ]));
        let left: Arc<dyn ExecutionPlan> =
            Arc::new(MemoryExec::try_new(&[vec![batch]], declared, None)?);
        let right = build_table_scan_i32(
            ("a2", &vec![10]),
            ("b2", &vec![12]),
            ("c2", &vec![14]),
        );

        let err = join_collect(left, right, None, JoinSide::Left, task_ctx)
            .await
            .unwrap_err();
        assert_contains!(err.to_string(), "Build side materialization error");

        Ok(())
    }

    #[tokio::test]
    async fn test_overallocation() -> Result<()> {
        let runtime_config = RuntimeConfig::new().with_memory_limit(100, 1.0);
        let runtime = Arc::new(RuntimeEnv::new(runtime_config)?);
        let task_ctx = TaskContext::default().with_runtime(runtime);
        let task_ctx = Arc::new(task_ctx);

        let left = build_table_scan_i32(
            ("a1", &vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 0]),
            ("b1", &vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 0]),
            ("c1", &vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 0]),
        );
        let right = build_table_scan_i32(
            ("a2", &vec![10, 11]),
            ("b2", &vec![12, 13]),
            ("c2", &vec![14, 15]),
        );

        let err = join_collect(left, right, None, JoinSide::Left, task_ctx)
            .await
            .unwrap_err();

        assert_contains!(
            err.to_string(),
            "External error: Resources exhausted: Failed to allocate additional"
        );
        assert_contains!(err.to_string(), "BroadcastNestedLoopJoinExec");

        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_partition() -> Result<()> {
        let task_ctx = Arc::new(TaskContext::default());

        let left = build_table_scan_i32(
            ("a1", &vec![1]),
            ("b1", &vec![4]),
            ("c1", &vec![7]),
        );
        let right = build_table_scan_i32(
            ("a2", &vec![10]),
            ("b2", &vec![12]),
            ("c2", &vec![14]),
        );

        let join = BroadcastNestedLoopJoinExec::try_new(
            left,
            right,
            None,
            JoinType::Inner,
            JoinSide::Left,
            8192,
        )?;

        let err = join.execute(1, task_ctx).unwrap_err();
        assert!(matches!(err, Error::InvalidExecutionPath(_)));
        assert_contains!(err.to_string(), "Invalid execution path");

        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_target_batch_size() {
        let left = build_table_scan_i32(
            ("a1", &vec![1]),
            ("b1", &vec![4]),
            ("c1", &vec![7]),
        );
        let right = build_table_scan_i32(
            ("a2", &vec![10]),
            ("b2", &vec![12]),
            ("c2", &vec![14]),
        );

        let err = BroadcastNestedLoopJoinExec::try_new(
            left,
            right,
            None,
            JoinType::Inner,
            JoinSide::Left,
            0,
        )
        .unwrap_err();
        assert_contains!(
            err.to_string(),
            "target_batch_size must be greater than 0"
        );
    }

    #[test]
    fn test_display() -> Result<()> {
        let left = build_table_scan_i32(
            ("a1", &vec![1]),
            ("b1", &vec![4]),
            ("c1", &vec![7]),
        );
        let right = build_table_scan_i32(
            ("a2", &vec![10]),
            ("b2", &vec![12]),
            ("c2", &vec![14]),
        );

        let join_schema =
            build_join_schema(&left.schema(), &right.schema(), &JoinType::Inner);
        let filter = binary(col("a1", &join_schema)?, Operator::Gt, lit(1));

        let join = BroadcastNestedLoopJoinExec::try_new(
            left,
            right,
            Some(filter),
            JoinType::Inner,
            JoinSide::Left,
            8192,
        )?;

        assert_eq!(
            format!("{}", displayable(&join).one_line()),
            "BroadcastNestedLoopJoinExec: join_type=Inner, build_side=left, \
             filter=a1@0 > 1"
        );

        let indented = format!("{}", displayable(&join).indent());
        assert_contains!(indented.clone(), "BroadcastNestedLoopJoinExec");
        assert_contains!(indented, "MemoryExec: partitions=1");

        Ok(())
    }

    /// Returns the column names on the schema
    fn columns(schema: &Schema) -> Vec<String> {
        schema.fields().iter().map(|f| f.name().clone()).collect()
    }
}
