//! Benchmark runner
//!
//! Executes one variant `warmup + iterations` times, strictly sequentially on
//! a single connection, and keeps the last `iterations` samples. Setup runs
//! before the first execution and teardown after the last, both outside
//! measurement.
//!
//! A failing execution aborts the run with [`RunAborted`], carrying every
//! measured sample collected so far. The runner never retries: a retry
//! would run against a warmer cache than the aborted attempt.

use chrono::Utc;
use querybench_core::{
    BenchError, EngineConnection, EngineError, ExecutionSample, HarnessConfig, Params,
    QueryVariant, Result, RunAborted, RunPhase, VariantTag,
};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Iteration counts and timeout for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Executions discarded before measurement
    pub warmup: usize,
    /// Executions measured
    pub iterations: usize,
    /// Per-execution timeout
    pub timeout: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from(&HarnessConfig::default())
    }
}

impl From<&HarnessConfig> for RunOptions {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            warmup: config.warmup_iterations,
            iterations: config.measured_iterations,
            timeout: config.per_execution_timeout(),
        }
    }
}

/// Measured samples of one completed run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    /// Variant name
    pub variant: String,
    /// Variant role
    pub tag: VariantTag,
    /// Warm-up executions discarded
    pub warmup: usize,
    /// Measured samples, in execution order
    pub samples: Vec<ExecutionSample>,
    /// Wall-clock time for the whole run, setup and teardown included
    pub elapsed: Duration,
}

/// Runs one variant at a time
#[derive(Debug, Clone, Default)]
pub struct BenchmarkRunner {
    options: RunOptions,
}

impl BenchmarkRunner {
    /// Runner with the given options
    pub fn new(options: RunOptions) -> Self {
        Self { options }
    }

    /// Current options
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Benchmark `variant` with `params` on `conn`.
    ///
    /// # Errors
    ///
    /// - `Config` if `params` does not match the variant's placeholders;
    ///   nothing is executed in that case
    /// - `RunAborted` if any setup, warm-up, measured or teardown statement
    ///   fails
    pub fn run(
        &self,
        conn: &mut dyn EngineConnection,
        variant: &QueryVariant,
        params: &Params,
    ) -> Result<RunRecord> {
        let expected = variant.param_count();
        if expected != params.len() {
            return Err(BenchError::config(format!(
                "variant '{}' has {} placeholders but {} parameters were bound",
                variant.name,
                expected,
                params.len()
            )));
        }

        let RunOptions {
            warmup,
            iterations,
            timeout,
        } = self.options;
        let start = Instant::now();
        info!(target: "querybench::run", variant = %variant.name, tag = %variant.tag, engine = conn.engine_name(), warmup, iterations, "Starting run");

        for stmt in &variant.setup {
            if let Err(e) = conn.execute(stmt, &[], timeout) {
                return Err(self.abort(conn, variant, RunPhase::Setup, 0, Vec::new(), e));
            }
        }

        let mut samples = Vec::with_capacity(iterations);
        for raw in 0..warmup + iterations {
            let phase = if raw < warmup {
                RunPhase::Warmup
            } else {
                RunPhase::Measured
            };
            let timestamp = Utc::now();
            let started = Instant::now();
            let result = conn.execute(&variant.sql, params.as_slice(), timeout);
            let elapsed = started.elapsed();

            let outcome = match result {
                Ok(outcome) => match timeout {
                    Some(limit) if elapsed > limit => Err(EngineError::timeout(format!(
                        "execution took {}ms, limit {}ms",
                        elapsed.as_millis(),
                        limit.as_millis()
                    ))),
                    _ => Ok(outcome),
                },
                Err(e) => Err(e),
            };
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => return Err(self.abort(conn, variant, phase, raw, samples, e)),
            };

            debug!(target: "querybench::run", variant = %variant.name, iteration = raw, phase = %phase, elapsed_us = elapsed.as_micros() as u64, logical_reads = outcome.stats.logical_reads, "Execution finished");
            if phase == RunPhase::Warmup {
                continue;
            }
            samples.push(ExecutionSample {
                iteration: raw,
                elapsed,
                engine_elapsed: outcome.stats.engine_elapsed,
                cpu_time: outcome.stats.cpu_time,
                logical_reads: outcome.stats.logical_reads,
                physical_reads: outcome.stats.physical_reads,
                rows: outcome.output.row_count(),
                timestamp,
            });
        }

        for stmt in &variant.teardown {
            if let Err(e) = conn.execute(stmt, &[], timeout) {
                let iteration = warmup + iterations;
                warn!(target: "querybench::run", variant = %variant.name, error = %e, "Teardown failed");
                return Err(RunAborted {
                    variant: variant.name.clone(),
                    phase: RunPhase::Teardown,
                    iteration,
                    samples,
                    source: e,
                }
                .into());
            }
        }

        let elapsed = start.elapsed();
        info!(target: "querybench::run", variant = %variant.name, samples = samples.len(), elapsed_ms = elapsed.as_millis() as u64, "Run finished");
        Ok(RunRecord {
            variant: variant.name.clone(),
            tag: variant.tag,
            warmup,
            samples,
            elapsed,
        })
    }

    /// Build the abort error, running teardown first unless the connection
    /// timed out (a timed-out connection is abandoned).
    fn abort(
        &self,
        conn: &mut dyn EngineConnection,
        variant: &QueryVariant,
        phase: RunPhase,
        iteration: usize,
        samples: Vec<ExecutionSample>,
        source: EngineError,
    ) -> BenchError {
        warn!(target: "querybench::run", variant = %variant.name, phase = %phase, iteration, samples = samples.len(), error = %source, "Run aborted");
        if !source.is_timeout() {
            for stmt in &variant.teardown {
                if let Err(e) = conn.execute(stmt, &[], self.options.timeout) {
                    warn!(target: "querybench::run", variant = %variant.name, error = %e, "Teardown after abort failed");
                    break;
                }
            }
        }
        RunAborted {
            variant: variant.name.clone(),
            phase,
            iteration,
            samples,
            source,
        }
        .into()
    }
}
