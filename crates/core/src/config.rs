//! Harness configuration and experiment files
//!
//! All tunables are carried in a [`HarnessConfig`] value that is passed
//! explicitly to every component; nothing is read from process-wide state.
//! An [`ExperimentFile`] bundles the configuration with a schema, a
//! generation plan and query variants in one TOML document.

use crate::error::{BenchError, Result};
use crate::plan::{ColumnPlan, GenerationPlan, TablePlan};
use crate::retry::RetryConfig;
use crate::schema::{SchemaSpec, TableDef};
use crate::variant::{Params, QueryVariant};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Harness tunables
///
/// # Example
///
/// ```toml
/// batch_size = 10000
/// warmup_iterations = 2
/// measured_iterations = 10
/// per_execution_timeout_ms = 30000
/// low_confidence_threshold = 0.25
/// parallel_table_load = false
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Rows per bulk insert
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Executions discarded before measurement
    #[serde(default = "default_warmup_iterations")]
    pub warmup_iterations: usize,
    /// Executions measured per variant
    #[serde(default = "default_measured_iterations")]
    pub measured_iterations: usize,
    /// Per-execution timeout in milliseconds (0 = no timeout)
    #[serde(default = "default_timeout_ms")]
    pub per_execution_timeout_ms: u64,
    /// Relative stddev above which a comparison is low confidence
    #[serde(default = "default_low_confidence_threshold")]
    pub low_confidence_threshold: f64,
    /// Sample count below which a comparison is low confidence
    #[serde(default = "default_min_confident_samples")]
    pub min_confident_samples: usize,
    /// Load independent tables concurrently on separate connections
    #[serde(default)]
    pub parallel_table_load: bool,
    /// Benchmark variants concurrently on separate connections
    #[serde(default)]
    pub parallel_variants: bool,
    /// Batch retry policy for the loader
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_batch_size() -> usize {
    10_000
}

fn default_warmup_iterations() -> usize {
    2
}

fn default_measured_iterations() -> usize {
    10
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_low_confidence_threshold() -> f64 {
    0.25
}

fn default_min_confident_samples() -> usize {
    3
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            warmup_iterations: default_warmup_iterations(),
            measured_iterations: default_measured_iterations(),
            per_execution_timeout_ms: default_timeout_ms(),
            low_confidence_threshold: default_low_confidence_threshold(),
            min_confident_samples: default_min_confident_samples(),
            parallel_table_load: false,
            parallel_variants: false,
            retry: RetryConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Per-execution timeout, `None` when disabled
    pub fn per_execution_timeout(&self) -> Option<Duration> {
        if self.per_execution_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.per_execution_timeout_ms))
        }
    }

    /// Reject values no component can work with.
    ///
    /// # Errors
    ///
    /// Returns `BenchError::Config` for a zero batch size, fewer than two
    /// measured iterations, or a non-positive/non-finite threshold.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(BenchError::config("batch_size must be at least 1"));
        }
        if self.measured_iterations < 2 {
            return Err(BenchError::config(format!(
                "measured_iterations must be at least 2, got {}",
                self.measured_iterations
            )));
        }
        if !self.low_confidence_threshold.is_finite() || self.low_confidence_threshold <= 0.0 {
            return Err(BenchError::config(format!(
                "low_confidence_threshold must be a positive number, got {}",
                self.low_confidence_threshold
            )));
        }
        Ok(())
    }
}

/// One `[[table]]` entry: definition plus its generation plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEntry {
    /// Table definition
    #[serde(flatten)]
    pub def: TableDef,
    /// Rows to generate
    pub rows: u64,
    /// Value-stream seed
    #[serde(default)]
    pub seed: u64,
    /// Column policies
    #[serde(default)]
    pub policies: BTreeMap<String, ColumnPlan>,
}

/// One `[[variant]]` entry: the variant plus its bound parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantEntry {
    /// The query variant
    #[serde(flatten)]
    pub variant: QueryVariant,
    /// Parameters bound for every execution
    #[serde(default)]
    pub params: Params,
}

/// A complete experiment in one TOML document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentFile {
    /// Harness tunables
    #[serde(default)]
    pub harness: HarnessConfig,
    /// Tables in dependency order
    #[serde(default, rename = "table")]
    pub tables: Vec<TableEntry>,
    /// Query variants
    #[serde(default, rename = "variant")]
    pub variants: Vec<VariantEntry>,
}

impl ExperimentFile {
    /// Parse from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ExperimentFile = toml::from_str(content)
            .map_err(|e| BenchError::config(format!("Failed to parse experiment: {}", e)))?;
        file.harness.validate()?;
        Ok(file)
    }

    /// Read and parse an experiment file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BenchError::config(format!(
                "Failed to read experiment file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            BenchError::Config(msg) => BenchError::config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Write the template experiment if `path` does not exist yet
    pub fn write_default_if_missing(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        std::fs::write(path, Self::default_toml()).map_err(|e| {
            BenchError::config(format!(
                "Failed to write experiment file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(true)
    }

    /// Schema described by the `[[table]]` entries
    pub fn schema(&self) -> SchemaSpec {
        SchemaSpec::new(self.tables.iter().map(|t| t.def.clone()).collect())
    }

    /// Generation plan described by the `[[table]]` entries
    pub fn plan(&self) -> GenerationPlan {
        self.tables.iter().fold(GenerationPlan::new(), |plan, t| {
            let mut table = TablePlan::new(t.def.name.clone(), t.rows, t.seed);
            table.columns = t.policies.clone();
            plan.table(table)
        })
    }

    /// Template with comments
    pub fn default_toml() -> &'static str {
        r#"# querybench experiment
#
# Tables are generated and loaded in the order listed; a foreign key may
# only reference a table listed above it.

[harness]
batch_size = 10000            # rows per bulk insert
warmup_iterations = 2         # executions discarded before measuring
measured_iterations = 10      # executions measured per variant
per_execution_timeout_ms = 30000
low_confidence_threshold = 0.25
min_confident_samples = 3
parallel_table_load = false   # load independent tables concurrently
parallel_variants = false     # concurrent runs change cache behavior

[harness.retry]
max_retries = 3
base_delay_ms = 10
max_delay_ms = 1000

[[table]]
name = "customers"
primary_key = "id"
rows = 1000
seed = 1
column = [
  { name = "id", type = "integer" },
  { name = "name", type = "text" },
  { name = "region", type = "text" },
]
[table.policies]
name = { policy = "prefixed", prefix = "Customer " }
region = { policy = "one_of", values = ["north", "south", "east", "west"] }

[[table]]
name = "orders"
primary_key = "id"
rows = 5000
seed = 2
column = [
  { name = "id", type = "integer" },
  { name = "customer_id", type = "integer" },
  { name = "amount", type = "real" },
  { name = "placed_at", type = "timestamp" },
]
foreign_key = [{ column = "customer_id", references = "customers" }]
[table.policies]
customer_id = { policy = "foreign_key", sampling = "uniform" }
amount = { policy = "uniform_real", min = 1.0, max = 500.0 }
placed_at = { policy = "timestamp", start = 1672531200, end = 1704067199 }

[[variant]]
name = "scan"
tag = "baseline"
sql = "SELECT COUNT(*) FROM orders WHERE customer_id = ?1"
params = [42]

[[variant]]
name = "indexed"
tag = "candidate"
sql = "SELECT COUNT(*) FROM orders WHERE customer_id = ?1"
params = [42]
setup = ["CREATE INDEX IF NOT EXISTS idx_orders_customer ON orders(customer_id)"]
teardown = ["DROP INDEX IF EXISTS idx_orders_customer"]
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ColumnPolicy;
    use crate::variant::VariantTag;
    use tempfile::TempDir;

    #[test]
    fn test_harness_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.batch_size, 10_000);
        assert_eq!(config.warmup_iterations, 2);
        assert_eq!(config.low_confidence_threshold, 0.25);
        assert!(!config.parallel_table_load);
        assert_eq!(
            config.per_execution_timeout(),
            Some(Duration::from_millis(30_000))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_disables() {
        let config = HarnessConfig {
            per_execution_timeout_ms: 0,
            ..HarnessConfig::default()
        };
        assert_eq!(config.per_execution_timeout(), None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_batch = HarnessConfig {
            batch_size: 0,
            ..HarnessConfig::default()
        };
        assert!(matches!(zero_batch.validate(), Err(BenchError::Config(_))));

        let one_iteration = HarnessConfig {
            measured_iterations: 1,
            ..HarnessConfig::default()
        };
        assert!(one_iteration.validate().is_err());

        let nan_threshold = HarnessConfig {
            low_confidence_threshold: f64::NAN,
            ..HarnessConfig::default()
        };
        assert!(nan_threshold.validate().is_err());
    }

    #[test]
    fn test_partial_harness_uses_defaults() {
        let file = ExperimentFile::from_toml_str("[harness]\nbatch_size = 500\n").unwrap();
        assert_eq!(file.harness.batch_size, 500);
        assert_eq!(file.harness.measured_iterations, 10);
        assert_eq!(file.harness.retry, RetryConfig::default());
    }

    #[test]
    fn test_default_template_parses() {
        let file = ExperimentFile::from_toml_str(ExperimentFile::default_toml()).unwrap();
        let schema = file.schema();
        assert!(schema.validate().is_ok());
        assert_eq!(schema.tables.len(), 2);

        let plan = file.plan();
        assert_eq!(plan.rows("customers"), 1000);
        assert_eq!(plan.rows("orders"), 5000);
        assert_eq!(
            plan.get("orders").unwrap().columns["amount"].policy,
            ColumnPolicy::UniformReal {
                min: 1.0,
                max: 500.0
            }
        );

        assert_eq!(file.variants.len(), 2);
        assert_eq!(file.variants[0].variant.tag, VariantTag::Baseline);
        assert_eq!(file.variants[1].variant.setup.len(), 1);
        assert_eq!(file.variants[1].params.len(), 1);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = ExperimentFile::from_toml_str("[harness\n").unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
    }

    #[test]
    fn test_write_default_if_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("experiment.toml");
        assert!(ExperimentFile::write_default_if_missing(&path).unwrap());
        assert!(!ExperimentFile::write_default_if_missing(&path).unwrap());
        let file = ExperimentFile::from_file(&path).unwrap();
        assert_eq!(file.tables.len(), 2);
    }
}
