//! Tabular analysis for the data analyst
//!
//! A [`Dataset`] arrives as a JSON object mapping column names to arrays of
//! equal length. Numbers, strings, booleans and nulls are accepted. A column
//! is numeric when every present value is a number.
//!
//! Everything here is pure and deterministic: the same dataset and options
//! always produce the same report.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AgentError, Result};

/// Share of the interquartile range tolerated outside the quartiles
const IQR_FENCE: f64 = 1.5;

/// Absolute z-score above which a value is an anomaly
const ANOMALY_Z: f64 = 3.0;

/// Relative change (percent) separating a trend from noise
const TREND_THRESHOLD: f64 = 5.0;

const MAX_ANOMALY_VALUES: usize = 10;
const TOP_VALUES: usize = 5;

/// One value in a column
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Missing,
}

impl Cell {
    fn from_json(column: &str, value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::Missing),
            Value::Number(n) => n.as_f64().map(Self::Number).ok_or_else(|| {
                AgentError::invalid(format!("column '{}' holds an unrepresentable number", column))
            }),
            Value::String(s) => Ok(Self::Text(s.clone())),
            Value::Bool(b) => Ok(Self::Text(b.to_string())),
            Value::Array(_) | Value::Object(_) => Err(AgentError::invalid(format!(
                "column '{}' holds a nested value",
                column
            ))),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Text(s) => Value::String(s.clone()),
            Self::Missing => Value::Null,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

/// A named column of cells
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Cell>,
}

impl Column {
    /// At least one number and no text
    pub fn is_numeric(&self) -> bool {
        let mut any = false;
        for cell in &self.cells {
            match cell {
                Cell::Number(_) => any = true,
                Cell::Text(_) => return false,
                Cell::Missing => {}
            }
        }
        any
    }

    pub fn numbers(&self) -> Vec<f64> {
        self.cells.iter().filter_map(Cell::as_number).collect()
    }

    pub fn missing(&self) -> usize {
        self.cells.iter().filter(|c| c.is_missing()).count()
    }

    fn texts(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().filter_map(|c| match c {
            Cell::Text(s) => Some(s.as_str()),
            _ => None,
        })
    }

    fn dtype(&self) -> &'static str {
        if self.is_numeric() {
            "numeric"
        } else {
            "text"
        }
    }
}

/// Column-oriented table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Dataset {
    columns: Vec<Column>,
}

impl TryFrom<Map<String, Value>> for Dataset {
    type Error = AgentError;

    fn try_from(map: Map<String, Value>) -> Result<Self> {
        let mut columns = Vec::with_capacity(map.len());
        let mut rows = None;

        for (name, values) in &map {
            let Value::Array(values) = values else {
                return Err(AgentError::invalid(format!("column '{}' is not an array", name)));
            };
            match rows {
                None => rows = Some(values.len()),
                Some(expected) if expected != values.len() => {
                    return Err(AgentError::invalid(format!(
                        "column '{}' has {} values, expected {}",
                        name,
                        values.len(),
                        expected
                    )));
                }
                Some(_) => {}
            }
            let cells = values
                .iter()
                .map(|v| Cell::from_json(name, v))
                .collect::<Result<Vec<_>>>()?;
            columns.push(Column {
                name: name.clone(),
                cells,
            });
        }

        Ok(Self { columns })
    }
}

impl From<Dataset> for Map<String, Value> {
    fn from(dataset: Dataset) -> Self {
        dataset
            .columns
            .into_iter()
            .map(|c| {
                let values = c.cells.iter().map(Cell::to_json).collect();
                (c.name, Value::Array(values))
            })
            .collect()
    }
}

/// Which report `analyze` produces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    #[default]
    Descriptive,
    Correlation,
    Summary,
}

/// Cleaning steps; applied in declaration order whatever order they are requested in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanOperation {
    RemoveDuplicates,
    FillMissing,
    RemoveOutliers,
    Normalize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    #[default]
    Trends,
    Anomalies,
    Clusters,
}

/// Descriptive statistics of one numeric column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStats {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; absent below two values
    pub std: Option<f64>,
    pub min: f64,
    #[serde(rename = "25%")]
    pub p25: f64,
    #[serde(rename = "50%")]
    pub p50: f64,
    #[serde(rename = "75%")]
    pub p75: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub rows: usize,
    pub columns: usize,
    pub duplicate_rows: usize,
    pub numeric_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub rows: usize,
    pub columns: Vec<String>,
    pub analysis_type: AnalysisType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<BTreeMap<String, ColumnStats>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_types: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_values: Option<BTreeMap<String, usize>>,
    /// Pearson coefficients; `None` where a column has no variance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_matrix: Option<BTreeMap<String, BTreeMap<String, Option<f64>>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<DatasetSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanReport {
    pub original_rows: usize,
    pub final_rows: usize,
    pub changes: Vec<String>,
    pub cleaned_data: Dataset,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Finding {
    Trend {
        column: String,
        trend: String,
        change_percent: Option<f64>,
        first_half_avg: Option<f64>,
        second_half_avg: Option<f64>,
    },
    Anomaly {
        column: String,
        anomaly_count: usize,
        anomaly_values: Vec<f64>,
    },
    Cluster {
        column: String,
        unique_values: usize,
        top_values: Vec<ValueCount>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternReport {
    pub pattern_type: PatternType,
    pub findings: Vec<Finding>,
}

impl Dataset {
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Self::try_from(map),
            _ => Err(AgentError::invalid("dataset must be an object of columns")),
        }
    }

    pub fn rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.cells.len())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    fn numeric_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.is_numeric())
    }

    fn row_eq(&self, a: usize, b: usize) -> bool {
        self.columns.iter().all(|c| c.cells[a] == c.cells[b])
    }

    /// `true` for every row equal to an earlier one
    fn duplicate_mask(&self) -> Vec<bool> {
        (0..self.rows())
            .map(|i| (0..i).any(|j| self.row_eq(i, j)))
            .collect()
    }

    fn retain_rows(&mut self, keep: &[bool]) {
        for column in &mut self.columns {
            let mut flags = keep.iter();
            column.cells.retain(|_| flags.next().copied().unwrap_or(true));
        }
    }

    /// Statistics, correlations or shape of the table
    pub fn analyze(&self, analysis_type: AnalysisType) -> Result<AnalysisReport> {
        let mut report = AnalysisReport {
            rows: self.rows(),
            columns: self.column_names(),
            analysis_type,
            statistics: None,
            data_types: None,
            missing_values: None,
            correlation_matrix: None,
            summary: None,
        };

        match analysis_type {
            AnalysisType::Descriptive => {
                report.statistics = Some(
                    self.numeric_columns()
                        .filter_map(|c| column_stats(&c.numbers()).map(|s| (c.name.clone(), s)))
                        .collect(),
                );
                report.data_types = Some(
                    self.columns
                        .iter()
                        .map(|c| (c.name.clone(), c.dtype().to_string()))
                        .collect(),
                );
                report.missing_values = Some(
                    self.columns
                        .iter()
                        .map(|c| (c.name.clone(), c.missing()))
                        .collect(),
                );
            }
            AnalysisType::Correlation => {
                let numeric: Vec<&Column> = self.numeric_columns().collect();
                if numeric.is_empty() {
                    return Err(AgentError::invalid("No numeric columns for correlation"));
                }
                let matrix = numeric
                    .iter()
                    .map(|a| {
                        let row = numeric
                            .iter()
                            .map(|b| (b.name.clone(), pearson(a, b)))
                            .collect();
                        (a.name.clone(), row)
                    })
                    .collect();
                report.correlation_matrix = Some(matrix);
            }
            AnalysisType::Summary => {
                let (numeric, categorical): (Vec<&Column>, Vec<&Column>) =
                    self.columns.iter().partition(|c| c.is_numeric());
                report.summary = Some(DatasetSummary {
                    rows: self.rows(),
                    columns: self.columns.len(),
                    duplicate_rows: self.duplicate_mask().iter().filter(|d| **d).count(),
                    numeric_columns: numeric.iter().map(|c| c.name.clone()).collect(),
                    categorical_columns: categorical.iter().map(|c| c.name.clone()).collect(),
                });
            }
        }

        Ok(report)
    }

    /// Apply cleaning steps and report what changed
    ///
    /// Normalizing a constant column maps it to zero.
    pub fn clean(mut self, operations: &[CleanOperation]) -> CleanReport {
        let original_rows = self.rows();
        let mut changes = Vec::new();

        if operations.contains(&CleanOperation::RemoveDuplicates) {
            let duplicates = self.duplicate_mask();
            let removed = duplicates.iter().filter(|d| **d).count();
            let keep: Vec<bool> = duplicates.iter().map(|d| !d).collect();
            self.retain_rows(&keep);
            changes.push(format!("Removed {} duplicate rows", removed));
        }

        if operations.contains(&CleanOperation::FillMissing) {
            for column in &mut self.columns {
                let missing = column.missing();
                if missing == 0 {
                    continue;
                }
                if column.is_numeric() {
                    let Some(fill) = mean(&column.numbers()) else {
                        continue;
                    };
                    fill_cells(column, Cell::Number(fill));
                    changes.push(format!(
                        "Filled {} missing values in '{}' with mean",
                        missing, column.name
                    ));
                } else if let Some(fill) = mode(column.texts()) {
                    fill_cells(column, Cell::Text(fill));
                    changes.push(format!(
                        "Filled {} missing values in '{}' with mode",
                        missing, column.name
                    ));
                }
            }
        }

        if operations.contains(&CleanOperation::RemoveOutliers) {
            let numeric: Vec<String> = self.numeric_columns().map(|c| c.name.clone()).collect();
            for name in numeric {
                let Some(column) = self.column(&name) else {
                    continue;
                };
                let mut sorted = column.numbers();
                if sorted.is_empty() {
                    continue;
                }
                sorted.sort_by(f64::total_cmp);
                let q1 = quantile(&sorted, 0.25);
                let q3 = quantile(&sorted, 0.75);
                let fence = IQR_FENCE * (q3 - q1);
                let (lower, upper) = (q1 - fence, q3 + fence);

                let keep: Vec<bool> = column
                    .cells
                    .iter()
                    .map(|c| c.as_number().map_or(true, |v| v >= lower && v <= upper))
                    .collect();
                let removed = keep.iter().filter(|k| !**k).count();
                if removed > 0 {
                    self.retain_rows(&keep);
                    changes.push(format!("Removed {} outliers from '{}'", removed, name));
                }
            }
        }

        if operations.contains(&CleanOperation::Normalize) {
            let mut normalized = 0;
            for column in self.columns.iter_mut().filter(|c| c.is_numeric()) {
                let numbers = column.numbers();
                let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
                let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let range = max - min;
                for cell in &mut column.cells {
                    if let Cell::Number(v) = cell {
                        *v = if range > 0.0 { (*v - min) / range } else { 0.0 };
                    }
                }
                normalized += 1;
            }
            changes.push(format!("Normalized {} numeric columns", normalized));
        }

        CleanReport {
            original_rows,
            final_rows: self.rows(),
            changes,
            cleaned_data: self,
        }
    }

    /// Trends, anomalies or value clusters per column
    pub fn find_patterns(&self, pattern_type: PatternType) -> PatternReport {
        let findings = match pattern_type {
            PatternType::Trends => self.numeric_columns().map(trend).collect(),
            PatternType::Anomalies => self.numeric_columns().filter_map(anomalies).collect(),
            PatternType::Clusters => self
                .columns
                .iter()
                .filter(|c| !c.is_numeric())
                .map(cluster)
                .collect(),
        };
        PatternReport {
            pattern_type,
            findings,
        }
    }

    /// One-line digest of shape and trends
    pub fn digest(&self) -> String {
        let mut digest = format!(
            "Analyzed {} rows across {} columns.",
            self.rows(),
            self.columns.len()
        );
        let trends: Vec<String> = self
            .find_patterns(PatternType::Trends)
            .findings
            .iter()
            .filter_map(|f| match f {
                Finding::Trend {
                    column,
                    trend,
                    change_percent: Some(change),
                    ..
                } => Some(format!("{} {} ({:+.2}%)", column, trend, change)),
                _ => None,
            })
            .collect();
        if !trends.is_empty() {
            digest.push_str(&format!(" Trends: {}.", trends.join(", ")));
        }
        digest
    }
}

fn fill_cells(column: &mut Column, fill: Cell) {
    for cell in &mut column.cells {
        if cell.is_missing() {
            *cell = fill.clone();
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean(values)?;
    let squares: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    Some((squares / (values.len() - 1) as f64).sqrt())
}

/// Linear interpolation between closest ranks; `sorted` must be non-empty
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (position - lower as f64)
}

fn column_stats(values: &[f64]) -> Option<ColumnStats> {
    let mean = mean(values)?;
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(ColumnStats {
        count: values.len(),
        mean,
        std: sample_std(values),
        min: sorted[0],
        p25: quantile(&sorted, 0.25),
        p50: quantile(&sorted, 0.5),
        p75: quantile(&sorted, 0.75),
        max: sorted[sorted.len() - 1],
    })
}

/// Pearson coefficient over rows where both columns have a number
fn pearson(a: &Column, b: &Column) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = a
        .cells
        .iter()
        .zip(&b.cells)
        .filter_map(|(x, y)| Some((x.as_number()?, y.as_number()?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x * var_y).sqrt())
}

/// Most frequent value; ties go to the smallest
fn mode<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let counts = value_counts(values);
    counts.first().map(|vc| vc.value.clone())
}

/// Counts by descending frequency, then ascending value
fn value_counts<'a>(values: impl Iterator<Item = &'a str>) -> Vec<ValueCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in values {
        *counts.entry(value).or_default() += 1;
    }
    let mut counts: Vec<ValueCount> = counts
        .into_iter()
        .map(|(value, count)| ValueCount {
            value: value.to_string(),
            count,
        })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    counts
}

fn trend(column: &Column) -> Finding {
    let mid = column.cells.len() / 2;
    let half_mean = |cells: &[Cell]| {
        let numbers: Vec<f64> = cells.iter().filter_map(Cell::as_number).collect();
        mean(&numbers)
    };
    let first = half_mean(&column.cells[..mid]);
    let second = half_mean(&column.cells[mid..]);

    let change = match (first, second) {
        (Some(f), Some(s)) if f != 0.0 => Some((s - f) / f * 100.0),
        _ => None,
    };
    let label = match change {
        Some(c) if c > TREND_THRESHOLD => "increasing",
        Some(c) if c < -TREND_THRESHOLD => "decreasing",
        _ => "stable",
    };

    Finding::Trend {
        column: column.name.clone(),
        trend: label.to_string(),
        change_percent: change.map(round2),
        first_half_avg: first.map(round2),
        second_half_avg: second.map(round2),
    }
}

fn anomalies(column: &Column) -> Option<Finding> {
    let numbers = column.numbers();
    let mean = mean(&numbers)?;
    let std = sample_std(&numbers).filter(|s| *s > 0.0)?;
    let outliers: Vec<f64> = numbers
        .into_iter()
        .filter(|v| ((v - mean) / std).abs() > ANOMALY_Z)
        .collect();
    if outliers.is_empty() {
        return None;
    }
    Some(Finding::Anomaly {
        column: column.name.clone(),
        anomaly_count: outliers.len(),
        anomaly_values: outliers.into_iter().take(MAX_ANOMALY_VALUES).collect(),
    })
}

fn cluster(column: &Column) -> Finding {
    let counts = value_counts(column.texts());
    Finding::Cluster {
        column: column.name.clone(),
        unique_values: counts.len(),
        top_values: counts.into_iter().take(TOP_VALUES).collect(),
    }
}
