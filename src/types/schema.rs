use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{PipelineError, Result};

/// Declared role of a column. Decides how every stage treats it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    /// Raw input loaded from the feature table
    Feature,
    /// Added by augmentation (lagged label statistics, etc.)
    Derived,
    /// Target class column
    Label,
    /// Sin/cos phase encoding
    Cyclical,
    /// Binary shock flag
    Flag,
    /// Raw ratio that is already relative
    Ratio,
    /// Depends on rows after the current one; never leaves augmentation
    Lookahead,
}

impl ColumnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnRole::Feature => "feature",
            ColumnRole::Derived => "derived",
            ColumnRole::Label => "label",
            ColumnRole::Cyclical => "cyclical",
            ColumnRole::Flag => "flag",
            ColumnRole::Ratio => "ratio",
            ColumnRole::Lookahead => "lookahead",
        }
    }

    pub fn normalized_by_default(&self) -> bool {
        matches!(self, ColumnRole::Feature | ColumnRole::Derived)
    }

    pub fn scaled_by_default(&self) -> bool {
        matches!(self, ColumnRole::Feature | ColumnRole::Derived)
    }

    /// Flat-by-construction columns skip the variance and IQR checks.
    pub fn variance_checked(&self) -> bool {
        matches!(
            self,
            ColumnRole::Feature | ColumnRole::Derived | ColumnRole::Ratio
        )
    }
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub role: ColumnRole,
    pub scale: bool,
    pub normalize: bool,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, role: ColumnRole) -> Self {
        Self {
            name: name.into(),
            role,
            scale: role.scaled_by_default(),
            normalize: role.normalized_by_default(),
        }
    }

    pub fn feature(name: impl Into<String>) -> Self {
        Self::new(name, ColumnRole::Feature)
    }

    pub fn derived(name: impl Into<String>) -> Self {
        Self::new(name, ColumnRole::Derived)
    }

    pub fn label(name: impl Into<String>) -> Self {
        Self::new(name, ColumnRole::Label)
    }

    pub fn without_scaling(mut self) -> Self {
        self.scale = false;
        self
    }

    pub fn without_normalization(mut self) -> Self {
        self.normalize = false;
        self
    }
}

/// Ordered column layout of a [`Frame`](super::Frame).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<ColumnSpec>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnSpec>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for spec in &columns {
            if !seen.insert(spec.name.as_str()) {
                return Err(PipelineError::DuplicateColumn(spec.name.clone()));
            }
        }
        Ok(Self { columns })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn require(&self, name: &str) -> Result<usize> {
        self.index_of(name)
            .ok_or_else(|| PipelineError::UnknownColumn(name.to_string()))
    }

    pub fn label_index(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.role == ColumnRole::Label)
    }

    pub fn has_role(&self, role: ColumnRole) -> bool {
        self.columns.iter().any(|c| c.role == role)
    }

    pub(crate) fn push(&mut self, spec: ColumnSpec) -> Result<()> {
        if self.index_of(&spec.name).is_some() {
            return Err(PipelineError::DuplicateColumn(spec.name));
        }
        self.columns.push(spec);
        Ok(())
    }

    /// Keeps the columns whose positions are listed, in that order.
    pub(crate) fn select(&self, positions: &[usize]) -> Self {
        Self {
            columns: positions.iter().map(|&i| self.columns[i].clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_defaults() {
        assert!(ColumnSpec::feature("x").scale);
        assert!(ColumnSpec::feature("x").normalize);
        assert!(!ColumnSpec::label("target").scale);
        assert!(!ColumnSpec::new("hour_sin", ColumnRole::Cyclical).scale);
        assert!(!ColumnSpec::new("spr", ColumnRole::Ratio).normalize);
        assert!(ColumnRole::Ratio.variance_checked());
        assert!(!ColumnRole::Flag.variance_checked());
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let err = Schema::new(vec![ColumnSpec::feature("a"), ColumnSpec::feature("a")]);
        assert!(matches!(err, Err(PipelineError::DuplicateColumn(name)) if name == "a"));
    }

    #[test]
    fn test_label_lookup() {
        let schema = Schema::new(vec![ColumnSpec::feature("a"), ColumnSpec::label("target")]).unwrap();
        assert_eq!(schema.label_index(), Some(1));
        assert_eq!(schema.require("a").unwrap(), 0);
        assert!(schema.require("missing").is_err());
    }
}
