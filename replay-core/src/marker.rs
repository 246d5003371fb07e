//! C4: Marker store — append-only diagnostic annotations on the bar timeline.

use crate::domain::{Mark, MarkId, MarkIdGen};
use polars::prelude::{Column, DataFrame, NamedFrom, ParquetWriter, Series};
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarkerStoreError {
    #[error("failed to build marks dataframe: {0}")]
    DataFrame(String),
    #[error("failed to write marks to {0}: {1}")]
    Write(String, String),
}

/// Symbol-agnostic append-only store of `Mark` records.
#[derive(Default)]
pub struct MarkerStore {
    marks: Vec<Mark>,
    ids: MarkIdGen,
}

impl MarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a mark for the given bar (identified by `market_data_id`).
    /// Returns the assigned `MarkId`.
    pub fn mark(&mut self, builder: crate::domain::mark::MarkBuilder) -> MarkId {
        let id = self.ids.next_id();
        self.marks.push(builder.build(id));
        id
    }

    pub fn marks(&self) -> &[Mark] {
        &self.marks
    }

    pub fn cleanup(&mut self) {
        self.marks.clear();
        self.ids = MarkIdGen::default();
    }

    pub fn write(&self, dir: &Path) -> Result<(), MarkerStoreError> {
        std::fs::create_dir_all(dir)
            .map_err(|e| MarkerStoreError::Write(dir.display().to_string(), e.to_string()))?;
        let path = dir.join("marks.parquet");

        let id: Vec<String> = self.marks.iter().map(|m| m.id.to_string()).collect();
        let market_data_id: Vec<String> = self.marks.iter().map(|m| m.market_data_id.clone()).collect();
        let signal_type: Vec<Option<String>> = self
            .marks
            .iter()
            .map(|m| m.signal.as_ref().map(|s| format!("{:?}", s.signal_type)))
            .collect();
        let signal_name: Vec<Option<String>> = self
            .marks
            .iter()
            .map(|m| m.signal.as_ref().map(|s| s.name.clone()))
            .collect();
        let signal_time: Vec<Option<i64>> = self
            .marks
            .iter()
            .map(|m| m.signal.as_ref().map(|s| s.time.timestamp_millis()))
            .collect();
        let signal_symbol: Vec<Option<String>> = self
            .marks
            .iter()
            .map(|m| m.signal.as_ref().map(|s| s.symbol.clone()))
            .collect();
        let color: Vec<String> = self.marks.iter().map(|m| m.color.clone()).collect();
        let shape: Vec<String> = self.marks.iter().map(|m| format!("{:?}", m.shape)).collect();
        let level: Vec<String> = self.marks.iter().map(|m| format!("{:?}", m.level)).collect();
        let title: Vec<String> = self.marks.iter().map(|m| m.title.clone()).collect();
        let message: Vec<String> = self.marks.iter().map(|m| m.message.clone()).collect();
        let category: Vec<String> = self.marks.iter().map(|m| m.category.clone()).collect();

        let mut df = DataFrame::new(vec![
            Column::Series(Series::new("id".into(), id)),
            Column::Series(Series::new("marketDataId".into(), market_data_id)),
            Column::Series(Series::new("signalType".into(), signal_type)),
            Column::Series(Series::new("signalName".into(), signal_name)),
            Column::Series(Series::new("signalTime".into(), signal_time)),
            Column::Series(Series::new("signalSymbol".into(), signal_symbol)),
            Column::Series(Series::new("color".into(), color)),
            Column::Series(Series::new("shape".into(), shape)),
            Column::Series(Series::new("level".into(), level)),
            Column::Series(Series::new("title".into(), title)),
            Column::Series(Series::new("message".into(), message)),
            Column::Series(Series::new("category".into(), category)),
        ])
        .map_err(|e| MarkerStoreError::DataFrame(e.to_string()))?;

        let mut file = File::create(&path)
            .map_err(|e| MarkerStoreError::Write(path.display().to_string(), e.to_string()))?;
        ParquetWriter::new(&mut file)
            .finish(&mut df)
            .map_err(|e| MarkerStoreError::Write(path.display().to_string(), e.to_string()))?;
        Ok(())
    }
}
