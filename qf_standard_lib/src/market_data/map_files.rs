use crate::errors::EngineError;
use chrono::NaiveDate;
use log::warn;
use std::path::Path;

/// Per-equity permanent to historical ticker mapping. Each row
/// `yyyyMMdd,mapped_ticker` gives the ticker in effect up to and including
/// that date. A missing map file means the ticker never changed.
#[derive(Clone, Debug)]
pub struct MapFile {
    pub permtick: String,
    rows: Vec<(NaiveDate, String)>,
}

impl MapFile {
    /// Loads a map file, returning `None` when the file does not exist so
    /// callers fall back to identity mapping without emitting
    /// `SymbolChanged` events.
    pub fn load(path: &Path, permtick: &str) -> Result<Option<MapFile>, EngineError> {
        if !path.exists() {
            return Ok(None);
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .map_err(|e| EngineError::Data(format!("Cannot read map file {}: {}", path.display(), e)))?;
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!("{}: skipping corrupt map row: {}", permtick, e);
                    continue;
                }
            };
            let parsed = match (record.get(0), record.get(1)) {
                (Some(date), Some(ticker)) => NaiveDate::parse_from_str(date.trim(), "%Y%m%d")
                    .map(|d| (d, ticker.trim().to_uppercase()))
                    .map_err(|e| e.to_string()),
                _ => Err("Expected 2 fields".to_string()),
            };
            match parsed {
                Ok(row) => rows.push(row),
                Err(e) => warn!("{}: skipping corrupt map row: {}", permtick, e),
            }
        }
        rows.sort_by_key(|(date, _)| *date);
        Ok(Some(MapFile {
            permtick: permtick.to_uppercase(),
            rows,
        }))
    }

    /// The ticker the instrument traded under on the given date.
    pub fn resolve(&self, date: NaiveDate) -> &str {
        for (row_date, ticker) in &self.rows {
            if date <= *row_date {
                return ticker;
            }
        }
        self.rows
            .last()
            .map(|(_, ticker)| ticker.as_str())
            .unwrap_or(&self.permtick)
    }

    /// The dates at which the ticker changes, paired as (old, new), useful
    /// for emitting `SymbolChanged` events while replaying.
    pub fn changes(&self) -> Vec<(NaiveDate, String, String)> {
        let mut out = Vec::new();
        for window in self.rows.windows(2) {
            let (date, old) = &window[0];
            let (_, new) = &window[1];
            if old != new {
                // The new ticker takes effect the day after the old row ends.
                if let Some(effective) = date.succ_opt() {
                    out.push((effective, old.clone(), new.clone()));
                }
            }
        }
        out
    }
}
