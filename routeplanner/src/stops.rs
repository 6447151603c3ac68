//! Location-name → NaPTAN stop-code table, loaded once at startup and
//! immutable afterwards.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StopCodesError {
    #[error("failed to open stop-code file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse stop-code file: {0}")]
    Csv(#[from] csv::Error),
}

pub struct StopCodes {
    codes: HashMap<String, String>,
}

impl StopCodes {
    pub fn load(path: &Path) -> Result<Self, StopCodesError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Columns: common name at index 1, NaPTAN code at index 4. The header
    /// row and rows too short to carry both are skipped.
    fn from_reader<R: Read>(reader: R) -> Result<Self, StopCodesError> {
        let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let mut codes = HashMap::new();
        for record in csv_reader.records() {
            let record = record?;
            let (Some(common_name), Some(naptan_code)) = (record.get(1), record.get(4)) else {
                continue;
            };
            codes.insert(common_name.to_string(), naptan_code.to_string());
        }
        Ok(Self { codes })
    }

    pub fn resolve(&self, location: &str) -> Option<&str> {
        self.codes.get(location).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}
