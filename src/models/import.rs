use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportError {
    pub index: usize,
    pub error: String,
}

/// Aggregate outcome of a bulk import. `index` refers to the position in the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<ImportError>,
}

impl ImportResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, index: usize, error: impl Into<String>) {
        self.failed += 1;
        self.errors.push(ImportError {
            index,
            error: error.into(),
        });
    }
}
