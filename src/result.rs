use crate::field::{Field, index_of};
use crate::protocol::response::OkPayload;

/// What every executed statement reports
pub trait SqlResult {
    /// Rows changed by a DML statement, or rows delivered by a query
    fn rows_affected(&self) -> u64;

    /// Key assigned to an AUTO_INCREMENT column by the last INSERT, 0 if none
    fn insert_id(&self) -> u64;
}

/// A result that carries rows
pub trait QueryResult: SqlResult {
    fn fields(&self) -> &[Field];

    /// Position of the column called `name`
    fn index_of(&self, name: &str) -> Option<usize> {
        index_of(self.fields(), name)
    }
}

/// Outcome of a statement that produced no result set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    rows_affected: u64,
    insert_id: u64,
    warnings: u16,
}

impl ExecResult {
    pub(crate) fn new(rows_affected: u64, insert_id: u64, warnings: u16) -> Self {
        Self {
            rows_affected,
            insert_id,
            warnings,
        }
    }

    pub fn warnings(&self) -> u16 {
        self.warnings
    }
}

impl From<&OkPayload> for ExecResult {
    fn from(ok: &OkPayload) -> Self {
        Self::new(ok.affected_rows, ok.last_insert_id, ok.warnings)
    }
}

impl SqlResult for ExecResult {
    fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    fn insert_id(&self) -> u64 {
        self.insert_id
    }
}
