use std::sync::Arc;

use crate::error::{Error, Result};
use crate::field::{Field, index_of};
use crate::value::{Protocol, Value};

/// Location of one cell inside a row arena: `None` for NULL, otherwise `start..end`
pub(crate) type Span = Option<(usize, usize)>;

/// A row borrowed from the arena of a table or a reader
///
/// Rows handed out by a reader are invalidated by the next fetch; the borrow
/// checker enforces this through the `'a` lifetime. Use [`RowRef::to_row`]
/// to keep one around.
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    fields: &'a Arc<[Field]>,
    protocol: Protocol,
    arena: &'a [u8],
    cells: &'a [Span],
}

impl<'a> RowRef<'a> {
    pub(crate) fn new(
        fields: &'a Arc<[Field]>,
        protocol: Protocol,
        arena: &'a [u8],
        cells: &'a [Span],
    ) -> Self {
        Self {
            fields,
            protocol,
            arena,
            cells,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn fields(&self) -> &'a [Field] {
        self.fields
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn cell(&self, field: &'a Field, span: Span) -> Value<'a> {
        let arena = self.arena;
        Value::new(field, self.protocol, span.map(|(start, end)| &arena[start..end]))
    }

    /// Value at column `idx`, `None` if out of range
    pub fn get(&self, idx: usize) -> Option<Value<'a>> {
        Some(self.cell(self.fields().get(idx)?, *self.cells.get(idx)?))
    }

    /// Value of the column called `name`
    pub fn get_by_name(&self, name: &str) -> Option<Value<'a>> {
        self.get(index_of(self.fields(), name)?)
    }

    /// Value at column `idx`, failing with `BadUsageError` if out of range
    pub fn value(&self, idx: usize) -> Result<Value<'a>> {
        self.get(idx).ok_or_else(|| {
            Error::BadUsageError(format!(
                "column {idx} is out of range for a row of {} columns",
                self.len()
            ))
        })
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = Value<'a>> + 'a {
        let row = *self;
        self.fields()
            .iter()
            .zip(self.cells.iter())
            .map(move |(field, span)| row.cell(field, *span))
    }

    /// Copy the row out of the arena
    ///
    /// Column metadata is shared with the source. The copy allocates the cell
    /// bytes once, sized exactly, plus the span list.
    pub fn to_row(&self) -> Row {
        let total = self
            .cells
            .iter()
            .flatten()
            .map(|(start, end)| end - start)
            .sum();
        let mut arena = Vec::with_capacity(total);
        let cells = self
            .cells
            .iter()
            .map(|span| {
                span.map(|(start, end)| {
                    let offset = arena.len();
                    arena.extend_from_slice(&self.arena[start..end]);
                    (offset, arena.len())
                })
            })
            .collect();
        Row {
            fields: Arc::clone(self.fields),
            protocol: self.protocol,
            arena: arena.into_boxed_slice(),
            cells,
        }
    }
}

impl PartialEq for RowRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

/// A row that owns its bytes
#[derive(Debug, Clone)]
pub struct Row {
    fields: Arc<[Field]>,
    protocol: Protocol,
    arena: Box<[u8]>,
    cells: Box<[Span]>,
}

impl Row {
    pub fn row_ref(&self) -> RowRef<'_> {
        RowRef::new(&self.fields, self.protocol, &self.arena, &self.cells)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<Value<'_>> {
        self.row_ref().get(idx)
    }

    pub fn get_by_name(&self, name: &str) -> Option<Value<'_>> {
        self.row_ref().get_by_name(name)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.row_ref() == other.row_ref()
    }
}

impl PartialEq<RowRef<'_>> for Row {
    fn eq(&self, other: &RowRef<'_>) -> bool {
        self.row_ref() == *other
    }
}
