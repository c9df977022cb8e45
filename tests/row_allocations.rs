//! Heap allocations made when a row is copied out of its result

mod common;

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{Script, col};
use mysql_rowset::constant::ColumnType;

struct CountingAlloc;

static ALLOCATIONS: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static COUNTING: Cell<bool> = const { Cell::new(false) };
}

fn counting() -> bool {
    COUNTING.try_with(Cell::get).unwrap_or(false)
}

// SAFETY: every call is forwarded unchanged to the system allocator.
unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if counting() {
            ALLOCATIONS.fetch_add(1, Ordering::SeqCst);
        }
        // SAFETY: same contract as the caller's
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        // SAFETY: `ptr` came from `System.alloc` with this layout
        unsafe { System.dealloc(ptr, layout) }
    }
}

#[global_allocator]
static GLOBAL: CountingAlloc = CountingAlloc;

fn allocations_during<T>(f: impl FnOnce() -> T) -> (T, usize) {
    let before = ALLOCATIONS.load(Ordering::SeqCst);
    COUNTING.with(|flag| flag.set(true));
    let value = f();
    COUNTING.with(|flag| flag.set(false));
    (value, ALLOCATIONS.load(Ordering::SeqCst) - before)
}

#[test]
fn copied_row_shares_column_metadata() {
    let cols = [
        col("id", ColumnType::MYSQL_TYPE_LONG),
        col("name", ColumnType::MYSQL_TYPE_VAR_STRING),
        col("note", ColumnType::MYSQL_TYPE_VAR_STRING),
    ];
    let mut script = Script::new(1);
    script.text_result(&cols, &[vec![Some("1"), Some("alpha"), None]]);
    script.text_result(&cols, &[vec![Some("2"), Some("beta"), Some("x")]]);
    let (mut conn, _) = script.connect();

    let table = conn.query_table("SELECT id, name, note FROM test").unwrap();
    let source = table.row(0).unwrap();
    let (owned, allocations) = allocations_during(|| source.to_row());
    // the cell bytes and the span list
    assert_eq!(allocations, 2);
    assert!(owned == source);
    assert!(std::ptr::eq(owned.fields(), source.fields()));

    let mut reader = conn.query_reader("SELECT id, name, note FROM test").unwrap();
    let row = reader.fetch_next().unwrap().unwrap();
    let (owned, allocations) = allocations_during(|| row.to_row());
    assert_eq!(allocations, 2);
    assert_eq!(owned.get(1).unwrap().as_str().unwrap(), "beta");
}
