//! The `iseg` per-segment index (spec §4.6): one SQLite file colocated with
//! a data segment as `<seg>.index`, mapping metadata id to its byte range,
//! reftime, notes, and interned summarisable attributes.
//!
//! `attrs` interns every indexed attribute's encoded value once per
//! distinct `(code, value)` pair; `mduniq`/`mdother` intern whole encoded
//! tuples the same way, so that thousands of records sharing the same
//! origin/product/whatever store one copy of that attribute, not one per
//! row — the dedup idiom `types::arena` already applies in memory, mirrored
//! here on disk.

use crate::coding::{Decode, Encode};
use crate::error::Error;
use crate::metadata::Metadata;
use crate::types::note::NoteLog;
use crate::types::{Attr, Code};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::path::Path;

/// One `md` row: enough to resolve the record's bytes and rebuild its
/// `Metadata` without a second index lookup.
#[derive(Debug, Clone)]
pub struct IndexedRecord {
    pub id: i64,
    pub offset: u64,
    pub size: u64,
    pub reftime_text: String,
    pub notes: NoteLog,
    pub uniq: Vec<Attr>,
    pub other: Vec<Attr>,
    /// The dataset's indexed-column attributes actually present on this
    /// record, resolved back from their interned ids — the third source
    /// (besides `uniq`/`other`) a full `Metadata` is rebuilt from.
    pub indexed: Vec<Attr>,
}

pub struct SegmentIndex {
    conn: Connection,
    indexed_codes: Vec<Code>,
    unique_codes: Vec<Code>,
}

/// The `md` table's column name for an indexed code. Exposed crate-wide so
/// the query engine can build `Matcher::sql_fragment` calls against the
/// same names this module creates the columns with.
pub(crate) fn column_name(code: Code) -> String {
    format!("c_{}", code.as_str().replace('-', "_"))
}

fn encode_tuple(attrs: &[Attr]) -> crate::Result<Vec<u8>> {
    let mut buf = Vec::new();
    crate::coding::write_uvarint(&mut buf, attrs.len() as u64)?;
    for attr in attrs {
        attr.encode_into(&mut buf)?;
    }
    Ok(buf)
}

fn decode_tuple(bytes: &[u8]) -> crate::Result<Vec<Attr>> {
    let mut cursor = bytes;
    let count = crate::coding::read_uvarint(&mut cursor)?;
    let mut attrs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        attrs.push(Attr::decode_from(&mut cursor)?);
    }
    Ok(attrs)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(ffi_err, _)
            if ffi_err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl SegmentIndex {
    /// Opens (creating if absent) the per-segment index at `path`, with one
    /// `attrs` column per code in `indexed_codes` and a `UNIQUE` constraint
    /// over `unique_codes`' interned tuple (spec's dataset `unique` option).
    pub fn open(path: &Path, indexed_codes: &[Code], unique_codes: &[Code]) -> crate::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA synchronous=OFF;
             PRAGMA journal_mode=MEMORY;
             PRAGMA read_uncommitted=1;",
        )?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS attrs (
                id INTEGER PRIMARY KEY,
                code INTEGER NOT NULL,
                value BLOB NOT NULL,
                UNIQUE(code, value)
            );
            CREATE TABLE IF NOT EXISTS mduniq (
                id INTEGER PRIMARY KEY,
                data BLOB NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS mdother (
                id INTEGER PRIMARY KEY,
                data BLOB NOT NULL UNIQUE
            );",
        )?;

        let mut columns = String::new();
        for code in indexed_codes {
            columns.push_str(&format!("{} INTEGER REFERENCES attrs(id),\n", column_name(*code)));
        }
        let create_md = format!(
            "CREATE TABLE IF NOT EXISTS md (
                id INTEGER PRIMARY KEY,
                offset INTEGER NOT NULL,
                size INTEGER NOT NULL,
                notes BLOB,
                reftime TEXT NOT NULL,
                {columns}
                uniq_id INTEGER NOT NULL REFERENCES mduniq(id),
                other_id INTEGER REFERENCES mdother(id),
                UNIQUE(uniq_id)
            );"
        );
        conn.execute_batch(&create_md)?;

        Ok(SegmentIndex {
            conn,
            indexed_codes: indexed_codes.to_vec(),
            unique_codes: unique_codes.to_vec(),
        })
    }

    fn intern(&self, table: &str, bytes: &[u8]) -> crate::Result<i64> {
        self.conn
            .execute(&format!("INSERT OR IGNORE INTO {table}(data) VALUES (?1)"), [bytes])?;
        let id = self
            .conn
            .query_row(&format!("SELECT id FROM {table} WHERE data = ?1"), [bytes], |row| row.get(0))?;
        Ok(id)
    }

    /// Looks up an already-interned attribute's id, without inserting one
    /// if it's absent — used to turn a `Matcher` OR-list into SQL ids
    /// without side effects on a read path.
    pub fn lookup_attr_id(&self, attr: &Attr) -> crate::Result<Option<i64>> {
        let bytes = attr.encode_value_bytes()?;
        let code = attr.code() as u8;
        self.conn
            .query_row("SELECT id FROM attrs WHERE code = ?1 AND value = ?2", (code, &bytes), |row| row.get(0))
            .optional()
            .map_err(Into::into)
    }

    fn intern_attr(&self, attr: &Attr) -> crate::Result<i64> {
        let bytes = attr.encode_value_bytes()?;
        let code = attr.code() as u8;
        self.conn
            .execute("INSERT OR IGNORE INTO attrs(code, value) VALUES (?1, ?2)", (code, &bytes))?;
        let id = self
            .conn
            .query_row("SELECT id FROM attrs WHERE code = ?1 AND value = ?2", (code, &bytes), |row| row.get(0))?;
        Ok(id)
    }

    /// Inserts one record. `unique` and `other` partition the record's
    /// summarisable attributes (excluding `reftime`/`source`/`note`) as the
    /// dataset's configuration says: `unique` is the tuple a `UNIQUE`
    /// constraint is built over, `other` is everything summarisable left.
    /// Fails with [`Error::DuplicateInsert`] if `unique`'s tuple is already
    /// present (spec §4.6).
    pub fn insert(&self, md: &Metadata, offset: u64, size: u64) -> crate::Result<i64> {
        let reftime = md.reftime()?;
        let reftime_text = reftime.representative().to_sql_text();
        let notes_bytes = NoteLog(md.notes().to_vec()).encode()?;

        let unique_attrs: Vec<Attr> = self
            .unique_codes
            .iter()
            .filter_map(|code| md.get(*code).cloned())
            .collect();
        let other_attrs: Vec<Attr> = md
            .items()
            .iter()
            .filter(|a| {
                !self.unique_codes.contains(&a.code())
                    && !self.indexed_codes.contains(&a.code())
                    && a.code() != Code::Reftime
                    && a.code() != Code::Source
            })
            .cloned()
            .collect();

        let uniq_id = self.intern("mduniq", &encode_tuple(&unique_attrs)?)?;
        let other_id = self.intern("mdother", &encode_tuple(&other_attrs)?)?;

        let mut column_names = vec!["offset".to_string(), "size".to_string(), "notes".to_string(), "reftime".to_string()];
        let mut values: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(offset as i64), Box::new(size as i64), Box::new(notes_bytes), Box::new(reftime_text)];

        for code in &self.indexed_codes {
            let id = match md.get(*code) {
                Some(attr) => Some(self.intern_attr(attr)?),
                None => None,
            };
            column_names.push(column_name(*code));
            values.push(Box::new(id));
        }
        column_names.push("uniq_id".to_string());
        values.push(Box::new(uniq_id));
        column_names.push("other_id".to_string());
        values.push(Box::new(other_id));

        let placeholders = vec!["?"; column_names.len()].join(", ");
        let sql = format!("INSERT INTO md({}) VALUES ({placeholders})", column_names.join(", "));
        let params: Vec<&dyn rusqlite::ToSql> = values.iter().map(|b| b.as_ref()).collect();

        match self.conn.execute(&sql, params_from_iter(params)) {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => Err(Error::DuplicateInsert {
                dataset: path_label(&self.conn),
                id: format!("{unique_attrs:?}"),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolves a `c_<code>` column's interned id back to its `Attr`.
    fn resolve_indexed_id(&self, code: Code, id: i64) -> crate::Result<Attr> {
        let bytes: Vec<u8> = self.conn.query_row("SELECT value FROM attrs WHERE id = ?1", [id], |row| row.get(0))?;
        Attr::decode_value(code, &mut &bytes[..])
    }

    fn select_columns(&self) -> String {
        let mut cols = "md.id, md.offset, md.size, md.notes, md.reftime, mduniq.data, mdother.data".to_string();
        for code in &self.indexed_codes {
            cols.push_str(&format!(", md.{}", column_name(*code)));
        }
        cols
    }

    fn row_to_record(&self, id: i64, offset: i64, size: i64, notes: Option<Vec<u8>>, reftime_text: String, uniq_bytes: Vec<u8>, other_bytes: Option<Vec<u8>>, indexed_ids: Vec<Option<i64>>) -> crate::Result<IndexedRecord> {
        let notes = match notes {
            Some(bytes) => NoteLog::decode_from(&mut &bytes[..])?,
            None => NoteLog::default(),
        };
        let mut indexed = Vec::new();
        for (code, maybe_id) in self.indexed_codes.iter().zip(indexed_ids) {
            if let Some(attr_id) = maybe_id {
                indexed.push(self.resolve_indexed_id(*code, attr_id)?);
            }
        }
        Ok(IndexedRecord {
            id,
            offset: offset as u64,
            size: size as u64,
            reftime_text,
            notes,
            uniq: decode_tuple(&uniq_bytes)?,
            other: other_bytes.map(|b| decode_tuple(&b)).transpose()?.unwrap_or_default(),
            indexed,
        })
    }

    /// All rows, in id order (the offset order data was appended in).
    pub fn scan_all(&self) -> crate::Result<Vec<IndexedRecord>> {
        let sql = format!(
            "SELECT {}
             FROM md
             JOIN mduniq ON mduniq.id = md.uniq_id
             LEFT JOIN mdother ON mdother.id = md.other_id
             ORDER BY md.id",
            self.select_columns()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let indexed_count = self.indexed_codes.len();
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let offset: i64 = row.get(1)?;
            let size: i64 = row.get(2)?;
            let notes: Option<Vec<u8>> = row.get(3)?;
            let reftime_text: String = row.get(4)?;
            let uniq_bytes: Vec<u8> = row.get(5)?;
            let other_bytes: Option<Vec<u8>> = row.get(6)?;
            let indexed_ids: rusqlite::Result<Vec<Option<i64>>> = (0..indexed_count).map(|i| row.get(7 + i)).collect();
            Ok((id, offset, size, notes, reftime_text, uniq_bytes, other_bytes, indexed_ids?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, offset, size, notes, reftime_text, uniq_bytes, other_bytes, indexed_ids) = row?;
            out.push(self.row_to_record(id, offset, size, notes, reftime_text, uniq_bytes, other_bytes, indexed_ids)?);
        }
        Ok(out)
    }

    pub fn get(&self, id: i64) -> crate::Result<Option<IndexedRecord>> {
        let sql = format!(
            "SELECT {}
             FROM md
             JOIN mduniq ON mduniq.id = md.uniq_id
             LEFT JOIN mdother ON mdother.id = md.other_id
             WHERE md.id = ?1",
            self.select_columns()
        );
        let indexed_count = self.indexed_codes.len();
        #[allow(clippy::type_complexity)]
        let found: Option<(i64, i64, i64, Option<Vec<u8>>, String, Vec<u8>, Option<Vec<u8>>, Vec<Option<i64>>)> = self
            .conn
            .query_row(&sql, [id], |row| {
                let indexed_ids: rusqlite::Result<Vec<Option<i64>>> = (0..indexed_count).map(|i| row.get(7 + i)).collect();
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?, indexed_ids?))
            })
            .optional()?;

        let Some((id, offset, size, notes, reftime_text, uniq_bytes, other_bytes, indexed_ids)) = found else {
            return Ok(None);
        };
        Ok(Some(self.row_to_record(id, offset, size, notes, reftime_text, uniq_bytes, other_bytes, indexed_ids)?))
    }

    /// Rows satisfying `where_sql` (a boolean expression over `md.*`
    /// columns, built by the query engine from `Matcher::sql_fragment`
    /// across this index's indexed codes and `md.reftime`), in id order.
    /// `None` runs an unfiltered scan, equivalent to `scan_all` but
    /// through the same query path.
    pub fn query(&self, where_sql: Option<&str>) -> crate::Result<Vec<IndexedRecord>> {
        let sql = format!(
            "SELECT {}
             FROM md
             JOIN mduniq ON mduniq.id = md.uniq_id
             LEFT JOIN mdother ON mdother.id = md.other_id
             {}
             ORDER BY md.id",
            self.select_columns(),
            where_sql.map(|w| format!("WHERE {w}")).unwrap_or_default(),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let indexed_count = self.indexed_codes.len();
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let offset: i64 = row.get(1)?;
            let size: i64 = row.get(2)?;
            let notes: Option<Vec<u8>> = row.get(3)?;
            let reftime_text: String = row.get(4)?;
            let uniq_bytes: Vec<u8> = row.get(5)?;
            let other_bytes: Option<Vec<u8>> = row.get(6)?;
            let indexed_ids: rusqlite::Result<Vec<Option<i64>>> = (0..indexed_count).map(|i| row.get(7 + i)).collect();
            Ok((id, offset, size, notes, reftime_text, uniq_bytes, other_bytes, indexed_ids?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, offset, size, notes, reftime_text, uniq_bytes, other_bytes, indexed_ids) = row?;
            out.push(self.row_to_record(id, offset, size, notes, reftime_text, uniq_bytes, other_bytes, indexed_ids)?);
        }
        Ok(out)
    }

    pub fn len(&self) -> crate::Result<u64> {
        Ok(self.conn.query_row("SELECT COUNT(*) FROM md", [], |row| row.get::<_, i64>(0))? as u64)
    }

    #[must_use]
    pub fn is_empty_index(&self) -> bool {
        self.len().map(|n| n == 0).unwrap_or(true)
    }

    #[must_use]
    pub fn indexed_codes(&self) -> &[Code] {
        &self.indexed_codes
    }

    #[must_use]
    pub fn unique_codes(&self) -> &[Code] {
        &self.unique_codes
    }

    /// The existing row, if any, whose `unique` projection equals `md`'s
    /// own (spec §4.10's `replace` path: find what a would-be duplicate
    /// insert collides with, before the collision is even attempted).
    pub fn find_by_unique(&self, md: &Metadata) -> crate::Result<Option<IndexedRecord>> {
        let unique_attrs: Vec<Attr> = self.unique_codes.iter().filter_map(|code| md.get(*code).cloned()).collect();
        let tuple = encode_tuple(&unique_attrs)?;
        let id: Option<i64> = self
            .conn
            .query_row("SELECT md.id FROM md JOIN mduniq ON mduniq.id = md.uniq_id WHERE mduniq.data = ?1", [&tuple], |row| row.get(0))
            .optional()?;
        match id {
            Some(id) => self.get(id),
            None => Ok(None),
        }
    }

    /// Removes one row by id, leaving its interned `mduniq`/`mdother`/
    /// `attrs` entries in place (they may be shared by other rows, and
    /// orphans are harmless — just unreferenced).
    pub fn delete(&self, id: i64) -> crate::Result<()> {
        self.conn.execute("DELETE FROM md WHERE id = ?1", [id])?;
        Ok(())
    }
}

fn path_label(conn: &Connection) -> String {
    conn.path().map(|p| p.to_string()).unwrap_or_else(|| "<memory>".to_string())
}

impl Attr {
    fn encode_value_bytes(&self) -> crate::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode_value(&mut buf)?;
        Ok(buf)
    }
}
