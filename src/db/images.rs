//! Queries over the `images` table.
//!
//! Functions take a plain `&Connection` so they compose inside a
//! `rusqlite::Transaction` (which derefs to `Connection`).

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::Result;

/// A stored image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRecord {
    pub id: i64,
    pub title: Option<String>,
    pub address: String,
}

/// One row of the image/face join. Face columns are null when the image
/// has no detected faces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFaceRow {
    pub address: String,
    pub rectangle: Option<String>,
    pub landmark: Option<String>,
}

/// Tables that can be checked with [`exists_by_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Images,
    Faces,
}

impl Table {
    fn exists_query(self) -> &'static str {
        match self {
            Table::Images => "SELECT EXISTS(SELECT 1 FROM images WHERE id = ?)",
            Table::Faces => "SELECT EXISTS(SELECT 1 FROM faces WHERE id = ?)",
        }
    }
}

pub fn insert_image(conn: &Connection, title: Option<&str>, address: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO images (title, image) VALUES (?, ?)",
        params![title, address],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_image(conn: &Connection, id: i64, title: Option<&str>, address: &str) -> Result<()> {
    conn.execute(
        "UPDATE images SET title = ?, image = ? WHERE id = ?",
        params![title, address, id],
    )?;
    Ok(())
}

pub fn delete_image(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM images WHERE id = ?", params![id])?;
    Ok(())
}

pub fn get_image(conn: &Connection, id: i64) -> Result<Option<ImageRecord>> {
    let record = conn
        .query_row(
            "SELECT id, title, image FROM images WHERE id = ?",
            params![id],
            |row| {
                Ok(ImageRecord {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    address: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(record)
}

pub fn list_images(conn: &Connection) -> Result<Vec<ImageRecord>> {
    let mut stmt = conn.prepare("SELECT id, title, image FROM images ORDER BY id")?;
    let records = stmt
        .query_map([], |row| {
            Ok(ImageRecord {
                id: row.get(0)?,
                title: row.get(1)?,
                address: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

pub fn fetch_image_with_faces(conn: &Connection, image_id: i64) -> Result<Vec<ImageFaceRow>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT i.image, f.rectangle, f.landmark
        FROM images i
        LEFT JOIN faces f ON f.image_id = i.id
        WHERE i.id = ?
        ORDER BY f.id
        "#,
    )?;
    let rows = stmt
        .query_map(params![image_id], |row| {
            Ok(ImageFaceRow {
                address: row.get(0)?,
                rectangle: row.get(1)?,
                landmark: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn exists_by_id(conn: &Connection, table: Table, id: i64) -> Result<bool> {
    let exists = conn.query_row(table.exists_query(), params![id], |row| row.get(0))?;
    Ok(exists)
}
