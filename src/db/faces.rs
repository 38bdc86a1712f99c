//! Queries over the `faces` table.

use rusqlite::{params, Connection};

use crate::detection::DetectedFace;
use crate::error::Result;

/// A stored face with its geometry still in JSON form.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub struct FaceRow {
    pub id: i64,
    pub image_id: i64,
    pub landmark: Option<serde_json::Value>,
    pub rectangle: Option<serde_json::Value>,
}

fn to_json_text(value: Option<&serde_json::Value>) -> Result<Option<String>> {
    Ok(value.map(serde_json::to_string).transpose()?)
}

#[cfg(test)]
fn from_json_text(text: Option<String>) -> Result<Option<serde_json::Value>> {
    Ok(text.as_deref().map(serde_json::from_str).transpose()?)
}

/// Insert one row per face. The caller is expected to hold a transaction.
pub fn insert_faces(conn: &Connection, image_id: i64, faces: &[DetectedFace]) -> Result<()> {
    let mut stmt =
        conn.prepare("INSERT INTO faces (image_id, landmark, rectangle) VALUES (?, ?, ?)")?;
    for face in faces {
        let landmark = to_json_text(face.landmark.as_ref())?;
        let rectangle = to_json_text(face.rectangle.as_ref())?;
        stmt.execute(params![image_id, landmark, rectangle])?;
    }
    Ok(())
}

pub fn delete_faces_by_image(conn: &Connection, image_id: i64) -> Result<usize> {
    let count = conn.execute("DELETE FROM faces WHERE image_id = ?", params![image_id])?;
    Ok(count)
}

#[cfg(test)]
pub(crate) fn get_faces_for_image(conn: &Connection, image_id: i64) -> Result<Vec<FaceRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, image_id, landmark, rectangle FROM faces WHERE image_id = ? ORDER BY id",
    )?;
    let raw = stmt
        .query_map(params![image_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    raw.into_iter()
        .map(|(id, image_id, landmark, rectangle)| {
            Ok(FaceRow {
                id,
                image_id,
                landmark: from_json_text(landmark)?,
                rectangle: from_json_text(rectangle)?,
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) fn count_faces_for_image(conn: &Connection, image_id: i64) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM faces WHERE image_id = ?",
        params![image_id],
        |row| row.get(0),
    )?;
    Ok(count)
}
