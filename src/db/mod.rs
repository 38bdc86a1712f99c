mod schema;
pub mod faces;
pub mod images;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

#[cfg(test)]
pub use faces::FaceRow;
pub use images::{ImageFaceRow, ImageRecord, Table};
pub use schema::SCHEMA;

use crate::detection::DetectedFace;
use crate::error::Result;

/// SQLite-backed store for images and their faces.
///
/// The connection sits behind a mutex so a single `Database` can be shared by
/// every request worker. Multi-statement workflows run inside one transaction
/// each and roll back if any statement fails.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(schema::PRAGMAS)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn initialize(&self) -> Result<()> {
        self.lock().execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Run `f` against the raw connection. Tests use this to break the
    /// schema underneath a workflow.
    #[cfg(test)]
    pub(crate) fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> T) -> T {
        f(&*self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a half-applied
        // transaction behind: rusqlite rolls back on drop.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ========================================================================
    // Transactional workflows
    // ========================================================================

    /// Insert an image and its faces atomically, returning the new image id.
    pub fn create_image_with_faces(
        &self,
        title: Option<&str>,
        address: &str,
        faces: &[DetectedFace],
    ) -> Result<i64> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let image_id = images::insert_image(&tx, title, address)?;
        faces::insert_faces(&tx, image_id, faces)?;
        tx.commit()?;
        Ok(image_id)
    }

    /// Point an image at new content and replace all of its faces atomically.
    pub fn replace_image(
        &self,
        image_id: i64,
        title: Option<&str>,
        address: &str,
        faces: &[DetectedFace],
    ) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        images::update_image(&tx, image_id, title, address)?;
        faces::delete_faces_by_image(&tx, image_id)?;
        faces::insert_faces(&tx, image_id, faces)?;
        tx.commit()?;
        Ok(())
    }

    /// Delete an image's faces and then the image itself atomically.
    pub fn remove_image(&self, image_id: i64) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        faces::delete_faces_by_image(&tx, image_id)?;
        images::delete_image(&tx, image_id)?;
        tx.commit()?;
        Ok(())
    }

    // ========================================================================
    // Single-statement operations
    // ========================================================================

    pub fn exists_by_id(&self, table: Table, id: i64) -> Result<bool> {
        images::exists_by_id(&self.lock(), table, id)
    }

    pub fn get_image(&self, image_id: i64) -> Result<Option<ImageRecord>> {
        images::get_image(&self.lock(), image_id)
    }

    pub fn list_images(&self) -> Result<Vec<ImageRecord>> {
        images::list_images(&self.lock())
    }

    pub fn fetch_image_with_faces(&self, image_id: i64) -> Result<Vec<ImageFaceRow>> {
        images::fetch_image_with_faces(&self.lock(), image_id)
    }

    #[cfg(test)]
    pub(crate) fn get_faces_for_image(&self, image_id: i64) -> Result<Vec<FaceRow>> {
        faces::get_faces_for_image(&self.lock(), image_id)
    }

    #[cfg(test)]
    pub(crate) fn count_faces_for_image(&self, image_id: i64) -> Result<i64> {
        faces::count_faces_for_image(&self.lock(), image_id)
    }
}
