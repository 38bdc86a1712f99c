//! Image lifecycle: create, replace, remove and paint stored images.
//!
//! Every operation is a plain method call with its request data passed in;
//! the service keeps no per-request state. Ordering rules:
//! - detection runs before any mutation, so a detection failure leaves the
//!   database and the static root untouched;
//! - on create the file is written only after the transaction commits;
//! - on update and remove the old file is deleted before the transaction.

pub mod annotate;
pub mod color;

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::AnnotationConfig;
use crate::db::{Database, ImageRecord, Table};
use crate::detection::FaceDetector;
use crate::error::{Error, Result};
use crate::storage::{filename_from_address, generate_filename, ImageStore};

use annotate::{paint_marks, parse_landmark, MarkStyle};
use color::{parse_color, DEFAULT_MARK_COLOR};

/// Upper bound on bytes read when fetching a remote image for painting.
const MAX_REMOTE_IMAGE_BYTES: u64 = 50 * 1024 * 1024;

/// An uploaded image as received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub title: Option<String>,
    pub bytes: Vec<u8>,
}

/// Host and port the client reached us on; used to build public addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub host: String,
    pub port: u16,
}

pub struct ImageService {
    db: Database,
    store: ImageStore,
    detector: Arc<dyn FaceDetector>,
    annotation: AnnotationConfig,
    fetch_agent: ureq::Agent,
}

impl ImageService {
    pub fn new(
        db: Database,
        store: ImageStore,
        detector: Arc<dyn FaceDetector>,
        annotation: AnnotationConfig,
    ) -> Self {
        let fetch_agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .build();

        Self {
            db,
            store,
            detector,
            annotation,
            fetch_agent,
        }
    }

    #[cfg(test)]
    pub(crate) fn database(&self) -> &Database {
        &self.db
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    pub fn list(&self) -> Result<Vec<ImageRecord>> {
        self.db.list_images()
    }

    /// Detect faces in an upload, persist the image with its faces and store
    /// the file. Returns the new image id.
    pub fn create(&self, upload: &Upload, origin: &Origin) -> Result<i64> {
        let filename = generate_filename(&upload.filename)?;
        let faces = self.detector.detect(&upload.bytes)?;
        debug!(detector = self.detector.provider_name(), faces = faces.len(), "Faces detected");

        let address = self.store.address(&origin.host, origin.port, &filename);
        let image_id = self
            .db
            .create_image_with_faces(upload.title.as_deref(), &address, &faces)?;

        self.store
            .write(&self.store.image_path(&filename), &upload.bytes)?;

        info!(image_id, faces = faces.len(), address = %address, "Image created");
        Ok(image_id)
    }

    /// Replace an existing image's content and faces. The title is replaced
    /// only when the upload carries one.
    pub fn update(&self, image_id: i64, upload: &Upload, origin: &Origin) -> Result<i64> {
        let current = self
            .db
            .get_image(image_id)?
            .ok_or(Error::NotFound(image_id))?;

        let filename = generate_filename(&upload.filename)?;
        let faces = self.detector.detect(&upload.bytes)?;
        debug!(detector = self.detector.provider_name(), faces = faces.len(), "Faces detected");

        let address = self.store.address(&origin.host, origin.port, &filename);
        self.remove_stored_file(&current.address)?;

        let title = upload.title.as_deref().or(current.title.as_deref());
        self.db.replace_image(image_id, title, &address, &faces)?;

        self.store
            .write(&self.store.image_path(&filename), &upload.bytes)?;

        info!(image_id, faces = faces.len(), address = %address, "Image replaced");
        Ok(image_id)
    }

    /// Delete an image's file, faces and row.
    pub fn remove(&self, image_id: i64) -> Result<()> {
        let current = self
            .db
            .get_image(image_id)?
            .ok_or(Error::NotFound(image_id))?;

        self.remove_stored_file(&current.address)?;
        self.db.remove_image(image_id)?;

        info!(image_id, "Image removed");
        Ok(())
    }

    /// Render the image with a mark at every stored landmark, as JPEG.
    pub fn paint(&self, image_id: i64, color: Option<&str>) -> Result<Vec<u8>> {
        if !self.db.exists_by_id(Table::Images, image_id)? {
            return Err(Error::NotFound(image_id));
        }

        let mark_color = match color {
            Some(name) => parse_color(name)?,
            None => DEFAULT_MARK_COLOR,
        };

        let rows = self.db.fetch_image_with_faces(image_id)?;
        let Some(first) = rows.first() else {
            // Deleted between the existence check and the fetch.
            return Err(Error::NotFound(image_id));
        };

        let mut points = Vec::new();
        for landmark in rows.iter().filter_map(|row| row.landmark.as_deref()) {
            points.extend(parse_landmark(landmark)?);
        }

        let bytes = self.load_image_bytes(&first.address)?;
        let style = MarkStyle {
            color: mark_color,
            radius: self.annotation.mark_radius,
            jpeg_quality: self.annotation.jpeg_quality,
        };
        let jpeg = paint_marks(&bytes, &points, &style)?;

        debug!(image_id, marks = points.len(), "Image painted");
        Ok(jpeg)
    }

    fn remove_stored_file(&self, address: &str) -> Result<()> {
        match self.store.resolve_address(address) {
            Some(path) => {
                self.store.remove(&path)?;
            }
            None => warn!(address = %address, "Stored address does not name a file"),
        }
        Ok(())
    }

    /// Local static addresses are read from disk; anything else is fetched.
    fn load_image_bytes(&self, address: &str) -> Result<Vec<u8>> {
        if let Some(path) = self.local_path(address) {
            return self.store.read(&path);
        }

        debug!(address = %address, "Fetching remote image");
        let fetch_error = |reason: String| Error::Fetch {
            url: address.to_string(),
            reason,
        };
        let response = self
            .fetch_agent
            .get(address)
            .call()
            .map_err(|e| fetch_error(e.to_string()))?;

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_REMOTE_IMAGE_BYTES)
            .read_to_end(&mut bytes)
            .map_err(|e| fetch_error(e.to_string()))?;
        Ok(bytes)
    }

    /// The on-disk path for an address served from our own static root.
    fn local_path(&self, address: &str) -> Option<PathBuf> {
        let without_scheme = address
            .strip_prefix("http://")
            .or_else(|| address.strip_prefix("https://"))?;
        let path = &without_scheme[without_scheme.find('/')?..];
        let path = path.split(['?', '#']).next().unwrap_or(path);

        let name = filename_from_address(path)?;
        let expected = format!(
            "/{}/images/{}",
            self.store.static_url().trim_matches('/'),
            name
        );
        (path == expected).then(|| self.store.image_path(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::detection::stub::{face, StubDetector};
    use image::{GenericImageView, ImageFormat, Rgb, RgbImage};
    use serde_json::json;
    use std::io::Cursor;

    struct Harness {
        service: ImageService,
        detector: Arc<StubDetector>,
        _root: tempfile::TempDir,
    }

    fn harness(detector: Arc<StubDetector>) -> Harness {
        let root = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let store = ImageStore::new(&StorageConfig {
            static_root: root.path().to_path_buf(),
            static_url: "static".to_string(),
        });
        let service = ImageService::new(db, store, detector.clone(), AnnotationConfig::default());
        Harness {
            service,
            detector,
            _root: root,
        }
    }

    fn origin() -> Origin {
        Origin {
            host: "localhost".to_string(),
            port: 8000,
        }
    }

    fn upload(filename: &str, bytes: &[u8]) -> Upload {
        Upload {
            filename: filename.to_string(),
            title: None,
            bytes: bytes.to_vec(),
        }
    }

    fn stored_files(service: &ImageService) -> Vec<PathBuf> {
        match std::fs::read_dir(service.store().images_dir()) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([100, 100, 100]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_create_persists_rows_and_file() {
        let landmark = json!({"left_eye": {"x": 10, "y": 20}});
        let h = harness(StubDetector::returning(vec![face(landmark.clone())]));

        let id = h.service.create(&upload("face.png", b"png-bytes"), &origin()).unwrap();

        let image = h.service.database().get_image(id).unwrap().unwrap();
        assert!(image.address.starts_with("http://localhost:8000/static/images/"));
        assert!(image.address.ends_with(".png"));

        let rows = h.service.database().fetch_image_with_faces(id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].address, image.address);
        let stored: serde_json::Value = serde_json::from_str(rows[0].landmark.as_deref().unwrap()).unwrap();
        assert_eq!(stored, landmark);

        let files = stored_files(&h.service);
        assert_eq!(files, vec![h.service.store().resolve_address(&image.address).unwrap()]);
        assert_eq!(std::fs::read(&files[0]).unwrap(), b"png-bytes");
    }

    #[test]
    fn test_create_detection_failure_mutates_nothing() {
        let h = harness(StubDetector::failing(400));

        let err = h.service.create(&upload("face.png", b"x"), &origin()).unwrap_err();

        assert!(matches!(err, Error::Detection { status: 400, .. }));
        assert!(h.service.list().unwrap().is_empty());
        assert!(stored_files(&h.service).is_empty());
    }

    #[test]
    fn test_create_rejects_name_without_extension_before_detection() {
        let h = harness(StubDetector::returning(vec![]));

        let err = h.service.create(&upload("face", b"x"), &origin()).unwrap_err();

        assert!(matches!(err, Error::InvalidFilename(_)));
        assert_eq!(h.detector.calls(), 0);
        assert!(h.service.list().unwrap().is_empty());
    }

    #[test]
    fn test_create_failed_transaction_writes_no_file() {
        let h = harness(StubDetector::returning(vec![face(json!({"a": {"x": 1, "y": 1}}))]));
        h.service
            .database()
            .with_connection(|conn| conn.execute_batch("DROP TABLE faces"))
            .unwrap();

        let err = h.service.create(&upload("face.png", b"x"), &origin()).unwrap_err();

        assert!(matches!(err, Error::Database(_)));
        assert!(h.service.list().unwrap().is_empty());
        assert!(stored_files(&h.service).is_empty());
    }

    #[test]
    fn test_create_rejects_extension_that_breaks_address() {
        let h = harness(StubDetector::returning(vec![]));

        let err = h.service.create(&upload("face.jp?g", b"x"), &origin()).unwrap_err();

        assert!(matches!(err, Error::InvalidFilename(_)));
        assert_eq!(h.detector.calls(), 0);
        assert!(stored_files(&h.service).is_empty());
    }

    #[test]
    fn test_stored_file_resolves_from_address() {
        let h = harness(StubDetector::returning(vec![]));
        let id = h.service.create(&upload("face.JPG", b"x"), &origin()).unwrap();
        let address = h.service.database().get_image(id).unwrap().unwrap().address;

        assert_eq!(
            stored_files(&h.service),
            vec![h.service.store().resolve_address(&address).unwrap()]
        );
        h.service.remove(id).unwrap();
        assert!(stored_files(&h.service).is_empty());
    }

    #[test]
    fn test_update_replaces_file_and_faces() {
        let h = harness(StubDetector::returning(vec![
            face(json!({"a": {"x": 1, "y": 1}})),
            face(json!({"b": {"x": 2, "y": 2}})),
            face(json!({"c": {"x": 3, "y": 3}})),
        ]));
        let mut first = upload("old.jpg", b"old");
        first.title = Some("kept".to_string());
        let id = h.service.create(&first, &origin()).unwrap();
        let old_address = h.service.database().get_image(id).unwrap().unwrap().address;
        let old_path = h.service.store().resolve_address(&old_address).unwrap();

        h.detector.set_faces(vec![face(json!({"d": {"x": 4, "y": 4}}))]);
        let returned = h.service.update(id, &upload("new.png", b"new"), &origin()).unwrap();

        assert_eq!(returned, id);
        let image = h.service.database().get_image(id).unwrap().unwrap();
        assert_ne!(image.address, old_address);
        assert!(image.address.ends_with(".png"));
        assert_eq!(image.title.as_deref(), Some("kept"));

        assert!(!old_path.exists());
        let new_path = h.service.store().resolve_address(&image.address).unwrap();
        assert_eq!(std::fs::read(new_path).unwrap(), b"new");
        assert_eq!(stored_files(&h.service).len(), 1);
        assert_eq!(h.service.database().count_faces_for_image(id).unwrap(), 1);
    }

    #[test]
    fn test_update_missing_image() {
        let h = harness(StubDetector::returning(vec![]));

        let err = h.service.update(7, &upload("a.jpg", b"x"), &origin()).unwrap_err();

        assert!(matches!(err, Error::NotFound(7)));
        assert_eq!(h.detector.calls(), 0);
    }

    #[test]
    fn test_update_tolerates_missing_old_file() {
        let h = harness(StubDetector::returning(vec![]));
        let id = h.service.create(&upload("a.jpg", b"x"), &origin()).unwrap();
        for path in stored_files(&h.service) {
            std::fs::remove_file(path).unwrap();
        }

        h.service.update(id, &upload("b.jpg", b"y"), &origin()).unwrap();

        assert_eq!(stored_files(&h.service).len(), 1);
    }

    #[test]
    fn test_update_detection_failure_keeps_old_state() {
        let h = harness(StubDetector::returning(vec![face(json!({"a": {"x": 1, "y": 1}}))]));
        let id = h.service.create(&upload("a.jpg", b"x"), &origin()).unwrap();
        let before = h.service.database().get_image(id).unwrap().unwrap();

        h.detector.set_failing(403);
        let err = h.service.update(id, &upload("b.jpg", b"y"), &origin()).unwrap_err();

        assert!(matches!(err, Error::Detection { status: 403, .. }));
        assert_eq!(h.service.database().get_image(id).unwrap().unwrap(), before);
        assert_eq!(h.service.database().count_faces_for_image(id).unwrap(), 1);
        assert!(h.service.store().resolve_address(&before.address).unwrap().exists());
    }

    #[test]
    fn test_remove_missing_image() {
        let h = harness(StubDetector::returning(vec![]));
        let id = h.service.create(&upload("a.jpg", b"x"), &origin()).unwrap();

        assert!(matches!(h.service.remove(id + 1), Err(Error::NotFound(_))));
        assert_eq!(h.service.list().unwrap().len(), 1);
        assert_eq!(stored_files(&h.service).len(), 1);
    }

    #[test]
    fn test_remove_twice() {
        let h = harness(StubDetector::returning(vec![face(json!({"a": {"x": 1, "y": 1}}))]));
        let id = h.service.create(&upload("a.jpg", b"x"), &origin()).unwrap();

        h.service.remove(id).unwrap();
        assert!(stored_files(&h.service).is_empty());
        assert!(h.service.database().fetch_image_with_faces(id).unwrap().is_empty());

        assert!(matches!(h.service.remove(id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_remove_tolerates_missing_file() {
        let h = harness(StubDetector::returning(vec![]));
        let id = h.service.create(&upload("a.jpg", b"x"), &origin()).unwrap();
        for path in stored_files(&h.service) {
            std::fs::remove_file(path).unwrap();
        }

        h.service.remove(id).unwrap();
        assert!(h.service.list().unwrap().is_empty());
    }

    #[test]
    fn test_paint_two_faces_in_red() {
        let h = harness(StubDetector::returning(vec![
            face(json!({"left_eye": {"x": 10, "y": 12}, "right_eye": {"x": 30, "y": 12}})),
            face(json!({"left_eye": {"x": 50, "y": 30}})),
        ]));
        let id = h.service.create(&upload("group.png", &png(64, 40)), &origin()).unwrap();

        let jpeg = h.service.paint(id, Some("red")).unwrap();

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (64, 40));
        let rgb = decoded.to_rgb8();
        for (x, y) in [(10, 12), (30, 12), (50, 30)] {
            let Rgb([r, g, b]) = *rgb.get_pixel(x, y);
            assert!(r > 170 && g < 100 && b < 100, "pixel at ({x}, {y}) is {:?}", [r, g, b]);
        }
    }

    #[test]
    fn test_paint_defaults_to_white() {
        let h = harness(StubDetector::returning(vec![face(json!({"nose": {"x": 8, "y": 8}}))]));
        let id = h.service.create(&upload("a.png", &png(16, 16)), &origin()).unwrap();

        let rgb = image::load_from_memory(&h.service.paint(id, None).unwrap()).unwrap().to_rgb8();

        let Rgb([r, g, b]) = *rgb.get_pixel(8, 8);
        assert!(r > 200 && g > 200 && b > 200);
    }

    #[test]
    fn test_paint_image_without_faces() {
        let h = harness(StubDetector::returning(vec![]));
        let id = h.service.create(&upload("a.png", &png(12, 9)), &origin()).unwrap();

        let jpeg = h.service.paint(id, Some("blue")).unwrap();
        assert_eq!(image::load_from_memory(&jpeg).unwrap().dimensions(), (12, 9));
    }

    #[test]
    fn test_paint_errors() {
        let h = harness(StubDetector::returning(vec![]));
        assert!(matches!(h.service.paint(1, None), Err(Error::NotFound(1))));

        let id = h.service.create(&upload("a.png", b"not an image"), &origin()).unwrap();
        assert!(matches!(h.service.paint(id, None), Err(Error::ImageDecode(_))));
        assert!(matches!(h.service.paint(id, Some("nope")), Err(Error::InvalidColor(_))));
    }

    #[test]
    fn test_local_path_matches_only_own_static_urls() {
        let h = harness(StubDetector::returning(vec![]));
        let store = h.service.store();

        assert_eq!(
            h.service.local_path("http://10.0.0.1:9000/static/images/abc.jpg"),
            Some(store.image_path("abc.jpg"))
        );
        assert_eq!(h.service.local_path("https://cdn.example.com/photos/abc.jpg"), None);
        assert_eq!(h.service.local_path("not a url"), None);
    }
}
