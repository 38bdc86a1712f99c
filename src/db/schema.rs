pub const SCHEMA: &str = r#"
-- Uploaded images; `image` holds the public address of the stored file
CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NULL,
    image TEXT NOT NULL
);

-- Faces reported by the detection API, one row per face
CREATE TABLE IF NOT EXISTS faces (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    image_id INTEGER NOT NULL,
    landmark TEXT NULL,   -- JSON object: point name -> {x, y}
    rectangle TEXT NULL,  -- JSON bounding box as returned by the API
    FOREIGN KEY (image_id) REFERENCES images(id)
);

CREATE INDEX IF NOT EXISTS idx_faces_image ON faces(image_id);
"#;

/// Per-connection settings. Foreign keys are off by default in SQLite.
pub const PRAGMAS: &str = r#"
PRAGMA foreign_keys = ON;
"#;
