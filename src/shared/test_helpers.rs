use async_trait::async_trait;
use axum::{http::StatusCode, Router};
use axum_test::TestServer;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use crate::core::app::{build_router, AppServices};
use crate::core::config::{MapConfig, SessionConfig, StorageConfig};
use crate::core::database::run_migrations;
use crate::features::auth::model::{Role, User};
use crate::features::auth::services::password::hash_password;
use crate::modules::recognition::{Detection, ObjectDetector, RecognitionPipeline, TextRecognizer};

/// Fresh in-memory database with migrations applied.
///
/// A single connection keeps every query on the same in-memory database.
pub async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("valid sqlite url")
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("in-memory sqlite");

    run_migrations(&pool).await.expect("migrations apply");
    pool
}

pub fn test_session_config() -> SessionConfig {
    SessionConfig {
        secret_key: "test-secret-key".to_string(),
        cookie_secure: false,
        ttl: Duration::from_secs(3600),
    }
}

pub fn test_storage_config(root: &Path) -> StorageConfig {
    StorageConfig {
        upload_dir: root.join("uploads"),
        results_dir: root.join("results"),
        max_content_length: 1024 * 1024,
        allowed_extensions: ["png", "jpg", "jpeg", "gif"]
            .iter()
            .map(|e| e.to_string())
            .collect(),
        unique_filenames: true,
    }
}

pub fn test_map_config() -> MapConfig {
    MapConfig {
        default_lat: 9.082,
        default_lng: 8.6753,
        default_zoom: 6,
    }
}

/// Insert a user directly, bypassing registration
pub async fn insert_user(pool: &SqlitePool, email: &str, password: &str) -> User {
    insert_user_with_role(pool, email, password, Role::User).await
}

pub async fn insert_user_with_role(
    pool: &SqlitePool,
    email: &str,
    password: &str,
    role: Role,
) -> User {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (name, email, password_hash, role, created_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind("Test User")
    .bind(email)
    .bind(hash_password(password).expect("hash"))
    .bind(role)
    .bind(chrono::Utc::now())
    .fetch_one(pool)
    .await
    .expect("insert user")
}

/// OCR stand-in returning fixed text
pub struct StubOcr(pub &'static str);

#[async_trait]
impl TextRecognizer for StubOcr {
    fn name(&self) -> &'static str {
        "ocr"
    }

    async fn extract_text(&self, _path: &Path) -> anyhow::Result<String> {
        Ok(self.0.to_string())
    }
}

/// Detector stand-in returning fixed labels
pub struct StubDetector(pub Vec<(&'static str, f32)>);

#[async_trait]
impl ObjectDetector for StubDetector {
    fn name(&self) -> &'static str {
        "yolo"
    }

    async fn detect(&self, _path: &Path) -> anyhow::Result<Vec<Detection>> {
        Ok(self
            .0
            .iter()
            .map(|(label, confidence)| Detection {
                label: label.to_string(),
                confidence: *confidence,
                bbox: [0.0, 0.0, 1.0, 1.0],
            })
            .collect())
    }
}

/// Detector stand-in that always fails
pub struct FailingDetector;

#[async_trait]
impl ObjectDetector for FailingDetector {
    fn name(&self) -> &'static str {
        "yolo"
    }

    async fn detect(&self, _path: &Path) -> anyhow::Result<Vec<Detection>> {
        anyhow::bail!("model weights missing")
    }
}

pub fn stub_pipeline() -> RecognitionPipeline {
    RecognitionPipeline::new(
        Some(Arc::new(StubOcr("STOP"))),
        Some(Arc::new(StubDetector(vec![("person", 0.91), ("car", 0.62)]))),
    )
}

/// A fully wired application over an in-memory database and a temp directory
pub struct TestApp {
    pub server: TestServer,
    pub pool: SqlitePool,
    pub services: AppServices,
    pub root: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_pipeline(stub_pipeline(), vec![]).await
    }

    pub async fn with_pipeline(pipeline: RecognitionPipeline, admin_emails: Vec<String>) -> Self {
        let pool = test_pool().await;
        let root = tempfile::tempdir().expect("temp dir");

        let services = AppServices::new(
            pool.clone(),
            &test_session_config(),
            test_storage_config(root.path()),
            test_map_config(),
            pipeline,
            admin_emails,
        );
        let router: Router = build_router(&services);

        let server = TestServer::builder()
            .save_cookies()
            .build(router)
            .expect("test server");

        Self {
            server,
            pool,
            services,
            root,
        }
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.root.path().join("uploads")
    }

    /// Register and log in through the HTTP forms; the session cookie is kept
    pub async fn sign_in(&self, email: &str, password: &str) {
        self.server
            .post("/register")
            .form(&[
                ("name", "Test User"),
                ("email", email),
                ("password", password),
                ("confirm_password", password),
            ])
            .await
            .assert_status(StatusCode::SEE_OTHER);

        self.server
            .post("/login")
            .form(&[("email", email), ("password", password)])
            .await
            .assert_status(StatusCode::SEE_OTHER);
    }

    pub async fn count(&self, sql: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(&self.pool)
            .await
            .expect("count query")
    }
}

/// A small blank 4x3 PNG
pub fn tiny_png() -> Vec<u8> {
    let mut bytes = Vec::new();
    let img = image::RgbaImage::new(4, 3);
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("encode png");
    bytes
}

/// A bare TIFF carrying camera tags and a GPS position of 9°4'55.2"S, 8°40'E
pub fn gps_tiff() -> Vec<u8> {
    use exif::experimental::Writer;
    use exif::{Field, In, Rational, Tag, Value};

    let rational = |num: u32, denom: u32| Rational { num, denom };
    let field = |tag: Tag, value: Value| Field {
        tag,
        ifd_num: In::PRIMARY,
        value,
    };
    let fields = [
        field(Tag::Make, Value::Ascii(vec![b"Lagos Optics".to_vec()])),
        field(Tag::Model, Value::Ascii(vec![b"LX-100".to_vec()])),
        field(Tag::GPSLatitudeRef, Value::Ascii(vec![b"S".to_vec()])),
        field(
            Tag::GPSLatitude,
            Value::Rational(vec![rational(9, 1), rational(4, 1), rational(552, 10)]),
        ),
        field(Tag::GPSLongitudeRef, Value::Ascii(vec![b"E".to_vec()])),
        field(
            Tag::GPSLongitude,
            Value::Rational(vec![rational(8, 1), rational(40, 1), rational(0, 1)]),
        ),
    ];

    let mut writer = Writer::new();
    for f in &fields {
        writer.push_field(f);
    }
    let mut buf = std::io::Cursor::new(Vec::new());
    writer.write(&mut buf, false).expect("write exif");
    buf.into_inner()
}
