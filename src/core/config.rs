use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
    pub map: MapConfig,
    pub recognition: RecognitionConfig,
    pub swagger: SwaggerConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub log_level: String,
    /// Emails that receive the admin role when they register
    pub admin_emails: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

/// Signed session cookie settings
#[derive(Clone)]
pub struct SessionConfig {
    pub secret_key: String,
    pub cookie_secure: bool,
    pub ttl: Duration,
}

// Keeps the secret out of logs
impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret_key", &"***")
            .field("cookie_secure", &self.cookie_secure)
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Where uploaded files and generated previews live on disk
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub results_dir: PathBuf,
    /// Maximum request body size for uploads, in bytes
    pub max_content_length: usize,
    /// Lower-case extensions without the leading dot
    pub allowed_extensions: Vec<String>,
    /// Prefix stored filenames with a generated id to avoid collisions
    pub unique_filenames: bool,
}

/// Initial map viewport shown on the dashboard
#[derive(Debug, Clone, Copy)]
pub struct MapConfig {
    pub default_lat: f64,
    pub default_lng: f64,
    pub default_zoom: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrEngineKind {
    /// Shell out to the `tesseract` binary
    Tesseract,
    /// In-process recognition with the `ocrs` models
    Ocrs,
}

#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    pub enable_ocr: bool,
    pub enable_yolo: bool,
    pub ocr_engine: OcrEngineKind,
    pub tesseract_cmd: String,
    pub ocrs_detection_model: PathBuf,
    pub ocrs_recognition_model: PathBuf,
    pub yolo_model_path: PathBuf,
    pub detection_confidence: f32,
    pub detection_iou: f32,
}

#[derive(Debug, Clone)]
pub struct SwaggerConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub title: String,
    pub version: String,
    pub description: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if exists, ignore if not found (optional for production)
        if let Err(e) = dotenvy::dotenv() {
            if !e.to_string().contains("not found") {
                eprintln!("Warning: Error loading .env file: {}", e);
            }
        }

        Ok(Config {
            app: AppConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            session: SessionConfig::from_env()?,
            storage: StorageConfig::from_env()?,
            map: MapConfig::from_env()?,
            recognition: RecognitionConfig::from_env()?,
            swagger: SwaggerConfig::from_env()?,
        })
    }
}

/// Parse a boolean flag the way shell users write them ("1", "true", "yes", "on").
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_flag(name: &str, default: bool) -> Result<bool, String> {
    match env::var(name) {
        Ok(value) => parse_flag(&value).ok_or_else(|| format!("{} must be a boolean", name)),
        Err(_) => Ok(default),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "5000".to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid PORT: {}", e))?;

        let cors_allowed_origins =
            split_list(&env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| "*".to_string()));

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let admin_emails = split_list(&env::var("ADMIN_EMAILS").unwrap_or_default())
            .into_iter()
            .map(|e| e.to_lowercase())
            .collect();

        Ok(Self {
            host,
            port,
            cors_allowed_origins,
            log_level,
            admin_emails,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl DatabaseConfig {
    const DEFAULT_URL: &'static str = "sqlite://site.db";
    const DEFAULT_MAX_CONNECTIONS: u32 = 5;
    const DEFAULT_MIN_CONNECTIONS: u32 = 1;
    const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;
    const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600; // 10 minutes
    const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800; // 30 minutes

    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL").unwrap_or_else(|_| Self::DEFAULT_URL.to_string());

        let max_connections = env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_CONNECTIONS.to_string())
            .parse::<u32>()
            .map_err(|_| "DB_MAX_CONNECTIONS must be a valid number".to_string())?;

        let min_connections = env::var("DB_MIN_CONNECTIONS")
            .unwrap_or_else(|_| Self::DEFAULT_MIN_CONNECTIONS.to_string())
            .parse::<u32>()
            .map_err(|_| "DB_MIN_CONNECTIONS must be a valid number".to_string())?;

        let acquire_timeout_secs = env::var("DB_ACQUIRE_TIMEOUT_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_ACQUIRE_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_ACQUIRE_TIMEOUT_SECS must be a valid number".to_string())?;

        let idle_timeout_secs = env::var("DB_IDLE_TIMEOUT_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_IDLE_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_IDLE_TIMEOUT_SECS must be a valid number".to_string())?;

        let max_lifetime_secs = env::var("DB_MAX_LIFETIME_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_LIFETIME_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_MAX_LIFETIME_SECS must be a valid number".to_string())?;

        Ok(Self {
            url,
            max_connections,
            min_connections,
            acquire_timeout_secs,
            idle_timeout_secs,
            max_lifetime_secs,
        })
    }
}

impl SessionConfig {
    const DEFAULT_SECRET_KEY: &'static str = "dev_secret_key";
    const DEFAULT_TTL_HOURS: u64 = 12;

    pub fn from_env() -> Result<Self, String> {
        let secret_key = env::var("SECRET_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                tracing::warn!("SECRET_KEY not set, using the development key");
                Self::DEFAULT_SECRET_KEY.to_string()
            });

        let cookie_secure = env_flag("SESSION_COOKIE_SECURE", false)?;

        let ttl_hours = env::var("SESSION_TTL_HOURS")
            .unwrap_or_else(|_| Self::DEFAULT_TTL_HOURS.to_string())
            .parse::<u64>()
            .map_err(|_| "SESSION_TTL_HOURS must be a valid number".to_string())?;

        Ok(Self {
            secret_key,
            cookie_secure,
            ttl: Duration::from_secs(ttl_hours * 3600),
        })
    }
}

impl StorageConfig {
    const DEFAULT_MAX_CONTENT_LENGTH: usize = 16 * 1024 * 1024; // 16MB
    const DEFAULT_ALLOWED_EXTENSIONS: &'static str = "png,jpg,jpeg,gif,bmp,webp,tif,tiff";

    pub fn from_env() -> Result<Self, String> {
        let upload_dir = env::var("UPLOAD_FOLDER").unwrap_or_else(|_| "uploads".to_string());
        let results_dir = env::var("RESULTS_FOLDER").unwrap_or_else(|_| "results".to_string());

        let max_content_length = env::var("MAX_CONTENT_LENGTH")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_CONTENT_LENGTH.to_string())
            .parse::<usize>()
            .map_err(|_| "MAX_CONTENT_LENGTH must be a valid number".to_string())?;

        let allowed_extensions = split_list(
            &env::var("ALLOWED_EXTENSIONS")
                .unwrap_or_else(|_| Self::DEFAULT_ALLOWED_EXTENSIONS.to_string()),
        )
        .into_iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect();

        let unique_filenames = env_flag("UNIQUE_FILENAMES", true)?;

        Ok(Self {
            upload_dir: PathBuf::from(upload_dir),
            results_dir: PathBuf::from(results_dir),
            max_content_length,
            allowed_extensions,
            unique_filenames,
        })
    }
}

impl MapConfig {
    const DEFAULT_LAT: f64 = 9.082;
    const DEFAULT_LNG: f64 = 8.6753;
    const DEFAULT_ZOOM: u8 = 6;

    pub fn from_env() -> Result<Self, String> {
        let default_lat = env::var("DEFAULT_LAT")
            .unwrap_or_else(|_| Self::DEFAULT_LAT.to_string())
            .parse::<f64>()
            .map_err(|_| "DEFAULT_LAT must be a valid number".to_string())?;

        let default_lng = env::var("DEFAULT_LNG")
            .unwrap_or_else(|_| Self::DEFAULT_LNG.to_string())
            .parse::<f64>()
            .map_err(|_| "DEFAULT_LNG must be a valid number".to_string())?;

        let default_zoom = env::var("DEFAULT_ZOOM")
            .unwrap_or_else(|_| Self::DEFAULT_ZOOM.to_string())
            .parse::<u8>()
            .map_err(|_| "DEFAULT_ZOOM must be a valid number".to_string())?;

        if !(-90.0..=90.0).contains(&default_lat) || !(-180.0..=180.0).contains(&default_lng) {
            return Err("DEFAULT_LAT/DEFAULT_LNG out of range".to_string());
        }

        Ok(Self {
            default_lat,
            default_lng,
            default_zoom,
        })
    }
}

impl RecognitionConfig {
    const DEFAULT_YOLO_MODEL_PATH: &'static str = "models/yolov8n.rten";
    const DEFAULT_DETECTION_CONFIDENCE: f32 = 0.25;
    const DEFAULT_DETECTION_IOU: f32 = 0.45;

    pub fn from_env() -> Result<Self, String> {
        let enable_ocr = env_flag("ENABLE_OCR", true)?;
        let enable_yolo = env_flag("ENABLE_YOLO", true)?;

        let ocr_engine = match env::var("OCR_ENGINE")
            .unwrap_or_else(|_| "tesseract".to_string())
            .to_lowercase()
            .as_str()
        {
            "tesseract" | "pytesseract" => OcrEngineKind::Tesseract,
            "ocrs" => OcrEngineKind::Ocrs,
            other => return Err(format!("Unsupported OCR_ENGINE: {}", other)),
        };

        let tesseract_cmd = env::var("TESSERACT_CMD").unwrap_or_else(|_| "tesseract".to_string());

        // ocrs keeps its models under ~/.cache/ocrs by default
        let ocrs_cache = env::var("HOME")
            .or_else(|_| env::var("USERPROFILE"))
            .map(|home| PathBuf::from(home).join(".cache/ocrs"))
            .unwrap_or_else(|_| PathBuf::from(".cache/ocrs"));
        let ocrs_detection_model = env::var("OCRS_DETECTION_MODEL")
            .map(PathBuf::from)
            .unwrap_or_else(|_| ocrs_cache.join("text-detection.rten"));
        let ocrs_recognition_model = env::var("OCRS_RECOGNITION_MODEL")
            .map(PathBuf::from)
            .unwrap_or_else(|_| ocrs_cache.join("text-recognition.rten"));

        let yolo_model_path = PathBuf::from(
            env::var("YOLO_MODEL_PATH")
                .unwrap_or_else(|_| Self::DEFAULT_YOLO_MODEL_PATH.to_string()),
        );

        let detection_confidence = env::var("DETECTION_CONFIDENCE")
            .unwrap_or_else(|_| Self::DEFAULT_DETECTION_CONFIDENCE.to_string())
            .parse::<f32>()
            .map_err(|_| "DETECTION_CONFIDENCE must be a valid number".to_string())?;

        let detection_iou = env::var("DETECTION_IOU")
            .unwrap_or_else(|_| Self::DEFAULT_DETECTION_IOU.to_string())
            .parse::<f32>()
            .map_err(|_| "DETECTION_IOU must be a valid number".to_string())?;

        Ok(Self {
            enable_ocr,
            enable_yolo,
            ocr_engine,
            tesseract_cmd,
            ocrs_detection_model,
            ocrs_recognition_model,
            yolo_model_path,
            detection_confidence,
            detection_iou,
        })
    }
}

impl SwaggerConfig {
    pub fn from_env() -> Result<Self, String> {
        // Only use credentials if they are non-empty
        let username = env::var("SWAGGER_USERNAME").ok().filter(|s| !s.is_empty());
        let password = env::var("SWAGGER_PASSWORD").ok().filter(|s| !s.is_empty());
        let title = env::var("SWAGGER_TITLE").unwrap_or_else(|_| "Geolens API".to_string());
        let version = env::var("SWAGGER_VERSION").unwrap_or_else(|_| "0.1.0".to_string());
        let description = env::var("SWAGGER_DESCRIPTION")
            .unwrap_or_else(|_| "Image upload, OCR and object detection API".to_string());

        Ok(Self {
            username,
            password,
            title,
            version,
            description,
        })
    }

    /// Returns credentials in "username:password" format if auth is enabled
    pub fn credentials(&self) -> Option<String> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some(format!("{}:{}", user, pass)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(" Yes "), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("FALSE"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_split_list_drops_blanks() {
        assert_eq!(split_list("png, jpg,,gif ,"), vec!["png", "jpg", "gif"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_swagger_credentials() {
        let mut config = SwaggerConfig {
            username: Some("admin".to_string()),
            password: None,
            title: String::new(),
            version: String::new(),
            description: String::new(),
        };
        assert_eq!(config.credentials(), None);
        config.password = Some("secret".to_string());
        assert_eq!(config.credentials().as_deref(), Some("admin:secret"));
    }
}
