use std::env;

/// Process configuration, read once at startup from the environment.
///
/// Every field has a sane local-development default so the binary still
/// starts against a docker-compose style stack without a populated `.env`.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,

    pub clickhouse_url: String,
    pub clickhouse_database: String,
    pub clickhouse_user: String,
    pub clickhouse_password: String,

    pub relational_db_path: String,

    pub s3_endpoint_url: Option<String>,
    pub s3_region: String,
    pub s3_bucket: String,
    pub s3_access_key_id: Option<String>,
    pub s3_secret_access_key: Option<String>,

    pub redis_url: String,

    pub cors_origins: Vec<String>,

    /// Maximum accepted, already-decompressed request body size for ingestion.
    pub max_ingest_body_bytes: usize,
    /// Maximum allowed gzip expansion ratio before the body is rejected.
    pub max_gzip_ratio: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            server_host: env_or("SERVER_HOST", "0.0.0.0"),
            server_port: env_or("SERVER_PORT", "8000").parse().unwrap_or(8000),

            clickhouse_url: env_or("CLICKHOUSE_URL", "http://localhost:8123"),
            clickhouse_database: env_or("CLICKHOUSE_DATABASE", "traceroot"),
            clickhouse_user: env_or("CLICKHOUSE_USER", "default"),
            clickhouse_password: env_or("CLICKHOUSE_PASSWORD", ""),

            relational_db_path: env_or("RELATIONAL_DB_PATH", "traceroot.sqlite3"),

            s3_endpoint_url: env::var("S3_ENDPOINT_URL").ok(),
            s3_region: env_or("S3_REGION", "us-east-1"),
            s3_bucket: env_or("S3_BUCKET_NAME", "traceroot"),
            s3_access_key_id: env::var("S3_ACCESS_KEY_ID").ok(),
            s3_secret_access_key: env::var("S3_SECRET_ACCESS_KEY").ok(),

            redis_url: env_or("REDIS_URL", "redis://localhost:6379"),

            cors_origins: env::var("CORS_ORIGINS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default(),

            max_ingest_body_bytes: env_or("MAX_INGEST_BODY_BYTES", "10485760")
                .parse()
                .unwrap_or(10 * 1024 * 1024),
            max_gzip_ratio: env_or("MAX_GZIP_RATIO", "100").parse().unwrap_or(100),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
