use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use dog_blobstore::{UploadRules, MIN_MULTIPART_SIZE, PART_SIZE};

const MIB: u64 = 1024 * 1024;

struct ServerDefaults;

impl ServerDefaults {
    const BACKEND: BackendKind = BackendKind::Memory;
    const BUCKET: &'static str = "blobstore";
    const ROOT: &'static str = "./data";
    const PART_CONCURRENCY: usize = 1;
    const MAX_BODY_MB: u64 = 10 * 1024;
    const HOST: &'static str = "127.0.0.1";
    const PORT: u16 = 3030;
}

/// Which storage backend the server runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    S3,
    Fs,
    Memory,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "fs" | "file" | "filesystem" => Ok(Self::Fs),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::S3 => "s3",
            Self::Fs => "fs",
            Self::Memory => "memory",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: BackendKind,
    pub bucket: String,
    /// Root directory for the fs backend
    pub root: PathBuf,
    pub upload_rules: UploadRules,
    pub max_body_bytes: usize,
    pub host: String,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: ServerDefaults::BACKEND,
            bucket: ServerDefaults::BUCKET.to_string(),
            root: PathBuf::from(ServerDefaults::ROOT),
            upload_rules: UploadRules::default(),
            max_body_bytes: (ServerDefaults::MAX_BODY_MB * MIB) as usize,
            host: ServerDefaults::HOST.to_string(),
            port: ServerDefaults::PORT,
        }
    }
}

impl Settings {
    /// Read settings from the environment; unparseable values fall back to
    /// their defaults
    pub fn from_env() -> Self {
        let part_size_mb = env_var_or("BLOBSTORE_PART_SIZE_MB", PART_SIZE / MIB);
        let min_multipart_mb = env_var_or("BLOBSTORE_MIN_MULTIPART_MB", MIN_MULTIPART_SIZE / MIB);
        let concurrency = env_var_or(
            "BLOBSTORE_PART_CONCURRENCY",
            ServerDefaults::PART_CONCURRENCY,
        );
        let max_body_mb = env_var_or("BLOBSTORE_MAX_BODY_MB", ServerDefaults::MAX_BODY_MB);

        Self {
            backend: env_var_or("BLOBSTORE_BACKEND", ServerDefaults::BACKEND),
            bucket: env_var_or("BLOBSTORE_BUCKET", ServerDefaults::BUCKET.to_string()),
            root: PathBuf::from(env_var_or(
                "BLOBSTORE_ROOT",
                ServerDefaults::ROOT.to_string(),
            )),
            upload_rules: UploadRules::new()
                .with_part_size(part_size_mb.saturating_mul(MIB))
                .with_min_multipart_size(min_multipart_mb.saturating_mul(MIB))
                .with_part_concurrency(concurrency),
            max_body_bytes: usize::try_from(max_body_mb.saturating_mul(MIB)).unwrap_or(usize::MAX),
            host: env_var_or("HTTP_HOST", ServerDefaults::HOST.to_string()),
            port: env_var_or("HTTP_PORT", ServerDefaults::PORT),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr + fmt::Display,
{
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or(default)
}
