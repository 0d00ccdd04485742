use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Storage backend types
///
/// Chosen once at startup; request handling never branches on it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Local,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    /// Accepts the spellings older deployments used: `s3`, `aws`, `aws_s3`,
    /// `AWS-S3`, `local`, `disk`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "s3" | "aws" | "aws_s3" => Ok(StorageBackend::S3),
            "local" | "disk" => Ok(StorageBackend::Local),
            _ => Err(anyhow::anyhow!("Invalid storage backend: {}", s)),
        }
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageBackend::S3 => write!(f, "s3"),
            StorageBackend::Local => write!(f, "local"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_spellings() {
        for s in ["s3", "S3", "aws", "AWS_S3", "aws-s3"] {
            assert_eq!(s.parse::<StorageBackend>().unwrap(), StorageBackend::S3);
        }
        for s in ["local", "DISK", " disk "] {
            assert_eq!(s.parse::<StorageBackend>().unwrap(), StorageBackend::Local);
        }
        assert!("nfs".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        assert_eq!(StorageBackend::S3.to_string(), "s3");
        assert_eq!(
            StorageBackend::Local.to_string().parse::<StorageBackend>().unwrap(),
            StorageBackend::Local
        );
    }
}
