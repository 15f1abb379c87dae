use anyhow::{anyhow, Context, Result};
use opendal::{Operator, Scheme};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Mutex, OnceLock};
use url::Url;

static MEMORY_OPERATORS: OnceLock<Mutex<HashMap<String, Operator>>> = OnceLock::new();

fn memory_cache() -> &'static Mutex<HashMap<String, Operator>> {
    MEMORY_OPERATORS.get_or_init(|| Mutex::new(HashMap::new()))
}

pub fn memory_operator() -> Result<Operator> {
    let builder = opendal::services::Memory::default();
    Ok(Operator::new(builder)?.finish())
}

/// Creates an OpenDAL Operator from a URI string.
///
/// Supported schemes:
/// - memory://name -> in-memory, shared by every caller using the same URI
/// - file:///path/to/dir -> local filesystem
/// - s3://bucket/path -> AWS S3 (credentials and region from the environment)
pub fn operator_from_uri(uri: &str) -> Result<Operator> {
    if uri.starts_with("memory://") {
        let mut cache = memory_cache()
            .lock()
            .map_err(|_| anyhow!("memory operator cache lock poisoned"))?;
        if let Some(op) = cache.get(uri) {
            return Ok(op.clone());
        }
        let op = memory_operator()?;
        cache.insert(uri.to_string(), op.clone());
        return Ok(op);
    }

    let url = Url::parse(uri).map_err(|e| anyhow!("Invalid storage URI: {}", e))?;
    let scheme_str = match url.scheme() {
        "file" => "fs",
        other => other,
    };
    let scheme = Scheme::from_str(scheme_str)
        .map_err(|_| anyhow!("Unsupported storage scheme: {}", scheme_str))?;

    let mut map = HashMap::new();
    match scheme {
        Scheme::Fs => {
            map.insert("root".to_string(), url.path().to_string());
        }
        Scheme::S3 => {
            let bucket = url
                .host_str()
                .ok_or_else(|| anyhow!("S3 URI missing bucket"))?;
            map.insert("bucket".to_string(), bucket.to_string());
            let root = url.path();
            if !root.is_empty() && root != "/" {
                map.insert("root".to_string(), root.to_string());
            }
            map.insert("region".to_string(), "auto".to_string());
        }
        _ => return Err(anyhow!("Scheme {} is not supported", scheme)),
    }

    Ok(Operator::via_iter(scheme, map)?)
}

pub(crate) async fn read_json<T: DeserializeOwned>(op: &Operator, path: &str) -> Result<Option<T>> {
    if !op.exists(path).await? {
        return Ok(None);
    }
    let bytes = op.read(path).await?;
    let value = serde_json::from_slice(&bytes.to_vec()).context(format!("Corrupt JSON at {}", path))?;
    Ok(Some(value))
}

pub(crate) async fn write_json<T: Serialize>(op: &Operator, path: &str, value: &T) -> Result<()> {
    op.write(path, serde_json::to_vec_pretty(value)?).await?;
    Ok(())
}
