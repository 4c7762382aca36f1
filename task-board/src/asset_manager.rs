//! Deliverable storage for accepted tasks: validates a multipart upload
//! against the configured size/count limits, hashes its content, and writes
//! it under `storage_root/<task_id>/<asset_id>`. Grounded in
//! `test_assets.py`'s observed constraints (10MB default max, 20 assets per
//! task, SHA-256 hex `content_hash`) since `asset_manager.py` itself wasn't
//! part of the retrieved source.

use agent_economy_common::error::{ErrorCode, ServiceError, ServiceResult};
use sha2::{Digest, Sha256};

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

pub fn content_hash(bytes: &[u8]) -> String {
    hex_encode(&Sha256::digest(bytes))
}

pub struct StoredAsset {
    pub size_bytes: i64,
    pub content_hash: String,
}

/// Validates the upload against the configured limits and writes it to disk.
/// Count is checked by the caller (it needs a DB round trip); this only
/// checks size and performs the write.
pub fn store(
    storage_root: &str,
    task_id: &str,
    asset_id: &str,
    max_asset_size_bytes: usize,
    bytes: &[u8],
) -> ServiceResult<StoredAsset> {
    if bytes.len() > max_asset_size_bytes {
        return Err(ServiceError::new(
            ErrorCode::FileTooLarge,
            format!("file exceeds the {max_asset_size_bytes} byte limit"),
        ));
    }

    let dir = std::path::Path::new(storage_root).join(task_id);
    std::fs::create_dir_all(&dir)
        .map_err(|e| ServiceError::internal(format!("failed to create asset directory: {e}")))?;
    std::fs::write(dir.join(asset_id), bytes)
        .map_err(|e| ServiceError::internal(format!("failed to write asset to disk: {e}")))?;

    Ok(StoredAsset {
        size_bytes: bytes.len() as i64,
        content_hash: content_hash(bytes),
    })
}

pub fn read(storage_root: &str, task_id: &str, asset_id: &str) -> ServiceResult<Vec<u8>> {
    std::fs::read(std::path::Path::new(storage_root).join(task_id).join(asset_id))
        .map_err(|_| ServiceError::new(ErrorCode::AssetNotFound, "asset not found"))
}
