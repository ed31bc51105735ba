use sha2::{Digest, Sha256};

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(AssetMetadata, "asset_metadata", {
    locator_key: String,
    download_url: String,
    owner_id: String,
    file_name: String,
    file_size: u64,
    mime_type: String
});

impl AssetMetadata {
    /// Build a record for a stored object. The id is derived from the owner
    /// and object key, so recording the same object twice collides.
    pub fn new(
        locator_key: String,
        download_url: String,
        owner_id: String,
        file_name: String,
        file_size: u64,
        mime_type: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Self::derive_id(&owner_id, &locator_key),
            created_at: now,
            updated_at: now,
            locator_key,
            download_url,
            owner_id,
            file_name,
            file_size,
            mime_type,
        }
    }

    pub fn derive_id(owner_id: &str, locator_key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(owner_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(locator_key.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// All uploads recorded for an owner, newest first.
    pub async fn list_for_owner(
        owner_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let items: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM type::table($table) WHERE owner_id = $owner_id ORDER BY created_at DESC",
            )
            .bind(("table", Self::table_name()))
            .bind(("owner_id", owner_id.to_string()))
            .await?
            .take(0)?;

        Ok(items)
    }
}
