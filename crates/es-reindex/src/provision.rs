//! Target index provisioning.

use std::sync::Arc;
use tracing::info;

use crate::client::SearchClient;
use crate::error::Result;

/// What [`IndexProvisioner::ensure_target_index`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionOutcome {
    /// The target index was created from the source definition.
    Created,
    /// The target index was already there and was left untouched.
    AlreadyExists,
    /// Dry run: the target index is missing and would have been created.
    WouldCreate,
}

/// Creates the target index from the source index definition.
pub struct IndexProvisioner {
    source: Arc<dyn SearchClient>,
    target: Arc<dyn SearchClient>,
    dry_run: bool,
}

impl IndexProvisioner {
    /// Creates a provisioner.
    pub fn new(source: Arc<dyn SearchClient>, target: Arc<dyn SearchClient>) -> Self {
        Self {
            source,
            target,
            dry_run: false,
        }
    }

    /// Checks the source definition but creates nothing.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Makes sure `target_index` exists.
    ///
    /// A missing target is created with the settings and mappings of
    /// `source_index`, without its aliases and without the settings the
    /// cluster assigns itself. An existing target is never modified.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::IndexNotFound`] if the target is missing and
    /// the source index does not exist, or any transport error.
    pub async fn ensure_target_index(
        &self,
        source_index: &str,
        target_index: &str,
    ) -> Result<ProvisionOutcome> {
        if self.target.index_exists(target_index).await? {
            info!("Target index '{}' already exists", target_index);
            return Ok(ProvisionOutcome::AlreadyExists);
        }

        let definition = self
            .source
            .get_index_definition(source_index)
            .await?
            .for_copy();

        if self.dry_run {
            info!(
                "Dry run: would create '{}' from the definition of '{}'",
                target_index, source_index
            );
            return Ok(ProvisionOutcome::WouldCreate);
        }

        self.target.create_index(target_index, &definition).await?;
        info!(
            "Created index '{}' on {} from '{}'",
            target_index,
            self.target.endpoint(),
            source_index
        );
        Ok(ProvisionOutcome::Created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{IndexDefinition, MemoryClient};
    use crate::error::Error;
    use serde_json::json;

    fn source_definition() -> IndexDefinition {
        IndexDefinition {
            settings: json!({ "index": {
                "number_of_shards": "3",
                "uuid": "Xy12",
                "creation_date": "1700000000000",
                "provided_name": "products",
                "version": { "created": "8110099" }
            }}),
            mappings: json!({ "properties": { "sku": { "type": "keyword" } } }),
            aliases: json!({ "products-read": {} }),
        }
    }

    #[tokio::test]
    async fn test_creates_missing_target_without_aliases() {
        // Arrange
        let source = Arc::new(MemoryClient::new().with_index("products", source_definition()));
        let target = Arc::new(MemoryClient::new());
        let provisioner = IndexProvisioner::new(source, target.clone());

        // Act
        let outcome = provisioner
            .ensure_target_index("products", "products-v2")
            .await
            .unwrap();

        // Assert
        assert_eq!(outcome, ProvisionOutcome::Created);
        let created = target.definition("products-v2").unwrap();
        assert!(created.aliases.is_null());
        assert_eq!(created.mappings, source_definition().mappings);
        assert_eq!(created.settings, json!({ "index": { "number_of_shards": "3" } }));
    }

    #[tokio::test]
    async fn test_existing_target_is_left_alone() {
        let source = Arc::new(MemoryClient::new());
        let existing = IndexDefinition {
            mappings: json!({ "properties": {} }),
            ..IndexDefinition::default()
        };
        let target = Arc::new(MemoryClient::new().with_index("products-v2", existing.clone()));
        let provisioner = IndexProvisioner::new(source, target.clone());

        let outcome = provisioner
            .ensure_target_index("products", "products-v2")
            .await
            .unwrap();

        assert_eq!(outcome, ProvisionOutcome::AlreadyExists);
        assert_eq!(target.definition("products-v2"), Some(existing));
    }

    #[tokio::test]
    async fn test_missing_source_fails() {
        let provisioner =
            IndexProvisioner::new(Arc::new(MemoryClient::new()), Arc::new(MemoryClient::new()));

        let err = provisioner
            .ensure_target_index("products", "products-v2")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::IndexNotFound(ref i) if i == "products"));
    }

    #[tokio::test]
    async fn test_dry_run_creates_nothing() {
        let source = Arc::new(MemoryClient::new().with_index("products", source_definition()));
        let target = Arc::new(MemoryClient::new());
        let provisioner = IndexProvisioner::new(source, target.clone()).with_dry_run(true);

        let outcome = provisioner
            .ensure_target_index("products", "products-v2")
            .await
            .unwrap();

        assert_eq!(outcome, ProvisionOutcome::WouldCreate);
        assert!(target.definition("products-v2").is_none());
    }
}
