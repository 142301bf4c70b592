use crate::config::{CustomFieldValue, SyncConfig};
use crate::error::{Result, SyncError};
use crate::model::TestRecord;
use crate::remote::{InventoryQuery, RemoteTestClient};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Custom field name -> remote field id, loaded on first lookup.
///
/// Two workers racing on an empty catalog may both load it; the result is
/// the same either way.
#[derive(Default)]
pub struct FieldCatalog {
    fields: RwLock<Option<Arc<HashMap<String, String>>>>,
}

impl FieldCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn resolve<C>(&self, client: &C, name: &str) -> Result<String>
    where
        C: RemoteTestClient + ?Sized,
    {
        let fields = match self.cached() {
            Some(fields) => fields,
            None => {
                let listed = client.list_custom_fields().await?;
                let mut map = HashMap::with_capacity(listed.len());
                for field in listed {
                    map.entry(field.name).or_insert(field.id);
                }
                debug!(fields = map.len(), "Loaded custom field catalog");
                let map = Arc::new(map);
                *self.fields.write() = Some(map.clone());
                map
            }
        };

        fields
            .get(name)
            .cloned()
            .ok_or_else(|| SyncError::UnknownCustomField(name.to_string()))
    }

    pub fn is_loaded(&self) -> bool {
        self.fields.read().is_some()
    }

    pub fn invalidate(&self) {
        *self.fields.write() = None;
    }

    fn cached(&self) -> Option<Arc<HashMap<String, String>>> {
        self.fields.read().clone()
    }
}

/// Everything a sync or upload run shares across workers
pub struct SyncContext<C: ?Sized> {
    pub client: Arc<C>,
    pub config: SyncConfig,
    pub project_key: String,
    /// Account the tests are assigned to and reported by
    pub user: String,
    catalog: FieldCatalog,
}

impl<C> SyncContext<C>
where
    C: RemoteTestClient + ?Sized,
{
    pub fn new(
        client: Arc<C>,
        config: SyncConfig,
        project_key: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            client,
            config,
            project_key: project_key.into(),
            user: user.into(),
            catalog: FieldCatalog::new(),
        }
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    /// Forget cached remote metadata so a new run sees fresh field ids
    pub fn begin_run(&self) {
        self.catalog.invalidate();
    }

    pub fn inventory_query(&self) -> InventoryQuery {
        InventoryQuery {
            project_key: self.project_key.clone(),
            reporter: self.user.clone(),
            folder: self.config.active_folder.clone(),
            custom_field_filters: self
                .config
                .custom_fields
                .iter()
                .filter(|(_, value)| !matches!(value, CustomFieldValue::Multi(v) if v.is_empty()))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            page_size: self.config.query_page_limit,
        }
    }

    pub async fn query_inventory(&self) -> Result<Vec<TestRecord>> {
        let query = self.inventory_query();
        info!(
            project = %query.project_key,
            folder = %query.folder,
            filters = query.custom_field_filters.len(),
            "Querying remote test inventory"
        );
        let tests = self.client.query_inventory(&query).await?;
        info!(count = tests.len(), "Fetched remote test inventory");
        Ok(tests)
    }

    /// Configured custom fields rendered as a field payload keyed by remote id
    pub async fn custom_field_payload(&self) -> Result<BTreeMap<String, serde_json::Value>> {
        let mut payload = BTreeMap::new();
        for (name, value) in &self.config.custom_fields {
            let id = self.catalog.resolve(self.client.as_ref(), name).await?;
            payload.insert(id, render_custom_value(value));
        }
        Ok(payload)
    }
}

fn render_custom_value(value: &CustomFieldValue) -> serde_json::Value {
    match value {
        CustomFieldValue::Single(v) => serde_json::json!({ "value": v }),
        CustomFieldValue::Multi(values) => serde_json::Value::Array(
            values
                .iter()
                .map(|v| serde_json::json!({ "value": v }))
                .collect(),
        ),
    }
}
