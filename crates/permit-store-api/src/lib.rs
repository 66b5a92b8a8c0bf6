use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use permit_store_core::{
    Haversine, LatLng, LatLngBounds, MapSession, PermitId, PermitRecord, PermitSource,
    PermitStore, SortSpec, StoreError, StoreEvent,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

mod config;

pub use config::{BrowserConfig, ReferenceConfig};

pub const API_CONTRACT_VERSION: &str = "api.v1";

/// Fetch transport over a JSON snapshot: either a bare array of permits or an
/// object with a `permits` array.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct WrappedBatch {
    permits: Vec<PermitRecord>,
}

/// The shape is chosen from the first token so a malformed record reports serde's
/// own error with its line and column.
fn parse_batch(body: &str) -> serde_json::Result<Vec<PermitRecord>> {
    if body.trim_start().starts_with('{') {
        serde_json::from_str::<WrappedBatch>(body).map(|batch| batch.permits)
    } else {
        serde_json::from_str(body)
    }
}

impl JsonFileSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PermitSource for JsonFileSource {
    fn fetch(&mut self) -> Result<Vec<PermitRecord>, StoreError> {
        let body = fs::read_to_string(&self.path).map_err(|err| {
            StoreError::Fetch(format!("failed to read {}: {err}", self.path.display()))
        })?;
        parse_batch(&body).map_err(|err| {
            StoreError::Fetch(format!("failed to parse {}: {err}", self.path.display()))
        })
    }
}

/// One browse pass: every field left empty falls back to the config default or
/// leaves that criterion inactive.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrowseRequest {
    pub search: Option<String>,
    pub authorities: Vec<String>,
    pub types: Vec<String>,
    pub near: Option<LatLng>,
    pub radius_meters: Option<f64>,
    pub sort: Option<SortSpec>,
    pub select: Option<PermitId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrowseResult {
    pub total: usize,
    pub visible_count: usize,
    pub active_filters: Vec<String>,
    pub sort: Option<SortSpec>,
    pub selected: Option<PermitId>,
    pub bounds: Option<LatLngBounds>,
    pub permits: Vec<PermitRecord>,
    pub events: Vec<StoreEvent>,
}

#[derive(Debug, Clone)]
pub struct PermitBrowserApi {
    config: BrowserConfig,
}

impl PermitBrowserApi {
    #[must_use]
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    fn source(&self) -> Result<JsonFileSource> {
        let path = self.config.permits_path.as_ref().ok_or_else(|| {
            anyhow!("no permits file configured; pass --permits or set permits_path in the config")
        })?;
        Ok(JsonFileSource::new(path.clone()))
    }

    fn empty_store(&self) -> PermitStore {
        PermitStore::with_geo(Haversine { radius_meters: self.config.earth_radius_meters })
    }

    /// Load the configured snapshot into a fresh session with the configured
    /// reference location and default sort applied.
    ///
    /// # Errors
    /// Returns an error when no snapshot is configured or it cannot be loaded.
    pub fn open_session(&self) -> Result<MapSession> {
        let mut source = self.source()?;
        let mut store = self.empty_store();
        store
            .fetch(&mut source)
            .with_context(|| format!("failed to load permits from {}", source.path().display()))?;

        if let Some(sort) = self.config.default_sort {
            store.sort_by_field(Some(sort.field), sort.descending);
        }

        let mut session = MapSession::new(store);
        if let Some(reference) = self.config.reference {
            session.set_reference(Some(reference.point()), reference.radius_meters);
        }
        Ok(session)
    }

    /// Run one filter/sort/select pass over a freshly loaded snapshot.
    ///
    /// # Errors
    /// Returns an error when loading fails, the search text cannot be compiled, or
    /// the requested selection does not exist.
    pub fn browse(&self, request: &BrowseRequest) -> Result<BrowseResult> {
        let mut source = self.source()?;
        let mut store = self.empty_store();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        let subscription = store.subscribe(move |event| sink.borrow_mut().push(event.clone()));

        store
            .fetch(&mut source)
            .with_context(|| format!("failed to load permits from {}", source.path().display()))?;

        let configured = self.config.reference;
        let near = request.near.or(configured.map(|reference| reference.point()));
        let radius = request
            .radius_meters
            .or(configured.and_then(|reference| reference.radius_meters));
        let mut session = MapSession::new(store);
        session.set_reference(near, radius);
        let store = session.store_mut();

        store.filter_by_description_string(request.search.as_deref())?;
        store.filter_by_authority(Some(request.authorities.as_slice()));
        store.filter_by_types(Some(request.types.as_slice()));

        if let Some(sort) = request.sort.or(self.config.default_sort) {
            store.sort_by_field(Some(sort.field), sort.descending);
        }

        if let Some(id) = &request.select {
            store.select(id).with_context(|| format!("cannot select permit {id}"))?;
        }

        store.unsubscribe(subscription);
        let events = std::mem::take(&mut *events.borrow_mut());
        debug!(
            total = store.len(),
            visible = store.visible_count(),
            events = events.len(),
            "browse pass complete"
        );

        Ok(BrowseResult {
            total: store.len(),
            visible_count: store.visible_count(),
            active_filters: store.active_filter_names().into_iter().map(str::to_string).collect(),
            sort: store.sort_spec(),
            selected: store.selected_id().cloned(),
            bounds: store.visible_bounds(),
            permits: store.visible().cloned().collect(),
            events,
        })
    }

    /// Look up a single permit in the configured snapshot.
    ///
    /// # Errors
    /// Returns an error when loading fails or no permit has this id.
    pub fn show(&self, id: &PermitId) -> Result<PermitRecord> {
        let session = self.open_session()?;
        session
            .store()
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!(StoreError::UnknownPermit(id.clone())))
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use permit_store_core::{PermitField, AUTHORITY_FILTER, RADIUS_FILTER, SEARCH_FILTER};

    use super::*;

    pub(crate) fn unique_temp_dir(prefix: &str) -> PathBuf {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("permit-store-api-{prefix}-{now}"));
        fs::create_dir_all(&dir)
            .unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
        dir
    }

    const PERMITS_JSON: &str = r#"[
        {"id": "BZA-001", "name": "12 Brattle St", "description": "Rear deck addition",
         "location": {"lat": 42.3740, "lng": -71.1210}, "permit_type": "Variance",
         "authority": "BZA", "submitted": "2014-05-02", "area_sqft": 320.0},
        {"id": "PB-002", "name": "1 Kendall Sq", "description": "New lab building",
         "location": {"lat": 42.3663, "lng": -71.0907}, "permit_type": "Special Permit",
         "authority": "PB", "submitted": "2015-01-20", "area_sqft": 180000.0},
        {"id": "BZA-003", "name": "40 Mass Ave", "description": "Dormer and DECK",
         "location": {"lat": 42.3601, "lng": -71.0942}, "permit_type": "Special Permit",
         "authority": "BZA", "submitted": "2013-09-11"},
        {"id": "HC-004", "name": "Old Burying Ground", "description": "Fence repair",
         "permit_type": "Certificate", "authority": "HC"}
    ]"#;

    fn api_with(body: &str, prefix: &str) -> PermitBrowserApi {
        let dir = unique_temp_dir(prefix);
        let path = dir.join("permits.json");
        fs::write(&path, body)
            .unwrap_or_else(|err| panic!("failed to write {}: {err}", path.display()));
        PermitBrowserApi::new(BrowserConfig { permits_path: Some(path), ..BrowserConfig::default() })
    }

    fn browse(api: &PermitBrowserApi, request: &BrowseRequest) -> BrowseResult {
        api.browse(request).unwrap_or_else(|err| panic!("browse should succeed: {err:#}"))
    }

    fn ids(result: &BrowseResult) -> Vec<&str> {
        result.permits.iter().map(|permit| permit.id.as_str()).collect()
    }

    #[test]
    fn browse_without_criteria_returns_everything() {
        let api = api_with(PERMITS_JSON, "all");
        let result = browse(&api, &BrowseRequest::default());
        assert_eq!(result.total, 4);
        assert_eq!(result.visible_count, 4);
        assert!(result.active_filters.is_empty());
        assert_eq!(ids(&result), vec!["BZA-001", "PB-002", "BZA-003", "HC-004"]);
        assert_eq!(result.events.first(), Some(&StoreEvent::Fetching));
    }

    #[test]
    fn browse_combines_search_and_authority() {
        let api = api_with(PERMITS_JSON, "combined");
        let request = BrowseRequest {
            search: Some("deck".to_string()),
            authorities: vec!["BZA".to_string()],
            sort: Some(SortSpec::ascending(PermitField::Submitted)),
            ..BrowseRequest::default()
        };
        let result = browse(&api, &request);
        assert_eq!(ids(&result), vec!["BZA-003", "BZA-001"]);
        assert_eq!(result.visible_count, 2);
        assert_eq!(
            result.active_filters,
            vec![SEARCH_FILTER.to_string(), AUTHORITY_FILTER.to_string()]
        );
        assert_eq!(result.events.last(), Some(&StoreEvent::Sorted { sort: request.sort }));
    }

    #[test]
    fn browse_radius_uses_request_point() {
        let api = api_with(PERMITS_JSON, "radius");
        let request = BrowseRequest {
            near: Some(LatLng::new(42.3663, -71.0907)),
            radius_meters: Some(1_000.0),
            ..BrowseRequest::default()
        };
        let result = browse(&api, &request);
        assert_eq!(ids(&result), vec!["PB-002", "BZA-003"]);
        assert_eq!(result.active_filters, vec![RADIUS_FILTER.to_string()]);

        let Some(bounds) = result.bounds else {
            panic!("visible permits have locations");
        };
        assert!(bounds.contains(LatLng::new(42.3663, -71.0907)));
        assert!(bounds.contains(LatLng::new(42.3601, -71.0942)));
        assert!(!bounds.contains(LatLng::new(42.3740, -71.1210)));
    }

    #[test]
    fn config_defaults_apply_when_request_is_silent() {
        let mut api = api_with(PERMITS_JSON, "defaults");
        api.config.default_sort = Some(SortSpec::descending(PermitField::AreaSqft));
        api.config.reference =
            Some(ReferenceConfig { lat: 42.3740, lng: -71.1210, radius_meters: Some(500.0) });

        let result = browse(&api, &BrowseRequest::default());
        assert_eq!(ids(&result), vec!["BZA-001"]);

        let widened = browse(
            &api,
            &BrowseRequest { radius_meters: Some(50_000.0), ..BrowseRequest::default() },
        );
        assert_eq!(ids(&widened), vec!["PB-002", "BZA-001", "BZA-003"]);
    }

    #[test]
    fn browse_selects_requested_permit() {
        let api = api_with(PERMITS_JSON, "select");
        let request =
            BrowseRequest { select: Some(PermitId::from("PB-002")), ..BrowseRequest::default() };
        let result = browse(&api, &request);
        assert_eq!(result.selected, Some(PermitId::from("PB-002")));
        let selected: Vec<&str> = result
            .permits
            .iter()
            .filter(|permit| permit.selected())
            .map(|permit| permit.id.as_str())
            .collect();
        assert_eq!(selected, vec!["PB-002"]);

        let missing =
            BrowseRequest { select: Some(PermitId::from("ZZ-999")), ..BrowseRequest::default() };
        assert!(api.browse(&missing).is_err());
    }

    #[test]
    fn wrapped_snapshot_format_is_accepted() {
        let body = format!(r#"{{"permits": {PERMITS_JSON}}}"#);
        let api = api_with(&body, "wrapped");
        let permit = api
            .show(&PermitId::from("HC-004"))
            .unwrap_or_else(|err| panic!("show should succeed: {err:#}"));
        assert_eq!(permit.description.as_deref(), Some("Fence repair"));
        assert!(permit.location.is_none());
    }

    #[test]
    fn malformed_record_reports_the_parser_error() {
        let bare = r#"[{"id": "X-1", "submitted": "May 2 2014"}]"#;
        let wrapped = r#"{"permits": [{"id": "X-1", "submitted": "May 2 2014"}]}"#;
        for body in [bare, wrapped] {
            let mut source = JsonFileSource::new(unique_temp_dir("malformed").join("permits.json"));
            fs::write(source.path(), body)
                .unwrap_or_else(|err| panic!("failed to write fixture: {err}"));
            match source.fetch() {
                Err(StoreError::Fetch(message)) => {
                    assert!(message.contains("line 1 column"), "{message}");
                    assert!(!message.contains("did not match any variant"), "{message}");
                }
                other => panic!("malformed date should fail to parse: {other:?}"),
            }
        }
    }

    #[test]
    fn missing_snapshot_is_reported() {
        let api = PermitBrowserApi::new(BrowserConfig::default());
        match api.browse(&BrowseRequest::default()) {
            Err(err) => assert!(err.to_string().contains("no permits file configured")),
            Ok(result) => panic!("browse should fail without a snapshot: {result:?}"),
        }

        let api = PermitBrowserApi::new(BrowserConfig {
            permits_path: Some(unique_temp_dir("absent").join("missing.json")),
            ..BrowserConfig::default()
        });
        assert!(api.browse(&BrowseRequest::default()).is_err());
    }

    #[test]
    fn duplicate_ids_in_snapshot_are_rejected() {
        let api = api_with(r#"[{"id": "X-1"}, {"id": "X-1"}]"#, "duplicate");
        match api.browse(&BrowseRequest::default()) {
            Err(err) => assert!(format!("{err:#}").contains("duplicate permit id")),
            Ok(result) => panic!("duplicates should be rejected: {result:?}"),
        }
    }
}
