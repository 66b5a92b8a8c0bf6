//! Client-side data layer for a map-based permit browser.
//!
//! [`PermitStore`] owns the permit records, a registry of named filter predicates,
//! the active sort, and the single selection. Every filter mutation funnels through
//! [`PermitStore::refresh`], which recomputes each record's `excluded` flag and
//! emits [`StoreEvent::Filtered`] once the new state is settled.

mod geo;
mod location;
mod record;
mod session;
mod store;

pub use geo::{GeoMetric, Haversine, LatLng, LatLngBounds, MEAN_EARTH_RADIUS_METERS};
pub use location::{LocationSource, ReferenceLocation};
pub use record::{FieldValue, PermitField, PermitId, PermitRecord};
pub use session::MapSession;
pub use store::{
    PermitSource, PermitStore, Predicate, SelectionChange, SortSpec, StoreEvent, SubscriptionId,
    AUTHORITY_FILTER, RADIUS_FILTER, SEARCH_FILTER, TYPES_FILTER,
};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum StoreError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("unknown permit: {0}")]
    UnknownPermit(PermitId),
    #[error("duplicate permit id in batch: {0}")]
    DuplicatePermit(PermitId),
    #[error("unknown permit field: {0}")]
    UnknownField(String),
    #[error("invalid search pattern: {0}")]
    Pattern(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
}
