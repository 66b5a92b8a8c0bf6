use crate::geo::LatLng;
use crate::location::ReferenceLocation;
use crate::store::PermitStore;

/// One map session: a permit store wired to the reference location that drives its
/// radius filter. Location changes reach the store only through this type, and
/// dropping the session releases the store together with its listeners.
#[derive(Debug, Default)]
pub struct MapSession {
    store: PermitStore,
    location: ReferenceLocation,
}

impl MapSession {
    #[must_use]
    pub fn new(store: PermitStore) -> Self {
        Self { store, location: ReferenceLocation::default() }
    }

    #[must_use]
    pub fn store(&self) -> &PermitStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut PermitStore {
        &mut self.store
    }

    #[must_use]
    pub fn location(&self) -> &ReferenceLocation {
        &self.location
    }

    /// Returns the visible count after the change, or `None` when nothing changed.
    pub fn set_reference_point(&mut self, point: Option<LatLng>) -> Option<usize> {
        self.location.set_point(point).then(|| self.location_changed())
    }

    /// Returns the visible count after the change, or `None` when nothing changed.
    pub fn set_reference_radius(&mut self, radius_meters: Option<f64>) -> Option<usize> {
        self.location.set_radius_meters(radius_meters).then(|| self.location_changed())
    }

    /// Update point and radius together, re-filtering at most once.
    pub fn set_reference(
        &mut self,
        point: Option<LatLng>,
        radius_meters: Option<f64>,
    ) -> Option<usize> {
        let point_changed = self.location.set_point(point);
        let radius_changed = self.location.set_radius_meters(radius_meters);
        (point_changed || radius_changed).then(|| self.location_changed())
    }

    fn location_changed(&mut self) -> usize {
        self.store.update_radius_filter(&self.location)
    }
}
