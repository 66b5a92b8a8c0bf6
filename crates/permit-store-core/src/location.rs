use crate::geo::LatLng;

/// Upstream reference location: a point plus a search radius.
pub trait LocationSource {
    fn point(&self) -> Option<LatLng>;
    fn radius_meters(&self) -> Option<f64>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReferenceLocation {
    point: Option<LatLng>,
    radius_meters: Option<f64>,
}

impl ReferenceLocation {
    #[must_use]
    pub fn new(point: Option<LatLng>, radius_meters: Option<f64>) -> Self {
        Self { point, radius_meters }
    }

    /// Returns `true` when the stored point changed.
    pub fn set_point(&mut self, point: Option<LatLng>) -> bool {
        if self.point == point {
            return false;
        }
        self.point = point;
        true
    }

    /// Returns `true` when the stored radius changed.
    pub fn set_radius_meters(&mut self, radius_meters: Option<f64>) -> bool {
        if self.radius_meters == radius_meters {
            return false;
        }
        self.radius_meters = radius_meters;
        true
    }
}

impl LocationSource for ReferenceLocation {
    fn point(&self) -> Option<LatLng> {
        self.point
    }

    fn radius_meters(&self) -> Option<f64> {
        self.radius_meters
    }
}
