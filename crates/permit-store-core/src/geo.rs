use serde::{Deserialize, Serialize};

/// Mean Earth radius used by web map libraries for great-circle distances.
pub const MEAN_EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    #[must_use]
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    #[must_use]
    pub fn is_valid(self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Distance capability used by the radius filter.
pub trait GeoMetric {
    fn distance_meters(&self, from: LatLng, to: LatLng) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Haversine {
    pub radius_meters: f64,
}

impl Default for Haversine {
    fn default() -> Self {
        Self { radius_meters: MEAN_EARTH_RADIUS_METERS }
    }
}

impl GeoMetric for Haversine {
    fn distance_meters(&self, from: LatLng, to: LatLng) -> f64 {
        let lat1 = from.lat.to_radians();
        let lat2 = to.lat.to_radians();
        let sin_dlat = ((to.lat - from.lat).to_radians() / 2.0).sin();
        let sin_dlng = ((to.lng - from.lng).to_radians() / 2.0).sin();
        let a = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlng * sin_dlng;
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        self.radius_meters * c
    }
}

/// Axis-aligned box in degrees. Does not handle antimeridian wrapping.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LatLngBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl LatLngBounds {
    #[must_use]
    pub fn from_point(point: LatLng) -> Self {
        Self { south_west: point, north_east: point }
    }

    /// Smallest box covering every point, or `None` for an empty input.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = LatLng>,
    {
        let mut points = points.into_iter();
        let first = points.next()?;
        let mut bounds = Self::from_point(first);
        for point in points {
            bounds.extend(point);
        }
        Some(bounds)
    }

    pub fn extend(&mut self, point: LatLng) {
        self.south_west.lat = self.south_west.lat.min(point.lat);
        self.south_west.lng = self.south_west.lng.min(point.lng);
        self.north_east.lat = self.north_east.lat.max(point.lat);
        self.north_east.lng = self.north_east.lng.max(point.lng);
    }

    #[must_use]
    pub fn contains(&self, point: LatLng) -> bool {
        (self.south_west.lat..=self.north_east.lat).contains(&point.lat)
            && (self.south_west.lng..=self.north_east.lng).contains(&point.lng)
    }

    #[must_use]
    pub fn center(&self) -> LatLng {
        LatLng {
            lat: (self.south_west.lat + self.north_east.lat) / 2.0,
            lng: (self.south_west.lng + self.north_east.lng) / 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_matches_known_distance() {
        // One degree of latitude on the mean sphere.
        let metric = Haversine::default();
        let distance = metric.distance_meters(LatLng::new(0.0, 0.0), LatLng::new(1.0, 0.0));
        assert!((distance - 111_194.93).abs() < 1.0, "distance was {distance}");
    }

    #[test]
    fn haversine_is_zero_for_same_point() {
        let point = LatLng::new(42.3736, -71.1097);
        assert!(Haversine::default().distance_meters(point, point).abs() < f64::EPSILON);
    }

    #[test]
    fn bounds_cover_every_point() {
        let points = [LatLng::new(1.0, -2.0), LatLng::new(-3.0, 4.0), LatLng::new(0.5, 0.5)];
        let Some(bounds) = LatLngBounds::from_points(points) else {
            panic!("bounds should exist for non-empty input");
        };
        assert_eq!(bounds.south_west, LatLng::new(-3.0, -2.0));
        assert_eq!(bounds.north_east, LatLng::new(1.0, 4.0));
        assert!(points.iter().all(|point| bounds.contains(*point)));
        assert_eq!(bounds.center(), LatLng::new(-1.0, 1.0));
    }

    #[test]
    fn bounds_of_nothing_is_none() {
        assert!(LatLngBounds::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn lat_lng_validity_rejects_out_of_range() {
        assert!(LatLng::new(90.0, 180.0).is_valid());
        assert!(!LatLng::new(90.5, 0.0).is_valid());
        assert!(!LatLng::new(0.0, -181.0).is_valid());
        assert!(!LatLng::new(f64::NAN, 0.0).is_valid());
    }
}
