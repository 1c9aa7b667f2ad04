//! Point Filter Module

use log::debug;

use crate::geodesy::GeoPoint;
use crate::region::EventRegion;

/// Keep the points strictly inside `region`, longitudes normalized to
/// [-180, 180].
pub fn filter_inside(points: &[GeoPoint], region: &EventRegion) -> Vec<GeoPoint> {
    let kept: Vec<GeoPoint> = points.iter().map(|p| p.normalized()).filter(|p| region.contains(p)).collect();
    debug!("Point filter kept {}/{} candidates for '{}'", kept.len(), points.len(), region.event);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{EventPolygon, EventType};
    use chrono::Utc;

    fn square_region(lon0: f64, lon1: f64) -> EventRegion {
        let ring = vec![
            GeoPoint::new(10.0, lon0),
            GeoPoint::new(20.0, lon0),
            GeoPoint::new(20.0, lon1),
            GeoPoint::new(10.0, lon1),
            GeoPoint::new(10.0, lon0),
        ];
        let now = Utc::now();
        EventRegion::single(EventPolygon::new(EventType::Sunset, now, now, ring))
    }

    #[test]
    fn test_normalizes_360_longitudes() {
        let region = square_region(-30.0, -10.0);
        let pts = vec![GeoPoint::new(15.0, 340.0), GeoPoint::new(15.0, 100.0)];
        let kept = filter_inside(&pts, &region);
        assert_eq!(kept, vec![GeoPoint::new(15.0, -20.0)]);
    }

    #[test]
    fn test_boundary_points_excluded() {
        let region = square_region(100.0, 110.0);
        let pts = vec![GeoPoint::new(10.0, 105.0), GeoPoint::new(15.0, 100.0), GeoPoint::new(15.0, 105.0)];
        assert_eq!(filter_inside(&pts, &region), vec![GeoPoint::new(15.0, 105.0)]);
    }

    #[test]
    fn test_ring_past_antimeridian() {
        // Unwrapped ring spanning 170..190
        let region = square_region(170.0, 190.0);
        let pts = vec![GeoPoint::new(15.0, -175.0), GeoPoint::new(15.0, 175.0), GeoPoint::new(15.0, -160.0)];
        let kept = filter_inside(&pts, &region);
        assert_eq!(kept.len(), 2, "kept: {:?}", kept);
    }
}
