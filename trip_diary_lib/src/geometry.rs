use crate::coordinate::Coordinate;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in km.
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = f64::sin(d_lat / 2.).powi(2)
        + f64::cos(lat1) * f64::cos(lat2) * f64::sin(d_lon / 2.).powi(2);

    // Rounding can push h slightly outside [0, 1] for identical or antipodal points
    let h = h.clamp(0., 1.);
    let c = 2. * f64::asin(f64::sqrt(h));

    EARTH_RADIUS_KM * c
}

/// Sum of the distances between consecutive points. Zero for fewer than two points.
pub fn path_distance_km(path: &[Coordinate]) -> f64 {
    path.windows(2).map(|pair| distance_km(pair[0], pair[1])).sum()
}

#[test]
fn distance_to_self_is_zero() {
    for point in [
        Coordinate::new(0., 0.),
        Coordinate::new(55.676098, 12.568337),
        Coordinate::new(-89.9999, 179.9999),
        Coordinate::new(400., -1000.),
    ] {
        assert_eq!(distance_km(point, point), 0.);
    }
}

#[test]
fn distance_is_symmetric() {
    let copenhagen = Coordinate::new(55.676098, 12.568337);
    let yerevan = Coordinate::new(40.177200, 44.503490);
    assert_eq!(distance_km(copenhagen, yerevan), distance_km(yerevan, copenhagen));
}

#[test]
fn one_degree_on_the_equator() {
    let d = distance_km(Coordinate::new(0., 0.), Coordinate::new(0., 1.));
    assert!((d - 111.19492664).abs() < 1e-6, "got {d}");
}

#[test]
fn antipodal_points_do_not_produce_nan() {
    let d = distance_km(Coordinate::new(0., 0.), Coordinate::new(0., 180.));
    assert!(d.is_finite());
    assert!((d - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);

    let d = distance_km(Coordinate::new(89.999999, 0.), Coordinate::new(-89.999999, 180.));
    assert!(d.is_finite());
}

#[test]
fn out_of_range_input_does_not_panic() {
    let d = distance_km(Coordinate::new(f64::NAN, 0.), Coordinate::new(1000., 1e9));
    let _ = d;
}

#[test]
fn short_paths_have_zero_length() {
    assert_eq!(path_distance_km(&[]), 0.);
    assert_eq!(path_distance_km(&[Coordinate::new(12., 34.)]), 0.);
}

#[test]
fn path_distance_sums_segments() {
    let path = [
        Coordinate::new(0., 0.),
        Coordinate::new(0., 1.),
        Coordinate::new(1., 1.),
        Coordinate::new(1., 1.),
    ];
    let expected = distance_km(path[0], path[1]) + distance_km(path[1], path[2]);
    assert!((path_distance_km(&path) - expected).abs() < 1e-9);
    assert!(path_distance_km(&path) >= 0.);
}
