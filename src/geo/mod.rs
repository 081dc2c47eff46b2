use crate::models::coordinate::Coordinate;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * central_angle
}

pub fn path_length_km(path: &[Coordinate]) -> f64 {
    path.windows(2).map(|w| haversine_km(&w[0], &w[1])).sum()
}

/// Points along the great circle from `a` to `b`, excluding `a`, including `b`.
pub fn great_circle_steps(a: &Coordinate, b: &Coordinate, steps: usize) -> Vec<Coordinate> {
    let steps = steps.max(1);
    let distance = haversine_km(a, b) / EARTH_RADIUS_KM;
    if distance < 1e-12 {
        return vec![*b];
    }

    let (lat1, lng1) = (a.lat.to_radians(), a.lng.to_radians());
    let (lat2, lng2) = (b.lat.to_radians(), b.lng.to_radians());
    let sin_d = distance.sin();

    (1..=steps)
        .map(|i| {
            if i == steps {
                return *b;
            }
            let f = i as f64 / steps as f64;
            let wa = ((1.0 - f) * distance).sin() / sin_d;
            let wb = (f * distance).sin() / sin_d;

            let x = wa * lat1.cos() * lng1.cos() + wb * lat2.cos() * lng2.cos();
            let y = wa * lat1.cos() * lng1.sin() + wb * lat2.cos() * lng2.sin();
            let z = wa * lat1.sin() + wb * lat2.sin();

            Coordinate {
                lat: z.atan2((x * x + y * y).sqrt()).to_degrees(),
                lng: y.atan2(x).to_degrees(),
            }
        })
        .collect()
}
