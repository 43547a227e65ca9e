use crate::types::point::MetricsPoint;

/// Merge identity tags into every point before flush. Insert semantics: a
/// key already present is overwritten, but identity keys (`customer`,
/// `wallet`, `coin`, `pool`) are chosen not to collide with anything the
/// adapters write.
pub fn enrich(points: &mut [MetricsPoint], tags: &[(&str, &str)]) {
    for point in points.iter_mut() {
        for (key, value) in tags {
            point.tags.insert((*key).to_string(), (*value).to_string());
        }
    }
}
