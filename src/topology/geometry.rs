// Planar helpers for the working frame (metres). Everything here is plain
// Euclidean math on coordinates already projected by `LocalTangentPlane`.

use geo::{Coord, LineString};
use rstar::AABB;

pub fn distance(a: Coord, b: Coord) -> f64 {
    ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt()
}

/// Project `p` onto segment `a`-`b`.
/// Returns (t in [0, 1], distance from segment).
pub fn project_onto_segment(p: Coord, a: Coord, b: Coord) -> (f64, f64) {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return (0.0, distance(p, a));
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    let closest = Coord {
        x: a.x + dx * t,
        y: a.y + dy * t,
    };
    (t, distance(p, closest))
}

/// Calculate Euclidean length of a polyline in metric space.
pub fn polyline_length(line: &LineString<f64>) -> f64 {
    line.0.windows(2).map(|w| distance(w[0], w[1])).sum()
}

/// Project point to polyline.
/// Returns (distance_along_polyline, distance_from_polyline), or None for empty lines.
pub fn locate_on_polyline(p: Coord, line: &LineString<f64>) -> Option<(f64, f64)> {
    match line.0.len() {
        0 => None,
        1 => Some((0.0, distance(p, line.0[0]))),
        _ => {
            let mut best: Option<(f64, f64)> = None;
            let mut walked = 0.0;
            for w in line.0.windows(2) {
                let seg_len = distance(w[0], w[1]);
                let (t, off) = project_onto_segment(p, w[0], w[1]);
                // strict `<` keeps the earliest segment on ties (shared vertices)
                if best.is_none_or(|(_, best_off)| off < best_off) {
                    best = Some((walked + t * seg_len, off));
                }
                walked += seg_len;
            }
            best
        }
    }
}

/// Envelope of a line, grown by `pad` on every side.
pub fn line_envelope(line: &LineString<f64>, pad: f64) -> Option<AABB<[f64; 2]>> {
    let first = line.0.first()?;
    let mut min = [first.x, first.y];
    let mut max = [first.x, first.y];
    for c in &line.0[1..] {
        min[0] = min[0].min(c.x);
        min[1] = min[1].min(c.y);
        max[0] = max[0].max(c.x);
        max[1] = max[1].max(c.y);
    }
    Some(AABB::from_corners(
        [min[0] - pad, min[1] - pad],
        [max[0] + pad, max[1] + pad],
    ))
}

pub fn point_envelope(p: Coord, pad: f64) -> AABB<[f64; 2]> {
    AABB::from_corners([p.x - pad, p.y - pad], [p.x + pad, p.y + pad])
}

/// Cut a polyline at the given (distance along, cut vertex) pairs.
///
/// `cuts` must be sorted by distance and lie strictly inside the line. The cut
/// vertex is used verbatim as the shared endpoint of neighbouring pieces, and
/// the original vertices between two cuts are preserved.
pub fn cut_polyline(line: &LineString<f64>, cuts: &[(f64, Coord)]) -> Vec<LineString<f64>> {
    let coords = &line.0;
    if coords.len() < 2 || cuts.is_empty() {
        return vec![line.clone()];
    }

    // distance along the line of every original vertex
    let mut vertex_dist = Vec::with_capacity(coords.len());
    let mut walked = 0.0;
    vertex_dist.push(0.0);
    for w in coords.windows(2) {
        walked += distance(w[0], w[1]);
        vertex_dist.push(walked);
    }

    let mut pieces = Vec::with_capacity(cuts.len() + 1);
    let mut current = vec![coords[0]];
    let mut next_vertex = 1;

    for &(cut_dist, cut_point) in cuts {
        while next_vertex < coords.len() - 1 && vertex_dist[next_vertex] < cut_dist {
            current.push(coords[next_vertex]);
            next_vertex += 1;
        }
        // a cut landing on an original vertex consumes it
        if next_vertex < coords.len() - 1 && distance(coords[next_vertex], cut_point) <= 1e-9 {
            next_vertex += 1;
        }
        current.push(cut_point);
        pieces.push(LineString::new(std::mem::replace(&mut current, vec![cut_point])));
    }

    current.extend_from_slice(&coords[next_vertex..]);
    pieces.push(LineString::new(current));
    pieces
}
