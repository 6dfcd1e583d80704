// Geometry helpers over node positions

use crate::layout::LayoutEntry;
use std::collections::HashMap;

/// Axis-aligned bounding box of a set of positions
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

/// Bounding box of all positions, or `None` when there are none
pub fn bounds<'a, I>(positions: I) -> Option<Bounds>
where
    I: IntoIterator<Item = &'a LayoutEntry>,
{
    positions.into_iter().fold(None, |acc, p| {
        Some(match acc {
            None => Bounds {
                min_x: p.x,
                max_x: p.x,
                min_y: p.y,
                max_y: p.y,
            },
            Some(b) => Bounds {
                min_x: b.min_x.min(p.x),
                max_x: b.max_x.max(p.x),
                min_y: b.min_y.min(p.y),
                max_y: b.max_y.max(p.y),
            },
        })
    })
}

/// Position closest to (x, y) by Manhattan distance
pub fn nearest(positions: &[LayoutEntry], x: f64, y: f64) -> Option<&LayoutEntry> {
    positions.iter().min_by(|a, b| {
        let da = (a.x - x).abs() + (a.y - y).abs();
        let db = (b.x - x).abs() + (b.y - y).abs();
        da.total_cmp(&db)
    })
}

/// Place each group of nodes in a square grid right of everything drawn.
///
/// `positions` holds every node currently drawn; `groups` lists the node
/// ids to move, one grid per group. Grid spacing is 1.25x the node size,
/// and each grid starts two columns past the right edge of the bounding
/// box as it stands after the previous group was placed. Returns the new
/// positions of the moved nodes.
pub fn isolated_grid(
    positions: &[LayoutEntry],
    groups: &[Vec<String>],
    node_size: (f64, f64),
) -> Vec<LayoutEntry> {
    let pad_x = (node_size.0 * 1.25).ceil();
    let pad_y = (node_size.1 * 1.25).ceil();

    let mut current: HashMap<String, LayoutEntry> = positions
        .iter()
        .map(|p| (p.id.clone(), p.clone()))
        .collect();
    let mut moved = Vec::new();

    for group in groups.iter().filter(|g| !g.is_empty()) {
        let Some(b) = bounds(current.values()) else {
            break;
        };
        let start_x = b.max_x + pad_x * 2.0;
        let per_row = (group.len() as f64).sqrt().ceil() as usize;

        let mut x = start_x;
        let mut y = b.min_y + pad_y;
        let mut in_row = 0;
        for id in group {
            let entry = LayoutEntry::new(id.clone(), x, y);
            current.insert(id.clone(), entry.clone());
            moved.push(entry);

            in_row += 1;
            if in_row < per_row {
                x += pad_x;
            } else {
                in_row = 0;
                x = start_x;
                y += pad_y;
            }
        }
    }

    moved
}
