//! Region traversal and vision tests.
//!
//! Every traversal is checked against a brute-force enumeration that
//! simply measures the distance from the centre to every cell.

use lockstep_core::{
    map::{Coords, Direction, Map},
    region::{area_cells, Area, DifferenceRegion, RingRegion},
    vision::Vision,
};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use std::collections::BTreeSet;

fn brute_force_area(map: &Map, area: Area) -> BTreeSet<Coords> {
    (0..map.cell_count())
        .map(|i| map.coords(i))
        .filter(|&c| map.calc_distance(area.center, c) <= u32::from(area.radius))
        .collect()
}

fn centers() -> Vec<Coords> {
    vec![
        Coords::new(5, 5),
        Coords::new(0, 0),
        Coords::new(23, 23),
        Coords::new(10, 7),
        Coords::new(3, 22),
    ]
}

#[test]
fn ring_has_six_r_distinct_cells_at_distance_r() {
    let map = Map::new(24, 24).unwrap();
    for center in centers() {
        for radius in 1..=5u16 {
            let ring: Vec<Coords> = RingRegion::new(&map, Area::new(center, radius)).collect();
            assert_eq!(ring.len(), 6 * radius as usize);
            let unique: BTreeSet<_> = ring.iter().copied().collect();
            assert_eq!(unique.len(), ring.len(), "ring repeats a cell");
            assert!(ring
                .iter()
                .all(|&c| map.calc_distance(center, c) == u32::from(radius)));
        }
    }
}

#[test]
fn zero_ring_is_the_centre() {
    let map = Map::new(8, 8).unwrap();
    let ring: Vec<Coords> = RingRegion::new(&map, Area::new(Coords::new(3, 3), 0)).collect();
    assert_eq!(ring, vec![Coords::new(3, 3)]);
}

#[test]
fn area_cells_match_brute_force() {
    let map = Map::new(24, 24).unwrap();
    for center in centers() {
        for radius in 0..=5u16 {
            let area = Area::new(center, radius);
            let cells = area_cells(&map, area);
            assert_eq!(cells[0], center);
            let set: BTreeSet<Coords> = cells.iter().copied().collect();
            assert_eq!(set.len(), cells.len());
            assert_eq!(set, brute_force_area(&map, area));
        }
    }
}

#[test]
fn entering_and_leaving_are_the_set_differences() {
    let map = Map::new(24, 24).unwrap();
    for center in centers() {
        for radius in 0..=5u16 {
            let old = Area::new(center, radius);
            let old_cells = brute_force_area(&map, old);
            for dir in Direction::ALL {
                let new = Area::new(map.neighbour(center, dir), radius);
                let new_cells = brute_force_area(&map, new);

                let entering: Vec<Coords> = DifferenceRegion::entering(&map, old, dir).collect();
                assert_eq!(entering.len(), 2 * radius as usize + 1);
                let expected: BTreeSet<Coords> = new_cells.difference(&old_cells).copied().collect();
                assert_eq!(
                    entering.iter().copied().collect::<BTreeSet<_>>(),
                    expected,
                    "entering {center:?} r={radius} {dir:?}"
                );

                let leaving: BTreeSet<Coords> = DifferenceRegion::leaving(&map, old, dir).collect();
                let expected: BTreeSet<Coords> = old_cells.difference(&new_cells).copied().collect();
                assert_eq!(leaving, expected, "leaving {center:?} r={radius} {dir:?}");
            }
        }
    }
}

#[test]
fn difference_cursor_turns_exactly_one_corner() {
    let map = Map::new(24, 24).unwrap();
    let mut region = DifferenceRegion::entering(&map, Area::new(Coords::new(8, 8), 3), Direction::East);
    assert!(!region.cursor().passed_corner);
    assert_eq!(region.cursor().direction, Direction::NorthEast);
    let cells: Vec<Coords> = region.by_ref().collect();
    assert_eq!(cells.len(), 7);
    assert!(region.cursor().passed_corner);
    assert_eq!(region.cursor().direction, Direction::NorthWest);
    assert_eq!(region.next(), None);
}

#[test]
fn incremental_vision_matches_full_recompute() {
    let map = Map::new(24, 24).unwrap();
    let mut rng = Pcg64Mcg::seed_from_u64(11);
    let mut vision = Vision::new(map.cell_count());

    let mut viewers: Vec<Area> = (0..4)
        .map(|i| Area::new(Coords::new(3 + i * 4, 5 + i * 3), 1 + i as u16))
        .collect();
    for &area in &viewers {
        vision.see_area(&map, area);
    }

    for _ in 0..500 {
        let who = rng.gen_range(0..viewers.len());
        let dir = Direction::ALL[rng.gen_range(0..6)];
        viewers[who] = vision.move_area(&map, viewers[who], dir);
    }

    let mut full = Vision::new(map.cell_count());
    for &area in &viewers {
        full.see_area(&map, area);
    }
    assert_eq!(vision, full);

    for &area in &viewers {
        vision.unsee_area(&map, area);
    }
    assert_eq!(vision.visible_cells(), 0);
}

#[test]
fn overlapping_viewers_are_counted() {
    let map = Map::new(16, 16).unwrap();
    let mut vision = Vision::new(map.cell_count());
    let c = Coords::new(6, 6);
    vision.see_area(&map, Area::new(c, 2));
    vision.see_area(&map, Area::new(c, 1));
    assert_eq!(vision.viewers(&map, c), 2);
    assert_eq!(vision.visible_cells(), 19);

    vision.unsee_area(&map, Area::new(c, 1));
    assert!(vision.is_visible(&map, c));
    assert_eq!(vision.viewers(&map, c), 1);
}
