use jmx_formats::geometry::{GRID_CELL_SIZE, Point2, build_lookup_grid};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Reference check: walk the segment in 1/1000 steps and test each sample
/// against the closed square. Any hit proves the square is touched.
fn sampled_hit(lo: Point2, hi: Point2, p: Point2, q: Point2) -> bool {
    (0..=1000).any(|k| {
        let t = k as f64 / 1000.0;
        let x = p[0] + (q[0] - p[0]) * t;
        let y = p[1] + (q[1] - p[1]) * t;
        x >= lo[0] && x <= hi[0] && y >= lo[1] && y <= hi[1]
    })
}

#[test]
fn every_overlapping_edge_is_bucketed() {
    let mut rng = StdRng::seed_from_u64(0x5EED_1234);

    for round in 0..40 {
        let min = [rng.gen_range(-300..300) as f32, rng.gen_range(-300..300) as f32];
        let max = [
            min[0] + rng.gen_range(1..600) as f32,
            min[1] + rng.gen_range(1..600) as f32,
        ];

        let segments: Vec<(Point2, Point2)> = (0..rng.gen_range(1..60))
            .map(|_| {
                let mut point = || {
                    [
                        rng.gen_range(min[0] as i32 - 50..=max[0] as i32 + 50) as f64,
                        rng.gen_range(min[1] as i32 - 50..=max[1] as i32 + 50) as f64,
                    ]
                };
                (point(), point())
            })
            .collect();

        let grid = build_lookup_grid(min, max, &segments).unwrap();
        assert_eq!(grid.cells.len(), (grid.width * grid.height) as usize);
        assert!(grid.width as f64 * GRID_CELL_SIZE >= (max[0] - min[0]) as f64);
        assert!(grid.height as f64 * GRID_CELL_SIZE >= (max[1] - min[1]) as f64);

        for row in 0..grid.height {
            for column in 0..grid.width {
                let (lo, hi) = grid.cell_bounds(column, row);
                let bucket = grid.cell(column, row).unwrap();
                assert!(bucket.windows(2).all(|w| w[0] < w[1]), "bucket not sorted");

                for (local, (p, q)) in segments.iter().enumerate() {
                    if sampled_hit(lo, hi, *p, *q) {
                        assert!(
                            bucket.contains(&(local as u16)),
                            "round {}: segment {} {:?}-{:?} missing from square ({}, {})",
                            round,
                            local,
                            p,
                            q,
                            column,
                            row
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn segment_along_a_border_lands_in_both_neighbours() {
    let segments = vec![([20.0, 100.0], [80.0, 100.0])];
    let grid = build_lookup_grid([0.0, 0.0], [100.0, 200.0], &segments).unwrap();
    assert_eq!(grid.cell(0, 0).unwrap(), &[0]);
    assert_eq!(grid.cell(0, 1).unwrap(), &[0]);
}
