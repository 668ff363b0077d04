//! Simulation benchmarks for copanzers_core.
//!
//! Run with: `cargo bench -p copanzers_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use copanzers_core::components::Shape;
use copanzers_core::config::SimConfig;
use copanzers_core::geometry::Aabb;
use copanzers_core::math::{Fixed, Vec2Fixed, PI};
use copanzers_core::simulation::{ObstacleSpawn, Simulation, TankSpawn};
use copanzers_core::spatial::SpatialGrid;

fn battle(per_team: i32) -> Simulation {
    let mut sim = Simulation::new(SimConfig::default()).expect("default config");
    for i in 0..per_team {
        let row = 30 + (i % 18) * 30;
        let column = (i / 18) * 25;
        sim.spawn_tank(TankSpawn::new(0, Vec2Fixed::from_ints(60 + column, row)))
            .expect("team 0");
        sim.spawn_tank(TankSpawn::new(1, Vec2Fixed::from_ints(740 - column, row)).facing(PI))
            .expect("team 1");
    }
    sim.spawn_obstacle(ObstacleSpawn {
        position: Vec2Fixed::from_ints(400, 300),
        orientation: Fixed::ZERO,
        shape: Shape::rect(Fixed::from_num(15), Fixed::from_num(120)),
        integrity: None,
    })
    .expect("wall");
    sim
}

/// Tick throughput with every tank firing whenever it can.
pub fn simulation_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");
    for per_team in [8, 32, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(per_team * 2), &per_team, |b, &n| {
            let mut sim = battle(n);
            let commands: Vec<_> = sim
                .snapshot()
                .tanks()
                .map(|t| copanzers_core::components::TankCommand::fire_only(t.id))
                .collect();
            b.iter(|| black_box(sim.advance(&commands)));
        });
    }
    group.finish();
}

/// Grid queries against a linear scan over the same bounds.
pub fn spatial_benchmark(c: &mut Criterion) {
    let mut grid = SpatialGrid::new(Fixed::from_num(64));
    grid.rebuild((0..500u64).map(|id| {
        let x = (id * 37 % 800) as i32;
        let y = (id * 53 % 600) as i32;
        (id, Aabb::around_circle(Vec2Fixed::from_ints(x, y), Fixed::from_num(10)))
    }));
    let area = Aabb::around_circle(Vec2Fixed::from_ints(400, 300), Fixed::from_num(50));

    c.bench_function("spatial/query_region", |b| {
        b.iter(|| black_box(grid.query_region(black_box(&area))));
    });
    c.bench_function("spatial/query_linear", |b| {
        b.iter(|| black_box(grid.query_linear(black_box(&area))));
    });
}

criterion_group!(benches, simulation_benchmark, spatial_benchmark);
criterion_main!(benches);
