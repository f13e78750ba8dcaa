use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use parkstore::grid::Grid;
use parkstore::models::{
    Coordinates, Dimensions, NewSite, NewUser, Region, Role, SiteId, SiteKind, Spot, UserId,
};
use parkstore::store::ParkingStore;

fn create_site(store: &ParkingStore, name: &str, dimensions: Dimensions) -> SiteId {
    let entrance = match store.list_entrances(None).first() {
        Some(entrance) => entrance.id,
        None => store
            .add_entrance("North Hall-0", Coordinates::new(123.0, 456.0), Region::North)
            .unwrap(),
    };
    store
        .create_site(NewSite {
            kind: SiteKind::Lot,
            name: name.to_string(),
            coordinates: Coordinates::new(42.73, -84.48),
            dimensions,
            nearest_entrance_id: entrance,
        })
        .unwrap()
}

fn create_users(store: &ParkingStore, count: usize) -> Vec<UserId> {
    (0..count)
        .map(|i| {
            store
                .register_user(NewUser {
                    first_name: "Bench".to_string(),
                    last_name: "Driver".to_string(),
                    username: format!("bench{i}"),
                    password: "pw".to_string(),
                    role: Role::User,
                })
                .unwrap()
        })
        .collect()
}

// Grid-level: scanning for the last free cell of a nearly full grid

fn bench_find_first_available(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_first_available_nearly_full");

    for &(floors, rows, cols) in &[(1, 10, 10), (10, 30, 30), (100, 30, 30)] {
        let dims = Dimensions::new(floors, rows, cols);
        let mut grid = Grid::new(dims);
        while let Some(spot) = grid.find_first_available() {
            grid.claim(spot).unwrap();
        }
        let last = Spot::new(floors - 1, rows - 1, cols - 1);
        grid.release(last).unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(dims.capacity()),
            &grid,
            |b, grid| b.iter(|| black_box(grid.find_first_available())),
        );
    }

    group.finish();
}

// Store-level: one user parking and leaving repeatedly

fn bench_park_unpark_cycle(c: &mut Criterion) {
    let store = ParkingStore::new();
    let site = create_site(&store, "bench-lot", Dimensions::new(3, 5, 5));
    let user = create_users(&store, 1)[0];

    c.bench_function("park_unpark_cycle", |b| {
        b.iter(|| {
            let vehicle = store
                .park_first_available(user, "BENCH-1", SiteKind::Lot, site)
                .unwrap();
            black_box(store.unpark(vehicle.user_id).unwrap())
        })
    });
}

// Contention: several threads cycling on one site vs. one site each

fn bench_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("park_unpark_contention");
    group.measurement_time(Duration::from_secs(10));
    let threads = 4;

    for shared in [true, false] {
        let store = ParkingStore::new();
        let users = create_users(&store, threads);
        let sites: Vec<SiteId> = if shared {
            vec![create_site(&store, "lot-shared", Dimensions::new(1, 10, 10)); threads]
        } else {
            (0..threads)
                .map(|i| create_site(&store, &format!("lot-{i}"), Dimensions::new(1, 10, 10)))
                .collect()
        };

        let label = if shared { "one_site" } else { "site_per_thread" };
        group.bench_function(label, |b| {
            b.iter_custom(|iters| {
                let barrier = Arc::new(Barrier::new(threads + 1));
                let handles: Vec<_> = users
                    .iter()
                    .zip(sites.iter())
                    .map(|(&user, &site)| {
                        let store = store.clone();
                        let barrier = Arc::clone(&barrier);
                        thread::spawn(move || {
                            barrier.wait();
                            for _ in 0..iters {
                                store
                                    .park_first_available(user, "BENCH", SiteKind::Lot, site)
                                    .unwrap();
                                store.unpark(user).unwrap();
                            }
                        })
                    })
                    .collect();

                barrier.wait();
                let start = Instant::now();
                for handle in handles {
                    handle.join().unwrap();
                }
                start.elapsed()
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_find_first_available,
    bench_park_unpark_cycle,
    bench_contention
);
criterion_main!(benches);
