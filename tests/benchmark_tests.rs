//! Performance benchmarks for the hot paths of the game engine

use server::auth::StaticTokenVerifier;
use server::color::ColorAllocator;
use server::config::ServerConfig;
use server::cube::{CubeState, Removal};
use server::economy;
use server::game::Game;
use server::leaderboard;
use server::store::{MemoryCubeStore, MemoryUserStore};
use server::user::UserRecord;
use shared::{encode, Face, ServerMessage, Upgrade, DEFAULT_GRID_SIZE};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn every_cell(size: usize) -> impl Iterator<Item = (Face, usize, usize)> {
    Face::ALL
        .into_iter()
        .flat_map(move |face| (0..size).flat_map(move |row| (0..size).map(move |col| (face, row, col))))
}

/// Clears a full-size layer cell by cell
#[test]
fn benchmark_layer_clear() {
    let mut colors = ColorAllocator::with_seed(10, 1);
    let mut cube = CubeState::new(DEFAULT_GRID_SIZE, &mut colors);

    let start = Instant::now();
    let mut promotions = 0;
    for (face, row, col) in every_cell(DEFAULT_GRID_SIZE) {
        if let Removal::Promoted { .. } = cube.remove_block(face, row, col, &mut colors) {
            promotions += 1;
        }
    }
    let duration = start.elapsed();

    let cells = 6 * DEFAULT_GRID_SIZE * DEFAULT_GRID_SIZE;
    println!(
        "Layer clear: {} removals in {:?} ({:.2} ns/removal)",
        cells,
        duration,
        duration.as_nanos() as f64 / cells as f64
    );

    assert_eq!(promotions, 1);
    assert_eq!(cube.current_layer(), 2);
    assert!(duration < Duration::from_secs(2));
}

/// Snapshot encoding is paid once per broadcast
#[test]
fn benchmark_snapshot_encoding() {
    let mut colors = ColorAllocator::with_seed(10, 2);
    let cube = CubeState::new(DEFAULT_GRID_SIZE, &mut colors);
    let message = ServerMessage::CubeStateUpdate(cube.snapshot());

    let iterations = 100;
    let start = Instant::now();
    let mut bytes = 0;
    for _ in 0..iterations {
        bytes = encode(&message).unwrap().len();
    }
    let duration = start.elapsed();

    println!(
        "Snapshot encoding: {} bytes, {:?} per encode",
        bytes,
        duration / iterations
    );

    // 2 layers x 6 faces x 64 x 64 booleans, at least "true" per cell
    assert!(bytes > 2 * 6 * DEFAULT_GRID_SIZE * DEFAULT_GRID_SIZE * 4);
    assert!(duration < Duration::from_secs(10));
}

/// Ranks a large user population
#[test]
fn benchmark_leaderboard_ranking() {
    let records: Vec<UserRecord> = (0..10_000u64)
        .map(|i| {
            let mut record = UserRecord::new(format!("user-{:05}", i));
            record.points = (i * 7919) % 10_007;
            record
        })
        .collect();

    let iterations = 50;
    let start = Instant::now();
    let mut top = Vec::new();
    for _ in 0..iterations {
        top = leaderboard::rank(&records, 10);
    }
    let duration = start.elapsed();

    println!(
        "Leaderboard ranking: {} records, {:?} per ranking",
        records.len(),
        duration / iterations
    );

    assert_eq!(top.len(), 10);
    assert!(top.windows(2).all(|pair| pair[0].points >= pair[1].points));
    assert!(duration < Duration::from_secs(10));
}

/// Economy arithmetic on a record with every multiplier
#[test]
fn benchmark_point_reports() {
    let mut record = UserRecord::new("clicker");
    record
        .owned_upgrades
        .extend([Upgrade::Double, Upgrade::DoublePro, Upgrade::DoubleMax]);

    let iterations = 1_000_000u64;
    let start = Instant::now();
    for _ in 0..iterations {
        economy::earn(&mut record, 1, 1);
    }
    let duration = start.elapsed();

    println!("Point reports: {} in {:?}", iterations, duration);

    assert_eq!(record.points, iterations * 8);
    assert!(duration < Duration::from_secs(2));
}

/// Removal requests through the engine, including persistence and fan-out
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn benchmark_concurrent_engine_removals() {
    let size = 16;
    let game = Arc::new(Game::new(
        ServerConfig {
            grid_size: size,
            ..ServerConfig::default()
        },
        Arc::new(StaticTokenVerifier::new()),
        Arc::new(MemoryUserStore::new()),
        Arc::new(MemoryCubeStore::new()),
    ));

    let cells: Vec<_> = every_cell(size).collect();
    let start = Instant::now();

    let tasks: Vec<_> = cells
        .chunks(cells.len() / 8)
        .map(|chunk| {
            let game = Arc::clone(&game);
            let chunk = chunk.to_vec();
            tokio::spawn(async move {
                let mut promoted = 0;
                for (face, row, col) in chunk {
                    if let Removal::Promoted { .. } =
                        game.remove_block(face, row, col).await.unwrap()
                    {
                        promoted += 1;
                    }
                }
                promoted
            })
        })
        .collect();

    let mut promotions = 0;
    for task in tasks {
        promotions += task.await.unwrap();
    }
    let duration = start.elapsed();

    println!(
        "Engine removals: {} cells from 8 tasks in {:?}",
        cells.len(),
        duration
    );

    assert_eq!(promotions, 1);
    assert_eq!(game.snapshot().await.current_layer, 2);
    assert!(duration < Duration::from_secs(10));
}
