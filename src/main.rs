use starpool::{dispatch, dispatch_failsafe, PoolConfig};
use std::time::Instant;
use tracing_subscriber::EnvFilter;


fn square(x: u64) -> Result<u64, String> {
    Ok(x * x)
}

fn reciprocal(x: i32) -> Result<f64, String> {
    if x == 0 {
        return Err("division by zero".to_string());
    }
    Ok(1.0 / f64::from(x))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = match PoolConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    let now = Instant::now();
    let items: Vec<(u64,)> = (0..100_000).map(|i| (i,)).collect();
    match dispatch(square, items, &config.clone().with_chunk_size(1_000)) {
        Ok(squares) => println!(
            "squared {} items, sum {} in {:?}",
            squares.len(),
            squares.iter().sum::<u64>(),
            now.elapsed()
        ),
        Err(err) => eprintln!("dispatch failed: {err}"),
    }

    let items: Vec<(i32,)> = vec![(1,), (0,), (2,)];
    match dispatch_failsafe(reciprocal, items, &config) {
        Ok(values) => println!("reciprocals: {values:?}"),
        Err(err) => eprintln!("failsafe dispatch failed: {err}"),
    }
}
