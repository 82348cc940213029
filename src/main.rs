use std::env;
use std::process;
use std::time::Instant;

use log::{error, info, LevelFilter};

use dist_cocluster::{cluster, write_labels, ClusterConfig, Config};

fn main() {
    simple_logger::SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .unwrap();

    let config = match Config::new(env::args()) {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            process::exit(1);
        }
    };

    if let Err(err) = run(&config) {
        error!("{}", err);
        process::exit(1);
    }
}

fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();

    let (matrix, label_set) = config.load()?;
    info!(
        "loaded {}x{} matrix, {}x{} label grid, {} workers",
        matrix.rows,
        matrix.cols,
        label_set.num_row_labels,
        label_set.num_col_labels,
        config.num_workers
    );

    let cluster_config = ClusterConfig {
        num_row_labels: label_set.num_row_labels,
        num_col_labels: label_set.num_col_labels,
        max_iterations: config.max_iterations,
        num_workers: config.num_workers,
    };
    let mut row_labels = label_set.row_labels;
    let mut col_labels = label_set.col_labels;

    let clustering_start = Instant::now();
    let summary = cluster(&matrix, &mut row_labels, &mut col_labels, &cluster_config)?;
    let clustering_seconds = clustering_start.elapsed().as_secs_f64();

    info!(
        "{} after {} iterations, mean squared error {:.6}",
        if summary.converged {
            "converged"
        } else {
            "iteration cap reached"
        },
        summary.iterations,
        summary.mean_error
    );
    info!("clustering time total: {:.3} seconds", clustering_seconds);
    if summary.iterations > 0 {
        info!(
            "clustering time per iteration: {:.3} seconds",
            clustering_seconds / summary.iterations as f64
        );
    }

    write_labels(&config.output_path, &row_labels, &col_labels)?;
    info!(
        "wrote {} labels to {}",
        row_labels.len() + col_labels.len(),
        config.output_path.display()
    );
    info!(
        "total execution time: {:.3} seconds",
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
