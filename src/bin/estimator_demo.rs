/// Diagnostic: estimator convergence on the reference quadrotor
///
/// Drives the discretized reference model with a fixed input schedule,
/// measures position and velocity with Gaussian noise, and prints how the
/// gain settles and how far the estimate sits from the truth.
use anyhow::Result;
use clap::Parser;
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use detection_drone_rs::config::EstimatorConfig;
use detection_drone_rs::types::linalg::*;
use detection_drone_rs::types::ActuatorCommand;

#[derive(Parser, Debug)]
#[command(name = "estimator_demo")]
#[command(about = "Kalman gain convergence and tracking error on the reference model", long_about = None)]
struct Args {
    /// Number of estimator steps
    #[arg(long, default_value_t = 400)]
    steps: usize,

    /// Noise seed
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Scale on the configured measurement noise
    #[arg(long, default_value_t = 1.0)]
    noise_scale: f64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = EstimatorConfig::default();
    config.position_noise_std *= args.noise_scale;
    config.velocity_noise_std *= args.noise_scale;
    config.validate()?;

    println!("=== Estimator Convergence Demo ===\n");
    println!("  dt: {:.3}s, steps: {}", config.dt_secs, args.steps);
    println!(
        "  noise std: position {:.3} m, velocity {:.3} m/s\n",
        config.position_noise_std, config.velocity_noise_std
    );

    // Truth starts hovering at 1 m, estimate starts at the origin
    let mut truth = StateVec::zeros(STATE_DIM);
    truth[POS_Z] = 1.0;
    let mut kf = config.build_estimator(StateVec::zeros(STATE_DIM))?;
    let model = kf.model().clone();

    let mut rng = StdRng::seed_from_u64(args.seed);
    let pos_noise = Normal::new(0.0, config.position_noise_std)?;
    let vel_noise = Normal::new(0.0, config.velocity_noise_std)?;

    let mut last_gain: Option<DMatrix<f64>> = None;
    let mut sq_err_raw = 0.0;
    let mut sq_err_est = 0.0;
    let mut counted = 0usize;
    let mut faults = 0usize;

    println!("{:>6} {:>12} {:>12} {:>12}", "step", "|ΔL|", "pos err", "trace(P)");
    for k in 0..args.steps {
        let t = k as f64 * config.dt_secs;
        let command = ActuatorCommand::new(0.0, 0.0, 0.0, 20.0 * (0.5 * t).sin());
        let u = command.to_input();

        let clean = model.output(&truth, &u);
        let mut y = clean.clone();
        for i in 0..3 {
            y[i] += pos_noise.sample(&mut rng);
            y[i + 3] += vel_noise.sample(&mut rng);
        }

        if kf.step(&y, &u).is_err() {
            faults += 1;
        }

        let est_err = (position_of(kf.state()) - position_of(&truth)).norm();
        let raw_err = (y.rows(0, 3) - clean.rows(0, 3)).norm();
        if k >= args.steps / 4 {
            sq_err_est += est_err * est_err;
            sq_err_raw += raw_err * raw_err;
            counted += 1;
        }

        let gain_delta = match (kf.gain(), &last_gain) {
            (Some(gain), Some(prev)) => (gain - prev).amax(),
            _ => f64::NAN,
        };
        last_gain = kf.gain().cloned();

        if k % (args.steps / 10).max(1) == 0 {
            println!(
                "{:>6} {:>12.3e} {:>12.4} {:>12.4e}",
                k,
                gain_delta,
                est_err,
                kf.covariance().trace()
            );
        }

        truth = model.predict(&truth, &u);
    }

    let rms_est = (sq_err_est / counted.max(1) as f64).sqrt();
    let rms_raw = (sq_err_raw / counted.max(1) as f64).sqrt();
    println!("\n--- Steady state (last 3/4 of run) ---");
    println!("  RMS position error, raw measurement: {:.4} m", rms_raw);
    println!("  RMS position error, filtered:        {:.4} m", rms_est);
    println!("  Estimator updates: {}, faults: {}", kf.update_count(), faults);
    Ok(())
}
