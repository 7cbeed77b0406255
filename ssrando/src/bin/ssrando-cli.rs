use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use rand::{RngCore, SeedableRng};
use ssrando::randomize::{GenerationFailed, Randomization, Randomizer};
use ssrando::settings::parse_randomizer_settings;
use ssrando_game::World;
use std::path::PathBuf;

#[derive(Parser)]
struct Args {
    #[arg(long)]
    world: PathBuf,

    #[arg(long)]
    settings: PathBuf,

    #[arg(long)]
    random_seed: Option<usize>,

    #[arg(long)]
    max_attempts: Option<usize>,

    #[arg(long)]
    output_spoiler_log: Option<PathBuf>,
}

fn get_randomization(args: &Args, world: &World) -> Result<Randomization> {
    let settings_str = std::fs::read_to_string(&args.settings)
        .with_context(|| format!("unable to read settings {}", args.settings.display()))?;
    let settings = parse_randomizer_settings(&settings_str)
        .with_context(|| format!("invalid settings in {}", args.settings.display()))?;
    let randomizer = Randomizer::new(world, &settings)?;

    let max_attempts = args.max_attempts.unwrap_or(20);
    let random_seed = args.random_seed.unwrap_or(0);
    let mut rng_seed = [0u8; 32];
    rng_seed[..8].copy_from_slice(&random_seed.to_le_bytes());
    let mut rng = rand::rngs::StdRng::from_seed(rng_seed);
    for attempt_num in 0..max_attempts {
        let seed = (rng.next_u64() & 0xFFFFFFFF) as usize;
        info!("Attempt {}/{}: seed {}", attempt_num + 1, max_attempts, seed);
        match randomizer.randomize(attempt_num, seed) {
            Ok(randomization) => return Ok(randomization),
            Err(e) => {
                if e.downcast_ref::<GenerationFailed>().is_none() {
                    return Err(e);
                }
                info!(
                    "Attempt {}/{}: Randomization failed: {}",
                    attempt_num + 1,
                    max_attempts,
                    e
                );
            }
        }
    }
    bail!("Exhausted randomization attempts");
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let world = World::load(&args.world)?;
    let randomization = get_randomization(&args, &world)?;
    info!(
        "Placed {} items in {} spheres",
        randomization.placement.locations.len(),
        randomization.spoiler_log.spheres.len()
    );

    if let Some(output_spoiler_log_path) = &args.output_spoiler_log {
        println!(
            "Writing spoiler log to {}",
            output_spoiler_log_path.display()
        );
        let spoiler_str = serde_json::to_string_pretty(&randomization.spoiler_log)?;
        std::fs::write(output_spoiler_log_path, spoiler_str)?;
    }
    Ok(())
}
