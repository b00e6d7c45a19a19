//! Barcode Life CLI - Run simulations from JSON configuration.

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use barcode_life::{
    compute::{PatternMaps, SimRng, World},
    schema::SimulationConfig,
};

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <config.json> [steps]", args[0]);
        eprintln!();
        eprintln!("Run a Barcode Life simulation from JSON configuration.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to simulation configuration file");
        eprintln!("  steps        Number of simulation steps (default: 1000)");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);
    let steps: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(1000);

    // Load configuration
    let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    let config: SimulationConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });

    println!("Barcode Life Simulation");
    println!("=======================");
    println!(
        "World: {}x{}, barcodes: {}x{}",
        config.world.width, config.world.height, config.barcode.width, config.barcode.height
    );
    println!(
        "Population: {} agents in {} groups",
        config.population.groups.iter().map(|g| g.count).sum::<usize>(),
        config.population.groups.len()
    );
    println!("Max band: {:?}", config.genetics.max_band);
    println!("Steps: {}", steps);
    println!();

    let mut rng = match config.random_seed {
        Some(seed) => SimRng::new(seed),
        None => SimRng::random(),
    };

    let start = Instant::now();
    let maps = Arc::new(PatternMaps::initialise(config.genetics.max_band));
    log::info!("Pattern maps ready in {:.2}s", start.elapsed().as_secs_f32());

    let mut world = World::new(config, maps, &mut rng).unwrap_or_else(|e| {
        eprintln!("Error creating world: {}", e);
        std::process::exit(1);
    });

    println!("Initial state:");
    print!("{}", world.stats());
    println!();

    // Run simulation
    println!("Running simulation...");
    let start = Instant::now();
    let (mut born, mut died, mut killed) = (0usize, 0usize, 0usize);

    for i in 0..steps {
        let report = world.step(&mut rng);
        born += report.born;
        died += report.died;
        killed += report.killed;

        // Print progress every 10%
        if (i + 1) % (steps / 10).max(1) == 0 {
            let elapsed = start.elapsed().as_secs_f32();
            let steps_per_sec = (i + 1) as f32 / elapsed;
            println!(
                "  Step {}/{}: agents={}, born={}, died={}, killed={}, tiles={}, {:.1} steps/s",
                i + 1,
                steps,
                report.population,
                born,
                died,
                killed,
                report.active_tiles,
                steps_per_sec
            );
            born = 0;
            died = 0;
            killed = 0;
        }

        if report.population == 0 {
            log::warn!("Population extinct after {} steps", i + 1);
            break;
        }
    }

    let elapsed = start.elapsed();

    println!();
    println!("Final state:");
    print!("{}", world.stats());
    println!();
    println!(
        "Time: {:.2}s ({:.1} steps/s)",
        elapsed.as_secs_f32(),
        world.step_count() as f32 / elapsed.as_secs_f32()
    );
}

fn print_example_config() {
    let config = SimulationConfig::default();
    match serde_json::to_string_pretty(&config) {
        Ok(json) => {
            println!("Example configuration (config.json):");
            println!("{}", json);
        }
        Err(e) => {
            eprintln!("Error serializing config: {}", e);
            std::process::exit(1);
        }
    }
}
