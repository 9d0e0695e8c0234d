use bhquad::{ScenarioConfig, Scenario};
use bhquad::run_2d;
use bhquad::bench_tick;

use anyhow::{Context, Result};
use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
struct Args {
    /// Scenario file under `scenarios/`
    #[arg(short, default_value = "galaxy.yaml")]
    file_name: String,

    /// Step until `t_end` without opening a window
    #[arg(long)]
    headless: bool,

    /// Time the direct sum against the tree and exit
    #[arg(long)]
    bench: bool,
}

// load here to keep main clean
fn load_scenario_from_yaml(file_name: &str) -> Result<ScenarioConfig> {
    let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios").join(file_name);
    let scenario_cfg = ScenarioConfig::from_path(&config_path)
        .with_context(|| format!("failed to load scenario {}", config_path.display()))?;
    log::debug!("{:?}", scenario_cfg);
    Ok(scenario_cfg)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.bench {
        bench_tick();
        return Ok(());
    }

    let scenario_cfg = load_scenario_from_yaml(&args.file_name)?;
    let mut scenario = Scenario::build_scenario(scenario_cfg)?;

    if args.headless {
        let steps = scenario.run_headless();
        log::info!(
            "finished {steps} steps: {} tracked, {} dropped",
            scenario.tree.len(),
            scenario.dropped.len()
        );
    } else {
        run_2d(scenario);
    }

    Ok(())
}
