//! Transient nonlocal heat conduction in a bar.
//!
//! The bar starts at `T = 0`, its left end is heated to `T = 1` while its right end is
//! insulated. The temperature is saved every `save_frequency` steps.
use clap::Parser;
use eyre::WrapErr;
use log::info;
use nonlocal_fem::assembly::QuadratureCache;
use nonlocal_fem::boundary::BoundaryCondition;
use nonlocal_fem::config::{ModelParameters, SaveParameters, SolveOptions, TimeParameters};
use nonlocal_fem::element::SegmentElement;
use nonlocal_fem::influence::PolynomialInfluence;
use nonlocal_fem::io::csv::write_nodal_csv;
use nonlocal_fem::materials::HeatParameters;
use nonlocal_fem::mesh::procedural::create_uniform_segment_mesh;
use nonlocal_fem::postprocess::integrate_solution;
use nonlocal_fem::solve::solve_transient_heat;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "heat_1d")]
#[command(about = "Transient nonlocal heat conduction in a bar")]
struct Args {
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 100)]
    elements: usize,

    #[arg(long)]
    quadratic: bool,

    #[arg(short, long)]
    radius: Option<f64>,

    #[arg(short = 'p', long)]
    local_weight: Option<f64>,

    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TransientConfig {
    heat: HeatParameters,
    model: ModelParameters,
    time: TimeParameters,
    options: SolveOptions,
    save: SaveParameters,
}

fn main() -> eyre::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config: TransientConfig = match &args.config {
        Some(path) => {
            let file = std::fs::File::open(path).wrap_err_with(|| format!("Failed to open {}", path.display()))?;
            serde_json::from_reader(file).wrap_err_with(|| format!("Failed to parse {}", path.display()))?
        }
        None => TransientConfig::default(),
    };
    if let Some(radius) = args.radius {
        config.model.radius = radius;
    }
    if let Some(local_weight) = args.local_weight {
        config.model.local_weight = local_weight;
    }
    if let Some(output) = args.output {
        config.save.folder = output;
    }

    let kind = if args.quadratic {
        SegmentElement::Quadratic
    } else {
        SegmentElement::Linear
    };
    let mut mesh = create_uniform_segment_mesh(kind, [0.0, 1.0], args.elements);
    if config.model.is_nonlocal(&config.options.assembly) {
        mesh.find_neighbors(config.model.radius);
    }
    let influence = PolynomialInfluence::new(config.model.radius.max(f64::EPSILON), 2, 1)?;
    let cache = QuadratureCache::new(&mesh, &config.options.quadrature);

    let folder = config.save.folder.clone();
    std::fs::create_dir_all(&folder).wrap_err_with(|| format!("Failed to create {}", folder.display()))?;
    let save = &config.save;
    let temperature = solve_transient_heat(
        &mesh,
        &config.heat,
        &config.model,
        influence,
        vec![BoundaryCondition::value(1.0), BoundaryCondition::flux(0.0)],
        |_| 0.0,
        &config.time,
        &config.options,
        |step, time, solution| {
            if save.calc_energy {
                info!(
                    "Step {step}, t = {time:.4}: ∫T = {:e}",
                    integrate_solution(&mesh, &cache, solution)?
                );
            }
            if save.save_csv {
                write_nodal_csv(&mesh, solution.as_slice(), save.precision, folder.join(format!("T{step}.csv")))?;
            }
            Ok(())
        },
    )?;

    info!(
        "Final temperature at the insulated end: {:e}",
        temperature[mesh.boundary_group(1).nodes()[0]]
    );
    Ok(())
}
