//! Stationary nonlocal heat conduction on a rectangle.
//!
//! The left edge is held at `T = 0`, a unit heat flux enters through the right edge and the
//! remaining edges are insulated.
//!
//! Usage:
//!   cargo run --release --example thermal -- --cells 40 --radius 0.1 --local-weight 0.5
//!   cargo run --release --example thermal -- --config thermal.json
use clap::{Parser, ValueEnum};
use eyre::WrapErr;
use log::info;
use nonlocal_fem::assembly::{HeatStiffness, QuadratureCache};
use nonlocal_fem::boundary::BoundaryCondition;
use nonlocal_fem::config::{ModelParameters, SaveParameters, SolveOptions};
use nonlocal_fem::element::QuadrilateralElement;
use nonlocal_fem::influence::PolynomialInfluence;
use nonlocal_fem::io::csv::write_nodal_csv;
use nonlocal_fem::io::vtk::MeshDataSetBuilder;
use nonlocal_fem::materials::HeatParameters;
use nonlocal_fem::mesh::procedural::create_rectangular_mesh;
use nonlocal_fem::postprocess::{energy, integrate_solution};
use nonlocal_fem::solve::solve_stationary_heat;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "thermal")]
#[command(about = "Stationary nonlocal heat conduction on a rectangle")]
struct Args {
    /// JSON file with material, model, solver and output settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of cells along each edge
    #[arg(long, default_value_t = 20)]
    cells: usize,

    #[arg(long, value_enum, default_value_t = ElementArg::Bilinear)]
    element: ElementArg,

    /// Influence radius, overrides the configuration file
    #[arg(short, long)]
    radius: Option<f64>,

    /// Local weight p1, overrides the configuration file
    #[arg(short = 'p', long)]
    local_weight: Option<f64>,

    #[arg(short = 't', long)]
    threads: Option<usize>,

    /// Output folder, overrides the configuration file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ElementArg {
    Bilinear,
    Serendipity,
    Biquadratic,
}

impl From<ElementArg> for QuadrilateralElement {
    fn from(arg: ElementArg) -> Self {
        match arg {
            ElementArg::Bilinear => Self::Bilinear,
            ElementArg::Serendipity => Self::Serendipity,
            ElementArg::Biquadratic => Self::Biquadratic,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ThermalConfig {
    size: Option<[f64; 2]>,
    heat: HeatParameters,
    model: ModelParameters,
    options: SolveOptions,
    save: SaveParameters,
}

fn main() -> eyre::Result<()> {
    env_logger::init();
    let args = Args::parse();

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .wrap_err("Failed to set up the thread pool")?;
    }
    info!("Using {} threads", rayon::current_num_threads());

    let mut config = match &args.config {
        Some(path) => {
            let file = std::fs::File::open(path).wrap_err_with(|| format!("Failed to open {}", path.display()))?;
            serde_json::from_reader(file).wrap_err_with(|| format!("Failed to parse {}", path.display()))?
        }
        None => ThermalConfig::default(),
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

    let size = config.size.unwrap_or([1.0, 1.0]);
    let mut mesh = create_rectangular_mesh(args.element.into(), [0.0, 0.0], size, [args.cells, args.cells]);
    info!(
        "Mesh with {} nodes and {} elements",
        mesh.node_count(),
        mesh.element_count()
    );
    let nonlocal = config.model.is_nonlocal(&config.options.assembly);
    if nonlocal {
        let timer = Instant::now();
        mesh.find_neighbors(config.model.radius);
        info!("Neighbor search took {:.2?}", timer.elapsed());
    }
    let influence = PolynomialInfluence::new(config.model.radius.max(f64::EPSILON), 2, 1)?;

    // down, right, up, left
    let conditions = vec![
        BoundaryCondition::flux(0.0),
        BoundaryCondition::flux(1.0),
        BoundaryCondition::flux(0.0),
        BoundaryCondition::value(0.0),
    ];
    let temperature = solve_stationary_heat(
        &mesh,
        &config.heat,
        &config.model,
        influence,
        conditions,
        |_| 0.0,
        &config.options,
    )?;

    if config.save.calc_energy {
        let cache = QuadratureCache::new(&mesh, &config.options.quadrature);
        let form = HeatStiffness::new(
            config.heat.conductivity,
            &config.model,
            &config.options.assembly,
            influence,
        );
        info!("Integral of the temperature: {:e}", integrate_solution(&mesh, &cache, &temperature)?);
        info!("Energy: {:e}", energy(&mesh, &cache, &form, &temperature)?);
    }

    let folder = &config.save.folder;
    std::fs::create_dir_all(folder).wrap_err_with(|| format!("Failed to create {}", folder.display()))?;
    if config.save.save_csv {
        write_nodal_csv(&mesh, temperature.as_slice(), config.save.precision, folder.join("T.csv"))?;
    }
    if config.save.save_vtk {
        MeshDataSetBuilder::from_mesh(&mesh)
            .with_title("Temperature")
            .with_point_scalars("Temperature", temperature.iter().copied())
            .try_export(folder.join("T.vtk"))?;
    }
    info!("Results written to {}", folder.display());
    Ok(())
}
