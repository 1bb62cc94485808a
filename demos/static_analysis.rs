//! Nonlocal plane-stress analysis of a plate under uniaxial tension.
//!
//! The plate is held in x along its left edge and in y along its bottom edge, and a uniform
//! traction pulls on its right edge. Displacements, strains and stresses are written as the
//! point fields `U_X, U_Y, EPS_XX, EPS_YY, EPS_XY, SIGMA_XX, SIGMA_YY, SIGMA_XY`.
use clap::Parser;
use eyre::WrapErr;
use log::info;
use nalgebra::{Vector2, Vector3};
use nonlocal_fem::assembly::QuadratureCache;
use nonlocal_fem::boundary::{BoundaryCondition, ComponentCondition};
use nonlocal_fem::config::{ModelParameters, SaveParameters, SolveOptions};
use nonlocal_fem::element::QuadrilateralElement;
use nonlocal_fem::influence::PolynomialInfluence;
use nonlocal_fem::io::csv::write_nodal_csv;
use nonlocal_fem::io::vtk::MeshDataSetBuilder;
use nonlocal_fem::materials::{PlaneStress, YoungPoisson};
use nonlocal_fem::mesh::procedural::create_rectangular_mesh;
use nonlocal_fem::postprocess::{nodal_strains, nodal_stresses};
use nonlocal_fem::solve::solve_plane_stress;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "static_analysis")]
#[command(about = "Nonlocal plane-stress plate under uniaxial tension")]
struct Args {
    /// JSON file with material, model, solver and output settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of cells along the short edge, the long edge gets twice as many
    #[arg(long, default_value_t = 10)]
    cells: usize,

    /// Use serendipity instead of bilinear elements
    #[arg(long)]
    serendipity: bool,

    #[arg(short, long)]
    radius: Option<f64>,

    #[arg(short = 'p', long)]
    local_weight: Option<f64>,

    #[arg(short = 't', long)]
    threads: Option<usize>,

    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct StaticConfig {
    material: YoungPoisson,
    traction: f64,
    model: ModelParameters,
    options: SolveOptions,
    save: SaveParameters,
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            material: YoungPoisson {
                young: 21.0,
                poisson: 0.3,
            },
            traction: 1.0,
            model: ModelParameters::default(),
            options: SolveOptions::default(),
            save: SaveParameters::default(),
        }
    }
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

    let mut config: StaticConfig = match &args.config {
        Some(path) => {
            let file = std::fs::File::open(path).wrap_err_with(|| format!("Failed to open {}", path.display()))?;
            serde_json::from_reader(file).wrap_err_with(|| format!("Failed to parse {}", path.display()))?
        }
        None => StaticConfig::default(),
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

    let kind = if args.serendipity {
        QuadrilateralElement::Serendipity
    } else {
        QuadrilateralElement::Bilinear
    };
    let mut mesh = create_rectangular_mesh(kind, [0.0, 0.0], [2.0, 1.0], [2 * args.cells, args.cells]);
    if config.model.is_nonlocal(&config.options.assembly) {
        mesh.find_neighbors(config.model.radius);
    }
    let influence = PolynomialInfluence::new(config.model.radius.max(f64::EPSILON), 2, 1)?;

    let free = || ComponentCondition::second_kind(0.0);
    let fixed = || ComponentCondition::first_kind(0.0);
    let conditions = vec![
        BoundaryCondition::new(vec![free(), fixed()]),
        BoundaryCondition::new(vec![ComponentCondition::second_kind(config.traction), free()]),
        BoundaryCondition::new(vec![free(), free()]),
        BoundaryCondition::new(vec![fixed(), free()]),
    ];
    let displacement = solve_plane_stress(
        &mesh,
        &config.material,
        &config.model,
        influence,
        conditions,
        |_| Vector2::zeros(),
        &config.options,
    )?;

    let strains = nodal_strains(&mesh, &displacement)?;
    let cache = QuadratureCache::new(&mesh, &config.options.quadrature);
    let stresses = nodal_stresses(
        &mesh,
        &cache,
        &PlaneStress::from(config.material),
        &config.model,
        &config.options.assembly,
        influence,
        &strains,
    )?;
    let max_stress = stresses.iter().map(|s| s[0]).fold(f64::NEG_INFINITY, f64::max);
    info!("Largest σ_xx: {max_stress:e}");

    let component = |values: &[Vector3<f64>], c: usize| -> Vec<f64> { values.iter().map(|v| v[c]).collect() };
    let fields = [
        ("U_X", displacement.iter().step_by(2).copied().collect()),
        ("U_Y", displacement.iter().skip(1).step_by(2).copied().collect()),
        ("EPS_XX", component(&strains, 0)),
        ("EPS_YY", component(&strains, 1)),
        ("EPS_XY", component(&strains, 2)),
        ("SIGMA_XX", component(&stresses, 0)),
        ("SIGMA_YY", component(&stresses, 1)),
        ("SIGMA_XY", component(&stresses, 2)),
    ];

    let folder = &config.save.folder;
    std::fs::create_dir_all(folder).wrap_err_with(|| format!("Failed to create {}", folder.display()))?;
    if config.save.save_csv {
        for (name, values) in &fields {
            write_nodal_csv(&mesh, values, config.save.precision, folder.join(format!("{name}.csv")))?;
        }
    }
    if config.save.save_vtk {
        let builder = fields.iter().fold(
            MeshDataSetBuilder::from_mesh(&mesh).with_title("Plane stress"),
            |builder, (name, values)| builder.with_point_scalars(*name, values.iter().copied()),
        );
        builder.try_export(folder.join("plate.vtk"))?;
    }
    info!("Results written to {}", folder.display());
    Ok(())
}
