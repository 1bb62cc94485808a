use std::path::PathBuf;

mod elasticity;
mod heat;

fn data_output_path() -> PathBuf {
    std::env::temp_dir().join("nonlocal_fem_integration_tests")
}
