use anyhow::Result;
use ort::session::builder::GraphOptimizationLevel;
pub use ort::session::Session;
use std::path::Path;

pub fn initialize_model(model_path: &Path, threads: usize) -> Result<Session> {
    let model = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(threads.max(1))?
        .commit_from_file(model_path)?;

    Ok(model)
}
