pub mod run_python;

pub use run_python::RunPythonSkill;
