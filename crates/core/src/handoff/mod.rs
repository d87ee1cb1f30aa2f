pub mod handoff_dir;
pub mod handoff_file_sink;
