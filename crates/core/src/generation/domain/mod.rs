pub mod face_describer;
pub mod generation_backend;
pub mod generation_job;
pub mod prompt;
pub mod result_store;
pub mod retry;
