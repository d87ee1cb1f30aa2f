pub mod http_result_store;
pub mod replicate_backend;
pub mod replicate_client;
pub mod replicate_describer;
