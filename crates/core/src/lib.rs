pub mod capture;
pub mod control;
pub mod detection;
pub mod generation;
pub mod handoff;
pub mod pipeline;
pub mod quality;
pub mod shared;
