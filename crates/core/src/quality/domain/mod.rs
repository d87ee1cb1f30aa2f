pub mod quality_gate;
pub mod sharpness;
