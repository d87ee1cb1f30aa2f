use crate::shared::region::Region;

/// One face proposal from a detector: a box in frame coordinates plus its score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub region: Region,
    pub confidence: f64,
}

impl Detection {
    pub fn new(region: Region, confidence: f64) -> Self {
        Self { region, confidence }
    }
}
