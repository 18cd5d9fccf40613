// Analysis core: error reduction, payload normalization, persistence payloads.
// Nothing in here performs I/O; the lifecycle owns every external call.

pub mod extract;
pub mod model;
pub mod normalize;
pub mod persist;
pub mod reduce;
pub mod shape;
