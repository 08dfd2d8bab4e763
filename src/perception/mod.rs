pub mod screenshot;

pub use screenshot::{encode_half_scale, ScreenshotArtifact};
