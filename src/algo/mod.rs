pub mod diversity;
pub mod drift_detector;
pub mod online_bagging;
pub mod prequential;

// Re-exports for convenience
pub use diversity::DiversityWrapper;
pub use drift_detector::{Ddm, DriftDetector, DriftLevel};
pub use online_bagging::OnlineBagging;
pub use prequential::PrequentialMetrics;
