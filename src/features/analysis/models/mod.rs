pub mod analysis;

pub use analysis::{Analysis, AnalysisStatus, NewAnalysis, StatusCounts};
