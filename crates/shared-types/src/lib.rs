pub mod region;
pub mod types;

pub use region::RegionDescriptor;
pub use types::{
    AnalysisReport, AnalysisResponse, ComplianceRecord, ErrorEnvelope, GeoComplianceFlag,
    Severity, StructuringQuality, SummaryRow, PLACEHOLDER,
};
