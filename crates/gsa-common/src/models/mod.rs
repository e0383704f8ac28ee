//! Wire and storage records shared between the service roles.

pub mod external;
pub mod input;
pub mod message;
pub mod result;
pub mod status;

pub use external::{DatasourceParameter, ExternalData, ExternalDatasource, SampleMetadata};
pub use input::{AnalysisInput, Comparison, DataType, Dataset, Design, Parameter};
pub use message::{AnalysisJob, ArtifactKind, DatasetJob, ReportJob};
pub use result::{AnalysisResult, DatasetResult, IdentifierMapping, VisualizationLink};
pub use status::{JobKind, JobState, JobStatus, ReportArtifact};
