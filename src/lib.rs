pub mod container;
pub mod paths;
pub mod flatten;
pub mod marker;
pub mod package;
pub mod config;
pub mod service;

pub use container::{Archive, Compression, ContainerError, EncodeOptions};
pub use flatten::{flatten, should_flatten};
pub use marker::{has_root_marker, ROOT_MARKER};
pub use package::{normalize, NormalizeError, NormalizeOptions, Normalized, PackageFormat};
pub use config::ServiceConfig;
pub use service::{PackageRequest, PackageResponse, PackageService, ServiceError};
