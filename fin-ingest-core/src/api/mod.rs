//! Resilient authenticated API access.

pub mod client;
pub mod error;
pub mod finam;
pub mod transport;

pub use client::{AuthConfig, AuthenticatedClient};
pub use error::{ApiError, ErrorBody};
pub use finam::{FinamApi, FinamAsset, FinamBar, FINAM_API_BASE_URL};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport};
