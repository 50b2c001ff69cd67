// Library exports for the docshield sidecar and licensing service.
// This allows tests and external crates to use the modules.

pub mod audit;
pub mod commands;
pub mod config;
pub mod constants;
pub mod detection;
pub mod errors;
pub mod geometry;
pub mod licensing;
pub mod logging;
pub mod middleware;
pub mod rate_limiter;
pub mod state;
pub mod vault;

// Re-export commonly used types
pub use config::{DetectionConfig, LicensingConfig, SidecarConfig};
pub use detection::orchestrator::Orchestrator;
pub use detection::{Action, Detection, PageData, PiiRegion, PiiType};
pub use errors::{Error, Result};
pub use geometry::BBox;
pub use licensing::{LicenseIssuer, LicenseService, SeatRegistry};
pub use rate_limiter::RateLimiter;
pub use state::AppState;
pub use vault::Vault;
