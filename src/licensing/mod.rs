//! Offline licensing: signed machine-bound blobs, seat enforcement, and
//! the one-shot trial ledger.

pub mod blob;
pub mod registry;
pub mod schemas;
pub mod service;

pub use blob::{generate_keypair, verify_blob, LicenseIssuer, LicensePayload};
pub use registry::{MachineRegistration, SeatRegistry, SubscriptionRecord};
pub use service::LicenseService;
