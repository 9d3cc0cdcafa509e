//! Domain types for the layer provisioner.

pub mod error;
pub mod lifecycle;
pub mod state;

pub use error::{ProvisionError, Result};
pub use lifecycle::{
    LifecycleAction, LifecycleEvent, ProvisioningRequest, ProvisioningResponse,
    ResourceProperties, ResponseData,
};
pub use state::ProvisionState;
