//! 专家子系统：注册表与委派

pub mod delegator;
pub mod registry;

pub use delegator::{DelegationRecord, DelegationRequest, DelegationStatus, Delegator};
pub use registry::{
    CatalogEntry, EchoSpecialist, Specialist, SpecialistCatalog, SpecialistContext, SpecialistRecord,
    SpecialistRegistry, SpecialistStatus,
};
