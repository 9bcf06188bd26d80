//! Credit risk mitigation.
//!
//! Expands collateral, guarantee and provision records from whatever level
//! they were declared at down to reporting rows, values them per
//! (protection, exposure) pair and allocates the limited value so that the
//! most capital-intensive exposures are protected first.

pub mod allocation;
pub mod engine;
pub mod expansion;
pub mod protection;
pub mod risk_weight;
pub mod valuation;

pub use engine::{
    apply_crm, AllocationRecord, CrmAdjustedExposure, CrmOutput, CrmSummary, GuaranteedPortion,
    ProtectionUsage,
};
pub use protection::{
    Collateral, CollateralType, Guarantee, GuarantorType, LinkFields, ProtectionInput,
    ProtectionKind, ProtectionLink, Provision,
};
pub use risk_weight::{PrecomputedRiskWeights, PreliminaryRiskWeight, StandardisedRiskWeights};
pub use valuation::{HaircutLookup, PairValuation, SupervisoryHaircuts};
