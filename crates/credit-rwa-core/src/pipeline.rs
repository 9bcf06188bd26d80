//! End-to-end run: hierarchy resolution followed by CRM allocation.

use serde::{Deserialize, Serialize};
use tracing::info_span;

use crate::config::EngineConfig;
use crate::crm::{
    apply_crm, Collateral, CrmOutput, Guarantee, HaircutLookup, PreliminaryRiskWeight,
    ProtectionInput, Provision, StandardisedRiskWeights, SupervisoryHaircuts,
};
use crate::hierarchy::{
    resolve_hierarchy, Counterparty, Facility, HierarchyInput, Loan, ResolvedHierarchy,
};
use crate::issues::CalculationIssue;
use crate::types::ComputationOutput;
use crate::RwaResult;

/// Every record table for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioInput {
    pub counterparties: Vec<Counterparty>,
    pub facilities: Vec<Facility>,
    pub loans: Vec<Loan>,
    pub collateral: Vec<Collateral>,
    pub guarantees: Vec<Guarantee>,
    pub provisions: Vec<Provision>,
}

impl PortfolioInput {
    pub fn from_json_str(json: &str) -> RwaResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn hierarchy_input(&self) -> HierarchyInput {
        HierarchyInput {
            counterparties: self.counterparties.clone(),
            facilities: self.facilities.clone(),
            loans: self.loans.clone(),
        }
    }

    pub fn protection_input(&self) -> ProtectionInput {
        ProtectionInput {
            collateral: self.collateral.clone(),
            guarantees: self.guarantees.clone(),
            provisions: self.provisions.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub hierarchy: ComputationOutput<ResolvedHierarchy>,
    pub crm: ComputationOutput<CrmOutput>,
}

impl PipelineOutput {
    /// Issues from both stages, hierarchy first.
    pub fn issues(&self) -> impl Iterator<Item = &CalculationIssue> {
        self.hierarchy
            .result
            .issues
            .iter()
            .chain(self.crm.result.issues.iter())
    }
}

/// Run both stages with standardised preliminary weights and supervisory
/// haircuts.
pub fn run_pipeline(input: &PortfolioInput, config: &EngineConfig) -> RwaResult<PipelineOutput> {
    run_pipeline_with(input, config, &StandardisedRiskWeights, &SupervisoryHaircuts)
}

pub fn run_pipeline_with(
    input: &PortfolioInput,
    config: &EngineConfig,
    weights: &dyn PreliminaryRiskWeight,
    haircuts: &dyn HaircutLookup,
) -> RwaResult<PipelineOutput> {
    config.validate()?;
    let _span = info_span!("run_pipeline").entered();

    let hierarchy = resolve_hierarchy(&input.hierarchy_input(), &config.hierarchy)?;
    let crm = apply_crm(
        &hierarchy.result,
        &input.protection_input(),
        weights,
        haircuts,
        &config.crm,
    )?;
    Ok(PipelineOutput { hierarchy, crm })
}
